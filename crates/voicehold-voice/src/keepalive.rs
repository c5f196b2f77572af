//! Keeps live voice sessions streaming so the platform never sees them idle.

use crate::gateway::VoiceConnection;
use crate::source::{AudioSource, SilenceSource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use voicehold_types::GuildId;

/// Default pause between keep-alive checks.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Builds a fresh source for every playback restart.
pub type SourceFactory = Arc<dyn Fn() -> Box<dyn AudioSource> + Send + Sync>;

fn silence_factory() -> SourceFactory {
    Arc::new(|| Box::new(SilenceSource::new()))
}

/// What a finished keep-alive loop did over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepAliveReport {
    /// Number of times the connection was observed connected.
    pub checks: u64,
    /// Playback starts that succeeded.
    pub restarts: u64,
    /// Playback starts that failed.
    pub failures: u64,
}

/// A per-connection loop that restarts playback whenever the session goes
/// quiet.
///
/// The loop exits as soon as its connection reports disconnected. It never
/// reacts to the disconnect itself; recovery belongs to the watchdog and the
/// event reactor.
pub struct KeepAliveLoop {
    connection: Arc<dyn VoiceConnection>,
    interval: Duration,
    source_factory: SourceFactory,
}

impl KeepAliveLoop {
    pub fn new(connection: Arc<dyn VoiceConnection>, interval: Duration) -> Self {
        Self {
            connection,
            interval,
            source_factory: silence_factory(),
        }
    }

    /// Replaces the silence source with another producer.
    pub fn with_source_factory(mut self, factory: SourceFactory) -> Self {
        self.source_factory = factory;
        self
    }

    pub async fn run(self) -> KeepAliveReport {
        let guild = self.connection.guild_id();
        let mut report = KeepAliveReport::default();
        tracing::info!(guild = %guild, "starting keep-alive loop");

        while self.connection.is_connected() {
            report.checks += 1;
            if !self.connection.is_playing() {
                match self.connection.play((self.source_factory)()) {
                    Ok(()) => {
                        report.restarts += 1;
                        tracing::info!(guild = %guild, "restarted silence playback");
                    }
                    Err(e) => {
                        report.failures += 1;
                        tracing::error!(guild = %guild, error = %e, "error playing silence");
                    }
                }
            }
            sleep(self.interval).await;
        }

        tracing::info!(
            guild = %guild,
            checks = report.checks,
            restarts = report.restarts,
            "keep-alive loop exited, connection closed"
        );
        report
    }
}

/// Tracks the keep-alive task of each guild.
///
/// Uses `std::sync::Mutex`: every acquisition is a short map operation that
/// never spans an `.await`.
pub struct KeepAliveRegistry {
    interval: Duration,
    loops: Mutex<HashMap<GuildId, JoinHandle<KeepAliveReport>>>,
    started: AtomicU64,
}

impl KeepAliveRegistry {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            loops: Mutex::new(HashMap::new()),
            started: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns a keep-alive loop for `connection`, replacing the guild's
    /// previous loop.
    ///
    /// A previous loop bound to a dead connection is already on its way out.
    /// One still running is bound to a session that survived (a move), and is
    /// aborted so a guild never carries two loops.
    pub fn start(&self, connection: Arc<dyn VoiceConnection>) {
        let guild = connection.guild_id();
        let handle = tokio::spawn(KeepAliveLoop::new(connection, self.interval).run());
        self.started.fetch_add(1, Ordering::Relaxed);

        let previous = self
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guild, handle);

        if let Some(previous) = previous {
            if !previous.is_finished() {
                tracing::debug!(guild = %guild, "replacing running keep-alive loop");
                previous.abort();
            }
        }
    }

    /// True while the guild's tracked loop has not finished.
    pub fn is_running(&self, guild: GuildId) -> bool {
        self.loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&guild)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Number of tracked loops that are still running.
    pub fn running(&self) -> usize {
        self.loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Total loops spawned since creation.
    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Stops tracking the guild's loop and hands back its handle.
    pub fn take(&self, guild: GuildId) -> Option<JoinHandle<KeepAliveReport>> {
        self.loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&guild)
    }
}

impl Default for KeepAliveRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_KEEPALIVE_INTERVAL)
    }
}
