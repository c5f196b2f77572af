//! Bounded-retry recovery of a dropped voice session.
//!
//! The retry sequence is an explicit state machine,
//! `Attempting(n) -> Succeeded(n) | Attempting(n + 1) | Exhausted`, driven by
//! [`ReconnectState::advance`]. The async driver in [`ReconnectionPolicy`]
//! only performs the side effects of each state: stale-session cleanup, the
//! linear backoff sleep, and the connect call.

use crate::config::ReconnectConfig;
use crate::intent::{IntentState, ReconnectGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use voicehold_types::{ChannelId, GuildId, VoiceChannel};
use voicehold_voice::{
    ConnectOptions, KeepAliveRegistry, SilenceSource, VoiceConnection, VoiceError, VoiceGateway,
};

/// Default number of connect attempts per sequence.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default backoff unit; attempt `n` waits `n` units.
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(2);

/// Position in a reconnection sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectState {
    /// About to run attempt `n` (1-based).
    Attempting(u32),
    /// Attempt `n` connected.
    Succeeded(u32),
    /// Every attempt failed.
    Exhausted,
}

/// Result of a single connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Connected,
    Failed,
}

impl ReconnectState {
    pub fn start() -> Self {
        Self::Attempting(1)
    }

    /// Pure transition function of the retry sequence.
    ///
    /// Terminal states are absorbing.
    pub fn advance(self, result: AttemptResult, max_attempts: u32) -> Self {
        match (self, result) {
            (Self::Attempting(n), AttemptResult::Connected) => Self::Succeeded(n),
            (Self::Attempting(n), AttemptResult::Failed) if n < max_attempts => {
                Self::Attempting(n + 1)
            }
            (Self::Attempting(_), AttemptResult::Failed) => Self::Exhausted,
            (terminal, _) => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Attempting(_))
    }
}

/// Tunables of the retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSettings {
    pub max_attempts: u32,
    pub backoff_step: Duration,
    pub connect: ConnectOptions,
}

impl ReconnectSettings {
    /// Wait before attempt `attempt`: linear, `step * attempt`, saturating
    /// at `Duration::MAX`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    pub fn from_config(config: &ReconnectConfig, connect: ConnectOptions) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_step: Duration::from_secs(config.backoff_step_secs),
            connect,
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
            connect: ConnectOptions::default(),
        }
    }
}

/// How a call to [`ReconnectionPolicy::reconnect`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// Connected on attempt `attempts`.
    Reconnected { attempts: u32 },
    /// Another sequence holds the slot; this call did nothing.
    AlreadyInProgress,
    /// The intent no longer asks for this channel (manual leave or a new
    /// join happened).
    Suppressed,
    /// The target channel no longer exists. Terminal, no attempts made.
    ChannelMissing(ChannelId),
    /// Every attempt failed.
    Exhausted { attempts: u32 },
    /// Something else (usually a join) restored the session mid-sequence.
    AlreadyConnected,
}

/// What one attempt of the driver ended with.
enum AttemptStep {
    Connected(Arc<dyn VoiceConnection>),
    AlreadyRestored,
    /// The intent changed; the sequence must stop.
    Abandoned,
}

pub struct ReconnectionPolicy {
    gateway: Arc<dyn VoiceGateway>,
    intent: Arc<IntentState>,
    keepalive: Arc<KeepAliveRegistry>,
    settings: ReconnectSettings,
}

impl ReconnectionPolicy {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        intent: Arc<IntentState>,
        keepalive: Arc<KeepAliveRegistry>,
        settings: ReconnectSettings,
    ) -> Self {
        Self {
            gateway,
            intent,
            keepalive,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconnectSettings {
        &self.settings
    }

    /// Restores the session in `guild` to `target`.
    ///
    /// The in-progress slot is claimed before the first suspension point, so
    /// a concurrent call returns [`ReconnectOutcome::AlreadyInProgress`]
    /// without touching the gateway.
    pub async fn reconnect(&self, guild: GuildId, target: ChannelId) -> ReconnectOutcome {
        match self.intent.try_begin_reconnect() {
            Some(guard) => self.run(guild, target, guard).await,
            None => {
                tracing::debug!(guild = %guild, "reconnection already in progress, skipping");
                ReconnectOutcome::AlreadyInProgress
            }
        }
    }

    /// Claims the slot synchronously and runs the sequence on its own task.
    ///
    /// Returns `None` when another sequence already holds the slot.
    pub fn spawn_reconnect(
        self: &Arc<Self>,
        guild: GuildId,
        target: ChannelId,
    ) -> Option<JoinHandle<ReconnectOutcome>> {
        let Some(guard) = self.intent.try_begin_reconnect() else {
            tracing::debug!(guild = %guild, "reconnection already in progress, skipping");
            return None;
        };
        let policy = Arc::clone(self);
        Some(tokio::spawn(async move {
            policy.run(guild, target, guard).await
        }))
    }

    fn still_wanted(&self, target: ChannelId) -> bool {
        self.intent.reconnect_target() == Some(target)
    }

    async fn run(
        &self,
        guild: GuildId,
        target: ChannelId,
        _guard: ReconnectGuard,
    ) -> ReconnectOutcome {
        if !self.still_wanted(target) {
            return ReconnectOutcome::Suppressed;
        }

        let Some(channel) = self.gateway.resolve_channel(guild, target) else {
            tracing::error!(guild = %guild, channel = %target, "target channel not found");
            return ReconnectOutcome::ChannelMissing(target);
        };

        let mut state = ReconnectState::start();
        while let ReconnectState::Attempting(attempt) = state {
            if !self.still_wanted(target) {
                tracing::info!(guild = %guild, attempt, "reconnection no longer wanted, stopping");
                return ReconnectOutcome::Suppressed;
            }

            tracing::info!(guild = %guild, channel = %target, attempt, "reconnection attempt");
            let result = match self.attempt(&channel, attempt).await {
                Ok(AttemptStep::Connected(vc)) => {
                    self.resume(vc);
                    AttemptResult::Connected
                }
                Ok(AttemptStep::AlreadyRestored) => {
                    tracing::info!(guild = %guild, channel = %target, "session already restored, stopping");
                    return ReconnectOutcome::AlreadyConnected;
                }
                Ok(AttemptStep::Abandoned) => return ReconnectOutcome::Suppressed,
                Err(e) => {
                    tracing::error!(guild = %guild, attempt, error = %e, "reconnection attempt failed");
                    AttemptResult::Failed
                }
            };
            state = state.advance(result, self.settings.max_attempts);
        }

        match state {
            ReconnectState::Succeeded(attempts) => {
                tracing::info!(guild = %guild, channel = %target, attempts, "successfully reconnected");
                ReconnectOutcome::Reconnected { attempts }
            }
            _ => {
                tracing::error!(
                    severity = "critical",
                    guild = %guild,
                    channel = %target,
                    attempts = self.settings.max_attempts,
                    "failed to reconnect after multiple attempts"
                );
                ReconnectOutcome::Exhausted {
                    attempts: self.settings.max_attempts,
                }
            }
        }
    }

    /// The guild's session, if it is live and already bound to `target`.
    fn restored_session(&self, guild: GuildId, target: ChannelId) -> Option<Arc<dyn VoiceConnection>> {
        self.gateway
            .voice_connection(guild)
            .filter(|vc| vc.is_connected() && vc.channel_id() == Some(target))
    }

    /// One attempt: drop any stale session, back off, connect.
    async fn attempt(&self, channel: &VoiceChannel, attempt: u32) -> Result<AttemptStep, VoiceError> {
        if self.restored_session(channel.guild_id, channel.id).is_some() {
            return Ok(AttemptStep::AlreadyRestored);
        }
        if let Some(stale) = self.gateway.voice_connection(channel.guild_id) {
            if let Err(e) = stale.disconnect(true).await {
                tracing::debug!(guild = %channel.guild_id, error = %e, "ignoring stale disconnect error");
            }
        }

        sleep(self.settings.backoff_for(attempt)).await;

        if !self.still_wanted(channel.id) {
            return Ok(AttemptStep::Abandoned);
        }
        // A join may have connected while we slept.
        if self.restored_session(channel.guild_id, channel.id).is_some() {
            return Ok(AttemptStep::AlreadyRestored);
        }

        let vc = self.gateway.connect(channel, self.settings.connect).await?;

        if !self.still_wanted(channel.id) {
            if let Err(e) = vc.disconnect(true).await {
                tracing::warn!(guild = %channel.guild_id, error = %e, "failed to drop unwanted session");
            }
            return Ok(AttemptStep::Abandoned);
        }

        Ok(AttemptStep::Connected(vc))
    }

    fn resume(&self, vc: Arc<dyn VoiceConnection>) {
        if let Err(e) = vc.play(Box::new(SilenceSource::new())) {
            tracing::warn!(guild = %vc.guild_id(), error = %e, "silence playback did not start after reconnect");
        }
        self.keepalive.start(vc);
    }
}
