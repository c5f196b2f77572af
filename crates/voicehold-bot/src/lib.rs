//! Voicehold bot library logic.
//!
//! Holds a persistent presence in one voice channel: the join/leave command
//! handlers set the connection intent, and two independent recovery paths
//! restore the session whenever the observed state drifts from it. The
//! [`EventReactor`] reacts to disconnect events immediately; the
//! [`ConnectionWatchdog`] polls on a fixed cadence and catches whatever the
//! reactor missed. Both funnel into the same [`ReconnectionPolicy`], which
//! allows only one sequence at a time.

pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod intent;
pub mod reactor;
pub mod reconnect;
pub mod watchdog;

pub use commands::{Authorizer, VoiceController};
pub use error::ControllerError;
pub use intent::{Intent, IntentState, ReconnectGuard};
pub use reactor::{EventReactor, Reaction};
pub use reconnect::{
    AttemptResult, ReconnectOutcome, ReconnectSettings, ReconnectState, ReconnectionPolicy,
};
pub use watchdog::{ConnectionWatchdog, TickOutcome};

use config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use voicehold_voice::{ConnectOptions, KeepAliveRegistry, VoiceGateway};

/// Shared state of a running bot: the single intent record and every
/// component wired to it.
#[derive(Clone)]
pub struct BotState {
    /// Gateway collaborator.
    pub gateway: Arc<dyn VoiceGateway>,
    /// Where the bot should be connected.
    pub intent: Arc<IntentState>,
    /// Keep-alive loop per guild.
    pub keepalive: Arc<KeepAliveRegistry>,
    /// Shared recovery algorithm.
    pub policy: Arc<ReconnectionPolicy>,
    /// Join/leave handlers.
    pub controller: Arc<VoiceController>,
    /// Pause between watchdog ticks.
    pub watchdog_interval: Duration,
}

/// Handles of the long-running background tasks.
pub struct BackgroundTasks {
    pub watchdog: JoinHandle<()>,
    pub reactor: JoinHandle<()>,
}

impl BackgroundTasks {
    pub fn abort(&self) {
        self.watchdog.abort();
        self.reactor.abort();
    }
}

impl BotState {
    pub fn new(gateway: Arc<dyn VoiceGateway>, config: &Config) -> Self {
        let connect = ConnectOptions {
            self_deaf: config.voice.self_deaf,
        };
        let intent = Arc::new(IntentState::new());
        let keepalive = Arc::new(KeepAliveRegistry::new(Duration::from_secs(
            config.voice.keepalive_interval_secs,
        )));
        let policy = Arc::new(ReconnectionPolicy::new(
            Arc::clone(&gateway),
            Arc::clone(&intent),
            Arc::clone(&keepalive),
            ReconnectSettings::from_config(&config.reconnect, connect),
        ));
        let controller = Arc::new(VoiceController::new(
            Arc::clone(&gateway),
            Arc::clone(&intent),
            Arc::clone(&keepalive),
            Authorizer::new(config.bot.allowed_user_ids.iter().copied()),
            connect,
        ));

        Self {
            gateway,
            intent,
            keepalive,
            policy,
            controller,
            watchdog_interval: Duration::from_secs(config.watchdog.interval_secs),
        }
    }

    pub fn watchdog(&self) -> ConnectionWatchdog {
        ConnectionWatchdog::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.intent),
            Arc::clone(&self.policy),
            self.watchdog_interval,
        )
    }

    pub fn reactor(&self) -> EventReactor {
        EventReactor::new(
            self.gateway.bot_user_id(),
            Arc::clone(&self.intent),
            Arc::clone(&self.policy),
        )
    }

    /// Spawns the watchdog and the event reactor.
    ///
    /// The reactor subscribes before this returns, so no event published
    /// afterwards is missed.
    pub fn spawn_background(&self) -> BackgroundTasks {
        let events = self.gateway.subscribe_voice_states();
        BackgroundTasks {
            watchdog: tokio::spawn(self.watchdog().run()),
            reactor: tokio::spawn(self.reactor().run(events)),
        }
    }
}
