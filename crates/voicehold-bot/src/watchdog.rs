//! Periodic reconciliation of the connection intent against the gateway.
//!
//! The watchdog is the slow, thorough recovery path: it catches anything the
//! event reactor missed (dropped events, partial failures, startup races).

use crate::intent::IntentState;
use crate::reconnect::{ReconnectOutcome, ReconnectionPolicy};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use voicehold_types::ChannelId;
use voicehold_voice::{is_connected_to, locate_channel, VoiceGateway};

/// Default pause between watchdog ticks.
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(5);

/// What a single tick concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No desired channel.
    Idle,
    /// A manual leave is in effect.
    Suppressed,
    /// A session is bound to the desired channel.
    Consistent,
    /// No guild contains the desired channel any more.
    ChannelVanished(ChannelId),
    /// A mismatch was found and the reconnection policy ran.
    Reconnect(ReconnectOutcome),
}

pub struct ConnectionWatchdog {
    gateway: Arc<dyn VoiceGateway>,
    intent: Arc<IntentState>,
    policy: Arc<ReconnectionPolicy>,
    interval: Duration,
}

impl ConnectionWatchdog {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        intent: Arc<IntentState>,
        policy: Arc<ReconnectionPolicy>,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            intent,
            policy,
            interval,
        }
    }

    /// Compares intent with observed state once and repairs a mismatch.
    pub async fn tick(&self) -> TickOutcome {
        let intent = self.intent.snapshot();
        let Some(target) = intent.desired_channel else {
            return TickOutcome::Idle;
        };
        if intent.manual_leave {
            return TickOutcome::Suppressed;
        }

        if is_connected_to(self.gateway.as_ref(), target) {
            return TickOutcome::Consistent;
        }

        match locate_channel(self.gateway.as_ref(), target) {
            Some(channel) => {
                tracing::warn!(
                    guild = %channel.guild_id,
                    channel = %target,
                    "watchdog found no session in desired channel, reconnecting"
                );
                TickOutcome::Reconnect(self.policy.reconnect(channel.guild_id, target).await)
            }
            None => {
                tracing::error!(channel = %target, "watchdog could not find desired channel in any guild");
                TickOutcome::ChannelVanished(target)
            }
        }
    }

    /// Ticks every interval from gateway readiness until the gateway closes.
    ///
    /// A panicking tick is logged and the loop carries on.
    pub async fn run(self) {
        self.gateway.wait_until_ready().await;
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "starting connection watchdog"
        );

        while !self.gateway.is_closed() {
            match AssertUnwindSafe(self.tick()).catch_unwind().await {
                Ok(outcome) => tracing::trace!(?outcome, "watchdog tick"),
                Err(_) => tracing::error!("watchdog tick panicked"),
            }
            sleep(self.interval).await;
        }

        tracing::info!("connection watchdog stopped, gateway closed");
    }
}
