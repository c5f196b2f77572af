//! Fast-path recovery driven by voice-state notifications.

use crate::intent::IntentState;
use crate::reconnect::{ReconnectOutcome, ReconnectionPolicy};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use voicehold_types::{UserId, VoiceStateUpdate};

/// What the reactor did with one event.
#[derive(Debug)]
pub enum Reaction {
    /// The event concerns another member.
    NotOwnEvent,
    /// A manual leave is in effect; the drop was expected.
    ManualLeave,
    /// The bot is still in a channel.
    NotADrop,
    /// Nothing is desired, so nothing to restore.
    NoIntent,
    /// A reconnection is already running.
    AlreadyInProgress,
    /// A reconnection sequence was started.
    Reconnecting(JoinHandle<ReconnectOutcome>),
}

pub struct EventReactor {
    bot_user_id: UserId,
    intent: Arc<IntentState>,
    policy: Arc<ReconnectionPolicy>,
}

impl EventReactor {
    pub fn new(
        bot_user_id: UserId,
        intent: Arc<IntentState>,
        policy: Arc<ReconnectionPolicy>,
    ) -> Self {
        Self {
            bot_user_id,
            intent,
            policy,
        }
    }

    /// Reacts to one voice-state change.
    ///
    /// Runs synchronously up to claiming the reconnection slot, so a drop is
    /// acted on within the same scheduler turn it is observed in.
    pub fn handle(&self, update: &VoiceStateUpdate) -> Reaction {
        if update.user_id != self.bot_user_id {
            return Reaction::NotOwnEvent;
        }

        let intent = self.intent.snapshot();
        if intent.manual_leave {
            return Reaction::ManualLeave;
        }
        if !update.is_disconnect() {
            return Reaction::NotADrop;
        }
        let Some(target) = intent.desired_channel else {
            return Reaction::NoIntent;
        };

        tracing::warn!(
            guild = %update.guild_id,
            channel = %target,
            "bot disconnected unexpectedly, attempting to reconnect"
        );
        match self.policy.spawn_reconnect(update.guild_id, target) {
            Some(handle) => Reaction::Reconnecting(handle),
            None => Reaction::AlreadyInProgress,
        }
    }

    /// Consumes voice-state events until the gateway stops publishing.
    pub async fn run(self, mut events: broadcast::Receiver<VoiceStateUpdate>) {
        tracing::info!("starting voice state reactor");
        loop {
            match events.recv().await {
                Ok(update) => {
                    let reaction = self.handle(&update);
                    tracing::debug!(?reaction, guild = %update.guild_id, "voice state update");
                }
                Err(RecvError::Lagged(skipped)) => {
                    // The watchdog will reconcile whatever was missed.
                    tracing::warn!(skipped, "voice state reactor lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::info!("voice state reactor stopped");
    }
}
