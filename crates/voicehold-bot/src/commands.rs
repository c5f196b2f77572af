//! `join` and `leave` command handlers.
//!
//! These are the only code paths that answer the end user. Background
//! recovery stays silent apart from logs.

use crate::error::ControllerError;
use crate::intent::IntentState;
use std::collections::HashSet;
use std::sync::Arc;
use voicehold_types::{CommandResponse, Requester, UserId, VoiceChannel};
use voicehold_voice::{
    ConnectOptions, KeepAliveRegistry, SilenceSource, VoiceConnection, VoiceError, VoiceGateway,
};

pub const JOIN_DESCRIPTION: &str = "Join your voice channel and stay there 24/7.";
pub const LEAVE_DESCRIPTION: &str = "Leave the voice channel (stops auto-reconnect).";

const NOT_AUTHORIZED: &str = "You are not authorized to use this command.";
const NO_VOICE_CHANNEL: &str = "Please join a voice channel first!";
const NOT_IN_VOICE: &str = "I am not in a voice channel.";

/// Decides who may drive the bot: an explicit allow-list, plus any guild
/// administrator.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    allowed: HashSet<UserId>,
}

impl Authorizer {
    pub fn new(allowed: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn is_allowed(&self, requester: &Requester) -> bool {
        self.allowed.contains(&requester.user_id) || requester.is_admin
    }
}

/// How a successful join ended.
#[derive(Debug)]
enum JoinOutcome {
    AlreadyConnected,
    Joined { playback_error: Option<VoiceError> },
}

pub struct VoiceController {
    gateway: Arc<dyn VoiceGateway>,
    intent: Arc<IntentState>,
    keepalive: Arc<KeepAliveRegistry>,
    authorizer: Authorizer,
    connect: ConnectOptions,
}

impl VoiceController {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        intent: Arc<IntentState>,
        keepalive: Arc<KeepAliveRegistry>,
        authorizer: Authorizer,
        connect: ConnectOptions,
    ) -> Self {
        Self {
            gateway,
            intent,
            keepalive,
            authorizer,
            connect,
        }
    }

    /// Joins the requester's voice channel and keeps the session alive.
    pub async fn join(&self, requester: &Requester) -> CommandResponse {
        if !self.authorizer.is_allowed(requester) {
            tracing::warn!(user = %requester.user_id, "unauthorized join attempt");
            return CommandResponse::ephemeral(NOT_AUTHORIZED);
        }
        let Some(channel_id) = requester.voice_channel else {
            return CommandResponse::ephemeral(NO_VOICE_CHANNEL);
        };
        let Some(channel) = self.gateway.resolve_channel(requester.guild_id, channel_id) else {
            let err = ControllerError::ChannelMissing(channel_id);
            tracing::error!(guild = %requester.guild_id, error = %err, "failed to join voice channel");
            return CommandResponse::public(format!("Failed to join: {err}"));
        };

        self.intent.set_desired(channel.id);

        match self.establish(&channel).await {
            Ok(JoinOutcome::AlreadyConnected) => {
                CommandResponse::public(format!("Already connected to {}.", channel.mention()))
            }
            Ok(JoinOutcome::Joined { playback_error }) => {
                tracing::info!(
                    guild = %channel.guild_id,
                    channel = %channel,
                    "joined voice channel"
                );
                let mut content = format!(
                    "Joined {} and started persistent session.",
                    channel.mention()
                );
                if let Some(e) = playback_error {
                    content.push_str(&format!(
                        "\nWarning: silence playback did not start ({e}); keep-alive will retry."
                    ));
                }
                CommandResponse::public(content)
            }
            Err(e) => {
                tracing::error!(guild = %channel.guild_id, channel = %channel, error = %e, "failed to join voice channel");
                CommandResponse::public(format!("Failed to join: {e}"))
            }
        }
    }

    async fn establish(&self, channel: &VoiceChannel) -> Result<JoinOutcome, ControllerError> {
        match self.gateway.voice_connection(channel.guild_id) {
            Some(vc) if vc.channel_id() == Some(channel.id) && vc.is_connected() => {
                return Ok(JoinOutcome::AlreadyConnected);
            }
            Some(vc) if vc.is_connected() => vc.move_to(channel).await?,
            _ => {
                self.gateway.connect(channel, self.connect).await?;
            }
        }

        let vc = self
            .gateway
            .voice_connection(channel.guild_id)
            .filter(|vc| vc.is_connected() && vc.channel_id() == Some(channel.id))
            .ok_or(ControllerError::ConnectionUnverified(channel.id))?;

        Ok(JoinOutcome::Joined {
            playback_error: self.start_playback(vc),
        })
    }

    /// Starts fresh silence and the keep-alive loop. A playback failure is
    /// returned for the reply, but the loop starts regardless and retries.
    fn start_playback(&self, vc: Arc<dyn VoiceConnection>) -> Option<VoiceError> {
        vc.stop();
        let playback_error = vc.play(Box::new(SilenceSource::new())).err();
        if let Some(e) = &playback_error {
            tracing::warn!(guild = %vc.guild_id(), error = %e, "silence playback failed to start");
        }
        self.keepalive.start(vc);
        playback_error
    }

    /// Leaves voice and disables automatic recovery until the next join.
    pub async fn leave(&self, requester: &Requester) -> CommandResponse {
        if !self.authorizer.is_allowed(requester) {
            tracing::warn!(user = %requester.user_id, "unauthorized leave attempt");
            return CommandResponse::ephemeral(NOT_AUTHORIZED);
        }
        let Some(vc) = self.gateway.voice_connection(requester.guild_id) else {
            return CommandResponse::ephemeral(NOT_IN_VOICE);
        };

        // Flags first: the disconnect below yields, and any recovery path
        // that runs meanwhile must already see the leave.
        self.intent.mark_manual_leave();

        match vc.disconnect(true).await {
            Ok(()) => {
                tracing::info!(guild = %requester.guild_id, "manually disconnected by command");
                CommandResponse::public("Disconnected. Auto-reconnect disabled.")
            }
            Err(e) => {
                tracing::error!(guild = %requester.guild_id, error = %e, "manual disconnect failed");
                CommandResponse::public(format!(
                    "Auto-reconnect disabled, but disconnecting failed: {e}"
                ))
            }
        }
    }
}
