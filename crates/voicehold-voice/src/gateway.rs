//! The narrow interface the controller consumes from the chat-platform
//! gateway client.
//!
//! Authentication, event dispatch and the voice wire protocol all live behind
//! these traits. The controller never constructs a voice session itself; it
//! asks the gateway to connect, move or disconnect and then observes the
//! resulting [`VoiceConnection`].

use crate::error::VoiceError;
use crate::source::AudioSource;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use voicehold_types::{ChannelId, GuildId, UserId, VoiceChannel, VoiceStateUpdate};

/// Options applied when establishing a voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Join self-deafened. The bot never listens, and deafened sessions are
    /// dropped less often.
    pub self_deaf: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self { self_deaf: true }
    }
}

/// A live voice session in one guild.
///
/// State accessors are observations: callers poll them and never cache the
/// answer beyond a single check.
#[async_trait]
pub trait VoiceConnection: Send + Sync + fmt::Debug {
    fn guild_id(&self) -> GuildId;

    /// The channel the session is bound to, or `None` once disconnected.
    fn channel_id(&self) -> Option<ChannelId>;

    fn is_connected(&self) -> bool;

    fn is_playing(&self) -> bool;

    /// Starts streaming `source`. Fails if something is already playing or
    /// the session is gone.
    fn play(&self, source: Box<dyn AudioSource>) -> Result<(), VoiceError>;

    /// Stops the current source, if any.
    fn stop(&self);

    /// Relocates the session to another channel in the same guild.
    async fn move_to(&self, channel: &VoiceChannel) -> Result<(), VoiceError>;

    /// Tears the session down. `force` skips the graceful leave handshake.
    async fn disconnect(&self, force: bool) -> Result<(), VoiceError>;
}

/// Directory lookups, lifecycle signals and voice primitives of the gateway.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// The bot's own user identity.
    fn bot_user_id(&self) -> UserId;

    /// Resolves once the gateway session is ready to serve requests.
    async fn wait_until_ready(&self);

    /// True once the gateway client has shut down.
    fn is_closed(&self) -> bool;

    /// All guilds the bot is a member of.
    fn guilds(&self) -> Vec<GuildId>;

    /// Resolves `channel` to a live voice channel within `guild`.
    fn resolve_channel(&self, guild: GuildId, channel: ChannelId) -> Option<VoiceChannel>;

    /// The bot's active voice session in `guild`, if any.
    fn voice_connection(&self, guild: GuildId) -> Option<Arc<dyn VoiceConnection>>;

    /// Establishes a new voice session in `channel`.
    async fn connect(
        &self,
        channel: &VoiceChannel,
        options: ConnectOptions,
    ) -> Result<Arc<dyn VoiceConnection>, VoiceError>;

    /// Voice-state-change notifications for every member the bot can see.
    fn subscribe_voice_states(&self) -> broadcast::Receiver<VoiceStateUpdate>;
}

/// Searches every known guild for the one containing `channel`.
pub fn locate_channel(gateway: &dyn VoiceGateway, channel: ChannelId) -> Option<VoiceChannel> {
    gateway
        .guilds()
        .into_iter()
        .find_map(|guild| gateway.resolve_channel(guild, channel))
}

/// True when any guild's active session is bound to `channel` and still
/// reports connected.
pub fn is_connected_to(gateway: &dyn VoiceGateway, channel: ChannelId) -> bool {
    gateway.guilds().into_iter().any(|guild| {
        gateway
            .voice_connection(guild)
            .is_some_and(|vc| vc.channel_id() == Some(channel) && vc.is_connected())
    })
}
