use thiserror::Error;
use voicehold_types::ChannelId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("voice connect failed: {0}")]
    Connect(String),

    #[error("voice move failed: {0}")]
    Move(String),

    #[error("voice disconnect failed: {0}")]
    Disconnect(String),

    #[error("playback error: {0}")]
    Playback(String),

    #[error("not connected to voice")]
    NotConnected,

    #[error("voice channel not found: {0}")]
    ChannelNotFound(ChannelId),
}
