use thiserror::Error;
use voicehold_types::ChannelId;
use voicehold_voice::VoiceError;

/// Failures surfaced by the join/leave handlers.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("voice channel {0} not found")]
    ChannelMissing(ChannelId),

    #[error("connection to channel {0} did not report connected")]
    ConnectionUnverified(ChannelId),

    #[error(transparent)]
    Voice(#[from] VoiceError),
}
