//! Voice layer for voicehold.
//!
//! Defines the capability interface for playable audio, the synthetic
//! silence source used to keep sessions alive, the gateway collaborator
//! traits the controller consumes, and the per-connection keep-alive loop.
//!
//! The platform silently drops voice sessions that stop sending audio, so
//! every live session is paired with a [`KeepAliveLoop`] that restarts
//! silence playback whenever the session goes quiet.
//!
//! [`LoopbackGateway`] is an in-process implementation of the gateway
//! traits, used by the binary's console mode and by tests.

pub mod error;
pub mod gateway;
pub mod keepalive;
pub mod loopback;
pub mod source;

pub use error::VoiceError;
pub use gateway::{is_connected_to, locate_channel, ConnectOptions, VoiceConnection, VoiceGateway};
pub use keepalive::{
    KeepAliveLoop, KeepAliveRegistry, KeepAliveReport, SourceFactory, DEFAULT_KEEPALIVE_INTERVAL,
};
pub use loopback::{ConnectAttempt, LoopbackConnection, LoopbackGateway};
pub use source::{AudioSource, SilenceSource, FRAME_SIZE};
