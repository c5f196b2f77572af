//! Shared types for the voicehold workspace.
//!
//! This crate provides the identifiers and plain records exchanged between
//! the voice layer and the bot controller: guild, channel and user ids,
//! directory entries for voice channels, the voice-state-change event the
//! gateway delivers, and the request/response records of the command surface.
//!
//! Nothing here performs I/O. Every other crate in the workspace depends on
//! `voicehold-types` for cross-cutting definitions, which keeps the
//! dependency graph acyclic.

pub mod command;
pub mod voice;

pub use command::{CommandResponse, Requester};
pub use voice::{VoiceChannel, VoiceStateUpdate};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Returns the raw numeric id.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// Identifier of a guild (a server on the chat platform).
    GuildId
);

snowflake_id!(
    /// Identifier of a channel within a guild.
    ChannelId
);

snowflake_id!(
    /// Identifier of a platform user, including the bot's own identity.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_from_trimmed_strings() {
        assert_eq!(" 42 ".parse::<ChannelId>().unwrap(), ChannelId(42));
        assert!("abc".parse::<GuildId>().is_err());
    }

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&UserId(624715026669764620)).unwrap();
        assert_eq!(json, "624715026669764620");
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 624715026669764620);
    }
}
