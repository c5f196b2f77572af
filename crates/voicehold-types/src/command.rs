//! Records exchanged with the command surface.

use crate::{ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};

/// The member invoking a command, as the command surface saw them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user_id: UserId,
    pub guild_id: GuildId,
    /// Whether the member holds the administrator permission in the guild.
    pub is_admin: bool,
    /// The voice channel the member is currently in, if any.
    pub voice_channel: Option<ChannelId>,
}

/// A reply to a command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub content: String,
    /// Ephemeral replies are only visible to the requester.
    pub ephemeral: bool,
}

impl CommandResponse {
    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }
}
