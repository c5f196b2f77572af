//! Voice channel directory entries and voice-state events.

use crate::{ChannelId, GuildId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A live voice channel resolved from the gateway's guild directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceChannel {
    /// Channel id.
    pub id: ChannelId,
    /// Guild the channel belongs to.
    pub guild_id: GuildId,
    /// Human-readable channel name.
    pub name: String,
}

impl VoiceChannel {
    pub fn new(id: ChannelId, guild_id: GuildId, name: impl Into<String>) -> Self {
        Self {
            id,
            guild_id,
            name: name.into(),
        }
    }

    /// Renders the channel the way user-facing messages refer to it.
    pub fn mention(&self) -> String {
        format!("<#{}>", self.id)
    }
}

impl fmt::Display for VoiceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Notification that a member's voice state changed.
///
/// `before` and `after` carry the channel the member was in on each side of
/// the transition; `None` means "not in any voice channel".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceStateUpdate {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub before: Option<ChannelId>,
    pub after: Option<ChannelId>,
}

impl VoiceStateUpdate {
    /// True when the member left voice entirely.
    pub fn is_disconnect(&self) -> bool {
        self.after.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_uses_channel_markup() {
        let channel = VoiceChannel::new(ChannelId(7), GuildId(1), "lounge");
        assert_eq!(channel.mention(), "<#7>");
        assert_eq!(channel.to_string(), "lounge (7)");
    }

    #[test]
    fn disconnect_means_no_after_channel() {
        let update = VoiceStateUpdate {
            user_id: UserId(1),
            guild_id: GuildId(2),
            before: Some(ChannelId(3)),
            after: None,
        };
        assert!(update.is_disconnect());
    }
}
