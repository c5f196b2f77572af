//! Shared fixtures for the bot integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use voicehold_bot::config::Config;
use voicehold_bot::BotState;
use voicehold_types::{ChannelId, GuildId, Requester, UserId, VoiceChannel};
use voicehold_voice::LoopbackGateway;

pub const BOT: UserId = UserId(1);
pub const OWNER: UserId = UserId(624715026669764620);
pub const STRANGER: UserId = UserId(99);
pub const GUILD: GuildId = GuildId(10);
pub const LOUNGE: ChannelId = ChannelId(100);
pub const STUDIO: ChannelId = ChannelId(101);

pub struct Harness {
    pub gateway: LoopbackGateway,
    pub state: BotState,
}

impl Harness {
    pub fn new() -> Self {
        let gateway = LoopbackGateway::new(BOT);
        gateway.add_guild(GUILD, "test guild");
        gateway.add_channel(VoiceChannel::new(LOUNGE, GUILD, "lounge"));
        gateway.add_channel(VoiceChannel::new(STUDIO, GUILD, "studio"));

        let mut config = Config::default();
        config.bot.user_id = BOT;
        config.bot.allowed_user_ids = vec![OWNER];

        let state = BotState::new(Arc::new(gateway.clone()), &config);
        Self { gateway, state }
    }

    pub fn owner_in(&self, channel: Option<ChannelId>) -> Requester {
        Requester {
            user_id: OWNER,
            guild_id: GUILD,
            is_admin: false,
            voice_channel: channel,
        }
    }

    pub fn stranger_in(&self, channel: Option<ChannelId>) -> Requester {
        Requester {
            user_id: STRANGER,
            guild_id: GUILD,
            is_admin: false,
            voice_channel: channel,
        }
    }

    pub fn successful_connects(&self) -> usize {
        self.gateway
            .connect_attempts()
            .iter()
            .filter(|attempt| attempt.succeeded)
            .count()
    }

    pub fn assert_intent_consistent(&self) {
        assert!(
            self.state.intent.snapshot().is_consistent(),
            "manual_leave set while a channel is still desired"
        );
    }
}

/// Yields until `condition` holds, without letting the paused clock move.
pub async fn settle(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..16 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
