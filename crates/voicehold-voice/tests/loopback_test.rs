use voicehold_types::{ChannelId, GuildId, UserId, VoiceChannel};
use voicehold_voice::{
    is_connected_to, locate_channel, ConnectOptions, LoopbackGateway, SilenceSource,
    VoiceConnection, VoiceError, VoiceGateway, FRAME_SIZE,
};

const BOT: UserId = UserId(1);
const GUILD: GuildId = GuildId(10);

fn channel(id: u64, name: &str) -> VoiceChannel {
    VoiceChannel::new(ChannelId(id), GUILD, name)
}

fn gateway() -> LoopbackGateway {
    let gateway = LoopbackGateway::new(BOT);
    gateway.add_guild(GUILD, "test guild");
    gateway.add_channel(channel(100, "lounge"));
    gateway.add_channel(channel(101, "studio"));
    gateway
}

#[tokio::test]
async fn connect_emits_voice_state_for_the_bot() {
    let gateway = gateway();
    let mut events = gateway.subscribe_voice_states();

    let vc = gateway
        .connect(&channel(100, "lounge"), ConnectOptions { self_deaf: true })
        .await
        .expect("connect should succeed");

    assert!(vc.is_connected());
    assert_eq!(vc.channel_id(), Some(ChannelId(100)));

    let event = events.recv().await.expect("connect should emit an event");
    assert_eq!(event.user_id, BOT);
    assert_eq!(event.before, None);
    assert_eq!(event.after, Some(ChannelId(100)));

    let attempts = gateway.connect_attempts();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].succeeded);
    assert!(attempts[0].self_deaf);
    assert!(gateway
        .loopback_connection(GUILD)
        .expect("session should be tracked")
        .is_self_deaf());
}

#[tokio::test]
async fn second_connect_in_same_guild_is_rejected() {
    let gateway = gateway();
    gateway
        .connect(&channel(100, "lounge"), ConnectOptions::default())
        .await
        .expect("first connect should succeed");

    let err = gateway
        .connect(&channel(101, "studio"), ConnectOptions::default())
        .await
        .expect_err("second connect should fail");
    assert!(matches!(err, VoiceError::Connect(_)));
}

#[tokio::test]
async fn disconnect_clears_session_and_reports_drop() {
    let gateway = gateway();
    let vc = gateway
        .connect(&channel(100, "lounge"), ConnectOptions::default())
        .await
        .expect("connect should succeed");
    let mut events = gateway.subscribe_voice_states();

    vc.disconnect(true).await.expect("disconnect should succeed");

    assert!(!vc.is_connected());
    assert_eq!(vc.channel_id(), None);
    assert!(gateway.voice_connection(GUILD).is_none());

    let event = events.recv().await.expect("disconnect should emit an event");
    assert_eq!(event.before, Some(ChannelId(100)));
    assert!(event.is_disconnect());
}

#[tokio::test]
async fn move_relocates_session() {
    let gateway = gateway();
    let vc = gateway
        .connect(&channel(100, "lounge"), ConnectOptions::default())
        .await
        .expect("connect should succeed");

    vc.move_to(&channel(101, "studio"))
        .await
        .expect("move should succeed");

    assert_eq!(vc.channel_id(), Some(ChannelId(101)));
    assert!(is_connected_to(&gateway, ChannelId(101)));
    assert!(!is_connected_to(&gateway, ChannelId(100)));
}

#[tokio::test]
async fn playing_twice_is_an_error_until_stopped() {
    let gateway = gateway();
    let vc = gateway
        .connect(&channel(100, "lounge"), ConnectOptions::default())
        .await
        .expect("connect should succeed");

    vc.play(Box::new(SilenceSource::new()))
        .expect("first play should succeed");
    assert!(matches!(
        vc.play(Box::new(SilenceSource::new())),
        Err(VoiceError::Playback(_))
    ));

    let session = gateway.loopback_connection(GUILD).expect("session");
    assert_eq!(session.pull_frame(), Some(FRAME_SIZE));

    vc.stop();
    assert!(!vc.is_playing());
    assert_eq!(session.pull_frame(), None);
    vc.play(Box::new(SilenceSource::new()))
        .expect("play after stop should succeed");
}

#[tokio::test]
async fn removed_channel_cannot_be_located_or_joined() {
    let gateway = gateway();
    assert!(locate_channel(&gateway, ChannelId(101)).is_some());

    assert!(gateway.remove_channel(GUILD, ChannelId(101)));

    assert!(locate_channel(&gateway, ChannelId(101)).is_none());
    let err = gateway
        .connect(&channel(101, "studio"), ConnectOptions::default())
        .await
        .expect_err("connect to a deleted channel should fail");
    assert_eq!(err, VoiceError::ChannelNotFound(ChannelId(101)));
}

#[tokio::test]
async fn injected_connect_failures_are_consumed_in_order() {
    let gateway = gateway();
    gateway.fail_next_connects(2);

    for _ in 0..2 {
        assert!(gateway
            .connect(&channel(100, "lounge"), ConnectOptions::default())
            .await
            .is_err());
    }
    assert!(gateway
        .connect(&channel(100, "lounge"), ConnectOptions::default())
        .await
        .is_ok());

    let outcomes: Vec<bool> = gateway
        .connect_attempts()
        .iter()
        .map(|attempt| attempt.succeeded)
        .collect();
    assert_eq!(outcomes, vec![false, false, true]);
}

#[tokio::test]
async fn dropped_connect_returns_a_dead_session() {
    let gateway = gateway();
    let mut events = gateway.subscribe_voice_states();
    gateway.drop_next_connects(1);

    let vc = gateway
        .connect(&channel(100, "lounge"), ConnectOptions::default())
        .await
        .expect("connect itself succeeds");

    assert!(!vc.is_connected());
    assert!(gateway.voice_connection(GUILD).is_none());
    let joined = events.recv().await.expect("join event");
    assert_eq!(joined.after, Some(ChannelId(100)));
    let dropped = events.recv().await.expect("drop event");
    assert!(dropped.is_disconnect());

    let vc = gateway
        .connect(&channel(100, "lounge"), ConnectOptions::default())
        .await
        .expect("next connect is unaffected");
    assert!(vc.is_connected());
}

#[tokio::test]
async fn readiness_and_shutdown_signals() {
    let gateway = gateway();
    assert!(!gateway.is_closed());

    let waiter = {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.wait_until_ready().await })
    };
    gateway.mark_ready();
    waiter.await.expect("waiter should complete once ready");

    gateway.close();
    assert!(gateway.is_closed());
}
