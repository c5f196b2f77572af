//! Connection watchdog reconciliation.

mod common;

use common::{settle, Harness, GUILD, LOUNGE, STUDIO};
use std::time::Duration;
use tokio::time::sleep;
use voicehold_bot::{ReconnectOutcome, TickOutcome};
use voicehold_voice::VoiceGateway;

#[tokio::test(start_paused = true)]
async fn tick_is_idle_without_intent() {
    let h = Harness::new();
    assert_eq!(h.state.watchdog().tick().await, TickOutcome::Idle);
}

#[tokio::test(start_paused = true)]
async fn tick_is_quiet_after_manual_leave() {
    let h = Harness::new();
    h.state.controller.join(&h.owner_in(Some(LOUNGE))).await;
    h.state.controller.leave(&h.owner_in(None)).await;

    // manual_leave clears the desired channel, so the tick has nothing to do.
    assert_eq!(h.state.watchdog().tick().await, TickOutcome::Idle);
    assert_eq!(h.gateway.connect_attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn tick_accepts_consistent_state() {
    let h = Harness::new();
    h.state.controller.join(&h.owner_in(Some(LOUNGE))).await;

    assert_eq!(h.state.watchdog().tick().await, TickOutcome::Consistent);
    assert_eq!(h.gateway.connect_attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn tick_repairs_missed_disconnect() {
    let h = Harness::new();
    h.state.controller.join(&h.owner_in(Some(LOUNGE))).await;
    // No reactor is running, so only the watchdog can notice this.
    h.gateway.drop_connection(GUILD);

    let outcome = h.state.watchdog().tick().await;

    assert_eq!(
        outcome,
        TickOutcome::Reconnect(ReconnectOutcome::Reconnected { attempts: 1 })
    );
    let vc = h.gateway.voice_connection(GUILD).expect("session restored");
    assert_eq!(vc.channel_id(), Some(LOUNGE));
}

#[tokio::test(start_paused = true)]
async fn tick_treats_session_in_wrong_channel_as_mismatch() {
    let h = Harness::new();
    h.state.controller.join(&h.owner_in(Some(LOUNGE))).await;
    let vc = h.gateway.voice_connection(GUILD).expect("session");
    vc.move_to(
        &h.gateway
            .resolve_channel(GUILD, STUDIO)
            .expect("studio exists"),
    )
    .await
    .expect("move should succeed");

    let outcome = h.state.watchdog().tick().await;

    assert_eq!(
        outcome,
        TickOutcome::Reconnect(ReconnectOutcome::Reconnected { attempts: 1 })
    );
    let vc = h.gateway.voice_connection(GUILD).expect("session");
    assert_eq!(vc.channel_id(), Some(LOUNGE));
}

#[tokio::test(start_paused = true)]
async fn tick_reports_vanished_channel_and_keeps_intent() {
    let h = Harness::new();
    h.state.controller.join(&h.owner_in(Some(LOUNGE))).await;
    h.gateway.drop_connection(GUILD);
    h.gateway.remove_channel(GUILD, LOUNGE);

    assert_eq!(
        h.state.watchdog().tick().await,
        TickOutcome::ChannelVanished(LOUNGE)
    );
    assert_eq!(h.state.intent.desired_channel(), Some(LOUNGE));
    assert_eq!(h.gateway.connect_attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn tick_defers_to_running_sequence() {
    let h = Harness::new();
    h.state.controller.join(&h.owner_in(Some(LOUNGE))).await;
    h.gateway.drop_connection(GUILD);
    let running = h
        .state
        .policy
        .spawn_reconnect(GUILD, LOUNGE)
        .expect("slot should be free");

    assert_eq!(
        h.state.watchdog().tick().await,
        TickOutcome::Reconnect(ReconnectOutcome::AlreadyInProgress)
    );

    running.await.unwrap();
    assert_eq!(h.successful_connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_waits_for_readiness_and_stops_on_close() {
    let h = Harness::new();
    h.state.controller.join(&h.owner_in(Some(LOUNGE))).await;
    h.gateway.drop_connection(GUILD);

    let watchdog = tokio::spawn(h.state.watchdog().run());

    sleep(Duration::from_secs(30)).await;
    assert_eq!(
        h.gateway.connect_attempts().len(),
        1,
        "watchdog must not tick before the gateway is ready"
    );

    h.gateway.mark_ready();
    assert!(
        settle(|| h.state.intent.is_reconnecting()).await,
        "first tick should run as soon as the gateway is ready"
    );
    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.successful_connects(), 2);

    h.gateway.close();
    sleep(Duration::from_secs(10)).await;
    assert!(watchdog.is_finished());
}

#[tokio::test(start_paused = true)]
async fn run_keeps_ticking_through_failed_recoveries() {
    let h = Harness::new();
    h.state.controller.join(&h.owner_in(Some(LOUNGE))).await;
    h.gateway.drop_connection(GUILD);
    // First sequence exhausts, a later tick recovers.
    h.gateway.fail_next_connects(5);
    h.gateway.mark_ready();

    let watchdog = tokio::spawn(h.state.watchdog().run());

    sleep(Duration::from_secs(31)).await;
    assert_eq!(h.successful_connects(), 1, "first sequence exhausted");

    sleep(Duration::from_secs(10)).await;
    assert_eq!(h.successful_connects(), 2, "next tick recovered the session");

    h.gateway.close();
    watchdog.abort();
}
