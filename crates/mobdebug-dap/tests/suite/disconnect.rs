use std::time::{Duration, Instant};

use serde_json::{json, Value};

use mobdebug_wire::mock::MockDebuggeeConfig;

use crate::harness::{fast_options, FakeBehavior, Fixture, TIMEOUT};

async fn attached(config: MockDebuggeeConfig) -> Fixture {
    let mut fx = Fixture::new(FakeBehavior::ConnectDebuggee(config));
    let response = fx.launch(json!({})).await;
    assert_eq!(response["success"], true, "{response}");
    fx.client.event("initialized").await;
    fx
}

#[tokio::test]
async fn terminate_debuggee_kills_and_responds_once() {
    let mut fx = attached(MockDebuggeeConfig::default()).await;
    let debuggee = fx.launcher.debuggee().await;

    let seq = fx.client.send("disconnect", json!({ "terminateDebuggee": true })).await;
    let response = fx.client.response(seq).await;
    assert_eq!(response["success"], true);
    assert_eq!(fx.launcher.disposals(), vec![true]);
    assert!(debuggee.closed(TIMEOUT).await);

    fx.client.drain(Duration::from_millis(200)).await;
    assert_eq!(fx.client.count_responses(seq), 1);
    assert_eq!(fx.client.count_events("terminated"), 0);
    // A killed debuggee gets no disconnect request of its own.
    assert!(debuggee.wait_for_command("disconnect", Duration::from_millis(50)).await.is_none());
}

#[tokio::test]
async fn acknowledged_disconnect_detaches() {
    let mut fx = attached(MockDebuggeeConfig::default()).await;
    let debuggee = fx.launcher.debuggee().await;

    let seq = fx.client.send("disconnect", json!({ "restart": false })).await;
    let forwarded = debuggee.wait_for_command("disconnect", TIMEOUT).await.unwrap();
    assert_eq!(forwarded["seq"], seq);
    assert_eq!(forwarded["arguments"]["restart"], false);

    let response = fx.client.response(seq).await;
    assert_eq!(response["success"], true);
    assert_eq!(response["command"], "disconnect");
    assert_eq!(fx.launcher.disposals(), vec![false]);
    assert!(debuggee.closed(TIMEOUT).await);

    fx.client.drain(Duration::from_millis(200)).await;
    assert_eq!(fx.client.count_responses(seq), 1);
}

#[tokio::test]
async fn unacknowledged_disconnect_times_out() {
    let mut fx = attached(MockDebuggeeConfig {
        ack_disconnect: false,
        ..MockDebuggeeConfig::default()
    })
    .await;
    let debuggee = fx.launcher.debuggee().await;

    let started = Instant::now();
    let seq = fx.client.send("disconnect", json!({})).await;
    let response = fx.client.response(seq).await;
    assert_eq!(response["success"], true);
    assert!(started.elapsed() >= fast_options().disconnect_timeout);
    assert_eq!(fx.launcher.disposals(), vec![false]);
    assert!(debuggee.closed(TIMEOUT).await);

    fx.client.drain(Duration::from_millis(200)).await;
    assert_eq!(fx.client.count_responses(seq), 1);
}

#[tokio::test]
async fn ack_racing_the_timer_still_answers_once() {
    let mut options = fast_options();
    options.disconnect_timeout = Duration::from_millis(50);
    let mut fx = Fixture::with_options(
        FakeBehavior::ConnectDebuggee(MockDebuggeeConfig {
            ack_disconnect: true,
            reply_delay: Duration::from_millis(50),
        }),
        options,
    );
    let response = fx.launch(json!({})).await;
    assert_eq!(response["success"], true);

    let seq = fx.client.send("disconnect", json!({})).await;
    fx.client.response(seq).await;
    fx.client.drain(Duration::from_millis(300)).await;
    assert_eq!(fx.client.count_responses(seq), 1);
}

#[tokio::test]
async fn debuggee_closing_during_disconnect_completes_it() {
    let mut options = fast_options();
    options.disconnect_timeout = Duration::from_secs(60);
    let mut fx = Fixture::with_options(
        FakeBehavior::ConnectDebuggee(MockDebuggeeConfig {
            ack_disconnect: false,
            ..MockDebuggeeConfig::default()
        }),
        options,
    );
    fx.launch(json!({})).await;
    let debuggee = fx.launcher.debuggee().await;

    let seq = fx.client.send("disconnect", json!({})).await;
    debuggee.wait_for_command("disconnect", TIMEOUT).await.unwrap();
    debuggee.close();

    let response = fx.client.response(seq).await;
    assert_eq!(response["success"], true);
    fx.client.drain(Duration::from_millis(100)).await;
    assert_eq!(fx.client.count_events("terminated"), 0);
}

#[tokio::test]
async fn disconnect_with_only_a_process_detaches_it() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    fx.launch(json!({ "noDebug": true })).await;

    let response = fx.client.request("disconnect", json!({})).await;
    assert_eq!(response["success"], true);
    assert_eq!(fx.launcher.disposals(), vec![false]);
}

#[tokio::test]
async fn disconnect_before_launch_just_responds() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    fx.client.request("initialize", json!({})).await;
    let response = fx.client.request("disconnect", Value::Null).await;
    assert_eq!(response["success"], true);
    assert!(fx.launcher.disposals().is_empty());
}

#[tokio::test]
async fn requests_after_disconnect_are_refused() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    fx.client.request("initialize", json!({})).await;
    fx.client.request("disconnect", json!({})).await;

    let threads = fx.client.request("threads", Value::Null).await;
    assert_eq!(threads["success"], false);
    assert_eq!(threads["message"], "debug session has terminated");

    let again = fx.client.request("disconnect", json!({})).await;
    assert_eq!(again["success"], true);
}
