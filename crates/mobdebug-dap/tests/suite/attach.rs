use serde_json::json;

use mobdebug_wire::mock::MockDebuggee;

use crate::harness::{wait_until, FakeBehavior, Fixture, TIMEOUT};

#[tokio::test]
async fn attach_waits_for_an_external_debuggee() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    fx.client.request("initialize", json!({})).await;
    fx.client.request("configurationDone", serde_json::Value::Null).await;

    let seq = fx
        .client
        .send(
            "attach",
            json!({ "listenPort": 0, "sourceBasePath": "/src", "stopOnEntry": true }),
        )
        .await;

    let registry = fx.registry.clone();
    wait_until(move || registry.local_addr("127.0.0.1", 0).is_some()).await;
    let addr = fx.registry.local_addr("127.0.0.1", 0).unwrap();
    let debuggee = MockDebuggee::connect(addr).await.unwrap();

    let response = fx.client.response(seq).await;
    assert_eq!(response["success"], true, "{response}");
    assert_eq!(response["command"], "attach");
    fx.client.event("initialized").await;

    let welcome = debuggee.wait_for_command("welcome", TIMEOUT).await.unwrap();
    assert_eq!(welcome["arguments"]["sourceBasePath"], "/src");
    assert_eq!(welcome["arguments"]["stopOnEntry"], true);
    assert!(welcome["arguments"].get("pathMap").is_none());

    // Attach never launches anything.
    assert!(fx.launcher.configs().is_empty());

    // The claim is released once the debuggee has arrived.
    let registry = fx.registry.clone();
    wait_until(move || !registry.is_listening("127.0.0.1", 0)).await;
}

#[tokio::test]
async fn disconnect_while_waiting_releases_the_listener() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    fx.client.request("initialize", json!({})).await;
    fx.client.request("configurationDone", serde_json::Value::Null).await;
    let attach = fx.client.send("attach", json!({ "listenPort": 0 })).await;

    let registry = fx.registry.clone();
    wait_until(move || registry.is_listening("127.0.0.1", 0)).await;

    let response = fx.client.request("disconnect", json!({})).await;
    assert_eq!(response["success"], true);
    assert!(!fx.registry.is_listening("127.0.0.1", 0));
    let abandoned = fx.client.response(attach).await;
    assert_eq!(abandoned["success"], false);
}

#[tokio::test]
async fn restarting_disconnect_still_frees_the_listener() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    fx.client.request("initialize", json!({})).await;
    fx.client.request("configurationDone", serde_json::Value::Null).await;
    let attach = fx.client.send("attach", json!({ "listenPort": 0 })).await;

    let registry = fx.registry.clone();
    wait_until(move || registry.is_listening("127.0.0.1", 0)).await;

    let response = fx.client.request("disconnect", json!({ "restart": true })).await;
    assert_eq!(response["success"], true);
    assert!(!fx.registry.is_listening("127.0.0.1", 0));
    let abandoned = fx.client.response(attach).await;
    assert_eq!(abandoned["success"], false);
}
