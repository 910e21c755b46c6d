use serde_json::{json, Value};

use crate::harness::{FakeBehavior, Fixture};

#[tokio::test]
async fn initialize_reports_capabilities() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    let response = fx.client.request("initialize", json!({ "adapterID": "lua" })).await;

    assert_eq!(response["success"], true);
    assert_eq!(response["command"], "initialize");
    let body = &response["body"];
    assert_eq!(body["supportsConfigurationDoneRequest"], true);
    assert_eq!(body["supportsConditionalBreakpoints"], true);
    assert_eq!(body["supportsHitConditionalBreakpoints"], true);
    assert_eq!(body["supportsLogPoints"], true);
    assert_eq!(body["supportsSetVariable"], true);
    assert_eq!(body["supportsEvaluateForHovers"], true);
    assert_eq!(body["supportsStepBack"], false);
    assert_eq!(body["supportsFunctionBreakpoints"], false);

    // `initialized` waits for a debuggee.
    assert_eq!(fx.client.count_events("initialized"), 0);
    fx.client.close().await.unwrap();
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    let response = fx.client.request("restartFrame", json!({ "frameId": 1 })).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["message"], "unrecognized request restartFrame");
}

#[tokio::test]
async fn proxied_request_without_debuggee_fails() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    fx.client.request("initialize", json!({})).await;

    let response = fx.client.request("threads", Value::Null).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["message"], "no debuggee attached");

    let done = fx.client.request("configurationDone", Value::Null).await;
    assert_eq!(done["success"], true);
}

#[tokio::test]
async fn responses_are_numbered_by_the_adapter() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    let first = fx.client.request("initialize", json!({})).await;
    let second = fx.client.request("threads", Value::Null).await;
    let first_seq = first["seq"].as_i64().unwrap();
    let second_seq = second["seq"].as_i64().unwrap();
    assert!(first_seq >= 1);
    assert!(second_seq > first_seq);
}

#[tokio::test]
async fn client_eof_ends_the_bridge() {
    let fx = Fixture::new(FakeBehavior::Idle);
    fx.client.close().await.unwrap();
}
