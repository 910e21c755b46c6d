use std::time::{Duration, Instant};

use serde_json::{json, Value};

use mobdebug_config::{LaunchMode, DEFAULT_DEBUGGEE_PORT};
use mobdebug_process::OutputCategory;
use mobdebug_wire::mock::MockDebuggeeConfig;

use crate::harness::{fast_options, wait_until, FakeBehavior, Fixture, TIMEOUT};

#[tokio::test]
async fn launch_without_configuration_done_proceeds_after_timeout() {
    let mut fx = Fixture::new(FakeBehavior::ConnectDebuggee(MockDebuggeeConfig::default()));
    fx.client.request("initialize", json!({})).await;

    let started = Instant::now();
    let seq = fx
        .client
        .send(
            "launch",
            json!({ "interpreter": "lua", "arguments": ["main.lua"], "listenPort": 0 }),
        )
        .await;
    let response = fx.client.response(seq).await;
    assert_eq!(response["success"], true, "{response}");
    assert!(started.elapsed() >= fast_options().configuration_timeout);

    fx.client.event("initialized").await;

    let configs = fx.launcher.configs();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].launch_mode, LaunchMode::Interpreter("lua".into()));
    assert_eq!(configs[0].launch_arguments, vec!["main.lua".to_string()]);
    assert_ne!(configs[0].debuggee_port, 0);
}

#[tokio::test]
async fn configuration_done_releases_a_waiting_launch() {
    let mut options = fast_options();
    options.configuration_timeout = Duration::from_secs(60);
    let mut fx = Fixture::with_options(
        FakeBehavior::ConnectDebuggee(MockDebuggeeConfig::default()),
        options,
    );
    fx.client.request("initialize", json!({})).await;

    let launch = fx.client.send("launch", json!({ "listenPort": 0 })).await;
    let done = fx.client.request("configurationDone", Value::Null).await;
    assert_eq!(done["success"], true);

    let response = fx.client.response(launch).await;
    assert_eq!(response["success"], true, "{response}");
    fx.client.event("initialized").await;
}

#[tokio::test]
async fn debuggee_receives_welcome() {
    let mut fx = Fixture::new(FakeBehavior::ConnectDebuggee(MockDebuggeeConfig::default()));
    let response = fx
        .launch(json!({
            "workingDirectory": "/work",
            "stopOnEntry": false,
            "pathMap": { "/remote": "/work" },
        }))
        .await;
    assert_eq!(response["success"], true, "{response}");

    let debuggee = fx.launcher.debuggee().await;
    let welcome = debuggee.wait_for_command("welcome", TIMEOUT).await.unwrap();
    let arguments = &welcome["arguments"];
    assert_eq!(arguments["stopOnEntry"], false);
    assert_eq!(arguments["sourceBasePath"], "/work");
    assert_eq!(arguments["pathMap"], json!({ "/remote": "/work" }));
    assert_eq!(
        arguments["directorySeperator"],
        std::path::MAIN_SEPARATOR_STR
    );
}

#[tokio::test]
async fn process_output_becomes_output_events() {
    let mut fx = Fixture::new(FakeBehavior::ConnectDebuggee(MockDebuggeeConfig::default()));
    fx.launch(json!({})).await;

    let started = fx.client.event("output").await;
    assert_eq!(started["body"]["category"], "console");
    assert_eq!(started["body"]["output"], "Process started\n");

    fx.launcher.print(OutputCategory::Stdout, "hello");
    let stdout = fx.client.event("output").await;
    assert_eq!(stdout["body"], json!({ "category": "stdout", "output": "hello" }));

    fx.launcher.print(OutputCategory::Stderr, "oops\n");
    let stderr = fx.client.event("output").await;
    assert_eq!(stderr["body"], json!({ "category": "stderr", "output": "oops\n" }));
}

#[tokio::test]
async fn no_debug_launch_terminates_immediately() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    let response = fx.launch(json!({ "noDebug": true })).await;
    assert_eq!(response["success"], true, "{response}");
    fx.client.event("terminated").await;

    assert_eq!(fx.launcher.configs().len(), 1);
    assert!(fx.launcher.configs()[0].no_debug);
    assert!(!fx.registry.is_listening("127.0.0.1", 0));
    assert!(!fx.registry.is_listening("127.0.0.1", DEFAULT_DEBUGGEE_PORT));

    fx.launcher.exit(Some(0));
    let exited = fx.client.event("exited").await;
    assert_eq!(exited["body"]["exitCode"], 0);
    fx.client.drain(Duration::from_millis(100)).await;
    assert_eq!(fx.client.count_events("terminated"), 1);
}

#[tokio::test]
async fn process_exit_before_debuggee_fails_the_launch() {
    let mut fx = Fixture::new(FakeBehavior::Exit(Some(3)));
    let response = fx.launch(json!({})).await;
    assert_eq!(response["success"], false, "{response}");

    let exited = fx.client.event("exited").await;
    assert_eq!(exited["body"]["exitCode"], 3);
    fx.client.event("terminated").await;

    let registry = fx.registry.clone();
    wait_until(move || !registry.is_listening("127.0.0.1", 0)).await;
}

#[tokio::test]
async fn spawn_failure_reports_no_exit_code() {
    let mut fx = Fixture::new(FakeBehavior::Exit(None));
    let response = fx.launch(json!({})).await;
    assert_eq!(response["success"], false);
    fx.client.event("terminated").await;
    assert_eq!(fx.client.count_events("exited"), 0);
}

#[tokio::test]
async fn occupied_port_fails_the_launch() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let mut fx = Fixture::new(FakeBehavior::Idle);
    let response = fx.launch(json!({ "listenPort": port })).await;
    assert_eq!(response["success"], false);
    assert!(
        response["message"].as_str().unwrap().contains("failed to listen"),
        "{response}"
    );
    fx.client.event("terminated").await;
    assert!(fx.launcher.configs().is_empty());
}

#[tokio::test]
async fn invalid_arguments_fail_the_launch() {
    let mut fx = Fixture::new(FakeBehavior::Idle);
    let response = fx.launch(json!({ "stopOnEntry": "yes" })).await;
    assert_eq!(response["success"], false);
    assert!(response["message"].as_str().unwrap().starts_with("invalid launch arguments"));
}

#[tokio::test]
async fn second_launch_is_rejected_while_running() {
    let mut fx = Fixture::new(FakeBehavior::ConnectDebuggee(MockDebuggeeConfig::default()));
    fx.launch(json!({})).await;

    let again = fx.client.request("launch", json!({ "listenPort": 0 })).await;
    assert_eq!(again["success"], false);
    assert_eq!(fx.launcher.configs().len(), 1);
}

#[tokio::test]
async fn process_exit_while_attached_ends_the_run() {
    let mut fx = Fixture::new(FakeBehavior::ConnectDebuggee(MockDebuggeeConfig::default()));
    fx.launch(json!({})).await;
    let debuggee = fx.launcher.debuggee().await;

    fx.launcher.exit(Some(0));
    let exited = fx.client.event("exited").await;
    assert_eq!(exited["body"]["exitCode"], 0);
    fx.client.event("terminated").await;
    assert!(debuggee.closed(TIMEOUT).await);

    fx.client.drain(Duration::from_millis(100)).await;
    assert_eq!(fx.client.count_events("terminated"), 1);
}
