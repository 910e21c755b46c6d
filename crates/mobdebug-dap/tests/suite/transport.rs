use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use mobdebug_dap::dap_tokio::{DapReader, DapWriter};
use mobdebug_dap::server::TcpServer;
use mobdebug_dap::BridgeContext;
use mobdebug_wire::ListenerRegistry;

use crate::harness::{FakeBehavior, FakeLauncher, TIMEOUT};

fn context() -> BridgeContext {
    BridgeContext::new(ListenerRegistry::new(), FakeLauncher::new(FakeBehavior::Idle))
}

async fn initialize<S>(stream: S)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    let mut reader = DapReader::new(read);
    let mut writer = DapWriter::new(write);
    writer
        .write_value(&json!({ "seq": 1, "type": "request", "command": "initialize", "arguments": {} }))
        .await
        .unwrap();
    let response = tokio::time::timeout(TIMEOUT, reader.read_value())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(response["request_seq"], 1);
    assert_eq!(response["success"], true);
}

#[tokio::test]
async fn tcp_server_gives_each_client_a_bridge() {
    let server = TcpServer::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(server.serve(context(), shutdown.clone()));

    let first = tokio::net::TcpStream::connect(addr).await.unwrap();
    let second = tokio::net::TcpStream::connect(addr).await.unwrap();
    initialize(first).await;
    initialize(second).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn unix_socket_server_serves_and_cleans_up() {
    use mobdebug_dap::server::PipeServer;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dap.sock");
    let server = PipeServer::bind(&path).unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(server.serve(context(), shutdown.clone()));

    let stream = tokio::net::UnixStream::connect(&path).await.unwrap();
    initialize(stream).await;

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(!path.exists());
}
