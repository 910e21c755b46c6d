use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::codec::{self, FrameCodec};
use crate::message::{self, MessageKind};

/// A scripted stand-in for the script-side debugger.
///
/// Connects to a debuggee listener, records every message it receives and
/// answers requests with a successful response so adapter tests can run
/// without a Lua runtime.
pub struct MockDebuggee {
    state: Arc<State>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: CancellationToken,
}

#[derive(Clone, Debug)]
pub struct MockDebuggeeConfig {
    /// Answer `disconnect` requests. When off the adapter has to fall back to
    /// its disconnect timeout.
    pub ack_disconnect: bool,
    /// Delay before any response is written.
    pub reply_delay: Duration,
}

impl Default for MockDebuggeeConfig {
    fn default() -> Self {
        Self {
            ack_disconnect: true,
            reply_delay: Duration::ZERO,
        }
    }
}

struct State {
    config: MockDebuggeeConfig,
    received: Mutex<Vec<Value>>,
    changed: Notify,
    next_seq: AtomicI64,
    peer_closed: CancellationToken,
}

impl State {
    fn alloc_seq(&self) -> i64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, message: Value) {
        self.received.lock().push(message);
        self.changed.notify_waiters();
    }
}

impl MockDebuggee {
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        Self::connect_with_config(addr, MockDebuggeeConfig::default()).await
    }

    pub async fn connect_with_config(
        addr: SocketAddr,
        config: MockDebuggeeConfig,
    ) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();

        let state = Arc::new(State {
            config,
            received: Mutex::new(Vec::new()),
            changed: Notify::new(),
            next_seq: AtomicI64::new(1),
            peer_closed: CancellationToken::new(),
        });
        let shutdown = CancellationToken::new();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(writer, outgoing_rx, shutdown.clone()));
        tokio::spawn(read_loop(
            reader,
            state.clone(),
            outgoing.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            state,
            outgoing,
            shutdown,
        })
    }

    /// Everything received so far, in arrival order.
    pub fn received(&self) -> Vec<Value> {
        self.state.received.lock().clone()
    }

    /// Wait until a request with `command` has been received.
    pub async fn wait_for_command(&self, command: &str, timeout: Duration) -> Option<Value> {
        let find = || {
            self.state
                .received
                .lock()
                .iter()
                .find(|message| message::command(message) == Some(command))
                .cloned()
        };
        let wait = async {
            loop {
                let changed = self.state.changed.notified();
                if let Some(found) = find() {
                    return found;
                }
                changed.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }

    /// Emit `{seq, type: "event", event, body}` to the adapter.
    pub fn send_event(&self, event: &str, body: Value) {
        let message = json!({
            "seq": self.state.alloc_seq(),
            "type": "event",
            "event": event,
            "body": body,
        });
        let _ = self.outgoing.send(codec::encode(&message.to_string()));
    }

    /// Write raw bytes, bypassing framing.
    pub fn send_raw(&self, bytes: &[u8]) {
        let _ = self.outgoing.send(bytes.to_vec());
    }

    /// Resolves once the adapter has closed the connection.
    pub async fn closed(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.state.peer_closed.cancelled())
            .await
            .is_ok()
    }

    /// Drop the connection as a crashing debuggee would.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for MockDebuggee {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn write_loop(
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = outgoing.recv() => {
                let Some(frame) = frame else { break };
                if writer.write_all(&frame).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    state: Arc<State>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: CancellationToken,
) {
    let mut codec = FrameCodec::new();
    let mut buf = [0u8; 4096];

    'read: loop {
        let read = tokio::select! {
            _ = shutdown.cancelled() => return,
            res = reader.read(&mut buf) => res,
        };
        let n = match read {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        codec.append(&buf[..n]);

        loop {
            let text = match codec.try_read_message() {
                Ok(Some(text)) => text,
                Ok(None) => break,
                Err(_) => break 'read,
            };
            let Ok(message) = serde_json::from_str::<Value>(&text) else {
                break 'read;
            };
            let reply = reply_for(&state, &message);
            state.record(message);

            if let Some(reply) = reply {
                let frame = codec::encode(&reply.to_string());
                let delay = state.config.reply_delay;
                if delay.is_zero() {
                    let _ = outgoing.send(frame);
                } else {
                    let outgoing = outgoing.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = outgoing.send(frame);
                    });
                }
            }
        }
    }

    state.peer_closed.cancel();
    state.changed.notify_waiters();
}

fn reply_for(state: &State, message: &Value) -> Option<Value> {
    if MessageKind::of(message) != Some(MessageKind::Request) {
        return None;
    }
    // The welcome handshake is fire-and-forget.
    let seq = message::seq(message).filter(|seq| *seq != 0)?;
    let command = message::command(message).unwrap_or_default();
    if command == "disconnect" && !state.config.ack_disconnect {
        return None;
    }

    let body = match command {
        "threads" => json!({ "threads": [{ "id": 1, "name": "main" }] }),
        "stackTrace" => json!({ "stackFrames": [], "totalFrames": 0 }),
        _ => json!({}),
    };
    Some(json!({
        "seq": state.alloc_seq(),
        "type": "response",
        "request_seq": seq,
        "command": command,
        "success": true,
        "body": body,
    }))
}
