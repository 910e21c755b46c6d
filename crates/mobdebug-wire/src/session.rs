use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec::{self, FrameCodec};
use crate::error::{Result, WireError};
use crate::message::{self, MessageKind};

/// Invoked with the debuggee's response to a request sent through
/// [`DebuggeeSession::send_with_callback`].
///
/// Runs on the session's read task; keep it short and hand work off through a
/// channel.
pub type ResponseCallback = Box<dyn FnOnce(Value) + Send>;

/// What a started session reports to its single consumer.
#[derive(Debug)]
pub enum DebuggeeNotification {
    Request(Value),
    Response(Value),
    Event(Value),
    /// The debuggee closed the connection.
    Closed,
    /// The connection was dropped because of a protocol or I/O error.
    Failed(WireError),
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// One debuggee connection: framing, JSON and response correlation.
///
/// Cheap to clone; all clones refer to the same connection.
#[derive(Clone)]
pub struct DebuggeeSession {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    peer: Option<SocketAddr>,
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    pending: Mutex<HashMap<i64, ResponseCallback>>,
    reader: Mutex<Option<BoxedReader>>,
    shutdown: CancellationToken,
}

impl fmt::Debug for DebuggeeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebuggeeSession")
            .field("id", &self.inner.id)
            .field("peer", &self.inner.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DebuggeeSession {
    /// Wrap a connected stream. Must be called from within a tokio runtime.
    ///
    /// Outgoing messages are written immediately; incoming data is not read
    /// until [`DebuggeeSession::start`].
    pub fn new<S>(stream: S, peer: Option<SocketAddr>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(write_loop(id, writer, outgoing_rx, shutdown.clone()));

        Self {
            inner: Arc::new(Inner {
                id,
                peer,
                outgoing,
                pending: Mutex::new(HashMap::new()),
                reader: Mutex::new(Some(Box::new(reader))),
                shutdown,
            }),
        }
    }

    /// Process-unique identifier, used to tell sessions apart in logs and to
    /// ignore notifications from a session that has been replaced.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer
    }

    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Number of requests still waiting for a correlated response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Begin reading and deliver every decoded message to `consumer`.
    ///
    /// Frames are delivered in arrival order. The stream ends with exactly one
    /// [`DebuggeeNotification::Closed`] or [`DebuggeeNotification::Failed`],
    /// unless the session is stopped locally first.
    pub fn start(&self, consumer: mpsc::UnboundedSender<DebuggeeNotification>) -> Result<()> {
        let reader = self
            .inner
            .reader
            .lock()
            .take()
            .ok_or(WireError::AlreadyStarted)?;
        tokio::spawn(read_loop(self.inner.clone(), reader, consumer));
        Ok(())
    }

    pub fn send(&self, message: &Value) -> Result<()> {
        self.write(message, None)
    }

    /// Send `message` and run `callback` with the first response whose
    /// `request_seq` equals the message's `seq`.
    ///
    /// Messages without a nonzero `seq` cannot be correlated; the callback is
    /// dropped for those.
    pub fn send_with_callback<F>(&self, message: &Value, callback: F) -> Result<()>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let key = message::seq(message).filter(|seq| *seq != 0);
        self.write(message, key.map(|key| (key, Box::new(callback) as ResponseCallback)))
    }

    /// Forward a client request as `{seq, type: "request", command, arguments}`.
    pub fn proxy(&self, seq: i64, command: &str, arguments: Option<Value>) -> Result<()> {
        self.send(&message::request(seq, command, arguments))
    }

    /// Forward a client `disconnect`; `callback` runs on the debuggee's
    /// acknowledgement.
    pub fn disconnect<F>(&self, seq: i64, arguments: Option<Value>, callback: F) -> Result<()>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let request = message::request(seq, "disconnect", arguments);
        self.write(&request, Some((seq, Box::new(callback))))
    }

    /// Close the connection. No further notifications are delivered and
    /// outstanding callbacks are dropped.
    pub fn stop(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        tracing::debug!(target: "mobdebug.wire", session = self.inner.id, "stopping debuggee session");
        self.inner.shutdown.cancel();
        self.inner.reader.lock().take();
        self.inner.pending.lock().clear();
    }

    fn write(&self, message: &Value, callback: Option<(i64, ResponseCallback)>) -> Result<()> {
        if self.is_closed() {
            return Err(WireError::ConnectionClosed);
        }
        let text = serde_json::to_string(message)?;

        // Registered before the write so a fast reply can't race past it.
        let registered = callback.map(|(seq, callback)| {
            self.inner.pending.lock().insert(seq, callback);
            seq
        });

        tracing::trace!(target: "mobdebug.wire", session = self.inner.id, message = %text, "-> debuggee");
        if self.inner.outgoing.send(codec::encode(&text)).is_err() {
            if let Some(seq) = registered {
                self.inner.pending.lock().remove(&seq);
            }
            return Err(WireError::ConnectionClosed);
        }
        Ok(())
    }
}

async fn write_loop<W>(
    session: u64,
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            // Flush what was queued before a stop.
            biased;
            frame = outgoing.recv() => {
                let Some(frame) = frame else { break };
                if let Err(err) = writer.write_all(&frame).await {
                    tracing::debug!(target: "mobdebug.wire", session, error = %err, "debuggee write failed");
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(
    inner: Arc<Inner>,
    mut reader: BoxedReader,
    consumer: mpsc::UnboundedSender<DebuggeeNotification>,
) {
    let mut codec = FrameCodec::new();
    let mut buf = vec![0u8; 8 * 1024];

    let outcome = loop {
        let read = tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            res = reader.read(&mut buf) => res,
        };
        let n = match read {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(err) => break Err(WireError::from(err)),
        };

        codec.append(&buf[..n]);
        if let Err(err) = drain(&inner, &mut codec, &consumer) {
            break Err(err);
        }
    };

    inner.shutdown.cancel();
    inner.pending.lock().clear();

    let notification = match outcome {
        Ok(()) => {
            tracing::info!(target: "mobdebug.wire", session = inner.id, "debuggee disconnected");
            DebuggeeNotification::Closed
        }
        Err(err) => {
            tracing::warn!(
                target: "mobdebug.wire",
                session = inner.id,
                anomalies = codec.anomalies(),
                error = %err,
                "dropping debuggee connection"
            );
            DebuggeeNotification::Failed(err)
        }
    };
    let _ = consumer.send(notification);
}

fn drain(
    inner: &Inner,
    codec: &mut FrameCodec,
    consumer: &mpsc::UnboundedSender<DebuggeeNotification>,
) -> Result<()> {
    while let Some(text) = codec.try_read_message()? {
        if inner.shutdown.is_cancelled() {
            return Ok(());
        }
        tracing::trace!(target: "mobdebug.wire", session = inner.id, message = %text, "<- debuggee");
        let message: Value = serde_json::from_str(&text)?;

        if let Some(request_seq) = message::request_seq(&message) {
            let callback = inner.pending.lock().remove(&request_seq);
            if let Some(callback) = callback {
                callback(message.clone());
            }
        }

        let notification = match MessageKind::of(&message) {
            Some(MessageKind::Request) => DebuggeeNotification::Request(message),
            Some(MessageKind::Response) => DebuggeeNotification::Response(message),
            Some(MessageKind::Event) => DebuggeeNotification::Event(message),
            None => {
                tracing::debug!(target: "mobdebug.wire", session = inner.id, "ignoring message without a known type");
                continue;
            }
        };
        let _ = consumer.send(notification);
    }
    Ok(())
}
