use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::Poll;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, WireError};
use crate::session::DebuggeeSession;

/// Accepts debuggee connections on one address.
///
/// Each accepted connection is wrapped in a [`DebuggeeSession`] and handed to
/// the oldest live subscriber. Connections nobody is waiting for are closed
/// right away.
#[derive(Clone)]
pub struct DebuggeeListener {
    inner: Arc<Inner>,
}

struct Inner {
    local_addr: SocketAddr,
    /// Taken out (and so closed) by [`DebuggeeListener::stop`].
    socket: Mutex<Option<TcpListener>>,
    waiters: Mutex<VecDeque<oneshot::Sender<DebuggeeSession>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for DebuggeeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggeeListener")
            .field("local_addr", &self.inner.local_addr)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl DebuggeeListener {
    /// Bind `address:port` and start accepting. Port `0` picks a free port.
    ///
    /// Binding is synchronous so callers learn about conflicts immediately.
    /// Must be called from within a tokio runtime.
    pub fn bind(address: &str, port: u16) -> Result<Self> {
        let addr = format!("{address}:{port}");
        let bind_error = |source| WireError::Bind {
            addr: addr.clone(),
            source,
        };

        let std_listener = std::net::TcpListener::bind(&addr).map_err(bind_error)?;
        std_listener.set_nonblocking(true).map_err(bind_error)?;
        let listener = TcpListener::from_std(std_listener).map_err(bind_error)?;
        let local_addr = listener.local_addr()?;

        tracing::info!(target: "mobdebug.wire", %local_addr, "debuggee listener started");

        let inner = Arc::new(Inner {
            local_addr,
            socket: Mutex::new(Some(listener)),
            waiters: Mutex::new(VecDeque::new()),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(accept_loop(inner.clone()));

        Ok(Self { inner })
    }

    /// The bound address, with a wildcard port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Wait for the next connection not taken by an earlier subscriber.
    pub fn subscribe(&self) -> oneshot::Receiver<DebuggeeSession> {
        let (tx, rx) = oneshot::channel();
        self.inner.waiters.lock().push_back(tx);
        rx
    }

    /// Close the listening socket. Sessions already handed out keep running.
    ///
    /// The port is free again once this returns.
    pub fn stop(&self) {
        let Some(socket) = self.inner.socket.lock().take() else {
            return;
        };
        drop(socket);
        tracing::info!(target: "mobdebug.wire", local_addr = %self.inner.local_addr, "debuggee listener stopped");
        self.inner.shutdown.cancel();
        self.inner.waiters.lock().clear();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl Inner {
    /// Resolves to `None` once the socket has been taken by `stop`.
    async fn accept(&self) -> Option<io::Result<(TcpStream, SocketAddr)>> {
        poll_fn(|cx| match self.socket.lock().as_ref() {
            Some(socket) => socket.poll_accept(cx).map(Some),
            None => Poll::Ready(None),
        })
        .await
    }

    fn publish(&self, session: DebuggeeSession) {
        let mut session = Some(session);
        {
            let mut waiters = self.waiters.lock();
            while let Some(waiter) = waiters.pop_front() {
                let Some(offered) = session.take() else { break };
                match waiter.send(offered) {
                    Ok(()) => return,
                    // Subscriber gave up; try the next one.
                    Err(rejected) => session = Some(rejected),
                }
            }
        }

        if let Some(session) = session {
            tracing::info!(
                target: "mobdebug.wire",
                local_addr = %self.local_addr,
                peer = ?session.peer_addr(),
                "no one is waiting for a debuggee; closing connection"
            );
            session.stop();
        }
    }
}

async fn accept_loop(inner: Arc<Inner>) {
    loop {
        let accepted = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            res = inner.accept() => match res {
                Some(res) => res,
                None => break,
            },
        };
        match accepted {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                tracing::info!(target: "mobdebug.wire", local_addr = %inner.local_addr, %peer, "debuggee connected");
                inner.publish(DebuggeeSession::new(stream, Some(peer)));
            }
            Err(err) => {
                tracing::warn!(target: "mobdebug.wire", local_addr = %inner.local_addr, error = %err, "failed to accept debuggee connection");
            }
        }
    }
}
