//! Shared debuggee listeners.
//!
//! Several debug runs configured for the same `address:port` share one
//! [`DebuggeeListener`]. Each user holds a [`ListenerClaim`]; the socket is
//! closed when the last claim for an address goes away.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::listener::DebuggeeListener;
use crate::session::DebuggeeSession;

#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<HashMap<String, Registration>>,
    next_claim: AtomicU64,
}

struct Registration {
    listener: DebuggeeListener,
    claims: HashSet<u64>,
}

static GLOBAL: OnceLock<Arc<ListenerRegistry>> = OnceLock::new();

fn registry_key(address: &str, port: u16) -> String {
    format!("{address}:{port}")
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The registry shared by every bridge in this process.
    pub fn global() -> Arc<Self> {
        GLOBAL.get_or_init(Self::new).clone()
    }

    /// Claim the listener for `address:port`, binding it on first use.
    ///
    /// A failed bind leaves no registration behind.
    pub fn acquire(self: &Arc<Self>, address: &str, port: u16) -> Result<ListenerClaim> {
        let key = registry_key(address, port);
        let claim_id = self.next_claim.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.lock();
        let (listener, claims) = match entries.get_mut(&key) {
            Some(registration) => {
                registration.claims.insert(claim_id);
                (registration.listener.clone(), registration.claims.len())
            }
            None => {
                let listener = DebuggeeListener::bind(address, port)?;
                entries.insert(
                    key.clone(),
                    Registration {
                        listener: listener.clone(),
                        claims: HashSet::from([claim_id]),
                    },
                );
                (listener, 1)
            }
        };
        drop(entries);

        tracing::debug!(target: "mobdebug.wire", key = %key, claims, "listener claimed");
        Ok(ListenerClaim {
            registry: self.clone(),
            key,
            claim_id,
            listener,
        })
    }

    /// Claim a listener, wait for the next debuggee connection on it and hand
    /// it to `on_session`.
    ///
    /// The claim is released as soon as a session arrives, or synchronously
    /// when the returned [`PendingSession`] is cancelled or dropped.
    /// `on_session` runs at most once, after the release, and never after a
    /// cancellation.
    pub fn wait_session<F>(
        self: &Arc<Self>,
        address: &str,
        port: u16,
        on_session: F,
    ) -> Result<PendingSession>
    where
        F: FnOnce(DebuggeeSession) + Send + 'static,
    {
        let claim = self.acquire(address, port)?;
        let local_addr = claim.local_addr();
        let mut arrival = claim.subscribe();
        let claim = Arc::new(Mutex::new(Some(claim)));
        let cancel = CancellationToken::new();

        let task_claim = claim.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let session = tokio::select! {
                biased;
                _ = task_cancel.cancelled() => None,
                res = &mut arrival => res.ok(),
            };
            task_claim.lock().take();
            match session {
                Some(session) if !task_cancel.is_cancelled() => on_session(session),
                Some(session) => session.stop(),
                None => {
                    arrival.close();
                    if let Ok(late) = arrival.try_recv() {
                        late.stop();
                    }
                }
            }
        });

        Ok(PendingSession {
            local_addr,
            claim,
            cancel,
        })
    }

    /// Number of outstanding claims for `address:port`.
    pub fn claim_count(&self, address: &str, port: u16) -> usize {
        self.entries
            .lock()
            .get(&registry_key(address, port))
            .map_or(0, |registration| registration.claims.len())
    }

    pub fn is_listening(&self, address: &str, port: u16) -> bool {
        self.claim_count(address, port) > 0
    }

    /// Where the listener registered for `address:port` actually accepts.
    pub fn local_addr(&self, address: &str, port: u16) -> Option<SocketAddr> {
        self.entries
            .lock()
            .get(&registry_key(address, port))
            .map(|registration| registration.listener.local_addr())
    }

    fn release(&self, key: &str, claim_id: u64) {
        let mut entries = self.entries.lock();
        let Some(registration) = entries.get_mut(key) else {
            return;
        };
        if !registration.claims.remove(&claim_id) {
            return;
        }
        let remaining = registration.claims.len();
        if remaining == 0 {
            if let Some(registration) = entries.remove(key) {
                registration.listener.stop();
            }
        }
        drop(entries);
        tracing::debug!(target: "mobdebug.wire", key, remaining, "listener claim released");
    }
}

/// One holder's share of a registered listener. Released on drop.
pub struct ListenerClaim {
    registry: Arc<ListenerRegistry>,
    key: String,
    claim_id: u64,
    listener: DebuggeeListener,
}

impl ListenerClaim {
    /// The `address:port` identity this claim was made for.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn subscribe(&self) -> oneshot::Receiver<DebuggeeSession> {
        self.listener.subscribe()
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ListenerClaim {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.claim_id);
    }
}

impl std::fmt::Debug for ListenerClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerClaim")
            .field("key", &self.key)
            .field("claim_id", &self.claim_id)
            .finish()
    }
}

/// A debuggee connection being waited for. Dropping it gives up the wait.
#[derive(Debug)]
pub struct PendingSession {
    local_addr: SocketAddr,
    claim: Arc<Mutex<Option<ListenerClaim>>>,
    cancel: CancellationToken,
}

impl PendingSession {
    /// The address debuggees should connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Give up the wait. The claim is released before this returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.claim.lock().take();
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
