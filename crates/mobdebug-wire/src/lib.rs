//! Debuggee side of the MobDebug adapter.
//!
//! The script runtime connects back to the adapter over TCP and speaks
//! length-prefixed JSON (`#<len>\n<json>`). This crate owns that protocol:
//! framing ([`codec`]), per-connection sessions with response correlation
//! ([`DebuggeeSession`]), listeners that hand connections to waiting debug runs
//! ([`DebuggeeListener`]) and a process-wide registry that lets runs share a
//! listening address ([`ListenerRegistry`]).

pub mod codec;
mod error;
mod listener;
pub mod message;
mod registry;
mod session;

pub use codec::FrameCodec;
pub use error::{FrameError, Result, WireError};
pub use listener::DebuggeeListener;
pub use registry::{ListenerClaim, ListenerRegistry, PendingSession};
pub use session::{DebuggeeNotification, DebuggeeSession, ResponseCallback};

// The mock debuggee is only needed for tests and downstream integration suites.
// Compile it for this crate's own unit tests unconditionally (via `cfg(test)`),
// while keeping it behind the `wire-test-support` feature for normal builds.
#[cfg(any(test, feature = "wire-test-support"))]
pub mod mock;
