//! Debug Adapter Protocol front end for MobDebug.
//!
//! A [`bridge`] translates between one DAP client and one script-side
//! debugger: it answers the lifecycle requests itself, launches the program
//! through a [`mobdebug_process::ProcessLauncher`], waits for the debugger to
//! connect back through the shared [`mobdebug_wire::ListenerRegistry`] and then
//! forwards stepping/inspection requests in both directions. [`server`] hosts
//! bridges over stdio, TCP or a local pipe.

pub mod bridge;
pub mod dap_tokio;
pub mod requests;
pub mod server;

pub use bridge::{run_bridge, BridgeContext, BridgeError, BridgeOptions};
