//! Configuration for the MobDebug debug adapter.
//!
//! Two kinds of configuration live here:
//! - [`AdapterConfig`]: process-wide settings loaded from TOML (logging,
//!   upstream transport, launch defaults).
//! - [`SessionConfig`]: the validated per-run record built from a DAP
//!   `launch`/`attach` request.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod encoding;
mod logging;
mod session;

pub use encoding::TextEncoding;
pub use logging::{init_tracing, LoggingConfig};
pub use session::{
    AttachArguments, CommonArguments, LaunchArguments, LaunchMode, SessionConfig,
    DEFAULT_DEBUGGEE_PORT, LOOPBACK_HOST, PUBLIC_HOST,
};

/// Environment variable consulted when no `--config` path is given.
pub const CONFIG_ENV_VAR: &str = "MOBDEBUG_CONFIG";

/// Top-level adapter configuration.
///
/// ```toml
/// [logging]
/// level = "debug"
/// file = "/tmp/mobdebug-adapter.log"
///
/// [adapter]
/// transport = "tcp"
/// listen = "127.0.0.1:0"
///
/// [launch]
/// runtime_path = "/opt/mobdebug/lua"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// How the adapter is reached by the debugging client.
    #[serde(default)]
    pub adapter: UpstreamConfig,

    #[serde(default)]
    pub launch: LaunchDefaults,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One session over stdin/stdout.
    #[default]
    Stdio,
    /// Accept DAP clients on a TCP socket.
    Tcp,
    /// Accept DAP clients on a local named pipe (unix domain socket).
    Pipe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub transport: TransportKind,

    /// Listen address for the `tcp` transport. Port `0` lets the OS choose.
    #[serde(default = "UpstreamConfig::default_listen")]
    pub listen: String,

    /// Socket path for the `pipe` transport. A random path under the temp
    /// directory is used when unset.
    #[serde(default)]
    pub pipe: Option<PathBuf>,
}

impl UpstreamConfig {
    fn default_listen() -> String {
        "127.0.0.1:0".to_owned()
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            listen: Self::default_listen(),
            pipe: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchDefaults {
    /// Directory holding the Lua side of the debugger (`vscode-mobdebug.lua`).
    ///
    /// When set, it is prepended to `package.path` of launched interpreters.
    #[serde(default)]
    pub runtime_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` includes a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_owned())
    }
}

impl AdapterConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Resolve the config file from an explicit path or [`CONFIG_ENV_VAR`] and
    /// load it. No path at all yields the defaults.
    pub fn discover(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = cli_path.or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }
}
