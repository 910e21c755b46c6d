use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::TextEncoding;

pub const LOOPBACK_HOST: &str = "127.0.0.1";
pub const PUBLIC_HOST: &str = "0.0.0.0";
pub const DEFAULT_DEBUGGEE_PORT: u16 = 56789;

const DEFAULT_INTERPRETER: &str = "lua";

/// Arguments shared by `launch` and `attach` requests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonArguments {
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub source_base_path: Option<String>,
    #[serde(default)]
    pub listen_publicly: Option<bool>,
    #[serde(default)]
    pub listen_port: Option<u16>,
    #[serde(default)]
    pub source_encoding: Option<String>,
    #[serde(default)]
    pub console_encoding: Option<String>,
    #[serde(default)]
    pub stop_on_entry: Option<bool>,
    /// Opaque mapping forwarded to the debuggee in the welcome handshake.
    #[serde(default)]
    pub path_map: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    #[serde(flatten)]
    pub common: CommonArguments,
    #[serde(default)]
    pub no_debug: Option<bool>,
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub arguments: Option<Vec<String>>,
    /// Extra environment; a `null` value removes the variable.
    #[serde(default)]
    pub env: Option<BTreeMap<String, Option<String>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArguments {
    #[serde(flatten)]
    pub common: CommonArguments,
}

/// What the adapter starts for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Nothing is started; an external debuggee connects on its own.
    Attach,
    /// Run a script interpreter with the debugger bootstrap injected.
    Interpreter(String),
    /// Run an arbitrary executable that is expected to connect by itself.
    Executable(String),
}

/// Validated configuration of one debug run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub source_encoding: TextEncoding,
    pub console_encoding: TextEncoding,
    pub source_base_path: String,
    pub working_directory: String,
    pub debuggee_host: String,
    pub debuggee_port: u16,
    pub stop_on_entry: bool,
    pub path_map: Option<Value>,
    pub no_debug: bool,
    pub launch_mode: LaunchMode,
    pub launch_arguments: Vec<String>,
    pub launch_environment: Option<BTreeMap<String, Option<String>>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            source_encoding: TextEncoding::Utf8,
            console_encoding: TextEncoding::Utf8,
            source_base_path: String::new(),
            working_directory: String::new(),
            debuggee_host: LOOPBACK_HOST.to_owned(),
            debuggee_port: DEFAULT_DEBUGGEE_PORT,
            stop_on_entry: true,
            path_map: None,
            no_debug: false,
            launch_mode: LaunchMode::Attach,
            launch_arguments: Vec::new(),
            launch_environment: None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl SessionConfig {
    pub fn for_attach(args: &AttachArguments) -> Self {
        let mut config = Self::default();
        config.apply_common(&args.common);
        config
    }

    pub fn for_launch(args: &LaunchArguments) -> Self {
        let mut config = Self::default();
        config.launch_mode = match non_empty(&args.executable) {
            Some(executable) => LaunchMode::Executable(executable.to_owned()),
            None => LaunchMode::Interpreter(
                non_empty(&args.interpreter)
                    .unwrap_or(DEFAULT_INTERPRETER)
                    .to_owned(),
            ),
        };
        config.no_debug = args.no_debug.unwrap_or(false);
        config.launch_arguments = args.arguments.clone().unwrap_or_default();
        config.launch_environment = args.env.clone();
        config.apply_common(&args.common);
        config
    }

    fn apply_common(&mut self, args: &CommonArguments) {
        self.debuggee_host = if args.listen_publicly.unwrap_or(false) {
            PUBLIC_HOST.to_owned()
        } else {
            LOOPBACK_HOST.to_owned()
        };
        self.debuggee_port = args.listen_port.unwrap_or(DEFAULT_DEBUGGEE_PORT);
        self.source_encoding = args
            .source_encoding
            .as_deref()
            .and_then(TextEncoding::parse)
            .unwrap_or_default();
        self.console_encoding = args
            .console_encoding
            .as_deref()
            .and_then(TextEncoding::parse)
            .unwrap_or(self.source_encoding);
        self.working_directory = args.working_directory.clone().unwrap_or_default();
        self.source_base_path = non_empty(&args.source_base_path)
            .unwrap_or(&self.working_directory)
            .to_owned();
        self.stop_on_entry = args.stop_on_entry.unwrap_or(true);
        self.path_map = args.path_map.clone();
    }

    /// Registry identity of the debuggee listener for this run.
    pub fn debuggee_address(&self) -> String {
        format!("{}:{}", self.debuggee_host, self.debuggee_port)
    }
}
