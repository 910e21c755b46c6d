use serde::Deserialize;
use serde_json::{json, Value};

/// Requests the bridge forwards to the script-side debugger unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxiedCommand {
    Next,
    Continue,
    StepIn,
    StepOut,
    StackTrace,
    Scopes,
    Variables,
    Threads,
    SetBreakpoints,
    Evaluate,
    Pause,
    ConfigurationDone,
    SetVariable,
}

impl ProxiedCommand {
    pub const ALL: [ProxiedCommand; 13] = [
        ProxiedCommand::Next,
        ProxiedCommand::Continue,
        ProxiedCommand::StepIn,
        ProxiedCommand::StepOut,
        ProxiedCommand::StackTrace,
        ProxiedCommand::Scopes,
        ProxiedCommand::Variables,
        ProxiedCommand::Threads,
        ProxiedCommand::SetBreakpoints,
        ProxiedCommand::Evaluate,
        ProxiedCommand::Pause,
        ProxiedCommand::ConfigurationDone,
        ProxiedCommand::SetVariable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProxiedCommand::Next => "next",
            ProxiedCommand::Continue => "continue",
            ProxiedCommand::StepIn => "stepIn",
            ProxiedCommand::StepOut => "stepOut",
            ProxiedCommand::StackTrace => "stackTrace",
            ProxiedCommand::Scopes => "scopes",
            ProxiedCommand::Variables => "variables",
            ProxiedCommand::Threads => "threads",
            ProxiedCommand::SetBreakpoints => "setBreakpoints",
            ProxiedCommand::Evaluate => "evaluate",
            ProxiedCommand::Pause => "pause",
            ProxiedCommand::ConfigurationDone => "configurationDone",
            ProxiedCommand::SetVariable => "setVariable",
        }
    }
}

/// Every upstream request the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Initialize,
    Launch,
    Attach,
    Disconnect,
    Proxied(ProxiedCommand),
}

impl Command {
    pub fn parse(name: &str) -> Option<Self> {
        let command = match name {
            "initialize" => Command::Initialize,
            "launch" => Command::Launch,
            "attach" => Command::Attach,
            "disconnect" => Command::Disconnect,
            other => Command::Proxied(
                ProxiedCommand::ALL
                    .into_iter()
                    .find(|command| command.as_str() == other)?,
            ),
        };
        Some(command)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(default)]
    pub restart: Option<bool>,
    #[serde(default)]
    pub terminate_debuggee: Option<bool>,
}

/// The fixed capability set reported from `initialize`.
pub fn capabilities() -> Value {
    json!({
        "supportsConfigurationDoneRequest": true,
        "supportsEvaluateForHovers": true,
        "supportsStepBack": false,
        "supportsSetVariable": true,
        "supportsFunctionBreakpoints": false,
        "supportsConditionalBreakpoints": true,
        "supportsHitConditionalBreakpoints": true,
        "supportsLogPoints": true,
        "supportSuspendDebuggee": true,
        "supportTerminateDebuggee": true,
    })
}
