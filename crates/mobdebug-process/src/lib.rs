//! Debuggee process launching.
//!
//! A debug run either starts a script interpreter with the debugger bootstrap
//! injected, or an arbitrary executable that is expected to connect back on
//! its own. Output is forwarded to a [`ProcessOutput`] sink and the exit is
//! reported once through the callback given to [`DebuggeeProcess::run`].

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use mobdebug_config::{LaunchMode, SessionConfig, TextEncoding};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Host the injected bootstrap connects back to.
const BOOTSTRAP_HOST: &str = "127.0.0.1";

// Lua expressions extracting the separators from `package.config`.
const LUA_DIR_SEP: &str = "package.config:match('^(.-)%s')";
const LUA_TEMPLATE_SEP: &str = "package.config:match('^.-%s(.-)%s')";
const LUA_SUBSTITUTION_MARK: &str = "package.config:match('^.-%s.-%s(.-)%s')";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("attach configurations do not launch a process")]
    NotLaunchable,
    #[error("no program to launch")]
    EmptyProgram,
}

/// Where a piece of process output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    Stdout,
    Stderr,
    /// Messages about the process itself ("Process started", ...).
    Console,
}

impl OutputCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Console => "console",
        }
    }
}

pub trait ProcessOutput: Send + Sync {
    fn output(&self, category: OutputCategory, text: String);
}

pub type ExitCallback = Box<dyn FnOnce(Option<i32>) + Send>;

/// A launched (or launchable) debuggee.
pub trait DebuggeeProcess: Send {
    /// Start the process. `on_exit` runs exactly once with the exit code, or
    /// with `None` when the process could not be spawned, unless the process
    /// is disposed first.
    fn run(&mut self, on_exit: ExitCallback);

    /// Stop reporting output and exit. With `terminate` the process is killed,
    /// otherwise it is left running on its own. Safe to call at any time and
    /// more than once.
    fn dispose(&mut self, terminate: bool);
}

pub trait ProcessLauncher: Send + Sync {
    fn create(
        &self,
        config: &SessionConfig,
        output: Arc<dyn ProcessOutput>,
    ) -> Result<Box<dyn DebuggeeProcess>, LaunchError>;
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub cwd: Option<PathBuf>,
    pub program: String,
    pub args: Vec<String>,
    /// Overrides on top of the adapter's environment; `None` removes.
    pub env: BTreeMap<String, Option<String>>,
}

impl LaunchSpec {
    /// Resolve the command for `config`.
    ///
    /// `runtime_path` is the directory holding the Lua side of the debugger;
    /// when given it is prepended to the interpreter's `package.path`.
    pub fn from_config(
        config: &SessionConfig,
        runtime_path: Option<&Path>,
    ) -> Result<Self, LaunchError> {
        let (program, mut args) = match &config.launch_mode {
            LaunchMode::Attach => return Err(LaunchError::NotLaunchable),
            LaunchMode::Executable(executable) => (executable.clone(), Vec::new()),
            LaunchMode::Interpreter(interpreter) => {
                let mut args = Vec::new();
                if !config.no_debug {
                    args.push("-l".to_owned());
                    args.push("package".to_owned());
                    args.push("-e".to_owned());
                    args.push(debugger_bootstrap(config.debuggee_port, runtime_path));
                }
                (interpreter.clone(), args)
            }
        };
        if program.is_empty() {
            return Err(LaunchError::EmptyProgram);
        }
        args.extend(config.launch_arguments.iter().cloned());

        let cwd = Some(config.working_directory.as_str())
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            cwd,
            program,
            args,
            env: config.launch_environment.clone().unwrap_or_default(),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for (name, value) in &self.env {
            match value {
                Some(value) => cmd.env(name, value),
                None => cmd.env_remove(name),
            };
        }

        // Own process group so a forced dispose takes children down too.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                // SAFETY: `setpgid` is async-signal-safe and does not allocate.
                // This is executed after `fork` in the child process.
                if libc::setpgid(0, 0) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        cmd
    }
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Human-readable only; not a round-trippable shell snippet.
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// The `-e` chunk that loads the debugger module and connects back to the
/// adapter on `port`.
pub fn debugger_bootstrap(port: u16, runtime_path: Option<&Path>) -> String {
    let start = format!("require'vscode-mobdebug'.start('{BOOTSTRAP_HOST}',{port})");
    match runtime_path {
        None => start,
        Some(dir) => {
            let dir = lua_single_quoted(&dir.display().to_string());
            format!(
                "package.path='{dir}'..{LUA_DIR_SEP}..{LUA_SUBSTITUTION_MARK}..'.lua'..{LUA_TEMPLATE_SEP}..package.path;{start}"
            )
        }
    }
}

fn lua_single_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Launches real OS processes.
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    pub runtime_path: Option<PathBuf>,
    /// Time between SIGTERM and SIGKILL on a forced dispose.
    pub kill_grace: Duration,
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self {
            runtime_path: None,
            kill_grace: Duration::from_secs(2),
        }
    }
}

impl ProcessLauncher for SystemLauncher {
    fn create(
        &self,
        config: &SessionConfig,
        output: Arc<dyn ProcessOutput>,
    ) -> Result<Box<dyn DebuggeeProcess>, LaunchError> {
        let spec = LaunchSpec::from_config(config, self.runtime_path.as_deref())?;
        Ok(Box::new(ChildProcess::new(
            spec,
            config.console_encoding,
            output,
            self.kill_grace,
        )))
    }
}

/// A [`DebuggeeProcess`] backed by `tokio::process`.
pub struct ChildProcess {
    spec: LaunchSpec,
    console_encoding: TextEncoding,
    output: Arc<dyn ProcessOutput>,
    kill_grace: Duration,
    control: Option<Control>,
}

struct Control {
    pid: Option<u32>,
    detached: CancellationToken,
    kill: CancellationToken,
}

impl ChildProcess {
    pub fn new(
        spec: LaunchSpec,
        console_encoding: TextEncoding,
        output: Arc<dyn ProcessOutput>,
        kill_grace: Duration,
    ) -> Self {
        Self {
            spec,
            console_encoding,
            output,
            kill_grace,
            control: None,
        }
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// OS process id once spawned.
    pub fn id(&self) -> Option<u32> {
        self.control.as_ref().and_then(|control| control.pid)
    }
}

impl DebuggeeProcess for ChildProcess {
    fn run(&mut self, on_exit: ExitCallback) {
        if self.control.is_some() {
            tracing::warn!(target: "mobdebug.process", command = %self.spec, "process already started");
            return;
        }

        let detached = CancellationToken::new();
        let kill = CancellationToken::new();
        let output = self.output.clone();

        tracing::info!(target: "mobdebug.process", command = %self.spec, cwd = ?self.spec.cwd, "launching debuggee");
        let pid = match self.spec.command().spawn() {
            Ok(mut child) => {
                let pid = child.id();
                output.output(OutputCategory::Console, "Process started".to_owned());

                let readers = [
                    child.stdout.take().map(|stdout| {
                        tokio::spawn(forward(
                            stdout,
                            OutputCategory::Stdout,
                            output.clone(),
                            self.console_encoding,
                            detached.clone(),
                        ))
                    }),
                    child.stderr.take().map(|stderr| {
                        tokio::spawn(forward(
                            stderr,
                            OutputCategory::Stderr,
                            output.clone(),
                            self.console_encoding,
                            detached.clone(),
                        ))
                    }),
                ];

                tokio::spawn(supervise(
                    child,
                    readers,
                    output,
                    Supervision {
                        detached: detached.clone(),
                        kill: kill.clone(),
                        kill_grace: self.kill_grace,
                    },
                    on_exit,
                ));
                pid
            }
            Err(err) => {
                tracing::warn!(target: "mobdebug.process", command = %self.spec, error = %err, "failed to launch debuggee");
                let detached = detached.clone();
                tokio::spawn(async move {
                    if detached.is_cancelled() {
                        return;
                    }
                    output.output(
                        OutputCategory::Console,
                        format!("Process exit with error: {err}"),
                    );
                    on_exit(None);
                });
                None
            }
        };

        self.control = Some(Control {
            pid,
            detached,
            kill,
        });
    }

    fn dispose(&mut self, terminate: bool) {
        let Some(control) = self.control.as_ref() else {
            return;
        };
        if terminate {
            control.kill.cancel();
        }
        control.detached.cancel();
    }
}

struct Supervision {
    detached: CancellationToken,
    kill: CancellationToken,
    kill_grace: Duration,
}

async fn supervise(
    mut child: Child,
    readers: [Option<tokio::task::JoinHandle<()>>; 2],
    output: Arc<dyn ProcessOutput>,
    supervision: Supervision,
    on_exit: ExitCallback,
) {
    let pid = child.id();
    let status = tokio::select! {
        biased;
        _ = supervision.kill.cancelled() => {
            tracing::info!(target: "mobdebug.process", pid, "terminating debuggee");
            terminate_process_tree(&mut child, supervision.kill_grace).await;
            return;
        }
        // Released without killing; the OS keeps the process running.
        _ = supervision.detached.cancelled() => return,
        status = child.wait() => status,
    };

    // Let buffered output land before the exit message. Orphaned grandchildren
    // may hold the pipes open, so don't wait forever.
    for reader in readers.into_iter().flatten() {
        let _ = tokio::time::timeout(supervision.kill_grace, reader).await;
    }

    if supervision.detached.is_cancelled() {
        return;
    }

    match status {
        Ok(status) => {
            tracing::info!(target: "mobdebug.process", pid, %status, "debuggee exited");
            output.output(OutputCategory::Console, exit_message(&status));
            on_exit(status.code());
        }
        Err(err) => {
            output.output(
                OutputCategory::Console,
                format!("Process exit with error: {err}"),
            );
            on_exit(None);
        }
    }
}

fn exit_message(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Process exit with code: {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("Process exit with signal: {signal}");
        }
    }
    format!("Process exit with status: {status}")
}

async fn forward<R>(
    mut reader: R,
    category: OutputCategory,
    output: Arc<dyn ProcessOutput>,
    encoding: TextEncoding,
    detached: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8 * 1024];
    loop {
        let n = tokio::select! {
            _ = detached.cancelled() => return,
            res = reader.read(&mut buf) => match res {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            },
        };
        output.output(category, encoding.decode(&buf[..n]));
    }
}

async fn terminate_process_tree(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = pid as i32;
            // Negative pid targets the process group set up in `pre_exec`.
            unsafe {
                let _ = libc::kill(-pid, libc::SIGTERM);
            }
            if tokio::time::timeout(grace, child.wait()).await.is_ok() {
                return;
            }
            unsafe {
                let _ = libc::kill(-pid, libc::SIGKILL);
            }
        }
    }

    #[cfg(not(unix))]
    let _ = grace;

    let _ = child.kill().await;
}
