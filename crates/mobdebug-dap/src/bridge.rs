//! One upstream DAP client bridged to one debug run.
//!
//! Everything a bridge reacts to (upstream requests, debuggee traffic, process
//! output, timers) is funnelled into a single event channel and handled in
//! order by [`Bridge`], so none of its state needs locking. Racing completions
//! (configuration wait, disconnect acknowledgement) are settled by taking an
//! `Option` latch: whichever event arrives first takes it, later ones find it
//! empty and do nothing.

use std::path::MAIN_SEPARATOR_STR;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use mobdebug_config::{AttachArguments, LaunchArguments, SessionConfig};
use mobdebug_process::{DebuggeeProcess, OutputCategory, ProcessLauncher, ProcessOutput};
use mobdebug_wire::message::MessageKind;
use mobdebug_wire::{DebuggeeNotification, DebuggeeSession, ListenerRegistry, PendingSession};

use crate::dap_tokio::{
    make_event, make_response, DapError, DapReader, DapWriter, Event, Request, Response,
};
use crate::requests::{capabilities, Command, DisconnectArguments, ProxiedCommand};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Dap(#[from] DapError),
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// How long `launch`/`attach` wait for `configurationDone` before going ahead.
    pub configuration_timeout: Duration,
    /// How long a debuggee gets to acknowledge `disconnect`.
    pub disconnect_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            configuration_timeout: Duration::from_millis(1000),
            disconnect_timeout: Duration::from_secs(15),
        }
    }
}

/// What a bridge needs from the surrounding adapter. Cheap to clone; one per
/// server, shared by every connection.
#[derive(Clone)]
pub struct BridgeContext {
    pub registry: Arc<ListenerRegistry>,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub options: BridgeOptions,
}

impl BridgeContext {
    pub fn new(registry: Arc<ListenerRegistry>, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            registry,
            launcher,
            options: BridgeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BridgeOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingConfiguration,
    Launching,
    Attaching,
    Proxying,
    Disconnecting,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartKind {
    Launch,
    Attach,
}

impl StartKind {
    fn phase(self) -> Phase {
        match self {
            StartKind::Launch => Phase::Launching,
            StartKind::Attach => Phase::Attaching,
        }
    }
}

struct DeferredStart {
    request: Request,
    kind: StartKind,
    run: u64,
}

enum BridgeEvent {
    Upstream(Request),
    UpstreamClosed(Option<DapError>),
    ConfigurationTimeout { run: u64 },
    DebuggeeArrived { run: u64, session: DebuggeeSession },
    Debuggee { session: u64, notification: DebuggeeNotification },
    ProcessOutput { category: OutputCategory, text: String },
    ProcessExited { run: u64, code: Option<i32> },
    DisconnectAcknowledged(Value),
    DisconnectTimeout,
}

struct OutputSink {
    events: mpsc::UnboundedSender<BridgeEvent>,
}

impl ProcessOutput for OutputSink {
    fn output(&self, category: OutputCategory, text: String) {
        let _ = self.events.send(BridgeEvent::ProcessOutput { category, text });
    }
}

/// Serve one DAP client until it closes its side of the connection.
pub async fn run_bridge<R, W>(reader: R, writer: W, context: BridgeContext) -> Result<(), BridgeError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = tokio::spawn(async move {
        let mut writer = DapWriter::new(writer);
        while let Some(message) = out_rx.recv().await {
            if let Err(err) = writer.write_value(&message).await {
                tracing::warn!(target: "mobdebug.dap", error = %err, "failed to write DAP message");
                break;
            }
        }
    });

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(read_upstream(reader, events_tx.clone()));

    let mut bridge = Bridge::new(context, out_tx, events_tx);
    let outcome = loop {
        let Some(event) = events_rx.recv().await else {
            break Ok(());
        };
        match event {
            BridgeEvent::UpstreamClosed(err) => {
                bridge.shutdown();
                break err.map_or(Ok(()), |err| Err(err.into()));
            }
            event => bridge.handle(event),
        }
    };

    // Dropping the bridge closes the outgoing queue; the writer drains it first.
    drop(bridge);
    reader_task.abort();
    let _ = writer_task.await;
    outcome
}

async fn read_upstream<R>(reader: R, events: mpsc::UnboundedSender<BridgeEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = DapReader::new(reader);
    loop {
        match reader.read_value().await {
            Ok(Some(value)) => match serde_json::from_value::<Request>(value) {
                Ok(request) if request.message_type == "request" => {
                    if events.send(BridgeEvent::Upstream(request)).is_err() {
                        return;
                    }
                }
                Ok(other) => {
                    tracing::debug!(target: "mobdebug.dap", message_type = %other.message_type, "ignoring non-request message from client");
                }
                Err(err) => {
                    tracing::warn!(target: "mobdebug.dap", error = %err, "ignoring malformed DAP request");
                }
            },
            Ok(None) => {
                let _ = events.send(BridgeEvent::UpstreamClosed(None));
                return;
            }
            Err(err) if err.is_recoverable() => {
                tracing::warn!(target: "mobdebug.dap", error = %err, "ignoring unparsable DAP message");
            }
            Err(err) => {
                let _ = events.send(BridgeEvent::UpstreamClosed(Some(err)));
                return;
            }
        }
    }
}

async fn forward_debuggee(
    session: u64,
    mut notifications: mpsc::UnboundedReceiver<DebuggeeNotification>,
    events: mpsc::UnboundedSender<BridgeEvent>,
) {
    while let Some(notification) = notifications.recv().await {
        if events
            .send(BridgeEvent::Debuggee {
                session,
                notification,
            })
            .is_err()
        {
            break;
        }
    }
}

fn arguments<T: DeserializeOwned + Default>(request: &Request) -> Result<T, serde_json::Error> {
    match request.arguments() {
        Some(arguments) => serde_json::from_value(arguments),
        None => Ok(T::default()),
    }
}

struct Bridge {
    context: BridgeContext,
    upstream: mpsc::UnboundedSender<Value>,
    events: mpsc::UnboundedSender<BridgeEvent>,
    next_seq: i64,
    phase: Phase,
    configuration_done: bool,
    /// Bumped for every launch/attach so stale timers and callbacks from an
    /// earlier run can be told apart.
    run: u64,
    deferred: Option<DeferredStart>,
    /// The launch/attach request answered once the debuggee connects.
    start_request: Option<Request>,
    config: Option<SessionConfig>,
    pending_session: Option<PendingSession>,
    debuggee: Option<DebuggeeSession>,
    process: Option<Box<dyn DebuggeeProcess>>,
    disconnect: Option<Request>,
    terminated_sent: bool,
}

impl Bridge {
    fn new(
        context: BridgeContext,
        upstream: mpsc::UnboundedSender<Value>,
        events: mpsc::UnboundedSender<BridgeEvent>,
    ) -> Self {
        Self {
            context,
            upstream,
            events,
            next_seq: 1,
            phase: Phase::Idle,
            configuration_done: false,
            run: 0,
            deferred: None,
            start_request: None,
            config: None,
            pending_session: None,
            debuggee: None,
            process: None,
            disconnect: None,
            terminated_sent: false,
        }
    }

    fn attached(&self) -> &'static str {
        if self.debuggee.is_some() {
            "+"
        } else {
            "-"
        }
    }

    fn handle(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Upstream(request) => self.handle_request(request),
            BridgeEvent::UpstreamClosed(_) => self.shutdown(),
            BridgeEvent::ConfigurationTimeout { run } => {
                if self.deferred.as_ref().is_some_and(|deferred| deferred.run == run) {
                    tracing::debug!(target: "mobdebug.dap", "configurationDone not received in time; continuing");
                    self.resume_deferred();
                }
            }
            BridgeEvent::DebuggeeArrived { run, session } => self.debuggee_arrived(run, session),
            BridgeEvent::Debuggee {
                session,
                notification,
            } => self.debuggee_notification(session, notification),
            BridgeEvent::ProcessOutput { category, text } => {
                let output = match category {
                    OutputCategory::Console => format!("{text}\n"),
                    OutputCategory::Stdout | OutputCategory::Stderr => text,
                };
                self.send_event(
                    "output",
                    Some(json!({ "category": category.as_str(), "output": output })),
                );
            }
            BridgeEvent::ProcessExited { run, code } => self.process_exited(run, code),
            BridgeEvent::DisconnectAcknowledged(response) => self.finish_disconnect(Some(response)),
            BridgeEvent::DisconnectTimeout => {
                if self.disconnect.is_some() {
                    tracing::info!(target: "mobdebug.dap", "debuggee did not acknowledge disconnect in time");
                    self.finish_disconnect(None);
                }
            }
        }
    }

    // ---- upstream output ----------------------------------------------------

    fn alloc_seq(&mut self) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn send_response(&mut self, mut response: Response) {
        response.seq = self.alloc_seq();
        tracing::info!(
            target: "mobdebug.dap",
            "[{}] Response: {}[{}] - {}",
            self.attached(),
            response.command,
            response.request_seq,
            if response.success { "success" } else { "fail" }
        );
        self.enqueue(&response);
    }

    fn send_event_message(&mut self, mut event: Event) {
        event.seq = self.alloc_seq();
        tracing::info!(target: "mobdebug.dap", "[{}] Event: {}[{}]", self.attached(), event.event, event.seq);
        self.enqueue(&event);
    }

    /// Forward a debuggee event or response as received, renumbered into this
    /// bridge's sequence.
    fn relay(&mut self, mut message: Value) {
        let Some(object) = message.as_object_mut() else {
            tracing::warn!(target: "mobdebug.dap", "dropping non-object debuggee message");
            return;
        };
        let seq = self.alloc_seq();
        object.insert("seq".into(), Value::from(seq));
        let is_response = MessageKind::of(&message) == Some(MessageKind::Response);

        let attached = self.attached();
        if is_response {
            tracing::info!(
                target: "mobdebug.dap",
                "[{attached}] Response: {}[{}] - {}",
                mobdebug_wire::message::command(&message).unwrap_or("?"),
                mobdebug_wire::message::request_seq(&message).unwrap_or_default(),
                if message.get("success").and_then(serde_json::Value::as_bool).unwrap_or(false) { "success" } else { "fail" }
            );
        } else {
            tracing::info!(
                target: "mobdebug.dap",
                "[{attached}] Event: {}[{seq}]",
                message.get("event").and_then(serde_json::Value::as_str).unwrap_or("?")
            );
        }
        let _ = self.upstream.send(message);
    }

    fn enqueue<T: serde::Serialize>(&self, message: &T) {
        match serde_json::to_value(message) {
            Ok(value) => {
                let _ = self.upstream.send(value);
            }
            Err(err) => {
                tracing::warn!(target: "mobdebug.dap", error = %err, "failed to encode DAP message");
            }
        }
    }

    fn respond(&mut self, request: &Request, success: bool, body: Option<Value>, message: Option<String>) {
        self.send_response(make_response(request.seq, &request.command, success, body, message));
    }

    fn respond_error(&mut self, request: &Request, message: impl Into<String>) {
        self.respond(request, false, None, Some(message.into()));
    }

    fn send_event(&mut self, event: &str, body: Option<Value>) {
        self.send_event_message(make_event(event, body));
    }

    /// At most one `terminated` per debuggee connection.
    fn send_terminated(&mut self) {
        if self.terminated_sent {
            return;
        }
        self.terminated_sent = true;
        self.send_event("terminated", None);
    }

    // ---- upstream requests --------------------------------------------------

    fn handle_request(&mut self, request: Request) {
        tracing::info!(target: "mobdebug.dap", "[{}] Request: {}[{}]", self.attached(), request.command, request.seq);

        let command = Command::parse(&request.command);
        if self.phase == Phase::Terminated && command != Some(Command::Disconnect) {
            self.respond_error(&request, "debug session has terminated");
            return;
        }

        match command {
            Some(Command::Initialize) => {
                self.respond(&request, true, Some(capabilities()), None);
                if self.phase == Phase::Idle {
                    self.phase = Phase::AwaitingConfiguration;
                }
            }
            Some(Command::Launch) => self.handle_start(request, StartKind::Launch),
            Some(Command::Attach) => self.handle_start(request, StartKind::Attach),
            Some(Command::Disconnect) => self.handle_disconnect(request),
            Some(Command::Proxied(command)) => self.handle_proxied(command, request),
            None => {
                let message = format!("unrecognized request {}", request.command);
                self.respond_error(&request, message);
            }
        }
    }

    fn handle_proxied(&mut self, command: ProxiedCommand, request: Request) {
        if command == ProxiedCommand::ConfigurationDone {
            self.configuration_done = true;
            self.resume_deferred();
        }

        match self.debuggee.clone() {
            Some(debuggee) => {
                if let Err(err) = debuggee.proxy(request.seq, &request.command, request.arguments()) {
                    let message = format!("failed to forward {}: {err}", request.command);
                    self.respond_error(&request, message);
                }
            }
            // Nothing to configure yet; the debuggee gets its settings from the welcome.
            None if command == ProxiedCommand::ConfigurationDone => self.respond(&request, true, None, None),
            None => self.respond_error(&request, "no debuggee attached"),
        }
    }

    fn handle_start(&mut self, request: Request, kind: StartKind) {
        if !matches!(self.phase, Phase::Idle | Phase::AwaitingConfiguration) {
            self.respond_error(&request, "a debug run is already active");
            return;
        }

        self.phase = kind.phase();
        self.run += 1;
        if self.configuration_done {
            self.begin_run(request, kind);
            return;
        }

        let run = self.run;
        self.deferred = Some(DeferredStart { request, kind, run });
        let events = self.events.clone();
        let timeout = self.context.options.configuration_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(BridgeEvent::ConfigurationTimeout { run });
        });
    }

    fn resume_deferred(&mut self) {
        if let Some(deferred) = self.deferred.take() {
            self.begin_run(deferred.request, deferred.kind);
        }
    }

    fn begin_run(&mut self, request: Request, kind: StartKind) {
        let config = match kind {
            StartKind::Launch => arguments::<LaunchArguments>(&request).map(|args| SessionConfig::for_launch(&args)),
            StartKind::Attach => arguments::<AttachArguments>(&request).map(|args| SessionConfig::for_attach(&args)),
        };
        let mut config = match config {
            Ok(config) => config,
            Err(err) => {
                let message = format!("invalid {} arguments: {err}", request.command);
                self.fail_start(&request, message);
                return;
            }
        };

        if kind == StartKind::Launch && config.no_debug {
            if let Err(message) = self.spawn_process(&config) {
                self.fail_start(&request, message);
                return;
            }
            self.config = Some(config);
            self.phase = Phase::Proxying;
            self.respond(&request, true, None, None);
            self.send_terminated();
            return;
        }

        let run = self.run;
        let events = self.events.clone();
        let pending = self.context.registry.wait_session(
            &config.debuggee_host,
            config.debuggee_port,
            move |session| {
                let _ = events.send(BridgeEvent::DebuggeeArrived { run, session });
            },
        );
        let pending = match pending {
            Ok(pending) => pending,
            Err(err) => {
                let message = format!("failed to listen for debuggee on {}: {err}", config.debuggee_address());
                self.fail_start(&request, message);
                return;
            }
        };
        // A wildcard port has been resolved by now; the launched program needs the real one.
        config.debuggee_port = pending.local_addr().port();
        tracing::info!(
            target: "mobdebug.dap",
            address = %pending.local_addr(),
            mode = ?config.launch_mode,
            "waiting for debuggee"
        );
        self.pending_session = Some(pending);

        if kind == StartKind::Launch {
            if let Err(message) = self.spawn_process(&config) {
                self.pending_session = None;
                self.fail_start(&request, message);
                return;
            }
        }

        self.start_request = Some(request);
        self.config = Some(config);
    }

    fn spawn_process(&mut self, config: &SessionConfig) -> Result<(), String> {
        let output = Arc::new(OutputSink {
            events: self.events.clone(),
        });
        let mut process = self
            .context
            .launcher
            .create(config, output)
            .map_err(|err| format!("failed to launch debuggee: {err}"))?;

        let run = self.run;
        let events = self.events.clone();
        process.run(Box::new(move |code| {
            let _ = events.send(BridgeEvent::ProcessExited { run, code });
        }));
        self.process = Some(process);
        Ok(())
    }

    fn fail_start(&mut self, request: &Request, message: String) {
        tracing::warn!(target: "mobdebug.dap", command = %request.command, %message, "debug run failed to start");
        self.respond_error(request, message);
        self.send_terminated();
        self.phase = Phase::AwaitingConfiguration;
    }

    // ---- debuggee -----------------------------------------------------------

    fn debuggee_arrived(&mut self, run: u64, session: DebuggeeSession) {
        let expected = run == self.run
            && matches!(self.phase, Phase::Launching | Phase::Attaching)
            && self.debuggee.is_none();
        let request = if expected { self.start_request.take() } else { None };
        let Some(request) = request else {
            tracing::info!(target: "mobdebug.dap", peer = ?session.peer_addr(), "discarding debuggee connection nobody waits for");
            session.stop();
            return;
        };
        self.pending_session = None;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward_debuggee(session.id(), rx, self.events.clone()));
        if let Err(err) = session.start(tx) {
            tracing::warn!(target: "mobdebug.dap", error = %err, "failed to start debuggee session");
            session.stop();
            self.fail_start(&request, format!("failed to start debuggee session: {err}"));
            return;
        }

        let welcome = self.welcome();
        if let Err(err) = session.send(&welcome) {
            tracing::warn!(target: "mobdebug.dap", error = %err, "failed to send welcome to debuggee");
        }

        tracing::info!(target: "mobdebug.dap", peer = ?session.peer_addr(), "debuggee attached");
        self.debuggee = Some(session);
        self.terminated_sent = false;
        self.phase = Phase::Proxying;
        self.respond(&request, true, None, None);
        self.send_event("initialized", None);
    }

    fn welcome(&self) -> Value {
        let mut arguments = Map::new();
        if let Some(config) = &self.config {
            if let Some(path_map) = &config.path_map {
                arguments.insert("pathMap".into(), path_map.clone());
            }
            arguments.insert("stopOnEntry".into(), Value::Bool(config.stop_on_entry));
            arguments.insert("sourceBasePath".into(), Value::String(config.source_base_path.clone()));
        }
        // The key's spelling is what the script-side debugger reads.
        arguments.insert("directorySeperator".into(), Value::String(MAIN_SEPARATOR_STR.to_owned()));
        json!({ "command": "welcome", "arguments": arguments })
    }

    fn debuggee_notification(&mut self, session: u64, notification: DebuggeeNotification) {
        if self.debuggee.as_ref().map(DebuggeeSession::id) != Some(session) {
            return;
        }
        match notification {
            DebuggeeNotification::Event(value) | DebuggeeNotification::Response(value) => self.relay(value),
            DebuggeeNotification::Request(value) => {
                tracing::debug!(target: "mobdebug.dap", command = ?mobdebug_wire::message::command(&value), "ignoring request from debuggee");
            }
            DebuggeeNotification::Closed => {
                tracing::info!(target: "mobdebug.dap", "debuggee closed the connection");
                self.debuggee_lost();
            }
            DebuggeeNotification::Failed(err) => {
                tracing::warn!(target: "mobdebug.dap", error = %err, "debuggee connection failed");
                self.debuggee_lost();
            }
        }
    }

    fn debuggee_lost(&mut self) {
        if let Some(debuggee) = self.debuggee.take() {
            debuggee.stop();
        }
        if self.disconnect.is_some() {
            self.finish_disconnect(None);
            return;
        }
        self.send_terminated();
    }

    // ---- process ------------------------------------------------------------

    fn process_exited(&mut self, run: u64, code: Option<i32>) {
        if run != self.run {
            return;
        }
        self.process = None;
        tracing::info!(target: "mobdebug.dap", ?code, "debuggee process exited");

        if self.disconnect.is_some() {
            self.finish_disconnect(None);
            return;
        }

        if let Some(request) = self.start_request.take() {
            self.pending_session = None;
            self.respond_error(&request, "debuggee process exited before connecting");
            self.phase = Phase::AwaitingConfiguration;
        }
        if let Some(debuggee) = self.debuggee.take() {
            debuggee.stop();
        }
        if let Some(code) = code {
            self.send_event("exited", Some(json!({ "exitCode": code })));
        }
        self.send_terminated();
    }

    // ---- disconnect ---------------------------------------------------------

    fn handle_disconnect(&mut self, request: Request) {
        if self.disconnect.is_some() {
            self.respond(&request, true, None, None);
            return;
        }
        let args: DisconnectArguments = arguments(&request).unwrap_or_else(|err| {
            tracing::warn!(target: "mobdebug.dap", error = %err, "ignoring malformed disconnect arguments");
            DisconnectArguments::default()
        });

        // A restarting client keeps its listener claim until the disconnect settles.
        if !args.restart.unwrap_or(false) {
            self.pending_session = None;
        }
        let abandoned = self
            .deferred
            .take()
            .map(|deferred| deferred.request)
            .or_else(|| self.start_request.take());
        if let Some(abandoned) = abandoned {
            self.respond_error(&abandoned, "debug run cancelled by disconnect");
        }

        if args.terminate_debuggee.unwrap_or(false) {
            if let Some(mut process) = self.process.take() {
                process.dispose(true);
            }
            if let Some(debuggee) = self.debuggee.take() {
                debuggee.stop();
            }
            self.complete(&request, None);
            return;
        }

        if let Some(debuggee) = self.debuggee.clone() {
            self.phase = Phase::Disconnecting;
            self.disconnect = Some(request.clone());
            let events = self.events.clone();
            let sent = debuggee.disconnect(request.seq, request.arguments(), move |response| {
                let _ = events.send(BridgeEvent::DisconnectAcknowledged(response));
            });
            if let Err(err) = sent {
                tracing::debug!(target: "mobdebug.dap", error = %err, "could not forward disconnect");
                self.finish_disconnect(None);
                return;
            }

            let events = self.events.clone();
            let timeout = self.context.options.disconnect_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = events.send(BridgeEvent::DisconnectTimeout);
            });
            return;
        }

        if let Some(mut process) = self.process.take() {
            process.dispose(false);
        }
        self.complete(&request, None);
    }

    /// Settle an in-flight disconnect. Runs once; later callers find the latch empty.
    fn finish_disconnect(&mut self, acknowledgement: Option<Value>) {
        let Some(request) = self.disconnect.take() else {
            return;
        };
        if let Some(mut process) = self.process.take() {
            process.dispose(false);
        }
        if let Some(debuggee) = self.debuggee.take() {
            debuggee.stop();
        }
        self.complete(&request, acknowledgement);
    }

    fn complete(&mut self, request: &Request, acknowledgement: Option<Value>) {
        // Nothing can attach to a finished bridge.
        self.pending_session = None;
        match acknowledgement {
            Some(ack) => {
                let success = ack.get("success").and_then(Value::as_bool).unwrap_or(true);
                let body = ack.get("body").filter(|body| !body.is_null()).cloned();
                let message = ack.get("message").and_then(Value::as_str).map(str::to_owned);
                self.respond(request, success, body, message);
            }
            None => self.respond(request, true, None, None),
        }
        self.phase = Phase::Terminated;
    }

    /// The client went away: drop everything this bridge holds.
    fn shutdown(&mut self) {
        self.deferred = None;
        self.start_request = None;
        self.pending_session = None;
        self.disconnect = None;
        if let Some(mut process) = self.process.take() {
            process.dispose(false);
        }
        if let Some(debuggee) = self.debuggee.take() {
            debuggee.stop();
        }
        self.phase = Phase::Terminated;
    }
}
