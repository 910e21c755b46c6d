//! Shared fixtures: an in-memory DAP client and a launcher whose "processes"
//! connect a [`MockDebuggee`] instead of running Lua.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use mobdebug_config::SessionConfig;
use mobdebug_dap::dap_tokio::{DapReader, DapWriter};
use mobdebug_dap::{run_bridge, BridgeContext, BridgeError, BridgeOptions};
use mobdebug_process::{
    DebuggeeProcess, ExitCallback, LaunchError, OutputCategory, ProcessLauncher, ProcessOutput,
};
use mobdebug_wire::mock::{MockDebuggee, MockDebuggeeConfig};
use mobdebug_wire::ListenerRegistry;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn fast_options() -> BridgeOptions {
    BridgeOptions {
        configuration_timeout: Duration::from_millis(200),
        disconnect_timeout: Duration::from_millis(300),
    }
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn is_event(message: &Value, name: &str) -> bool {
    message["type"] == "event" && message["event"] == name
}

/// A DAP client talking to a bridge over an in-memory pipe.
pub struct TestClient {
    reader: DapReader<ReadHalf<DuplexStream>>,
    writer: DapWriter<WriteHalf<DuplexStream>>,
    next_seq: i64,
    seen: Vec<Value>,
    consumed: Vec<bool>,
    task: JoinHandle<Result<(), BridgeError>>,
}

impl TestClient {
    pub fn spawn(context: BridgeContext) -> Self {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let task = tokio::spawn(run_bridge(server_read, server_write, context));

        let (client_read, client_write) = tokio::io::split(client);
        Self {
            reader: DapReader::new(client_read),
            writer: DapWriter::new(client_write),
            next_seq: 1,
            seen: Vec::new(),
            consumed: Vec::new(),
            task,
        }
    }

    pub async fn send(&mut self, command: &str, arguments: Value) -> i64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let mut message = json!({ "seq": seq, "type": "request", "command": command });
        if !arguments.is_null() {
            message["arguments"] = arguments;
        }
        self.writer.write_value(&message).await.unwrap();
        seq
    }

    pub async fn request(&mut self, command: &str, arguments: Value) -> Value {
        let seq = self.send(command, arguments).await;
        self.response(seq).await
    }

    pub async fn response(&mut self, request_seq: i64) -> Value {
        self.wait_for(&format!("response to {request_seq}"), |message| {
            message["type"] == "response" && message["request_seq"] == request_seq
        })
        .await
    }

    pub async fn event(&mut self, name: &str) -> Value {
        self.wait_for(&format!("{name} event"), |message| is_event(message, name))
            .await
    }

    /// Every message received so far, consumed or not.
    pub fn seen(&self) -> &[Value] {
        &self.seen
    }

    pub fn count_events(&self, name: &str) -> usize {
        self.seen.iter().filter(|message| is_event(message, name)).count()
    }

    pub fn count_responses(&self, request_seq: i64) -> usize {
        self.seen
            .iter()
            .filter(|message| message["type"] == "response" && message["request_seq"] == request_seq)
            .count()
    }

    /// Keep reading for `window` so late duplicates would show up in [`Self::seen`].
    pub async fn drain(&mut self, window: Duration) {
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            match tokio::time::timeout(remaining, self.reader.read_value()).await {
                Ok(Ok(Some(message))) => self.push(message),
                Ok(_) | Err(_) => return,
            }
        }
    }

    /// Close the client side and wait for the bridge to finish.
    pub async fn close(self) -> Result<(), BridgeError> {
        let Self { writer, reader, task, .. } = self;
        drop(writer);
        drop(reader);
        tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap()
    }

    fn push(&mut self, message: Value) {
        self.seen.push(message);
        self.consumed.push(false);
    }

    async fn wait_for(&mut self, what: &str, predicate: impl Fn(&Value) -> bool) -> Value {
        let deadline = Instant::now() + TIMEOUT;
        let mut index = 0;
        loop {
            while index < self.seen.len() {
                if !self.consumed[index] && predicate(&self.seen[index]) {
                    self.consumed[index] = true;
                    return self.seen[index].clone();
                }
                index += 1;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = tokio::time::timeout(remaining, self.reader.read_value())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {what}; seen: {:?}", self.seen))
                .unwrap()
                .unwrap_or_else(|| panic!("bridge closed while waiting for {what}"));
            self.push(message);
        }
    }
}

/// What a fake process does once `run` is called.
#[derive(Clone, Debug)]
pub enum FakeBehavior {
    /// Connect a mock debuggee to the configured port, like the injected bootstrap would.
    ConnectDebuggee(MockDebuggeeConfig),
    /// Exit straight away with this code.
    Exit(Option<i32>),
    /// Stay running until the test calls [`FakeLauncher::exit`].
    Idle,
}

#[derive(Default)]
struct LauncherState {
    configs: Vec<SessionConfig>,
    disposals: Vec<bool>,
    debuggees: Vec<Arc<MockDebuggee>>,
    exit: Option<ExitCallback>,
    output: Option<Arc<dyn ProcessOutput>>,
}

pub struct FakeLauncher {
    behavior: FakeBehavior,
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    pub fn new(behavior: FakeBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            state: Arc::default(),
        })
    }

    pub fn configs(&self) -> Vec<SessionConfig> {
        self.state.lock().configs.clone()
    }

    pub fn disposals(&self) -> Vec<bool> {
        self.state.lock().disposals.clone()
    }

    pub async fn debuggee(&self) -> Arc<MockDebuggee> {
        let state = self.state.clone();
        wait_until(move || !state.lock().debuggees.is_empty()).await;
        self.state.lock().debuggees[0].clone()
    }

    /// Report output as the running process.
    pub fn print(&self, category: OutputCategory, text: &str) {
        let output = self.state.lock().output.clone();
        if let Some(output) = output {
            output.output(category, text.to_owned());
        }
    }

    /// Make the running process exit.
    pub fn exit(&self, code: Option<i32>) {
        let exit = self.state.lock().exit.take();
        if let Some(exit) = exit {
            exit(code);
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn create(
        &self,
        config: &SessionConfig,
        output: Arc<dyn ProcessOutput>,
    ) -> Result<Box<dyn DebuggeeProcess>, LaunchError> {
        let mut state = self.state.lock();
        state.configs.push(config.clone());
        state.output = Some(output.clone());
        Ok(Box::new(FakeProcess {
            behavior: self.behavior.clone(),
            port: config.debuggee_port,
            output,
            state: self.state.clone(),
        }))
    }
}

struct FakeProcess {
    behavior: FakeBehavior,
    port: u16,
    output: Arc<dyn ProcessOutput>,
    state: Arc<Mutex<LauncherState>>,
}

impl DebuggeeProcess for FakeProcess {
    fn run(&mut self, on_exit: ExitCallback) {
        self.output.output(OutputCategory::Console, "Process started".to_owned());
        match self.behavior.clone() {
            FakeBehavior::ConnectDebuggee(config) => {
                self.state.lock().exit = Some(on_exit);
                let state = self.state.clone();
                let addr = std::net::SocketAddr::from(([127, 0, 0, 1], self.port));
                tokio::spawn(async move {
                    let debuggee = MockDebuggee::connect_with_config(addr, config).await.unwrap();
                    state.lock().debuggees.push(Arc::new(debuggee));
                });
            }
            FakeBehavior::Exit(code) => {
                tokio::spawn(async move { on_exit(code) });
            }
            FakeBehavior::Idle => {
                self.state.lock().exit = Some(on_exit);
            }
        }
    }

    fn dispose(&mut self, terminate: bool) {
        let mut state = self.state.lock();
        state.disposals.push(terminate);
        state.exit = None;
        state.output = None;
    }
}

pub struct Fixture {
    pub client: TestClient,
    pub launcher: Arc<FakeLauncher>,
    pub registry: Arc<ListenerRegistry>,
}

impl Fixture {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self::with_options(behavior, fast_options())
    }

    pub fn with_options(behavior: FakeBehavior, options: BridgeOptions) -> Self {
        let launcher = FakeLauncher::new(behavior);
        let registry = ListenerRegistry::new();
        let context = BridgeContext::new(registry.clone(), launcher.clone()).with_options(options);
        Self {
            client: TestClient::spawn(context),
            launcher,
            registry,
        }
    }

    /// `initialize`, `configurationDone`, then a `launch` on a wildcard port.
    /// Returns once the launch has been answered.
    pub async fn launch(&mut self, arguments: Value) -> Value {
        let init = self.client.request("initialize", json!({ "adapterID": "lua" })).await;
        assert_eq!(init["success"], true, "{init}");
        let done = self.client.request("configurationDone", Value::Null).await;
        assert_eq!(done["success"], true, "{done}");

        let mut arguments = arguments;
        if arguments.get("listenPort").is_none() {
            arguments["listenPort"] = json!(0);
        }
        self.client.request("launch", arguments).await
    }
}
