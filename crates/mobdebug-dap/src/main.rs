use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use mobdebug_config::{AdapterConfig, TransportKind};
use mobdebug_dap::server::{self, PipeServer, TcpServer};
use mobdebug_dap::BridgeContext;
use mobdebug_process::SystemLauncher;
use mobdebug_wire::ListenerRegistry;

/// MobDebug Debug Adapter Protocol server.
///
/// Speaks DAP to the editor over stdio (the default), TCP or a local pipe and
/// bridges it to Lua programs running the MobDebug client.
#[derive(Debug, Parser)]
#[command(name = "mobdebug-dap", version, about)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// If unset, `MOBDEBUG_CONFIG` is used as a fallback. When neither are
    /// provided the adapter uses in-memory defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve DAP over stdin/stdout.
    #[arg(long, conflicts_with_all = ["tcp", "pipe"])]
    stdio: bool,

    /// Accept DAP clients on a TCP address, e.g. `127.0.0.1:4711`.
    #[arg(long, value_name = "ADDR", conflicts_with = "pipe")]
    tcp: Option<String>,

    /// Accept DAP clients on a local socket / named pipe. Without a value a
    /// per-process name is generated and printed.
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    pipe: Option<Option<PathBuf>>,

    /// Append logs to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log filter, e.g. `info` or `mobdebug.wire=trace`.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,

    /// Directory holding the Lua side of the debugger.
    #[arg(long, value_name = "DIR")]
    runtime_path: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AdapterConfig::discover(cli.config.clone()).unwrap_or_else(|err| {
        eprintln!("mobdebug-dap: failed to load config: {err}; continuing with defaults");
        AdapterConfig::default()
    });
    apply_cli(&cli, &mut config);
    mobdebug_config::init_tracing(&config.logging);

    let launcher = SystemLauncher {
        runtime_path: config.launch.runtime_path.clone(),
        ..SystemLauncher::default()
    };
    let context = BridgeContext::new(ListenerRegistry::global(), Arc::new(launcher));

    match config.adapter.transport {
        TransportKind::Stdio => server::run_stdio(context).await,
        TransportKind::Tcp => {
            let server = TcpServer::bind(&config.adapter.listen).await?;
            eprintln!("mobdebug-dap: listening on {}", server.local_addr()?);
            server.serve(context, CancellationToken::new()).await
        }
        TransportKind::Pipe => {
            let path = config
                .adapter
                .pipe
                .clone()
                .unwrap_or_else(|| PathBuf::from(server::default_pipe_name()));
            let server = PipeServer::bind(&path)?;
            eprintln!("mobdebug-dap: listening on {}", server.path().display());
            server.serve(context, CancellationToken::new()).await
        }
    }
}

fn apply_cli(cli: &Cli, config: &mut AdapterConfig) {
    if cli.stdio {
        config.adapter.transport = TransportKind::Stdio;
    }
    if let Some(addr) = &cli.tcp {
        config.adapter.transport = TransportKind::Tcp;
        config.adapter.listen = addr.clone();
    }
    if let Some(pipe) = &cli.pipe {
        config.adapter.transport = TransportKind::Pipe;
        if let Some(path) = pipe {
            config.adapter.pipe = Some(path.clone());
        }
    }
    if let Some(path) = &cli.log_file {
        config.logging.file = Some(path.clone());
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(path) = &cli.runtime_path {
        config.launch.runtime_path = Some(path.clone());
    }
}
