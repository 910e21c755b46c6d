//! Upstream transports. Every accepted client gets its own bridge; bridges
//! only share the process-wide debuggee listener registry.

use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bridge::{run_bridge, BridgeContext};

pub async fn run_stdio(context: BridgeContext) -> Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    run_bridge(stdin, stdout, context).await.map_err(anyhow::Error::from)
}

fn spawn_bridge<S>(stream: S, peer: String, context: BridgeContext)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(target: "mobdebug.dap", %peer, "client connected");
        let (reader, writer) = tokio::io::split(stream);
        match run_bridge(reader, writer, context).await {
            Ok(()) => tracing::info!(target: "mobdebug.dap", %peer, "client disconnected"),
            Err(err) => {
                tracing::warn!(target: "mobdebug.dap", %peer, error = %err, "client connection failed")
            }
        }
    });
}

/// DAP over TCP, one bridge per connection.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind tcp listener {addr}"))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn serve(self, context: BridgeContext, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(target: "mobdebug.dap", %addr, "accepting DAP clients over tcp");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                res = self.listener.accept() => {
                    let (stream, peer) = res.with_context(|| format!("accept tcp {addr}"))?;
                    let _ = stream.set_nodelay(true);
                    spawn_bridge(stream, peer.to_string(), context.clone());
                }
            }
        }
    }
}

/// A pipe name unique to this adapter process.
pub fn default_pipe_name() -> String {
    let pid = std::process::id();
    if cfg!(windows) {
        format!(r"\\.\pipe\mobdebug-dap-{pid}")
    } else {
        std::env::temp_dir()
            .join(format!("mobdebug-dap-{pid}.sock"))
            .display()
            .to_string()
    }
}

/// DAP over a unix domain socket. The socket file is removed on shutdown.
#[cfg(unix)]
pub struct PipeServer {
    path: PathBuf,
    listener: tokio::net::UnixListener,
}

#[cfg(unix)]
impl PipeServer {
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let _ = std::fs::remove_file(&path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create socket dir {parent:?}"))?;
        }
        let listener = tokio::net::UnixListener::bind(&path)
            .with_context(|| format!("bind unix socket {path:?}"))?;
        Ok(Self { path, listener })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn serve(self, context: BridgeContext, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(target: "mobdebug.dap", path = %self.path.display(), "accepting DAP clients over unix socket");
        let outcome = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                res = self.listener.accept() => {
                    match res.with_context(|| format!("accept unix socket {:?}", self.path)) {
                        Ok((stream, _)) => {
                            spawn_bridge(stream, self.path.display().to_string(), context.clone());
                        }
                        Err(err) => break Err(err),
                    }
                }
            }
        };
        let _ = std::fs::remove_file(&self.path);
        outcome
    }
}

/// DAP over a Windows named pipe.
#[cfg(windows)]
pub struct PipeServer {
    name: String,
    server: tokio::net::windows::named_pipe::NamedPipeServer,
}

#[cfg(windows)]
impl PipeServer {
    pub fn bind(name: impl AsRef<std::path::Path>) -> Result<Self> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let name = normalize_pipe_name(&name.as_ref().display().to_string());
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&name)
            .with_context(|| format!("create named pipe {name}"))?;
        Ok(Self { name, server })
    }

    pub fn path(&self) -> &std::path::Path {
        std::path::Path::new(&self.name)
    }

    pub async fn serve(self, context: BridgeContext, shutdown: CancellationToken) -> Result<()> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let Self { name, mut server } = self;
        tracing::info!(target: "mobdebug.dap", %name, "accepting DAP clients over named pipe");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                res = server.connect() => {
                    res.with_context(|| format!("accept named pipe {name}"))?;
                    let next = ServerOptions::new()
                        .create(&name)
                        .with_context(|| format!("create named pipe {name}"))?;
                    let connected = std::mem::replace(&mut server, next);
                    spawn_bridge(connected, name.clone(), context.clone());
                }
            }
        }
    }
}

#[cfg(windows)]
fn normalize_pipe_name(name: &str) -> String {
    if name.starts_with(r"\\.\pipe\") || name.starts_with(r"\\?\pipe\") {
        name.to_string()
    } else {
        format!(r"\\.\pipe\{name}")
    }
}
