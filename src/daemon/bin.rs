//! Daemon binary entry point
//!
//! Binds the WebSocket bridge (runtimes) and the IPC socket (clients),
//! claims the state directory, and runs until SIGTERM/SIGINT or an IPC
//! `shutdown` request.
//!
//! # Usage
//!
//! ```bash
//! agent-devtools-daemon --port 8097
//! agent-devtools-daemon --state-dir /tmp/devtools-state
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::{TcpListener, UnixListener};
use tracing::info;

use agent_react_devtools::bridge;
use agent_react_devtools::daemon::{acquire_state_dir, release_state_dir, Daemon};
use agent_react_devtools::ipc;
use agent_react_devtools::paths::StatePaths;

#[derive(Parser, Debug)]
#[command(name = "agent-devtools-daemon")]
#[command(about = "Bridges React DevTools backends to local agent and CLI clients")]
struct Args {
    /// WebSocket port runtime backends connect to
    #[arg(long, default_value_t = 8097)]
    port: u16,

    /// State directory (default: ~/.agent-react-devtools)
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agent_react_devtools=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let paths = StatePaths::resolve(args.state_dir.as_deref())?;
    acquire_state_dir(&paths, args.port)?;

    let daemon = Arc::new(Daemon::new(args.port));

    // Either bind failing is fatal; the record is released so a retry
    // doesn't see a live daemon.json from this half-started process
    let listeners = bind_listeners(&paths, args.port).await;
    let (ws_listener, ipc_listener) = match listeners {
        Ok(pair) => pair,
        Err(e) => {
            release_state_dir(&paths);
            return Err(e);
        }
    };

    info!(
        port = args.port,
        socket = %paths.socket_path.display(),
        "daemon listening"
    );

    tokio::spawn(bridge::run_bridge(ws_listener, Arc::clone(&daemon)));
    tokio::spawn(ipc::run_ipc_server(ipc_listener, Arc::clone(&daemon)));

    wait_for_shutdown(&daemon).await;
    daemon.trigger_shutdown();
    // Let peer tasks observe the broadcast and close their sockets
    tokio::time::sleep(Duration::from_millis(100)).await;

    release_state_dir(&paths);
    info!("daemon stopped");
    Ok(())
}

async fn bind_listeners(
    paths: &StatePaths,
    port: u16,
) -> anyhow::Result<(TcpListener, UnixListener)> {
    let ws_listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind WebSocket port {port}"))?;

    let ipc_listener = UnixListener::bind(&paths.socket_path)
        .with_context(|| format!("failed to bind socket {}", paths.socket_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(
            &paths.socket_path,
            std::fs::Permissions::from_mode(0o600),
        )
        .with_context(|| "failed to set socket permissions")?;
    }

    Ok((ws_listener, ipc_listener))
}

async fn wait_for_shutdown(daemon: &Arc<Daemon>) {
    let mut shutdown_rx = daemon.subscribe_shutdown();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                let _ = shutdown_rx.recv().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = shutdown_rx.recv() => info!("shutdown requested over IPC"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received interrupt"),
            _ = shutdown_rx.recv() => info!("shutdown requested over IPC"),
        }
    }
}
