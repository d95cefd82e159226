//! DevTools bridge: the WebSocket side of the daemon
//!
//! Runtime backends connect here speaking the Wall protocol: JSON text
//! frames shaped `{"event": "...", "payload": ...}`. The bridge performs
//! the frontend handshake, forwards operations batches into the tree,
//! routes profiling payloads, and correlates `inspectElement` round
//! trips with their responses.

pub mod connection;
pub mod inspect;
pub mod wall;

pub use connection::handle_connection;
pub use inspect::{Hook, InspectedElement};
pub use wall::WallMessage;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::daemon::Daemon;

/// Accept runtime connections until shutdown is signalled
pub async fn run_bridge(listener: TcpListener, daemon: Arc<Daemon>) {
    let mut shutdown_rx = daemon.subscribe_shutdown();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!(%addr, "runtime connection accepted");
                        let daemon = Arc::clone(&daemon);
                        tokio::spawn(async move {
                            handle_connection(stream, daemon).await;
                        });
                    }
                    Err(e) => {
                        error!("failed to accept runtime connection: {e}");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("bridge listener shutting down");
                break;
            }
        }
    }
}
