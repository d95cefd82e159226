//! IPC socket server: accept, frame, dispatch

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info};

use crate::daemon::Daemon;
use crate::ipc::protocol::{Request, Response, KNOWN_REQUEST_TYPES};

/// Accept IPC clients until shutdown is signalled
pub async fn run_ipc_server(listener: UnixListener, daemon: Arc<Daemon>) {
    let mut shutdown_rx = daemon.subscribe_shutdown();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let daemon = Arc::clone(&daemon);
                        tokio::spawn(async move {
                            handle_client(stream, daemon).await;
                        });
                    }
                    Err(e) => {
                        error!("failed to accept IPC client: {e}");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("IPC listener shutting down");
                break;
            }
        }
    }
}

/// One client connection: a request line in, a response line out, until
/// the client hangs up. A malformed line gets an error response and the
/// connection stays open.
async fn handle_client(stream: UnixStream, daemon: Arc<Daemon>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match parse_request(line) {
            Ok(request) => {
                debug!(?request, "dispatching IPC request");
                daemon.handle_request(request).await
            }
            Err(response) => response,
        };

        let mut out = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"ok":false,"error":"Internal error"}"#.to_string());
        out.push('\n');
        // A client that vanished mid-response just loses it; the work
        // above has already completed
        if write_half.write_all(out.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// Parse one request line, distinguishing unknown command types from
/// outright malformed JSON
fn parse_request(line: &str) -> Result<Request, Response> {
    let value: serde_json::Value =
        serde_json::from_str(line).map_err(|_| Response::failure("Invalid JSON"))?;

    match serde_json::from_value::<Request>(value.clone()) {
        Ok(request) => Ok(request),
        Err(_) => {
            let kind = value.get("type").and_then(serde_json::Value::as_str);
            match kind {
                Some(t) if !KNOWN_REQUEST_TYPES.contains(&t) => {
                    Err(Response::failure(format!("Unknown command: {t}")))
                }
                _ => Err(Response::failure("Invalid JSON")),
            }
        }
    }
}
