//! Per-peer WebSocket state machine
//!
//! Each runtime backend gets one task: it demuxes inbound Wall events
//! into the orchestrator, drains the outbound queue the orchestrator
//! broadcasts into, and cleans up the peer's subtrees on close.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::bridge::wall::{
    WallMessage, ACK_EVENTS, EV_BACKEND_INITIALIZED, EV_BACKEND_VERSION, EV_INSPECTED_ELEMENT,
    EV_OPERATIONS, EV_PROFILING_DATA, EV_RENDERER, EV_RENDERER_ATTACHED, EV_SHUTDOWN,
    HANDSHAKE_EVENTS,
};
use crate::daemon::Daemon;
use crate::wire::OpsDecoder;

/// Accept one runtime connection and run it to completion
pub async fn handle_connection(stream: TcpStream, daemon: Arc<Daemon>) {
    let addr = stream.peer_addr().ok();

    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed: {e}");
            return;
        }
    };

    let mut peer = PeerState::new(ws, daemon);
    peer.run().await;

    info!(?addr, "runtime connection closed");
}

struct PeerState {
    ws: WebSocketStream<TcpStream>,
    daemon: Arc<Daemon>,
    peer_id: String,
    /// Extended-ADD latch lives here: per connection, sticky
    decoder: OpsDecoder,
    outbound_rx: mpsc::UnboundedReceiver<WallMessage>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl PeerState {
    fn new(ws: WebSocketStream<TcpStream>, daemon: Arc<Daemon>) -> Self {
        let peer_id = format!(
            "peer_{}",
            uuid::Uuid::new_v4()
                .to_string()
                .split('-')
                .next()
                .unwrap()
        );
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shutdown_rx = daemon.subscribe_shutdown();
        daemon.register_peer(&peer_id, outbound_tx);
        Self {
            ws,
            daemon,
            peer_id,
            decoder: OpsDecoder::new(),
            outbound_rx,
            shutdown_rx,
        }
    }

    async fn run(&mut self) {
        loop {
            tokio::select! {
                msg = self.ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !self.handle_text(&text).await {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            debug!(peer = self.peer_id, "peer requested close");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = self.ws.send(Message::Pong(data)).await;
                        }
                        Some(Err(e)) => {
                            warn!(peer = self.peer_id, "WebSocket error: {e}");
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }

                out = self.outbound_rx.recv() => {
                    match out {
                        Some(message) => {
                            if self.send(&message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    let _ = self.ws.close(None).await;
                    break;
                }
            }
        }

        self.daemon.unregister_peer(&self.peer_id);
    }

    /// Returns false when the connection should close
    async fn handle_text(&mut self, text: &str) -> bool {
        // Unparseable frames are discarded per-frame, connection stays up
        let message: WallMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                debug!(peer = self.peer_id, "discarding unparseable frame: {e}");
                return true;
            }
        };

        match message.event.as_str() {
            EV_BACKEND_INITIALIZED => {
                debug!(peer = self.peer_id, "backend initialized, sending handshake");
                for event in HANDSHAKE_EVENTS {
                    if self.send(&WallMessage::bare(event)).await.is_err() {
                        return false;
                    }
                }
            }
            EV_OPERATIONS => self.handle_operations(&message.payload),
            EV_INSPECTED_ELEMENT => self.daemon.resolve_inspection(&message.payload),
            EV_PROFILING_DATA => self.daemon.ingest_profiling(&message.payload),
            EV_RENDERER | EV_RENDERER_ATTACHED => {
                self.daemon.record_renderer(&self.peer_id, &message.payload);
            }
            EV_SHUTDOWN => {
                info!(peer = self.peer_id, "peer sent shutdown");
                return false;
            }
            EV_BACKEND_VERSION => {
                if let Some(version) = message.payload.as_str() {
                    info!(peer = self.peer_id, version, "backend version");
                }
            }
            event if ACK_EVENTS.contains(&event) => {
                debug!(peer = self.peer_id, event, "acknowledged");
            }
            event => {
                debug!(peer = self.peer_id, event, "ignoring unknown event");
            }
        }
        true
    }

    fn handle_operations(&mut self, payload: &serde_json::Value) {
        let Some(values) = payload.as_array() else {
            debug!(peer = self.peer_id, "operations payload is not an array");
            return;
        };
        let ints: Vec<i64> = values
            .iter()
            .filter_map(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .collect();
        if ints.len() != values.len() {
            debug!(peer = self.peer_id, "operations payload has non-numeric entries");
            return;
        }

        match self.decoder.decode(&ints) {
            Ok(batch) => self.daemon.apply_operations(&self.peer_id, &batch),
            Err(e) => {
                // Drop the batch, keep the connection: batches are
                // self-contained and the next one realigns
                warn!(peer = self.peer_id, "dropping malformed batch: {e}");
            }
        }
    }

    async fn send(&mut self, message: &WallMessage) -> Result<(), ()> {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                error!(peer = self.peer_id, "failed to serialize message: {e}");
                return Ok(());
            }
        };
        self.ws.send(Message::Text(json)).await.map_err(|e| {
            warn!(peer = self.peer_id, "failed to send frame: {e}");
        })
    }
}
