//! Orchestrator state and IPC command handling

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::bridge::inspect::{parse_inspected_payload, InspectedElement};
use crate::bridge::wall::{
    WallMessage, EV_INSPECT_ELEMENT, EV_START_PROFILING, EV_STOP_PROFILING,
};
use crate::error::DevtoolsError;
use crate::health::ConnectionHealth;
use crate::ipc::{ComponentRef, Request, Response, WaitKind};
use crate::profiler::Profiler;
use crate::tree::ComponentTree;
use crate::wait::{WaitCondition, WaitRegistry};
use crate::wire::DecodedBatch;

/// How long an `inspectElement` round trip may stay outstanding
const INSPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Drain window for trailing `profilingData` after a stop broadcast
const PROFILE_STOP_GRACE: Duration = Duration::from_millis(200);

/// Default `wait` deadline when the client gives none
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Default truncation for list-shaped profiling queries
const DEFAULT_LIMIT: usize = 10;

/// Outbound handle plus per-connection bookkeeping for one runtime peer
struct PeerHandle {
    outbound: mpsc::UnboundedSender<WallMessage>,
    /// Root ids attributed to this connection, removed on disconnect
    roots: HashSet<u32>,
    renderer_id: Option<u32>,
}

/// One outstanding inspection: generation guards against a replaced
/// resolver being cleaned up by the waiter it replaced
struct PendingInspection {
    generation: u64,
    tx: oneshot::Sender<Option<InspectedElement>>,
}

/// The daemon orchestrator. Single instance per process, shared as
/// `Arc<Daemon>` by the bridge and the IPC server.
pub struct Daemon {
    port: u16,
    started_at: Instant,
    tree: RwLock<ComponentTree>,
    profiler: Mutex<Profiler>,
    health: Mutex<ConnectionHealth>,
    waits: Mutex<WaitRegistry>,
    pending: Mutex<HashMap<u32, PendingInspection>>,
    next_generation: Mutex<u64>,
    peers: Mutex<HashMap<String, PeerHandle>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
    pub fn new(port: u16) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            port,
            started_at: Instant::now(),
            tree: RwLock::new(ComponentTree::new()),
            profiler: Mutex::new(Profiler::new()),
            health: Mutex::new(ConnectionHealth::new()),
            waits: Mutex::new(WaitRegistry::new()),
            pending: Mutex::new(HashMap::new()),
            next_generation: Mutex::new(0),
            peers: Mutex::new(HashMap::new()),
            shutdown_tx,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    // ========================================================================
    // Shutdown fan-out
    // ========================================================================

    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn trigger_shutdown(&self) {
        info!("shutdown requested");
        let _ = self.shutdown_tx.send(());
    }

    // ========================================================================
    // Peer lifecycle (called by bridge connection tasks)
    // ========================================================================

    pub fn register_peer(&self, peer_id: &str, outbound: mpsc::UnboundedSender<WallMessage>) {
        self.peers.lock().insert(
            peer_id.to_string(),
            PeerHandle {
                outbound,
                roots: HashSet::new(),
                renderer_id: None,
            },
        );
        self.health.lock().record_connect();
        self.waits.lock().notify_connected();
        info!(peer = peer_id, "runtime peer registered");
    }

    /// Remove a peer and exactly the roots it owned
    pub fn unregister_peer(&self, peer_id: &str) {
        let Some(handle) = self.peers.lock().remove(peer_id) else {
            return;
        };
        let root_count = handle.roots.len();
        {
            let mut tree = self.tree.write();
            for root in &handle.roots {
                tree.remove_root(*root);
            }
        }
        self.health.lock().record_disconnect();
        info!(
            peer = peer_id,
            renderer = ?handle.renderer_id,
            roots = root_count,
            "runtime peer disconnected, subtrees removed"
        );
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn component_count(&self) -> usize {
        self.tree.read().node_count()
    }

    pub fn record_renderer(&self, peer_id: &str, payload: &Value) {
        let renderer_id = payload
            .get("id")
            .and_then(Value::as_u64)
            .or_else(|| payload.as_u64());
        if let Some(handle) = self.peers.lock().get_mut(peer_id) {
            handle.renderer_id = renderer_id.map(|id| id as u32);
        }
        debug!(peer = peer_id, renderer = ?renderer_id, "renderer recorded");
    }

    /// Apply one decoded operations batch from a peer: attribute the root,
    /// mutate the tree, then signal waiters with what was added
    pub fn apply_operations(&self, peer_id: &str, batch: &DecodedBatch) {
        if let Some(handle) = self.peers.lock().get_mut(peer_id) {
            handle.roots.insert(batch.root_id);
        }
        let added = self.tree.write().apply(batch);
        if !added.is_empty() {
            self.waits.lock().notify_added(&added);
        }
    }

    /// Route an `inspectedElement` payload to its pending inspection.
    /// Non-data response types resolve the waiter with None.
    pub fn resolve_inspection(&self, payload: &Value) {
        let Some(id) = payload.get("id").and_then(Value::as_u64).map(|v| v as u32) else {
            debug!("inspectedElement without id, ignoring");
            return;
        };
        let response_type = payload.get("type").and_then(Value::as_str).unwrap_or("");
        let element = match response_type {
            "full-data" | "hydrated-path" => parse_inspected_payload(id, payload),
            _ => None,
        };

        if let Some(pending) = self.pending.lock().remove(&id) {
            let _ = pending.tx.send(element);
        } else {
            debug!(id, "inspectedElement with no pending inspection");
        }
    }

    pub fn ingest_profiling(&self, payload: &Value) {
        self.profiler.lock().process_payload(payload);
    }

    /// Send a Wall message to every connected peer; returns how many
    /// peers were addressed
    pub fn broadcast(&self, message: &WallMessage) -> usize {
        let peers = self.peers.lock();
        for handle in peers.values() {
            let _ = handle.outbound.send(message.clone());
        }
        peers.len()
    }

    // ========================================================================
    // Inspection round trip
    // ========================================================================

    /// Inspect a component by id. Resolves None immediately for unknown
    /// nodes or when no peers are connected; otherwise broadcasts
    /// `inspectElement` and suspends until the response or the deadline.
    pub async fn inspect(&self, id: u32) -> Option<InspectedElement> {
        let renderer_id = {
            let tree = self.tree.read();
            tree.get_node(id)?.renderer_id
        };
        if self.peer_count() == 0 {
            debug!(id, "inspect with no peers, resolving null");
            return None;
        }

        let (tx, rx) = oneshot::channel();
        let generation = {
            let mut counter = self.next_generation.lock();
            *counter += 1;
            *counter
        };
        // A duplicate request for the same id replaces its resolver; the
        // replaced waiter observes a closed channel
        self.pending
            .lock()
            .insert(id, PendingInspection { generation, tx });

        let message = WallMessage::with_payload(
            EV_INSPECT_ELEMENT,
            json!({
                "id": id,
                "rendererID": renderer_id,
                "forceFullData": true,
                "requestID": id,
                "path": null,
            }),
        );
        self.broadcast(&message);

        match tokio::time::timeout(INSPECT_TIMEOUT, rx).await {
            Ok(Ok(element)) => element,
            Ok(Err(_)) => {
                debug!(id, "inspection resolver replaced");
                None
            }
            Err(_) => {
                let mut pending = self.pending.lock();
                if pending.get(&id).is_some_and(|p| p.generation == generation) {
                    pending.remove(&id);
                }
                warn!(id, "inspection timed out");
                None
            }
        }
    }

    // ========================================================================
    // IPC command handling
    // ========================================================================

    pub async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::ok(),
            Request::Status => self.handle_status(),
            Request::GetTree { depth } => self.handle_get_tree(depth),
            Request::GetComponent { id } => self.handle_get_component(id).await,
            Request::Find { name, exact } => self.handle_find(&name, exact),
            Request::Count => self.handle_count(),
            Request::ProfileStart { name } => self.handle_profile_start(name),
            Request::ProfileStop => self.handle_profile_stop().await,
            Request::ProfileReport { component_id } => self.handle_profile_report(component_id),
            Request::ProfileSlow { limit } => {
                let tree = self.tree.read();
                let reports = self
                    .profiler
                    .lock()
                    .get_slowest(&tree, limit.unwrap_or(DEFAULT_LIMIT));
                Response::success(json!(reports))
            }
            Request::ProfileRerenders { limit } => {
                let tree = self.tree.read();
                let reports = self
                    .profiler
                    .lock()
                    .get_most_rerenders(&tree, limit.unwrap_or(DEFAULT_LIMIT));
                Response::success(json!(reports))
            }
            Request::ProfileTimeline { limit } => {
                let entries = self.profiler.lock().get_timeline(limit);
                Response::success(json!(entries))
            }
            Request::ProfileCommit { index, limit } => {
                let tree = self.tree.read();
                match self.profiler.lock().get_commit_details(
                    index,
                    &tree,
                    limit.unwrap_or(DEFAULT_LIMIT),
                ) {
                    Some(details) => Response::success(json!(details)),
                    None => Response::failure(format!("Commit {index} not found")),
                }
            }
            Request::Wait {
                condition,
                name,
                timeout,
            } => self.handle_wait(condition, name, timeout).await,
            Request::Shutdown => {
                self.trigger_shutdown();
                Response::ok()
            }
        }
    }

    fn handle_status(&self) -> Response {
        let health = self.health.lock().snapshot();
        let component_count = self.tree.read().node_count();
        let profiling_active = self.profiler.lock().is_active();
        Response::success(json!({
            "daemonRunning": true,
            "port": self.port,
            "connectedApps": health.connected_apps,
            "componentCount": component_count,
            "profilingActive": profiling_active,
            "uptime": self.started_at.elapsed().as_millis() as u64,
            "connection": health,
        }))
    }

    fn handle_get_tree(&self, depth: Option<usize>) -> Response {
        let entries = self.tree.write().flatten(depth);
        let hint = if entries.is_empty() {
            self.health
                .lock()
                .recent_disconnect()
                .map(|ts| {
                    format!(
                        "app disconnected {} ago, waiting for reconnect...",
                        humanize_ago(Utc::now() - ts)
                    )
                })
        } else {
            None
        };
        Response::success(json!(entries)).with_hint(hint)
    }

    async fn handle_get_component(&self, reference: ComponentRef) -> Response {
        let label = match &reference {
            ComponentRef::Label(label) if label.starts_with('@') => Some(label.clone()),
            _ => None,
        };
        let Some(id) = self.resolve_ref(&reference) else {
            return Response::failure(
                DevtoolsError::component_not_found(&reference).to_string(),
            )
            .with_label(label);
        };
        match self.inspect(id).await {
            Some(element) => Response::success(json!(element)).with_label(label),
            None => Response::failure(
                DevtoolsError::component_not_found(&reference).to_string(),
            )
            .with_label(label),
        }
    }

    fn handle_find(&self, name: &str, exact: bool) -> Response {
        let matches = self.tree.read().find_by_name(name, exact);
        Response::success(json!(matches))
    }

    fn handle_count(&self) -> Response {
        let tree = self.tree.read();
        let by_kind: serde_json::Map<String, Value> = tree
            .count_by_kind()
            .into_iter()
            .map(|(kind, count)| (kind.as_str().to_string(), json!(count)))
            .collect();
        Response::success(json!({
            "total": tree.node_count(),
            "byKind": by_kind,
        }))
    }

    fn handle_profile_start(&self, name: Option<String>) -> Response {
        {
            let tree = self.tree.read();
            self.profiler.lock().start(name.clone(), &tree);
        }
        self.broadcast(&WallMessage::bare(EV_START_PROFILING));
        Response::success(json!({
            "started": true,
            "name": name.unwrap_or_else(|| "unnamed".to_string()),
        }))
    }

    async fn handle_profile_stop(&self) -> Response {
        if !self.profiler.lock().is_active() {
            return Response::failure("No active profiling session");
        }
        self.broadcast(&WallMessage::bare(EV_STOP_PROFILING));
        // Grace window: trailing profilingData keeps arriving through the
        // connection tasks while we sleep
        tokio::time::sleep(PROFILE_STOP_GRACE).await;

        let tree = self.tree.read();
        match self.profiler.lock().stop(&tree) {
            Ok(summary) => Response::success(json!(summary)),
            Err(err) => Response::failure(err.to_string()),
        }
    }

    fn handle_profile_report(&self, reference: ComponentRef) -> Response {
        let Some(id) = self.resolve_ref(&reference) else {
            return Response::failure(
                DevtoolsError::component_not_found(&reference).to_string(),
            );
        };
        let tree = self.tree.read();
        match self.profiler.lock().get_report(id, &tree) {
            Some(report) => Response::success(json!(report)),
            None => Response::failure(format!(
                "No render data recorded for component {reference}"
            )),
        }
    }

    async fn handle_wait(
        &self,
        condition: WaitKind,
        name: Option<String>,
        timeout: Option<u64>,
    ) -> Response {
        let condition = match condition {
            WaitKind::Connected => WaitCondition::AppConnected,
            WaitKind::Component => match name {
                Some(name) => WaitCondition::NamedComponentPresent(name),
                None => return Response::failure("wait condition 'component' requires a name"),
            },
        };
        let condition_name = condition.name();

        // Evaluate immediately before registering
        let met_now = match &condition {
            WaitCondition::AppConnected => self.health.lock().live_connections() > 0,
            WaitCondition::NamedComponentPresent(name) => {
                self.tree.read().has_component_named(name)
            }
        };
        if met_now {
            return Response::success(json!({"met": true, "condition": condition_name}));
        }

        let (tx, rx) = oneshot::channel();
        let waiter_id = self.waits.lock().register(condition, tx);
        let deadline = Duration::from_millis(timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS));

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(())) => Response::success(json!({"met": true, "condition": condition_name})),
            Ok(Err(_)) | Err(_) => {
                self.waits.lock().remove(waiter_id);
                Response::success(json!({
                    "met": false,
                    "condition": condition_name,
                    "timeout": true,
                }))
            }
        }
    }

    /// Resolve a client reference to a node id: numeric ids pass through,
    /// `@cN` labels resolve against the most recent tree read, and
    /// numeric strings parse as ids
    fn resolve_ref(&self, reference: &ComponentRef) -> Option<u32> {
        match reference {
            ComponentRef::Id(id) => Some(*id),
            ComponentRef::Label(label) if label.starts_with('@') => {
                self.tree.read().resolve_label(label)
            }
            ComponentRef::Label(text) => text.parse().ok(),
        }
    }
}

/// Compact "12s" / "3m 5s" / "2h 11m" rendering for the disconnect hint
fn humanize_ago(delta: chrono::TimeDelta) -> String {
    let secs = delta.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
