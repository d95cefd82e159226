//! Deferred wait conditions
//!
//! Clients can block an IPC `wait` request until the daemon reaches a
//! state: an app connected, or a component with a given display name
//! mounted. Waiters are predicate + one-shot resolver pairs; the
//! orchestrator signals the registry after every event that could change
//! an answer (connection open, nodes added). Deadlines are enforced by
//! the awaiting request handler, which deregisters on timeout.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::debug;

use crate::tree::AddedSummary;

/// What a waiter is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    AppConnected,
    /// Case-sensitive exact display-name match
    NamedComponentPresent(String),
}

impl WaitCondition {
    /// Condition name echoed back in `wait` responses
    pub fn name(&self) -> &'static str {
        match self {
            Self::AppConnected => "connected",
            Self::NamedComponentPresent(_) => "component",
        }
    }
}

struct Waiter {
    condition: WaitCondition,
    tx: oneshot::Sender<()>,
}

/// Pending waiters keyed by registration id
#[derive(Default)]
pub struct WaitRegistry {
    waiters: HashMap<u64, Waiter>,
    next_id: u64,
}

impl WaitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter; the caller holds the receiving half and the
    /// deadline. Immediate evaluation happens before registration, at the
    /// orchestrator.
    pub fn register(&mut self, condition: WaitCondition, tx: oneshot::Sender<()>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        debug!(waiter = id, condition = ?condition, "registered waiter");
        self.waiters.insert(id, Waiter { condition, tx });
        id
    }

    /// Drop a waiter (deadline expiry or client gone)
    pub fn remove(&mut self, id: u64) {
        self.waiters.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// An app connection opened
    pub fn notify_connected(&mut self) {
        self.resolve_matching(|condition| matches!(condition, WaitCondition::AppConnected));
    }

    /// Nodes were added by an operations batch
    pub fn notify_added(&mut self, added: &[AddedSummary]) {
        if added.is_empty() {
            return;
        }
        self.resolve_matching(|condition| match condition {
            WaitCondition::NamedComponentPresent(name) => {
                added.iter().any(|a| a.display_name == *name)
            }
            WaitCondition::AppConnected => false,
        });
    }

    fn resolve_matching(&mut self, matches: impl Fn(&WaitCondition) -> bool) {
        let ready: Vec<u64> = self
            .waiters
            .iter()
            .filter(|(_, w)| matches(&w.condition))
            .map(|(&id, _)| id)
            .collect();
        for id in ready {
            if let Some(waiter) = self.waiters.remove(&id) {
                debug!(waiter = id, "waiter condition met");
                // Receiver may have timed out already; nothing to do then
                let _ = waiter.tx.send(());
            }
        }
    }
}
