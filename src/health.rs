//! Connection health tracking
//!
//! Keeps a small ring of connect/disconnect events for the `status`
//! surface. A disconnect immediately followed by a connect (within the
//! reconnect window) is rewritten to a single `Reconnected` entry so a
//! rapid cycle reads as one event.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Ring capacity; oldest entries are evicted
const RING_CAPACITY: usize = 8;

/// Window inside which disconnect->connect collapses to `Reconnected`
const RECONNECT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionEventKind {
    Connected,
    Disconnected,
    Reconnected,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionEvent {
    #[serde(rename = "type")]
    pub kind: ConnectionEventKind,
    pub timestamp: DateTime<Utc>,
}

/// Serialized form of the tracker for `status` responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub connected_apps: usize,
    pub has_ever_connected: bool,
    pub last_disconnect_at: Option<DateTime<Utc>>,
    /// Most recent last
    pub recent_events: Vec<ConnectionEvent>,
}

#[derive(Debug, Default)]
pub struct ConnectionHealth {
    live: usize,
    has_ever_connected: bool,
    last_disconnect_at: Option<DateTime<Utc>>,
    events: VecDeque<ConnectionEvent>,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_connections(&self) -> usize {
        self.live
    }

    pub fn record_connect(&mut self) {
        self.record_connect_at(Utc::now());
    }

    pub fn record_disconnect(&mut self) {
        self.record_disconnect_at(Utc::now());
    }

    fn record_connect_at(&mut self, now: DateTime<Utc>) {
        self.live += 1;
        self.has_ever_connected = true;

        let rapid_cycle = self.events.back().is_some_and(|event| {
            event.kind == ConnectionEventKind::Disconnected
                && (now - event.timestamp)
                    .to_std()
                    .map_or(false, |elapsed| elapsed <= RECONNECT_WINDOW)
        });

        if rapid_cycle {
            let last = self.events.back_mut().expect("checked above");
            last.kind = ConnectionEventKind::Reconnected;
            last.timestamp = now;
        } else {
            self.push(ConnectionEvent {
                kind: ConnectionEventKind::Connected,
                timestamp: now,
            });
        }
    }

    fn record_disconnect_at(&mut self, now: DateTime<Utc>) {
        self.live = self.live.saturating_sub(1);
        self.last_disconnect_at = Some(now);
        self.push(ConnectionEvent {
            kind: ConnectionEventKind::Disconnected,
            timestamp: now,
        });
    }

    fn push(&mut self, event: ConnectionEvent) {
        if self.events.len() == RING_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// Timestamp of the most recent disconnect still present in the ring
    pub fn recent_disconnect(&self) -> Option<DateTime<Utc>> {
        self.events
            .iter()
            .rev()
            .find(|e| e.kind == ConnectionEventKind::Disconnected)
            .map(|e| e.timestamp)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            connected_apps: self.live,
            has_ever_connected: self.has_ever_connected,
            last_disconnect_at: self.last_disconnect_at,
            recent_events: self.events.iter().cloned().collect(),
        }
    }
}
