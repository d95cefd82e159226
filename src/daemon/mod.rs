//! Daemon orchestration
//!
//! The orchestrator owns the canonical stores (tree, profiler, health,
//! waiters, pending inspections) and serializes every mutation through
//! its methods. The bridge and the IPC server both talk to it; nothing
//! else touches shared state.
//!
//! Locking discipline: all locks are `parking_lot` and are never held
//! across an await point. Handlers that suspend (inspect, profile-stop,
//! wait) release every lock first and resume through oneshot channels or
//! timers.

pub mod runtime;
pub mod state;

pub use runtime::{DaemonRecord, acquire_state_dir, release_state_dir};
pub use state::Daemon;
