//! Agent React DevTools daemon
//!
//! A long-lived local daemon that bridges running web-UI runtimes
//! (speaking the React DevTools Wall protocol over WebSocket) to local
//! client programs that introspect the runtime's component graph and
//! profile its rendering.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      agent-devtools-daemon                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  runtimes ──ws──► bridge ──► wire decoder ──► ComponentTree      │
//! │                     │                            ▲               │
//! │                     ├──► Profiler (commits)      │               │
//! │                     └──► pending inspections     │               │
//! │                                                  │               │
//! │  clients ──uds──► ipc server ──► Daemon (orchestrator) ──────────┤
//! │                                    ├── ConnectionHealth          │
//! │                                    └── WaitRegistry              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Runtimes connect over WebSocket (default port 8097, loopback) and
//! stream compact integer operation batches that maintain the in-memory
//! component tree. Clients connect over the state-directory socket with
//! newline-delimited JSON and query the tree, run inspections (a round
//! trip back to the runtime), and drive profiling sessions.
//!
//! All shared state mutation is serialized through [`daemon::Daemon`];
//! locks are never held across await points.

pub mod bridge;
pub mod daemon;
pub mod error;
pub mod health;
pub mod ipc;
pub mod paths;
pub mod profiler;
pub mod tree;
pub mod wait;
pub mod wire;

// Re-export commonly used types
pub use bridge::{InspectedElement, WallMessage};
pub use daemon::Daemon;
pub use error::{DevtoolsError, Result};
pub use health::ConnectionHealth;
pub use ipc::{ComponentRef, IpcClient, Request, Response};
pub use paths::StatePaths;
pub use profiler::{Profiler, RenderCause};
pub use tree::{ComponentTree, ElementKind, Node};
pub use wire::{OpsDecoder, StringTable, TreeOp};
