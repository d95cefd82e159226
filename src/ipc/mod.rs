//! Local IPC: newline-delimited JSON over the daemon socket
//!
//! Clients (the CLI, the agent-tool server, the test suite) connect to
//! `<state-dir>/daemon.sock` and exchange one JSON request per line for
//! one JSON response per line. The protocol types live in [`protocol`];
//! [`server`] accepts and dispatches; [`client`] is the typed caller side.

pub mod client;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::{ComponentRef, Request, Response, WaitKind};
pub use server::run_ipc_server;
