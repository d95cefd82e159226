//! Daemon liveness record and staleness recovery
//!
//! One daemon owns a state directory at a time. `daemon.json` records the
//! owner; a record whose pid is still alive is a hard "already running"
//! signal. A record left by a dead process is cleaned up (together with
//! any stale socket) and the directory is taken over.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::paths::StatePaths;
use crate::{DevtoolsError, Result};

/// Contents of `daemon.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonRecord {
    pub pid: u32,
    pub port: u16,
    pub socket_path: PathBuf,
    pub started_at: DateTime<Utc>,
}

/// Claim the state directory for this process.
///
/// Fails when a live daemon already owns it; recovers from records and
/// sockets left behind by a dead one.
pub fn acquire_state_dir(paths: &StatePaths, port: u16) -> Result<DaemonRecord> {
    paths.ensure_dir()?;

    if let Some(record) = read_record(&paths.daemon_json) {
        if pid_alive(record.pid) {
            return Err(DevtoolsError::BindFailure {
                what: "state directory".to_string(),
                message: format!(
                    "daemon already running (pid {}, port {})",
                    record.pid, record.port
                ),
            });
        }
        warn!(
            pid = record.pid,
            "stale daemon.json from dead process, cleaning up"
        );
        remove_if_exists(&paths.daemon_json)?;
        remove_if_exists(&paths.socket_path)?;
    } else if paths.socket_path.exists() {
        // Socket with no record: also stale
        remove_if_exists(&paths.socket_path)?;
    }

    let record = DaemonRecord {
        pid: std::process::id(),
        port,
        socket_path: paths.socket_path.clone(),
        started_at: Utc::now(),
    };
    let json = serde_json::to_string_pretty(&record)
        .map_err(|e| DevtoolsError::transport(format!("encode daemon.json: {e}")))?;
    fs::write(&paths.daemon_json, json)?;
    info!(pid = record.pid, path = %paths.daemon_json.display(), "daemon.json written");
    Ok(record)
}

/// Delete the liveness record and socket at shutdown
pub fn release_state_dir(paths: &StatePaths) {
    if let Err(e) = remove_if_exists(&paths.daemon_json) {
        warn!("failed to remove daemon.json: {e}");
    }
    if let Err(e) = remove_if_exists(&paths.socket_path) {
        warn!("failed to remove socket: {e}");
    }
}

fn read_record(path: &Path) -> Option<DaemonRecord> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            // Unreadable record counts as stale
            warn!("unparseable daemon.json, treating as stale: {e}");
            None
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Probe a pid for liveness with signal 0
#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    false
}
