//! State-directory path resolution
//!
//! The daemon keeps all of its on-disk state in a single directory:
//! `daemon.json` (liveness record) and `daemon.sock` (client socket).
//! The directory defaults to `$HOME/.agent-react-devtools` and can be
//! overridden with `--state-dir`.

use std::path::{Path, PathBuf};

use crate::{DevtoolsError, Result};

/// Default state directory name under the user's home directory
pub const STATE_DIR_NAME: &str = ".agent-react-devtools";

/// Liveness record file name
pub const DAEMON_JSON: &str = "daemon.json";

/// Client socket file name
pub const DAEMON_SOCK: &str = "daemon.sock";

/// Resolved set of paths the daemon touches on disk
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub daemon_json: PathBuf,
    pub socket_path: PathBuf,
}

impl StatePaths {
    /// Resolve paths from an optional `--state-dir` override.
    ///
    /// Relative overrides are joined with the current working directory.
    pub fn resolve(state_dir: Option<&Path>) -> Result<Self> {
        let state_dir = match state_dir {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => {
                let cwd = std::env::current_dir()?;
                cwd.join(dir)
            }
            None => default_state_dir()?,
        };

        Ok(Self::in_dir(state_dir))
    }

    /// Build paths rooted at a specific directory (used by tests)
    pub fn in_dir(state_dir: PathBuf) -> Self {
        let daemon_json = state_dir.join(DAEMON_JSON);
        let socket_path = state_dir.join(DAEMON_SOCK);
        Self {
            state_dir,
            daemon_json,
            socket_path,
        }
    }

    /// Create the state directory if it does not exist
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;
        Ok(())
    }
}

/// `$HOME/.agent-react-devtools`
fn default_state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| {
        DevtoolsError::transport("unable to resolve home directory for state dir")
    })?;
    Ok(home.join(STATE_DIR_NAME))
}
