//! IPC request/response message types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A component reference from a client: a numeric id or a `@cN` label
/// from the most recent tree read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ComponentRef {
    Id(u32),
    Label(String),
}

impl std::fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Label(label) => write!(f, "{label}"),
        }
    }
}

/// Wait condition kinds as clients spell them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitKind {
    Connected,
    Component,
}

/// Client-to-daemon request, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Request {
    Ping,
    Status,
    GetTree {
        #[serde(default)]
        depth: Option<usize>,
    },
    GetComponent {
        id: ComponentRef,
    },
    Find {
        name: String,
        #[serde(default)]
        exact: bool,
    },
    Count,
    ProfileStart {
        #[serde(default)]
        name: Option<String>,
    },
    ProfileStop,
    ProfileReport {
        #[serde(rename = "componentId")]
        component_id: ComponentRef,
    },
    ProfileSlow {
        #[serde(default)]
        limit: Option<usize>,
    },
    ProfileRerenders {
        #[serde(default)]
        limit: Option<usize>,
    },
    ProfileTimeline {
        #[serde(default)]
        limit: Option<usize>,
    },
    ProfileCommit {
        index: usize,
        #[serde(default)]
        limit: Option<usize>,
    },
    Wait {
        condition: WaitKind,
        #[serde(default)]
        name: Option<String>,
        /// Milliseconds; defaults to 30s
        #[serde(default)]
        timeout: Option<u64>,
    },
    Shutdown,
}

/// Recognized request type tags, used to distinguish "Unknown command"
/// from malformed input
pub const KNOWN_REQUEST_TYPES: [&str; 15] = [
    "ping",
    "status",
    "get-tree",
    "get-component",
    "find",
    "count",
    "profile-start",
    "profile-stop",
    "profile-report",
    "profile-slow",
    "profile-rerenders",
    "profile-timeline",
    "profile-commit",
    "wait",
    "shutdown",
];

/// Daemon-to-client response, one JSON object per line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Echoes the client's `@cN` form on `get-component`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Advisory context, e.g. the empty-tree disconnect hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    pub fn with_hint(mut self, hint: Option<String>) -> Self {
        self.hint = hint;
        self
    }
}
