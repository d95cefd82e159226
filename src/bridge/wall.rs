//! Wall protocol envelope and event names

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One Wall message: a JSON text frame `{"event": "...", "payload": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallMessage {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

impl WallMessage {
    /// Message with a null payload
    pub fn bare(event: &str) -> Self {
        Self {
            event: event.to_string(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(event: &str, payload: Value) -> Self {
        Self {
            event: event.to_string(),
            payload,
        }
    }
}

// Peer -> bridge
pub const EV_BACKEND_INITIALIZED: &str = "backendInitialized";
pub const EV_OPERATIONS: &str = "operations";
pub const EV_INSPECTED_ELEMENT: &str = "inspectedElement";
pub const EV_PROFILING_DATA: &str = "profilingData";
pub const EV_SHUTDOWN: &str = "shutdown";
pub const EV_RENDERER: &str = "renderer";
pub const EV_RENDERER_ATTACHED: &str = "rendererAttached";
pub const EV_BACKEND_VERSION: &str = "backendVersion";

// Bridge -> peer
pub const EV_INSPECT_ELEMENT: &str = "inspectElement";
pub const EV_START_PROFILING: &str = "startProfiling";
pub const EV_STOP_PROFILING: &str = "stopProfiling";

/// Frontend handshake sent after `backendInitialized`, one message each,
/// in this order
pub const HANDSHAKE_EVENTS: [&str; 5] = [
    "getBridgeProtocol",
    "getBackendVersion",
    "getIfHasUnsupportedRendererVersion",
    "getHookSettings",
    "getProfilingStatus",
];

/// Peer events that are accepted without effect
pub const ACK_EVENTS: [&str; 11] = [
    "bridgeProtocol",
    "backendVersion",
    "profilingStatus",
    "overrideComponentFilters",
    "hookSettings",
    "isBackendStorageAPISupported",
    "isReactNativeEnvironment",
    "isReloadAndProfileSupportedByBackend",
    "isSynchronousXHRSupported",
    "syncSelectionFromNativeElementsPanel",
    "unsupportedRendererVersion",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let msg = WallMessage::with_payload("operations", serde_json::json!([1, 2, 3]));
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("\"event\":\"operations\""));

        let parsed: WallMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.event, "operations");
        assert_eq!(parsed.payload, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_missing_payload_defaults_to_null() {
        let parsed: WallMessage =
            serde_json::from_str(r#"{"event":"backendInitialized"}"#).unwrap();
        assert_eq!(parsed.event, "backendInitialized");
        assert!(parsed.payload.is_null());
    }
}
