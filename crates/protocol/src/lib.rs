//! Wire protocol shared between the gateway transport and its UI clients.
//!
//! Frame types:
//! - `RequestFrame`  — client → control plane RPC call
//! - `ResponseFrame` — control plane → client RPC result
//! - `EventFrame`    — control plane → client server-push (a domain event)

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const MAX_PAYLOAD_BYTES: usize = 524_288; // 512 KB

/// Idempotency interceptor default reset window is explicit-event-only
/// (spec.md §4.5); this TTL only bounds the dedupe cache the gateway
/// transport keeps for raw request ids, not the dispatcher's own
/// idempotency rules.
pub const REQUEST_DEDUPE_TTL_MS: u64 = 300_000;
pub const REQUEST_DEDUPE_MAX_ENTRIES: usize = 1_000;

pub mod error_codes {
    pub const PROGRAMMING_ERROR: &str = "PROGRAMMING_ERROR";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    pub const CANCELLED: &str = "CANCELLED";
}

// ── Error shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ErrorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorShape {}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Client → control plane RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub r#type: String, // always "req"
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Control plane → client RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub r#type: String, // always "res"
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { r#type: "res".into(), id: id.into(), ok: true, payload: Some(payload), error: None }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self { r#type: "res".into(), id: id.into(), ok: false, payload: None, error: Some(error) }
    }
}

/// Control plane → client server-push event (the wire form of a `DomainEvent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub r#type: String, // always "event"
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub seq: u64,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: Option<serde_json::Value>, seq: u64) -> Self {
        Self { r#type: "event".into(), event: event.into(), payload, seq }
    }
}

// ── Reserved IPC channels ────────────────────────────────────────────────────

/// Bridge-owned channel names; these are contract, not convention.
pub mod channels {
    pub const LIFECYCLE_SHOW_STARTING: &str = "api:lifecycle:show-starting";
    pub const LIFECYCLE_SHOW_SETUP: &str = "api:lifecycle:show-setup";
    pub const LIFECYCLE_SHOW_AGENT_SELECTION: &str = "api:lifecycle:show-agent-selection";
    pub const LIFECYCLE_SHOW_MAIN_VIEW: &str = "api:lifecycle:show-main-view";
    pub const LIFECYCLE_SETUP_PROGRESS: &str = "api:lifecycle:setup-progress";
    pub const LIFECYCLE_SETUP_ERROR: &str = "api:lifecycle:setup-error";
    pub const LIFECYCLE_RETRY: &str = "api:lifecycle:retry";
    pub const LIFECYCLE_AGENT_SELECTED: &str = "api:lifecycle:agent-selected";
    pub const LIFECYCLE_QUIT: &str = "api:lifecycle:quit";
    pub const LIFECYCLE_READY: &str = "api:lifecycle:ready";

    pub const WORKSPACE_REMOVED: &str = "api:workspace:removed";
    pub const WORKSPACE_METADATA_CHANGED: &str = "api:workspace:metadata-changed";
    pub const AGENT_RESTARTED: &str = "api:agent:restarted";
    pub const WORKSPACE_SWITCHED: &str = "api:workspace:switched";
    pub const PROJECT_OPENED: &str = "api:project:opened";
    pub const PROJECT_CLOSED: &str = "api:project:closed";
    pub const WORKSPACE_CREATED: &str = "api:workspace:created";

    /// Per-workspace deletion progress stream channel prefix; the full
    /// channel name is `{DELETION_PROGRESS_PREFIX}{workspace_path}`.
    pub const DELETION_PROGRESS_PREFIX: &str = "api:workspace:delete-progress:";
}

// ── Domain event type tags ───────────────────────────────────────────────────

/// Bare domain event type tags, as emitted by the dispatcher and consumed
/// by the IPC Event Bridge — distinct from the `api:*` channel names in
/// [`channels`], which are the bridge's own outbound wire names.
pub mod domain_events {
    pub const PROJECT_OPENED: &str = "project:opened";
    pub const PROJECT_CLOSED: &str = "project:closed";
    pub const WORKSPACE_CREATED: &str = "workspace:created";
    pub const WORKSPACE_DELETED: &str = "workspace:deleted";
    pub const WORKSPACE_SWITCHED: &str = "workspace:switched";
    pub const WORKSPACE_METADATA_CHANGED: &str = "workspace:metadata-changed";
    pub const AGENT_RESTARTED: &str = "agent:restarted";
    pub const SETUP_ERROR: &str = "setup:error";
    pub const WORKSPACE_MCP_ATTACHED: &str = "workspace:mcp-attached";
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_ok_round_trips() {
        let frame = ResponseFrame::ok("req-1", serde_json::json!({"a": 1}));
        let json = serde_json::to_string(&frame).unwrap();
        let back: ResponseFrame = serde_json::from_str(&json).unwrap();
        assert!(back.ok);
        assert_eq!(back.payload.unwrap()["a"], 1);
    }

    #[test]
    fn error_shape_displays_code_and_message() {
        let err = ErrorShape::new(error_codes::VALIDATION_ERROR, "bad id");
        assert_eq!(err.to_string(), "VALIDATION_ERROR: bad id");
    }
}
