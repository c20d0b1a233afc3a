//! Coordination-state and stream-message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Short-lived keyed blob used by in-flight multi-agent operations.
///
/// Ephemeral-only, no persistent counterpart. If it expires mid-operation
/// the operation must treat that as "no prior state," not as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationState {
    pub operation_id: String,
    pub state: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl CoordinationState {
    /// Create coordination state stamped with the current time.
    pub fn new(operation_id: impl Into<String>, state: JsonValue) -> Self {
        Self {
            operation_id: operation_id.into(),
            state,
            updated_at: Utc::now(),
        }
    }
}

/// An entry read from the task-queue or event stream.
///
/// Identity is the store-assigned monotonic id plus the stream name. Streams
/// are capped; the oldest entries are trimmed on overflow, which is lossy by
/// design for best-effort signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Store-assigned monotonic id (e.g., Redis stream entry id).
    pub id: String,
    pub stream: String,
    pub payload: JsonValue,
    /// Server-side enqueue timestamp stamped by the store manager at append.
    pub enqueued_at: DateTime<Utc>,
    /// Locally generated correlation id for end-to-end tracing.
    pub correlation_id: String,
}
