//! Error types for COLONY state operations.
//!
//! Connectivity, timeout, and configuration failures are errors; losing an
//! assignment race is not (it is a `false` result on the operation surface).

use std::time::Duration;
use thiserror::Error;

/// Result type used by the typed (`try_*`) store-manager surface.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by the state layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Store unreachable ({store}): {reason}")]
    Connectivity { store: &'static str, reason: String },

    #[error("Operation {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Connection pool error ({store}): {reason}")]
    Pool { store: &'static str, reason: String },

    #[error("Serialization failed for {what}: {reason}")]
    Serialization { what: String, reason: String },

    #[error("Invalid configuration for {field}: {reason}")]
    Configuration { field: String, reason: String },

    #[error("Data integrity violation: {reason}")]
    Integrity { reason: String },
}

impl StateError {
    /// Connectivity error for the persistent store.
    pub fn postgres(reason: impl Into<String>) -> Self {
        StateError::Connectivity {
            store: "postgres",
            reason: reason.into(),
        }
    }

    /// Connectivity error for the ephemeral store.
    pub fn redis(reason: impl Into<String>) -> Self {
        StateError::Connectivity {
            store: "redis",
            reason: reason.into(),
        }
    }

    /// Serialization error with context.
    pub fn serde(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StateError::Serialization {
            what: what.into(),
            reason: err.to_string(),
        }
    }

    /// True for connectivity/timeout/pool failures, which callers must treat
    /// identically (the call was not performed).
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StateError::Connectivity { .. } | StateError::Timeout { .. } | StateError::Pool { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_classification() {
        assert!(StateError::postgres("refused").is_unavailable());
        assert!(StateError::Timeout {
            operation: "get_agent_state",
            timeout: Duration::from_secs(5),
        }
        .is_unavailable());
        assert!(!StateError::serde("agent", "bad json").is_unavailable());
    }

    #[test]
    fn test_display_includes_store() {
        let err = StateError::redis("connection reset");
        assert!(err.to_string().contains("redis"));
    }
}
