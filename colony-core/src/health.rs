//! Unified health check types
//!
//! Shared between the store managers and the orchestrator so health reporting
//! has one shape regardless of which store produced it.

use serde::{Deserialize, Serialize};

/// Connection pool statistics for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Connections currently created.
    pub size: usize,
    /// Connections idle and ready for checkout.
    pub available: usize,
    /// Configured upper bound.
    pub max_size: usize,
}

/// Health check result for a single store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHealth {
    /// Component name ("postgres", "redis", ...).
    pub component: String,
    pub connected: bool,
    pub pool: PoolStats,
    /// Latency of a sample query (SELECT 1 / PING) in milliseconds.
    pub sample_query_latency_ms: Option<i64>,
    pub message: Option<String>,
}

impl StoreHealth {
    /// A connected store with the given sample latency.
    pub fn connected(component: impl Into<String>, pool: PoolStats, latency_ms: i64) -> Self {
        Self {
            component: component.into(),
            connected: true,
            pool,
            sample_query_latency_ms: Some(latency_ms),
            message: None,
        }
    }

    /// An unreachable store with a failure message.
    pub fn unreachable(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            connected: false,
            pool: PoolStats::default(),
            sample_query_latency_ms: None,
            message: Some(message.into()),
        }
    }
}

/// Aggregated health across both stores plus orchestrator-level checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealth {
    pub persistent: StoreHealth,
    pub ephemeral: StoreHealth,
    /// Measured cache-hit ratio since startup.
    pub cache_hit_ratio: f64,
    /// Configured target ratio (default 0.95).
    pub cache_hit_target: f64,
    /// Whether the measured ratio meets the target.
    pub cache_target_met: bool,
}

impl SystemHealth {
    /// Fully operational: the persistent store must be reachable; the
    /// ephemeral store may be down (degraded mode).
    pub fn is_operational(&self) -> bool {
        self.persistent.connected
    }

    /// Both stores reachable.
    pub fn is_fully_healthy(&self) -> bool {
        self.persistent.connected && self.ephemeral.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_mode_is_operational() {
        let health = SystemHealth {
            persistent: StoreHealth::connected("postgres", PoolStats::default(), 2),
            ephemeral: StoreHealth::unreachable("redis", "connection refused"),
            cache_hit_ratio: 0.0,
            cache_hit_target: 0.95,
            cache_target_met: false,
        };
        assert!(health.is_operational());
        assert!(!health.is_fully_healthy());
    }
}
