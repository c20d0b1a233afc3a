//! Orchestrator performance counters.

use serde::{Deserialize, Serialize};

/// Snapshot of the orchestrator's running performance counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub reads: u64,
    pub writes: u64,
    /// Exponential moving average of operation latency in milliseconds.
    pub avg_latency_ms: f64,
}

impl PerformanceStats {
    /// Cache-hit ratio over all cache-aside reads; 0.0 when none recorded.
    pub fn cache_hit_ratio(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let stats = PerformanceStats {
            cache_hits: 19,
            cache_misses: 1,
            ..Default::default()
        };
        assert!((stats.cache_hit_ratio() - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_ratio_no_reads() {
        assert_eq!(PerformanceStats::default().cache_hit_ratio(), 0.0);
    }
}
