//! COLONY Store - Hybrid Distributed State Layer
//!
//! This crate provides the two store managers and the orchestrator that
//! routes every state operation between them:
//!
//! - [`PersistentStore`]: durable, strongly-consistent entities in
//!   PostgreSQL behind a bounded deadpool connection pool.
//! - [`EphemeralStore`]: cache entries, sessions, coordination state, and
//!   two capped append streams in Redis behind a pooled async client.
//! - [`HybridOrchestrator`]: the unified state API, applying the static
//!   distribution policy (cache-aside reads, write-through updates, direct
//!   strong writes) and tracking cache-hit/latency statistics.
//!
//! Store managers never propagate raw driver errors across their public
//! boundary: the typed `try_*` surface returns [`colony_core::StateError`],
//! and the public operation surface catches at the boundary, logs, and
//! returns sentinel values (`false` / `None` / empty).

use tracing::warn;

pub mod ephemeral;
pub mod memory;
pub mod orchestrator;
pub mod persistent;
pub mod policy;
pub mod traits;

pub use ephemeral::{EphemeralStore, RedisConfig};
pub use memory::{InMemoryEphemeral, InMemoryPersistent};
pub use orchestrator::{HybridOrchestrator, OrchestratorConfig, StateManager};
pub use persistent::{PersistentStore, PostgresConfig};
pub use policy::{policy_for, Consistency, OperationClass, StatePolicy, StoreTarget, Strategy};
pub use traits::{EphemeralBackend, PersistentBackend};

/// Collapse a typed result into the sentinel surface, logging the failure.
///
/// Callers of the sentinel surface must treat the fallback as "not
/// performed," never as "unknown."
pub(crate) fn or_sentinel<T>(
    store: &'static str,
    operation: &'static str,
    result: colony_core::StateResult<T>,
    fallback: T,
) -> T {
    match result {
        Ok(value) => value,
        Err(error) => {
            warn!(%store, %operation, %error, "store operation failed");
            fallback
        }
    }
}
