//! COLONY Core - Entity Types
//!
//! Pure data structures for the hybrid distributed state layer. All other
//! crates depend on this. This crate contains ONLY data types - no business
//! logic and no I/O.

use uuid::Uuid;

pub mod agent;
pub mod coordination;
pub mod error;
pub mod health;
pub mod snapshot;
pub mod stats;
pub mod task;

pub use agent::{Agent, AgentStatus, AgentStatusParseError, AgentUpdate};
pub use coordination::{CoordinationState, StreamMessage};
pub use error::{StateError, StateResult};
pub use health::{PoolStats, StoreHealth, SystemHealth};
pub use snapshot::{Checkpoint, SystemSnapshot};
pub use stats::PerformanceStats;
pub use task::{NewTask, Task, TaskStatus, TaskStatusParseError, DEFAULT_TASK_PRIORITY};

/// Generate a new UUIDv7 identifier string (timestamp-sortable).
///
/// Used for store-generated task ids, correlation ids, and checkpoint ids so
/// that lexicographic order roughly tracks creation order.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}
