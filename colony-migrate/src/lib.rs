//! COLONY Migrate - legacy database migration
//!
//! Moves every row from the legacy embedded (SQLite) database into the
//! hybrid state layer, in six strictly sequential phases with dry-run and
//! rollback-readiness support. The legacy source is only ever opened
//! read-only; rollback means discarding the target, never touching the
//! source.
//!
//! The thin CLI wrapper around this crate builds a [`MigrationConfig`]
//! (typically via [`MigrationConfig::from_env`]), runs [`Migrator::run`],
//! and exits with [`MigrationReport::exit_code`].

use thiserror::Error;

pub mod legacy;
pub mod migrator;
pub mod report;

pub use legacy::LegacyDatabase;
pub use migrator::{MigrationConfig, Migrator};
pub use report::{MigrationPhase, MigrationReport, PhaseResult};

/// Errors raised while migrating.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The legacy source is missing, unreadable, or malformed.
    #[error("legacy source error: {reason}")]
    Source { reason: String },

    /// A target store operation failed.
    #[error(transparent)]
    State(#[from] colony_core::StateError),
}

impl From<rusqlite::Error> for MigrateError {
    fn from(e: rusqlite::Error) -> Self {
        MigrateError::Source {
            reason: e.to_string(),
        }
    }
}

/// Install the process-wide tracing subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
