//! Migration phase results and the aggregate report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The strictly sequential migration phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    SourceValidation,
    InfrastructureSetup,
    AgentMigration,
    TaskMigration,
    SystemDataMigration,
    Validation,
}

impl MigrationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationPhase::SourceValidation => "source_validation",
            MigrationPhase::InfrastructureSetup => "infrastructure_setup",
            MigrationPhase::AgentMigration => "agent_migration",
            MigrationPhase::TaskMigration => "task_migration",
            MigrationPhase::SystemDataMigration => "system_data_migration",
            MigrationPhase::Validation => "validation",
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: MigrationPhase,
    pub success: bool,
    /// Rows migrated, or rows that would migrate in dry-run mode.
    pub records_migrated: u64,
    /// Per-row and phase-level errors, formatted `{phase}: {id}: {reason}`.
    pub errors: Vec<String>,
    pub duration: Duration,
    /// True once the target infrastructure was confirmed reachable. The
    /// rollback itself is an operational step, not automated here.
    pub rollback_available: bool,
    /// True when this failure must halt the remaining phases.
    #[serde(skip)]
    pub(crate) fatal: bool,
}

impl PhaseResult {
    pub(crate) fn new(phase: MigrationPhase) -> Self {
        Self {
            phase,
            success: true,
            records_migrated: 0,
            errors: Vec::new(),
            duration: Duration::ZERO,
            rollback_available: false,
            fatal: false,
        }
    }

    pub(crate) fn push_error(&mut self, id: &str, reason: impl fmt::Display) {
        self.errors.push(format!("{}: {id}: {reason}", self.phase));
        self.success = false;
    }

    pub(crate) fn fail_fatal(&mut self, id: &str, reason: impl fmt::Display) {
        self.push_error(id, reason);
        self.fatal = true;
    }
}

/// The full migration outcome, one result per executed phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub phases: Vec<PhaseResult>,
}

impl MigrationReport {
    /// True when every phase ran and succeeded with no errors.
    pub fn success(&self) -> bool {
        self.phases.len() == 6 && self.phases.iter().all(|p| p.success)
    }

    /// Total records migrated (or would-migrate in dry-run) across phases.
    pub fn total_migrated(&self) -> u64 {
        self.phases.iter().map(|p| p.records_migrated).sum()
    }

    /// Result for a single phase, if it was reached.
    pub fn phase(&self, phase: MigrationPhase) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// Process exit code for the thin CLI wrapper: 0 on full success.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(MigrationPhase::SourceValidation.to_string(), "source_validation");
        assert_eq!(MigrationPhase::Validation.to_string(), "validation");
    }

    #[test]
    fn test_error_formatting() {
        let mut result = PhaseResult::new(MigrationPhase::AgentMigration);
        result.push_error("agent-7", "registration failed");
        assert_eq!(result.errors[0], "agent_migration: agent-7: registration failed");
        assert!(!result.success);
    }

    #[test]
    fn test_report_requires_all_phases() {
        let partial = MigrationReport {
            dry_run: false,
            phases: vec![PhaseResult::new(MigrationPhase::SourceValidation)],
        };
        assert!(!partial.success());
        assert_eq!(partial.exit_code(), 1);
    }
}
