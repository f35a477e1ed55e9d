//! Saga status state machine.

use serde::{Deserialize, Serialize};

/// The status of a saga instance in its lifecycle.
///
/// Transitions:
/// ```text
/// Started ──► StepCompleted ──► ... ──► Completed
///    │              │
///    └──────────────┴──► Compensating ──┬──► Compensated
///                                       └──► Failed
/// ```
///
/// `Completed`, `Compensated` and `Failed` are terminal; a terminal saga
/// is never mutated again. `Failed` means compensation itself could not
/// finish and the saga needs operator attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Saga created; no step has completed yet.
    #[default]
    Started,

    /// At least one step has completed; forward progress continues.
    StepCompleted,

    /// A step permanently failed; compensations are being applied.
    Compensating,

    /// All required compensations succeeded (terminal, rolled back).
    Compensated,

    /// Every step completed successfully (terminal).
    Completed,

    /// Compensation could not complete (terminal, fatal).
    Failed,
}

impl SagaStatus {
    /// Returns true if forward steps may still be executed.
    pub fn can_advance(&self) -> bool {
        matches!(self, SagaStatus::Started | SagaStatus::StepCompleted)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::StepCompleted => "STEP_COMPLETED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
