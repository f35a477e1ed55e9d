//! Saga instance record.

use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

use crate::error::SagaError;
use crate::state::SagaStatus;

/// Outcome recorded in the step history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcomeKind {
    /// Forward action succeeded.
    Completed,
    /// Forward action permanently failed.
    Failed,
    /// Compensating action succeeded.
    Compensated,
    /// Compensating action failed (fatal for the saga).
    CompensationFailed,
}

/// One entry in a saga's append-only step history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_name: String,
    pub outcome: StepOutcomeKind,
    pub at: DateTime<Utc>,
}

impl StepRecord {
    fn new(step_name: impl Into<String>, outcome: StepOutcomeKind) -> Self {
        Self {
            step_name: step_name.into(),
            outcome,
            at: Utc::now(),
        }
    }
}

/// A saga instance: one in-flight or finished distributed transaction.
///
/// The orchestrator is the exclusive writer. `current_step` only ever
/// advances; unwinding is expressed through compensation records appended
/// to `step_history`. Every state-mutating method refuses to touch a
/// terminal instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    saga_id: SagaId,
    saga_type: String,
    status: SagaStatus,
    current_step: usize,
    /// Business context carried across steps. Step results are JSON
    /// objects merged into it, so compensations see the ids discovered by
    /// the steps they undo.
    payload: serde_json::Value,
    step_history: Vec<StepRecord>,
    failure_reason: Option<String>,
    /// Compare-and-swap counter owned by the saga store.
    pub(crate) version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SagaInstance {
    /// Creates a new saga in `Started` status.
    pub fn new(saga_type: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            saga_id: SagaId::new(),
            saga_type: saga_type.into(),
            status: SagaStatus::Started,
            current_step: 0,
            payload,
            step_history: Vec::new(),
            failure_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_active(&self) -> Result<(), SagaError> {
        if self.status.is_terminal() {
            return Err(SagaError::InvalidState {
                expected: "a non-terminal status".to_string(),
                actual: self.status,
            });
        }
        Ok(())
    }

    /// Bumps `updated_at`; called before persisting ahead of a remote call.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Records a successful forward step and merges its result into the
    /// payload.
    pub fn record_step_completed(
        &mut self,
        step_name: &str,
        result: serde_json::Value,
    ) -> Result<(), SagaError> {
        self.ensure_active()?;
        if !self.status.can_advance() {
            return Err(SagaError::InvalidState {
                expected: "STARTED or STEP_COMPLETED".to_string(),
                actual: self.status,
            });
        }

        if let (Some(target), Some(source)) = (self.payload.as_object_mut(), result.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }

        self.step_history
            .push(StepRecord::new(step_name, StepOutcomeKind::Completed));
        self.current_step += 1;
        self.status = SagaStatus::StepCompleted;
        self.touch();
        Ok(())
    }

    /// Records a permanent forward-step failure.
    pub fn record_step_failed(&mut self, step_name: &str, reason: &str) -> Result<(), SagaError> {
        self.ensure_active()?;
        self.step_history
            .push(StepRecord::new(step_name, StepOutcomeKind::Failed));
        self.failure_reason = Some(reason.to_string());
        self.touch();
        Ok(())
    }

    /// Moves the saga into `Compensating`.
    pub fn begin_compensation(&mut self) -> Result<(), SagaError> {
        if !self.status.can_advance() {
            return Err(SagaError::InvalidState {
                expected: "STARTED or STEP_COMPLETED".to_string(),
                actual: self.status,
            });
        }
        self.status = SagaStatus::Compensating;
        self.touch();
        Ok(())
    }

    /// Records a successful compensation for a previously completed step.
    pub fn record_compensation_completed(&mut self, step_name: &str) -> Result<(), SagaError> {
        self.ensure_compensating()?;
        self.step_history
            .push(StepRecord::new(step_name, StepOutcomeKind::Compensated));
        self.touch();
        Ok(())
    }

    /// Records a failed compensation attempt.
    pub fn record_compensation_failed(
        &mut self,
        step_name: &str,
        reason: &str,
    ) -> Result<(), SagaError> {
        self.ensure_compensating()?;
        self.step_history.push(StepRecord::new(
            step_name,
            StepOutcomeKind::CompensationFailed,
        ));
        self.failure_reason = Some(reason.to_string());
        self.touch();
        Ok(())
    }

    /// Marks the saga `Completed` (terminal).
    pub fn complete(&mut self) -> Result<(), SagaError> {
        if !self.status.can_advance() {
            return Err(SagaError::InvalidState {
                expected: "STARTED or STEP_COMPLETED".to_string(),
                actual: self.status,
            });
        }
        self.status = SagaStatus::Completed;
        self.touch();
        Ok(())
    }

    /// Marks the saga `Compensated` (terminal, rolled back successfully).
    pub fn mark_compensated(&mut self) -> Result<(), SagaError> {
        self.ensure_compensating()?;
        self.status = SagaStatus::Compensated;
        self.touch();
        Ok(())
    }

    /// Marks the saga `Failed` (terminal, operator attention required).
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SagaError> {
        self.ensure_active()?;
        self.status = SagaStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.touch();
        Ok(())
    }

    fn ensure_compensating(&self) -> Result<(), SagaError> {
        if self.status != SagaStatus::Compensating {
            return Err(SagaError::InvalidState {
                expected: "COMPENSATING".to_string(),
                actual: self.status,
            });
        }
        Ok(())
    }
}

// Query methods
impl SagaInstance {
    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    pub fn saga_type(&self) -> &str {
        &self.saga_type
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Index of the next forward step to execute.
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn step_history(&self) -> &[StepRecord] {
        &self.step_history
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Store-owned compare-and-swap counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Names of successfully completed forward steps, in completion order.
    pub fn completed_steps(&self) -> Vec<&str> {
        self.step_history
            .iter()
            .filter(|r| r.outcome == StepOutcomeKind::Completed)
            .map(|r| r.step_name.as_str())
            .collect()
    }

    /// Returns true if a compensation record exists for the given step.
    pub fn is_step_compensated(&self, step_name: &str) -> bool {
        self.step_history
            .iter()
            .any(|r| r.outcome == StepOutcomeKind::Compensated && r.step_name == step_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_saga() -> SagaInstance {
        SagaInstance::new("CreateBook", serde_json::json!({"title": "Dune"}))
    }

    #[test]
    fn test_new_saga_starts_at_step_zero() {
        let saga = make_saga();
        assert_eq!(saga.status(), SagaStatus::Started);
        assert_eq!(saga.current_step(), 0);
        assert!(saga.step_history().is_empty());
        assert!(saga.failure_reason().is_none());
    }

    #[test]
    fn test_step_completion_advances_and_merges_payload() {
        let mut saga = make_saga();

        saga.record_step_completed("ensure_genre", serde_json::json!({"genre_id": 7}))
            .unwrap();

        assert_eq!(saga.status(), SagaStatus::StepCompleted);
        assert_eq!(saga.current_step(), 1);
        assert_eq!(saga.completed_steps(), ["ensure_genre"]);
        assert_eq!(saga.payload()["title"], "Dune");
        assert_eq!(saga.payload()["genre_id"], 7);
    }

    #[test]
    fn test_full_happy_path() {
        let mut saga = make_saga();

        saga.record_step_completed("ensure_genre", serde_json::json!({}))
            .unwrap();
        saga.record_step_completed("create_authors", serde_json::json!({}))
            .unwrap();
        saga.record_step_completed("create_book", serde_json::json!({}))
            .unwrap();
        saga.complete().unwrap();

        assert_eq!(saga.status(), SagaStatus::Completed);
        assert_eq!(saga.current_step(), 3);
        assert_eq!(saga.step_history().len(), 3);
        assert!(saga.status().is_terminal());
    }

    #[test]
    fn test_failure_and_compensation_path() {
        let mut saga = make_saga();

        saga.record_step_completed("ensure_genre", serde_json::json!({"genre_id": 7}))
            .unwrap();
        saga.record_step_failed("create_authors", "author rejected")
            .unwrap();
        saga.begin_compensation().unwrap();
        assert_eq!(saga.status(), SagaStatus::Compensating);
        assert_eq!(saga.failure_reason(), Some("author rejected"));

        saga.record_compensation_completed("ensure_genre").unwrap();
        assert!(saga.is_step_compensated("ensure_genre"));

        saga.mark_compensated().unwrap();
        assert_eq!(saga.status(), SagaStatus::Compensated);
    }

    #[test]
    fn test_compensation_failure_leads_to_failed() {
        let mut saga = make_saga();

        saga.record_step_completed("ensure_genre", serde_json::json!({}))
            .unwrap();
        saga.record_step_failed("create_authors", "rejected").unwrap();
        saga.begin_compensation().unwrap();
        saga.record_compensation_failed("ensure_genre", "genre service down")
            .unwrap();
        saga.fail("compensation for step 'ensure_genre' failed")
            .unwrap();

        assert_eq!(saga.status(), SagaStatus::Failed);
        assert!(saga.status().is_terminal());
    }

    #[test]
    fn test_terminal_saga_is_never_mutated() {
        let mut saga = make_saga();
        saga.complete().unwrap();

        assert!(saga.record_step_completed("x", serde_json::json!({})).is_err());
        assert!(saga.record_step_failed("x", "boom").is_err());
        assert!(saga.begin_compensation().is_err());
        assert!(saga.fail("boom").is_err());
        assert!(saga.complete().is_err());
        assert_eq!(saga.status(), SagaStatus::Completed);
    }

    #[test]
    fn test_compensation_records_require_compensating_status() {
        let mut saga = make_saga();
        assert!(saga.record_compensation_completed("x").is_err());
        assert!(saga.mark_compensated().is_err());
    }

    #[test]
    fn test_current_step_never_decreases() {
        let mut saga = make_saga();
        saga.record_step_completed("a", serde_json::json!({})).unwrap();
        saga.record_step_completed("b", serde_json::json!({})).unwrap();
        let before = saga.current_step();

        saga.record_step_failed("c", "boom").unwrap();
        saga.begin_compensation().unwrap();
        saga.record_compensation_completed("b").unwrap();
        saga.record_compensation_completed("a").unwrap();
        saga.mark_compensated().unwrap();

        assert_eq!(saga.current_step(), before);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut saga = make_saga();
        saga.record_step_completed("ensure_genre", serde_json::json!({"genre_id": 7}))
            .unwrap();

        let json = serde_json::to_string(&saga).unwrap();
        let back: SagaInstance = serde_json::from_str(&json).unwrap();

        assert_eq!(back.saga_id(), saga.saga_id());
        assert_eq!(back.status(), SagaStatus::StepCompleted);
        assert_eq!(back.current_step(), 1);
        assert_eq!(back.payload()["genre_id"], 7);
    }
}
