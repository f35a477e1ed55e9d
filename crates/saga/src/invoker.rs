//! Step invocation contract and outcome classification.

use async_trait::async_trait;
use common::SagaId;

/// Classified result of a remote step call.
///
/// The invoker maps transport and remote errors onto this taxonomy:
/// network failures, timeouts and 5xx-equivalent responses are retryable;
/// business rejections (4xx-equivalent, e.g. "author not found") are
/// permanent and trigger compensation without burning retry budget.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The call succeeded. The value must be a JSON object; it is merged
    /// into the saga payload so later steps and compensations see it.
    Success(serde_json::Value),

    /// Transient failure; retried with backoff up to the attempt ceiling.
    RetryableFailure(String),

    /// Business rejection; compensation starts immediately.
    PermanentFailure(String),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }
}

/// One step invocation: the saga, the step, and the payload snapshot.
#[derive(Debug, Clone)]
pub struct StepCall {
    pub saga_id: SagaId,
    pub step_name: String,
    pub payload: serde_json::Value,
}

impl StepCall {
    pub fn new(saga_id: SagaId, step_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            saga_id,
            step_name: step_name.into(),
            payload,
        }
    }

    /// Idempotency key for the forward action, stable across re-invocation
    /// after a crash.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.saga_id, self.step_name)
    }

    /// Idempotency key for the compensating action.
    pub fn compensation_key(&self) -> String {
        format!("{}:{}:undo", self.saga_id, self.step_name)
    }
}

/// Adapter that performs the remote call for a step and classifies the
/// outcome.
///
/// Both actions may be re-invoked after a crash; implementations must pass
/// the call's idempotency key to the remote so repeats do not duplicate
/// side effects. Implementations never panic or return transport errors
/// directly — every failure is folded into the outcome taxonomy.
#[async_trait]
pub trait StepInvoker: Send + Sync {
    /// Performs the forward action for the step.
    async fn invoke(&self, call: &StepCall) -> StepOutcome;

    /// Performs the compensating action for the step.
    async fn compensate(&self, call: &StepCall) -> StepOutcome;
}
