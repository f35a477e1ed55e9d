//! Compensation executor: unwinds completed steps in reverse order.

use std::sync::Arc;
use std::time::Duration;

use crate::definition::SagaDefinition;
use crate::instance::SagaInstance;
use crate::invoker::{StepCall, StepInvoker, StepOutcome};
use crate::retry::{RetryPolicy, run_with_retry};
use crate::state::SagaStatus;
use crate::store::SagaStore;
use crate::{Result, SagaError};

/// Walks a failed saga's history backwards, invoking each compensating
/// action with the payload captured when the step succeeded.
///
/// Compensation calls follow the same retry/timeout policy as forward
/// steps. If one exhausts its retries the saga is marked `Failed` and the
/// walk stops — the system can no longer guarantee global consistency on
/// its own, so the state is surfaced for operator attention instead of
/// being retried forever.
pub struct CompensationExecutor<I> {
    invoker: Arc<I>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl<I: StepInvoker> CompensationExecutor<I> {
    pub fn new(invoker: Arc<I>, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            invoker,
            retry,
            call_timeout,
        }
    }

    /// Compensates every completed step of `saga`, newest first.
    ///
    /// Only callable while the saga is `Compensating`. Steps without a
    /// compensating action are skipped, as are steps already carrying a
    /// compensation record — re-entering after a crash resumes where the
    /// previous walk stopped.
    #[tracing::instrument(skip_all, fields(saga_id = %saga.saga_id()))]
    pub async fn compensate<S: SagaStore>(
        &self,
        store: &S,
        saga: &mut SagaInstance,
        definition: &SagaDefinition,
    ) -> Result<SagaStatus> {
        if saga.status() != SagaStatus::Compensating {
            return Err(SagaError::InvalidState {
                expected: "COMPENSATING".to_string(),
                actual: saga.status(),
            });
        }

        let completed: Vec<String> = saga
            .completed_steps()
            .into_iter()
            .map(str::to_string)
            .collect();

        for step_name in completed.iter().rev() {
            let step = definition
                .find(step_name)
                .ok_or_else(|| SagaError::UnknownStep {
                    saga_type: saga.saga_type().to_string(),
                    step: step_name.clone(),
                })?;

            if !step.compensating {
                continue;
            }
            if saga.is_step_compensated(step_name) {
                continue;
            }

            // Persist before the remote call so a crash resumes here.
            saga.touch();
            store.update(saga).await?;

            tracing::info!(step = step.name, "compensating step");
            let call = StepCall::new(saga.saga_id(), step.name, saga.payload().clone());
            let outcome = run_with_retry(
                self.invoker.as_ref(),
                &call,
                &self.retry,
                self.call_timeout,
                true,
            )
            .await;

            match outcome {
                StepOutcome::Success(_) => {
                    saga.record_compensation_completed(step.name)?;
                    store.update(saga).await?;
                }
                StepOutcome::RetryableFailure(reason) | StepOutcome::PermanentFailure(reason) => {
                    saga.record_compensation_failed(step.name, &reason)?;
                    saga.fail(format!(
                        "compensation for step '{}' failed: {reason}",
                        step.name
                    ))?;
                    store.update(saga).await?;

                    metrics::counter!("saga_failed_total").increment(1);
                    tracing::error!(
                        step = step.name,
                        %reason,
                        "compensation failed; saga requires operator attention"
                    );
                    return Ok(SagaStatus::Failed);
                }
            }
        }

        saga.mark_compensated()?;
        store.update(saga).await?;

        metrics::counter!("saga_compensated_total").increment(1);
        tracing::info!("saga compensated");
        Ok(SagaStatus::Compensated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::StepDefinition;
    use crate::memory::InMemorySagaStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records compensation order; optionally fails a named step.
    struct RecordingInvoker {
        compensated: Mutex<Vec<String>>,
        fail_step: Option<&'static str>,
    }

    impl RecordingInvoker {
        fn new(fail_step: Option<&'static str>) -> Self {
            Self {
                compensated: Mutex::new(Vec::new()),
                fail_step,
            }
        }
    }

    #[async_trait]
    impl StepInvoker for RecordingInvoker {
        async fn invoke(&self, _call: &StepCall) -> StepOutcome {
            StepOutcome::Success(serde_json::json!({}))
        }

        async fn compensate(&self, call: &StepCall) -> StepOutcome {
            if Some(call.step_name.as_str()) == self.fail_step {
                return StepOutcome::RetryableFailure("service unavailable".to_string());
            }
            self.compensated.lock().unwrap().push(call.step_name.clone());
            StepOutcome::Success(serde_json::json!({}))
        }
    }

    fn definition() -> SagaDefinition {
        SagaDefinition::new(
            "CreateBook",
            vec![
                StepDefinition::with_compensation("ensure_genre"),
                StepDefinition::with_compensation("create_authors"),
                StepDefinition::new("create_book"),
            ],
        )
    }

    async fn compensating_saga(store: &InMemorySagaStore, steps: &[&str]) -> SagaInstance {
        let mut saga = SagaInstance::new("CreateBook", serde_json::json!({}));
        for step in steps {
            saga.record_step_completed(step, serde_json::json!({})).unwrap();
        }
        saga.record_step_failed("next_step", "rejected").unwrap();
        saga.begin_compensation().unwrap();
        store.insert(&saga).await.unwrap();
        saga
    }

    fn executor(invoker: Arc<RecordingInvoker>) -> CompensationExecutor<RecordingInvoker> {
        CompensationExecutor::new(invoker, RetryPolicy::immediate(2), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn compensates_in_reverse_order() {
        let store = InMemorySagaStore::new();
        let mut saga = compensating_saga(&store, &["ensure_genre", "create_authors"]).await;
        let invoker = Arc::new(RecordingInvoker::new(None));

        let status = executor(invoker.clone())
            .compensate(&store, &mut saga, &definition())
            .await
            .unwrap();

        assert_eq!(status, SagaStatus::Compensated);
        assert_eq!(
            *invoker.compensated.lock().unwrap(),
            ["create_authors", "ensure_genre"]
        );
    }

    #[tokio::test]
    async fn skips_steps_without_compensation() {
        let store = InMemorySagaStore::new();
        let mut saga =
            compensating_saga(&store, &["ensure_genre", "create_authors", "create_book"]).await;
        let invoker = Arc::new(RecordingInvoker::new(None));

        executor(invoker.clone())
            .compensate(&store, &mut saga, &definition())
            .await
            .unwrap();

        // create_book has no compensating action.
        assert_eq!(
            *invoker.compensated.lock().unwrap(),
            ["create_authors", "ensure_genre"]
        );
    }

    #[tokio::test]
    async fn compensation_failure_marks_saga_failed_and_stops() {
        let store = InMemorySagaStore::new();
        let mut saga = compensating_saga(&store, &["ensure_genre", "create_authors"]).await;
        let invoker = Arc::new(RecordingInvoker::new(Some("create_authors")));

        let status = executor(invoker.clone())
            .compensate(&store, &mut saga, &definition())
            .await
            .unwrap();

        assert_eq!(status, SagaStatus::Failed);
        // The walk stopped before ensure_genre.
        assert!(invoker.compensated.lock().unwrap().is_empty());
        assert!(saga.failure_reason().unwrap().contains("create_authors"));

        let stored = store.get(saga.saga_id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), SagaStatus::Failed);
    }

    #[tokio::test]
    async fn resume_skips_already_compensated_steps() {
        let store = InMemorySagaStore::new();
        let mut saga = compensating_saga(&store, &["ensure_genre", "create_authors"]).await;

        // A previous walk already compensated create_authors.
        saga.record_compensation_completed("create_authors").unwrap();
        store.update(&mut saga).await.unwrap();

        let invoker = Arc::new(RecordingInvoker::new(None));
        let status = executor(invoker.clone())
            .compensate(&store, &mut saga, &definition())
            .await
            .unwrap();

        assert_eq!(status, SagaStatus::Compensated);
        assert_eq!(*invoker.compensated.lock().unwrap(), ["ensure_genre"]);
    }

    #[tokio::test]
    async fn requires_compensating_status() {
        let store = InMemorySagaStore::new();
        let mut saga = SagaInstance::new("CreateBook", serde_json::json!({}));
        store.insert(&saga).await.unwrap();

        let invoker = Arc::new(RecordingInvoker::new(None));
        let result = executor(invoker)
            .compensate(&store, &mut saga, &definition())
            .await;

        assert!(matches!(result, Err(SagaError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn nothing_to_compensate_still_terminates_compensated() {
        let store = InMemorySagaStore::new();
        let mut saga = compensating_saga(&store, &[]).await;
        let invoker = Arc::new(RecordingInvoker::new(None));

        let status = executor(invoker)
            .compensate(&store, &mut saga, &definition())
            .await
            .unwrap();

        assert_eq!(status, SagaStatus::Compensated);
    }
}
