//! Saga orchestrator: drives instances through their step lists.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::SagaId;

use crate::compensation::CompensationExecutor;
use crate::definition::SagaDefinition;
use crate::instance::SagaInstance;
use crate::invoker::{StepCall, StepInvoker, StepOutcome};
use crate::retry::{RetryPolicy, run_with_retry};
use crate::state::SagaStatus;
use crate::store::SagaStore;
use crate::{Result, SagaError};

/// Default bound on a single remote call.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives saga instances through the registered definitions.
///
/// Each instance advances strictly sequentially: progress is persisted
/// before every remote call and after every outcome, so re-running
/// [`run_saga`](SagaOrchestrator::run_saga) after a crash resumes from
/// `current_step` without repeating completed steps. Different instances
/// are independent and may run fully in parallel; the state store's
/// compare-and-swap rejects two tasks driving the same instance at once.
pub struct SagaOrchestrator<S, I> {
    store: S,
    invoker: Arc<I>,
    definitions: HashMap<&'static str, SagaDefinition>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl<S, I> SagaOrchestrator<S, I>
where
    S: SagaStore,
    I: StepInvoker,
{
    /// Creates an orchestrator with default retry and timeout policies.
    pub fn new(store: S, invoker: I) -> Self {
        Self {
            store,
            invoker: Arc::new(invoker),
            definitions: HashMap::new(),
            retry: RetryPolicy::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the retry policy for step and compensation calls.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Registers a saga definition.
    pub fn register(&mut self, definition: SagaDefinition) {
        self.definitions
            .insert(definition.saga_type(), definition);
    }

    /// Creates, persists and fully drives a saga; returns its ID.
    ///
    /// The returned ID is valid even when the saga ends compensated or
    /// failed — callers observe the terminal status via
    /// [`get_saga`](SagaOrchestrator::get_saga).
    pub async fn start_saga(
        &self,
        saga_type: &str,
        request: serde_json::Value,
    ) -> Result<SagaId> {
        let saga_id = self.begin_saga(saga_type, request).await?;
        self.run_saga(saga_id).await?;
        Ok(saga_id)
    }

    /// Creates and persists a saga without driving it.
    ///
    /// Lets a caller hand the ID back synchronously and drive the saga in
    /// a spawned task.
    #[tracing::instrument(skip(self, request))]
    pub async fn begin_saga(
        &self,
        saga_type: &str,
        request: serde_json::Value,
    ) -> Result<SagaId> {
        let definition = self
            .definitions
            .get(saga_type)
            .ok_or_else(|| SagaError::DefinitionNotFound(saga_type.to_string()))?;

        let instance = SagaInstance::new(definition.saga_type(), request);
        let saga_id = instance.saga_id();
        self.store.insert(&instance).await?;

        metrics::counter!("saga_started_total").increment(1);
        tracing::info!(%saga_id, saga_type, "saga started");
        Ok(saga_id)
    }

    /// Drives a persisted saga until it reaches a terminal status.
    ///
    /// Idempotent: a terminal saga is returned untouched, a compensating
    /// saga re-enters the compensation walk, and an in-flight saga
    /// continues from its persisted `current_step`. This is the crash
    /// recovery entry point.
    #[tracing::instrument(skip(self))]
    pub async fn run_saga(&self, saga_id: SagaId) -> Result<SagaStatus> {
        let started = std::time::Instant::now();
        let mut saga = self
            .store
            .get(saga_id)
            .await?
            .ok_or(SagaError::NotFound(saga_id))?;

        if saga.status().is_terminal() {
            return Ok(saga.status());
        }

        let definition = self
            .definitions
            .get(saga.saga_type())
            .ok_or_else(|| SagaError::DefinitionNotFound(saga.saga_type().to_string()))?;

        if saga.status() == SagaStatus::Compensating {
            return self
                .compensator()
                .compensate(&self.store, &mut saga, definition)
                .await;
        }

        while let Some(step) = definition.step_at(saga.current_step()) {
            // Persist before issuing the remote call so a crash resumes here.
            saga.touch();
            self.store.update(&mut saga).await?;

            tracing::info!(step = step.name, "saga step started");
            let call = StepCall::new(saga_id, step.name, saga.payload().clone());
            let outcome = run_with_retry(
                self.invoker.as_ref(),
                &call,
                &self.retry,
                self.call_timeout,
                false,
            )
            .await;

            match outcome {
                StepOutcome::Success(result) => {
                    saga.record_step_completed(step.name, result)?;
                    self.store.update(&mut saga).await?;
                    tracing::info!(step = step.name, "saga step completed");
                }
                StepOutcome::RetryableFailure(reason)
                | StepOutcome::PermanentFailure(reason) => {
                    tracing::warn!(step = step.name, %reason, "saga step failed; compensating");
                    saga.record_step_failed(step.name, &reason)?;
                    saga.begin_compensation()?;
                    self.store.update(&mut saga).await?;

                    let status = self
                        .compensator()
                        .compensate(&self.store, &mut saga, definition)
                        .await?;
                    metrics::histogram!("saga_duration_seconds")
                        .record(started.elapsed().as_secs_f64());
                    return Ok(status);
                }
            }
        }

        saga.complete()?;
        self.store.update(&mut saga).await?;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_duration_seconds").record(duration);
        metrics::counter!("saga_completed_total").increment(1);
        tracing::info!(duration, "saga completed successfully");
        Ok(SagaStatus::Completed)
    }

    /// Loads a saga instance by ID.
    pub async fn get_saga(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        self.store.get(saga_id).await
    }

    /// The saga state store this orchestrator writes to.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn compensator(&self) -> CompensationExecutor<I> {
        CompensationExecutor::new(self.invoker.clone(), self.retry.clone(), self.call_timeout)
    }
}
