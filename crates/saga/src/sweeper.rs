//! Staleness sweeper: surfaces sagas stuck in a non-terminal status.
//!
//! A saga past the staleness threshold is an operational signal, not an
//! automatic retry target — the sweeper only logs and counts it so an
//! operator (or an external recovery job calling
//! [`run_saga`](crate::SagaOrchestrator::run_saga)) can act.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::Result;
use crate::instance::SagaInstance;
use crate::store::SagaStore;

/// Periodic background task that scans the saga store for stuck
/// instances.
pub struct StalenessSweeper<S> {
    store: S,
    threshold: chrono::Duration,
    interval: Duration,
}

impl<S: SagaStore> StalenessSweeper<S> {
    /// Creates a sweeper flagging sagas idle longer than `threshold`.
    pub fn new(store: S, threshold: Duration) -> Self {
        Self {
            store,
            threshold: chrono::Duration::from_std(threshold)
                .unwrap_or(chrono::Duration::MAX),
            interval: Duration::from_secs(60),
        }
    }

    /// Overrides how often the sweep runs.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Performs one sweep and returns the stale instances found.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<Vec<SagaInstance>> {
        let cutoff = Utc::now() - self.threshold;
        let stale = self.store.find_stale(cutoff).await?;

        for saga in &stale {
            let idle_secs = (Utc::now() - saga.updated_at()).num_seconds();
            tracing::warn!(
                saga_id = %saga.saga_id(),
                saga_type = saga.saga_type(),
                status = %saga.status(),
                idle_secs,
                "saga stuck in non-terminal status"
            );
        }
        if !stale.is_empty() {
            metrics::counter!("saga_stale_total").increment(stale.len() as u64);
        }

        Ok(stale)
    }

    /// Runs the sweeper until the shutdown signal flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!("saga staleness sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(error = %e, "staleness sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("saga staleness sweeper stopped");
    }
}
