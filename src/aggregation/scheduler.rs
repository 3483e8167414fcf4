//! Recurring aggregation of the current and previous bucket of every
//! active tenant.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::AggregationConfig;
use crate::error::{bounded, PipelineError};
use crate::models::Granularity;
use crate::storage::TrackingScope;

use super::engine::AggregationEngine;

/// Outcome counts of one scheduled pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub tenants: usize,
    pub buckets_written: usize,
    pub failures: usize,
    pub cancelled: bool,
}

/// Aggregate `[previous bucket start, now)` for every active tenant and
/// each granularity. Late events landing in the just-closed bucket are
/// picked up by the next pass.
pub async fn run_pass(
    engine: &AggregationEngine,
    scope: &dyn TrackingScope,
    granularities: &[Granularity],
    now: DateTime<Utc>,
    cancel: &watch::Receiver<bool>,
) -> PassSummary {
    let mut summary = PassSummary::default();

    let tenants = match bounded(engine.storage_timeout(), scope.list_tenants()).await {
        Ok(tenants) => tenants,
        Err(e) => {
            tracing::error!("Failed to list tenants for aggregation: {}", e);
            summary.failures += 1;
            return summary;
        }
    };

    for tenant in tenants.iter().filter(|t| t.is_active) {
        summary.tenants += 1;

        for &granularity in granularities {
            if *cancel.borrow() {
                summary.cancelled = true;
                return summary;
            }

            let window_start = granularity.previous_bucket_start(now);
            match engine
                .aggregate_cancellable(&tenant.tracking_id, window_start, now, granularity, cancel)
                .await
            {
                Ok(records) => summary.buckets_written += records.len(),
                Err(e) => {
                    if let PipelineError::AggregationPartial { completed, .. } = &e {
                        summary.buckets_written += completed;
                    }
                    if *cancel.borrow() {
                        summary.cancelled = true;
                        return summary;
                    }
                    tracing::warn!(
                        "Scheduled {} aggregation failed for {}: {}",
                        granularity,
                        tenant.tracking_id,
                        e
                    );
                    summary.failures += 1;
                }
            }
        }
    }

    summary
}

/// Background task running `run_pass` on a fixed interval
pub struct AggregationScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AggregationScheduler {
    pub fn start(
        engine: AggregationEngine,
        scope: Arc<dyn TrackingScope>,
        config: &AggregationConfig,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let granularities = config.granularities.clone();
        let period = Duration::from_secs(config.interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let summary = run_pass(
                            &engine,
                            scope.as_ref(),
                            &granularities,
                            Utc::now(),
                            &shutdown_rx,
                        )
                        .await;
                        tracing::debug!(
                            "Aggregation pass: {} tenant(s), {} bucket(s), {} failure(s)",
                            summary.tenants,
                            summary.buckets_written,
                            summary.failures
                        );
                        if summary.cancelled {
                            tracing::info!("Aggregation scheduler stopped mid-pass");
                            break;
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Shutdown signal received, stopping aggregation scheduler");
                            break;
                        }
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the scheduler to stop after the bucket in progress
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signal shutdown and wait for the task to finish
    pub async fn stop(self) {
        self.shutdown();
        if let Err(e) = self.handle.await {
            tracing::error!("Aggregation scheduler task failed: {}", e);
        }
    }
}
