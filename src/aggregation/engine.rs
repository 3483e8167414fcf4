use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::config::AggregationConfig;
use crate::error::{bounded, PipelineError, PipelineResult};
use crate::models::{Granularity, StatsRecord};
use crate::storage::{EventStore, StatsStore, Stores};

use super::bucket::{partition, Bucket};
use super::rollup::rollup;

type BucketKey = (String, DateTime<Utc>, Granularity);

/// Recomputes stats records from stored events, one bucket at a time.
///
/// Each bucket is computed from a full scan and written with a single
/// upsert, under a lock keyed by `(tracking_id, period_start, granularity)`
/// so overlapping runs in this process never interleave on the same record.
#[derive(Clone)]
pub struct AggregationEngine {
    events: Arc<dyn EventStore>,
    stats: Arc<dyn StatsStore>,
    top_n: usize,
    storage_timeout: Duration,
    locks: Arc<DashMap<BucketKey, Arc<Mutex<()>>>>,
}

fn validate_window(
    tracking_id: &str,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> PipelineResult<()> {
    if tracking_id.trim().is_empty() {
        return Err(PipelineError::invalid("trackingId", "is required"));
    }
    if window_start >= window_end {
        return Err(PipelineError::invalid("windowEnd", "must be after windowStart"));
    }
    Ok(())
}

impl AggregationEngine {
    pub fn new(stores: &Stores, config: &AggregationConfig) -> Self {
        Self::with_stores(
            stores.events.clone(),
            stores.stats.clone(),
            config.top_n,
            Duration::from_millis(config.storage_timeout_ms),
        )
    }

    pub fn with_stores(
        events: Arc<dyn EventStore>,
        stats: Arc<dyn StatsStore>,
        top_n: usize,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            events,
            stats,
            top_n,
            storage_timeout,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Upper bound applied to each storage call
    pub fn storage_timeout(&self) -> Duration {
        self.storage_timeout
    }

    /// Recompute every bucket of `granularity` intersecting
    /// `[window_start, window_end)` and replace the stored records.
    ///
    /// Returns the records written, oldest first. Re-running over the same
    /// events yields identical records.
    pub async fn aggregate(
        &self,
        tracking_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        granularity: Granularity,
    ) -> PipelineResult<Vec<StatsRecord>> {
        self.run(tracking_id, window_start, window_end, granularity, None)
            .await
    }

    /// `aggregate` that stops between buckets once `cancel` reads `true`.
    /// A bucket already being written always completes.
    pub async fn aggregate_cancellable(
        &self,
        tracking_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        granularity: Granularity,
        cancel: &watch::Receiver<bool>,
    ) -> PipelineResult<Vec<StatsRecord>> {
        self.run(tracking_id, window_start, window_end, granularity, Some(cancel))
            .await
    }

    async fn run(
        &self,
        tracking_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        granularity: Granularity,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> PipelineResult<Vec<StatsRecord>> {
        validate_window(tracking_id, window_start, window_end)?;

        let buckets = partition(granularity, window_start, window_end);
        let mut written = Vec::with_capacity(buckets.len());

        for bucket in buckets {
            if cancel.is_some_and(|rx| *rx.borrow()) {
                debug!(
                    "{} aggregation of {} cancelled at {}",
                    granularity, tracking_id, bucket.start
                );
                return Err(PipelineError::AggregationPartial {
                    completed: written.len(),
                    resume_from: bucket.start,
                    cause: "cancelled".to_string(),
                });
            }

            // The bucket runs on its own task so dropping this future cannot
            // abandon an upsert halfway.
            let engine = self.clone();
            let owned_id = tracking_id.to_string();
            let outcome = tokio::spawn(async move {
                engine.aggregate_bucket(&owned_id, granularity, bucket).await
            })
            .await
            .unwrap_or_else(|e| {
                Err(PipelineError::StorageUnavailable(anyhow::anyhow!(
                    "bucket task failed: {e}"
                )))
            });

            match outcome {
                Ok(record) => written.push(record),
                Err(e) if written.is_empty() => return Err(e),
                Err(e) => {
                    warn!(
                        "{} aggregation of {} stopped after {} bucket(s): {}",
                        granularity,
                        tracking_id,
                        written.len(),
                        e
                    );
                    return Err(PipelineError::AggregationPartial {
                        completed: written.len(),
                        resume_from: bucket.start,
                        cause: e.to_string(),
                    });
                }
            }
        }

        debug!(
            "Aggregated {} {} bucket(s) for {}",
            written.len(),
            granularity,
            tracking_id
        );
        Ok(written)
    }

    async fn aggregate_bucket(
        &self,
        tracking_id: &str,
        granularity: Granularity,
        bucket: Bucket,
    ) -> PipelineResult<StatsRecord> {
        let key = (tracking_id.to_string(), bucket.start, granularity);
        let lock = self.locks.entry(key.clone()).or_default().clone();

        let result = {
            let _guard = lock.lock().await;
            self.scan_and_write(tracking_id, granularity, bucket).await
        };

        drop(lock);
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn scan_and_write(
        &self,
        tracking_id: &str,
        granularity: Granularity,
        bucket: Bucket,
    ) -> PipelineResult<StatsRecord> {
        let events = bounded(
            self.storage_timeout,
            self.events.events_in_range(tracking_id, bucket.start, bucket.end),
        )
        .await?;

        let record = rollup(tracking_id, granularity, bucket, &events, self.top_n);
        bounded(self.storage_timeout, self.stats.upsert_stats(&record)).await?;

        Ok(record)
    }

    /// Stored records with `from <= period_start < to`
    pub async fn stats(
        &self,
        tracking_id: &str,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PipelineResult<Vec<StatsRecord>> {
        validate_window(tracking_id, from, to)?;
        bounded(
            self.storage_timeout,
            self.stats.get_stats(tracking_id, granularity, from, to),
        )
        .await
    }

    /// Number of bucket locks currently held or awaited
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }
}
