use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::{Event, EventType, Granularity, NewEvent, StatsRecord, Tenant};

/// Append-only store of validated events
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event and return its id
    async fn insert_event(&self, event: &NewEvent) -> Result<i64>;

    /// Events of a tracking id with `start <= timestamp < end`, ordered by
    /// timestamp then id
    async fn events_in_range(
        &self,
        tracking_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Same as `events_in_range`, restricted to one event type
    async fn events_of_type_in_range(
        &self,
        tracking_id: &str,
        event_type: EventType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Total number of stored events for a tracking id
    async fn count_events(&self, tracking_id: &str) -> Result<i64>;
}

/// Store of aggregate records, unique by `(tracking_id, period_start, granularity)`
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Insert the record or replace every metric of the existing one with
    /// the same key, atomically
    async fn upsert_stats(&self, record: &StatsRecord) -> Result<()>;

    /// Records with `from <= period_start < to`, ordered by period start
    async fn get_stats(
        &self,
        tracking_id: &str,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StatsRecord>>;
}

/// Outcome of reserving one event against a tenant's quota
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Reserved,
    OverQuota,
    UnknownTenant,
}

/// Tenant lookup and quota accounting
#[async_trait]
pub trait TrackingScope: Send + Sync {
    async fn get_tenant(&self, tracking_id: &str) -> Result<Option<Tenant>>;

    /// Atomically check the quota and count one event. Starts a fresh
    /// counter when `now` falls in a later month than the stored usage.
    async fn reserve_event(&self, tracking_id: &str, now: DateTime<Utc>) -> Result<Reservation>;

    /// Give back a reservation whose event was not persisted
    async fn release_event(&self, tracking_id: &str) -> Result<()>;

    /// Create a tenant or update its name, domain, plan, quota and active
    /// flag. Usage counters are left untouched on update.
    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<()>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>>;
}

#[async_trait]
pub trait Storage: EventStore + StatsStore + TrackingScope {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;
}

/// One backend seen through each of its roles
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub stats: Arc<dyn StatsStore>,
    pub scope: Arc<dyn TrackingScope>,
}

impl Stores {
    pub fn new<S: Storage + 'static>(backend: Arc<S>) -> Self {
        Self {
            events: backend.clone(),
            stats: backend.clone(),
            scope: backend,
        }
    }
}
