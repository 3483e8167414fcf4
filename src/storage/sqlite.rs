use crate::models::{Event, EventType, Granularity, NewEvent, StatsRecord, Tenant};
use crate::storage::rows::{
    to_millis, EventRow, EventValues, StatsRow, TenantRow, TopLists, EVENT_COLUMNS, STATS_COLUMNS,
    TENANT_COLUMNS,
};
use crate::storage::{EventStore, Reservation, StatsStore, Storage, TrackingScope};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    /// Each connection to `sqlite::memory:` is its own database, so
    /// in-memory stores should use a single connection.
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                tracking_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                domain TEXT,
                plan TEXT NOT NULL,
                events_per_month INTEGER NOT NULL,
                events_this_month INTEGER NOT NULL DEFAULT 0,
                usage_period_start INTEGER NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tracking_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                url TEXT,
                identifying_string TEXT NOT NULL,
                data TEXT NOT NULL,
                client_info TEXT NOT NULL,
                occurred_at INTEGER NOT NULL,
                received_at INTEGER NOT NULL,
                classification TEXT,
                ip TEXT,
                country TEXT,
                city TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_tracking_time ON events(tracking_id, occurred_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_tracking_type_time ON events(tracking_id, event_type, occurred_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stats (
                tracking_id TEXT NOT NULL,
                period_start INTEGER NOT NULL,
                granularity TEXT NOT NULL,
                total_events INTEGER NOT NULL,
                page_views INTEGER NOT NULL,
                ai_bots_detected INTEGER NOT NULL,
                unique_sessions INTEGER NOT NULL,
                top_pages TEXT NOT NULL,
                top_bots TEXT NOT NULL,
                top_countries TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (tracking_id, period_start, granularity)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_stats_range ON stats(tracking_id, granularity, period_start)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteStorage {
    async fn insert_event(&self, event: &NewEvent) -> Result<i64> {
        let values = EventValues::encode(event)?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (
                tracking_id, session_id, event_type, url, identifying_string,
                data, client_info, occurred_at, received_at, classification, ip, country, city
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.tracking_id)
        .bind(&event.session_id)
        .bind(event.event_type().as_str())
        .bind(&event.url)
        .bind(&event.identifying_string)
        .bind(&values.data)
        .bind(&values.client_info)
        .bind(values.occurred_at)
        .bind(values.received_at)
        .bind(&values.classification)
        .bind(&event.geo.ip)
        .bind(&event.geo.country)
        .bind(&event.geo.city)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn events_in_range(
        &self,
        tracking_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE tracking_id = ? AND occurred_at >= ? AND occurred_at < ? \
             ORDER BY occurred_at ASC, id ASC"
        );

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(tracking_id)
            .bind(to_millis(start))
            .bind(to_millis(end))
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn events_of_type_in_range(
        &self,
        tracking_id: &str,
        event_type: EventType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE tracking_id = ? AND event_type = ? AND occurred_at >= ? AND occurred_at < ? \
             ORDER BY occurred_at ASC, id ASC"
        );

        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(tracking_id)
            .bind(event_type.as_str())
            .bind(to_millis(start))
            .bind(to_millis(end))
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn count_events(&self, tracking_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE tracking_id = ?")
            .bind(tracking_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl StatsStore for SqliteStorage {
    async fn upsert_stats(&self, record: &StatsRecord) -> Result<()> {
        let tops = TopLists::encode(record)?;

        sqlx::query(
            r#"
            INSERT INTO stats (
                tracking_id, period_start, granularity, total_events, page_views,
                ai_bots_detected, unique_sessions, top_pages, top_bots, top_countries, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tracking_id, period_start, granularity) DO UPDATE SET
                total_events = excluded.total_events,
                page_views = excluded.page_views,
                ai_bots_detected = excluded.ai_bots_detected,
                unique_sessions = excluded.unique_sessions,
                top_pages = excluded.top_pages,
                top_bots = excluded.top_bots,
                top_countries = excluded.top_countries,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.tracking_id)
        .bind(to_millis(record.period_start))
        .bind(record.granularity.as_str())
        .bind(record.total_events)
        .bind(record.page_views)
        .bind(record.ai_bots_detected)
        .bind(record.unique_sessions)
        .bind(&tops.pages)
        .bind(&tops.bots)
        .bind(&tops.countries)
        .bind(Utc::now().timestamp())
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get_stats(
        &self,
        tracking_id: &str,
        granularity: Granularity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StatsRecord>> {
        let sql = format!(
            "SELECT {STATS_COLUMNS} FROM stats \
             WHERE tracking_id = ? AND granularity = ? AND period_start >= ? AND period_start < ? \
             ORDER BY period_start ASC"
        );

        let rows = sqlx::query_as::<_, StatsRow>(&sql)
            .bind(tracking_id)
            .bind(granularity.as_str())
            .bind(to_millis(from))
            .bind(to_millis(to))
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.into_iter().map(StatsRecord::try_from).collect()
    }
}

#[async_trait]
impl TrackingScope for SqliteStorage {
    async fn get_tenant(&self, tracking_id: &str) -> Result<Option<Tenant>> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE tracking_id = ?");

        let row = sqlx::query_as::<_, TenantRow>(&sql)
            .bind(tracking_id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.map(Tenant::try_from).transpose()
    }

    async fn reserve_event(&self, tracking_id: &str, now: DateTime<Utc>) -> Result<Reservation> {
        let period = to_millis(crate::aggregation::month_start(now));

        // A stored period older than the current month means the counter restarts at 1
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET events_this_month = CASE WHEN usage_period_start < ? THEN 1 ELSE events_this_month + 1 END,
                usage_period_start = CASE WHEN usage_period_start < ? THEN ? ELSE usage_period_start END
            WHERE tracking_id = ?
              AND is_active = 1
              AND ((usage_period_start < ? AND events_per_month > 0)
                   OR events_this_month < events_per_month)
            "#,
        )
        .bind(period)
        .bind(period)
        .bind(period)
        .bind(tracking_id)
        .bind(period)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(Reservation::Reserved);
        }

        match self.get_tenant(tracking_id).await? {
            Some(tenant) if tenant.is_active => Ok(Reservation::OverQuota),
            _ => Ok(Reservation::UnknownTenant),
        }
    }

    async fn release_event(&self, tracking_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE tenants
            SET events_this_month = events_this_month - 1
            WHERE tracking_id = ? AND events_this_month > 0
            "#,
        )
        .bind(tracking_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn upsert_tenant(&self, tenant: &Tenant) -> Result<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO tenants (
                tracking_id, name, domain, plan, events_per_month, events_this_month,
                usage_period_start, is_active, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (tracking_id) DO UPDATE SET
                name = excluded.name,
                domain = COALESCE(excluded.domain, tenants.domain),
                plan = excluded.plan,
                events_per_month = excluded.events_per_month,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&tenant.tracking_id)
        .bind(&tenant.name)
        .bind(&tenant.domain)
        .bind(tenant.plan.as_str())
        .bind(tenant.events_per_month)
        .bind(tenant.events_this_month)
        .bind(to_millis(tenant.usage_period_start))
        .bind(tenant.is_active)
        .bind(now)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY tracking_id ASC");

        let rows = sqlx::query_as::<_, TenantRow>(&sql)
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.into_iter().map(Tenant::try_from).collect()
    }
}
