//! Row shapes shared by the SQLite and PostgreSQL backends.
//!
//! Instants are stored as epoch milliseconds, structured fields as JSON text.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::models::{
    ClientInfo, Event, EventGeo, EventPayload, EventType, Granularity, StatsRecord, Tenant,
};

pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp {ms} out of range"))
}

#[derive(Debug, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub tracking_id: String,
    pub session_id: String,
    pub event_type: String,
    pub url: Option<String>,
    pub identifying_string: String,
    pub data: String,
    pub client_info: String,
    pub occurred_at: i64,
    pub received_at: i64,
    pub classification: Option<String>,
    pub ip: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

pub const EVENT_COLUMNS: &str = "id, tracking_id, session_id, event_type, url, identifying_string, \
     data, client_info, occurred_at, received_at, classification, ip, country, city";

impl TryFrom<EventRow> for Event {
    type Error = anyhow::Error;

    fn try_from(row: EventRow) -> Result<Self> {
        let event_type: EventType = row.event_type.parse()?;
        let data: serde_json::Value =
            serde_json::from_str(&row.data).with_context(|| format!("event {} data", row.id))?;
        let client_info: ClientInfo = serde_json::from_str(&row.client_info)
            .with_context(|| format!("event {} client_info", row.id))?;
        let classification = row
            .classification
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .with_context(|| format!("event {} classification", row.id))?;

        Ok(Event {
            id: row.id,
            tracking_id: row.tracking_id,
            session_id: row.session_id,
            url: row.url,
            identifying_string: row.identifying_string,
            payload: EventPayload::from_parts(event_type, data)?,
            client_info,
            timestamp: from_millis(row.occurred_at)?,
            received_at: from_millis(row.received_at)?,
            classification,
            geo: EventGeo {
                ip: row.ip,
                country: row.country,
                city: row.city,
            },
        })
    }
}

/// Values bound when inserting an event, in `INSERT` column order
pub struct EventValues {
    pub data: String,
    pub client_info: String,
    pub classification: Option<String>,
    pub occurred_at: i64,
    pub received_at: i64,
}

impl EventValues {
    pub fn encode(event: &crate::models::NewEvent) -> Result<Self> {
        Ok(Self {
            data: serde_json::to_string(&event.payload.data())?,
            client_info: serde_json::to_string(&event.client_info)?,
            classification: event
                .classification
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            occurred_at: to_millis(event.timestamp),
            received_at: to_millis(event.received_at),
        })
    }
}

#[derive(Debug, FromRow)]
pub struct StatsRow {
    pub tracking_id: String,
    pub period_start: i64,
    pub granularity: String,
    pub total_events: i64,
    pub page_views: i64,
    pub ai_bots_detected: i64,
    pub unique_sessions: i64,
    pub top_pages: String,
    pub top_bots: String,
    pub top_countries: String,
}

pub const STATS_COLUMNS: &str = "tracking_id, period_start, granularity, total_events, page_views, \
     ai_bots_detected, unique_sessions, top_pages, top_bots, top_countries";

impl TryFrom<StatsRow> for StatsRecord {
    type Error = anyhow::Error;

    fn try_from(row: StatsRow) -> Result<Self> {
        let granularity: Granularity = row.granularity.parse()?;
        Ok(StatsRecord {
            tracking_id: row.tracking_id,
            period_start: from_millis(row.period_start)?,
            granularity,
            total_events: row.total_events,
            page_views: row.page_views,
            ai_bots_detected: row.ai_bots_detected,
            unique_sessions: row.unique_sessions,
            top_pages: serde_json::from_str(&row.top_pages)?,
            top_bots: serde_json::from_str(&row.top_bots)?,
            top_countries: serde_json::from_str(&row.top_countries)?,
        })
    }
}

/// JSON-encoded top-N lists of a record
pub struct TopLists {
    pub pages: String,
    pub bots: String,
    pub countries: String,
}

impl TopLists {
    pub fn encode(record: &StatsRecord) -> Result<Self> {
        Ok(Self {
            pages: serde_json::to_string(&record.top_pages)?,
            bots: serde_json::to_string(&record.top_bots)?,
            countries: serde_json::to_string(&record.top_countries)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TenantRow {
    pub tracking_id: String,
    pub name: String,
    pub domain: Option<String>,
    pub plan: String,
    pub events_per_month: i64,
    pub events_this_month: i64,
    pub usage_period_start: i64,
    pub is_active: bool,
}

pub const TENANT_COLUMNS: &str = "tracking_id, name, domain, plan, events_per_month, \
     events_this_month, usage_period_start, is_active";

impl TryFrom<TenantRow> for Tenant {
    type Error = anyhow::Error;

    fn try_from(row: TenantRow) -> Result<Self> {
        Ok(Tenant {
            tracking_id: row.tracking_id,
            name: row.name,
            domain: row.domain,
            plan: row.plan.parse()?,
            events_per_month: row.events_per_month,
            events_this_month: row.events_this_month,
            usage_period_start: from_millis(row.usage_period_start)?,
            is_active: row.is_active,
        })
    }
}
