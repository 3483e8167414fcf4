use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Length of an aggregation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Hourly,
        Granularity::Daily,
        Granularity::Weekly,
        Granularity::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            "weekly" => Ok(Granularity::Weekly),
            "monthly" => Ok(Granularity::Monthly),
            other => Err(PipelineError::invalid(
                "granularity",
                format!("unsupported granularity '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    pub url: String,
    pub views: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCount {
    /// Signature name, serialized under the same key the classifier uses
    #[serde(rename = "matchedName", alias = "name")]
    pub name: String,
    pub description: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCount {
    pub country: String,
    pub count: i64,
}

/// Aggregate for one tracking id over one period.
///
/// Unique by `(tracking_id, period_start, granularity)`. Carries no write
/// time, so recomputing an unchanged period yields an equal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsRecord {
    pub tracking_id: String,
    pub period_start: DateTime<Utc>,
    pub granularity: Granularity,
    pub total_events: i64,
    pub page_views: i64,
    pub ai_bots_detected: i64,
    pub unique_sessions: i64,
    pub top_pages: Vec<PageCount>,
    pub top_bots: Vec<BotCount>,
    pub top_countries: Vec<CountryCount>,
}

impl StatsRecord {
    /// An all-zero record for a bucket with no events
    pub fn empty(tracking_id: &str, period_start: DateTime<Utc>, granularity: Granularity) -> Self {
        Self {
            tracking_id: tracking_id.to_string(),
            period_start,
            granularity,
            total_events: 0,
            page_views: 0,
            ai_bots_detected: 0,
            unique_sessions: 0,
            top_pages: Vec::new(),
            top_bots: Vec::new(),
            top_countries: Vec::new(),
        }
    }
}
