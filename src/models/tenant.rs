use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Billing plan of a tenant, which sets its default monthly quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
        }
    }

    /// Monthly event ceiling applied when none is given explicitly
    pub const fn default_events_per_month(&self) -> i64 {
        match self {
            Plan::Free => 1_000,
            Plan::Pro => 100_000,
            Plan::Enterprise => 10_000_000,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            other => Err(anyhow::anyhow!("unknown plan '{other}'")),
        }
    }
}

/// The account-level owner of a tracking id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub tracking_id: String,
    pub name: String,
    pub domain: Option<String>,
    pub plan: Plan,
    pub events_per_month: i64,
    pub events_this_month: i64,
    /// First instant of the month `events_this_month` counts
    pub usage_period_start: DateTime<Utc>,
    pub is_active: bool,
}

impl Tenant {
    pub fn new(tracking_id: &str, name: &str, plan: Plan, now: DateTime<Utc>) -> Self {
        Self {
            tracking_id: tracking_id.to_string(),
            name: name.to_string(),
            domain: None,
            plan,
            events_per_month: plan.default_events_per_month(),
            events_this_month: 0,
            usage_period_start: crate::aggregation::month_start(now),
            is_active: true,
        }
    }
}
