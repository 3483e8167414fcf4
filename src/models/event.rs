use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::classifier::ClassificationResult;
use crate::error::PipelineError;

/// Kind of recorded interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    AiBotDetected,
    LinkClick,
    PageUnload,
    Custom,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::PageView,
        EventType::AiBotDetected,
        EventType::LinkClick,
        EventType::PageUnload,
        EventType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PageView => "page_view",
            EventType::AiBotDetected => "ai_bot_detected",
            EventType::LinkClick => "link_click",
            EventType::PageUnload => "page_unload",
            EventType::Custom => "custom",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = PipelineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == raw)
            .ok_or_else(|| PipelineError::invalid("type", format!("unsupported event type '{raw}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub viewport: Option<Dimensions>,
    #[serde(default)]
    pub screen: Option<Dimensions>,
}

/// What the producer itself believed it saw. Advisory only; the server
/// classification on the event is authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotSighting {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkClick {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUnload {
    /// Browser snippets send this as `timeOnPage`
    #[serde(default, alias = "timeOnPage")]
    pub time_on_page_ms: Option<u64>,
    /// Percentage of the document scrolled. Out-of-range values are
    /// clamped into 0..=100.
    #[serde(default, deserialize_with = "clamped_percent")]
    pub scroll_depth: Option<u8>,
}

fn clamped_percent<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw
        .filter(|v| v.is_finite())
        .map(|v| v.round().clamp(0.0, 100.0) as u8))
}

/// Type-specific event data, keyed by the event type on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    PageView(PageView),
    AiBotDetected(BotSighting),
    LinkClick(LinkClick),
    PageUnload(PageUnload),
    Custom(serde_json::Map<String, serde_json::Value>),
}

impl EventPayload {
    /// Build the payload for `event_type` from the open `data` object a
    /// producer sent. `null` stands for an empty payload.
    pub fn from_parts(event_type: EventType, data: serde_json::Value) -> Result<Self, PipelineError> {
        let data = match data {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            serde_json::Value::Object(map) => serde_json::Value::Object(map),
            _ => return Err(PipelineError::invalid("data", "must be a JSON object")),
        };

        fn parse<T: serde::de::DeserializeOwned>(data: serde_json::Value) -> Result<T, PipelineError> {
            serde_json::from_value(data).map_err(|e| PipelineError::invalid("data", e.to_string()))
        }

        let payload = match event_type {
            EventType::PageView => EventPayload::PageView(parse(data)?),
            EventType::AiBotDetected => EventPayload::AiBotDetected(parse(data)?),
            EventType::LinkClick => EventPayload::LinkClick(parse(data)?),
            EventType::PageUnload => EventPayload::PageUnload(parse(data)?),
            EventType::Custom => EventPayload::Custom(parse(data)?),
        };

        Ok(payload)
    }

    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PageView(_) => EventType::PageView,
            EventPayload::AiBotDetected(_) => EventType::AiBotDetected,
            EventPayload::LinkClick(_) => EventType::LinkClick,
            EventPayload::PageUnload(_) => EventType::PageUnload,
            EventPayload::Custom(_) => EventType::Custom,
        }
    }

    /// The `data` half of the wire shape
    pub fn data(&self) -> serde_json::Value {
        let result = match self {
            EventPayload::PageView(v) => serde_json::to_value(v),
            EventPayload::AiBotDetected(v) => serde_json::to_value(v),
            EventPayload::LinkClick(v) => serde_json::to_value(v),
            EventPayload::PageUnload(v) => serde_json::to_value(v),
            EventPayload::Custom(map) => Ok(serde_json::Value::Object(map.clone())),
        };
        // Plain structs of strings and numbers always serialize
        result.unwrap_or(serde_json::Value::Null)
    }
}

/// Client environment flags reported by the producer. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub cookie_enabled: Option<bool>,
    #[serde(default, rename = "onLine")]
    pub on_line: Option<bool>,
}

/// Geographic attribution attached by the geo collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventGeo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// A validated event that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub tracking_id: String,
    pub session_id: String,
    pub url: Option<String>,
    pub identifying_string: String,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub client_info: ClientInfo,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub classification: Option<ClassificationResult>,
    pub geo: EventGeo,
}

impl NewEvent {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// A persisted, immutable event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub tracking_id: String,
    pub session_id: String,
    pub url: Option<String>,
    pub identifying_string: String,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub client_info: ClientInfo,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub classification: Option<ClassificationResult>,
    pub geo: EventGeo,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Whether this event counts as a detected AI agent visit
    pub fn is_detected_bot(&self) -> bool {
        self.event_type() == EventType::AiBotDetected
            && self.classification.as_ref().is_some_and(|c| c.detected)
    }
}
