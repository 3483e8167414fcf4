//! The wire shape of a "report interaction" call and its validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::ClassificationResult;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ClientInfo, EventPayload, EventType};

/// Longest accepted tracking or session id
pub const MAX_ID_LEN: usize = 128;

/// A producer's report as received, before any validation.
///
/// Everything is optional or loosely typed here so that a bad field is
/// reported by name instead of failing the whole body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Browsers report this as `userAgent`
    #[serde(default, alias = "userAgent", skip_serializing_if = "Option::is_none")]
    pub identifying_string: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<serde_json::Value>,

    /// RFC 3339 string or epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<serde_json::Value>,

    /// Country attributed upstream, used when the server resolves none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
}

/// A report whose shape has been checked
#[derive(Debug, Clone, PartialEq)]
pub struct ValidReport {
    pub tracking_id: String,
    pub session_id: String,
    pub payload: EventPayload,
    pub url: Option<String>,
    pub identifying_string: Option<String>,
    pub client_info: ClientInfo,
    pub timestamp: DateTime<Utc>,
    pub caller_classification: Option<ClassificationResult>,
    pub country: Option<String>,
    pub city: Option<String>,
}

impl ValidReport {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

fn required_id(value: Option<String>, field: &'static str) -> PipelineResult<String> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    if value.is_empty() {
        return Err(PipelineError::invalid(field, "is required"));
    }
    if value.chars().count() > MAX_ID_LEN {
        return Err(PipelineError::invalid(
            field,
            format!("must be at most {MAX_ID_LEN} characters"),
        ));
    }
    Ok(value)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse a producer timestamp: an RFC 3339 string or epoch milliseconds
pub fn parse_timestamp(value: &serde_json::Value) -> PipelineResult<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| PipelineError::invalid("timestamp", format!("not an RFC 3339 instant: {e}"))),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| PipelineError::invalid("timestamp", "epoch milliseconds out of range")),
        _ => Err(PipelineError::invalid(
            "timestamp",
            "must be an RFC 3339 string or epoch milliseconds",
        )),
    }
}

impl RawReport {
    /// Check every field. `received_at` stands in for a missing timestamp.
    pub fn validate(self, received_at: DateTime<Utc>) -> PipelineResult<ValidReport> {
        let tracking_id = required_id(self.tracking_id, "trackingId")?;
        let session_id = required_id(self.session_id, "sessionId")?;

        let event_type: EventType = match self.event_type.as_deref().map(str::trim) {
            None | Some("") => return Err(PipelineError::invalid("type", "is required")),
            Some(raw) => raw.parse()?,
        };

        let payload = EventPayload::from_parts(event_type, self.data)?;

        let client_info = match self.client_info {
            None | Some(serde_json::Value::Null) => ClientInfo::default(),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| PipelineError::invalid("clientInfo", e.to_string()))?,
        };

        let timestamp = match self.timestamp {
            None | Some(serde_json::Value::Null) => received_at,
            Some(value) => parse_timestamp(&value)?,
        };

        let caller_classification = match self.classification {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value(value)
                    .map_err(|e| PipelineError::invalid("classification", e.to_string()))?,
            ),
        };

        Ok(ValidReport {
            tracking_id,
            session_id,
            payload,
            url: non_empty(self.url),
            identifying_string: non_empty(self.identifying_string),
            client_info,
            timestamp,
            caller_classification,
            country: non_empty(self.country),
            city: non_empty(self.city),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn report(value: serde_json::Value) -> RawReport {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_browser_report() {
        let valid = report(json!({
            "type": "page_view",
            "trackingId": "T1",
            "sessionId": "aip_abc_1",
            "timestamp": "2024-06-01T11:59:00.000Z",
            "url": "https://example.com/",
            "userAgent": "Mozilla/5.0",
            "data": { "title": "Home" },
            "clientInfo": { "language": "en-US", "platform": "MacIntel", "cookieEnabled": true, "onLine": true }
        }))
        .validate(now())
        .unwrap();

        assert_eq!(valid.event_type(), EventType::PageView);
        assert_eq!(valid.identifying_string.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(valid.client_info.on_line, Some(true));
        assert_eq!(valid.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 11, 59, 0).unwrap());
    }

    #[test]
    fn test_missing_timestamp_uses_receive_time() {
        let valid = report(json!({ "type": "custom", "trackingId": "T1", "sessionId": "S1" }))
            .validate(now())
            .unwrap();
        assert_eq!(valid.timestamp, now());
    }

    #[test]
    fn test_epoch_millis_timestamp() {
        let valid = report(json!({
            "type": "custom", "trackingId": "T1", "sessionId": "S1", "timestamp": 1717243140000i64
        }))
        .validate(now())
        .unwrap();
        assert_eq!(valid.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 11, 59, 0).unwrap());
    }

    #[test]
    fn test_rejections_name_the_field() {
        let cases = [
            (json!({ "type": "page_view", "sessionId": "S1" }), "trackingId"),
            (json!({ "type": "page_view", "trackingId": "  ", "sessionId": "S1" }), "trackingId"),
            (json!({ "type": "page_view", "trackingId": "T1" }), "sessionId"),
            (json!({ "trackingId": "T1", "sessionId": "S1" }), "type"),
            (json!({ "type": "not_a_real_type", "trackingId": "T1", "sessionId": "S1" }), "type"),
            (json!({ "type": "page_view", "trackingId": "T1", "sessionId": "S1", "timestamp": "yesterday" }), "timestamp"),
            (json!({ "type": "page_view", "trackingId": "T1", "sessionId": "S1", "timestamp": true }), "timestamp"),
            (json!({ "type": "page_view", "trackingId": "T1", "sessionId": "S1", "data": "x" }), "data"),
            (json!({ "type": "page_view", "trackingId": "T1", "sessionId": "S1", "clientInfo": { "onLine": "yes" } }), "clientInfo"),
            (json!({ "type": "page_view", "trackingId": "T1", "sessionId": "S1", "classification": { "detected": "no" } }), "classification"),
        ];

        for (body, field) in cases {
            let err = report(body.clone()).validate(now()).unwrap_err();
            assert_eq!(err.field(), Some(field), "body: {}", body);
        }
    }

    #[test]
    fn test_overlong_session_id() {
        let err = report(json!({
            "type": "page_view", "trackingId": "T1", "sessionId": "s".repeat(MAX_ID_LEN + 1)
        }))
        .validate(now())
        .unwrap_err();
        assert_eq!(err.field(), Some("sessionId"));
    }
}
