use serde::{Deserialize, Serialize};

use crate::models::{ClientInfo, Dimensions};

/// Collector endpoint used when none is configured
pub const DEFAULT_ENDPOINT: &str = "https://api.ai-pixel.com/track";

/// Settings of a `Tracker`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Tenant scope sent with every event. Required.
    pub tracking_id: String,

    /// URL events are POSTed to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Log every outgoing event and every delivery failure at debug level
    #[serde(default)]
    pub debug_enabled: bool,

    /// Run `Tracker::start` (self-classification plus a page view) on
    /// construction
    #[serde(default = "default_auto_start")]
    pub auto_start: bool,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_auto_start() -> bool {
    true
}

impl TrackerConfig {
    pub fn new(tracking_id: impl Into<String>) -> Self {
        Self {
            tracking_id: tracking_id.into(),
            endpoint: default_endpoint(),
            debug_enabled: false,
            auto_start: default_auto_start(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_enabled = enabled;
        self
    }

    pub fn with_auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }
}

/// What the host page knows about itself, attached to every event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContext {
    pub url: Option<String>,
    pub title: Option<String>,
    pub referrer: Option<String>,
    /// The host's own identifying string, used for self-classification
    pub identifying_string: String,
    pub client_info: ClientInfo,
    pub viewport: Option<Dimensions>,
    pub screen: Option<Dimensions>,
}

impl PageContext {
    pub fn new(url: impl Into<String>, identifying_string: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            identifying_string: identifying_string.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::new("T1");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.auto_start);
        assert!(!config.debug_enabled);
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: TrackerConfig = serde_json::from_str(r#"{"trackingId":"T1","debugEnabled":true}"#).unwrap();
        assert_eq!(config.tracking_id, "T1");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.debug_enabled);
        assert!(config.auto_start);
    }
}
