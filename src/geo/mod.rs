//! Geographic attribution of events
//!
//! Resolves the client address of a request and, when MaxMind databases
//! are configured, its country and city. The result is attached to the
//! event at ingestion and feeds the top countries rollup.

pub mod geoip;
pub mod ip_extractor;

pub use geoip::{GeoIpService, GeoLocation};
pub use ip_extractor::{anonymize_ip, extract_client_ip};

use axum::http::HeaderMap;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::AnalyticsConfig;
use crate::models::EventGeo;

/// Turns request metadata into an `EventGeo`
#[derive(Clone)]
pub struct GeoResolver {
    config: AnalyticsConfig,
    geoip: Option<Arc<GeoIpService>>,
}

impl GeoResolver {
    pub fn new(config: AnalyticsConfig, geoip: Option<Arc<GeoIpService>>) -> Self {
        Self { config, geoip }
    }

    /// Open the configured database. A missing path disables lookups.
    pub fn from_config(config: &AnalyticsConfig) -> anyhow::Result<Self> {
        let geoip = match config.geoip_city_db_path.as_deref() {
            Some(path) => Some(Arc::new(GeoIpService::new(Some(path))?)),
            None => None,
        };

        Ok(Self::new(config.clone(), geoip))
    }

    /// Resolve the geo attribution for a request from `socket_ip`
    pub fn resolve(&self, headers: &HeaderMap, socket_ip: IpAddr) -> EventGeo {
        let mut client_ip = extract_client_ip(headers, socket_ip, &self.config);

        if self.config.ip_anonymization {
            client_ip = anonymize_ip(client_ip);
        }

        let location = self
            .geoip
            .as_ref()
            .map(|service| service.lookup(client_ip))
            .unwrap_or_default();

        EventGeo {
            ip: (!self.config.ip_anonymization).then(|| client_ip.to_string()),
            country: location.country_code,
            city: location.city,
        }
    }
}
