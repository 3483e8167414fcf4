//! GeoIP lookup service using MaxMind GeoLite2/GeoIP2 MMDB
//!
//! Memory-mapped readers are shared behind `Arc`, so the service is cheap
//! to clone into request handlers.

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::IpAddr;
use std::sync::Arc;

/// Location fields resolved for one address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLocation {
    /// ISO country code (e.g., "US", "GB")
    pub country_code: Option<String>,
    pub city: Option<String>,
}

#[derive(Clone)]
pub struct GeoIpService {
    city_reader: Option<Arc<Reader<Mmap>>>,
}

impl GeoIpService {
    /// Open a City or Country database. Without a path every lookup is empty.
    pub fn new(city_path: Option<&str>) -> Result<Self> {
        let city_reader = city_path
            .map(|path| {
                unsafe { Reader::open_mmap(path) }
                    .with_context(|| format!("Failed to open GeoIP City database at {}", path))
                    .map(Arc::new)
            })
            .transpose()?;

        Ok(Self { city_reader })
    }

    /// Whether a database is loaded
    pub fn is_enabled(&self) -> bool {
        self.city_reader.is_some()
    }

    /// Resolve an address. Unknown addresses yield an empty location.
    pub fn lookup(&self, ip: IpAddr) -> GeoLocation {
        let mut location = GeoLocation::default();

        if let Some(ref reader) = self.city_reader {
            if let Ok(result) = reader.lookup(ip) {
                if let Ok(Some(city)) = result.decode::<geoip2::City>() {
                    location.country_code = city.country.iso_code.map(|s| s.to_string());
                    location.city = city.city.names.english.map(|s| s.to_string());
                } else if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
                    // Country-only databases still carry the ISO code
                    location.country_code = country.country.iso_code.map(|s| s.to_string());
                }
            }
        }

        location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geoip_service_creation_invalid_path() {
        let result = GeoIpService::new(Some("/nonexistent/path.mmdb"));
        assert!(result.is_err());
    }

    #[test]
    fn test_geoip_service_without_databases() {
        let service = GeoIpService::new(None).unwrap();
        assert!(!service.is_enabled());
        assert_eq!(service.lookup("203.0.113.1".parse().unwrap()), GeoLocation::default());
    }
}
