use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::Granularity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub ingestion: IngestionConfig,
    pub aggregation: AggregationConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS origins allowed to report events. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Upper bound on every storage call made while ingesting
    pub storage_timeout_ms: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            storage_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Run the background scheduler
    pub enabled: bool,
    /// Seconds between scheduled passes
    pub interval_secs: u64,
    /// Granularities rolled up by each scheduled pass
    pub granularities: Vec<Granularity>,
    /// Length cap of the top pages / bots / countries lists
    pub top_n: usize,
    /// Upper bound on every storage call made while aggregating
    pub storage_timeout_ms: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            granularities: Granularity::ALL.to_vec(),
            top_n: crate::aggregation::DEFAULT_TOP_N,
            storage_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustedProxyMode {
    /// Use the socket address only
    None,
    /// Honor Forwarded / X-Forwarded-For
    Standard,
    /// Honor CF-Connecting-IP
    Cloudflare,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub geoip_city_db_path: Option<String>,
    /// Zero the host bits of client IPs and never store them
    pub ip_anonymization: bool,
    pub trusted_proxy_mode: TrustedProxyMode,
    /// CIDR ranges of proxies whose X-Forwarded-For entries are skipped
    pub trusted_proxies: Vec<String>,
    /// Fixed number of trusted hops at the end of X-Forwarded-For
    pub num_trusted_proxies: Option<usize>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            geoip_city_db_path: None,
            ip_anonymization: false,
            trusted_proxy_mode: TrustedProxyMode::None,
            trusted_proxies: Vec::new(),
            num_trusted_proxies: None,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./aipixel.db?mode=rwc".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()?;

        let storage_timeout_ms = std::env::var("STORAGE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5_000);

        let mut aggregation = AggregationConfig {
            enabled: env_flag("AGGREGATION_ENABLED", true),
            storage_timeout_ms,
            ..Default::default()
        };

        if let Some(secs) = std::env::var("AGGREGATION_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            aggregation.interval_secs = secs.max(1);
        }

        if let Some(top_n) = std::env::var("AGGREGATION_TOP_N")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
        {
            aggregation.top_n = top_n;
        }

        let granularities = env_list("AGGREGATION_GRANULARITIES");
        if !granularities.is_empty() {
            aggregation.granularities = granularities
                .iter()
                .map(|g| g.parse::<Granularity>())
                .collect::<Result<Vec<_>, _>>()
                .context("AGGREGATION_GRANULARITIES must list hourly, daily, weekly or monthly")?;
        }

        let trusted_proxy_mode = match std::env::var("TRUSTED_PROXY_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "none" => TrustedProxyMode::None,
            "standard" => TrustedProxyMode::Standard,
            "cloudflare" => TrustedProxyMode::Cloudflare,
            other => {
                tracing::warn!(
                    "Unknown TRUSTED_PROXY_MODE '{other}', falling back to 'none'. Supported values: none, standard, cloudflare"
                );
                TrustedProxyMode::None
            }
        };

        let num_trusted_proxies = std::env::var("NUM_TRUSTED_PROXIES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok());

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
                allowed_origins: env_list("ALLOWED_ORIGINS"),
            },
            ingestion: IngestionConfig { storage_timeout_ms },
            aggregation,
            analytics: AnalyticsConfig {
                geoip_city_db_path: std::env::var("GEOIP_CITY_DB_PATH").ok(),
                ip_anonymization: env_flag("IP_ANONYMIZATION", false),
                trusted_proxy_mode,
                trusted_proxies: env_list("TRUSTED_PROXIES"),
                num_trusted_proxies,
            },
        })
    }
}
