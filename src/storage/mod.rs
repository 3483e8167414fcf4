pub mod postgres;
pub mod rows;
pub mod sqlite;
pub mod trait_def;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{EventStore, Reservation, StatsStore, Storage, Stores, TrackingScope};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{DatabaseBackend, DatabaseConfig};

/// Connect to the configured backend and make sure its schema exists
pub async fn connect(config: &DatabaseConfig) -> Result<Stores> {
    let stores = match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.url);
            let storage = SqliteStorage::new(&config.url, config.max_connections)
                .await
                .context("Failed to open SQLite database")?;
            storage.init().await?;
            Stores::new(Arc::new(storage))
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.url);
            let storage = PostgresStorage::new(&config.url, config.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            storage.init().await?;
            Stores::new(Arc::new(storage))
        }
    };

    info!("Database initialized successfully");
    Ok(stores)
}
