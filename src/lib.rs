pub mod aggregation;
pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod geo;
pub mod ingest;
pub mod models;
pub mod storage;
pub mod tracker;
