pub mod bucket;
pub mod engine;
pub mod rollup;
pub mod scheduler;

pub use bucket::{month_start, partition, Bucket};
pub use engine::AggregationEngine;
pub use rollup::{rollup, RankedCounter, DEFAULT_TOP_N};
pub use scheduler::{run_pass, AggregationScheduler, PassSummary};
