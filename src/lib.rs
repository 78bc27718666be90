//! # Vitals Keeper - Host Vitals Time Series
//!
//! Periodically samples host vitals (CPU, memory, disk, temperature),
//! keeps them as a bounded time series and serves "latest point" and
//! "recent window" reads while sampling continues.
//!
//! ## Features
//!
//! - **Sampler**: fresh OS readings every tick; unreadable metrics are absent, not zero
//! - **Store**: durable SQLite pruned by age, or an in-memory ring capped by row count
//! - **Retention**: periodic age-based pruning that never stops the sampler
//! - **Query service**: latest-point and bounded-window reads, safe alongside writes
//! - **Read API**: optional JSON endpoints for a polling dashboard
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vitals_keeper::{Pipeline, PipelineConfig, Sampler, SysinfoSource};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let source = SysinfoSource::new(&config.disk_mount_point, config.sensor.clone());
//!     let pipeline = Pipeline::start(&config, Sampler::new(source))?;
//!
//!     let query = pipeline.query_service();
//!     tokio::time::sleep(Duration::from_secs(3)).await;
//!     println!("{:?}", query.latest_snapshot().await?);
//!
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod query;
pub mod retention;
pub mod schedule;
pub mod store;
pub mod web;

// Re-export public API
pub use config::{PipelineConfig, RetentionPolicy, SensorSelector};
pub use error::{Result, SystemError};
pub use metrics::{Metric, MetricSample, Sampler, SysinfoSource, VitalsSource};
pub use pipeline::{run_sampler, Pipeline, PipelineReport, SamplerStats};
pub use query::{DashboardView, QueryService};
pub use retention::{RetentionManager, RetentionStats};
pub use schedule::{IntervalTicker, ManualTicker, TickTrigger, Ticker};
pub use store::{open_store, RingStore, SampleStore, SqliteStore, StorePolicy};
pub use web::{start_web_server, WebConfig};

/// The default sampling interval in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// The default row cap for a window query (one hour at 1s cadence)
pub const DEFAULT_ROW_CAP: usize = 3600;

/// The default read API port
pub const DEFAULT_WEB_PORT: u16 = 8050;
