//! Time-series storage for samples.
//!
//! Two backends share the [`SampleStore`] contract:
//!
//! - [`SqliteStore`]: durable, bounded by age through the retention manager.
//! - [`RingStore`]: in-memory, bounded by row count; the oldest rows are
//!   evicted on overflow and nothing survives a restart.
//!
//! Both allow one writer at a time and any number of readers, and readers
//! only ever see whole inserts and whole prunes.

pub mod ring;
pub mod sqlite;

pub use ring::RingStore;
pub use sqlite::SqliteStore;

use crate::config::{PipelineConfig, RetentionPolicy};
use crate::error::Result;
use crate::metrics::MetricSample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Which bounding policy a store applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorePolicy {
    /// Persisted to disk, pruned by age.
    DurableBounded,
    /// Held in memory, capped by row count.
    MemoryBounded,
}

/// Trait for sample storage backends.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Append a sample atomically.
    async fn insert(&self, sample: MetricSample) -> Result<()>;

    /// The sample with the greatest timestamp, `None` when empty.
    async fn latest(&self) -> Result<Option<MetricSample>>;

    /// Samples with `timestamp >= since`, ascending.
    ///
    /// When more than `limit` rows match, the newest `limit` are returned.
    async fn range(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<MetricSample>>;

    /// Delete every sample with `timestamp < cutoff`, returning how many went.
    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Number of stored samples.
    async fn count(&self) -> Result<u64>;

    /// Bounding policy of this backend.
    fn policy(&self) -> StorePolicy;
}

/// Open the store selected by the configured retention policy.
pub fn open_store(config: &PipelineConfig) -> Result<Arc<dyn SampleStore>> {
    config.validate()?;

    match config.retention {
        RetentionPolicy::Age { horizon_secs, .. } => {
            let store = SqliteStore::open(&config.database_path, config.storage_timeout())?;
            info!(
                "Opened durable store at {} (horizon {}s)",
                store.path().display(),
                horizon_secs
            );
            Ok(Arc::new(store))
        }
        RetentionPolicy::Capacity { max_rows } => {
            info!("Using in-memory store capped at {} rows", max_rows);
            Ok(Arc::new(RingStore::new(max_rows)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_policy_opens_ring_store() {
        let config = PipelineConfig::default()
            .with_retention(RetentionPolicy::Capacity { max_rows: 5 });
        let store = open_store(&config).unwrap();
        assert_eq!(store.policy(), StorePolicy::MemoryBounded);
    }

    #[test]
    fn test_age_policy_opens_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::default()
            .with_database_path(dir.path().join("vitals.db"))
            .with_storage_timeout_ms(250);
        let store = open_store(&config).unwrap();
        assert_eq!(store.policy(), StorePolicy::DurableBounded);
        assert!(dir.path().join("vitals.db").exists());
    }

    #[test]
    fn test_invalid_config_is_rejected_before_opening() {
        let config = PipelineConfig::default()
            .with_retention(RetentionPolicy::Capacity { max_rows: 0 });
        assert!(open_store(&config).is_err());
    }
}
