//! Memory-bounded ring buffer store.

use crate::error::Result;
use crate::metrics::MetricSample;
use crate::store::{SampleStore, StorePolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory store holding at most `capacity` samples.
///
/// Samples are kept sorted by timestamp, ties in insertion order. When an
/// insert overflows the buffer the oldest sample is evicted, so after N
/// inserts the store holds the `min(N, capacity)` most recent samples.
#[derive(Debug)]
pub struct RingStore {
    samples: RwLock<VecDeque<MetricSample>>,
    capacity: usize,
    evicted: AtomicU64,
}

impl RingStore {
    /// Create a new store with the given capacity (at least one row).
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
            evicted: AtomicU64::new(0),
        }
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total samples dropped on overflow since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SampleStore for RingStore {
    async fn insert(&self, sample: MetricSample) -> Result<()> {
        let sample = sample.normalized();
        let mut buf = self.samples.write().await;
        // Appends in the steady state; late samples slot in behind equal stamps.
        let pos = buf.partition_point(|s| s.timestamp <= sample.timestamp);
        buf.insert(pos, sample);

        while buf.len() > self.capacity {
            buf.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    async fn latest(&self) -> Result<Option<MetricSample>> {
        Ok(self.samples.read().await.back().copied())
    }

    async fn range(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<MetricSample>> {
        let buf = self.samples.read().await;
        let start = buf.partition_point(|s| s.timestamp < since);
        let skip = (buf.len() - start).saturating_sub(limit);
        Ok(buf.range(start + skip..).copied().collect())
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut buf = self.samples.write().await;
        let end = buf.partition_point(|s| s.timestamp < cutoff);
        buf.drain(..end);
        Ok(end as u64)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.samples.read().await.len() as u64)
    }

    fn policy(&self) -> StorePolicy {
        StorePolicy::MemoryBounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_capacity_keeps_most_recent() {
        let store = RingStore::new(3);
        for secs in 0..10 {
            store.insert(MetricSample::new(at(secs))).await.unwrap();
        }

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.evicted(), 7);
        let stamps: Vec<_> = store
            .range(at(0), 100)
            .await
            .unwrap()
            .iter()
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(stamps, vec![at(7), at(8), at(9)]);
    }

    #[tokio::test]
    async fn test_out_of_order_insert_is_sorted() {
        let store = RingStore::new(10);
        for secs in [3, 1, 2] {
            store.insert(MetricSample::new(at(secs))).await.unwrap();
        }

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.timestamp, at(3));
        let stamps: Vec<_> = store
            .range(at(0), 10)
            .await
            .unwrap()
            .iter()
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(stamps, vec![at(1), at(2), at(3)]);
    }

    #[tokio::test]
    async fn test_equal_timestamps_keep_insert_order() {
        let store = RingStore::new(10);
        store.insert(MetricSample::new(at(1)).with_cpu(1.0)).await.unwrap();
        store.insert(MetricSample::new(at(1)).with_cpu(2.0)).await.unwrap();

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.cpu_percent, Some(2.0));
    }

    #[tokio::test]
    async fn test_range_truncates_to_newest() {
        let store = RingStore::new(100);
        for secs in 0..20 {
            store.insert(MetricSample::new(at(secs))).await.unwrap();
        }

        let window = store.range(at(5), 4).await.unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window[0].timestamp, at(16));
        assert_eq!(window[3].timestamp, at(19));
        assert!(store.range(at(50), 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prune_is_idempotent() {
        let store = RingStore::new(10);
        for secs in 0..5 {
            store.insert(MetricSample::new(at(secs))).await.unwrap();
        }

        assert_eq!(store.prune(at(3)).await.unwrap(), 3);
        assert_eq!(store.prune(at(3)).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(RingStore::new(0).capacity(), 1);
    }
}
