//! Age-based pruning of the sample store.

use crate::config::horizon_delta;
use crate::error::{Result, SystemError};
use crate::metrics::system_clock;
use crate::schedule::Ticker;
use crate::store::SampleStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Counters reported when a retention loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionStats {
    /// Prune passes attempted
    pub passes: u64,
    /// Rows deleted across all passes
    pub rows_deleted: u64,
    /// Passes that failed and were retried on the next tick
    pub failures: u64,
}

/// Deletes samples older than the horizon on every tick.
pub struct RetentionManager {
    store: Arc<dyn SampleStore>,
    horizon: chrono::Duration,
}

impl RetentionManager {
    /// Create a manager pruning `store` to `horizon`.
    pub fn new(store: Arc<dyn SampleStore>, horizon: Duration) -> Result<Self> {
        let horizon = horizon_delta(horizon.as_secs())
            .filter(|delta| *delta > chrono::Duration::zero())
            .ok_or_else(|| {
                SystemError::config_invalid(format!("unusable retention horizon {:?}", horizon))
            })?;
        Ok(Self { store, horizon })
    }

    /// Oldest timestamp kept when pruning at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.horizon)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Run one prune pass as of `now`.
    pub async fn prune_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = self.cutoff(now);
        let deleted = self.store.prune(cutoff).await?;
        if deleted > 0 {
            info!("Pruned {} samples older than {}", deleted, cutoff);
        } else {
            debug!("No samples older than {}", cutoff);
        }
        Ok(deleted)
    }

    /// Prune on every tick until the ticker ends or shutdown is signalled.
    ///
    /// A failed pass is logged and retried on the next tick.
    pub async fn run<T: Ticker>(
        &self,
        mut ticker: T,
        mut shutdown: watch::Receiver<bool>,
    ) -> RetentionStats {
        let mut stats = RetentionStats::default();
        info!(
            "Retention manager started (horizon {}h, every {:?})",
            self.horizon.num_hours(),
            ticker.period()
        );

        loop {
            let tick = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                tick = ticker.tick() => tick,
            };
            if tick.is_none() {
                break;
            }

            stats.passes += 1;
            let outcome = match system_clock() {
                Ok(now) => self.prune_at(now).await,
                Err(err) => Err(err),
            };
            match outcome {
                Ok(deleted) => stats.rows_deleted += deleted,
                Err(err) => {
                    stats.failures += 1;
                    error!("Prune failed, retrying next tick: {}", err);
                }
            }
        }

        info!(?stats, "Retention manager stopped");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricSample;
    use crate::schedule::ManualTicker;
    use crate::store::{RingStore, StorePolicy};
    use async_trait::async_trait;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    #[tokio::test]
    async fn test_prune_keeps_samples_within_horizon() {
        let store = Arc::new(RingStore::new(10));
        let now = Utc::now();
        store
            .insert(MetricSample::new(now - chrono::Duration::days(31)))
            .await
            .unwrap();
        store.insert(MetricSample::new(now)).await.unwrap();

        let manager = RetentionManager::new(store.clone(), 30 * DAY).unwrap();
        assert_eq!(manager.prune_at(now).await.unwrap(), 1);

        let remaining = store.range(DateTime::<Utc>::MIN_UTC, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, MetricSample::new(now).timestamp);
    }

    #[test]
    fn test_zero_horizon_is_rejected() {
        let store = Arc::new(RingStore::new(1));
        assert!(RetentionManager::new(store, Duration::ZERO).is_err());
    }

    struct UnavailableStore;

    #[async_trait]
    impl SampleStore for UnavailableStore {
        async fn insert(&self, _: MetricSample) -> Result<()> {
            Err(SystemError::store_unavailable("disk full"))
        }
        async fn latest(&self) -> Result<Option<MetricSample>> {
            Err(SystemError::store_unavailable("connection lost"))
        }
        async fn range(&self, _: DateTime<Utc>, _: usize) -> Result<Vec<MetricSample>> {
            Err(SystemError::store_unavailable("connection lost"))
        }
        async fn prune(&self, _: DateTime<Utc>) -> Result<u64> {
            Err(SystemError::store_unavailable("connection lost"))
        }
        async fn count(&self) -> Result<u64> {
            Err(SystemError::store_unavailable("connection lost"))
        }
        fn policy(&self) -> StorePolicy {
            StorePolicy::DurableBounded
        }
    }

    #[tokio::test]
    async fn test_prune_failures_do_not_stop_the_loop() {
        let manager = RetentionManager::new(Arc::new(UnavailableStore), DAY).unwrap();
        let (ticker, trigger) = ManualTicker::new(Duration::from_secs(1));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        trigger.fire_n(3);
        drop(trigger);
        let stats = manager.run(ticker, shutdown_rx).await;
        assert_eq!(stats.passes, 3);
        assert_eq!(stats.failures, 3);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let manager = RetentionManager::new(Arc::new(RingStore::new(4)), DAY).unwrap();
        let (ticker, _trigger) = ManualTicker::new(Duration::from_secs(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { manager.run(ticker, shutdown_rx).await });
        shutdown_tx.send(true).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.passes, 0);
    }
}
