//! Read-side access to stored samples.

use crate::error::Result;
use crate::metrics::{system_clock, MetricSample};
use crate::store::{SampleStore, StorePolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Everything a dashboard refresh needs: the newest point and a recent window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardView {
    pub latest: Option<MetricSample>,
    pub window: Vec<MetricSample>,
}

/// Serves latest-point and recent-window reads.
///
/// Reads are independent of the sampler and the retention manager; the only
/// thing they share is the store handle.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn SampleStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }

    /// Bounding policy of the underlying store.
    pub fn policy(&self) -> StorePolicy {
        self.store.policy()
    }

    /// The most recent sample, `None` if nothing has been stored.
    pub async fn latest_snapshot(&self) -> Result<Option<MetricSample>> {
        self.store.latest().await
    }

    /// Up to `row_cap` samples from the last `window`, oldest first.
    pub async fn recent_window(&self, window: Duration, row_cap: usize) -> Result<Vec<MetricSample>> {
        let now = system_clock()?;
        self.recent_window_at(now, window, row_cap).await
    }

    /// Like [`recent_window`](Self::recent_window), measured back from `now`.
    pub async fn recent_window_at(
        &self,
        now: DateTime<Utc>,
        window: Duration,
        row_cap: usize,
    ) -> Result<Vec<MetricSample>> {
        self.store.range(window_start(now, window), row_cap).await
    }

    /// Latest sample and recent window, read concurrently.
    pub async fn dashboard(&self, window: Duration, row_cap: usize) -> Result<DashboardView> {
        let (latest, samples) = tokio::try_join!(
            self.latest_snapshot(),
            self.recent_window(window, row_cap)
        )?;
        Ok(DashboardView {
            latest,
            window: samples,
        })
    }
}

/// Start of a window of length `window` ending at `now`.
fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
