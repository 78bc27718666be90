//! Wires the sampler, store and retention manager into running tasks.

use crate::config::{PipelineConfig, RetentionPolicy};
use crate::error::Result;
use crate::metrics::{Sampler, VitalsSource};
use crate::query::QueryService;
use crate::retention::{RetentionManager, RetentionStats};
use crate::schedule::{IntervalTicker, Ticker};
use crate::store::{open_store, SampleStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Counters reported when the sampling loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Ticks handled
    pub ticks: u64,
    /// Samples committed to the store
    pub inserted: u64,
    /// Ticks where no timestamp could be taken
    pub sample_failures: u64,
    /// Samples the store refused
    pub insert_failures: u64,
    /// Ticks whose work finished after the next tick was due
    pub missed_deadlines: u64,
}

/// Final counters of a stopped pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub sampler: SamplerStats,
    pub retention: Option<RetentionStats>,
}

/// Sample on every tick and insert into `store` until the ticker ends or
/// shutdown is signalled.
///
/// Shutdown is only observed between ticks, so an insert in flight always
/// runs to completion. Store failures are logged and the loop moves on.
pub async fn run_sampler<V, T>(
    mut sampler: Sampler<V>,
    store: Arc<dyn SampleStore>,
    mut ticker: T,
    mut shutdown: watch::Receiver<bool>,
) -> SamplerStats
where
    V: VitalsSource,
    T: Ticker,
{
    let mut stats = SamplerStats::default();
    let period = ticker.period();
    info!("Sampler started with {:?} interval", period);

    loop {
        let scheduled = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            tick = ticker.tick() => match tick {
                Some(scheduled) => scheduled,
                None => break,
            },
        };
        stats.ticks += 1;

        match sampler.sample() {
            Ok(sample) => match store.insert(sample).await {
                Ok(()) => stats.inserted += 1,
                Err(err) => {
                    stats.insert_failures += 1;
                    error!("Dropping sample taken at {}: {}", sample.timestamp, err);
                }
            },
            Err(err) => {
                stats.sample_failures += 1;
                error!("Failed to take sample: {}", err);
            }
        }

        let elapsed = scheduled.elapsed();
        if elapsed > period {
            stats.missed_deadlines += 1;
            warn!(
                "Sampling tick overran its {:?} deadline by {:?}",
                period,
                elapsed - period
            );
        }
    }

    info!(?stats, "Sampler stopped");
    stats
}

/// A running sampling pipeline.
pub struct Pipeline {
    store: Arc<dyn SampleStore>,
    shutdown: watch::Sender<bool>,
    sampler_task: JoinHandle<SamplerStats>,
    retention_task: Option<JoinHandle<RetentionStats>>,
}

impl Pipeline {
    /// Validate `config`, open its store and start sampling on wall-clock
    /// tickers. The retention manager only runs under the age policy.
    pub fn start<V>(config: &PipelineConfig, sampler: Sampler<V>) -> Result<Self>
    where
        V: VitalsSource + 'static,
    {
        let store = open_store(config)?;
        let retention = match config.retention {
            RetentionPolicy::Age {
                horizon_secs,
                prune_interval_secs,
            } => {
                let manager =
                    RetentionManager::new(Arc::clone(&store), Duration::from_secs(horizon_secs))?;
                let ticker = IntervalTicker::new(Duration::from_secs(prune_interval_secs));
                Some((manager, ticker))
            }
            RetentionPolicy::Capacity { .. } => None,
        };

        Ok(Self::spawn(
            store,
            sampler,
            IntervalTicker::new(config.sample_interval()),
            retention,
        ))
    }

    /// Start the loops on explicit tickers.
    pub fn spawn<V, S, R>(
        store: Arc<dyn SampleStore>,
        sampler: Sampler<V>,
        sample_ticker: S,
        retention: Option<(RetentionManager, R)>,
    ) -> Self
    where
        V: VitalsSource + 'static,
        S: Ticker + 'static,
        R: Ticker + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let sampler_task = tokio::spawn(run_sampler(
            sampler,
            Arc::clone(&store),
            sample_ticker,
            shutdown_rx.clone(),
        ));

        let retention_task = retention.map(|(manager, ticker)| {
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move { manager.run(ticker, shutdown_rx).await })
        });

        Self {
            store,
            shutdown,
            sampler_task,
            retention_task,
        }
    }

    /// Shared handle to the pipeline's store.
    pub fn store(&self) -> Arc<dyn SampleStore> {
        Arc::clone(&self.store)
    }

    /// A query service reading the pipeline's store.
    pub fn query_service(&self) -> QueryService {
        QueryService::new(self.store())
    }

    /// Receiver that flips to `true` when shutdown begins.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Signal both loops to stop and wait for them.
    pub async fn shutdown(self) -> PipelineReport {
        debug!("Signalling pipeline shutdown");
        // Receivers are held by the loops; a send error means they already exited.
        let _ = self.shutdown.send(true);
        self.join().await
    }

    /// Wait for both loops to finish on their own (their tickers ended).
    pub async fn join(self) -> PipelineReport {
        let sampler = match self.sampler_task.await {
            Ok(stats) => stats,
            Err(err) => {
                error!("Sampler task failed: {}", err);
                SamplerStats::default()
            }
        };

        let retention = match self.retention_task {
            Some(task) => match task.await {
                Ok(stats) => Some(stats),
                Err(err) => {
                    error!("Retention task failed: {}", err);
                    None
                }
            },
            None => None,
        };

        PipelineReport { sampler, retention }
    }
}
