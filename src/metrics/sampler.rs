//! Turns a [`VitalsSource`] into a sequence of timestamped samples.

use crate::error::{Result, SystemError};
use crate::metrics::data::{Metric, MetricSample};
use crate::metrics::source::VitalsSource;
use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Produces the wall-clock time for a new sample.
pub type Clock = Box<dyn FnMut() -> Result<DateTime<Utc>> + Send>;

/// Read the system clock as UTC.
pub fn system_clock() -> Result<DateTime<Utc>> {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| SystemError::clock_error(format!("system clock before Unix epoch: {}", e)))?;
    let millis = i64::try_from(since_epoch.as_millis())
        .map_err(|_| SystemError::clock_error("system clock out of range"))?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| SystemError::clock_error("system clock out of range"))
}

/// Samples host vitals, one [`MetricSample`] per call.
pub struct Sampler<V: VitalsSource> {
    source: V,
    clock: Clock,
    last_timestamp: Option<DateTime<Utc>>,
    unavailable: [bool; 4],
}

impl<V: VitalsSource> Sampler<V> {
    /// Create a sampler reading the system clock.
    pub fn new(source: V) -> Self {
        Self {
            source,
            clock: Box::new(system_clock),
            last_timestamp: None,
            unavailable: [false; 4],
        }
    }

    /// Replace the clock used to stamp samples.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: FnMut() -> Result<DateTime<Utc>> + Send + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    /// Take one sample.
    ///
    /// Fails only when no timestamp can be obtained. Timestamps never go
    /// backwards across calls: a clock that steps back is clamped to the
    /// previous sample's time.
    pub fn sample(&mut self) -> Result<MetricSample> {
        let now = (self.clock)()?;
        let timestamp = match self.last_timestamp {
            Some(last) if now < last => {
                warn!(
                    "System clock moved backwards by {}ms, holding sample timestamp",
                    (last - now).num_milliseconds()
                );
                last
            }
            _ => now,
        };

        self.source.refresh();

        let mut sample = MetricSample::new(timestamp);
        for metric in Metric::ALL {
            let reading = match metric {
                Metric::Cpu => self.source.cpu_percent(),
                Metric::Memory => self.source.memory_percent(),
                Metric::Disk => self.source.disk_percent(),
                Metric::Temperature => self.source.temperature_celsius(),
            };
            let value = self.observe(metric, reading);
            sample.set(metric, value);
        }

        self.last_timestamp = Some(sample.timestamp);
        debug!(?sample, "Collected sample");
        Ok(sample)
    }

    /// Borrow the underlying source.
    pub fn source(&self) -> &V {
        &self.source
    }

    /// Metrics that were absent on the most recent sample.
    pub fn absent_metrics(&self) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|metric| self.unavailable[metric.index()])
            .collect()
    }

    fn observe(&mut self, metric: Metric, reading: Result<f64>) -> Option<f64> {
        let was_unavailable = self.unavailable[metric.index()];
        match reading {
            Ok(value) => {
                if was_unavailable {
                    info!("{} readable again", metric);
                }
                self.unavailable[metric.index()] = false;
                Some(value)
            }
            Err(err) => {
                if was_unavailable {
                    debug!("{} still absent: {}", metric, err);
                } else {
                    warn!("{} absent: {}", metric, err);
                }
                self.unavailable[metric.index()] = true;
                None
            }
        }
    }
}
