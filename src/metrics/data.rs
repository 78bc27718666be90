//! Data structures for host vitals.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One timestamped observation of host vitals.
///
/// Every metric is optional: a field that could not be read on this tick is
/// stored and served as absent (`null` in JSON), never as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// When the sample was taken, UTC with millisecond precision
    pub timestamp: DateTime<Utc>,
    /// Average CPU usage across all cores (0.0 to 100.0)
    pub cpu_percent: Option<f64>,
    /// Used RAM as a share of total RAM (0.0 to 100.0)
    pub memory_percent: Option<f64>,
    /// Used space on the monitored mount point (0.0 to 100.0)
    pub disk_percent: Option<f64>,
    /// Selected thermal sensor in degrees Celsius
    pub temperature_celsius: Option<f64>,
}

impl MetricSample {
    /// Create a sample with every metric absent.
    ///
    /// The timestamp is truncated to milliseconds, the resolution the durable
    /// store keeps.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(3),
            cpu_percent: None,
            memory_percent: None,
            disk_percent: None,
            temperature_celsius: None,
        }
    }

    /// The same sample with its timestamp truncated to milliseconds.
    ///
    /// Samples built as struct literals or deserialized from JSON may carry
    /// finer timestamps; stores normalize on insert.
    pub fn normalized(self) -> Self {
        Self {
            timestamp: self.timestamp.trunc_subsecs(3),
            ..self
        }
    }

    /// Rebuild a sample from its epoch-millisecond timestamp.
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(Self::new)
    }

    /// Set the CPU usage percentage.
    pub fn with_cpu(mut self, percent: f64) -> Self {
        self.cpu_percent = Some(percent);
        self
    }

    /// Set the memory usage percentage.
    pub fn with_memory(mut self, percent: f64) -> Self {
        self.memory_percent = Some(percent);
        self
    }

    /// Set the disk usage percentage.
    pub fn with_disk(mut self, percent: f64) -> Self {
        self.disk_percent = Some(percent);
        self
    }

    /// Set the temperature reading.
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature_celsius = Some(celsius);
        self
    }

    /// Timestamp as milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Read a single metric by kind.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Cpu => self.cpu_percent,
            Metric::Memory => self.memory_percent,
            Metric::Disk => self.disk_percent,
            Metric::Temperature => self.temperature_celsius,
        }
    }

    /// Store a single metric by kind.
    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::Cpu => self.cpu_percent = value,
            Metric::Memory => self.memory_percent = value,
            Metric::Disk => self.disk_percent = value,
            Metric::Temperature => self.temperature_celsius = value,
        }
    }
}

/// The four vitals carried by a [`MetricSample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
    Temperature,
}

impl Metric {
    /// All metrics, in column order.
    pub const ALL: [Metric; 4] = [Metric::Cpu, Metric::Memory, Metric::Disk, Metric::Temperature];

    /// Column name used by the durable store.
    pub fn column(self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Disk => "disk",
            Metric::Temperature => "temperature",
        }
    }

    /// Display unit.
    pub fn unit(self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            _ => "%",
        }
    }

    /// Whether readings are a percentage bounded to `[0, 100]`.
    pub fn is_percentage(self) -> bool {
        !matches!(self, Metric::Temperature)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Metric::Cpu => 0,
            Metric::Memory => 1,
            Metric::Disk => 2,
            Metric::Temperature => 3,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Cpu => "CPU Usage",
            Metric::Memory => "Memory Usage",
            Metric::Disk => "Disk Usage",
            Metric::Temperature => "Temperature",
        };
        f.write_str(name)
    }
}

/// Clamp a percentage reading to `[0, 100]`, rejecting NaN and infinities.
pub fn clamp_percent(value: f64) -> Option<f64> {
    value.is_finite().then(|| value.clamp(0.0, 100.0))
}
