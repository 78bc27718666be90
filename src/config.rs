//! Pipeline configuration.

use crate::error::{Result, SystemError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Thirty days, the default retention horizon.
pub const DEFAULT_HORIZON_SECS: u64 = 30 * 24 * 3600;

/// How often the retention manager prunes under the age policy.
pub const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 3600;

/// One day of samples at a 1s cadence.
pub const DEFAULT_CAPACITY_ROWS: usize = 86_400;

/// How stored samples are bounded. Exactly one policy is active per store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Durable SQLite storage, pruned by age on a fixed interval.
    Age {
        horizon_secs: u64,
        prune_interval_secs: u64,
    },
    /// In-memory ring buffer; the oldest rows are evicted on overflow.
    Capacity { max_rows: usize },
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::Age {
            horizon_secs: DEFAULT_HORIZON_SECS,
            prune_interval_secs: DEFAULT_PRUNE_INTERVAL_SECS,
        }
    }
}

/// Which thermal sensor feeds the temperature field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSelector {
    /// Sensor group / chip name (e.g. "coretemp")
    pub group: String,
    /// Label within the group (e.g. "Package id 0"); empty selects the first sensor of the group
    pub label: String,
}

impl Default for SensorSelector {
    fn default() -> Self {
        Self {
            group: "coretemp".to_string(),
            label: "Package id 0".to_string(),
        }
    }
}

impl SensorSelector {
    /// Create a selector for a group and label.
    pub fn new(group: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            label: label.into(),
        }
    }

    /// Whether a component label belongs to the selected group.
    ///
    /// Component labels are reported as `"<group> <label>"`.
    pub fn matches_group(&self, component_label: &str) -> bool {
        match component_label.strip_prefix(self.group.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with(' '),
            None => false,
        }
    }

    /// Whether a component label is exactly the selected sensor.
    pub fn matches(&self, component_label: &str) -> bool {
        if !self.matches_group(component_label) {
            return false;
        }
        self.label.is_empty() || component_label[self.group.len()..].trim() == self.label
    }
}

/// Convert a horizon in seconds into a calendar delta, `None` if unrepresentable.
pub(crate) fn horizon_delta(horizon_secs: u64) -> Option<chrono::Duration> {
    i64::try_from(horizon_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
}

/// Configuration for the sampling, storage and retention pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sampling period in milliseconds
    pub sample_interval_ms: u64,
    /// SQLite database file used by the age policy
    pub database_path: PathBuf,
    /// Active retention policy
    pub retention: RetentionPolicy,
    /// Deadline for a single storage call in milliseconds
    pub storage_timeout_ms: u64,
    /// Thermal sensor to report
    pub sensor: SensorSelector,
    /// Mount point whose usage is reported as disk usage
    pub disk_mount_point: PathBuf,
    /// Default query window in seconds
    pub window_secs: u64,
    /// Default maximum rows returned by a window query
    pub window_row_cap: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: crate::DEFAULT_INTERVAL_MS,
            database_path: PathBuf::from("system_metrics.db"),
            retention: RetentionPolicy::default(),
            storage_timeout_ms: 5_000,
            sensor: SensorSelector::default(),
            disk_mount_point: PathBuf::from("/"),
            window_secs: 3600,
            window_row_cap: crate::DEFAULT_ROW_CAP,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SystemError::config_invalid(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            SystemError::config_invalid(format!("malformed {}: {}", path.display(), e))
        })
    }

    /// Set the sampling interval.
    pub fn with_sample_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sample_interval_ms = interval_ms;
        self
    }

    /// Set the database path.
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the retention policy.
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Set the storage call deadline.
    pub fn with_storage_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.storage_timeout_ms = timeout_ms;
        self
    }

    /// Set the thermal sensor selector.
    pub fn with_sensor(mut self, sensor: SensorSelector) -> Self {
        self.sensor = sensor;
        self
    }

    /// Set the monitored mount point.
    pub fn with_disk_mount_point(mut self, mount_point: impl Into<PathBuf>) -> Self {
        self.disk_mount_point = mount_point.into();
        self
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            return Err(SystemError::config_invalid("sample interval must be non-zero"));
        }
        if self.storage_timeout_ms == 0 {
            return Err(SystemError::config_invalid("storage timeout must be non-zero"));
        }
        if self.window_secs == 0 {
            return Err(SystemError::config_invalid("query window must be non-zero"));
        }
        if self.window_row_cap == 0 {
            return Err(SystemError::config_invalid("query row cap must be non-zero"));
        }
        match self.retention {
            RetentionPolicy::Age {
                horizon_secs,
                prune_interval_secs,
            } => {
                if horizon_secs == 0 {
                    return Err(SystemError::config_invalid("retention horizon must be non-zero"));
                }
                if horizon_delta(horizon_secs).is_none() {
                    return Err(SystemError::config_invalid(format!(
                        "retention horizon of {}s is out of range",
                        horizon_secs
                    )));
                }
                if prune_interval_secs == 0 {
                    return Err(SystemError::config_invalid("prune interval must be non-zero"));
                }
                if self.database_path.as_os_str().is_empty() {
                    return Err(SystemError::config_invalid("database path must not be empty"));
                }
            }
            RetentionPolicy::Capacity { max_rows } => {
                if max_rows == 0 {
                    return Err(SystemError::config_invalid("store capacity must be non-zero"));
                }
            }
        }
        Ok(())
    }
}
