//! Instantaneous host readings backed by sysinfo.

use crate::config::SensorSelector;
use crate::error::{Result, SystemError};
use crate::metrics::data::clamp_percent;
use std::path::{Path, PathBuf};
use sysinfo::{Components, Disks, System};

/// A source of instantaneous host vitals.
///
/// `refresh` is called once per sample; the readers then report the values
/// observed by that refresh. Each reader fails independently so that one
/// unreadable metric never costs the whole sample.
pub trait VitalsSource: Send {
    /// Re-read the underlying OS counters.
    fn refresh(&mut self);

    /// CPU usage averaged over all cores since the previous refresh.
    fn cpu_percent(&self) -> Result<f64>;

    /// Used RAM as a percentage of total RAM.
    fn memory_percent(&self) -> Result<f64>;

    /// Used space on the monitored mount point.
    fn disk_percent(&self) -> Result<f64>;

    /// Temperature of the selected thermal sensor.
    fn temperature_celsius(&self) -> Result<f64>;
}

/// Vitals collector using sysinfo's CPU, memory, disk and component tables.
pub struct SysinfoSource {
    system: System,
    disks: Disks,
    components: Components,
    mount_point: PathBuf,
    sensor: SensorSelector,
}

impl SysinfoSource {
    /// Create a new source reporting disk usage for `mount_point`.
    pub fn new(mount_point: impl Into<PathBuf>, sensor: SensorSelector) -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            components: Components::new_with_refreshed_list(),
            mount_point: mount_point.into(),
            sensor,
        }
    }

    /// Labels of every thermal component sysinfo can see.
    pub fn sensor_labels(&self) -> Vec<String> {
        self.components
            .iter()
            .map(|component| component.label().to_string())
            .collect()
    }

    fn find_disk(&self, mount_point: &Path) -> Option<&sysinfo::Disk> {
        self.disks
            .iter()
            .find(|disk| disk.mount_point() == mount_point)
    }
}

impl VitalsSource for SysinfoSource {
    fn refresh(&mut self) {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.disks.refresh();
        self.components.refresh();
    }

    fn cpu_percent(&self) -> Result<f64> {
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(SystemError::sensor_unavailable("no CPU information available"));
        }

        let usage = cpus.iter().map(|cpu| cpu.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64;
        clamp_percent(usage)
            .ok_or_else(|| SystemError::sensor_unavailable("CPU usage is not a number"))
    }

    fn memory_percent(&self) -> Result<f64> {
        let total_bytes = self.system.total_memory();
        if total_bytes == 0 {
            return Err(SystemError::sensor_unavailable("total memory reported as zero"));
        }

        let used_bytes = self.system.used_memory();
        clamp_percent(used_bytes as f64 / total_bytes as f64 * 100.0)
            .ok_or_else(|| SystemError::sensor_unavailable("memory usage is not a number"))
    }

    fn disk_percent(&self) -> Result<f64> {
        let disk = self.find_disk(&self.mount_point).ok_or_else(|| {
            SystemError::sensor_unavailable(format!(
                "no disk mounted at {}",
                self.mount_point.display()
            ))
        })?;

        let total_bytes = disk.total_space();
        if total_bytes == 0 {
            return Err(SystemError::sensor_unavailable(format!(
                "disk at {} reports zero capacity",
                self.mount_point.display()
            )));
        }

        let used_bytes = total_bytes.saturating_sub(disk.available_space());
        clamp_percent(used_bytes as f64 / total_bytes as f64 * 100.0)
            .ok_or_else(|| SystemError::sensor_unavailable("disk usage is not a number"))
    }

    fn temperature_celsius(&self) -> Result<f64> {
        let labels: Vec<&str> = self.components.iter().map(|c| c.label()).collect();
        let selected = select_sensor(&self.sensor, &labels)?;

        let component = self
            .components
            .iter()
            .find(|component| component.label() == selected)
            .ok_or_else(|| SystemError::sensor_unavailable("selected sensor disappeared"))?;

        let celsius = component.temperature() as f64;
        if celsius.is_finite() {
            Ok(celsius)
        } else {
            Err(SystemError::sensor_unavailable(format!(
                "sensor '{}' returned no reading",
                component.label()
            )))
        }
    }
}

/// Pick the selected sensor out of the visible component labels.
///
/// Distinguishes a missing group from a missing label so the log says which.
pub fn select_sensor<'a>(selector: &SensorSelector, labels: &[&'a str]) -> Result<&'a str> {
    if !labels.iter().any(|label| selector.matches_group(label)) {
        return Err(SystemError::sensor_unavailable(format!(
            "sensor group '{}' not present",
            selector.group
        )));
    }

    labels
        .iter()
        .copied()
        .find(|label| selector.matches(label))
        .ok_or_else(|| {
            SystemError::sensor_unavailable(format!(
                "sensor '{}' not present in group '{}'",
                selector.label, selector.group
            ))
        })
}
