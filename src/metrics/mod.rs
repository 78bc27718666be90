//! Host vitals sampling.
//!
//! This module reads CPU, memory, disk and temperature from the OS and turns
//! them into timestamped [`MetricSample`]s. Individual readings that fail are
//! recorded as absent rather than aborting the sample.

pub mod data;
pub mod sampler;
pub mod source;

// Re-export commonly used items
pub use data::{Metric, MetricSample};
pub use sampler::{system_clock, Clock, Sampler};
pub use source::{SysinfoSource, VitalsSource};
