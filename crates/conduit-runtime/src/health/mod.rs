//! Provider health tracking.

mod config;
mod monitor;

pub use config::{
    DEFAULT_DEGRADED_AFTER, DEFAULT_PROBE_INTERVAL_SECS, DEFAULT_PROBE_TIMEOUT_SECS,
    DEFAULT_UNREACHABLE_AFTER, HealthConfig,
};
pub use monitor::{HealthMonitor, HealthRecord, status_after_failure};
