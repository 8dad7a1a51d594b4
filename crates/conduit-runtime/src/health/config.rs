//! Health monitor configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use conduit_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default interval between probe rounds: 30 seconds.
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

/// Default timeout of a single probe: 5 seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Default consecutive failures before a healthy provider is degraded.
pub const DEFAULT_DEGRADED_AFTER: u32 = 1;

/// Default consecutive failures before a provider is unreachable.
pub const DEFAULT_UNREACHABLE_AFTER: u32 = 3;

/// Probe cadence and failure thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct HealthConfig {
    /// Seconds between probe rounds.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "health-probe-interval",
            env = "HEALTH_PROBE_INTERVAL",
            default_value_t = DEFAULT_PROBE_INTERVAL_SECS
        )
    )]
    pub probe_interval_secs: u64,

    /// Seconds before a probe (or a discovery request) is abandoned.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "health-probe-timeout",
            env = "HEALTH_PROBE_TIMEOUT",
            default_value_t = DEFAULT_PROBE_TIMEOUT_SECS
        )
    )]
    pub probe_timeout_secs: u64,

    /// Consecutive failures that degrade a healthy provider.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "health-degraded-after",
            env = "HEALTH_DEGRADED_AFTER",
            default_value_t = DEFAULT_DEGRADED_AFTER
        )
    )]
    pub degraded_after: u32,

    /// Consecutive failures that make a provider unreachable.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "health-unreachable-after",
            env = "HEALTH_UNREACHABLE_AFTER",
            default_value_t = DEFAULT_UNREACHABLE_AFTER
        )
    )]
    pub unreachable_after: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            degraded_after: DEFAULT_DEGRADED_AFTER,
            unreachable_after: DEFAULT_UNREACHABLE_AFTER,
        }
    }
}

impl HealthConfig {
    /// Sets both failure thresholds.
    pub fn with_thresholds(mut self, degraded_after: u32, unreachable_after: u32) -> Self {
        self.degraded_after = degraded_after;
        self.unreachable_after = unreachable_after;
        self
    }

    /// Returns the interval between probe rounds.
    #[inline]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Returns the probe timeout.
    #[inline]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Validates intervals and thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.probe_interval_secs == 0 || self.probe_timeout_secs == 0 {
            return Err(Error::configuration()
                .with_message("health probe interval and timeout must be at least 1 second"));
        }

        if self.degraded_after == 0 {
            return Err(Error::configuration().with_message("degraded threshold must be at least 1"));
        }

        if self.degraded_after >= self.unreachable_after {
            return Err(Error::configuration().with_message(format!(
                "degraded threshold ({}) must be below the unreachable threshold ({})",
                self.degraded_after, self.unreachable_after
            )));
        }

        Ok(())
    }
}
