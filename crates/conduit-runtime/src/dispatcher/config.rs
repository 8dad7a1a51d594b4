//! Tool dispatcher configuration.

use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use conduit_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default per-call timeout budget: 30 seconds.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of concurrent tool calls per turn.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Timeout and concurrency limits for tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct DispatcherConfig {
    /// Seconds a single tool call may take.
    #[cfg_attr(
        feature = "config",
        arg(long = "tool-timeout", env = "TOOL_TIMEOUT", default_value_t = DEFAULT_TOOL_TIMEOUT_SECS)
    )]
    pub tool_timeout_secs: u64,

    /// Tool calls of one model response that may run at the same time.
    #[cfg_attr(
        feature = "config",
        arg(long = "max-in-flight-tools", env = "MAX_IN_FLIGHT_TOOLS", default_value_t = DEFAULT_MAX_IN_FLIGHT)
    )]
    pub max_in_flight: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl DispatcherConfig {
    /// Sets the per-call timeout.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sets the per-turn concurrency limit.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    #[inline]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Validates that both limits are positive.
    pub fn validate(&self) -> Result<()> {
        if self.tool_timeout_secs == 0 {
            return Err(Error::configuration().with_message("tool timeout must be at least 1 second"));
        }

        if self.max_in_flight == 0 {
            return Err(Error::configuration().with_message("max in-flight tools must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_limits() {
        assert!(DispatcherConfig::default().validate().is_ok());
        assert!(DispatcherConfig::default().with_max_in_flight(0).validate().is_err());

        let config = DispatcherConfig {
            tool_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
