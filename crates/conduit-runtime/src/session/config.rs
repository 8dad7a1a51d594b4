//! Session store configuration.

#[cfg(feature = "config")]
use clap::Args;
use conduit_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default number of sessions kept in memory.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Limits of the in-memory session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct SessionConfig {
    /// Sessions kept in memory before the least recently active idle one is dropped.
    #[cfg_attr(
        feature = "config",
        arg(long = "max-sessions", env = "MAX_SESSIONS", default_value_t = DEFAULT_MAX_SESSIONS)
    )]
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl SessionConfig {
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(Error::configuration().with_message("max sessions must be at least 1"));
        }

        Ok(())
    }
}
