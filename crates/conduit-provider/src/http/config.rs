//! Configuration for HTTP providers.

use std::time::Duration;

use conduit_core::{Error, ProviderId, ProviderKind, Result};
#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use url::Url;

/// Default timeout for provider requests: 30 seconds.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport settings shared by every HTTP provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct HttpTransportConfig {
    /// Upper bound in seconds for a single provider request.
    ///
    /// Tool calls are additionally bounded by the dispatcher's timeout budget.
    #[cfg_attr(
        feature = "config",
        arg(id = "provider_timeout", long = "provider-timeout", env = "PROVIDER_TIMEOUT", default_value_t = 30)
    )]
    pub timeout_secs: u64,

    /// User-Agent header sent to providers.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "provider-user-agent",
            env = "PROVIDER_USER_AGENT",
            default_value_t = default_user_agent()
        )
    )]
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpTransportConfig {
    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Returns the effective timeout, using the default if zero.
    pub fn timeout(&self) -> Duration {
        if self.timeout_secs == 0 {
            DEFAULT_TIMEOUT
        } else {
            Duration::from_secs(self.timeout_secs)
        }
    }

    /// Returns the effective user agent, using the default if empty.
    pub fn effective_user_agent(&self) -> String {
        if self.user_agent.is_empty() {
            default_user_agent()
        } else {
            self.user_agent.clone()
        }
    }
}

fn default_user_agent() -> String {
    format!("conduit/{}", env!("CARGO_PKG_VERSION"))
}

/// Identity and endpoint of one HTTP provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    pub id: ProviderId,
    pub kind: ProviderKind,
    /// JSON-RPC endpoint.
    pub endpoint: Url,
    #[serde(default)]
    pub transport: HttpTransportConfig,
}

impl HttpProviderConfig {
    /// Creates a configuration with default transport settings.
    pub fn new(id: impl Into<ProviderId>, kind: ProviderKind, endpoint: Url) -> Self {
        Self {
            id: id.into(),
            kind,
            endpoint,
            transport: HttpTransportConfig::default(),
        }
    }

    /// Sets the transport settings.
    pub fn with_transport(mut self, transport: HttpTransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().trim().is_empty() {
            return Err(Error::configuration().with_message("provider id must not be empty"));
        }

        if !matches!(self.endpoint.scheme(), "http" | "https") {
            return Err(Error::configuration().with_message(format!(
                "provider `{}` endpoint must use http or https, got `{}`",
                self.id,
                self.endpoint.scheme()
            )));
        }

        Ok(())
    }
}
