//! Monitor response types.

use conduit_core::{ProviderId, ProviderKind, ProviderStatus};
use jiff::Timestamp;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Overall service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

/// Health of one provider.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub id: ProviderId,
    pub kind: ProviderKind,
    pub status: ProviderStatus,
    pub consecutive_failures: u32,
}

/// System monitoring status response.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    /// Timestamp when this status was generated.
    pub checked_at: Timestamp,
    pub status: ServiceStatus,
    /// Application version.
    pub version: String,
    /// Name of the language model in use.
    pub model: String,
    pub providers: Vec<ProviderHealth>,
}
