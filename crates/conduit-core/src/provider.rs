//! Provider identity, status and resource descriptors.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

/// Identifier of a registered capability provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(derive_more::Display, derive_more::AsRef, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    /// Creates a provider id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The closed set of provider capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Structured storage (messages, sessions, documents).
    Storage,
    /// Vector similarity search over ingested documents.
    VectorSearch,
    /// Image generation and analysis.
    ImageSynthesis,
    /// Web and news search.
    WebSearch,
}

/// Liveness of a provider as tracked by the health monitor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// No probe or call has succeeded yet.
    #[default]
    Unknown,
    Healthy,
    /// Failing, but below the hard-failure threshold.
    Degraded,
    /// Excluded from the catalog until it recovers.
    Unreachable,
}

impl ProviderStatus {
    /// Returns whether tools of a provider in this state are offered to the model.
    pub fn is_available(self) -> bool {
        !matches!(self, Self::Unreachable)
    }
}

/// An addressable data source a provider exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Point-in-time view of a registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ProviderHandle {
    pub id: ProviderId,
    pub kind: ProviderKind,
    /// Endpoint or transport reference.
    pub endpoint: String,
    pub status: ProviderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe_time: Option<Timestamp>,
    pub consecutive_failures: u32,
    /// Names of the tools this provider owns, in declaration order.
    pub tool_names: Vec<String>,
}
