//! Provider response types.

use conduit_core::ProviderId;
use conduit_provider::ResourceContents;
use conduit_runtime::registry::RegistrationOutcome;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether a (re)registration made the provider's tools resolvable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    Registered,
    Pending,
}

/// Result of a provider refresh.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRegistration {
    pub provider_id: ProviderId,
    pub state: RegistrationState,
    /// Tools now declared by the provider.
    pub tools: Vec<String>,
    /// Why discovery failed, when pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<RegistrationOutcome> for ProviderRegistration {
    fn from(outcome: RegistrationOutcome) -> Self {
        match outcome {
            RegistrationOutcome::Registered { provider, tools } => Self {
                provider_id: provider,
                state: RegistrationState::Registered,
                tools,
                reason: None,
            },
            RegistrationOutcome::Pending { provider, reason } => Self {
                provider_id: provider,
                state: RegistrationState::Pending,
                tools: Vec::new(),
                reason: Some(reason),
            },
        }
    }
}

/// Contents of a provider resource.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

impl From<ResourceContents> for ResourceContent {
    fn from(contents: ResourceContents) -> Self {
        Self {
            uri: contents.uri,
            mime_type: contents.mime_type,
            text: contents.text,
        }
    }
}
