//! The capability provider interface.

use std::sync::Arc;

use conduit_core::{Arguments, Error, ProviderId, ProviderKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProviderManifest;

/// Answer of a provider to a tool call that reached it.
///
/// Transport problems are reported as `Err` by [`CapabilityProvider::invoke`];
/// a `Failure` means the provider handled the call and refused or failed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolReply {
    Success { payload: Value },
    Failure { message: String },
}

impl ToolReply {
    /// Creates a successful reply.
    pub fn success(payload: impl Into<Value>) -> Self {
        Self::Success {
            payload: payload.into(),
        }
    }

    /// Creates a failed reply.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }
}

/// Contents of a provider resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

/// A capability provider as seen by the registry, health monitor and dispatcher.
///
/// Implementations must be cheap to share: the runtime holds them as
/// `Arc<dyn CapabilityProvider>` and calls them concurrently.
#[async_trait::async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Returns the provider identifier.
    fn id(&self) -> &ProviderId;

    /// Returns the provider capability kind.
    fn kind(&self) -> ProviderKind;

    /// Returns the endpoint or transport reference, for display.
    fn endpoint(&self) -> &str;

    /// Queries the declared tools and resources.
    async fn list_tools(&self) -> Result<ProviderManifest>;

    /// Executes a tool.
    async fn invoke(&self, tool_name: &str, arguments: &Arguments) -> Result<ToolReply>;

    /// Checks liveness without side effects.
    async fn probe(&self) -> Result<()>;

    /// Reads one of the declared resources.
    async fn read_resource(&self, uri: &str) -> Result<ResourceContents> {
        Err(Error::provider_error().with_message(format!(
            "provider `{}` cannot read resource `{uri}`",
            self.id()
        )))
    }
}

/// Shared, type-erased provider.
pub type SharedProvider = Arc<dyn CapabilityProvider>;
