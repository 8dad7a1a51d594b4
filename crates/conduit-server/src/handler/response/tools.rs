//! Tool catalog response types.

use conduit_core::ToolDescriptor;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tools in registration order.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolCatalog {
    /// Whether tools of unreachable providers are listed.
    pub include_unreachable: bool,
    pub tools: Vec<ToolDescriptor>,
}
