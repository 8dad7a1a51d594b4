//! Tool and provider request types.

use conduit_core::Arguments;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Query parameters of the catalog listing.
#[must_use]
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsQuery {
    /// Include tools of unreachable providers.
    #[serde(default)]
    pub all: bool,
}

/// Arguments of a direct tool call.
#[must_use]
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvokeTool {
    #[serde(default)]
    pub arguments: Arguments,
}

/// Query parameters of a resource read.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceQuery {
    pub uri: String,
}
