//! Session request types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A user message starting a new turn.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub content: String,
}
