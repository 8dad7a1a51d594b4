//! Session response types.

use conduit_core::{Message, ToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Conversation history of a session.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistory {
    pub session_id: String,
    /// Whether a turn is currently running.
    pub busy: bool,
    /// Completed exchanges, oldest first.
    pub messages: Vec<Message>,
}

/// Outcome of a cancel request.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionCancelled {
    pub session_id: String,
    /// `false` when no turn was running.
    pub cancelled: bool,
}

/// A document handed to the vector store.
#[must_use]
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentIngested {
    pub document_id: String,
    pub chunks: usize,
    /// Result of the ingestion tool call.
    pub result: ToolResult,
}
