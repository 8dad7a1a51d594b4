//! The language model interface.

use std::sync::Arc;

use conduit_core::{Message, Result, ToolCallRequest, ToolDescriptor};
use futures::stream::BoxStream;

/// One increment of model output.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    /// Incremental answer text.
    TokenDelta(String),
    /// A complete, structured tool-call request.
    ToolCall(ToolCallRequest),
    /// End of this model response.
    Final,
}

/// Stream of model output for one request.
pub type ModelStream = BoxStream<'static, Result<ModelChunk>>;

/// Input of one model round trip.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Tools the model may request; empty disables tool calling.
    pub tools: Vec<ToolDescriptor>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Creates a request from history and catalog.
    pub fn new(messages: Vec<Message>, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            messages,
            tools,
            ..Default::default()
        }
    }
}

/// A conversational language model with streaming output.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns a display name for logs and status endpoints.
    fn name(&self) -> &str;

    /// Starts a completion and returns its output stream.
    ///
    /// Errors returned here mean the model could not be reached before any
    /// output was produced; errors inside the stream abort a response that
    /// already started.
    async fn stream(&self, request: CompletionRequest) -> Result<ModelStream>;
}

/// Shared, type-erased model.
pub type SharedModel = Arc<dyn LanguageModel>;
