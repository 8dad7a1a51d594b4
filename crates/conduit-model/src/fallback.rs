//! Ordered chain of models tried until one answers.

use conduit_core::{Error, ErrorKind, Result};

use crate::{CompletionRequest, LanguageModel, ModelStream, SharedModel, TRACING_TARGET_FALLBACK};

/// Tries each model in order until one starts a response.
///
/// Only failures to *start* fall through to the next model; once a stream is
/// returned, errors inside it are reported as they are. Failures that are not
/// about reachability (for example a malformed request) are returned
/// immediately.
#[derive(Clone)]
pub struct FallbackModel {
    name: String,
    models: Vec<SharedModel>,
}

impl std::fmt::Debug for FallbackModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.models.iter().map(|model| model.name()).collect();
        f.debug_struct("FallbackModel")
            .field("models", &names)
            .finish()
    }
}

impl FallbackModel {
    /// Creates a chain starting with `primary`.
    pub fn new(primary: SharedModel) -> Self {
        Self {
            name: primary.name().to_owned(),
            models: vec![primary],
        }
    }

    /// Appends a model tried after the previous ones.
    pub fn with_fallback(mut self, model: SharedModel) -> Self {
        self.name = format!("{} -> {}", self.name, model.name());
        self.models.push(model);
        self
    }

    /// Returns the number of models in the chain.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns whether the chain is empty; never true for a constructed chain.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[async_trait::async_trait]
impl LanguageModel for FallbackModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ModelStream> {
        let mut last_error = None;

        for (position, model) in self.models.iter().enumerate() {
            match model.stream(request.clone()).await {
                Ok(stream) => {
                    if position > 0 {
                        tracing::info!(
                            target: TRACING_TARGET_FALLBACK,
                            model = model.name(),
                            position,
                            "Using fallback model"
                        );
                    }
                    return Ok(stream);
                }
                Err(error) if error.kind() == ErrorKind::ModelUnavailable => {
                    tracing::warn!(
                        target: TRACING_TARGET_FALLBACK,
                        model = model.name(),
                        error = %error,
                        "Model unavailable, trying next"
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::model_unavailable().with_message("no model configured")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use conduit_core::Message;
    use futures::TryStreamExt;

    use super::*;
    use crate::ModelChunk;
    use crate::mock::{Script, ScriptedModel};

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![Message::user("hello")], Vec::new())
    }

    #[tokio::test]
    async fn primary_answers_when_available() {
        let primary = ScriptedModel::new("primary").with_script(Script::text("from primary"));
        let secondary = ScriptedModel::new("secondary").with_script(Script::text("from secondary"));
        let chain = FallbackModel::new(Arc::new(primary.clone())).with_fallback(Arc::new(secondary.clone()));

        let chunks: Vec<_> = chain.stream(request()).await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks[0], ModelChunk::TokenDelta("from primary".into()));
        assert_eq!(secondary.requests().len(), 0);
        assert_eq!(chain.name(), "primary -> secondary");
    }

    #[tokio::test]
    async fn falls_through_unavailable_models() {
        let primary = ScriptedModel::new("primary")
            .with_script(Script::fail(ErrorKind::ModelUnavailable, "down"));
        let secondary = ScriptedModel::new("secondary").with_script(Script::text("from secondary"));
        let chain = FallbackModel::new(Arc::new(primary.clone())).with_fallback(Arc::new(secondary));

        let chunks: Vec<_> = chain.stream(request()).await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks[0], ModelChunk::TokenDelta("from secondary".into()));
        assert_eq!(primary.requests().len(), 1);
    }

    #[tokio::test]
    async fn reports_last_error_when_all_fail() {
        let primary = ScriptedModel::new("primary")
            .with_script(Script::fail(ErrorKind::ModelUnavailable, "first"));
        let secondary = ScriptedModel::new("secondary")
            .with_script(Script::fail(ErrorKind::ModelUnavailable, "second"));
        let chain = FallbackModel::new(Arc::new(primary)).with_fallback(Arc::new(secondary));

        let error = chain.stream(request()).await.err().unwrap();
        assert_eq!(error.kind(), ErrorKind::ModelUnavailable);
        assert_eq!(error.message_or_kind(), "second");
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let primary = ScriptedModel::new("primary")
            .with_script(Script::fail(ErrorKind::Configuration, "bad request"));
        let secondary = ScriptedModel::new("secondary").with_script(Script::text("unused"));
        let chain = FallbackModel::new(Arc::new(primary)).with_fallback(Arc::new(secondary.clone()));

        let error = chain.stream(request()).await.err().unwrap();
        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(secondary.requests().is_empty());
    }
}
