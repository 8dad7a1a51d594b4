//! Scripted language model for tests and local development.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::Poll;
use std::time::Duration;

use conduit_core::{Error, ErrorKind, Result, ToolCallRequest};
use futures::{StreamExt, stream};

use crate::{CompletionRequest, LanguageModel, ModelChunk, ModelStream, TRACING_TARGET_MOCK};

/// One scripted model response.
#[derive(Debug, Clone)]
pub enum Script {
    /// Emits the chunks, then ends.
    Chunks(Vec<ModelChunk>),
    /// Fails before producing output.
    Fail { kind: ErrorKind, message: String },
    /// Emits the chunks, then fails.
    FailMidStream {
        chunks: Vec<ModelChunk>,
        kind: ErrorKind,
        message: String,
    },
    /// Emits the chunks, then panics while being polled.
    Panic(Vec<ModelChunk>),
    /// Emits the chunks, then never produces anything again.
    Pending(Vec<ModelChunk>),
    /// Emits the chunks, each after `delay`.
    Delayed {
        delay: Duration,
        chunks: Vec<ModelChunk>,
    },
}

impl Script {
    /// A plain answer in a single delta.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Chunks(vec![ModelChunk::TokenDelta(text.into()), ModelChunk::Final])
    }

    /// A plain answer split into several deltas.
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chunks: Vec<_> = tokens
            .into_iter()
            .map(|token| ModelChunk::TokenDelta(token.into()))
            .collect();
        chunks.push(ModelChunk::Final);
        Self::Chunks(chunks)
    }

    /// A response requesting the given tool calls.
    pub fn tool_calls(calls: impl IntoIterator<Item = ToolCallRequest>) -> Self {
        let mut chunks: Vec<_> = calls.into_iter().map(ModelChunk::ToolCall).collect();
        chunks.push(ModelChunk::Final);
        Self::Chunks(chunks)
    }

    /// A failure to start the response.
    pub fn fail(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Fail {
            kind,
            message: message.into(),
        }
    }

    /// Partial output followed by a model failure.
    pub fn fail_mid_stream(chunks: Vec<ModelChunk>, message: impl Into<String>) -> Self {
        Self::FailMidStream {
            chunks,
            kind: ErrorKind::ModelUnavailable,
            message: message.into(),
        }
    }
}

struct ScriptedModelInner {
    name: String,
    scripts: Mutex<VecDeque<Script>>,
    last: Mutex<Option<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

/// Model that replays queued [`Script`]s in order.
///
/// When the queue is exhausted the last script is repeated; a model without
/// any script answers with an empty response. Every request is recorded.
///
/// This type is cheap to clone; clones share the queue and the recordings.
#[derive(Clone)]
pub struct ScriptedModel {
    inner: Arc<ScriptedModelInner>,
}

impl std::fmt::Debug for ScriptedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedModel")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl ScriptedModel {
    /// Creates a model without scripts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ScriptedModelInner {
                name: name.into(),
                scripts: Mutex::new(VecDeque::new()),
                last: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Queues a script.
    pub fn with_script(self, script: Script) -> Self {
        self.push_script(script);
        self
    }

    /// Queues a script on a shared model.
    pub fn push_script(&self, script: Script) {
        self.inner
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script);
    }

    /// Returns every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_script(&self) -> Script {
        let next = self
            .inner
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        let mut last = self.inner.last.lock().unwrap_or_else(PoisonError::into_inner);
        match next {
            Some(script) => {
                *last = Some(script.clone());
                script
            }
            None => last
                .clone()
                .unwrap_or_else(|| Script::Chunks(vec![ModelChunk::Final])),
        }
    }
}

fn replay(chunks: Vec<ModelChunk>) -> impl futures::Stream<Item = Result<ModelChunk>> + Send + 'static {
    stream::iter(chunks.into_iter().map(Ok))
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ModelStream> {
        self.inner
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let script = self.next_script();
        tracing::trace!(target: TRACING_TARGET_MOCK, model = %self.inner.name, ?script, "Replaying script");

        let stream = match script {
            Script::Chunks(chunks) => replay(chunks).boxed(),
            Script::Fail { kind, message } => return Err(Error::new(kind).with_message(message)),
            Script::FailMidStream {
                chunks,
                kind,
                message,
            } => replay(chunks)
                .chain(stream::once(async move {
                    Err(Error::new(kind).with_message(message))
                }))
                .boxed(),
            Script::Panic(chunks) => replay(chunks)
                .chain(stream::poll_fn(
                    |_| -> Poll<Option<Result<ModelChunk>>> { panic!("scripted model panic") },
                ))
                .boxed(),
            Script::Pending(chunks) => replay(chunks).chain(stream::pending()).boxed(),
            Script::Delayed { delay, chunks } => replay(chunks)
                .then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    chunk
                })
                .boxed(),
        };

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn replays_scripts_and_repeats_last() {
        let model = ScriptedModel::new("scripted")
            .with_script(Script::tokens(["a", "b"]))
            .with_script(Script::text("again"));

        let first: Vec<_> = model.stream(CompletionRequest::default()).await.unwrap().try_collect().await.unwrap();
        assert_eq!(first.len(), 3);

        for _ in 0..2 {
            let next: Vec<_> = model.stream(CompletionRequest::default()).await.unwrap().try_collect().await.unwrap();
            assert_eq!(next[0], ModelChunk::TokenDelta("again".into()));
        }

        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn fails_mid_stream() {
        let model = ScriptedModel::new("scripted").with_script(Script::fail_mid_stream(
            vec![ModelChunk::TokenDelta("par".into())],
            "connection reset",
        ));

        let mut stream = model.stream(CompletionRequest::default()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), ModelChunk::TokenDelta("par".into()));
        let error = stream.next().await.unwrap().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ModelUnavailable);
    }

    #[tokio::test]
    async fn empty_model_answers_final() {
        let model = ScriptedModel::new("scripted");
        let chunks: Vec<_> = model.stream(CompletionRequest::default()).await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks, [ModelChunk::Final]);
    }
}
