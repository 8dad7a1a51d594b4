//! Streaming chat completions client using reqwest.

use std::collections::BTreeMap;
use std::sync::Arc;

use conduit_core::Error as CoreError;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderValue};
use url::Url;

use super::config::ModelConfig;
use super::error::{Error, Result};
use super::sse::SseDecoder;
use super::wire::{ChatChunk, ChatMessage, ChatRequest, ChatTool, PartialToolCall};
use crate::{CompletionRequest, LanguageModel, ModelChunk, ModelStream, TRACING_TARGET_OPENAI};

const DONE_MARKER: &str = "[DONE]";

/// Longest error body quoted in an error message.
const MAX_ERROR_BODY: usize = 512;

struct OpenAiModelInner {
    http: Client,
    config: ModelConfig,
    url: Url,
}

/// A language model served over the OpenAI chat completions API.
///
/// Works with any compatible server (vLLM, llama.cpp, hosted OpenAI). The
/// response is consumed as server-sent events and translated into
/// [`ModelChunk`]s as it arrives.
///
/// This type is cheap to clone and can be shared across threads.
#[derive(Clone)]
pub struct OpenAiModel {
    inner: Arc<OpenAiModelInner>,
}

impl std::fmt::Debug for OpenAiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiModel")
            .field("url", &self.inner.url.as_str())
            .field("model", &self.inner.config.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiModel {
    /// Creates a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: ModelConfig) -> conduit_core::Result<Self> {
        config.validate()?;
        let url = config.completions_url()?;

        tracing::debug!(
            target: TRACING_TARGET_OPENAI,
            url = %url,
            model = %config.model,
            timeout_ms = config.timeout().as_millis(),
            "Creating model client"
        );

        // Bounds each wait rather than the whole streamed response.
        let http = Client::builder()
            .connect_timeout(config.timeout())
            .read_timeout(config.timeout())
            .build()
            .map_err(Error::from)?;

        Ok(Self {
            inner: Arc::new(OpenAiModelInner { http, config, url }),
        })
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    async fn send(&self, request: &CompletionRequest) -> Result<reqwest::Response> {
        let config = &self.inner.config;
        let body = ChatRequest {
            model: &config.model,
            messages: request.messages.iter().map(ChatMessage::from).collect(),
            tools: request.tools.iter().map(ChatTool::from).collect(),
            temperature: request.temperature.or(Some(config.temperature)),
            max_tokens: request.max_tokens.or(Some(config.max_tokens)),
            stream: true,
        };

        let mut builder = self
            .inner
            .http
            .post(self.inner.url.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(&body);

        if let Some(api_key) = config.api_key.as_deref() {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(Error::Status { status, body });
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.inner.config.model
    }

    async fn stream(&self, request: CompletionRequest) -> conduit_core::Result<ModelStream> {
        tracing::debug!(
            target: TRACING_TARGET_OPENAI,
            model = %self.inner.config.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Starting completion"
        );

        let response = self.send(&request).await.inspect_err(|error| {
            tracing::warn!(
                target: TRACING_TARGET_OPENAI,
                model = %self.inner.config.model,
                error = %error,
                "Model request failed"
            );
        })?;

        let mut body = response.bytes_stream();
        let stream = async_stream::try_stream! {
            let mut decoder = SseDecoder::new();
            let mut assembler = ChunkAssembler::default();

            while let Some(bytes) = body.next().await {
                let bytes = bytes.map_err(Error::from).map_err(CoreError::from)?;
                for data in decoder.push(&bytes) {
                    for chunk in assembler.event(&data) {
                        yield chunk;
                    }
                }
                if assembler.is_done() {
                    break;
                }
            }

            if let Some(data) = decoder.finish() {
                for chunk in assembler.event(&data) {
                    yield chunk;
                }
            }

            for chunk in assembler.finish() {
                yield chunk;
            }
        };

        Ok(stream.boxed())
    }
}

/// Turns decoded event payloads into model chunks.
///
/// Tool-call fragments are accumulated per index and released in index order
/// once the choice reports a finish reason or the stream ends.
#[derive(Debug, Default)]
struct ChunkAssembler {
    calls: BTreeMap<usize, PartialToolCall>,
    emitted_calls: usize,
    done: bool,
    finished: bool,
}

impl ChunkAssembler {
    fn is_done(&self) -> bool {
        self.done
    }

    fn event(&mut self, data: &str) -> Vec<ModelChunk> {
        if self.done {
            return Vec::new();
        }

        if data.trim() == DONE_MARKER {
            self.done = true;
            return Vec::new();
        }

        let chunk: ChatChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_OPENAI,
                    error = %error,
                    "Skipping malformed completion chunk"
                );
                return Vec::new();
            }
        };

        let mut output = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|text| !text.is_empty()) {
                output.push(ModelChunk::TokenDelta(text));
            }

            for delta in choice.delta.tool_calls {
                self.calls.entry(delta.index).or_default().apply(delta);
            }

            if choice.finish_reason.is_some() {
                output.extend(self.flush_calls());
            }
        }

        output
    }

    fn flush_calls(&mut self) -> Vec<ModelChunk> {
        std::mem::take(&mut self.calls)
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(|call| {
                let request = call.finish(self.emitted_calls);
                self.emitted_calls += 1;
                ModelChunk::ToolCall(request)
            })
            .collect()
    }

    fn finish(&mut self) -> Vec<ModelChunk> {
        if self.finished {
            return Vec::new();
        }

        self.finished = true;
        let mut output = self.flush_calls();
        output.push(ModelChunk::Final);
        output
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use conduit_core::{ErrorKind, Message, ParameterField, ParameterSchema, ParameterType, ToolDescriptor};
    use futures::TryStreamExt;
    use serde_json::{Value, json};

    use super::*;

    #[derive(Clone)]
    struct Upstream {
        body: &'static str,
        status: StatusCode,
        requests: Arc<Mutex<Vec<Value>>>,
    }

    async fn completions(State(upstream): State<Upstream>, Json(request): Json<Value>) -> impl IntoResponse {
        upstream.requests.lock().unwrap().push(request);
        (
            upstream.status,
            [("content-type", "text/event-stream")],
            upstream.body,
        )
    }

    async fn spawn_upstream(status: StatusCode, body: &'static str) -> (SocketAddr, Arc<Mutex<Vec<Value>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = Upstream {
            body,
            status,
            requests: requests.clone(),
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(state);
        tokio::spawn(async move { axum::serve(listener, app).await });

        (addr, requests)
    }

    fn model(addr: SocketAddr) -> OpenAiModel {
        let url = Url::parse(&format!("http://{addr}/v1")).unwrap();
        OpenAiModel::new(ModelConfig::new(url, "test-model").with_api_key("secret")).unwrap()
    }

    const TEXT_BODY: &str = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: not json\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    const TOOL_BODY: &str = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[",
        "{\"index\":0,\"id\":\"call_a\",\"type\":\"function\",\"function\":{\"name\":\"web_search\",\"arguments\":\"{\\\"query\\\":\"}},",
        "{\"index\":1,\"id\":\"call_b\",\"type\":\"function\",\"function\":{\"name\":\"search_documents\",\"arguments\":\"{}\"}}",
        "]}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"rust\\\"}\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    #[tokio::test]
    async fn streams_text_deltas() {
        let (addr, requests) = spawn_upstream(StatusCode::OK, TEXT_BODY).await;
        let request = CompletionRequest::new(vec![Message::user("hi")], Vec::new());

        let chunks: Vec<_> = model(addr).stream(request).await.unwrap().try_collect().await.unwrap();
        assert_eq!(
            chunks,
            [
                ModelChunk::TokenDelta("Hel".into()),
                ModelChunk::TokenDelta("lo".into()),
                ModelChunk::Final,
            ]
        );

        let sent = requests.lock().unwrap()[0].clone();
        assert_eq!(sent["model"], "test-model");
        assert_eq!(sent["stream"], true);
        assert_eq!(sent["messages"][0]["role"], "user");
        assert!(sent.get("tools").is_none());
    }

    #[tokio::test]
    async fn assembles_tool_calls() {
        let (addr, requests) = spawn_upstream(StatusCode::OK, TOOL_BODY).await;
        let schema = ParameterSchema::new(vec![ParameterField::required(
            "query",
            ParameterType::String,
        )]);
        let tool = ToolDescriptor::new("web_search", "Search the web").with_parameters(schema);
        let request = CompletionRequest::new(vec![Message::user("find rust")], vec![tool]);

        let chunks: Vec<_> = model(addr).stream(request).await.unwrap().try_collect().await.unwrap();
        let calls: Vec<_> = chunks
            .iter()
            .filter_map(|chunk| match chunk {
                ModelChunk::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect();

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "call_a");
        assert_eq!(calls[0].arguments, json!({"query": "rust"}));
        assert_eq!(calls[1].tool_name, "search_documents");
        assert_eq!(chunks.last(), Some(&ModelChunk::Final));

        let sent = requests.lock().unwrap()[0].clone();
        assert_eq!(sent["tools"][0]["function"]["name"], "web_search");
        assert_eq!(sent["tools"][0]["function"]["parameters"]["required"], json!(["query"]));
    }

    #[tokio::test]
    async fn error_status_is_model_unavailable() {
        let (addr, _) = spawn_upstream(StatusCode::SERVICE_UNAVAILABLE, "overloaded").await;
        let request = CompletionRequest::new(vec![Message::user("hi")], Vec::new());

        let Err(error) = model(addr).stream(request).await else {
            panic!("an error status must fail the request");
        };
        assert_eq!(error.kind(), ErrorKind::ModelUnavailable);
        assert!(error.message_or_kind().contains("overloaded"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_model_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let request = CompletionRequest::new(vec![Message::user("hi")], Vec::new());
        let Err(error) = model(addr).stream(request).await else {
            panic!("a closed port must fail the request");
        };
        assert_eq!(error.kind(), ErrorKind::ModelUnavailable);
    }

    async fn spawn_slow_upstream(events: &'static [&'static str], interval: Duration) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || async move {
                let body = futures::stream::iter(events.iter().copied()).then(move |event| async move {
                    tokio::time::sleep(interval).await;
                    Ok::<_, std::convert::Infallible>(event)
                });
                ([("content-type", "text/event-stream")], Body::from_stream(body))
            }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await });

        addr
    }

    #[tokio::test]
    async fn slow_stream_outlasts_the_timeout() {
        const EVENTS: &[&str] = &[
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ];
        let addr = spawn_slow_upstream(EVENTS, Duration::from_millis(400)).await;
        let url = Url::parse(&format!("http://{addr}/v1")).unwrap();
        let config = ModelConfig::new(url, "test-model").with_timeout(Duration::from_secs(1));
        let request = CompletionRequest::new(vec![Message::user("hi")], Vec::new());

        let chunks: Vec<_> = OpenAiModel::new(config)
            .unwrap()
            .stream(request)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            chunks,
            [
                ModelChunk::TokenDelta("Hel".into()),
                ModelChunk::TokenDelta("lo".into()),
                ModelChunk::Final,
            ]
        );
    }

    #[test]
    fn stream_without_done_marker_still_finishes() {
        let mut assembler = ChunkAssembler::default();
        let chunks = assembler.event(r#"{"choices":[{"delta":{"content":"partial"}}]}"#);
        assert_eq!(chunks, [ModelChunk::TokenDelta("partial".into())]);

        assert_eq!(assembler.finish(), [ModelChunk::Final]);
        assert!(assembler.finish().is_empty());
    }
}
