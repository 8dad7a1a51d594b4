//! In-memory providers with scripted behavior.
//!
//! [`MockProvider`] answers tool calls through registered handler closures and
//! exposes switches to simulate outages and malformed manifests. The
//! [`demo_providers`] set mirrors the four provider kinds with canned output
//! so a server can run without any external service.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use conduit_core::{
    Arguments, Error, ParameterField, ParameterSchema, ParameterType, ProviderId, ProviderKind,
    ResourceDescriptor, Result, ToolDescriptor,
};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::{
    CapabilityProvider, ProviderManifest, ResourceContents, TRACING_TARGET_MOCK, ToolReply,
};

/// Handler invoked for a tool call.
pub type ToolHandler = Arc<dyn Fn(Arguments) -> BoxFuture<'static, Result<ToolReply>> + Send + Sync>;

/// Wraps an async closure into a [`ToolHandler`].
pub fn handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolReply>> + Send + 'static,
{
    Arc::new(move |arguments| f(arguments).boxed())
}

/// Handler that returns its arguments as the payload.
pub fn echo() -> ToolHandler {
    handler(|arguments| async move { Ok(ToolReply::success(Value::Object(arguments))) })
}

/// Handler that waits before answering with `reply`.
pub fn delayed(delay: Duration, reply: ToolReply) -> ToolHandler {
    handler(move |_| {
        let reply = reply.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok(reply)
        }
    })
}

/// Handler that always fails at the transport level with `error`.
pub fn failing(kind: conduit_core::ErrorKind) -> ToolHandler {
    handler(move |_| async move { Err(Error::new(kind).with_message("scripted failure")) })
}

#[derive(Clone)]
struct MockTool {
    descriptor: ToolDescriptor,
    handler: ToolHandler,
}

struct MockProviderInner {
    id: ProviderId,
    kind: ProviderKind,
    endpoint: String,
    tools: RwLock<Vec<MockTool>>,
    resources: RwLock<Vec<(ResourceDescriptor, String)>>,
    reachable: AtomicBool,
    malformed: AtomicBool,
    discovery_delay_ms: AtomicU64,
    invocations: AtomicUsize,
    probes: AtomicUsize,
}

/// In-memory capability provider.
///
/// This type is cheap to clone; clones share tools, switches and counters.
#[derive(Clone)]
pub struct MockProvider {
    inner: Arc<MockProviderInner>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .finish_non_exhaustive()
    }
}

impl MockProvider {
    /// Creates a reachable provider without tools.
    pub fn new(id: impl Into<ProviderId>, kind: ProviderKind) -> Self {
        let id = id.into();
        let inner = MockProviderInner {
            endpoint: format!("mock://{id}"),
            id,
            kind,
            tools: RwLock::new(Vec::new()),
            resources: RwLock::new(Vec::new()),
            reachable: AtomicBool::new(true),
            malformed: AtomicBool::new(false),
            discovery_delay_ms: AtomicU64::new(0),
            invocations: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Adds a tool with its handler.
    pub fn with_tool(self, descriptor: ToolDescriptor, handler: ToolHandler) -> Self {
        self.add_tool(descriptor, handler);
        self
    }

    /// Adds a resource with its text contents.
    pub fn with_resource(self, resource: ResourceDescriptor, text: impl Into<String>) -> Self {
        self.inner
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((resource, text.into()));
        self
    }

    /// Delays every `list_tools` answer by `delay`.
    pub fn with_discovery_delay(self, delay: Duration) -> Self {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.inner.discovery_delay_ms.store(millis, Ordering::SeqCst);
        self
    }

    /// Adds or replaces a tool.
    pub fn add_tool(&self, descriptor: ToolDescriptor, handler: ToolHandler) {
        let mut tools = self.inner.tools.write().unwrap_or_else(PoisonError::into_inner);
        tools.retain(|tool| tool.descriptor.name != descriptor.name);
        tools.push(MockTool {
            descriptor,
            handler,
        });
    }

    /// Removes a tool; returns whether it existed.
    pub fn remove_tool(&self, name: &str) -> bool {
        let mut tools = self.inner.tools.write().unwrap_or_else(PoisonError::into_inner);
        let before = tools.len();
        tools.retain(|tool| tool.descriptor.name != name);
        tools.len() != before
    }

    /// Simulates an outage: every request fails with `provider_unavailable`.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Makes `list_tools` return a malformed response.
    pub fn set_malformed(&self, malformed: bool) {
        self.inner.malformed.store(malformed, Ordering::SeqCst);
    }

    /// Returns how many tool calls reached this provider.
    pub fn invocation_count(&self) -> usize {
        self.inner.invocations.load(Ordering::SeqCst)
    }

    /// Returns how many probes reached this provider.
    pub fn probe_count(&self) -> usize {
        self.inner.probes.load(Ordering::SeqCst)
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.inner.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::provider_unavailable()
                .with_message(format!("provider `{}` refused the connection", self.inner.id)))
        }
    }
}

#[async_trait::async_trait]
impl CapabilityProvider for MockProvider {
    fn id(&self) -> &ProviderId {
        &self.inner.id
    }

    fn kind(&self) -> ProviderKind {
        self.inner.kind
    }

    fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    async fn list_tools(&self) -> Result<ProviderManifest> {
        let delay = self.inner.discovery_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.ensure_reachable()?;

        if self.inner.malformed.load(Ordering::SeqCst) {
            return Err(Error::malformed_response().with_message("input schema is not an object"));
        }

        let tools = self
            .inner
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|tool| tool.descriptor.clone())
            .collect();

        let resources = self
            .inner
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(resource, _)| resource.clone())
            .collect();

        let manifest = ProviderManifest::new(tools).with_resources(resources);
        manifest.validate()?;
        Ok(manifest)
    }

    async fn invoke(&self, tool_name: &str, arguments: &Arguments) -> Result<ToolReply> {
        self.ensure_reachable()?;
        self.inner.invocations.fetch_add(1, Ordering::SeqCst);

        let handler = self
            .inner
            .tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|tool| tool.descriptor.name == tool_name)
            .map(|tool| Arc::clone(&tool.handler));

        tracing::trace!(
            target: TRACING_TARGET_MOCK,
            provider = %self.inner.id,
            tool = tool_name,
            "Mock tool call"
        );

        match handler {
            Some(handler) => handler(arguments.clone()).await,
            None => Ok(ToolReply::failure(format!("unknown tool `{tool_name}`"))),
        }
    }

    async fn probe(&self) -> Result<()> {
        self.inner.probes.fetch_add(1, Ordering::SeqCst);
        self.ensure_reachable()
    }

    async fn read_resource(&self, uri: &str) -> Result<ResourceContents> {
        self.ensure_reachable()?;

        self.inner
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(resource, _)| resource.uri == uri)
            .map(|(resource, text)| ResourceContents {
                uri: resource.uri.clone(),
                mime_type: resource.mime_type.clone(),
                text: text.clone(),
            })
            .ok_or_else(|| {
                Error::provider_error().with_message(format!("unknown resource `{uri}`"))
            })
    }
}

fn string_field(name: &str, description: &str) -> ParameterField {
    ParameterField::required(name, ParameterType::String).with_description(description)
}

/// Returns one canned provider per kind: `database`, `vector`, `image` and `web_search`.
pub fn demo_providers() -> Vec<MockProvider> {
    let database = MockProvider::new("database", ProviderKind::Storage)
        .with_tool(
            ToolDescriptor::new("save_message", "Save a chat message").with_parameters(
                ParameterSchema::default()
                    .with_field(string_field("session_id", "Session ID"))
                    .with_field(string_field("content", "Message content")),
            ),
            handler(|_| async { Ok(ToolReply::success(json!({"saved": true}))) }),
        )
        .with_tool(
            ToolDescriptor::new("get_chat_history", "Get recent messages of a session")
                .with_parameters(
                    ParameterSchema::default()
                        .with_field(string_field("session_id", "Session ID"))
                        .with_field(ParameterField::optional("limit", ParameterType::Integer)),
                ),
            handler(|_| async { Ok(ToolReply::success(json!({"messages": []}))) }),
        )
        .with_resource(
            ResourceDescriptor {
                uri: "database://sessions".into(),
                name: "Sessions".into(),
                description: "Chat sessions".into(),
                mime_type: Some("application/json".into()),
            },
            "[]",
        );

    let vector = MockProvider::new("vector", ProviderKind::VectorSearch)
        .with_tool(
            ToolDescriptor::new("add_documents", "Add document chunks to the vector store")
                .with_parameters(
                    ParameterSchema::default()
                        .with_field(string_field("session_id", "Session ID"))
                        .with_field(ParameterField::required("documents", ParameterType::Array))
                        .with_field(string_field("filename", "Source filename")),
                ),
            handler(|arguments| async move {
                let added = arguments
                    .get("documents")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Ok(ToolReply::success(json!({"added": added})))
            }),
        )
        .with_tool(
            ToolDescriptor::new("search_documents", "Search documents by similarity")
                .with_parameters(
                    ParameterSchema::default()
                        .with_field(string_field("session_id", "Session ID"))
                        .with_field(string_field("query", "Search query"))
                        .with_field(ParameterField::optional("top_k", ParameterType::Integer)),
                ),
            handler(|_| async { Ok(ToolReply::success(json!({"results": []}))) }),
        );

    let image = MockProvider::new("image", ProviderKind::ImageSynthesis).with_tool(
        ToolDescriptor::new("generate_image", "Generate an image from a prompt").with_parameters(
            ParameterSchema::default().with_field(string_field("prompt", "Image description")),
        ),
        handler(|_| async {
            Ok(ToolReply::success(json!({"image_path": "generated/mock.png"})))
        }),
    );

    let web_search = MockProvider::new("web_search", ProviderKind::WebSearch)
        .with_tool(
            ToolDescriptor::new("web_search", "Search the web").with_parameters(
                ParameterSchema::default()
                    .with_field(string_field("query", "Search query"))
                    .with_field(ParameterField::optional("num_results", ParameterType::Integer)),
            ),
            handler(|_| async { Ok(ToolReply::success(json!({"results": []}))) }),
        )
        .with_tool(
            ToolDescriptor::new("search_news", "Search recent news").with_parameters(
                ParameterSchema::default().with_field(string_field("query", "Search query")),
            ),
            handler(|_| async { Ok(ToolReply::success(json!({"articles": []}))) }),
        );

    vec![database, vector, image, web_search]
}
