//! JSON-RPC over HTTP provider implementation using reqwest.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use conduit_core::{
    Arguments, ParameterSchema, ProviderId, ProviderKind, ResourceDescriptor, ToolDescriptor,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::config::HttpProviderConfig;
use super::error::{Error, Result};
use super::rpc::{
    CallToolResult, ListResourcesResult, ListToolsResult, METHOD_NOT_FOUND, ReadResourceResult,
    RpcRequest, RpcResponse,
};
use crate::{CapabilityProvider, ProviderManifest, ResourceContents, TRACING_TARGET_HTTP, ToolReply};

/// Inner provider state that holds the HTTP client and configuration.
struct HttpProviderInner {
    http: Client,
    config: HttpProviderConfig,
    endpoint: String,
    next_request_id: AtomicU64,
}

impl std::fmt::Debug for HttpProviderInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProviderInner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A capability provider reached over JSON-RPC 2.0 on HTTP.
///
/// This type is cheap to clone and can be shared across threads.
///
/// # Examples
///
/// ```rust,ignore
/// use conduit_core::ProviderKind;
/// use conduit_provider::{HttpProvider, HttpProviderConfig};
///
/// let endpoint = "http://localhost:8101/rpc".parse()?;
/// let config = HttpProviderConfig::new("vector", ProviderKind::VectorSearch, endpoint);
/// let provider = HttpProvider::new(config)?;
/// let manifest = provider.list_tools().await?;
/// ```
#[derive(Clone, Debug)]
pub struct HttpProvider {
    inner: Arc<HttpProviderInner>,
}

impl HttpProvider {
    /// Creates a provider client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: HttpProviderConfig) -> conduit_core::Result<Self> {
        tracing::debug!(
            target: TRACING_TARGET_HTTP,
            provider = %config.id,
            endpoint = %config.endpoint,
            timeout_ms = config.transport.timeout().as_millis(),
            "Creating HTTP provider client"
        );

        config.validate()?;

        let http = Client::builder()
            .timeout(config.transport.timeout())
            .user_agent(config.transport.effective_user_agent())
            .build()
            .map_err(Error::from)?;

        let inner = HttpProviderInner {
            http,
            endpoint: config.endpoint.to_string(),
            config,
            next_request_id: AtomicU64::new(1),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Gets the provider configuration.
    pub fn config(&self) -> &HttpProviderConfig {
        &self.inner.config
    }

    /// Sends one JSON-RPC request and returns its `result`.
    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let mut request = RpcRequest::new(id, method);
        if let Some(params) = params {
            request = request.with_params(params);
        }

        tracing::trace!(
            target: TRACING_TARGET_HTTP,
            provider = %self.inner.config.id,
            request_id = id,
            method,
            "Sending JSON-RPC request"
        );

        let response: RpcResponse = self
            .inner
            .http
            .post(self.inner.config.endpoint.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(Error::Rpc(error));
        }

        response.result.ok_or(Error::MissingResult)
    }

    /// Sends a request and decodes its result.
    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let result = self.call(method, params).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        match self.call_as::<ListResourcesResult>("resources/list", None).await {
            Ok(result) => Ok(result
                .resources
                .into_iter()
                .map(|resource| ResourceDescriptor {
                    uri: resource.uri,
                    name: resource.name,
                    description: resource.description,
                    mime_type: resource.mime_type,
                })
                .collect()),
            Err(Error::Rpc(error)) if error.code == METHOD_NOT_FOUND => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl CapabilityProvider for HttpProvider {
    fn id(&self) -> &ProviderId {
        &self.inner.config.id
    }

    fn kind(&self) -> ProviderKind {
        self.inner.config.kind
    }

    fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    async fn list_tools(&self) -> conduit_core::Result<ProviderManifest> {
        let listed: ListToolsResult = self.call_as("tools/list", None).await?;

        let tools = listed
            .tools
            .into_iter()
            .map(|tool| {
                let schema = ParameterSchema::from_json_schema(&tool.input_schema).map_err(|e| {
                    let message = format!("tool `{}`: {}", tool.name, e.message_or_kind());
                    e.with_message(message)
                })?;
                Ok(ToolDescriptor::new(tool.name, tool.description).with_parameters(schema))
            })
            .collect::<conduit_core::Result<Vec<_>>>()?;

        let resources = self.list_resources().await?;
        let manifest = ProviderManifest::new(tools).with_resources(resources);
        manifest.validate()?;

        tracing::debug!(
            target: TRACING_TARGET_HTTP,
            provider = %self.inner.config.id,
            tools = manifest.tools.len(),
            resources = manifest.resources.len(),
            "Provider manifest received"
        );

        Ok(manifest)
    }

    async fn invoke(
        &self,
        tool_name: &str,
        arguments: &Arguments,
    ) -> conduit_core::Result<ToolReply> {
        let params = json!({ "name": tool_name, "arguments": arguments });
        let result: CallToolResult = self.call_as("tools/call", Some(params)).await?;

        if result.is_error {
            return Ok(ToolReply::failure(result.text()));
        }

        Ok(ToolReply::success(result.payload()))
    }

    async fn probe(&self) -> conduit_core::Result<()> {
        self.call("ping", None).await?;
        Ok(())
    }

    async fn read_resource(&self, uri: &str) -> conduit_core::Result<ResourceContents> {
        let result: ReadResourceResult = self
            .call_as("resources/read", Some(json!({ "uri": uri })))
            .await?;

        let Some(content) = result.contents.into_iter().next() else {
            return Err(conduit_core::Error::malformed_response()
                .with_message(format!("resource `{uri}` returned no contents")));
        };

        Ok(ResourceContents {
            uri: content.uri,
            mime_type: content.mime_type,
            text: content.text,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::routing::post;
    use axum::{Json, Router};
    use conduit_core::{ErrorKind, ParameterType};
    use url::Url;

    use super::*;

    /// Minimal JSON-RPC provider mirroring a vector search service.
    async fn rpc_handler(Json(request): Json<Value>) -> Json<Value> {
        let id = request["id"].clone();
        let result = match request["method"].as_str() {
            Some("ping") => json!({}),
            Some("tools/list") => json!({
                "tools": [{
                    "name": "search_documents",
                    "description": "Search documents",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "query": {"type": "string"},
                            "top_k": {"type": "integer"}
                        },
                        "required": ["query"]
                    }
                }]
            }),
            Some("tools/call") if request["params"]["arguments"]["query"] == "fail" => json!({
                "content": [{"type": "text", "text": "index offline"}],
                "isError": true
            }),
            Some("tools/call") => json!({
                "content": [{"type": "text", "text": "{\"results\": [\"q3 revenue\"]}"}]
            }),
            Some("resources/read") => json!({
                "contents": [{"uri": request["params"]["uri"], "text": "collections: 1"}]
            }),
            _ => {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": METHOD_NOT_FOUND, "message": "method not found"}
                }));
            }
        };

        Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }

    async fn spawn_server() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/rpc", post(rpc_handler));
        tokio::spawn(async move { axum::serve(listener, app).await });
        addr
    }

    fn provider(addr: SocketAddr) -> HttpProvider {
        let endpoint = Url::parse(&format!("http://{addr}/rpc")).unwrap();
        HttpProvider::new(HttpProviderConfig::new(
            "vector",
            ProviderKind::VectorSearch,
            endpoint,
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn lists_tools_and_tolerates_missing_resources() {
        let provider = provider(spawn_server().await);

        let manifest = provider.list_tools().await.unwrap();
        assert_eq!(manifest.tool_names(), ["search_documents"]);
        assert!(manifest.resources.is_empty());

        let schema = &manifest.tools[0].parameter_schema;
        assert_eq!(schema.field("top_k").unwrap().kind, ParameterType::Integer);
        assert!(schema.field("query").unwrap().required);
    }

    #[tokio::test]
    async fn invokes_tools() {
        let provider = provider(spawn_server().await);

        let arguments = json!({"query": "revenue"}).as_object().cloned().unwrap();
        let reply = provider.invoke("search_documents", &arguments).await.unwrap();
        assert_eq!(reply, ToolReply::success(json!({"results": ["q3 revenue"]})));

        let arguments = json!({"query": "fail"}).as_object().cloned().unwrap();
        let reply = provider.invoke("search_documents", &arguments).await.unwrap();
        assert_eq!(reply, ToolReply::failure("index offline"));
    }

    #[tokio::test]
    async fn probes_and_reads_resources() {
        let provider = provider(spawn_server().await);

        assert!(provider.probe().await.is_ok());
        let contents = provider.read_resource("vector://collections").await.unwrap();
        assert_eq!(contents.uri, "vector://collections");
        assert_eq!(contents.text, "collections: 1");
    }

    #[tokio::test]
    async fn connection_failures_map_to_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let error = provider(addr).probe().await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ProviderUnavailable);
    }
}
