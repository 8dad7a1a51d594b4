//! Provider inspection and refresh handlers.

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use axum::http::StatusCode;
use conduit_core::{ProviderHandle, ProviderId, ResourceDescriptor, ToolDescriptor};
use conduit_runtime::registry::CapabilityRegistry;

use crate::TRACING_TARGET_CATALOG;
use crate::extract::{Json, Path, Query};
use crate::handler::Result;
use crate::handler::request::{ProviderPathParams, ReadResourceQuery};
use crate::handler::response::{ErrorResponse, ProviderRegistration, ResourceContent};
use crate::service::ServiceState;

/// Lists registered providers with their health.
#[tracing::instrument(skip_all)]
async fn list_providers(
    State(registry): State<CapabilityRegistry>,
) -> Result<(StatusCode, Json<Vec<ProviderHandle>>)> {
    let providers = registry.providers().await;
    tracing::debug!(target: TRACING_TARGET_CATALOG, providers = providers.len(), "Providers listed");
    Ok((StatusCode::OK, Json(providers)))
}

fn list_providers_docs(op: TransformOperation) -> TransformOperation {
    op.summary("List providers")
        .description("Returns every registered provider with its kind, endpoint and health status.")
        .response::<200, Json<Vec<ProviderHandle>>>()
}

/// Lists the tools of one provider.
#[tracing::instrument(skip_all, fields(provider_id = %path_params.provider_id))]
async fn get_provider_tools(
    State(registry): State<CapabilityRegistry>,
    Path(path_params): Path<ProviderPathParams>,
) -> Result<(StatusCode, Json<Vec<ToolDescriptor>>)> {
    let id = ProviderId::new(path_params.provider_id);
    let tools = registry.provider_tools(&id).await?;
    Ok((StatusCode::OK, Json(tools)))
}

fn get_provider_tools_docs(op: TransformOperation) -> TransformOperation {
    op.summary("List provider tools")
        .description("Returns the tools owned by the provider, including ones not offered to the model.")
        .response::<200, Json<Vec<ToolDescriptor>>>()
        .response::<404, Json<ErrorResponse>>()
}

/// Lists the resources of one provider.
#[tracing::instrument(skip_all, fields(provider_id = %path_params.provider_id))]
async fn get_provider_resources(
    State(registry): State<CapabilityRegistry>,
    Path(path_params): Path<ProviderPathParams>,
) -> Result<(StatusCode, Json<Vec<ResourceDescriptor>>)> {
    let id = ProviderId::new(path_params.provider_id);
    let resources = registry.provider_resources(&id).await?;
    Ok((StatusCode::OK, Json(resources)))
}

fn get_provider_resources_docs(op: TransformOperation) -> TransformOperation {
    op.summary("List provider resources")
        .description("Returns the resources the provider declared at registration.")
        .response::<200, Json<Vec<ResourceDescriptor>>>()
        .response::<404, Json<ErrorResponse>>()
}

/// Reads one resource of a provider.
#[tracing::instrument(skip_all, fields(provider_id = %path_params.provider_id, uri = %query.uri))]
async fn read_provider_resource(
    State(registry): State<CapabilityRegistry>,
    Path(path_params): Path<ProviderPathParams>,
    Query(query): Query<ReadResourceQuery>,
) -> Result<(StatusCode, Json<ResourceContent>)> {
    let id = ProviderId::new(path_params.provider_id);
    let contents = registry.read_resource(&id, &query.uri).await?;

    tracing::debug!(target: TRACING_TARGET_CATALOG, bytes = contents.text.len(), "Resource read");

    Ok((StatusCode::OK, Json(contents.into())))
}

fn read_provider_resource_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Read provider resource")
        .description("Reads the contents of a resource by URI from its provider.")
        .response::<200, Json<ResourceContent>>()
        .response::<404, Json<ErrorResponse>>()
        .response::<500, Json<ErrorResponse>>()
        .response::<503, Json<ErrorResponse>>()
}

/// Re-discovers the tools of one provider.
#[tracing::instrument(skip_all, fields(provider_id = %path_params.provider_id))]
async fn refresh_provider(
    State(registry): State<CapabilityRegistry>,
    Path(path_params): Path<ProviderPathParams>,
) -> Result<(StatusCode, Json<ProviderRegistration>)> {
    let id = ProviderId::new(path_params.provider_id);
    let outcome = registry.refresh(&id).await?;
    let response = ProviderRegistration::from(outcome);

    tracing::info!(
        target: TRACING_TARGET_CATALOG,
        state = ?response.state,
        tools = response.tools.len(),
        "Provider refreshed"
    );

    Ok((StatusCode::OK, Json(response)))
}

fn refresh_provider_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Refresh provider")
        .description(
            "Lists the provider's tools again and replaces its catalog entries. When \
            the provider cannot be queried its previous tools are kept.",
        )
        .response::<200, Json<ProviderRegistration>>()
        .response::<404, Json<ErrorResponse>>()
        .response::<409, Json<ErrorResponse>>()
        .response::<503, Json<ErrorResponse>>()
}

/// Returns a [`Router`] with all related routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route("/providers", get_with(list_providers, list_providers_docs))
        .api_route(
            "/providers/{providerId}/tools",
            get_with(get_provider_tools, get_provider_tools_docs),
        )
        .api_route(
            "/providers/{providerId}/resources",
            get_with(get_provider_resources, get_provider_resources_docs),
        )
        .api_route(
            "/providers/{providerId}/resources/read",
            get_with(read_provider_resource, read_provider_resource_docs),
        )
        .api_route(
            "/providers/{providerId}/refresh",
            post_with(refresh_provider, refresh_provider_docs),
        )
        .with_path_items(|item| item.tag("Providers"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use conduit_core::{ParameterSchema, ProviderKind};
    use conduit_model::mock::ScriptedModel;
    use conduit_provider::mock::{self, MockProvider};
    use serde_json::Value;

    use super::*;
    use crate::handler::response::RegistrationState;
    use crate::handler::test::{
        create_demo_runtime, create_test_runtime, create_test_server_with_runtime,
    };

    #[tokio::test]
    async fn providers_are_listed_with_health() -> anyhow::Result<()> {
        let runtime = create_demo_runtime(&ScriptedModel::new("m")).await?;
        let server = create_test_server_with_runtime(routes(), runtime)?;

        let response = server.get("/providers").await;
        response.assert_status_ok();
        let providers = response.json::<Vec<ProviderHandle>>();
        let ids: Vec<_> = providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["database", "vector", "image", "web_search"]);
        assert_eq!(providers[1].kind, ProviderKind::VectorSearch);
        Ok(())
    }

    #[tokio::test]
    async fn provider_tools_and_resources() -> anyhow::Result<()> {
        let runtime = create_demo_runtime(&ScriptedModel::new("m")).await?;
        let server = create_test_server_with_runtime(routes(), runtime)?;

        let tools = server.get("/providers/vector/tools").await;
        tools.assert_status_ok();
        let names: Vec<_> = tools
            .json::<Vec<ToolDescriptor>>()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, ["add_documents", "search_documents"]);

        let resources = server.get("/providers/database/resources").await;
        resources.assert_status_ok();
        let resources = resources.json::<Vec<ResourceDescriptor>>();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].uri, "database://sessions");

        let read = server
            .get("/providers/database/resources/read")
            .add_query_param("uri", "database://sessions")
            .await;
        read.assert_status_ok();
        let content = read.json::<ResourceContent>();
        assert_eq!(content.text, "[]");
        assert_eq!(content.mime_type.as_deref(), Some("application/json"));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_provider_is_not_found() -> anyhow::Result<()> {
        let runtime = create_demo_runtime(&ScriptedModel::new("m")).await?;
        let server = create_test_server_with_runtime(routes(), runtime)?;

        let response = server.get("/providers/ghost/tools").await;
        response.assert_status_not_found();
        let body = response.json::<Value>();
        assert_eq!(body["context"], "unknown_provider");

        server
            .post("/providers/ghost/refresh")
            .await
            .assert_status_not_found();
        Ok(())
    }

    #[tokio::test]
    async fn refresh_picks_up_new_tools() -> anyhow::Result<()> {
        let provider = MockProvider::new("web", ProviderKind::WebSearch).with_tool(
            ToolDescriptor::new("web_search", "Search").with_parameters(ParameterSchema::default()),
            mock::echo(),
        );
        let runtime = create_test_runtime(&ScriptedModel::new("m"))?;
        runtime.register(Arc::new(provider.clone())).await?;
        let server = create_test_server_with_runtime(routes(), runtime.clone())?;

        provider.add_tool(ToolDescriptor::new("search_news", "News"), mock::echo());

        let response = server.post("/providers/web/refresh").await;
        response.assert_status_ok();
        let registration = response.json::<ProviderRegistration>();
        assert_eq!(registration.state, RegistrationState::Registered);
        assert_eq!(registration.tools, ["web_search", "search_news"]);
        assert!(runtime.registry().contains("search_news").await);
        Ok(())
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_tools() -> anyhow::Result<()> {
        let provider = MockProvider::new("web", ProviderKind::WebSearch)
            .with_tool(ToolDescriptor::new("web_search", "Search"), mock::echo());
        let runtime = create_test_runtime(&ScriptedModel::new("m"))?;
        runtime.register(Arc::new(provider.clone())).await?;
        let server = create_test_server_with_runtime(routes(), runtime.clone())?;

        provider.set_reachable(false);

        let response = server.post("/providers/web/refresh").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body = response.json::<Value>();
        assert_eq!(body["context"], "provider_unavailable");
        assert!(runtime.registry().contains("web_search").await);
        Ok(())
    }
}
