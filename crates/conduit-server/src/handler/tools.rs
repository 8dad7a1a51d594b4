//! Tool catalog and direct tool call handlers.

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use axum::http::StatusCode;
use conduit_core::ToolResult;
use conduit_runtime::Runtime;
use conduit_runtime::registry::CapabilityRegistry;

use crate::TRACING_TARGET_CATALOG;
use crate::extract::{Json, Path, Query};
use crate::handler::request::{InvokeTool, ListToolsQuery, ToolPathParams};
use crate::handler::response::{ErrorResponse, ToolCatalog};
use crate::handler::{ErrorKind, Result};
use crate::service::ServiceState;

/// Lists registered tools in registration order.
#[tracing::instrument(skip_all, fields(all = query.all))]
async fn list_tools(
    State(registry): State<CapabilityRegistry>,
    Query(query): Query<ListToolsQuery>,
) -> Result<(StatusCode, Json<ToolCatalog>)> {
    let tools = if query.all {
        registry.list_tools().await
    } else {
        registry.catalog().await
    };

    tracing::debug!(target: TRACING_TARGET_CATALOG, tools = tools.len(), "Tools listed");

    let response = ToolCatalog {
        include_unreachable: query.all,
        tools,
    };

    Ok((StatusCode::OK, Json(response)))
}

fn list_tools_docs(op: TransformOperation) -> TransformOperation {
    op.summary("List tools")
        .description(
            "Returns the tools offered to the model: every tool of a provider that is not \
            unreachable. With `all=true`, tools of unreachable providers are listed too.",
        )
        .response::<200, Json<ToolCatalog>>()
}

/// Invokes one tool outside any conversation.
#[tracing::instrument(skip_all, fields(tool_name = %path_params.tool_name))]
async fn invoke_tool(
    State(runtime): State<Runtime>,
    Path(path_params): Path<ToolPathParams>,
    Json(request): Json<InvokeTool>,
) -> Result<(StatusCode, Json<ToolResult>)> {
    if !runtime.registry().contains(&path_params.tool_name).await {
        return Err(ErrorKind::NotFound
            .with_message(format!("tool `{}` is not registered", path_params.tool_name))
            .with_resource("tool"));
    }

    let result = runtime
        .invoke_tool(&path_params.tool_name, request.arguments)
        .await;

    tracing::info!(
        target: TRACING_TARGET_CATALOG,
        invocation_id = %result.invocation_id,
        success = result.is_success(),
        duration_ms = result.duration_ms,
        "Direct tool call finished"
    );

    Ok((StatusCode::OK, Json(result)))
}

fn invoke_tool_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Invoke tool")
        .description(
            "Calls a single tool through the dispatcher, with argument validation, \
            health tracking and the tool timeout. Tool failures are returned as a \
            failed result, not as an error status.",
        )
        .response::<200, Json<ToolResult>>()
        .response::<400, Json<ErrorResponse>>()
        .response::<404, Json<ErrorResponse>>()
}

/// Returns a [`Router`] with all related routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route("/tools", get_with(list_tools, list_tools_docs))
        .api_route(
            "/tools/{toolName}/invoke",
            post_with(invoke_tool, invoke_tool_docs),
        )
        .with_path_items(|item| item.tag("Tools"))
}
