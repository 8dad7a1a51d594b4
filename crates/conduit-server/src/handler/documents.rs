//! Document ingestion handlers.

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use axum::http::StatusCode;
use conduit_core::{DocumentDescriptor, ToolOutcome};
use conduit_runtime::Runtime;

use crate::TRACING_TARGET_SESSIONS;
use crate::extract::{Json, Path};
use crate::handler::request::SessionPathParams;
use crate::handler::response::{DocumentIngested, ErrorResponse};
use crate::handler::{ErrorKind, Result};
use crate::service::ServiceState;

/// Hands extracted document chunks to the vector store of the session.
#[tracing::instrument(
    skip_all,
    fields(
        session_id = %path_params.session_id,
        document_id = %request.document_id,
    )
)]
async fn ingest_document(
    State(runtime): State<Runtime>,
    Path(path_params): Path<SessionPathParams>,
    Json(request): Json<DocumentDescriptor>,
) -> Result<(StatusCode, Json<DocumentIngested>)> {
    tracing::debug!(target: TRACING_TARGET_SESSIONS, "Ingesting document");

    let result = runtime
        .ingest_document(&path_params.session_id, &request)
        .await;

    if let ToolOutcome::Failure { kind, message } = &result.outcome {
        tracing::warn!(
            target: TRACING_TARGET_SESSIONS,
            invocation_id = %result.invocation_id,
            kind = %kind,
            "Document ingestion failed"
        );

        return Err(ErrorKind::from(*kind)
            .with_message(message.clone())
            .with_resource("document")
            .with_context(<&'static str>::from(*kind)));
    }

    tracing::info!(
        target: TRACING_TARGET_SESSIONS,
        chunks = request.extracted_chunks.len(),
        duration_ms = result.duration_ms,
        "Document ingested"
    );

    let response = DocumentIngested {
        chunks: request.extracted_chunks.len(),
        document_id: request.document_id,
        result,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

fn ingest_document_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Ingest document")
        .description(
            "Sends the extracted text chunks of a document to the configured vector \
            store tool, scoped to the session. Chunk order is preserved.",
        )
        .response::<201, Json<DocumentIngested>>()
        .response::<400, Json<ErrorResponse>>()
        .response::<503, Json<ErrorResponse>>()
        .response::<504, Json<ErrorResponse>>()
}

/// Returns a [`Router`] with all related routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route(
            "/sessions/{sessionId}/documents",
            post_with(ingest_document, ingest_document_docs),
        )
        .with_path_items(|item| item.tag("Documents"))
}

#[cfg(test)]
mod tests {
    use conduit_model::mock::ScriptedModel;
    use serde_json::{Value, json};

    use super::*;
    use crate::handler::test::{
        create_demo_runtime, create_test_runtime, create_test_server_with_runtime,
    };

    #[tokio::test]
    async fn document_chunks_reach_the_vector_store() -> anyhow::Result<()> {
        let runtime = create_demo_runtime(&ScriptedModel::new("m")).await?;
        let server = create_test_server_with_runtime(routes(), runtime)?;

        let response = server
            .post("/sessions/s-1/documents")
            .json(&json!({
                "documentId": "report.pdf",
                "extractedChunks": ["intro", "results", "outlook"],
            }))
            .await;
        response.assert_status(StatusCode::CREATED);

        let body = response.json::<Value>();
        assert_eq!(body["documentId"], "report.pdf");
        assert_eq!(body["chunks"], 3);
        assert_eq!(body["result"]["outcome"]["status"], "success");
        assert_eq!(body["result"]["outcome"]["payload"]["added"], 3);
        Ok(())
    }

    #[tokio::test]
    async fn empty_document_is_bad_request() -> anyhow::Result<()> {
        let runtime = create_demo_runtime(&ScriptedModel::new("m")).await?;
        let server = create_test_server_with_runtime(routes(), runtime)?;

        let response = server
            .post("/sessions/s-1/documents")
            .json(&json!({"documentId": "blank.pdf", "extractedChunks": []}))
            .await;
        response.assert_status_bad_request();

        let body = response.json::<Value>();
        assert_eq!(body["context"], "validation_error");
        assert_eq!(body["resource"], "document");
        Ok(())
    }

    #[tokio::test]
    async fn missing_vector_store_is_bad_request() -> anyhow::Result<()> {
        let runtime = create_test_runtime(&ScriptedModel::new("m"))?;
        let server = create_test_server_with_runtime(routes(), runtime)?;

        let response = server
            .post("/sessions/s-1/documents")
            .json(&json!({"documentId": "a.pdf", "extractedChunks": ["text"]}))
            .await;
        response.assert_status_bad_request();
        Ok(())
    }
}
