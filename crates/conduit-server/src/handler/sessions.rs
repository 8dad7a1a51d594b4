//! Conversation handlers.
//!
//! `POST /sessions/{sessionId}/messages` streams one turn as Server-Sent
//! Events. The event name is the stream event type (`token_delta`,
//! `tool_status`, `error`, `done`) and the data is the JSON-encoded event.
//! Exactly one `done` or `error` event ends every stream. Closing the
//! connection cancels the turn.

use std::convert::Infallible;

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use conduit_core::StreamEvent;
use conduit_runtime::Runtime;
use futures::{Stream, StreamExt};

use crate::TRACING_TARGET_SESSIONS;
use crate::extract::{Json, Path};
use crate::handler::Result;
use crate::handler::request::{SendMessage, SessionPathParams};
use crate::handler::response::{ErrorResponse, SessionCancelled, SessionHistory};
use crate::service::ServiceState;

/// Encodes a stream event as an SSE frame; unencodable events are skipped.
fn to_sse_event(session_id: &str, event: &StreamEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event.event_type()).data(json)),
        Err(error) => {
            tracing::error!(
                target: TRACING_TARGET_SESSIONS,
                session_id,
                error = %error,
                "Failed to serialize stream event"
            );
            None
        }
    }
}

/// Starts a turn and streams its events.
#[tracing::instrument(skip_all, fields(session_id = %path_params.session_id))]
async fn send_message(
    State(runtime): State<Runtime>,
    Path(path_params): Path<SessionPathParams>,
    Json(request): Json<SendMessage>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    tracing::debug!(target: TRACING_TARGET_SESSIONS, "Sending message");

    let handle = runtime.start_turn(&path_params.session_id, &request.content)?;

    tracing::info!(
        target: TRACING_TARGET_SESSIONS,
        session_id = %handle.session_id,
        "Message stream started"
    );

    let session_id = handle.session_id;
    let stream = handle.events.filter_map(move |event| {
        let frame = to_sse_event(&session_id, &event).map(Ok::<_, Infallible>);
        async move { frame }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Cancels the running turn of a session.
#[tracing::instrument(skip_all, fields(session_id = %path_params.session_id))]
async fn cancel_turn(
    State(runtime): State<Runtime>,
    Path(path_params): Path<SessionPathParams>,
) -> Result<(StatusCode, Json<SessionCancelled>)> {
    let cancelled = runtime.cancel(&path_params.session_id);

    tracing::info!(target: TRACING_TARGET_SESSIONS, cancelled, "Cancel requested");

    let response = SessionCancelled {
        session_id: path_params.session_id,
        cancelled,
    };

    Ok((StatusCode::OK, Json(response)))
}

fn cancel_turn_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Cancel turn")
        .description(
            "Cancels the running turn of the session. Its stream ends with a `cancelled` \
            error event. Returns `cancelled: false` when no turn was running.",
        )
        .response::<200, Json<SessionCancelled>>()
}

/// Returns the stored history of a session.
#[tracing::instrument(skip_all, fields(session_id = %path_params.session_id))]
async fn get_history(
    State(runtime): State<Runtime>,
    Path(path_params): Path<SessionPathParams>,
) -> Result<(StatusCode, Json<SessionHistory>)> {
    let messages = runtime.history(&path_params.session_id);
    let busy = runtime.sessions().is_busy(&path_params.session_id);

    tracing::debug!(
        target: TRACING_TARGET_SESSIONS,
        messages = messages.len(),
        busy,
        "History read"
    );

    let response = SessionHistory {
        session_id: path_params.session_id,
        busy,
        messages,
    };

    Ok((StatusCode::OK, Json(response)))
}

fn get_history_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Get session history")
        .description(
            "Returns the completed exchanges of the session, oldest first. Unknown \
            sessions have an empty history.",
        )
        .response::<200, Json<SessionHistory>>()
        .response::<400, Json<ErrorResponse>>()
}

/// Returns a [`Router`] with all related routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route(
            "/sessions/{sessionId}/messages",
            get_with(get_history, get_history_docs),
        )
        .api_route(
            "/sessions/{sessionId}/cancel",
            post_with(cancel_turn, cancel_turn_docs),
        )
        // SSE endpoint: regular axum routing, aide doesn't document SSE.
        .route(
            "/sessions/{sessionId}/messages",
            axum::routing::post(send_message),
        )
        .with_path_items(|item| item.tag("Sessions"))
}
