//! Conversation orchestration: the model and tool round-trip loop of one turn.

mod config;
mod turn;

use std::sync::Arc;

use conduit_core::{
    Arguments, Error, FailureKind, Message, Result, ToolCallRequest, ToolDescriptor,
    ToolInvocation, ToolResult,
};
use conduit_model::{CompletionRequest, ModelChunk, SharedModel};
pub use config::{
    DEFAULT_HISTORY_WINDOW, DEFAULT_SYSTEM_PROMPT, DEFAULT_TURN_BUDGET, OrchestratorConfig,
    TOOL_FREE_SYSTEM_PROMPT, TRUNCATION_NOTICE,
};
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
pub use turn::{ConversationTurn, TurnOutcome};

use crate::TRACING_TARGET_ORCHESTRATOR;
use crate::aggregator::Producers;
use crate::dispatcher::ToolDispatcher;
use crate::registry::CapabilityRegistry;

/// Where a turn stands between two steps of the loop.
enum TurnState {
    AwaitingModel,
    AwaitingToolResults(Vec<ToolCallRequest>),
    Done(TurnOutcome),
}

/// Output of one model call.
struct ModelResponse {
    text: String,
    tool_calls: Vec<ToolCallRequest>,
}

struct OrchestratorInner {
    model: SharedModel,
    registry: CapabilityRegistry,
    dispatcher: ToolDispatcher,
    config: OrchestratorConfig,
}

/// Drives turns end to end.
///
/// This type is cheap to clone; clones share the model and the registry.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("model", &self.inner.model.name())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        model: SharedModel,
        registry: CapabilityRegistry,
        dispatcher: ToolDispatcher,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                model,
                registry,
                dispatcher,
                config,
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Returns the model's display name.
    pub fn model_name(&self) -> &str {
        self.inner.model.name()
    }

    /// Starts a turn for `content` with the session's recent `history`.
    pub fn turn(&self, session_id: &str, history: Vec<Message>, content: &str) -> ConversationTurn {
        ConversationTurn::new(session_id, history, content, self.inner.config.turn_budget)
    }

    /// Runs a turn to completion.
    ///
    /// Token deltas go to `producers.tokens` and tool statuses to
    /// `producers.statuses`. The catalog is snapshotted once at the start;
    /// with an empty catalog the turn is a plain model call without tools.
    ///
    /// # Errors
    ///
    /// Fails when the model cannot be reached or breaks off mid-response, and
    /// with `cancelled` when `cancel` fires or the event stream closes.
    /// Tool failures never fail the turn.
    #[tracing::instrument(
        skip_all,
        target = TRACING_TARGET_ORCHESTRATOR,
        fields(session_id = %turn.session_id)
    )]
    pub async fn run_turn(
        &self,
        mut turn: ConversationTurn,
        producers: &Producers,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let catalog = self.inner.registry.catalog().await;
        let system = if catalog.is_empty() {
            tracing::info!(
                target: TRACING_TARGET_ORCHESTRATOR,
                "No tools available, answering without tools"
            );
            Message::system(TOOL_FREE_SYSTEM_PROMPT)
        } else {
            Message::system(self.inner.config.system_prompt.as_str())
        };

        let mut answer = String::new();
        let mut model_calls = 0;
        let mut tool_calls = 0;
        let mut state = TurnState::AwaitingModel;

        loop {
            state = match state {
                TurnState::AwaitingModel => {
                    model_calls += 1;
                    let request = CompletionRequest::new(turn.messages(system.clone()), catalog.clone());
                    let response = self.call_model(request, producers, cancel).await?;
                    answer.push_str(&response.text);

                    if response.tool_calls.is_empty() {
                        TurnState::Done(TurnOutcome {
                            answer: std::mem::take(&mut answer),
                            truncated: false,
                            model_calls,
                            tool_calls,
                        })
                    } else if turn.turn_budget_remaining == 0 {
                        tracing::warn!(
                            target: TRACING_TARGET_ORCHESTRATOR,
                            model_calls,
                            requested = response.tool_calls.len(),
                            "Turn budget exhausted, ending turn"
                        );
                        producers.tokens.token(TRUNCATION_NOTICE).await?;
                        answer.push_str(TRUNCATION_NOTICE);
                        TurnState::Done(TurnOutcome {
                            answer: std::mem::take(&mut answer),
                            truncated: true,
                            model_calls,
                            tool_calls,
                        })
                    } else {
                        turn.turn_budget_remaining -= 1;
                        turn.push(Message::assistant_with_tools(
                            response.text,
                            response.tool_calls.clone(),
                        ));
                        TurnState::AwaitingToolResults(response.tool_calls)
                    }
                }
                TurnState::AwaitingToolResults(calls) => {
                    let results = self.run_tools(&calls, &catalog, producers, cancel).await;
                    if cancel.is_cancelled() {
                        return Err(Error::cancelled().with_message("turn cancelled during tool calls"));
                    }

                    tool_calls += u32::try_from(calls.len()).unwrap_or(u32::MAX);
                    for (call, result) in calls.iter().zip(&results) {
                        turn.push(Message::tool(&call.call_id, result.to_model_content()));
                    }
                    TurnState::AwaitingModel
                }
                TurnState::Done(outcome) => {
                    tracing::info!(
                        target: TRACING_TARGET_ORCHESTRATOR,
                        model_calls = outcome.model_calls,
                        tool_calls = outcome.tool_calls,
                        truncated = outcome.truncated,
                        "Turn finished"
                    );
                    return Ok(outcome);
                }
            };
        }
    }

    /// Streams one model response, forwarding token deltas as they arrive.
    async fn call_model(
        &self,
        request: CompletionRequest,
        producers: &Producers,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse> {
        let mut stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::cancelled()),
            stream = self.inner.model.stream(request) => stream?,
        };

        let mut response = ModelResponse {
            text: String::new(),
            tool_calls: Vec::new(),
        };

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::cancelled()),
                chunk = stream.next() => chunk,
            };

            match chunk.transpose()? {
                None | Some(ModelChunk::Final) => break,
                Some(ModelChunk::TokenDelta(text)) if text.is_empty() => {}
                Some(ModelChunk::TokenDelta(text)) => {
                    producers.tokens.token(text.as_str()).await?;
                    response.text.push_str(&text);
                }
                Some(ModelChunk::ToolCall(call)) => response.tool_calls.push(call),
            }
        }

        Ok(response)
    }

    /// Executes the tool calls of one model response.
    ///
    /// Calls naming a tool outside the turn's catalog, or carrying arguments
    /// that are not an object, are answered with a synthetic validation
    /// failure and never reach a provider. Results are in request order.
    async fn run_tools(
        &self,
        calls: &[ToolCallRequest],
        catalog: &[ToolDescriptor],
        producers: &Producers,
        cancel: &CancellationToken,
    ) -> Vec<ToolResult> {
        let dispatcher = &self.inner.dispatcher;
        let mut results: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let mut dispatched = Vec::new();
        let mut positions = Vec::new();

        for (index, call) in calls.iter().enumerate() {
            let rejection = if !catalog.iter().any(|tool| tool.name == call.tool_name) {
                Some(format!("unknown tool `{}`", call.tool_name))
            } else if !call.arguments.is_object() {
                Some(format!("arguments of `{}` must be a JSON object", call.tool_name))
            } else {
                None
            };

            match rejection {
                Some(message) => {
                    let invocation = dispatcher.invocation(&call.tool_name, Arguments::new());
                    let result = ToolResult::failure(
                        &invocation,
                        FailureKind::ValidationError,
                        message,
                        std::time::Duration::ZERO,
                    );
                    tracing::warn!(
                        target: TRACING_TARGET_ORCHESTRATOR,
                        invocation_id = %result.invocation_id,
                        tool = %call.tool_name,
                        outcome = "validation_error",
                        duration_ms = 0,
                        "Tool call rejected"
                    );
                    let _ = producers
                        .statuses
                        .started(&result.tool_name, result.invocation_id)
                        .await;
                    let _ = producers.statuses.finished(&result).await;
                    results[index] = Some(result);
                }
                None => {
                    dispatched.push(dispatcher.invocation(&call.tool_name, object(&call.arguments)));
                    positions.push(index);
                }
            }
        }

        if !dispatched.is_empty() {
            let batch = dispatcher
                .invoke_batch(dispatched, cancel, Some(&producers.statuses))
                .await;
            for (index, result) in positions.into_iter().zip(batch) {
                results[index] = Some(result);
            }
        }

        calls
            .iter()
            .zip(results)
            .map(|(call, result)| {
                result.unwrap_or_else(|| {
                    let invocation = ToolInvocation::new(
                        &call.tool_name,
                        Arguments::new(),
                        dispatcher.config().tool_timeout(),
                    );
                    ToolResult::failure(
                        &invocation,
                        FailureKind::Cancelled,
                        "tool call was not executed",
                        std::time::Duration::ZERO,
                    )
                })
            })
            .collect()
    }
}

fn object(value: &Value) -> Arguments {
    value.as_object().cloned().unwrap_or_default()
}
