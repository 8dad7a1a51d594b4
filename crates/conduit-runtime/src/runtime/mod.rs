//! The runtime facade wiring every component together.

mod config;

use std::sync::Arc;
use std::time::Duration;

use conduit_core::{
    Arguments, DocumentDescriptor, FailureKind, Message, ProviderId, Result, StreamEvent,
    ToolResult,
};
use conduit_model::SharedModel;
use conduit_provider::SharedProvider;
pub use config::{DEFAULT_INGEST_TOOL, IngestionConfig, RuntimeConfig};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_RUNTIME;
use crate::aggregator::{self, DEFAULT_CHANNEL_CAPACITY};
use crate::dispatcher::ToolDispatcher;
use crate::health::HealthMonitor;
use crate::orchestrator::Orchestrator;
use crate::registry::{CapabilityRegistry, RegistrationOutcome};
use crate::session::SessionStore;

/// A running turn.
pub struct TurnHandle {
    pub session_id: String,
    /// Cancels the turn; the stream then ends with a `cancelled` error.
    pub cancel: CancellationToken,
    /// Ordered events of the turn, ending with exactly one terminal event.
    pub events: ReceiverStream<StreamEvent>,
}

impl std::fmt::Debug for TurnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnHandle")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

struct RuntimeInner {
    config: RuntimeConfig,
    registry: CapabilityRegistry,
    dispatcher: ToolDispatcher,
    orchestrator: Orchestrator,
    sessions: SessionStore,
    shutdown: CancellationToken,
}

/// Registry, health monitor, dispatcher, orchestrator and sessions of one process.
///
/// This type is cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("model", &self.inner.orchestrator.model_name())
            .field("sessions", &self.inner.sessions)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// Creates a runtime with no providers registered.
    ///
    /// # Errors
    ///
    /// Fails with `configuration` when `config` is invalid.
    pub fn new(model: SharedModel, config: RuntimeConfig) -> Result<Self> {
        config.validate()?;

        let health = HealthMonitor::new(config.health.clone());
        let registry = CapabilityRegistry::new(health);
        let dispatcher = ToolDispatcher::new(registry.clone(), config.dispatcher.clone());
        let orchestrator = Orchestrator::new(
            model,
            registry.clone(),
            dispatcher.clone(),
            config.orchestrator.clone(),
        );

        let sessions = SessionStore::with_capacity(config.sessions.max_sessions);

        tracing::info!(
            target: TRACING_TARGET_RUNTIME,
            model = orchestrator.model_name(),
            turn_budget = config.orchestrator.turn_budget,
            tool_timeout_secs = config.dispatcher.tool_timeout_secs,
            max_sessions = config.sessions.max_sessions,
            "Runtime created"
        );

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                config,
                registry,
                dispatcher,
                orchestrator,
                sessions,
                shutdown: CancellationToken::new(),
            }),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.inner.registry
    }

    pub fn health(&self) -> &HealthMonitor {
        self.inner.registry.health()
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.inner.dispatcher
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Returns the display name of the model.
    pub fn model_name(&self) -> &str {
        self.inner.orchestrator.model_name()
    }

    /// Registers a provider; see [`CapabilityRegistry::register`].
    pub async fn register(&self, provider: SharedProvider) -> Result<RegistrationOutcome> {
        self.inner.registry.register(provider).await
    }

    /// Re-discovers a provider's tools; see [`CapabilityRegistry::refresh`].
    pub async fn refresh(&self, id: &ProviderId) -> Result<RegistrationOutcome> {
        self.inner.registry.refresh(id).await
    }

    /// Starts a turn and returns its event stream.
    ///
    /// The turn runs in its own task; dropping the returned stream cancels
    /// it. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails with `turn_in_progress` when the session is already running a
    /// turn, and with `cancelled` after shutdown.
    pub fn start_turn(&self, session_id: &str, content: &str) -> Result<TurnHandle> {
        if self.inner.shutdown.is_cancelled() {
            return Err(conduit_core::Error::cancelled().with_message("runtime is shutting down"));
        }

        let cancel = self.inner.shutdown.child_token();
        let guard = self.inner.sessions.begin_turn(session_id, cancel.clone())?;

        let window = self.inner.config.orchestrator.history_window;
        let history = self.inner.sessions.recent(session_id, window);
        let turn = self.inner.orchestrator.turn(session_id, history, content);

        let (producers, consumer, events) = aggregator::pipeline(DEFAULT_CHANNEL_CAPACITY, cancel.clone());

        tracing::info!(
            target: TRACING_TARGET_RUNTIME,
            session_id,
            history = turn.context.len(),
            "Turn started"
        );

        let orchestrator = self.inner.orchestrator.clone();
        let producer_cancel = cancel.clone();
        let content = content.to_owned();
        let producer = tokio::spawn(async move {
            let outcome = orchestrator.run_turn(turn, &producers, &producer_cancel).await?;
            guard.append([Message::user(content), Message::assistant(outcome.answer.clone())]);
            Ok(outcome)
        });

        tokio::spawn(consumer.run(producer));

        Ok(TurnHandle {
            session_id: session_id.to_owned(),
            cancel,
            events,
        })
    }

    /// Cancels the running turn of a session; returns whether one was running.
    pub fn cancel(&self, session_id: &str) -> bool {
        self.inner.sessions.cancel(session_id)
    }

    /// Returns the stored history of a session.
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        self.inner.sessions.history(session_id)
    }

    /// Hands an extracted document to the ingestion tool of the session.
    ///
    /// The call goes through the dispatcher like any tool call. A document
    /// without chunks is rejected without reaching a provider.
    pub async fn ingest_document(&self, session_id: &str, document: &DocumentDescriptor) -> ToolResult {
        let tool = &self.inner.config.ingestion.ingest_tool;
        let invocation = self
            .inner
            .dispatcher
            .invocation(tool, document.to_ingest_arguments(session_id));

        if document.extracted_chunks.is_empty() {
            tracing::warn!(
                target: TRACING_TARGET_RUNTIME,
                session_id,
                invocation_id = %invocation.id,
                document_id = %document.document_id,
                "Rejected document without chunks"
            );
            return ToolResult::failure(
                &invocation,
                FailureKind::ValidationError,
                format!("document `{}` has no extracted chunks", document.document_id),
                Duration::ZERO,
            );
        }

        tracing::info!(
            target: TRACING_TARGET_RUNTIME,
            session_id,
            document_id = %document.document_id,
            chunks = document.extracted_chunks.len(),
            "Ingesting document"
        );

        self.inner.dispatcher.invoke(invocation).await
    }

    /// Invokes a single tool outside any conversation.
    pub async fn invoke_tool(&self, tool_name: &str, arguments: Arguments) -> ToolResult {
        let invocation = self.inner.dispatcher.invocation(tool_name, arguments);
        self.inner.dispatcher.invoke(invocation).await
    }

    /// Spawns the periodic health probes, stopped by [`Runtime::shutdown`].
    pub fn spawn_health_probes(&self) -> JoinHandle<()> {
        self.health().spawn(self.inner.shutdown.child_token())
    }

    /// Cancels health probes and every running turn.
    pub fn shutdown(&self) {
        tracing::info!(target: TRACING_TARGET_RUNTIME, "Shutting down runtime");
        self.inner.shutdown.cancel();
    }

    /// Returns whether [`Runtime::shutdown`] was called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use conduit_core::{
        ErrorKind, ParameterField, ParameterSchema, ParameterType, ProviderKind, ProviderStatus,
        ToolCallRequest, ToolDescriptor, ToolPhase,
    };
    use conduit_model::ModelChunk;
    use conduit_model::mock::{Script, ScriptedModel};
    use conduit_provider::ToolReply;
    use conduit_provider::mock::{self, MockProvider};
    use futures::StreamExt;
    use serde_json::json;

    use super::*;
    use crate::dispatcher::DispatcherConfig;
    use crate::orchestrator::OrchestratorConfig;

    fn search_tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "Search").with_parameters(ParameterSchema::new(vec![
            ParameterField::required("query", ParameterType::String),
        ]))
    }

    fn runtime(model: &ScriptedModel, config: RuntimeConfig) -> Runtime {
        Runtime::new(Arc::new(model.clone()), config).unwrap()
    }

    async fn collect(handle: TurnHandle) -> Vec<StreamEvent> {
        handle.events.collect().await
    }

    fn tokens(events: &[StreamEvent]) -> String {
        events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::TokenDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn assert_single_terminal(events: &[StreamEvent]) {
        let terminals = events.iter().filter(|event| event.is_terminal()).count();
        assert_eq!(terminals, 1, "events: {events:?}");
        assert!(events.last().is_some_and(StreamEvent::is_terminal));
    }

    #[tokio::test]
    async fn tool_names_stay_unique_across_providers() {
        let runtime = runtime(&ScriptedModel::new("m"), RuntimeConfig::default());
        let declarations: [(&str, &[&str]); 4] = [
            ("database", &["save_message", "get_chat_history"]),
            ("vector", &["search_documents", "save_message"]),
            ("image", &["generate_image"]),
            ("web", &["web_search", "generate_image"]),
        ];

        for (id, tools) in declarations {
            let provider = tools.iter().fold(
                MockProvider::new(id, ProviderKind::Storage),
                |provider, tool| provider.with_tool(search_tool(tool), mock::echo()),
            );
            let _ = runtime.register(Arc::new(provider)).await;
        }

        let names: Vec<_> = runtime
            .registry()
            .list_tools()
            .await
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(names.len(), unique.len());
        assert_eq!(names, ["save_message", "get_chat_history", "generate_image"]);
    }

    #[tokio::test]
    async fn token_deltas_concatenate_to_the_answer() {
        let model = ScriptedModel::new("m").with_script(Script::tokens(["The ", "answer ", "is 42."]));
        let runtime = runtime(&model, RuntimeConfig::default());

        let events = collect(runtime.start_turn("s", "question").unwrap()).await;
        assert_eq!(tokens(&events), "The answer is 42.");
        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert_single_terminal(&events);
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_tool_calls_scenario() {
        let vector = MockProvider::new("vector", ProviderKind::VectorSearch).with_tool(
            search_tool("search_documents"),
            mock::delayed(Duration::from_millis(500), ToolReply::success(json!("Q3 revenue up"))),
        );
        let image = MockProvider::new("image", ProviderKind::ImageSynthesis).with_tool(
            search_tool("search_images"),
            mock::delayed(Duration::from_millis(100), ToolReply::success(json!("chart.png"))),
        );
        let model = ScriptedModel::new("m")
            .with_script(Script::tool_calls([
                ToolCallRequest::new("call_docs", "search_documents", json!({"query": "revenue"})),
                ToolCallRequest::new("call_images", "search_images", json!({"query": "revenue chart"})),
            ]))
            .with_script(Script::tokens(["Revenue ", "is up."]));
        let runtime = runtime(&model, RuntimeConfig::default());
        runtime.register(Arc::new(vector)).await.unwrap();
        runtime.register(Arc::new(image)).await.unwrap();

        let started = tokio::time::Instant::now();
        let events = collect(runtime.start_turn("s", "revenue?").unwrap()).await;
        // Concurrent: bounded by the slower call, not the sum.
        assert!(started.elapsed() < Duration::from_millis(600));

        let shape: Vec<_> = events
            .iter()
            .map(|event| match event {
                StreamEvent::ToolStatus { tool_name, phase, .. } => format!("{tool_name}:{phase}"),
                other => other.event_type().to_owned(),
            })
            .collect();
        assert_eq!(
            shape,
            [
                "search_documents:started",
                "search_images:started",
                "search_images:succeeded",
                "search_documents:succeeded",
                "token_delta",
                "token_delta",
                "done",
            ]
        );

        // Both results are in the history of the second model call.
        let second = &model.requests()[1];
        let tool_messages: Vec<_> = second
            .messages
            .iter()
            .filter_map(|message| message.tool_call_id.as_deref())
            .collect();
        assert_eq!(tool_messages, ["call_docs", "call_images"]);
    }

    #[tokio::test]
    async fn unknown_tool_scenario_leaves_health_untouched() {
        let provider = MockProvider::new("vector", ProviderKind::VectorSearch)
            .with_tool(search_tool("search_documents"), mock::echo());
        let model = ScriptedModel::new("m")
            .with_script(Script::tool_calls([ToolCallRequest::new(
                "call_1",
                "delete_everything",
                json!({}),
            )]))
            .with_script(Script::text("That tool does not exist."));
        let runtime = runtime(&model, RuntimeConfig::default());
        runtime.register(Arc::new(provider.clone())).await.unwrap();
        let before = runtime.health().record(&"vector".into());

        let events = collect(runtime.start_turn("s", "delete everything").unwrap()).await;

        assert_eq!(provider.invocation_count(), 0);
        assert_eq!(runtime.health().record(&"vector".into()), before);
        assert!(events.iter().any(|event| matches!(
            event,
            StreamEvent::ToolStatus { phase: ToolPhase::Failed, tool_name, .. } if tool_name == "delete_everything"
        )));
        assert_eq!(events.last(), Some(&StreamEvent::Done));

        let feedback = model.requests()[1].messages.last().cloned().unwrap();
        assert!(feedback.content.contains("validation_error"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_remove_provider_from_next_catalog() {
        let image = MockProvider::new("image", ProviderKind::ImageSynthesis).with_tool(
            search_tool("generate_image"),
            mock::delayed(Duration::from_secs(120), ToolReply::success(json!("late"))),
        );
        let web = MockProvider::new("web", ProviderKind::WebSearch)
            .with_tool(search_tool("web_search"), mock::echo());
        let model = ScriptedModel::new("m").with_script(Script::text("ok"));
        let config = RuntimeConfig::default()
            .with_dispatcher(DispatcherConfig::default().with_tool_timeout(Duration::from_secs(1)));
        let runtime = runtime(&model, config);
        runtime.register(Arc::new(image.clone())).await.unwrap();
        runtime.register(Arc::new(web)).await.unwrap();

        let id = ProviderId::from("image");
        for expected in [1, 2, 3] {
            let result = runtime.invoke_tool("generate_image", object(json!({"query": "cat"}))).await;
            assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
            assert_eq!(runtime.health().record(&id).unwrap().consecutive_failures, expected);
        }
        assert_eq!(runtime.health().status(&id), ProviderStatus::Unreachable);

        collect(runtime.start_turn("s", "draw").unwrap()).await;
        let offered: Vec<_> = model.requests()[0].tools.iter().map(|tool| tool.name.clone()).collect();
        assert_eq!(offered, ["web_search"]);

        // A successful probe brings it back.
        runtime.health().probe_all().await;
        assert_eq!(runtime.health().status(&id), ProviderStatus::Healthy);
        collect(runtime.start_turn("s", "draw again").unwrap()).await;
        assert_eq!(model.requests()[1].tools.len(), 2);
    }

    #[tokio::test]
    async fn call_failures_reach_unreachable_and_probe_recovers() {
        let provider = MockProvider::new("web", ProviderKind::WebSearch)
            .with_tool(search_tool("web_search"), mock::failing(ErrorKind::ProviderError));
        let runtime = runtime(&ScriptedModel::new("m"), RuntimeConfig::default());
        runtime.register(Arc::new(provider.clone())).await.unwrap();
        let id = ProviderId::from("web");

        let threshold = runtime.config().health.unreachable_after;
        for _ in 0..threshold {
            runtime.invoke_tool("web_search", object(json!({"query": "x"}))).await;
        }
        assert_eq!(runtime.health().status(&id), ProviderStatus::Unreachable);
        assert!(runtime.registry().catalog().await.is_empty());

        runtime.health().probe_all().await;
        assert_eq!(runtime.health().status(&id), ProviderStatus::Healthy);
        assert_eq!(runtime.registry().catalog().await.len(), 1);
    }

    #[tokio::test]
    async fn endless_tool_requests_end_at_the_budget() {
        let provider = MockProvider::new("web", ProviderKind::WebSearch)
            .with_tool(search_tool("web_search"), mock::echo());
        let model = ScriptedModel::new("m").with_script(Script::tool_calls([ToolCallRequest::new(
            "c",
            "web_search",
            json!({"query": "again"}),
        )]));
        let config = RuntimeConfig::default()
            .with_orchestrator(OrchestratorConfig::default().with_turn_budget(3));
        let runtime = runtime(&model, config);
        runtime.register(Arc::new(provider.clone())).await.unwrap();

        let events = collect(runtime.start_turn("s", "loop").unwrap()).await;

        assert_eq!(events.last(), Some(&StreamEvent::Done));
        assert!(tokens(&events).ends_with(crate::orchestrator::TRUNCATION_NOTICE));
        assert_eq!(model.requests().len(), 4);
        assert_eq!(provider.invocation_count(), 3);
        assert_single_terminal(&events);
    }

    #[tokio::test]
    async fn producer_panic_yields_one_error_event() {
        let model = ScriptedModel::new("m").with_script(Script::Panic(vec![ModelChunk::TokenDelta(
            "partial".into(),
        )]));
        let runtime = runtime(&model, RuntimeConfig::default());

        let events = collect(runtime.start_turn("s", "crash").unwrap()).await;

        assert_eq!(events.first(), Some(&StreamEvent::token("partial")));
        assert_eq!(
            events.last(),
            Some(&StreamEvent::error(ErrorKind::Internal, "turn producer crashed"))
        );
        assert_single_terminal(&events);

        // The session is usable again.
        assert!(!runtime.sessions().is_busy("s"));
        assert!(runtime.history("s").is_empty());
    }

    #[tokio::test]
    async fn model_failure_mid_stream_is_reported() {
        let model = ScriptedModel::new("m").with_script(Script::fail_mid_stream(
            vec![ModelChunk::TokenDelta("half".into())],
            "connection reset",
        ));
        let runtime = runtime(&model, RuntimeConfig::default());

        let events = collect(runtime.start_turn("s", "hi").unwrap()).await;
        assert_eq!(events[0], StreamEvent::token("half"));
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
        assert_single_terminal(&events);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_session_spares_other_sessions() {
        let slow = MockProvider::new("web", ProviderKind::WebSearch).with_tool(
            search_tool("web_search"),
            mock::delayed(Duration::from_secs(10), ToolReply::success(json!("done"))),
        );
        // Both sessions share the model, so every response requests the tool;
        // session `b` ends at its turn budget.
        let model = ScriptedModel::new("m").with_script(Script::tool_calls([ToolCallRequest::new(
            "c",
            "web_search",
            json!({"query": "slow"}),
        )]));
        let runtime = runtime(&model, RuntimeConfig::default());
        runtime.register(Arc::new(slow.clone())).await.unwrap();

        let mut doomed = runtime.start_turn("a", "search").unwrap();
        let survivor = runtime.start_turn("b", "search").unwrap();

        // Wait until the tool call of session `a` is running.
        loop {
            match doomed.events.next().await {
                Some(StreamEvent::ToolStatus { phase: ToolPhase::Started, .. }) => break,
                Some(_) => continue,
                None => panic!("stream ended early"),
            }
        }
        assert!(runtime.cancel("a"));

        let rest: Vec<_> = doomed.events.collect().await;
        assert_eq!(rest.last(), Some(&StreamEvent::error(ErrorKind::Cancelled, "turn cancelled")));
        assert_single_terminal(&rest);

        let other = collect(survivor).await;
        assert_eq!(other.last(), Some(&StreamEvent::Done));
        assert!(runtime.history("a").is_empty());
        assert_eq!(runtime.history("b").len(), 2);
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_turn() {
        let model = ScriptedModel::new("m").with_script(Script::Pending(vec![ModelChunk::TokenDelta(
            "waiting".into(),
        )]));
        let runtime = runtime(&model, RuntimeConfig::default());

        let handle = runtime.start_turn("s", "hi").unwrap();
        let cancel = handle.cancel.clone();
        let mut events = handle.events;
        assert_eq!(events.next().await, Some(StreamEvent::token("waiting")));
        drop(events);

        cancel.cancelled().await;
        while runtime.sessions().is_busy("s") {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn one_turn_at_a_time_per_session() {
        let model = ScriptedModel::new("m").with_script(Script::Pending(Vec::new()));
        let runtime = runtime(&model, RuntimeConfig::default());

        let first = runtime.start_turn("s", "one").unwrap();
        let error = runtime.start_turn("s", "two").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::TurnInProgress);

        first.cancel.cancel();
        let events = collect(first).await;
        assert!(matches!(events.last(), Some(StreamEvent::Error { kind: ErrorKind::Cancelled, .. })));
    }

    #[tokio::test]
    async fn history_is_windowed_and_extended() {
        let model = ScriptedModel::new("m")
            .with_script(Script::text("first answer"))
            .with_script(Script::text("second answer"))
            .with_script(Script::text("third answer"));
        let config = RuntimeConfig::default()
            .with_orchestrator(OrchestratorConfig::default().with_history_window(2));
        let runtime = runtime(&model, config);

        for question in ["one", "two", "three"] {
            collect(runtime.start_turn("s", question).unwrap()).await;
        }

        let history: Vec<_> = runtime.history("s").into_iter().map(|m| m.content).collect();
        assert_eq!(history, ["one", "first answer", "two", "second answer", "three", "third answer"]);

        // System prompt, two prior messages, then the user message.
        let third: Vec<_> = model.requests()[2]
            .messages
            .iter()
            .map(|message| message.content.clone())
            .collect();
        assert_eq!(third[1..], ["two", "second answer", "three"]);
    }

    #[tokio::test]
    async fn ingestion_goes_through_the_dispatcher() {
        let vector = MockProvider::new("vector", ProviderKind::VectorSearch).with_tool(
            ToolDescriptor::new(DEFAULT_INGEST_TOOL, "Add documents").with_parameters(
                ParameterSchema::new(vec![
                    ParameterField::required("session_id", ParameterType::String),
                    ParameterField::required("filename", ParameterType::String),
                    ParameterField::required("documents", ParameterType::Array),
                ]),
            ),
            mock::echo(),
        );
        let runtime = runtime(&ScriptedModel::new("m"), RuntimeConfig::default());
        runtime.register(Arc::new(vector.clone())).await.unwrap();

        let document = DocumentDescriptor {
            document_id: "report.pdf".into(),
            extracted_chunks: vec!["intro".into(), "results".into()],
        };
        let result = runtime.ingest_document("s-9", &document).await;
        let conduit_core::ToolOutcome::Success { payload } = &result.outcome else {
            panic!("ingestion failed: {result:?}");
        };
        assert_eq!(payload["session_id"], "s-9");
        assert_eq!(payload["documents"][1]["text"], "results");

        let empty = DocumentDescriptor {
            document_id: "blank.pdf".into(),
            extracted_chunks: Vec::new(),
        };
        let result = runtime.ingest_document("s-9", &empty).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::ValidationError));
        assert_eq!(vector.invocation_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_new_turns() {
        let runtime = runtime(&ScriptedModel::new("m"), RuntimeConfig::default());
        runtime.shutdown();
        assert!(runtime.is_shut_down());
        assert_eq!(runtime.start_turn("s", "hi").unwrap_err().kind(), ErrorKind::Cancelled);
    }

    fn object(value: serde_json::Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }
}
