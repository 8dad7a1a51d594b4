//! Tool dispatch: resolution, validation, timeouts and outcome classification.

mod config;

use std::sync::Arc;

pub use config::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_TOOL_TIMEOUT_SECS, DispatcherConfig};
use conduit_core::{
    Arguments, FailureKind, ProviderId, ProviderStatus, ToolInvocation, ToolOutcome, ToolResult,
};
use conduit_provider::ToolReply;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_DISPATCHER;
use crate::aggregator::EventSender;
use crate::health::HealthMonitor;
use crate::registry::CapabilityRegistry;

struct ToolDispatcherInner {
    registry: CapabilityRegistry,
    config: DispatcherConfig,
}

/// Executes tool invocations against their owning providers.
///
/// Every invocation yields exactly one [`ToolResult`] carrying its id;
/// failures are values, never errors. Outcomes other than validation
/// failures are fed to the health monitor.
///
/// This type is cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct ToolDispatcher {
    inner: Arc<ToolDispatcherInner>,
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ToolDispatcher {
    /// Creates a dispatcher resolving tools through `registry`.
    pub fn new(registry: CapabilityRegistry, config: DispatcherConfig) -> Self {
        Self {
            inner: Arc::new(ToolDispatcherInner { registry, config }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    fn health(&self) -> &HealthMonitor {
        self.inner.registry.health()
    }

    /// Creates an invocation with the configured timeout budget.
    pub fn invocation(&self, tool_name: impl Into<String>, arguments: Arguments) -> ToolInvocation {
        ToolInvocation::new(tool_name, arguments, self.inner.config.tool_timeout())
    }

    /// Executes one invocation.
    ///
    /// Returns within the invocation's timeout budget plus registry lookup
    /// time; a provider that does not answer in time yields `timeout`.
    pub async fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
        self.invoke_since(invocation, Instant::now()).await
    }

    /// Executes one invocation whose budget started running at `started`.
    async fn invoke_since(&self, invocation: ToolInvocation, started: Instant) -> ToolResult {
        let (result, provider) = self.execute(&invocation, started).await;
        log_outcome(&result, provider.as_ref());
        result
    }

    async fn execute(
        &self,
        invocation: &ToolInvocation,
        started: Instant,
    ) -> (ToolResult, Option<ProviderId>) {
        let resolved = match self.inner.registry.resolve(&invocation.tool_name).await {
            Ok(resolved) => resolved,
            Err(error) => {
                let result = ToolResult::failure(
                    invocation,
                    FailureKind::ValidationError,
                    error.message_or_kind(),
                    started.elapsed(),
                );
                return (result, None);
            }
        };

        let provider_id = resolved.provider.id().clone();

        if let Err(error) = resolved.descriptor.validate(&invocation.arguments) {
            let result = ToolResult::failure(
                invocation,
                FailureKind::ValidationError,
                error.message_or_kind(),
                started.elapsed(),
            );
            return (result, Some(provider_id));
        }

        let health = self.health();
        if health.status(&provider_id) == ProviderStatus::Unreachable {
            let message = format!("provider `{provider_id}` is unreachable");
            health.record_failure(&provider_id, &message);
            let result = ToolResult::failure(
                invocation,
                FailureKind::ProviderUnavailable,
                message,
                started.elapsed(),
            );
            return (result, Some(provider_id));
        }

        let call = resolved
            .provider
            .invoke(&invocation.tool_name, &invocation.arguments);

        let deadline = started + invocation.timeout_budget;
        let result = match tokio::time::timeout_at(deadline, call).await {
            Ok(Ok(ToolReply::Success { payload })) => {
                ToolResult::success(invocation, payload, started.elapsed())
            }
            Ok(Ok(ToolReply::Failure { message })) => ToolResult::failure(
                invocation,
                FailureKind::ProviderError,
                message,
                started.elapsed(),
            ),
            Ok(Err(error)) => ToolResult::from_error(invocation, &error, started.elapsed()),
            Err(_) => ToolResult::failure(
                invocation,
                FailureKind::Timeout,
                format!(
                    "`{}` did not answer within {}ms",
                    invocation.tool_name,
                    invocation.timeout_budget.as_millis()
                ),
                started.elapsed(),
            ),
        };

        match &result.outcome {
            ToolOutcome::Success { .. } => {
                health.record_success(&provider_id);
            }
            ToolOutcome::Failure { kind, message } if kind.affects_health() => {
                health.record_failure(&provider_id, message);
            }
            ToolOutcome::Failure { .. } => {}
        }

        (result, Some(provider_id))
    }

    /// Executes the invocations of one model response concurrently.
    ///
    /// `Started` statuses are sent for every invocation up front in request
    /// order; terminal statuses follow in completion order. At most
    /// `max_in_flight` calls run at once; time spent waiting for a slot
    /// counts against each invocation's timeout budget. Results are returned in request
    /// order once every call has finished; when `cancel` fires first, the
    /// unfinished calls are dropped and answered with `cancelled` results.
    pub async fn invoke_batch(
        &self,
        invocations: Vec<ToolInvocation>,
        cancel: &CancellationToken,
        statuses: Option<&EventSender>,
    ) -> Vec<ToolResult> {
        let batch_started = Instant::now();

        // Status delivery is best effort; a closed stream means the turn is
        // being cancelled, which the select below observes.
        if let Some(statuses) = statuses {
            for invocation in &invocations {
                let _ = statuses.started(&invocation.tool_name, invocation.id).await;
            }
        }

        let limit = Arc::new(Semaphore::new(self.inner.config.max_in_flight.max(1)));
        let mut slots: Vec<Option<ToolResult>> = vec![None; invocations.len()];

        let mut pending: FuturesUnordered<_> = invocations
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, invocation)| {
                let dispatcher = self.clone();
                let limit = limit.clone();
                async move {
                    let _permit = limit.acquire_owned().await;
                    (index, dispatcher.invoke_since(invocation, batch_started).await)
                }
            })
            .collect();

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                next = pending.next() => match next {
                    Some((index, result)) => {
                        if let Some(statuses) = statuses {
                            let _ = statuses.finished(&result).await;
                        }
                        slots[index] = Some(result);
                    }
                    None => break,
                },
            }
        }

        // Dropping the remaining futures abandons their provider calls.
        drop(pending);

        invocations
            .iter()
            .zip(slots)
            .map(|(invocation, slot)| {
                slot.unwrap_or_else(|| {
                    let result = ToolResult::failure(
                        invocation,
                        FailureKind::Cancelled,
                        "turn cancelled before the call completed",
                        batch_started.elapsed(),
                    );
                    log_outcome(&result, None);
                    result
                })
            })
            .collect()
    }
}

/// Emits the single log record of a finished invocation.
fn log_outcome(result: &ToolResult, provider: Option<&ProviderId>) {
    let provider = provider.map_or("-", ProviderId::as_str);

    match &result.outcome {
        ToolOutcome::Success { .. } => tracing::info!(
            target: TRACING_TARGET_DISPATCHER,
            invocation_id = %result.invocation_id,
            tool = %result.tool_name,
            provider,
            outcome = "success",
            duration_ms = result.duration_ms,
            "Tool invocation finished"
        ),
        ToolOutcome::Failure { kind, message } => tracing::warn!(
            target: TRACING_TARGET_DISPATCHER,
            invocation_id = %result.invocation_id,
            tool = %result.tool_name,
            provider,
            outcome = %kind,
            error = %message,
            duration_ms = result.duration_ms,
            "Tool invocation finished"
        ),
    }
}
