//! Tool invocations and their results.

use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::tool::Arguments;
use crate::{Error, ErrorKind};

/// Unique identifier of a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(derive_more::Display, derive_more::From, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a new time-ordered identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

/// A request to execute one tool, created when the model asks for it.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: InvocationId,
    pub tool_name: String,
    pub arguments: Arguments,
    pub requested_at: Timestamp,
    pub timeout_budget: Duration,
}

impl ToolInvocation {
    /// Creates an invocation with a fresh id.
    pub fn new(tool_name: impl Into<String>, arguments: Arguments, timeout_budget: Duration) -> Self {
        Self {
            id: InvocationId::new(),
            tool_name: tool_name.into(),
            arguments,
            requested_at: Timestamp::now(),
            timeout_budget,
        }
    }
}

/// Classification of a failed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Arguments rejected before dispatch, including unknown tool names.
    ValidationError,
    Timeout,
    /// The provider answered with an error.
    ProviderError,
    /// The provider is unreachable; no call was attempted or it could not connect.
    ProviderUnavailable,
    /// The owning session was cancelled while the call was in flight.
    Cancelled,
}

impl FailureKind {
    /// Returns whether this failure says something about provider health.
    pub fn affects_health(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::ProviderError | Self::ProviderUnavailable
        )
    }
}

impl From<ErrorKind> for FailureKind {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::ValidationError | ErrorKind::UnknownTool => Self::ValidationError,
            ErrorKind::Timeout => Self::Timeout,
            ErrorKind::ProviderUnavailable | ErrorKind::UnknownProvider => {
                Self::ProviderUnavailable
            }
            ErrorKind::Cancelled => Self::Cancelled,
            _ => Self::ProviderError,
        }
    }
}

/// Outcome of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: Value },
    Failure { kind: FailureKind, message: String },
}

/// The single answer to a [`ToolInvocation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub invocation_id: InvocationId,
    pub tool_name: String,
    pub outcome: ToolOutcome,
    pub duration_ms: u64,
}

impl ToolResult {
    /// Creates a successful result.
    pub fn success(invocation: &ToolInvocation, payload: Value, duration: Duration) -> Self {
        Self {
            invocation_id: invocation.id,
            tool_name: invocation.tool_name.clone(),
            outcome: ToolOutcome::Success { payload },
            duration_ms: duration_ms(duration),
        }
    }

    /// Creates a failed result.
    pub fn failure(
        invocation: &ToolInvocation,
        kind: FailureKind,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            invocation_id: invocation.id,
            tool_name: invocation.tool_name.clone(),
            outcome: ToolOutcome::Failure {
                kind,
                message: message.into(),
            },
            duration_ms: duration_ms(duration),
        }
    }

    /// Creates a failed result from a structured error.
    pub fn from_error(invocation: &ToolInvocation, error: &Error, duration: Duration) -> Self {
        Self::failure(
            invocation,
            error.kind().into(),
            error.message_or_kind(),
            duration,
        )
    }

    /// Returns whether the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    /// Returns the failure kind, if the call failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Renders the result as the content of a tool message fed back to the model.
    pub fn to_model_content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { payload: Value::String(text) } => text.clone(),
            ToolOutcome::Success { payload } => payload.to_string(),
            ToolOutcome::Failure { kind, message } => {
                serde_json::json!({ "error": kind, "message": message }).to_string()
            }
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
