//! Client-facing stream events.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, IntoStaticStr};

use crate::ErrorKind;
use crate::invocation::{InvocationId, ToolResult};

/// Phase of a tool call as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, IntoStaticStr, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Started,
    Succeeded,
    Failed,
}

impl ToolPhase {
    /// Returns the terminal phase matching a result.
    pub fn of(result: &ToolResult) -> Self {
        if result.is_success() {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}

/// One event of a turn's ordered output stream.
///
/// A stream ends with exactly one [`StreamEvent::Done`] or
/// [`StreamEvent::Error`], and nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TokenDelta {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolStatus {
        tool_name: String,
        invocation_id: InvocationId,
        phase: ToolPhase,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    Done,
}

impl StreamEvent {
    /// Creates a token delta event.
    pub fn token(text: impl Into<String>) -> Self {
        Self::TokenDelta { text: text.into() }
    }

    /// Creates an error event.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Returns the event name used by framed transports.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TokenDelta { .. } => "token_delta",
            Self::ToolStatus { .. } => "tool_status",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// Returns whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let value = serde_json::to_value(StreamEvent::token("hi")).unwrap();
        assert_eq!(value, serde_json::json!({"type": "token_delta", "text": "hi"}));

        let value = serde_json::to_value(StreamEvent::Done).unwrap();
        assert_eq!(value, serde_json::json!({"type": "done"}));

        let id = InvocationId::new();
        let value = serde_json::to_value(StreamEvent::ToolStatus {
            tool_name: "web_search".into(),
            invocation_id: id,
            phase: ToolPhase::Started,
        })
        .unwrap();
        assert_eq!(value["toolName"], "web_search");
        assert_eq!(value["phase"], "started");
    }

    #[test]
    fn only_done_and_error_are_terminal() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::error(ErrorKind::Cancelled, "gone").is_terminal());
        assert!(!StreamEvent::token("x").is_terminal());
        assert_eq!(StreamEvent::Done.event_type(), "done");
    }
}
