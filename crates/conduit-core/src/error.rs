//! Common error type definitions.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
///
/// Used as the source of structured errors so that transport errors
/// (`reqwest`, `serde_json`, ...) can be kept without leaking their types.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our custom Error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Categories of errors that can occur in conduit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(AsRefStr, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Two providers declare the same tool name.
    DuplicateTool,
    /// A provider with the same id is already registered.
    DuplicateProvider,
    /// No registered provider declares the requested tool.
    UnknownTool,
    /// No provider is registered under the requested id.
    UnknownProvider,
    /// Arguments do not satisfy a declared parameter schema.
    ValidationError,
    /// An operation exceeded its time budget.
    Timeout,
    /// The provider responded with an error.
    ProviderError,
    /// The provider cannot be reached.
    ProviderUnavailable,
    /// A provider or model returned a payload that could not be understood.
    MalformedResponse,
    /// The language model cannot be reached.
    ModelUnavailable,
    /// The session already has a turn in flight.
    TurnInProgress,
    /// The operation was cancelled by the caller.
    Cancelled,
    /// Invalid configuration.
    Configuration,
    /// Serialization/deserialization error.
    Serialization,
    /// Internal error, including crashed producers.
    Internal,
}

/// A structured error type for conduit operations.
#[derive(Debug, Error)]
#[error("{kind}{}", message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional error message.
    pub message: Option<String>,
    /// Optional source error.
    #[source]
    pub source: Option<BoxedError>,
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a source error to this error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Creates a new duplicate tool error.
    pub fn duplicate_tool(name: &str) -> Self {
        Self::new(ErrorKind::DuplicateTool).with_message(format!("tool `{name}` is already declared"))
    }

    /// Creates a new duplicate provider error.
    pub fn duplicate_provider(id: &str) -> Self {
        Self::new(ErrorKind::DuplicateProvider)
            .with_message(format!("provider `{id}` is already registered"))
    }

    /// Creates a new unknown tool error.
    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorKind::UnknownTool).with_message(format!("no provider declares tool `{name}`"))
    }

    /// Creates a new unknown provider error.
    pub fn unknown_provider(id: &str) -> Self {
        Self::new(ErrorKind::UnknownProvider)
            .with_message(format!("provider `{id}` is not registered"))
    }

    /// Creates a new validation error.
    pub fn validation() -> Self {
        Self::new(ErrorKind::ValidationError)
    }

    /// Creates a new timeout error.
    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout)
    }

    /// Creates a new provider error.
    pub fn provider_error() -> Self {
        Self::new(ErrorKind::ProviderError)
    }

    /// Creates a new provider unavailable error.
    pub fn provider_unavailable() -> Self {
        Self::new(ErrorKind::ProviderUnavailable)
    }

    /// Creates a new malformed response error.
    pub fn malformed_response() -> Self {
        Self::new(ErrorKind::MalformedResponse)
    }

    /// Creates a new model unavailable error.
    pub fn model_unavailable() -> Self {
        Self::new(ErrorKind::ModelUnavailable)
    }

    /// Creates a new turn-in-progress error.
    pub fn turn_in_progress() -> Self {
        Self::new(ErrorKind::TurnInProgress)
    }

    /// Creates a new cancelled error.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled)
    }

    /// Creates a new configuration error.
    pub fn configuration() -> Self {
        Self::new(ErrorKind::Configuration)
    }

    /// Creates a new serialization error.
    pub fn serialization() -> Self {
        Self::new(ErrorKind::Serialization)
    }

    /// Creates a new internal error.
    pub fn internal() -> Self {
        Self::new(ErrorKind::Internal)
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error kind as a string.
    pub fn kind_str(&self) -> &'static str {
        self.kind.into()
    }

    /// Returns the message, falling back to the kind name.
    pub fn message_or_kind(&self) -> &str {
        self.message.as_deref().unwrap_or_else(|| self.kind.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization()
            .with_message(err.to_string())
            .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let error = Error::unknown_tool("delete_everything");
        let display = error.to_string();
        assert!(display.starts_with("unknown_tool"));
        assert!(display.contains("delete_everything"));
    }

    #[test]
    fn display_without_message() {
        assert_eq!(Error::timeout().to_string(), "timeout");
    }

    #[test]
    fn kind_round_trips_through_strum() {
        let kind: ErrorKind = "provider_unavailable".parse().unwrap();
        assert_eq!(kind, ErrorKind::ProviderUnavailable);
        assert_eq!(kind.as_ref(), "provider_unavailable");
    }

    #[test]
    fn serde_json_errors_map_to_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error = Error::from(err);
        assert_eq!(error.kind(), ErrorKind::Serialization);
        assert!(std::error::Error::source(&error).is_some());
    }
}
