//! Conversion of runtime errors and tool failures into HTTP errors.

use conduit_core::{ErrorKind as RuntimeErrorKind, FailureKind};

use super::http_error::{Error as HttpError, ErrorKind};
use crate::TRACING_TARGET_ERROR;

impl From<RuntimeErrorKind> for ErrorKind {
    fn from(kind: RuntimeErrorKind) -> Self {
        match kind {
            RuntimeErrorKind::UnknownTool | RuntimeErrorKind::UnknownProvider => Self::NotFound,
            RuntimeErrorKind::DuplicateTool
            | RuntimeErrorKind::DuplicateProvider
            | RuntimeErrorKind::TurnInProgress => Self::Conflict,
            RuntimeErrorKind::ValidationError => Self::BadRequest,
            RuntimeErrorKind::ProviderUnavailable | RuntimeErrorKind::ModelUnavailable => {
                Self::ServiceUnavailable
            }
            RuntimeErrorKind::Timeout => Self::GatewayTimeout,
            RuntimeErrorKind::ProviderError
            | RuntimeErrorKind::MalformedResponse
            | RuntimeErrorKind::Cancelled
            | RuntimeErrorKind::Configuration
            | RuntimeErrorKind::Serialization
            | RuntimeErrorKind::Internal => Self::InternalServerError,
        }
    }
}

impl From<FailureKind> for ErrorKind {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::ValidationError => Self::BadRequest,
            FailureKind::Timeout => Self::GatewayTimeout,
            FailureKind::ProviderUnavailable => Self::ServiceUnavailable,
            FailureKind::ProviderError | FailureKind::Cancelled => Self::InternalServerError,
        }
    }
}

impl From<conduit_core::Error> for HttpError<'static> {
    fn from(error: conduit_core::Error) -> Self {
        let kind = ErrorKind::from(error.kind());

        if kind == ErrorKind::InternalServerError {
            tracing::error!(
                target: TRACING_TARGET_ERROR,
                error = %error,
                error_kind = error.kind_str(),
                "runtime operation failed"
            );
        } else {
            tracing::warn!(
                target: TRACING_TARGET_ERROR,
                error = %error,
                error_kind = error.kind_str(),
                "runtime operation rejected"
            );
        }

        kind.with_message(error.message_or_kind().to_owned())
            .with_context(error.kind_str())
    }
}
