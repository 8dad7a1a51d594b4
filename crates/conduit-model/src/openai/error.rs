//! Internal error types for the completions client.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for client operations.
pub(crate) type Result<T> = std::result::Result<T, Error>;

/// Internal error type for client operations.
#[derive(Debug, Error)]
pub(crate) enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("model endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl From<Error> for conduit_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                let message = if e.is_timeout() {
                    "Model request timed out".to_owned()
                } else if e.is_connect() {
                    "Connection to model endpoint failed".to_owned()
                } else {
                    e.to_string()
                };
                conduit_core::Error::model_unavailable()
                    .with_message(message)
                    .with_source(e)
            }
            err @ Error::Status { .. } => {
                conduit_core::Error::model_unavailable().with_message(err.to_string())
            }
        }
    }
}
