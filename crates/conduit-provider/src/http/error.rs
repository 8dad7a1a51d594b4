//! Internal error types for the HTTP transport.

use thiserror::Error;

use super::rpc::RpcError;

/// Result type alias for transport operations.
pub(crate) type Result<T> = std::result::Result<T, Error>;

/// Internal error type for transport operations.
#[derive(Debug, Error)]
pub(crate) enum Error {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// The response body did not have the expected shape.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// The provider answered with a JSON-RPC error object.
    #[error("JSON-RPC error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),
    /// The response carried neither `result` nor `error`.
    #[error("JSON-RPC response without result")]
    MissingResult,
}

impl From<Error> for conduit_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Reqwest(e) => {
                if e.is_timeout() {
                    conduit_core::Error::timeout()
                        .with_message("Provider request timed out")
                        .with_source(e)
                } else if e.is_connect() {
                    conduit_core::Error::provider_unavailable()
                        .with_message("Connection failed")
                        .with_source(e)
                } else if e.is_decode() {
                    conduit_core::Error::malformed_response()
                        .with_message(e.to_string())
                        .with_source(e)
                } else {
                    conduit_core::Error::provider_error()
                        .with_message(e.to_string())
                        .with_source(e)
                }
            }
            Error::Serde(e) => conduit_core::Error::malformed_response()
                .with_message(e.to_string())
                .with_source(e),
            Error::Rpc(e) => conduit_core::Error::provider_error()
                .with_message(format!("{} (code {})", e.message, e.code)),
            err @ Error::MissingResult => {
                conduit_core::Error::malformed_response().with_message(err.to_string())
            }
        }
    }
}
