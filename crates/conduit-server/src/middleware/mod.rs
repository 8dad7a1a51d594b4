//! Middleware for `axum::Router` and HTTP request processing.
//!
//! - Observability: request ids, tracing spans, sensitive header redaction
//! - Recovery: panics, timeouts and tower errors become JSON errors
//! - Security: CORS
//! - OpenAPI documentation with Scalar UI

mod observability;
mod recovery;
mod security;
mod specification;

pub use observability::RouterObservabilityExt;
pub use recovery::{DEFAULT_REQUEST_TIMEOUT_SECS, RecoveryConfig, RouterRecoveryExt};
pub use security::{CorsConfig, RouterSecurityExt};
pub use specification::{OpenApiConfig, RouterOpenApiExt};

/// Tracing target for recovered middleware errors.
pub const TRACING_TARGET_RECOVERY: &str = "conduit_server::middleware::recovery";
