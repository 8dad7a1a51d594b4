#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for session and streaming handlers.
pub const TRACING_TARGET_SESSIONS: &str = "conduit_server::handler::sessions";

/// Tracing target for catalog and provider handlers.
pub const TRACING_TARGET_CATALOG: &str = "conduit_server::handler::catalog";

/// Tracing target for conversions of runtime errors into responses.
pub const TRACING_TARGET_ERROR: &str = "conduit_server::handler::error";

/// Tracing target for request extraction failures.
pub const TRACING_TARGET_EXTRACT: &str = "conduit_server::extract";

pub mod extract;
pub mod handler;
pub mod middleware;
pub mod service;
