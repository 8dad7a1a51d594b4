#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for registry operations.
pub const TRACING_TARGET_REGISTRY: &str = "conduit_runtime::registry";

/// Tracing target for health probes and status transitions.
pub const TRACING_TARGET_HEALTH: &str = "conduit_runtime::health";

/// Tracing target for tool invocation outcomes.
pub const TRACING_TARGET_DISPATCHER: &str = "conduit_runtime::dispatcher";

/// Tracing target for the event stream.
pub const TRACING_TARGET_AGGREGATOR: &str = "conduit_runtime::aggregator";

/// Tracing target for turn progress.
pub const TRACING_TARGET_ORCHESTRATOR: &str = "conduit_runtime::orchestrator";

/// Tracing target for session lifecycle.
pub const TRACING_TARGET_SESSION: &str = "conduit_runtime::session";

/// Tracing target for the runtime facade.
pub const TRACING_TARGET_RUNTIME: &str = "conduit_runtime::runtime";

pub mod aggregator;
pub mod dispatcher;
pub mod health;
pub mod orchestrator;
pub mod registry;
mod runtime;
pub mod session;

pub use crate::runtime::{DEFAULT_INGEST_TOOL, IngestionConfig, Runtime, RuntimeConfig, TurnHandle};
