#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for HTTP provider operations.
pub const TRACING_TARGET_HTTP: &str = "conduit_provider::http";

/// Tracing target for mock provider operations.
#[cfg(feature = "mock")]
pub const TRACING_TARGET_MOCK: &str = "conduit_provider::mock";

mod http;
mod manifest;
#[cfg(feature = "mock")]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
pub mod mock;
mod provider;

pub use crate::http::{DEFAULT_TIMEOUT, HttpProvider, HttpProviderConfig, HttpTransportConfig};
pub use crate::manifest::ProviderManifest;
pub use crate::provider::{CapabilityProvider, ResourceContents, SharedProvider, ToolReply};
