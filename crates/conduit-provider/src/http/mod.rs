//! JSON-RPC 2.0 over HTTP transport.

mod client;
mod config;
mod error;
mod rpc;

pub use client::HttpProvider;
pub use config::{DEFAULT_TIMEOUT, HttpProviderConfig, HttpTransportConfig};
