//! OpenAI-compatible chat completions client.

mod client;
mod config;
mod error;
mod sse;
mod wire;

pub use client::OpenAiModel;
pub use config::{
    DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT, FallbackModelConfig, ModelConfig,
};
