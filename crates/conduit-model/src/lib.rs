#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for the OpenAI-compatible client.
pub const TRACING_TARGET_OPENAI: &str = "conduit_model::openai";

/// Tracing target for model fallback decisions.
pub const TRACING_TARGET_FALLBACK: &str = "conduit_model::fallback";

/// Tracing target for the scripted model.
#[cfg(any(test, feature = "mock"))]
pub const TRACING_TARGET_MOCK: &str = "conduit_model::mock";

mod fallback;
#[cfg(any(test, feature = "mock"))]
#[cfg_attr(docsrs, doc(cfg(feature = "mock")))]
pub mod mock;
mod model;
pub mod openai;

pub use crate::fallback::FallbackModel;
pub use crate::model::{CompletionRequest, LanguageModel, ModelChunk, ModelStream, SharedModel};
pub use crate::openai::{FallbackModelConfig, ModelConfig, OpenAiModel};
