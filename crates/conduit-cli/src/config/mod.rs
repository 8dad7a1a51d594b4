//! CLI configuration management.
//!
//! ```text
//! Cli
//! ├── server: ServerConfig           # Host, port, shutdown
//! ├── middleware: MiddlewareConfig   # CORS, OpenAPI, request timeout
//! ├── runtime: RuntimeConfig         # Health, dispatcher, orchestrator, sessions, ingestion
//! ├── model: ModelConfig             # Primary OpenAI-compatible endpoint
//! ├── fallback: FallbackModelConfig  # Optional hosted fallback
//! └── providers: ProviderConfig      # Capability providers
//! ```
//!
//! All configuration can be provided via CLI arguments or environment
//! variables. Use `--help` to see all available options.

mod middleware;
mod provider;
mod server;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use conduit_model::{FallbackModel, FallbackModelConfig, ModelConfig, OpenAiModel, SharedModel};
use conduit_runtime::RuntimeConfig;
pub use middleware::MiddlewareConfig;
pub use provider::{ProviderConfig, register_providers};
use serde::{Deserialize, Serialize};
pub use server::ServerConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_SERVER_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "conduit")]
#[command(about = "Tool-calling conversation runtime")]
#[command(version)]
pub struct Cli {
    /// Server network and lifecycle configuration.
    #[clap(flatten)]
    pub server: ServerConfig,

    /// HTTP middleware configuration (CORS, OpenAPI, timeouts).
    #[clap(flatten)]
    pub middleware: MiddlewareConfig,

    /// Health probes, tool dispatch, turn budget and ingestion.
    #[clap(flatten)]
    pub runtime: RuntimeConfig,

    /// Primary language model endpoint.
    #[clap(flatten)]
    pub model: ModelConfig,

    /// Hosted model used when the primary cannot be reached.
    #[clap(flatten)]
    pub fallback: FallbackModelConfig,

    /// Capability providers registered at startup.
    #[clap(flatten)]
    pub providers: ProviderConfig,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded first so that clap's `env` lookups see its values.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with `RUST_LOG` filtering (default `info`).
    pub fn init_tracing() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.middleware
            .validate()
            .context("invalid middleware configuration")?;
        self.runtime
            .validate()
            .context("invalid runtime configuration")?;

        if !self.providers.is_mock() {
            self.model.validate().context("invalid model configuration")?;
        }

        Ok(())
    }

    /// Builds the language model: the primary endpoint, then the fallback if configured.
    pub fn create_model(&self) -> anyhow::Result<SharedModel> {
        #[cfg(feature = "mock")]
        if self.providers.mock {
            use conduit_model::mock::{Script, ScriptedModel};

            let model = ScriptedModel::new("scripted")
                .with_script(Script::text("This is a scripted answer from the mock model."));
            return Ok(Arc::new(model));
        }

        let primary: SharedModel = Arc::new(
            OpenAiModel::new(self.model.clone()).context("failed to create the primary model")?,
        );

        let Some(fallback) = self
            .fallback
            .resolve(&self.model)
            .context("invalid fallback model configuration")?
        else {
            return Ok(primary);
        };

        let fallback =
            OpenAiModel::new(fallback).context("failed to create the fallback model")?;
        let chain = FallbackModel::new(primary).with_fallback(Arc::new(fallback));

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            models = chain.len(),
            "Model fallback enabled"
        );

        Ok(Arc::new(chain))
    }

    /// Logs configuration (no secrets).
    pub fn log(&self) {
        Self::log_build_info();
        self.server.log();
        self.middleware.log();
        self.providers.log();

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            model_url = %self.model.base_url,
            model = %self.model.model,
            fallback = self.fallback.api_key.is_some(),
            "Model configuration"
        );

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            turn_budget = self.runtime.orchestrator.turn_budget,
            history_window = self.runtime.orchestrator.history_window,
            tool_timeout_secs = self.runtime.dispatcher.tool_timeout_secs,
            max_in_flight_tools = self.runtime.dispatcher.max_in_flight,
            max_sessions = self.runtime.sessions.max_sessions,
            probe_interval_secs = self.runtime.health.probe_interval_secs,
            ingest_tool = %self.runtime.ingestion.ingest_tool,
            "Runtime configuration"
        );
    }

    fn log_build_info() {
        tracing::debug!(
            target: TRACING_TARGET_SERVER_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [
            cfg!(feature = "dotenv").then_some("dotenv"),
            cfg!(feature = "mock").then_some("mock"),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
