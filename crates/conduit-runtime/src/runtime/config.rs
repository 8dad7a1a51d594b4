//! Runtime configuration.

#[cfg(feature = "config")]
use clap::Args;
use conduit_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::dispatcher::DispatcherConfig;
use crate::health::HealthConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::session::SessionConfig;

/// Default tool receiving ingested documents.
pub const DEFAULT_INGEST_TOOL: &str = "add_documents";

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct RuntimeConfig {
    #[cfg_attr(feature = "config", command(flatten))]
    pub health: HealthConfig,

    #[cfg_attr(feature = "config", command(flatten))]
    pub dispatcher: DispatcherConfig,

    #[cfg_attr(feature = "config", command(flatten))]
    pub orchestrator: OrchestratorConfig,

    #[cfg_attr(feature = "config", command(flatten))]
    pub sessions: SessionConfig,

    #[cfg_attr(feature = "config", command(flatten))]
    pub ingestion: IngestionConfig,
}

/// Document ingestion target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct IngestionConfig {
    /// Tool that receives extracted document chunks.
    #[cfg_attr(
        feature = "config",
        arg(long = "ingest-tool", env = "INGEST_TOOL", default_value = DEFAULT_INGEST_TOOL)
    )]
    pub ingest_tool: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            ingest_tool: DEFAULT_INGEST_TOOL.to_owned(),
        }
    }
}

impl RuntimeConfig {
    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_sessions(mut self, sessions: SessionConfig) -> Self {
        self.sessions = sessions;
        self
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.health.validate()?;
        self.dispatcher.validate()?;
        self.orchestrator.validate()?;
        self.sessions.validate()?;

        if self.ingestion.ingest_tool.trim().is_empty() {
            return Err(Error::configuration().with_message("ingest tool name cannot be empty"));
        }

        Ok(())
    }
}
