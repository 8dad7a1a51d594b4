//! Capability provider configuration and wiring.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use conduit_core::{ProviderId, ProviderKind};
use conduit_provider::{HttpProvider, HttpProviderConfig, HttpTransportConfig, SharedProvider};
use conduit_runtime::Runtime;
use conduit_runtime::registry::RegistrationOutcome;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::TRACING_TARGET_CONFIG;

/// Error parsing a provider entry.
#[derive(Debug, thiserror::Error)]
pub enum ProviderSpecError {
    #[error("expected `id:kind=url`, got `{0}`")]
    Format(String),
    #[error("provider id must not be empty")]
    EmptyId,
    #[error("unknown provider kind `{0}`")]
    Kind(String),
    #[error("invalid provider url `{url}`: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// One provider entry, written as `id:kind=url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub id: ProviderId,
    pub kind: ProviderKind,
    pub endpoint: Url,
}

impl FromStr for ProviderSpec {
    type Err = ProviderSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, url) = s
            .split_once('=')
            .ok_or_else(|| ProviderSpecError::Format(s.to_owned()))?;
        let (id, kind) = head
            .split_once(':')
            .ok_or_else(|| ProviderSpecError::Format(s.to_owned()))?;

        let id = id.trim();
        if id.is_empty() {
            return Err(ProviderSpecError::EmptyId);
        }

        let kind = kind.trim();
        let kind = ProviderKind::from_str(kind).map_err(|_| ProviderSpecError::Kind(kind.to_owned()))?;

        let url = url.trim();
        let endpoint = Url::parse(url).map_err(|source| ProviderSpecError::Url {
            url: url.to_owned(),
            source,
        })?;

        Ok(Self {
            id: ProviderId::new(id),
            kind,
            endpoint,
        })
    }
}

/// Providers to register at startup.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Comma separated `id:kind=url` entries.
    ///
    /// Kinds: storage, vector_search, image_synthesis, web_search.
    #[arg(long, env = "PROVIDERS", value_delimiter = ',')]
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,

    /// HTTP transport settings shared by every provider.
    #[clap(flatten)]
    pub transport: HttpTransportConfig,

    /// Registers in-memory demo providers and a scripted model.
    #[cfg(feature = "mock")]
    #[arg(long, env = "MOCK")]
    #[serde(default)]
    pub mock: bool,
}

impl ProviderConfig {
    /// Returns whether the in-memory demo setup is requested.
    pub fn is_mock(&self) -> bool {
        #[cfg(feature = "mock")]
        {
            self.mock
        }

        #[cfg(not(feature = "mock"))]
        {
            false
        }
    }

    /// Builds one HTTP provider per configured entry.
    pub fn create_providers(&self) -> anyhow::Result<Vec<SharedProvider>> {
        let mut providers: Vec<SharedProvider> = Vec::with_capacity(self.providers.len());

        for spec in &self.providers {
            let config = HttpProviderConfig::new(spec.id.clone(), spec.kind, spec.endpoint.clone())
                .with_transport(self.transport.clone());
            let provider = HttpProvider::new(config)
                .with_context(|| format!("failed to create provider `{}`", spec.id))?;
            providers.push(Arc::new(provider));
        }

        #[cfg(feature = "mock")]
        if self.mock {
            providers.extend(
                conduit_provider::mock::demo_providers()
                    .into_iter()
                    .map(|provider| Arc::new(provider) as SharedProvider),
            );
        }

        Ok(providers)
    }

    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            providers = self.providers.len(),
            timeout_secs = self.transport.timeout_secs,
            mock = self.is_mock(),
            "Provider configuration"
        );
    }
}

/// Registers every provider with the runtime.
///
/// Providers that cannot be queried stay registered without tools; a
/// duplicate id or tool name aborts startup.
pub async fn register_providers(runtime: &Runtime, providers: Vec<SharedProvider>) -> anyhow::Result<()> {
    for provider in providers {
        let id = provider.id().clone();
        let outcome = runtime
            .register(provider)
            .await
            .with_context(|| format!("failed to register provider `{id}`"))?;

        match outcome {
            RegistrationOutcome::Registered { provider, tools } => {
                tracing::info!(
                    target: TRACING_TARGET_CONFIG,
                    provider = %provider,
                    tools = ?tools,
                    "Provider ready"
                );
            }
            RegistrationOutcome::Pending { provider, reason } => {
                tracing::warn!(
                    target: TRACING_TARGET_CONFIG,
                    provider = %provider,
                    reason = %reason,
                    "Provider registered without tools"
                );
            }
        }
    }

    if runtime.health().is_empty() {
        tracing::warn!(
            target: TRACING_TARGET_CONFIG,
            "No providers configured, turns run without tools"
        );
    }

    Ok(())
}
