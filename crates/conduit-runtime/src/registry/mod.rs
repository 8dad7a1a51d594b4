//! Capability registry: provider discovery and tool resolution.

use std::collections::HashMap;
use std::sync::Arc;

use conduit_core::{
    Error, ErrorKind, FailureKind, ProviderHandle, ProviderId, ProviderStatus, ResourceDescriptor,
    Result, ToolDescriptor,
};
use conduit_provider::{ProviderManifest, ResourceContents, SharedProvider};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::TRACING_TARGET_REGISTRY;
use crate::health::HealthMonitor;

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// Tools were discovered and are now resolvable.
    Registered {
        provider: ProviderId,
        tools: Vec<String>,
    },
    /// Discovery failed; the provider is stored without tools and stays out
    /// of the catalog until a refresh succeeds.
    Pending { provider: ProviderId, reason: String },
}

/// A tool together with its owning provider.
#[derive(Clone)]
pub struct ResolvedTool {
    pub descriptor: ToolDescriptor,
    pub handle: ProviderHandle,
    pub provider: SharedProvider,
}

impl std::fmt::Debug for ResolvedTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedTool")
            .field("descriptor", &self.descriptor)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

struct RegistryEntry {
    provider: SharedProvider,
    manifest: ProviderManifest,
}

/// Registry contents; replaced field by field only under the write lock.
#[derive(Default)]
struct RegistryState {
    /// In registration order.
    entries: Vec<RegistryEntry>,
    /// Tool name to index into `entries`.
    tools: HashMap<String, usize>,
}

impl RegistryState {
    fn position(&self, id: &ProviderId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.provider.id() == id)
    }

    /// Returns the first tool of `manifest` already owned by another provider.
    fn collision(&self, manifest: &ProviderManifest, owner: Option<usize>) -> Option<String> {
        manifest
            .tools
            .iter()
            .find(|tool| {
                self.tools
                    .get(&tool.name)
                    .is_some_and(|index| Some(*index) != owner)
            })
            .map(|tool| tool.name.clone())
    }

    fn reindex(&mut self) {
        self.tools = self
            .entries
            .iter()
            .enumerate()
            .flat_map(|(index, entry)| {
                entry
                    .manifest
                    .tools
                    .iter()
                    .map(move |tool| (tool.name.clone(), index))
            })
            .collect();
    }
}

struct CapabilityRegistryInner {
    state: RwLock<RegistryState>,
    health: HealthMonitor,
}

/// Process-wide store of providers and their declared tools.
///
/// Tool names are unique across all registered providers. Reads take a
/// shared lock; registration and refresh query the provider first and then
/// apply the result under a short exclusive lock, so a failed discovery
/// never leaves a partially replaced entry.
///
/// This type is cheap to clone; clones share state.
#[derive(Clone)]
pub struct CapabilityRegistry {
    inner: Arc<CapabilityRegistryInner>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry").finish_non_exhaustive()
    }
}

impl CapabilityRegistry {
    /// Creates an empty registry reporting to `health`.
    pub fn new(health: HealthMonitor) -> Self {
        Self {
            inner: Arc::new(CapabilityRegistryInner {
                state: RwLock::new(RegistryState::default()),
                health,
            }),
        }
    }

    /// Returns the health monitor this registry reports to.
    pub fn health(&self) -> &HealthMonitor {
        &self.inner.health
    }

    /// Queries the provider's manifest under the probe timeout.
    async fn discover(&self, provider: &SharedProvider) -> Result<ProviderManifest> {
        let timeout = self.inner.health.config().probe_timeout();
        match tokio::time::timeout(timeout, provider.list_tools()).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout().with_message(format!(
                "discovery of `{}` timed out after {}s",
                provider.id(),
                timeout.as_secs()
            ))),
        }
    }

    /// Feeds a discovery outcome into the health monitor.
    fn record_discovery(&self, id: &ProviderId, manifest: &Result<ProviderManifest>) {
        let health = &self.inner.health;
        match manifest {
            Ok(_) => {
                health.record_success(id);
            }
            Err(error) if discovery_affects_health(error.kind()) => {
                health.record_failure(id, &error.to_string());
            }
            Err(_) => {}
        }
    }

    /// Registers a provider and its tools.
    ///
    /// # Errors
    ///
    /// Fails with `duplicate_provider` when the id is taken and with
    /// `duplicate_tool` when any declared tool name is already owned by
    /// another provider; in both cases nothing is stored.
    pub async fn register(&self, provider: SharedProvider) -> Result<RegistrationOutcome> {
        let id = provider.id().clone();
        if self.inner.state.read().await.position(&id).is_some() {
            return Err(Error::duplicate_provider(id.as_str()));
        }

        tracing::debug!(
            target: TRACING_TARGET_REGISTRY,
            provider = %id,
            kind = %provider.kind(),
            endpoint = provider.endpoint(),
            "Discovering provider tools"
        );

        let discovered = self.discover(&provider).await;

        // Concurrent registrations of one id are settled here; only the
        // winner is tracked by the health monitor.
        let mut state = self.inner.state.write().await;
        if state.position(&id).is_some() {
            return Err(Error::duplicate_provider(id.as_str()));
        }

        if let Ok(manifest) = &discovered
            && let Some(name) = state.collision(manifest, None)
        {
            tracing::warn!(
                target: TRACING_TARGET_REGISTRY,
                provider = %id,
                tool = %name,
                "Registration rejected: duplicate tool"
            );
            return Err(Error::duplicate_tool(&name));
        }

        self.inner.health.track(provider.clone());
        self.record_discovery(&id, &discovered);

        let outcome = match discovered {
            Ok(manifest) => {
                let tools = manifest.tool_names();
                state.entries.push(RegistryEntry { provider, manifest });
                RegistrationOutcome::Registered { provider: id, tools }
            }
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET_REGISTRY,
                    provider = %id,
                    error = %error,
                    "Provider discovery failed, registered without tools"
                );

                state.entries.push(RegistryEntry {
                    provider,
                    manifest: ProviderManifest::default(),
                });
                RegistrationOutcome::Pending {
                    provider: id,
                    reason: error.to_string(),
                }
            }
        };

        state.reindex();
        drop(state);

        if let RegistrationOutcome::Registered { provider, tools } = &outcome {
            tracing::info!(
                target: TRACING_TARGET_REGISTRY,
                provider = %provider,
                tools = tools.len(),
                "Provider registered"
            );
        }

        Ok(outcome)
    }

    /// Re-queries one provider and atomically replaces its tools.
    ///
    /// On failure the previous entry stays in place.
    pub async fn refresh(&self, id: &ProviderId) -> Result<RegistrationOutcome> {
        let provider = {
            let state = self.inner.state.read().await;
            let index = state
                .position(id)
                .ok_or_else(|| Error::unknown_provider(id.as_str()))?;
            state.entries[index].provider.clone()
        };

        let manifest = self.discover(&provider).await;
        self.record_discovery(id, &manifest);
        let manifest = manifest.inspect_err(|error| {
            tracing::warn!(
                target: TRACING_TARGET_REGISTRY,
                provider = %id,
                error = %error,
                "Refresh failed, keeping previous tools"
            );
        })?;

        let mut state = self.inner.state.write().await;
        let index = state
            .position(id)
            .ok_or_else(|| Error::unknown_provider(id.as_str()))?;

        if let Some(name) = state.collision(&manifest, Some(index)) {
            return Err(Error::duplicate_tool(&name));
        }

        let tools = manifest.tool_names();
        state.entries[index].manifest = manifest;
        state.reindex();

        tracing::info!(
            target: TRACING_TARGET_REGISTRY,
            provider = %id,
            tools = tools.len(),
            "Provider refreshed"
        );

        Ok(RegistrationOutcome::Registered {
            provider: id.clone(),
            tools,
        })
    }

    /// Returns every registered tool: registration order, then declaration order.
    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.collect_tools(|_| true).await
    }

    /// Returns the tools offered to the model, excluding unreachable providers.
    pub async fn catalog(&self) -> Vec<ToolDescriptor> {
        let health = &self.inner.health;
        self.collect_tools(|id| health.status(id).is_available()).await
    }

    async fn collect_tools(&self, include: impl Fn(&ProviderId) -> bool) -> Vec<ToolDescriptor> {
        self.inner
            .state
            .read()
            .await
            .entries
            .iter()
            .filter(|entry| include(entry.provider.id()))
            .flat_map(|entry| entry.manifest.tools.iter().cloned())
            .collect()
    }

    /// Returns whether a tool with this name is registered.
    pub async fn contains(&self, tool_name: &str) -> bool {
        self.inner.state.read().await.tools.contains_key(tool_name)
    }

    /// Resolves a tool to its descriptor and owning provider.
    pub async fn resolve(&self, tool_name: &str) -> Result<ResolvedTool> {
        let state = self.inner.state.read().await;
        let entry = state
            .tools
            .get(tool_name)
            .map(|index| &state.entries[*index])
            .ok_or_else(|| Error::unknown_tool(tool_name))?;

        let descriptor = entry
            .manifest
            .tools
            .iter()
            .find(|tool| tool.name == tool_name)
            .cloned()
            .ok_or_else(|| Error::unknown_tool(tool_name))?;

        Ok(ResolvedTool {
            descriptor,
            handle: self.handle(entry),
            provider: entry.provider.clone(),
        })
    }

    fn handle(&self, entry: &RegistryEntry) -> ProviderHandle {
        let id = entry.provider.id();
        let record = self.inner.health.record(id).unwrap_or_default();

        ProviderHandle {
            id: id.clone(),
            kind: entry.provider.kind(),
            endpoint: entry.provider.endpoint().to_owned(),
            status: record.status,
            last_probe_time: record.last_probe_time,
            consecutive_failures: record.consecutive_failures,
            tool_names: entry.manifest.tool_names(),
        }
    }

    /// Returns a snapshot of every provider in registration order.
    pub async fn providers(&self) -> Vec<ProviderHandle> {
        let state = self.inner.state.read().await;
        state.entries.iter().map(|entry| self.handle(entry)).collect()
    }

    /// Returns a snapshot of one provider.
    pub async fn provider(&self, id: &ProviderId) -> Result<ProviderHandle> {
        let state = self.inner.state.read().await;
        state
            .position(id)
            .map(|index| self.handle(&state.entries[index]))
            .ok_or_else(|| Error::unknown_provider(id.as_str()))
    }

    /// Returns the tools declared by one provider.
    pub async fn provider_tools(&self, id: &ProviderId) -> Result<Vec<ToolDescriptor>> {
        let state = self.inner.state.read().await;
        state
            .position(id)
            .map(|index| state.entries[index].manifest.tools.clone())
            .ok_or_else(|| Error::unknown_provider(id.as_str()))
    }

    /// Returns the resources declared by one provider.
    pub async fn provider_resources(&self, id: &ProviderId) -> Result<Vec<ResourceDescriptor>> {
        let state = self.inner.state.read().await;
        state
            .position(id)
            .map(|index| state.entries[index].manifest.resources.clone())
            .ok_or_else(|| Error::unknown_provider(id.as_str()))
    }

    /// Returns every declared resource with its provider.
    pub async fn resources(&self) -> Vec<(ProviderId, ResourceDescriptor)> {
        self.inner
            .state
            .read()
            .await
            .entries
            .iter()
            .flat_map(|entry| {
                let id = entry.provider.id().clone();
                entry
                    .manifest
                    .resources
                    .iter()
                    .map(move |resource| (id.clone(), resource.clone()))
            })
            .collect()
    }

    /// Reads a resource through its provider.
    pub async fn read_resource(&self, id: &ProviderId, uri: &str) -> Result<ResourceContents> {
        let provider = {
            let state = self.inner.state.read().await;
            let index = state
                .position(id)
                .ok_or_else(|| Error::unknown_provider(id.as_str()))?;
            state.entries[index].provider.clone()
        };

        if self.inner.health.status(id) == ProviderStatus::Unreachable {
            return Err(Error::provider_unavailable()
                .with_message(format!("provider `{id}` is unreachable")));
        }

        let timeout = self.inner.health.config().probe_timeout();
        match tokio::time::timeout(timeout, provider.read_resource(uri)).await {
            Ok(result) => result,
            Err(_) => Err(Error::new(ErrorKind::Timeout)
                .with_message(format!("reading `{uri}` from `{id}` timed out"))),
        }
    }
}

/// A malformed manifest says nothing about whether the provider is reachable.
fn discovery_affects_health(kind: ErrorKind) -> bool {
    kind != ErrorKind::MalformedResponse && FailureKind::from(kind).affects_health()
}
