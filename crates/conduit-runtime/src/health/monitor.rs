//! Provider liveness tracking.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use conduit_core::{ProviderId, ProviderStatus};
use conduit_provider::SharedProvider;
use futures::future::join_all;
use jiff::Timestamp;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::HealthConfig;
use crate::TRACING_TARGET_HEALTH;

/// Health state of one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub status: ProviderStatus,
    pub consecutive_failures: u32,
    pub last_probe_time: Option<Timestamp>,
    pub last_error: Option<String>,
}

/// Computes the status after one more consecutive failure.
///
/// `failures` already includes the new failure. A provider that never
/// succeeded stays `Unknown` until it crosses the hard threshold.
pub fn status_after_failure(
    current: ProviderStatus,
    failures: u32,
    config: &HealthConfig,
) -> ProviderStatus {
    if failures >= config.unreachable_after {
        return ProviderStatus::Unreachable;
    }

    match current {
        ProviderStatus::Healthy | ProviderStatus::Degraded if failures >= config.degraded_after => {
            ProviderStatus::Degraded
        }
        other => other,
    }
}

struct HealthMonitorInner {
    config: HealthConfig,
    records: RwLock<HashMap<ProviderId, HealthRecord>>,
    providers: RwLock<Vec<SharedProvider>>,
}

/// Owns the health record of every tracked provider.
///
/// Probes and call outcomes feed the same per-provider state machine:
/// `Unknown -> Healthy` on the first success, `Healthy -> Degraded` after
/// `degraded_after` consecutive failures, `-> Unreachable` after
/// `unreachable_after`, and back to `Healthy` on any success. Each update is
/// applied under a single write lock, so readers never observe a torn record.
///
/// This type is cheap to clone; clones share state.
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<HealthMonitorInner>,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl HealthMonitor {
    /// Creates a monitor without tracked providers.
    pub fn new(config: HealthConfig) -> Self {
        Self {
            inner: Arc::new(HealthMonitorInner {
                config,
                records: RwLock::new(HashMap::new()),
                providers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Returns the monitor configuration.
    pub fn config(&self) -> &HealthConfig {
        &self.inner.config
    }

    /// Starts tracking a provider; its status begins as `Unknown`.
    pub fn track(&self, provider: SharedProvider) {
        self.inner
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(provider.id().clone())
            .or_default();

        let mut providers = self
            .inner
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        providers.retain(|tracked| tracked.id() != provider.id());
        providers.push(provider);
    }

    /// Stops tracking a provider and drops its record.
    pub fn untrack(&self, id: &ProviderId) {
        self.inner
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        self.inner
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tracked| tracked.id() != id);
    }

    /// Returns the current status; untracked providers are `Unknown`.
    pub fn status(&self, id: &ProviderId) -> ProviderStatus {
        self.record(id).map(|record| record.status).unwrap_or_default()
    }

    /// Returns a copy of the provider's record.
    pub fn record(&self, id: &ProviderId) -> Option<HealthRecord> {
        self.inner
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Returns whether at least one tracked provider is healthy.
    pub fn any_healthy(&self) -> bool {
        self.inner
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .any(|record| record.status == ProviderStatus::Healthy)
    }

    /// Returns the number of tracked providers.
    pub fn len(&self) -> usize {
        self.inner
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether no provider is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a successful probe or call.
    pub fn record_success(&self, id: &ProviderId) -> ProviderStatus {
        self.update(id, false, |record, _| {
            record.consecutive_failures = 0;
            record.last_error = None;
            record.status = ProviderStatus::Healthy;
        })
    }

    /// Records a failed probe or call.
    pub fn record_failure(&self, id: &ProviderId, reason: &str) -> ProviderStatus {
        self.update(id, false, |record, config| {
            record.consecutive_failures = record.consecutive_failures.saturating_add(1);
            record.last_error = Some(reason.to_owned());
            record.status = status_after_failure(record.status, record.consecutive_failures, config);
        })
    }

    fn record_probe(&self, id: &ProviderId, outcome: Result<(), String>) -> ProviderStatus {
        self.update(id, true, |record, config| match outcome {
            Ok(()) => {
                record.consecutive_failures = 0;
                record.last_error = None;
                record.status = ProviderStatus::Healthy;
            }
            Err(reason) => {
                record.consecutive_failures = record.consecutive_failures.saturating_add(1);
                record.last_error = Some(reason);
                record.status =
                    status_after_failure(record.status, record.consecutive_failures, config);
            }
        })
    }

    fn update<F>(&self, id: &ProviderId, probed: bool, apply: F) -> ProviderStatus
    where
        F: FnOnce(&mut HealthRecord, &HealthConfig),
    {
        let (from, to, failures) = {
            let mut records = self
                .inner
                .records
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let record = records.entry(id.clone()).or_default();
            let from = record.status;
            apply(record, &self.inner.config);
            if probed {
                record.last_probe_time = Some(Timestamp::now());
            }
            (from, record.status, record.consecutive_failures)
        };

        if from != to {
            if to == ProviderStatus::Healthy {
                tracing::info!(
                    target: TRACING_TARGET_HEALTH,
                    provider = %id,
                    from = %from,
                    to = %to,
                    "Provider status changed"
                );
            } else {
                tracing::warn!(
                    target: TRACING_TARGET_HEALTH,
                    provider = %id,
                    from = %from,
                    to = %to,
                    consecutive_failures = failures,
                    "Provider status changed"
                );
            }
        }

        to
    }

    /// Probes one provider under the probe timeout and records the outcome.
    pub async fn probe(&self, provider: &SharedProvider) -> ProviderStatus {
        let timeout = self.inner.config.probe_timeout();
        let outcome = match tokio::time::timeout(timeout, provider.probe()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(error.to_string()),
            Err(_) => Err(format!("probe timed out after {}s", timeout.as_secs())),
        };

        if let Err(reason) = &outcome {
            tracing::debug!(
                target: TRACING_TARGET_HEALTH,
                provider = %provider.id(),
                reason = %reason,
                "Probe failed"
            );
        }

        self.record_probe(provider.id(), outcome)
    }

    /// Probes every tracked provider concurrently.
    pub async fn probe_all(&self) -> Vec<(ProviderId, ProviderStatus)> {
        let providers = self
            .inner
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let statuses = join_all(providers.iter().map(|provider| self.probe(provider))).await;

        providers
            .iter()
            .map(|provider| provider.id().clone())
            .zip(statuses)
            .collect()
    }

    /// Spawns the periodic probe loop, stopped by `cancel`.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.inner.config.probe_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            tracing::info!(
                target: TRACING_TARGET_HEALTH,
                interval_secs = monitor.inner.config.probe_interval_secs,
                "Starting health probes"
            );

            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        tracing::info!(target: TRACING_TARGET_HEALTH, "Stopping health probes");
                        break;
                    }

                    _ = interval.tick() => {
                        let statuses = monitor.probe_all().await;
                        tracing::debug!(
                            target: TRACING_TARGET_HEALTH,
                            providers = statuses.len(),
                            "Probe round completed"
                        );
                    }
                }
            }
        })
    }
}
