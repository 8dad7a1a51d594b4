//! Application state and dependency injection.

use conduit_runtime::Runtime;
use conduit_runtime::health::HealthMonitor;
use conduit_runtime::registry::CapabilityRegistry;

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection).
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Debug, Clone)]
pub struct ServiceState {
    runtime: Runtime,
}

impl ServiceState {
    /// Creates the state around a configured runtime.
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

macro_rules! impl_di {
    ($($t:ty => |$s:ident| $e:expr),+ $(,)?) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref($s: &ServiceState) -> Self {
                $e
            }
        }
    )+};
}

impl_di!(
    Runtime => |state| state.runtime.clone(),
    CapabilityRegistry => |state| state.runtime.registry().clone(),
    HealthMonitor => |state| state.runtime.health().clone(),
);
