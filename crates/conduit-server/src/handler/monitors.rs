//! System health monitoring handlers.

use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::State;
use axum::http::StatusCode;
use conduit_runtime::Runtime;
use jiff::Timestamp;

use crate::TRACING_TARGET_CATALOG;
use crate::extract::Json;
use crate::handler::Result;
use crate::handler::response::{MonitorStatus, ProviderHealth, ServiceStatus};
use crate::service::ServiceState;

/// Reports provider health.
///
/// The service is healthy while at least one provider is healthy, or when
/// none are registered and turns run without tools.
#[tracing::instrument(skip_all)]
async fn health_status(State(runtime): State<Runtime>) -> Result<(StatusCode, Json<MonitorStatus>)> {
    let health = runtime.health();
    let is_healthy = health.is_empty() || health.any_healthy();

    let providers: Vec<_> = runtime
        .registry()
        .providers()
        .await
        .into_iter()
        .map(|handle| ProviderHealth {
            id: handle.id,
            kind: handle.kind,
            status: handle.status,
            consecutive_failures: handle.consecutive_failures,
        })
        .collect();

    let (status, status_code) = if is_healthy {
        (ServiceStatus::Healthy, StatusCode::OK)
    } else {
        (ServiceStatus::Unhealthy, StatusCode::SERVICE_UNAVAILABLE)
    };

    tracing::debug!(
        target: TRACING_TARGET_CATALOG,
        is_healthy,
        providers = providers.len(),
        status_code = status_code.as_u16(),
        "Health status prepared"
    );

    let response = MonitorStatus {
        checked_at: Timestamp::now(),
        status,
        version: env!("CARGO_PKG_VERSION").to_owned(),
        model: runtime.model_name().to_owned(),
        providers,
    };

    Ok((status_code, Json(response)))
}

fn health_status_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Get system health status")
        .description(
            "Returns the health of every registered provider. Responds with 503 when \
            providers are registered but none of them is healthy.",
        )
        .response::<200, Json<MonitorStatus>>()
        .response::<503, Json<MonitorStatus>>()
}

/// Returns a [`Router`] with all health monitoring routes.
///
/// [`Router`]: axum::routing::Router
pub fn routes() -> ApiRouter<ServiceState> {
    use aide::axum::routing::*;

    ApiRouter::new()
        .api_route("/health", get_with(health_status, health_status_docs))
        .with_path_items(|item| item.tag("Monitors"))
}

#[cfg(test)]
mod tests {
    use conduit_core::{ProviderId, ProviderStatus};
    use conduit_model::mock::ScriptedModel;

    use super::*;
    use crate::handler::test::{
        create_demo_runtime, create_test_runtime, create_test_server_with_runtime,
    };

    #[tokio::test]
    async fn healthy_without_providers() -> anyhow::Result<()> {
        let runtime = create_test_runtime(&ScriptedModel::new("local"))?;
        let server = create_test_server_with_runtime(routes(), runtime)?;

        let response = server.get("/health").await;
        response.assert_status_ok();
        let status = response.json::<MonitorStatus>();
        assert_eq!(status.status, ServiceStatus::Healthy);
        assert_eq!(status.model, "local");
        assert!(status.providers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn healthy_with_demo_providers() -> anyhow::Result<()> {
        let runtime = create_demo_runtime(&ScriptedModel::new("m")).await?;
        let server = create_test_server_with_runtime(routes(), runtime)?;

        let response = server.get("/health").await;
        response.assert_status_ok();
        let status = response.json::<MonitorStatus>();
        assert_eq!(status.providers.len(), 4);
        assert!(
            status
                .providers
                .iter()
                .all(|provider| provider.status == ProviderStatus::Healthy)
        );
        Ok(())
    }

    #[tokio::test]
    async fn unhealthy_when_every_provider_is_down() -> anyhow::Result<()> {
        let runtime = create_demo_runtime(&ScriptedModel::new("m")).await?;
        let threshold = runtime.config().health.unreachable_after;
        for id in ["database", "vector", "image", "web_search"] {
            for _ in 0..threshold {
                runtime
                    .health()
                    .record_failure(&ProviderId::from(id), "connection refused");
            }
        }
        let server = create_test_server_with_runtime(routes(), runtime)?;

        let response = server.get("/health").await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let status = response.json::<MonitorStatus>();
        assert_eq!(status.status, ServiceStatus::Unhealthy);
        assert!(status.providers.iter().all(|p| p.consecutive_failures == threshold));
        Ok(())
    }
}
