#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod server;

use std::process;

use anyhow::Context;
use axum::Router;
use conduit_runtime::Runtime;
use conduit_server::handler::routes;
use conduit_server::middleware::{
    RouterObservabilityExt, RouterOpenApiExt, RouterRecoveryExt, RouterSecurityExt,
};
use conduit_server::service::ServiceState;
use tokio_util::sync::CancellationToken;

use crate::config::{Cli, MiddlewareConfig, register_providers};

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "conduit_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "conduit_cli::server::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "conduit_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "Application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = format!("{error:#}"),
            "Application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();
    Cli::init_tracing();

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        "Starting conduit"
    );

    cli.validate()?;
    cli.log();

    let model = cli.create_model()?;
    let runtime = Runtime::new(model, cli.runtime.clone()).context("failed to create runtime")?;

    let providers = cli.providers.create_providers()?;
    register_providers(&runtime, providers).await?;
    let probes = runtime.spawn_health_probes();

    let shutdown = CancellationToken::new();
    let on_shutdown = {
        let runtime = runtime.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            runtime.shutdown();
        })
    };

    let router = create_router(ServiceState::new(runtime.clone()), &cli.middleware);
    let result = server::serve(router, &cli.server, shutdown.clone()).await;

    // Also reached when the server fails without a signal.
    shutdown.cancel();
    if on_shutdown.await.is_err() || probes.await.is_err() {
        tracing::warn!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "Background task ended abnormally"
        );
    }

    result.context("server terminated with error")
}

/// Creates the router with all middleware layers applied.
///
/// Middleware is applied in reverse order (last added = outermost):
/// 1. Recovery (outermost): catches panics and enforces timeouts
/// 2. Observability: request IDs and tracing spans
/// 3. Security: CORS
/// 4. Routes (innermost): handlers and the OpenAPI documents
fn create_router(state: ServiceState, middleware: &MiddlewareConfig) -> Router {
    let api_routes: Router = routes()
        .with_open_api(&middleware.openapi)
        .with_state(state);

    api_routes
        .with_security(&middleware.cors)
        .with_observability()
        .with_recovery(&middleware.recovery)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum_test::TestServer;
    use conduit_model::mock::ScriptedModel;
    use conduit_provider::mock::demo_providers;
    use conduit_provider::SharedProvider;
    use conduit_runtime::RuntimeConfig;

    use super::*;

    async fn test_server() -> anyhow::Result<TestServer> {
        let runtime = Runtime::new(Arc::new(ScriptedModel::new("m")), RuntimeConfig::default())?;
        let providers = demo_providers()
            .into_iter()
            .map(|provider| Arc::new(provider) as SharedProvider)
            .collect();
        register_providers(&runtime, providers).await?;

        let middleware = MiddlewareConfig {
            cors: Default::default(),
            openapi: Default::default(),
            recovery: Default::default(),
        };
        let router = create_router(ServiceState::new(runtime), &middleware);
        Ok(TestServer::new(router)?)
    }

    #[tokio::test]
    async fn openapi_document_lists_routes() -> anyhow::Result<()> {
        let server = test_server().await?;

        let response = server.get("/api/openapi.json").await;
        response.assert_status_ok();
        let document = response.json::<serde_json::Value>();
        assert_eq!(document["info"]["title"], "Conduit API");
        assert!(document["paths"]["/tools"].is_object());
        assert!(document["paths"]["/health"].is_object());
        Ok(())
    }

    #[tokio::test]
    async fn responses_carry_request_ids() -> anyhow::Result<()> {
        let server = test_server().await?;

        let response = server.get("/health").await;
        response.assert_status_ok();
        assert!(response.maybe_header("x-request-id").is_some());
        Ok(())
    }
}
