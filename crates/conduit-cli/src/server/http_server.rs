//! HTTP server startup.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::shutdown::cancel_on_signal;
use crate::config::ServerConfig;
use crate::{TRACING_TARGET_SERVER_SHUTDOWN, TRACING_TARGET_SERVER_STARTUP};

/// Serves `app` until a shutdown signal arrives.
///
/// On SIGINT or SIGTERM `shutdown` is cancelled and the listener stops
/// accepting connections. Open connections get the shutdown timeout to
/// finish before the server returns anyway.
///
/// # Errors
///
/// Returns an error when the address cannot be bound or the server fails.
pub async fn serve(app: Router, config: &ServerConfig, shutdown: CancellationToken) -> io::Result<()> {
    let server_addr = config.server_addr();
    if config.binds_to_all_interfaces() {
        tracing::warn!(
            target: TRACING_TARGET_SERVER_STARTUP,
            "Server bound to all interfaces, ensure firewall is configured"
        );
    }

    let listener = TcpListener::bind(server_addr).await.inspect_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_SERVER_STARTUP,
            addr = %server_addr,
            error = %err,
            "Failed to bind to address"
        );
    })?;

    tracing::info!(
        target: TRACING_TARGET_SERVER_STARTUP,
        addr = %server_addr,
        "Server is ready and listening for connections"
    );

    let started = Instant::now();
    tokio::spawn(cancel_on_signal(shutdown.clone()));
    let result = serve_until_cancelled(listener, app, shutdown, config.shutdown_timeout()).await;

    match &result {
        Ok(()) => tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            uptime_secs = started.elapsed().as_secs(),
            "Shutdown completed"
        ),
        Err(err) => tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %err,
            kind = ?err.kind(),
            uptime_secs = started.elapsed().as_secs(),
            "Server failed"
        ),
    }

    result
}

/// Serves connections from `listener` until `shutdown` is cancelled, then
/// waits at most `drain_timeout` for open connections.
async fn serve_until_cancelled(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    drain_timeout: Duration,
) -> io::Result<()> {
    let graceful = {
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    };

    let deadline = async move {
        shutdown.cancelled().await;
        tokio::time::sleep(drain_timeout).await;
    };

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful)
    .into_future();

    tokio::select! {
        result = server => result,
        () = deadline => {
            tracing::warn!(
                target: TRACING_TARGET_SERVER_SHUTDOWN,
                timeout_secs = drain_timeout.as_secs(),
                "Shutdown timeout elapsed, closing remaining connections"
            );
            Ok(())
        }
    }
}
