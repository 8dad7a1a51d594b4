//! Operating system shutdown signals.

use std::future::pending;

use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_SERVER_SHUTDOWN;

/// Cancels `shutdown` on SIGINT, or on SIGTERM under Unix.
///
/// Returns without waiting for a signal once `shutdown` is cancelled
/// elsewhere.
pub async fn cancel_on_signal(shutdown: CancellationToken) {
    let signal = tokio::select! {
        () = shutdown.cancelled() => return,
        () = interrupt() => "SIGINT",
        () = terminate() => "SIGTERM",
    };

    tracing::info!(
        target: TRACING_TARGET_SERVER_SHUTDOWN,
        signal,
        "Shutdown signal received, draining connections"
    );
    shutdown.cancel();
}

async fn interrupt() {
    if let Err(error) = ctrl_c().await {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            %error,
            "Failed to listen for SIGINT"
        );
        pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            terminate.recv().await;
        }
        Err(error) => {
            tracing::error!(
                target: TRACING_TARGET_SERVER_SHUTDOWN,
                %error,
                "Failed to listen for SIGTERM"
            );
            pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn returns_once_cancelled_elsewhere() {
        let shutdown = CancellationToken::new();
        let waiter = tokio::spawn(cancel_on_signal(shutdown.clone()));

        shutdown.cancel();
        let finished = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }
}
