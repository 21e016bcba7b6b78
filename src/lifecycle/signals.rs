//! OS signal handling.
//!
//! SIGTERM and SIGINT (Ctrl+C elsewhere) trigger the shared `Shutdown`. The
//! config is immutable once loaded, so SIGHUP is not handled.

use tracing::{error, info};

use crate::lifecycle::shutdown::Shutdown;

/// Wait for a termination signal, then trigger `shutdown`.
pub async fn shutdown_on_signal(shutdown: Shutdown) {
    wait_for_signal().await;
    shutdown.trigger();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut int) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
            ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM, shutting down"),
        _ = int.recv() => info!("Received SIGINT, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
