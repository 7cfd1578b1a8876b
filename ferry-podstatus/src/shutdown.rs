//! Graceful shutdown triggers

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::signal;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

/// Resolves once `path` no longer exists
///
/// Errors while checking are logged and the file is checked again on the
/// next tick.
pub async fn semaphore_removed(path: &Path, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match tokio::fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to check semaphore"),
        }
    }
}

/// Shutdown on Ctrl+C, SIGTERM or removal of the semaphore file
pub async fn shutdown_signal(semaphore: Option<PathBuf>, every: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let released = async {
        match &semaphore {
            Some(path) => semaphore_removed(path, every).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
        () = released => {
            info!("stages semaphore removed, initiating shutdown");
        }
    }
}
