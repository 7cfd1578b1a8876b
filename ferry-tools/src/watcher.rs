//! Stage watcher
//!
//! Runs as a main container of every stage pod. Once the containers the
//! stage waits for are `Completed` it deletes the `steps-running` semaphore,
//! which releases the output resource wrappers.

use std::path::PathBuf;
use std::time::Duration;

use ferry_client::StatusClient;
use thiserror::Error;
use tracing::info;

use crate::markers::MarkerStore;

/// How often the status service is asked
pub const WATCH_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot remove semaphore {}: {source}", path.display())]
    RemoveSemaphore {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Pod whose containers are watched
    pub pod: String,
    /// Containers that have to complete
    pub containers: Vec<String>,
    /// Semaphore released on completion
    pub semaphore_file: PathBuf,
    pub interval: Duration,
}

/// Wait for the containers to complete, then release the semaphore
pub async fn watch<M: MarkerStore>(
    client: &StatusClient,
    config: &WatchConfig,
    markers: &M,
) -> Result<(), WatchError> {
    info!(
        pod = %config.pod,
        containers = %config.containers.join(","),
        status_url = client.base_url(),
        "Watching containers"
    );

    client
        .wait_for_completion(&config.pod, &config.containers, config.interval)
        .await;

    markers
        .remove(&config.semaphore_file)
        .await
        .map_err(|source| WatchError::RemoveSemaphore {
            path: config.semaphore_file.clone(),
            source,
        })?;

    info!(semaphore = %config.semaphore_file.display(), "Released semaphore");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::State;
    use axum::routing::get;

    use super::*;
    use crate::markers::memory::MemoryMarkers;

    const SEMAPHORE: &str = "/var/lock/ferry/steps-running";

    #[tokio::test]
    async fn test_semaphore_released_after_completion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/pod/{pod}",
                get(|State(calls): State<Arc<AtomicUsize>>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        "Running"
                    } else {
                        "Completed"
                    }
                }),
            )
            .with_state(calls.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let markers = MemoryMarkers::with(&[SEMAPHORE]);
        let config = WatchConfig {
            pod: "ferry.hello.1.01-build".to_string(),
            containers: vec!["compile".to_string()],
            semaphore_file: PathBuf::from(SEMAPHORE),
            interval: Duration::from_millis(10),
        };

        watch(&StatusClient::new(format!("http://{}", addr)), &config, &markers)
            .await
            .unwrap();

        assert!(!markers.contains(SEMAPHORE));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
