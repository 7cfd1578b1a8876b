//! Ferry Pod Status
//!
//! Runs in the control pod of a run. Watchers in the stage pods ask it for
//! the aggregated state of their containers; the service answers from
//! `kubectl` and stops once the run agent removes the stages semaphore.

mod api;
mod config;
mod shutdown;
mod source;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, SEMAPHORE_POLL_INTERVAL};
use crate::shutdown::shutdown_signal;
use crate::source::{KubectlPodSource, PodSource};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;

    info!("Starting Ferry Pod Status...");

    let source: Arc<dyn PodSource> = Arc::new(KubectlPodSource::new(
        config.kubectl.clone(),
        config.namespace.clone(),
    ));
    let app = api::create_router(source);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;

    info!("Listening on {}", config.addr);
    match &config.semaphore_file {
        Some(path) => info!("Serving until {} is removed", path.display()),
        None => info!("No semaphore file configured, serving until terminated"),
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            config.semaphore_file.clone(),
            SEMAPHORE_POLL_INTERVAL,
        ))
        .await
        .context("Server error")?;

    info!("Ferry Pod Status stopped");
    Ok(())
}
