//! Ferry Status Client
//!
//! HTTP client for the pod status service running in the control pod of a
//! run. Watchers use it to learn when the containers of their stage pod
//! completed.
//!
//! # Example
//!
//! ```no_run
//! use ferry_client::StatusClient;
//! use ferry_core::domain::status::AggregateState;
//!
//! #[tokio::main]
//! async fn main() -> ferry_client::Result<()> {
//!     let client = StatusClient::new("http://10.0.0.12:8080");
//!
//!     let state = client.pod_state("ferry.hello.42.01-build", &["compile"]).await?;
//!     if state == AggregateState::Completed {
//!         println!("build finished");
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod pods;

pub use error::{ClientError, Result};

use ferry_core::domain::status::AggregateState;
use reqwest::Client;

/// HTTP client for the pod status service
#[derive(Debug, Clone)]
pub struct StatusClient {
    /// Base URL of the service (e.g., "http://10.0.0.12:8080")
    base_url: String,
    client: Client,
}

impl StatusClient {
    /// Create a new status client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the status service
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new status client with a custom HTTP client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the status service
    /// * `client` - A configured reqwest Client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the status service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and parse the plain-text state body
    async fn handle_state_response(&self, response: reqwest::Response) -> Result<AggregateState> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        let body = response.text().await?;
        body.parse().map_err(ClientError::ParseError)
    }
}
