//! Pod state endpoints

use std::time::Duration;

use ferry_core::domain::status::AggregateState;
use ferry_core::dto::status::{ContainerKind, PodStateQuery};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::StatusClient;
use crate::error::Result;

impl StatusClient {
    // =============================================================================
    // Pod State
    // =============================================================================

    /// Aggregate state of the named main containers of a pod
    ///
    /// # Arguments
    /// * `pod` - Name of the pod
    /// * `containers` - Container names; an empty list is always `Completed`
    pub async fn pod_state<S: AsRef<str>>(&self, pod: &str, containers: &[S]) -> Result<AggregateState> {
        self.query(pod, &PodStateQuery::named(containers)).await
    }

    /// Aggregate state of every container of one kind
    pub async fn pod_state_of(&self, pod: &str, kind: ContainerKind) -> Result<AggregateState> {
        self.query(pod, &PodStateQuery::all(kind)).await
    }

    async fn query(&self, pod: &str, query: &PodStateQuery) -> Result<AggregateState> {
        let url = format!("{}/pod/{}", self.base_url, pod);
        let response = self.client.get(&url).query(query).send().await?;

        self.handle_state_response(response).await
    }

    /// Poll until the named containers are `Completed`
    ///
    /// There is no timeout. Failed requests are logged and retried on the
    /// next tick.
    pub async fn wait_for_completion<S: AsRef<str>>(
        &self,
        pod: &str,
        containers: &[S],
        every: Duration,
    ) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = None;

        loop {
            ticker.tick().await;

            match self.pod_state(pod, containers).await {
                Ok(AggregateState::Completed) => {
                    info!(pod, "Containers completed");
                    return;
                }
                Ok(state) => {
                    if last != Some(state) {
                        info!(pod, state = %state, "Waiting for containers to complete");
                        last = Some(state);
                    } else {
                        debug!(pod, state = %state, "Still waiting");
                    }
                }
                Err(e) if e.is_not_found() => {
                    error!(pod, error = %e, "Status service rejected the query, retrying")
                }
                Err(e) if e.is_server_error() => {
                    warn!(pod, error = %e, "Status service failed, retrying")
                }
                Err(e) => warn!(pod, error = %e, "Failed to query pod state, retrying"),
            }
        }
    }
}
