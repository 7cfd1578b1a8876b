//! Pod State API Handler

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use ferry_core::domain::status::{AggregateState, PodInfo};
use ferry_core::dto::status::{ContainerKind, PodStateQuery, Selection};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /pod/{pod}?containers=a,b
/// GET /pod/{pod}?state=initcontainers|containers
/// Aggregated state of the selected containers as plain text
pub async fn get_pod_state(
    State(state): State<AppState>,
    Path(pod): Path<String>,
    query: Result<Query<PodStateQuery>, QueryRejection>,
) -> ApiResult<String> {
    let Query(query) = query.map_err(|e| {
        tracing::debug!(pod = %pod, error = %e, "Malformed query");
        ApiError::Usage
    })?;
    let selection = query.selection().ok_or(ApiError::Usage)?;

    let info = match state.source.pod(&pod).await {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!(pod = %pod, error = %e, "Pod lookup failed");
            return Ok(AggregateState::Unknown.to_string());
        }
    };

    let aggregate = aggregate(&info, &selection);
    tracing::debug!(pod = %pod, ?selection, state = %aggregate, "Pod state");

    Ok(aggregate.to_string())
}

fn aggregate(info: &PodInfo, selection: &Selection) -> AggregateState {
    match selection {
        Selection::Named(names) => info.state_of(names.iter().map(String::as_str)),
        Selection::All(ContainerKind::Containers) => info.containers_state(),
        Selection::All(ContainerKind::InitContainers) => info.init_containers_state(),
    }
}
