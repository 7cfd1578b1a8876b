//! Container states and their aggregation
//!
//! The status aggregator reduces the raw states of a set of containers to a
//! single pod-level state. Watchers only ever act on [`AggregateState::Completed`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::{ContainerState as K8sContainerState, ContainerStatus, Pod};
use serde::{Deserialize, Serialize};

/// Raw state of a single container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Waiting,
    Running,
    Terminated { exit_code: i32 },
    Unknown,
}

impl ContainerState {
    pub fn from_k8s(state: Option<&K8sContainerState>) -> Self {
        match state {
            Some(state) if state.running.is_some() => ContainerState::Running,
            Some(state) => match &state.terminated {
                Some(terminated) => ContainerState::Terminated {
                    exit_code: terminated.exit_code,
                },
                None if state.waiting.is_some() => ContainerState::Waiting,
                None => ContainerState::Unknown,
            },
            None => ContainerState::Unknown,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ContainerState::Terminated { exit_code: 0 })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ContainerState::Terminated { exit_code } if *exit_code != 0)
    }
}

/// Pod-level state reported by the status aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateState {
    Completed,
    Running,
    Waiting,
    Failed,
    Unknown,
}

impl AggregateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateState::Completed => "Completed",
            AggregateState::Running => "Running",
            AggregateState::Waiting => "Waiting",
            AggregateState::Failed => "Failed",
            AggregateState::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AggregateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Completed" => Ok(AggregateState::Completed),
            "Running" => Ok(AggregateState::Running),
            "Waiting" => Ok(AggregateState::Waiting),
            "Failed" => Ok(AggregateState::Failed),
            "Unknown" => Ok(AggregateState::Unknown),
            other => Err(format!("unknown aggregate state '{}'", other)),
        }
    }
}

/// Aggregate the states of the named containers
///
/// First match wins:
/// 1. any named container terminated with a non-zero exit code: `Failed`
/// 2. any is waiting and none is running: `Waiting`
/// 3. all terminated successfully: `Completed`
/// 4. any is running: `Running`
/// 5. otherwise: `Unknown`
///
/// Blank names are ignored and an empty name set is `Completed`. Names that
/// are not present in `containers` count as neither waiting, running nor
/// completed, so they hold back `Completed`.
pub fn aggregate<'a, I>(containers: &BTreeMap<String, ContainerState>, names: I) -> AggregateState
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        return AggregateState::Completed;
    }

    let states: Vec<Option<&ContainerState>> =
        names.iter().map(|name| containers.get(*name)).collect();

    let failed = states.iter().flatten().any(|state| state.is_failure());
    let waiting = states
        .iter()
        .flatten()
        .any(|state| **state == ContainerState::Waiting);
    let running = states
        .iter()
        .flatten()
        .any(|state| **state == ContainerState::Running);
    let completed = states
        .iter()
        .all(|state| state.is_some_and(ContainerState::is_success));

    if failed {
        AggregateState::Failed
    } else if waiting && !running {
        AggregateState::Waiting
    } else if completed {
        AggregateState::Completed
    } else if running {
        AggregateState::Running
    } else {
        AggregateState::Unknown
    }
}

/// Raw container states of one pod
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub containers: BTreeMap<String, ContainerState>,
    pub init_containers: BTreeMap<String, ContainerState>,
}

impl PodInfo {
    pub fn from_pod(pod: &Pod) -> Self {
        let status = pod.status.as_ref();
        let collect = |statuses: Option<&Vec<ContainerStatus>>| {
            statuses
                .into_iter()
                .flatten()
                .map(|status| {
                    (
                        status.name.clone(),
                        ContainerState::from_k8s(status.state.as_ref()),
                    )
                })
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            containers: collect(status.and_then(|s| s.container_statuses.as_ref())),
            init_containers: collect(status.and_then(|s| s.init_container_statuses.as_ref())),
        }
    }

    /// Aggregate over the named main containers
    pub fn state_of<'a, I>(&self, names: I) -> AggregateState
    where
        I: IntoIterator<Item = &'a str>,
    {
        aggregate(&self.containers, names)
    }

    /// Aggregate over every main container of the pod
    pub fn containers_state(&self) -> AggregateState {
        aggregate(&self.containers, self.containers.keys().map(String::as_str))
    }

    /// Aggregate over every init container of the pod
    pub fn init_containers_state(&self) -> AggregateState {
        aggregate(
            &self.init_containers,
            self.init_containers.keys().map(String::as_str),
        )
    }
}
