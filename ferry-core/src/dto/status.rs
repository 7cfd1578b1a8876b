//! Status query DTOs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::annotations::split_list;

/// Text returned for requests the status service does not understand
pub const USAGE: &str = "unknown path ... needs to be:
/pod/<pod>?containers=<container1>,<container2>,...
/pod/<pod>?state=initcontainers
/pod/<pod>?state=containers
";

/// Container category of a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Containers,
    InitContainers,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Containers => "containers",
            ContainerKind::InitContainers => "initcontainers",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "containers" => Ok(ContainerKind::Containers),
            "initcontainers" => Ok(ContainerKind::InitContainers),
            other => Err(format!("unknown container kind '{}'", other)),
        }
    }
}

/// Query string of `GET /pod/{pod}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodStateQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub containers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Which containers a query asks about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// An explicit list of main containers
    Named(Vec<String>),
    /// Every container of one category
    All(ContainerKind),
}

impl PodStateQuery {
    pub fn named<S: AsRef<str>>(containers: &[S]) -> Self {
        Self {
            containers: Some(
                containers
                    .iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            state: None,
        }
    }

    pub fn all(kind: ContainerKind) -> Self {
        Self {
            containers: None,
            state: Some(kind.to_string()),
        }
    }

    /// `containers` wins over `state`; `None` for anything else
    pub fn selection(&self) -> Option<Selection> {
        if let Some(containers) = &self.containers {
            return Some(Selection::Named(split_list(containers)));
        }

        self.state
            .as_deref()
            .and_then(|state| state.parse().ok())
            .map(Selection::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_selection() {
        let query = PodStateQuery::named(&["build", "test"]);
        assert_eq!(query.containers.as_deref(), Some("build,test"));
        assert_eq!(
            query.selection(),
            Some(Selection::Named(vec!["build".into(), "test".into()]))
        );
    }

    #[test]
    fn test_empty_containers_is_an_empty_selection() {
        let query = PodStateQuery {
            containers: Some(String::new()),
            state: None,
        };
        assert_eq!(query.selection(), Some(Selection::Named(vec![])));
    }

    #[test]
    fn test_state_selection() {
        assert_eq!(
            PodStateQuery::all(ContainerKind::InitContainers).selection(),
            Some(Selection::All(ContainerKind::InitContainers))
        );

        let query = PodStateQuery {
            containers: None,
            state: Some("sidecars".into()),
        };
        assert_eq!(query.selection(), None);
        assert_eq!(PodStateQuery::default().selection(), None);
    }
}
