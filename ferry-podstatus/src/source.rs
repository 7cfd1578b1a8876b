//! Pod lookup
//!
//! The service reads pod state through [`PodSource`]. In the control pod
//! that is `kubectl`, which runs with the service account of the run.

use async_trait::async_trait;
use ferry_core::domain::status::PodInfo;
use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PodSourceError {
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("lookup of pod '{pod}' failed ({status}): {stderr}")]
    Command {
        pod: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("cannot parse pod '{pod}': {source}")]
    Parse {
        pod: String,
        source: serde_json::Error,
    },
}

/// Source of container states
#[async_trait]
pub trait PodSource: Send + Sync {
    /// Current container states of the named pod
    async fn pod(&self, name: &str) -> Result<PodInfo, PodSourceError>;
}

/// Looks pods up with `kubectl get pod <name> --output json`
#[derive(Debug, Clone)]
pub struct KubectlPodSource {
    kubectl: String,
    namespace: Option<String>,
}

impl KubectlPodSource {
    pub fn new(kubectl: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            kubectl: kubectl.into(),
            namespace,
        }
    }

    fn args(&self, pod: &str) -> Vec<String> {
        let mut args = vec![
            "get".to_string(),
            "pod".to_string(),
            pod.to_string(),
            "--output".to_string(),
            "json".to_string(),
        ];
        if let Some(namespace) = &self.namespace {
            args.push("--namespace".to_string());
            args.push(namespace.clone());
        }
        args
    }
}

#[async_trait]
impl PodSource for KubectlPodSource {
    async fn pod(&self, name: &str) -> Result<PodInfo, PodSourceError> {
        let args = self.args(name);
        debug!(kubectl = %self.kubectl, ?args, "Looking up pod");

        let output = Command::new(&self.kubectl)
            .args(&args)
            .output()
            .await
            .map_err(|source| PodSourceError::Spawn {
                program: self.kubectl.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PodSourceError::Command {
                pod: name.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let pod: Pod =
            serde_json::from_slice(&output.stdout).map_err(|source| PodSourceError::Parse {
                pod: name.to_string(),
                source,
            })?;

        Ok(PodInfo::from_pod(&pod))
    }
}
