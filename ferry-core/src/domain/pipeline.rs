//! Pipeline domain types
//!
//! A pipeline is a custom resource: standard object metadata plus a spec
//! holding the resource templates, triggers and stage templates. Stage
//! templates are plain pods and resource templates are plain containers, so
//! both reuse the `k8s-openapi` types.

use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{BUILD_NO_OFFSET_ANNOTATION, IMAGE_PULL_POLICY_ANNOTATION};

pub const API_VERSION: &str = "ferry.io/v1alpha1";
pub const KIND: &str = "Pipeline";

/// Errors raised while reading a pipeline document
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot parse pipeline document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid build number offset '{value}': {source}")]
    InvalidBuildNoOffset {
        value: String,
        source: std::num::ParseIntError,
    },
}

/// Pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PipelineSpec,
    #[serde(default)]
    pub status: PipelineStatus,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta::default(),
            spec: PipelineSpec::default(),
            status: PipelineStatus::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub stages: Vec<Pod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<Pod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<Pod>,
    #[serde(default, rename = "final", skip_serializing_if = "Option::is_none")]
    pub final_stage: Option<Pod>,
}

/// Reusable resource templates and the triggers that start a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    #[serde(default)]
    pub schedule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    #[serde(default)]
    pub build_no: i64,
}

impl Pipeline {
    /// Parse a pipeline from its YAML (or JSON) source
    pub fn from_yaml(source: &str) -> Result<Self, PipelineError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Pipeline name, empty if unset
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }

    /// Pull policy override for platform containers, if one is set
    pub fn image_pull_policy(&self) -> Option<&str> {
        self.annotation(IMAGE_PULL_POLICY_ANNOTATION)
            .filter(|policy| !policy.is_empty())
    }

    /// Offset added to every build number; 0 when the annotation is absent
    pub fn build_no_offset(&self) -> Result<i64, PipelineError> {
        match self.annotation(BUILD_NO_OFFSET_ANNOTATION) {
            None | Some("") => Ok(0),
            Some(value) => {
                value
                    .trim()
                    .parse()
                    .map_err(|source| PipelineError::InvalidBuildNoOffset {
                        value: value.to_string(),
                        source,
                    })
            }
        }
    }

    /// The optional stages in execution order: on-success, on-error, final
    pub fn optional_stages(&self) -> impl Iterator<Item = &Pod> {
        [
            self.spec.on_success.as_ref(),
            self.spec.on_error.as_ref(),
            self.spec.final_stage.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Every stage template: main stages first, then the optional ones
    pub fn all_stages(&self) -> impl Iterator<Item = &Pod> {
        self.spec.stages.iter().chain(self.optional_stages())
    }

    /// Stage templates that produce a stage pod
    ///
    /// A template with neither a name nor annotations is a placeholder and
    /// is not compiled.
    pub fn materialized_stages(&self) -> impl Iterator<Item = &Pod> {
        self.all_stages().filter(|stage| is_materialized(stage))
    }
}

/// Name of a stage template, empty if unset
pub fn stage_name(stage: &Pod) -> &str {
    stage.metadata.name.as_deref().unwrap_or_default()
}

fn is_materialized(stage: &Pod) -> bool {
    !stage_name(stage).is_empty() || stage.metadata.annotations.is_some()
}
