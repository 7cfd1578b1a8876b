//! Pipeline defaulter
//!
//! Fills in the values a pipeline author may omit. The input is never
//! modified: the defaulted copy is returned together with the list of
//! changes, which callers use for audit logging.

use ferry_core::domain::pipeline::{Pipeline, stage_name};
use ferry_core::protocol::BUILD_NO_OFFSET_ANNOTATION;
use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use tracing::info;

/// Schedule given to triggers that do not declare one
pub const DEFAULT_TRIGGER_SCHEDULE: &str = "*/5 * * * *";

/// Restart policy every stage pod runs with
pub const RESTART_POLICY_NEVER: &str = "Never";

/// One defaulted field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    /// Path of the field inside the pipeline document
    pub path: String,
    /// Value that was filled in
    pub value: String,
}

impl Change {
    fn new(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Result of [`apply_defaults`]
#[derive(Debug, Clone)]
pub struct Defaulted {
    pub pipeline: Pipeline,
    pub changes: Vec<Change>,
}

/// Apply every default to a copy of `pipeline`
///
/// Runs in a fixed order: optional stage names, trigger schedules, the
/// build number offset and finally restart policies. Applying the defaults
/// to an already defaulted pipeline returns it unchanged with no changes.
pub fn apply_defaults(pipeline: &Pipeline) -> Defaulted {
    let mut pipeline = pipeline.clone();
    let mut changes = Vec::new();

    set_optional_stage_names(&mut pipeline, &mut changes);
    set_trigger_schedules(&mut pipeline, &mut changes);
    set_build_no_offset(&mut pipeline, &mut changes);
    set_restart_policies(&mut pipeline, &mut changes);

    for change in &changes {
        info!(
            pipeline = pipeline.name(),
            path = %change.path,
            value = %change.value,
            "Applied default"
        );
    }

    Defaulted { pipeline, changes }
}

fn has_annotations(stage: &Pod) -> bool {
    stage
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|annotations| !annotations.is_empty())
}

fn has_containers(stage: &Pod) -> bool {
    stage
        .spec
        .as_ref()
        .is_some_and(|spec| !spec.containers.is_empty())
}

fn set_optional_stage_names(pipeline: &mut Pipeline, changes: &mut Vec<Change>) {
    let spec = &mut pipeline.spec;
    let optional = [
        ("final", "final", spec.final_stage.as_mut()),
        ("on-error", "onError", spec.on_error.as_mut()),
        ("on-success", "onSuccess", spec.on_success.as_mut()),
    ];

    for (name, field, stage) in optional {
        let Some(stage) = stage else { continue };
        if !stage_name(stage).is_empty() {
            continue;
        }
        // an empty template stays unnamed so it is never materialized
        if !has_annotations(stage) && !has_containers(stage) {
            continue;
        }

        stage.metadata.name = Some(name.to_string());
        changes.push(Change::new(format!("spec.{}.metadata.name", field), name));
    }
}

fn set_trigger_schedules(pipeline: &mut Pipeline, changes: &mut Vec<Change>) {
    for (i, trigger) in pipeline.spec.resources.triggers.iter_mut().enumerate() {
        if trigger.schedule.is_empty() {
            trigger.schedule = DEFAULT_TRIGGER_SCHEDULE.to_string();
            changes.push(Change::new(
                format!("spec.resources.triggers[{}].schedule", i),
                DEFAULT_TRIGGER_SCHEDULE,
            ));
        }
    }
}

fn set_build_no_offset(pipeline: &mut Pipeline, changes: &mut Vec<Change>) {
    let annotations = pipeline.metadata.annotations.get_or_insert_with(Default::default);
    let offset = annotations
        .entry(BUILD_NO_OFFSET_ANNOTATION.to_string())
        .or_default();

    if offset.is_empty() {
        *offset = "0".to_string();
        changes.push(Change::new(
            format!("metadata.annotations[{}]", BUILD_NO_OFFSET_ANNOTATION),
            "0",
        ));
    }
}

fn set_restart_policies(pipeline: &mut Pipeline, changes: &mut Vec<Change>) {
    for (i, stage) in pipeline.spec.stages.iter_mut().enumerate() {
        let spec = stage.spec.get_or_insert_with(Default::default);
        if spec.restart_policy.as_deref().unwrap_or_default().is_empty() {
            spec.restart_policy = Some(RESTART_POLICY_NEVER.to_string());
            changes.push(Change::new(
                format!("spec.stages[{}].spec.restartPolicy", i),
                RESTART_POLICY_NEVER,
            ));
        }
    }

    let spec = &mut pipeline.spec;
    let optional = [
        ("onSuccess", spec.on_success.as_mut()),
        ("onError", spec.on_error.as_mut()),
        ("final", spec.final_stage.as_mut()),
    ];

    for (field, stage) in optional {
        let Some(spec) = stage.and_then(|stage| stage.spec.as_mut()) else {
            continue;
        };
        if spec.containers.is_empty() {
            continue;
        }
        if spec.restart_policy.as_deref().unwrap_or_default().is_empty() {
            spec.restart_policy = Some(RESTART_POLICY_NEVER.to_string());
            changes.push(Change::new(
                format!("spec.{}.spec.restartPolicy", field),
                RESTART_POLICY_NEVER,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE: &str = r#"
metadata:
  name: hello
spec:
  resources:
    triggers:
      - name: git
      - name: nightly
        schedule: "0 2 * * *"
    containers:
      - name: git
        image: concourse/git-resource
      - name: nightly
        image: concourse/time-resource
  stages:
    - metadata:
        name: build
      spec:
        containers:
          - name: make
            image: alpine
    - metadata:
        name: test
      spec:
        restartPolicy: Never
        containers:
          - name: test
            image: alpine
  onSuccess:
    spec:
      containers:
        - name: notify
          image: alpine
  onError:
    metadata:
      annotations:
        ferry.io/outputs: slack
  final:
    metadata:
      labels:
        team: ci
"#;

    fn pipeline() -> Pipeline {
        Pipeline::from_yaml(PIPELINE).unwrap()
    }

    #[test]
    fn test_defaults_are_applied() {
        let Defaulted { pipeline, changes } = apply_defaults(&pipeline());

        assert_eq!(
            pipeline.spec.on_success.as_ref().map(stage_name),
            Some("on-success")
        );
        assert_eq!(pipeline.spec.on_error.as_ref().map(stage_name), Some("on-error"));
        assert_eq!(pipeline.spec.final_stage.as_ref().map(stage_name), Some(""));

        assert_eq!(pipeline.spec.resources.triggers[0].schedule, DEFAULT_TRIGGER_SCHEDULE);
        assert_eq!(pipeline.spec.resources.triggers[1].schedule, "0 2 * * *");
        assert_eq!(pipeline.annotation(BUILD_NO_OFFSET_ANNOTATION), Some("0"));

        let policy = |stage: &Pod| {
            stage
                .spec
                .as_ref()
                .and_then(|spec| spec.restart_policy.clone())
        };
        assert_eq!(policy(&pipeline.spec.stages[0]).as_deref(), Some("Never"));
        assert_eq!(
            pipeline.spec.on_success.as_ref().and_then(policy).as_deref(),
            Some("Never")
        );
        assert_eq!(pipeline.spec.on_error.as_ref().and_then(policy), None);

        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "spec.onError.metadata.name",
                "spec.onSuccess.metadata.name",
                "spec.resources.triggers[0].schedule",
                "metadata.annotations[ferry.io/build-no-offset]",
                "spec.stages[0].spec.restartPolicy",
                "spec.onSuccess.spec.restartPolicy",
            ]
        );
    }

    #[test]
    fn test_input_is_not_modified() {
        let original = pipeline();
        let _ = apply_defaults(&original);
        assert_eq!(original, pipeline());
    }

    #[test]
    fn test_defaulting_is_idempotent() {
        let once = apply_defaults(&pipeline());
        let twice = apply_defaults(&once.pipeline);

        assert_eq!(once.pipeline, twice.pipeline);
        assert!(twice.changes.is_empty());
    }

    #[test]
    fn test_existing_offset_is_kept() {
        let mut pipeline = pipeline();
        pipeline.metadata.annotations = Some(
            [(BUILD_NO_OFFSET_ANNOTATION.to_string(), "12".to_string())]
                .into_iter()
                .collect(),
        );

        let defaulted = apply_defaults(&pipeline);
        assert_eq!(defaulted.pipeline.annotation(BUILD_NO_OFFSET_ANNOTATION), Some("12"));
        assert!(
            !defaulted
                .changes
                .iter()
                .any(|c| c.path.contains(BUILD_NO_OFFSET_ANNOTATION))
        );
    }
}
