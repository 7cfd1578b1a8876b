//! Pipeline validator
//!
//! Pre-flight consistency checks over the pipeline graph. The checks run in
//! a fixed order and the first violation is returned.

use std::collections::HashSet;

use ferry_core::domain::annotations::StageAnnotations;
use ferry_core::domain::pipeline::{Pipeline, stage_name};
use ferry_core::protocol::TRANSIT_RESOURCE;
use thiserror::Error;
use tracing::{debug, info};

const PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];

/// A violated pipeline rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("restartPolicy of stage '{stage}' must not be set or set to \"Never\" (found '{policy}')")]
    RestartPolicy { stage: String, policy: String },

    #[error("stage '{stage}' must not have an owner reference")]
    OwnerReference { stage: String },

    #[error("resource name '{resource}' is used twice")]
    DuplicateResource { resource: String },

    #[error("stage '{stage}' uses the input resource '{resource}' twice")]
    DuplicateInput { stage: String, resource: String },

    #[error("stage '{stage}' uses the output resource '{resource}' twice")]
    DuplicateOutput { stage: String, resource: String },

    #[error("input resource '{resource}' referenced in stage '{stage}' does not exist")]
    UnknownInput { stage: String, resource: String },

    #[error("output resource '{resource}' referenced in stage '{stage}' does not exist")]
    UnknownOutput { stage: String, resource: String },

    #[error("service container '{service}' referenced in stage '{stage}' does not exist")]
    UnknownService { stage: String, service: String },

    #[error("there is no resource for trigger '{trigger}'")]
    TriggerWithoutResource { trigger: String },

    #[error("invalid trigger '{trigger}': every trigger needs to be an input resource of the first stage")]
    TriggerNotInFirstStage { trigger: String },

    #[error("invalid image pull policy '{policy}': must be one of Always, IfNotPresent, Never")]
    ImagePullPolicy { policy: String },
}

type Check = fn(&Pipeline) -> Result<(), ValidationError>;

const CHECKS: [(&str, Check); 9] = [
    ("restart policy", restart_policy_is_never),
    ("owner references", no_owner_references),
    ("unique resource names", no_duplicate_resource_names),
    ("unique resource references", no_duplicate_resource_references),
    ("referenced resources exist", referenced_resources_exist),
    ("services exist", services_exist),
    ("triggers have resources", triggers_have_resources),
    ("triggers feed the first stage", triggers_are_first_stage_inputs),
    ("image pull policy", valid_image_pull_policy),
];

/// Validate a pipeline
///
/// Pure: the outcome depends only on the pipeline's content.
pub fn validate(pipeline: &Pipeline) -> Result<(), ValidationError> {
    for (name, check) in CHECKS {
        if let Err(err) = check(pipeline) {
            info!(pipeline = pipeline.name(), error = %err, "Validation failed");
            return Err(err);
        }
        debug!(pipeline = pipeline.name(), check = name, "Validated");
    }

    info!(pipeline = pipeline.name(), "Validation successful");
    Ok(())
}

fn find_duplicate<'a>(items: impl IntoIterator<Item = &'a String>) -> Option<&'a String> {
    let mut seen: HashSet<&String> = HashSet::new();
    items.into_iter().find(|item| !seen.insert(*item))
}

fn restart_policy_is_never(pipeline: &Pipeline) -> Result<(), ValidationError> {
    for stage in pipeline.all_stages() {
        let policy = stage
            .spec
            .as_ref()
            .and_then(|spec| spec.restart_policy.as_deref())
            .unwrap_or_default();

        if !policy.is_empty() && policy != "Never" {
            return Err(ValidationError::RestartPolicy {
                stage: stage_name(stage).to_string(),
                policy: policy.to_string(),
            });
        }
    }
    Ok(())
}

fn no_owner_references(pipeline: &Pipeline) -> Result<(), ValidationError> {
    for stage in pipeline.all_stages() {
        if stage
            .metadata
            .owner_references
            .as_ref()
            .is_some_and(|refs| !refs.is_empty())
        {
            return Err(ValidationError::OwnerReference {
                stage: stage_name(stage).to_string(),
            });
        }
    }
    Ok(())
}

fn no_duplicate_resource_names(pipeline: &Pipeline) -> Result<(), ValidationError> {
    let names = pipeline.spec.resources.containers.iter().map(|c| &c.name);
    match find_duplicate(names) {
        Some(resource) => Err(ValidationError::DuplicateResource {
            resource: resource.clone(),
        }),
        None => Ok(()),
    }
}

fn no_duplicate_resource_references(pipeline: &Pipeline) -> Result<(), ValidationError> {
    for stage in pipeline.all_stages() {
        let annotations = StageAnnotations::from_pod(stage);

        if let Some(resource) = find_duplicate(&annotations.inputs) {
            return Err(ValidationError::DuplicateInput {
                stage: stage_name(stage).to_string(),
                resource: resource.clone(),
            });
        }
        if let Some(resource) = find_duplicate(&annotations.outputs) {
            return Err(ValidationError::DuplicateOutput {
                stage: stage_name(stage).to_string(),
                resource: resource.clone(),
            });
        }
    }
    Ok(())
}

fn referenced_resources_exist(pipeline: &Pipeline) -> Result<(), ValidationError> {
    let known: HashSet<&str> = pipeline
        .spec
        .resources
        .containers
        .iter()
        .map(|c| c.name.as_str())
        .chain([TRANSIT_RESOURCE])
        .collect();

    for stage in pipeline.all_stages() {
        let annotations = StageAnnotations::from_pod(stage);

        if let Some(resource) = annotations.inputs.iter().find(|r| !known.contains(r.as_str())) {
            return Err(ValidationError::UnknownInput {
                stage: stage_name(stage).to_string(),
                resource: resource.clone(),
            });
        }
        if let Some(resource) = annotations.outputs.iter().find(|r| !known.contains(r.as_str())) {
            return Err(ValidationError::UnknownOutput {
                stage: stage_name(stage).to_string(),
                resource: resource.clone(),
            });
        }
    }
    Ok(())
}

fn services_exist(pipeline: &Pipeline) -> Result<(), ValidationError> {
    for stage in pipeline.all_stages() {
        let annotations = StageAnnotations::from_pod(stage);
        let containers: HashSet<&str> = stage
            .spec
            .iter()
            .flat_map(|spec| &spec.containers)
            .map(|c| c.name.as_str())
            .collect();

        if let Some(service) = annotations
            .services
            .iter()
            .find(|s| !containers.contains(s.as_str()))
        {
            return Err(ValidationError::UnknownService {
                stage: stage_name(stage).to_string(),
                service: service.clone(),
            });
        }
    }
    Ok(())
}

fn triggers_have_resources(pipeline: &Pipeline) -> Result<(), ValidationError> {
    let resources: HashSet<&str> = pipeline
        .spec
        .resources
        .containers
        .iter()
        .map(|c| c.name.as_str())
        .collect();

    for trigger in &pipeline.spec.resources.triggers {
        if !trigger.name.is_empty() && !resources.contains(trigger.name.as_str()) {
            return Err(ValidationError::TriggerWithoutResource {
                trigger: trigger.name.clone(),
            });
        }
    }
    Ok(())
}

fn triggers_are_first_stage_inputs(pipeline: &Pipeline) -> Result<(), ValidationError> {
    let first_stage_inputs = pipeline
        .spec
        .stages
        .first()
        .map(|stage| StageAnnotations::from_pod(stage).inputs)
        .unwrap_or_default();

    for trigger in &pipeline.spec.resources.triggers {
        if !trigger.name.is_empty() && !first_stage_inputs.contains(&trigger.name) {
            return Err(ValidationError::TriggerNotInFirstStage {
                trigger: trigger.name.clone(),
            });
        }
    }
    Ok(())
}

fn valid_image_pull_policy(pipeline: &Pipeline) -> Result<(), ValidationError> {
    match pipeline.image_pull_policy() {
        Some(policy) if !PULL_POLICIES.contains(&policy) => Err(ValidationError::ImagePullPolicy {
            policy: policy.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::protocol::{IMAGE_PULL_POLICY_ANNOTATION, INPUTS_ANNOTATION};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    const VALID: &str = r#"
metadata:
  name: hello
spec:
  resources:
    triggers:
      - name: git
    containers:
      - name: git
        image: concourse/git-resource
      - name: image
        image: concourse/docker-image-resource
  stages:
    - metadata:
        name: build
        annotations:
          ferry.io/inputs: git
          ferry.io/outputs: transit
          ferry.io/services: db
      spec:
        containers:
          - name: make
            image: alpine
          - name: db
            image: postgres
    - metadata:
        name: publish
        annotations:
          ferry.io/inputs: transit
          ferry.io/outputs: image
      spec:
        containers:
          - name: package
            image: alpine
"#;

    fn valid() -> Pipeline {
        Pipeline::from_yaml(VALID).unwrap()
    }

    fn set_stage_annotation(pipeline: &mut Pipeline, stage: usize, key: &str, value: &str) {
        pipeline.spec.stages[stage]
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
    }

    #[test]
    fn test_valid_pipeline() {
        assert_eq!(validate(&valid()), Ok(()));
    }

    #[test]
    fn test_validation_is_pure() {
        let a = valid();
        let b = valid();
        assert_eq!(validate(&a), validate(&b));

        let mut c = valid();
        c.spec.resources.containers.push(c.spec.resources.containers[0].clone());
        let d = c.clone();
        assert_eq!(validate(&c), validate(&d));
    }

    #[test]
    fn test_restart_policy_must_be_never() {
        let mut pipeline = valid();
        pipeline.spec.stages[1].spec.as_mut().unwrap().restart_policy = Some("Always".into());

        assert_eq!(
            validate(&pipeline),
            Err(ValidationError::RestartPolicy {
                stage: "publish".into(),
                policy: "Always".into()
            })
        );
    }

    #[test]
    fn test_owner_reference_is_rejected() {
        let mut pipeline = valid();
        pipeline.spec.stages[0].metadata.owner_references = Some(vec![OwnerReference {
            api_version: "v1".into(),
            kind: "Pod".into(),
            name: "owner".into(),
            uid: "1234".into(),
            ..Default::default()
        }]);

        assert_eq!(
            validate(&pipeline),
            Err(ValidationError::OwnerReference {
                stage: "build".into()
            })
        );
    }

    #[test]
    fn test_duplicate_resource_name() {
        let mut pipeline = valid();
        let git = pipeline.spec.resources.containers[0].clone();
        pipeline.spec.resources.containers.push(git);

        let err = validate(&pipeline).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateResource {
                resource: "git".into()
            }
        );
        assert!(err.to_string().contains("'git'"));
    }

    #[test]
    fn test_duplicate_input_names_stage_and_resource() {
        let mut pipeline = valid();
        set_stage_annotation(&mut pipeline, 0, INPUTS_ANNOTATION, "git,git");

        let err = validate(&pipeline).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateInput {
                stage: "build".into(),
                resource: "git".into()
            }
        );
        assert!(err.to_string().contains("'build'"));
        assert!(err.to_string().contains("'git'"));
    }

    #[test]
    fn test_duplicate_output() {
        let mut pipeline = valid();
        set_stage_annotation(&mut pipeline, 1, "ferry.io/outputs", "image, image");

        assert_eq!(
            validate(&pipeline),
            Err(ValidationError::DuplicateOutput {
                stage: "publish".into(),
                resource: "image".into()
            })
        );
    }

    #[test]
    fn test_unknown_resource() {
        let mut pipeline = valid();
        set_stage_annotation(&mut pipeline, 1, INPUTS_ANNOTATION, "transit,cache");

        assert_eq!(
            validate(&pipeline),
            Err(ValidationError::UnknownInput {
                stage: "publish".into(),
                resource: "cache".into()
            })
        );
    }

    #[test]
    fn test_transit_needs_no_declaration() {
        let pipeline = valid();
        assert!(
            !pipeline
                .spec
                .resources
                .containers
                .iter()
                .any(|c| c.name == TRANSIT_RESOURCE)
        );
        assert!(validate(&pipeline).is_ok());
    }

    #[test]
    fn test_single_unknown_service() {
        let mut pipeline = valid();
        set_stage_annotation(&mut pipeline, 1, "ferry.io/services", "redis");

        assert_eq!(
            validate(&pipeline),
            Err(ValidationError::UnknownService {
                stage: "publish".into(),
                service: "redis".into()
            })
        );
    }

    #[test]
    fn test_trigger_without_resource() {
        let mut pipeline = valid();
        pipeline.spec.resources.triggers[0].name = "cron".into();

        assert_eq!(
            validate(&pipeline),
            Err(ValidationError::TriggerWithoutResource {
                trigger: "cron".into()
            })
        );
    }

    #[test]
    fn test_trigger_must_feed_first_stage() {
        let mut pipeline = valid();
        pipeline.spec.resources.triggers[0].name = "image".into();

        assert_eq!(
            validate(&pipeline),
            Err(ValidationError::TriggerNotInFirstStage {
                trigger: "image".into()
            })
        );
    }

    #[test]
    fn test_image_pull_policy() {
        let mut pipeline = valid();
        pipeline.metadata.annotations = Some(
            [(IMAGE_PULL_POLICY_ANNOTATION.to_string(), "Sometimes".to_string())]
                .into_iter()
                .collect(),
        );
        assert_eq!(
            validate(&pipeline),
            Err(ValidationError::ImagePullPolicy {
                policy: "Sometimes".into()
            })
        );

        pipeline.metadata.annotations = Some(
            [(IMAGE_PULL_POLICY_ANNOTATION.to_string(), "Never".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(validate(&pipeline).is_ok());
    }

    #[test]
    fn test_first_violation_wins() {
        let mut pipeline = valid();
        pipeline.spec.resources.triggers[0].name = "cron".into();
        set_stage_annotation(&mut pipeline, 0, INPUTS_ANNOTATION, "git,git");

        assert!(matches!(
            validate(&pipeline),
            Err(ValidationError::DuplicateInput { .. })
        ));
    }
}
