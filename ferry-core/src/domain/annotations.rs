//! Typed stage annotations
//!
//! Stage templates carry their ferry configuration as string annotations.
//! Lists are comma separated and env overrides are newline separated; this
//! module is the only place that splits or joins those strings.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, Pod};

use crate::protocol::{
    DEBUG_CONTAINER, DEBUG_CONTAINER_ANNOTATION, DEBUG_RESOURCES_ANNOTATION, ENABLED,
    FIRST_INIT_CONTAINERS_ANNOTATION, INPUTS_ANNOTATION, INPUTS_ENVS_ANNOTATION,
    OUTPUTS_ANNOTATION, OUTPUTS_ENVS_ANNOTATION, SERVICES_ANNOTATION,
};

/// Split a comma-separated annotation value, dropping blank tokens
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join a list back into its annotation form
pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// Environment overrides for resource containers, grouped by resource
///
/// Each line of the annotation is `<resource>.<path>=<value>`. The resource
/// is the first dot segment of the key; the value is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceEnvs {
    by_resource: BTreeMap<String, Vec<(String, String)>>,
}

impl ResourceEnvs {
    pub fn parse(annotation: &str) -> Self {
        let mut by_resource: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();

        for line in annotation.lines() {
            let line = line.trim_start_matches([' ', '\t']);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let resource = key.split('.').next().unwrap_or_default();
            by_resource
                .entry(resource.to_string())
                .or_default()
                .push((key.to_string(), value.to_string()));
        }

        Self { by_resource }
    }

    /// Overrides for one resource, in annotation order
    pub fn for_resource(&self, resource: &str) -> Vec<EnvVar> {
        self.by_resource
            .get(resource)
            .map(|vars| {
                vars.iter()
                    .map(|(name, value)| EnvVar {
                        name: name.clone(),
                        value: Some(value.clone()),
                        ..Default::default()
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty()
    }
}

/// The ferry configuration of one stage template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageAnnotations {
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub services: Vec<String>,
    pub debug_container: bool,
    pub debug_resources: bool,
    pub input_envs: ResourceEnvs,
    pub output_envs: ResourceEnvs,
    pub first_init_containers: Vec<String>,
}

impl StageAnnotations {
    pub fn from_pod(pod: &Pod) -> Self {
        match &pod.metadata.annotations {
            Some(annotations) => Self::from_map(annotations),
            None => Self::default(),
        }
    }

    pub fn from_map(annotations: &BTreeMap<String, String>) -> Self {
        let get = |key: &str| annotations.get(key).map(String::as_str).unwrap_or_default();

        Self {
            inputs: split_list(get(INPUTS_ANNOTATION)),
            outputs: split_list(get(OUTPUTS_ANNOTATION)),
            services: split_list(get(SERVICES_ANNOTATION)),
            debug_container: get(DEBUG_CONTAINER_ANNOTATION) == ENABLED,
            debug_resources: get(DEBUG_RESOURCES_ANNOTATION) == ENABLED,
            input_envs: ResourceEnvs::parse(get(INPUTS_ENVS_ANNOTATION)),
            output_envs: ResourceEnvs::parse(get(OUTPUTS_ENVS_ANNOTATION)),
            first_init_containers: split_list(get(FIRST_INIT_CONTAINERS_ANNOTATION)),
        }
    }

    /// Every referenced resource once: inputs first, then outputs
    pub fn resource_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.inputs.iter().chain(&self.outputs) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub fn is_service(&self, container: &str) -> bool {
        self.services.iter().any(|service| service == container)
    }

    /// Main containers whose completion ends the stage
    ///
    /// Declared services are excluded; the debug container is included when
    /// enabled unless it is itself declared a service.
    pub fn wait_for<S: AsRef<str>>(&self, main_containers: &[S]) -> Vec<String> {
        let mut wait_for: Vec<String> = main_containers
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.is_service(name))
            .map(str::to_string)
            .collect();

        if self.debug_container && !self.is_service(DEBUG_CONTAINER) {
            wait_for.push(DEBUG_CONTAINER.to_string());
        }

        wait_for
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_split_list_trims_and_drops_blanks() {
        assert_eq!(split_list("git, image,,"), vec!["git", "image"]);
        assert!(split_list("").is_empty());
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_split_list_keeps_duplicates() {
        assert_eq!(split_list("git,git"), vec!["git", "git"]);
    }

    #[test]
    fn test_join_list() {
        assert_eq!(join_list(&["a", "b"]), "a,b");
        assert_eq!(join_list::<&str>(&[]), "");
    }

    #[test]
    fn test_resource_envs_group_by_first_segment() {
        let envs = ResourceEnvs::parse(
            "  git.source.branch=main\n\tslack.params.text=Job succeeded\ngit.params.depth=1\nnot an override\n",
        );

        let git = envs.for_resource("git");
        assert_eq!(git.len(), 2);
        assert_eq!(git[0].name, "git.source.branch");
        assert_eq!(git[0].value.as_deref(), Some("main"));
        assert_eq!(git[1].name, "git.params.depth");

        let slack = envs.for_resource("slack");
        assert_eq!(slack[0].value.as_deref(), Some("Job succeeded"));

        assert!(envs.for_resource("image").is_empty());
    }

    #[test]
    fn test_resource_env_values_are_verbatim() {
        let envs = ResourceEnvs::parse(r#"slack.params.attachments='[{"text":"a=b"}]'"#);
        let slack = envs.for_resource("slack");
        assert_eq!(slack[0].value.as_deref(), Some(r#"'[{"text":"a=b"}]'"#));
    }

    #[test]
    fn test_from_map() {
        let parsed = StageAnnotations::from_map(&annotations(&[
            (INPUTS_ANNOTATION, "git,transit"),
            (OUTPUTS_ANNOTATION, "image,transit"),
            (SERVICES_ANNOTATION, "db"),
            (DEBUG_CONTAINER_ANNOTATION, "enable"),
            (DEBUG_RESOURCES_ANNOTATION, "yes"),
            (FIRST_INIT_CONTAINERS_ANNOTATION, "prepare"),
        ]));

        assert_eq!(parsed.inputs, vec!["git", "transit"]);
        assert_eq!(parsed.outputs, vec!["image", "transit"]);
        assert!(parsed.debug_container);
        assert!(!parsed.debug_resources);
        assert_eq!(parsed.first_init_containers, vec!["prepare"]);
        assert_eq!(parsed.resource_names(), vec!["git", "transit", "image"]);
    }

    #[test]
    fn test_wait_for_excludes_services() {
        let parsed = StageAnnotations::from_map(&annotations(&[(SERVICES_ANNOTATION, "db")]));
        assert_eq!(parsed.wait_for(&["build", "db", "test"]), vec!["build", "test"]);
    }

    #[test]
    fn test_wait_for_includes_debug_container() {
        let parsed = StageAnnotations::from_map(&annotations(&[(
            DEBUG_CONTAINER_ANNOTATION,
            ENABLED,
        )]));
        assert_eq!(parsed.wait_for(&["build"]), vec!["build", DEBUG_CONTAINER]);

        let parsed = StageAnnotations::from_map(&annotations(&[
            (DEBUG_CONTAINER_ANNOTATION, ENABLED),
            (SERVICES_ANNOTATION, DEBUG_CONTAINER),
        ]));
        assert_eq!(parsed.wait_for(&["build"]), vec!["build"]);
    }
}
