//! Stage pods

use std::collections::BTreeMap;

use ferry_core::domain::annotations::{StageAnnotations, join_list};
use ferry_core::domain::pipeline::stage_name;
use ferry_core::protocol::{UID_LABEL, WAIT_FOR_ANNOTATION, rsync_secret_name};
use k8s_openapi::api::core::v1::{
    Affinity, Container, NodeAffinity, NodeSelectorRequirement, NodeSelectorTerm, Pod, PodSpec,
    PreferredSchedulingTerm,
};
use tracing::debug;

use super::volumes::{ferry_volumes, private_key_volume, resource_mounts};
use super::{CompileError, Compiler, Result};
use crate::defaults::RESTART_POLICY_NEVER;

const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Config map key of the stage at `ordinal` (1-based)
pub fn stage_key(ordinal: usize, stage: &str) -> String {
    format!("{:02}-{}", ordinal, stage)
}

/// Prefer the node the control pod runs on, so the transit rsync stays local
fn same_node_affinity() -> Affinity {
    Affinity {
        node_affinity: Some(NodeAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                PreferredSchedulingTerm {
                    weight: 1,
                    preference: NodeSelectorTerm {
                        match_expressions: Some(vec![NodeSelectorRequirement {
                            key: HOSTNAME_LABEL.to_string(),
                            operator: "In".to_string(),
                            values: Some(vec!["${MY_NODE_NAME}".to_string()]),
                        }]),
                        ..Default::default()
                    },
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn names(containers: &[Container]) -> Vec<String> {
    containers.iter().map(|c| c.name.clone()).collect()
}

impl Compiler {
    /// Every materialized stage as a pod, keyed `<NN>-<stage>.yaml`
    ///
    /// Ordinals start at 1 and are contiguous over the materialized stages:
    /// main stages first, then on-success, on-error and final.
    pub fn stage_pods(&self) -> Result<BTreeMap<String, Pod>> {
        self.pipeline
            .materialized_stages()
            .enumerate()
            .map(|(index, template)| {
                let key = stage_key(index + 1, stage_name(template));
                let pod = self.stage_pod(&key, template)?;
                Ok((format!("{}.yaml", key), pod))
            })
            .collect()
    }

    /// Compile one stage template into its pod
    pub fn stage_pod(&self, key: &str, template: &Pod) -> Result<Pod> {
        let stage = stage_name(template);
        let annotations = StageAnnotations::from_pod(template);
        let resources = annotations.resource_names();

        let mut pod = template.clone();
        let mut spec = pod.spec.take().unwrap_or_default();

        let mut declared = std::mem::take(&mut spec.containers);
        let mut declared_init = spec.init_containers.take().unwrap_or_default();

        for container in declared.iter_mut().chain(declared_init.iter_mut()) {
            container
                .volume_mounts
                .get_or_insert_with(Default::default)
                .extend(resource_mounts(&resources));
        }

        let main_names = names(&declared);
        let mut markers = main_names.clone();
        markers.extend(names(&declared_init));

        let wait_for = annotations.wait_for(&main_names);

        // init: first-init containers, tools, input wrappers, the rest
        let mut init_containers = Vec::with_capacity(declared_init.len() + resources.len() + 1);
        for name in &annotations.first_init_containers {
            let Some(position) = declared_init.iter().position(|c| &c.name == name) else {
                return Err(CompileError::FirstInitContainerNotFound {
                    pipeline: self.pipeline.name().to_string(),
                    stage: stage.to_string(),
                    container: name.clone(),
                });
            };
            init_containers.push(declared_init.remove(position));
        }
        init_containers.push(self.tools_container(&markers));
        init_containers.extend(self.input_wrappers(stage, &annotations));
        init_containers.extend(declared_init);

        // main: debug, declared, watcher, output wrappers
        let mut containers = Vec::with_capacity(declared.len() + annotations.outputs.len() + 2);
        if annotations.debug_container {
            containers.push(self.debug_container(&resources));
        }
        containers.extend(declared);
        containers.push(self.watcher_container(key, &wait_for));
        containers.extend(self.output_wrappers(stage, &annotations));

        let mut volumes = spec.volumes.take().unwrap_or_default();
        volumes.extend(ferry_volumes(&resources));
        volumes.push(private_key_volume(&rsync_secret_name(
            self.pipeline.name(),
            self.build_no(),
        )));

        pod.spec = Some(PodSpec {
            containers,
            init_containers: Some(init_containers),
            volumes: Some(volumes),
            restart_policy: Some(RESTART_POLICY_NEVER.to_string()),
            affinity: Some(same_node_affinity()),
            ..spec
        });

        pod.metadata.name = Some(format!("${{MY_NAME}}.{}", key));

        let labels = pod.metadata.labels.get_or_insert_with(Default::default);
        labels.extend(self.labels(Some(stage)));
        labels.insert(UID_LABEL.to_string(), "${MY_UID}".to_string());

        pod.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(WAIT_FOR_ANNOTATION.to_string(), join_list(&wait_for));

        debug!(
            pipeline = self.pipeline.name(),
            stage,
            key,
            wait_for = %join_list(&wait_for),
            "Compiled stage pod"
        );

        Ok(pod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::pipeline::Pipeline;
    use ferry_core::protocol::{
        DEBUG_CONTAINER, SEMAPHORES_VOLUME, TOOLS_CONTAINER, WATCHER_CONTAINER,
    };

    fn pipeline(source: &str) -> Pipeline {
        Pipeline::from_yaml(source).unwrap()
    }

    fn container_names(containers: &[Container]) -> Vec<&str> {
        containers.iter().map(|c| c.name.as_str()).collect()
    }

    const ORDERING: &str = r#"
metadata:
  name: hello
spec:
  resources:
    containers:
      - name: git
        image: concourse/git-resource
      - name: image
        image: concourse/registry-image-resource
  stages:
    - metadata:
        name: build
        annotations:
          ferry.io/inputs: git
          ferry.io/outputs: image
          ferry.io/services: db
          ferry.io/debug-container: enable
          ferry.io/first-init-containers: prepare
      spec:
        initContainers:
          - name: migrate
            image: alpine
          - name: prepare
            image: alpine
        containers:
          - name: compile
            image: rust
          - name: db
            image: postgres
"#;

    #[test]
    fn test_container_ordering() {
        let compiler = Compiler::new(&pipeline(ORDERING), 7);
        let stages = compiler.stage_pods().unwrap();
        let pod = &stages["01-build.yaml"];
        let spec = pod.spec.as_ref().unwrap();

        assert_eq!(
            container_names(spec.init_containers.as_ref().unwrap()),
            vec!["prepare", TOOLS_CONTAINER, "ferry-resource-in-git", "migrate"]
        );
        assert_eq!(
            container_names(&spec.containers),
            vec![
                DEBUG_CONTAINER,
                "compile",
                "db",
                WATCHER_CONTAINER,
                "ferry-resource-out-image"
            ]
        );
    }

    #[test]
    fn test_watcher_waits_on_non_services() {
        let compiler = Compiler::new(&pipeline(ORDERING), 7);
        let pod = &compiler.stage_pods().unwrap()["01-build.yaml"];

        let wait_for = &pod.metadata.annotations.as_ref().unwrap()[WAIT_FOR_ANNOTATION];
        assert_eq!(wait_for, "compile,ferry-debug-container");

        let watcher = pod
            .spec
            .as_ref()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.name == WATCHER_CONTAINER)
            .unwrap();
        let args = watcher.args.as_ref().unwrap();
        assert!(args.contains(&"--containers=compile,ferry-debug-container".to_string()));
        assert!(args.contains(&"--pod=${MY_NAME}.01-build".to_string()));
    }

    #[test]
    fn test_tools_container_marks_declared_containers() {
        let compiler = Compiler::new(&pipeline(ORDERING), 7);
        let pod = &compiler.stage_pods().unwrap()["01-build.yaml"];
        let tools = &pod.spec.as_ref().unwrap().init_containers.as_ref().unwrap()[1];
        let script = &tools.command.as_ref().unwrap()[2];

        for marker in ["compile", "db", "migrate", "prepare"] {
            assert!(script.contains(&format!("touch /var/lock/ferry/container-{}", marker)));
        }
        assert!(script.contains("touch /var/lock/ferry/steps-running"));
        assert!(script.contains("touch /var/lock/ferry/outputs-running"));
        assert!(!script.contains("setting-up-pod"));
    }

    #[test]
    fn test_stage_metadata() {
        let compiler = Compiler::new(&pipeline(ORDERING), 7);
        let pod = &compiler.stage_pods().unwrap()["01-build.yaml"];

        assert_eq!(pod.metadata.name.as_deref(), Some("${MY_NAME}.01-build"));
        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(labels["ferry.io/pipeline"], "hello");
        assert_eq!(labels["ferry.io/run"], "7");
        assert_eq!(labels["ferry.io/stage"], "build");
        assert_eq!(labels["ferry.io/uid"], "${MY_UID}");

        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        let preferred = spec
            .affinity
            .as_ref()
            .and_then(|a| a.node_affinity.as_ref())
            .and_then(|n| n.preferred_during_scheduling_ignored_during_execution.as_ref())
            .unwrap();
        assert_eq!(preferred[0].weight, 1);
    }

    #[test]
    fn test_declared_containers_mount_resources() {
        let compiler = Compiler::new(&pipeline(ORDERING), 7);
        let pod = &compiler.stage_pods().unwrap()["01-build.yaml"];
        let spec = pod.spec.as_ref().unwrap();

        let compile = spec.containers.iter().find(|c| c.name == "compile").unwrap();
        let mounts: Vec<&str> = compile
            .volume_mounts
            .iter()
            .flatten()
            .map(|m| m.mount_path.as_str())
            .collect();
        assert_eq!(mounts, vec!["/ferry/resources/git", "/ferry/resources/image"]);

        let volumes: Vec<&str> = spec
            .volumes
            .iter()
            .flatten()
            .map(|v| v.name.as_str())
            .collect();
        assert!(volumes.contains(&SEMAPHORES_VOLUME));
        assert!(volumes.contains(&"ferry-resource-git"));
        assert!(volumes.contains(&"ferry-rsync-ssh-keys"));
    }

    #[test]
    fn test_unknown_first_init_container_is_fatal() {
        let source = ORDERING.replace(
            "ferry.io/first-init-containers: prepare",
            "ferry.io/first-init-containers: missing",
        );
        let compiler = Compiler::new(&pipeline(&source), 7);

        let err = compiler.stage_pods().unwrap_err();
        assert!(matches!(
            &err,
            CompileError::FirstInitContainerNotFound { pipeline, stage, container }
                if pipeline == "hello" && stage == "build" && container == "missing"
        ));
        let message = err.to_string();
        assert!(message.contains("hello"));
        assert!(message.contains("build"));
        assert!(message.contains("missing"));
    }

    #[test]
    fn test_missing_resource_template_only_drops_wrapper() {
        let source = ORDERING.replace("ferry.io/outputs: image", "ferry.io/outputs: image,slack");
        let compiler = Compiler::new(&pipeline(&source), 7);
        let pod = &compiler.stage_pods().unwrap()["01-build.yaml"];

        let names = container_names(&pod.spec.as_ref().unwrap().containers);
        assert!(names.contains(&"ferry-resource-out-image"));
        assert!(!names.iter().any(|n| n.ends_with("slack")));
    }

    #[test]
    fn test_transit_needs_no_declaration() {
        let source = r#"
metadata:
  name: hello
spec:
  stages:
    - metadata:
        name: build
        annotations:
          ferry.io/outputs: transit
      spec:
        containers:
          - name: compile
            image: rust
"#;
        let compiler = Compiler::new(&pipeline(source), 1);
        let pod = &compiler.stage_pods().unwrap()["01-build.yaml"];

        let transit = pod
            .spec
            .as_ref()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.name == "ferry-resource-out-transit")
            .unwrap();
        assert_eq!(
            transit.image.as_deref(),
            Some(ferry_core::protocol::TRANSIT_IMAGE)
        );
    }

    #[test]
    fn test_ordinals_skip_placeholder_stages() {
        let source = r#"
metadata:
  name: hello
spec:
  stages:
    - metadata:
        name: build
      spec:
        containers:
          - name: compile
            image: rust
  onSuccess:
    spec:
      containers: []
  final:
    metadata:
      name: final
    spec:
      containers:
        - name: cleanup
          image: alpine
"#;
        let compiler = Compiler::new(&pipeline(source), 1);
        let keys: Vec<String> = compiler.stage_pods().unwrap().into_keys().collect();
        assert_eq!(keys, vec!["01-build.yaml", "02-final.yaml"]);
    }

    #[test]
    fn test_pull_policy_override_reaches_platform_containers() {
        let source = ORDERING.replace(
            "  name: hello\n",
            "  name: hello\n  annotations:\n    ferry.io/image-pull-policy: Never\n",
        );
        let compiler = Compiler::new(&pipeline(&source), 7);
        let pod = &compiler.stage_pods().unwrap()["01-build.yaml"];
        let spec = pod.spec.as_ref().unwrap();

        for name in [DEBUG_CONTAINER, WATCHER_CONTAINER] {
            let container = spec.containers.iter().find(|c| c.name == name).unwrap();
            assert_eq!(container.image_pull_policy.as_deref(), Some("Never"));
        }
        let tools = &spec.init_containers.as_ref().unwrap()[1];
        assert_eq!(tools.image_pull_policy.as_deref(), Some("Never"));

        let compile = spec.containers.iter().find(|c| c.name == "compile").unwrap();
        assert_eq!(compile.image_pull_policy, None);
    }
}
