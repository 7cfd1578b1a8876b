//! Containers injected into stage pods

use ferry_core::domain::annotations::{ResourceEnvs, StageAnnotations, join_list};
use ferry_core::protocol::{
    DEBUG_CONTAINER, DEBUG_IMAGE, DEBUG_STOP_MARKER, IN_RESOURCE_CONTAINER_PREFIX,
    IN_RESOURCE_STDERR_FILE, IN_RESOURCE_STDOUT_FILE, OUT_RESOURCE_CONTAINER_PREFIX,
    OUT_RESOURCE_STDERR_FILE, OUT_RESOURCE_STDOUT_FILE, OUTPUTS_RUNNING, PODSTATUS_PORT,
    RESOURCE_DEBUG_OUT, RESOURCE_ENV_FILE, RESOURCE_IN_SCRIPT, RESOURCE_OUT_SCRIPT,
    RESOURCE_WRAPPER_BIN, SETTING_UP_POD, STEPS_RUNNING, TOOLS_CONTAINER, TOOLS_IMAGE,
    TOOLS_PATH, TOOLS_SOURCE_PATH, WATCH_BIN, WATCHER_CONTAINER, WATCHER_IMAGE, container_marker,
    resource_file, resource_path, semaphore_path, tool_path,
};
use k8s_openapi::api::core::v1::{Container, EnvVar};
use tracing::warn;

use super::Compiler;
use super::volumes::{resource_mount, resource_mounts, semaphores_mount, tools_mount};

/// Whether a resource wrapper fetches (init) or publishes (after the steps)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    In,
    Out,
}

impl Direction {
    fn container_prefix(self) -> &'static str {
        match self {
            Direction::In => IN_RESOURCE_CONTAINER_PREFIX,
            Direction::Out => OUT_RESOURCE_CONTAINER_PREFIX,
        }
    }

    /// Semaphore the wrapper waits to disappear
    fn semaphore(self) -> &'static str {
        match self {
            Direction::In => SETTING_UP_POD,
            Direction::Out => STEPS_RUNNING,
        }
    }

    fn script(self) -> &'static str {
        match self {
            Direction::In => RESOURCE_IN_SCRIPT,
            Direction::Out => RESOURCE_OUT_SCRIPT,
        }
    }

    fn stdout_file(self) -> &'static str {
        match self {
            Direction::In => IN_RESOURCE_STDOUT_FILE,
            Direction::Out => OUT_RESOURCE_STDOUT_FILE,
        }
    }

    fn stderr_file(self) -> &'static str {
        match self {
            Direction::In => IN_RESOURCE_STDERR_FILE,
            Direction::Out => OUT_RESOURCE_STDERR_FILE,
        }
    }
}

pub(crate) fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

/// Command line of the resource wrapper around one resource script
pub(crate) fn wrapper_args(resource: &str, direction: Direction, debug: bool) -> Vec<String> {
    let mut args = vec![
        tool_path(RESOURCE_WRAPPER_BIN),
        format!("--env-prefix={}", resource),
        format!("--semaphore-file={}", semaphore_path(direction.semaphore())),
        format!("--env-file={}", resource_file(resource, RESOURCE_ENV_FILE)),
        "--ignore-missing-env-file".to_string(),
        "--delete-env-file-after-read".to_string(),
        format!("--stderr-file={}", resource_file(resource, direction.stderr_file())),
        format!("--stdout-file={}", resource_file(resource, direction.stdout_file())),
    ];

    if debug {
        args.push("--wait-on-fail".to_string());
        args.push(format!("--debug-out={}", RESOURCE_DEBUG_OUT));
    }

    args.push(direction.script().to_string());
    args.push(resource_path(resource));
    args
}

impl Compiler {
    /// First ferry init container: installs the tools and creates the semaphores
    pub(crate) fn tools_container<S: AsRef<str>>(&self, declared_containers: &[S]) -> Container {
        let mut touches = vec![
            format!("touch {}", semaphore_path(STEPS_RUNNING)),
            format!("touch {}", semaphore_path(OUTPUTS_RUNNING)),
        ];
        touches.extend(
            declared_containers
                .iter()
                .map(|name| format!("touch {}", container_marker(name.as_ref()))),
        );

        let script = format!(
            "cp {}/* {}\n\n# semaphores blocking the outputs until the main steps are finished\n{}",
            TOOLS_SOURCE_PATH,
            TOOLS_PATH,
            touches.join("\n")
        );

        Container {
            name: TOOLS_CONTAINER.to_string(),
            image: Some(TOOLS_IMAGE.to_string()),
            image_pull_policy: self.pull_policy(None),
            command: Some(vec!["sh".to_string(), "-xc".to_string(), script]),
            volume_mounts: Some(vec![semaphores_mount(), tools_mount(false)]),
            ..Default::default()
        }
    }

    /// Wrap the template of `resource` for one direction
    ///
    /// Returns `None` when no template resolves the name.
    pub(crate) fn resource_wrapper(
        &self,
        stage: &str,
        resource: &str,
        direction: Direction,
        envs: &ResourceEnvs,
        debug: bool,
    ) -> Option<Container> {
        let Some(template) = self.catalog.lookup(resource) else {
            warn!(
                pipeline = self.pipeline.name(),
                stage,
                resource,
                "No resource template found, skipping resource container"
            );
            return None;
        };

        let mut container = template.clone();
        container.name = format!("{}{}", direction.container_prefix(), container.name);

        let overrides = envs.for_resource(resource);
        if !overrides.is_empty() {
            container
                .env
                .get_or_insert_with(Default::default)
                .extend(overrides);
        }

        container.volume_mounts.get_or_insert_with(Default::default).extend([
            resource_mount(resource),
            tools_mount(true),
            semaphores_mount(),
        ]);
        container.args = Some(wrapper_args(resource, direction, debug));

        Some(container)
    }

    pub(crate) fn input_wrappers(&self, stage: &str, annotations: &StageAnnotations) -> Vec<Container> {
        annotations
            .inputs
            .iter()
            .filter_map(|resource| {
                self.resource_wrapper(
                    stage,
                    resource,
                    Direction::In,
                    &annotations.input_envs,
                    annotations.debug_resources,
                )
            })
            .collect()
    }

    pub(crate) fn output_wrappers(&self, stage: &str, annotations: &StageAnnotations) -> Vec<Container> {
        annotations
            .outputs
            .iter()
            .filter_map(|resource| {
                self.resource_wrapper(
                    stage,
                    resource,
                    Direction::Out,
                    &annotations.output_envs,
                    annotations.debug_resources,
                )
            })
            .collect()
    }

    /// Releases `steps-running` once the stage's containers completed
    ///
    /// `${MY_IP}` and `${MY_NAME}` are resolved by the run agent when it
    /// creates the stage pod.
    pub(crate) fn watcher_container<S: AsRef<str>>(&self, stage_key: &str, wait_for: &[S]) -> Container {
        Container {
            name: WATCHER_CONTAINER.to_string(),
            image: Some(WATCHER_IMAGE.to_string()),
            image_pull_policy: self.pull_policy(None),
            args: Some(vec![
                tool_path(WATCH_BIN),
                format!("--status-url=http://${{MY_IP}}:{}", PODSTATUS_PORT),
                format!("--pod=${{MY_NAME}}.{}", stage_key),
                format!("--containers={}", join_list(wait_for)),
                format!("--semaphore-file={}", semaphore_path(STEPS_RUNNING)),
            ]),
            env: Some(vec![env("JOB_IP", "${MY_IP}")]),
            volume_mounts: Some(vec![tools_mount(true), semaphores_mount()]),
            ..Default::default()
        }
    }

    /// Long-lived container for interactive debugging
    pub(crate) fn debug_container<S: AsRef<str>>(&self, resources: &[S]) -> Container {
        let script = format!(
            "touch {marker}\necho \"waiting for {marker} to be deleted \"\nwhile test -f {marker}\ndo\n  sleep 1\n  printf \".\"\ndone",
            marker = DEBUG_STOP_MARKER
        );

        let mut mounts = vec![tools_mount(true), semaphores_mount()];
        mounts.extend(resource_mounts(resources));

        Container {
            name: DEBUG_CONTAINER.to_string(),
            image: Some(DEBUG_IMAGE.to_string()),
            image_pull_policy: self.pull_policy(None),
            args: Some(vec!["sh".to_string(), "-c".to_string(), script]),
            env: Some(vec![env("JOB_IP", "${MY_IP}")]),
            volume_mounts: Some(mounts),
            ..Default::default()
        }
    }
}
