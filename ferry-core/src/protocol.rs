//! Synchronization protocol conventions
//!
//! Everything in here is a stable contract between the compiler, which writes
//! these names into the generated manifests, and the tools running inside the
//! pods (resource wrapper, watcher, status service, run agent).
//!
//! Containers never talk to each other directly. A container observes the
//! progress of another one only through the presence or absence of a
//! zero-byte marker file below [`SEMAPHORES_PATH`]. Every marker has exactly
//! one deleting container and is never recreated.

// =============================================================================
// Annotation Keys
// =============================================================================

/// Pipeline annotation: offset added to the build number of every run
pub const BUILD_NO_OFFSET_ANNOTATION: &str = "ferry.io/build-no-offset";
/// Pipeline annotation: pull policy for all platform containers
pub const IMAGE_PULL_POLICY_ANNOTATION: &str = "ferry.io/image-pull-policy";

/// Stage annotation: prepend an interactive debug container
pub const DEBUG_CONTAINER_ANNOTATION: &str = "ferry.io/debug-container";
/// Stage annotation: keep failing resource containers alive for inspection
pub const DEBUG_RESOURCES_ANNOTATION: &str = "ferry.io/debug-resources";
/// Stage annotation: init containers that must run before the tool installer
pub const FIRST_INIT_CONTAINERS_ANNOTATION: &str = "ferry.io/first-init-containers";
/// Stage annotation: comma-separated input resources
pub const INPUTS_ANNOTATION: &str = "ferry.io/inputs";
/// Stage annotation: newline-separated env overrides for input resources
pub const INPUTS_ENVS_ANNOTATION: &str = "ferry.io/inputs-envs";
/// Stage annotation: comma-separated output resources
pub const OUTPUTS_ANNOTATION: &str = "ferry.io/outputs";
/// Stage annotation: newline-separated env overrides for output resources
pub const OUTPUTS_ENVS_ANNOTATION: &str = "ferry.io/outputs-envs";
/// Stage annotation: containers that run for the whole stage and are never waited for
pub const SERVICES_ANNOTATION: &str = "ferry.io/services";
/// Stage annotation written by the compiler: containers the watcher waits for
pub const WAIT_FOR_ANNOTATION: &str = "ferry.io/wait-for";

/// Value that switches a toggle annotation on
pub const ENABLED: &str = "enable";

// =============================================================================
// Labels
// =============================================================================

pub const PIPELINE_LABEL: &str = "ferry.io/pipeline";
pub const RUN_LABEL: &str = "ferry.io/run";
pub const STAGE_LABEL: &str = "ferry.io/stage";
pub const UID_LABEL: &str = "ferry.io/uid";

// =============================================================================
// Containers and Images
// =============================================================================

pub const RUNNER_CONTAINER: &str = "runner";
pub const RUNNER_IMAGE: &str = "ferry/runner:latest";

pub const PODSTATUS_CONTAINER: &str = "podstatus";
pub const PODSTATUS_IMAGE: &str = "ferry/podstatus:latest";

pub const RSYNC_CONTAINER: &str = "rsync";
pub const RSYNC_IMAGE: &str = "ferry/rsync-server:latest";

pub const SET_SEMAPHORES_CONTAINER: &str = "set-semaphores";
pub const SET_SEMAPHORES_IMAGE: &str = "alpine";

pub const TOOLS_CONTAINER: &str = "get-ferry-tools";
pub const TOOLS_IMAGE: &str = "ferry/tools";

pub const WATCHER_CONTAINER: &str = "ferry-watcher";
pub const WATCHER_IMAGE: &str = "alpine";

pub const DEBUG_CONTAINER: &str = "ferry-debug-container";
pub const DEBUG_IMAGE: &str = "alpine";

/// Reserved name of the built-in rsync resource
pub const TRANSIT_RESOURCE: &str = "transit";
pub const TRANSIT_IMAGE: &str = "mrsixw/concourse-rsync-resource";

pub const IN_RESOURCE_CONTAINER_PREFIX: &str = "ferry-resource-in-";
pub const OUT_RESOURCE_CONTAINER_PREFIX: &str = "ferry-resource-out-";

// =============================================================================
// Paths
// =============================================================================

pub const RESOURCES_PATH: &str = "/ferry/resources";
pub const SEMAPHORES_PATH: &str = "/var/lock/ferry";
pub const TOOLS_PATH: &str = "/opt/ferry/bin";
/// Location of the tool binaries inside the tools image
pub const TOOLS_SOURCE_PATH: &str = "/ferry/contrib";
pub const STAGES_MOUNT_PATH: &str = "/ferry/stages";
pub const RSYNC_SSH_MOUNT_PATH: &str = "/mnt/ssh";

pub const RESOURCE_ENV_FILE: &str = ".ferry.resource.env";
pub const IN_RESOURCE_STDOUT_FILE: &str = ".ferry.in-resource.stdout";
pub const IN_RESOURCE_STDERR_FILE: &str = ".ferry.in-resource.stderr";
pub const OUT_RESOURCE_STDOUT_FILE: &str = ".ferry.out-resource.stdout";
pub const OUT_RESOURCE_STDERR_FILE: &str = ".ferry.out-resource.stderr";

/// Entry points every resource image provides
pub const RESOURCE_IN_SCRIPT: &str = "/opt/resource/in";
pub const RESOURCE_OUT_SCRIPT: &str = "/opt/resource/out";

/// Where a failing resource wrapper dumps its reproduction script
pub const RESOURCE_DEBUG_OUT: &str = "/tmp/ferry.debug";

/// Deleting this file inside the debug container ends it
pub const DEBUG_STOP_MARKER: &str = "/DELETE_ME_TO_STOP_DEBUG_CONTAINER";

/// Binary names shipped in the tools image
pub const RESOURCE_WRAPPER_BIN: &str = "ferry-resource";
pub const WATCH_BIN: &str = "ferry-watch";

/// Port the status aggregator listens on inside the control pod
pub const PODSTATUS_PORT: u16 = 8080;

// =============================================================================
// Volumes and Secrets
// =============================================================================

pub const SEMAPHORES_VOLUME: &str = "ferry-semaphores";
pub const TOOLS_VOLUME: &str = "ferry-tools";
pub const RESOURCE_VOLUME_PREFIX: &str = "ferry-resource-";
pub const RSYNC_KEYS_VOLUME: &str = "ferry-rsync-ssh-keys";
pub const STAGES_VOLUME: &str = "stages";
pub const RSYNC_VOLUME: &str = "rsync";

pub const RSYNC_PUBLIC_KEY: &str = "pub";
pub const RSYNC_PRIVATE_KEY: &str = "priv";

pub const RUNNER_SERVICE_ACCOUNT: &str = "ferry-runner";

// =============================================================================
// Semaphores
// =============================================================================

/// Present while the declared stage containers run; deleted by the watcher
pub const STEPS_RUNNING: &str = "steps-running";
/// Present while output resources publish
pub const OUTPUTS_RUNNING: &str = "outputs-running";
/// Guards input wrappers; never created by the init sequence
pub const SETTING_UP_POD: &str = "setting-up-pod";
/// Present in the control pod while the run is in progress
pub const STAGES_RUNNING: &str = "stages-running";
/// Prefix of the per-container markers
pub const CONTAINER_MARKER_PREFIX: &str = "container-";

// =============================================================================
// Object Names
// =============================================================================

/// printf-style format of the run name, handed to the run agent
pub const NAME_FORMAT: &str = "ferry.%s.%d";
pub const CONFIG_MAP_NAME_FORMAT: &str = "ferry.%s.%d.stages";
pub const RSYNC_SECRET_NAME_FORMAT: &str = "ferry.%s.%d.rsync-keys";

/// Name of the control pod of a run
pub fn run_name(pipeline: &str, build_no: i64) -> String {
    format!("ferry.{}.{}", pipeline, build_no)
}

/// Name of the config map holding the stage pods of a run
pub fn config_map_name(pipeline: &str, build_no: i64) -> String {
    format!("{}.stages", run_name(pipeline, build_no))
}

/// Name of the secret holding the rsync keypair of a run
pub fn rsync_secret_name(pipeline: &str, build_no: i64) -> String {
    format!("{}.rsync-keys", run_name(pipeline, build_no))
}

/// Absolute path of a semaphore inside the shared semaphore volume
pub fn semaphore_path(name: &str) -> String {
    format!("{}/{}", SEMAPHORES_PATH, name)
}

/// Marker created at pod start for a declared container
pub fn container_marker(container: &str) -> String {
    semaphore_path(&format!("{}{}", CONTAINER_MARKER_PREFIX, container))
}

/// Mount path of a resource volume
pub fn resource_path(resource: &str) -> String {
    format!("{}/{}", RESOURCES_PATH, resource)
}

/// A file inside a resource volume
pub fn resource_file(resource: &str, file: &str) -> String {
    format!("{}/{}", resource_path(resource), file)
}

/// Volume name of a resource
pub fn resource_volume(resource: &str) -> String {
    format!("{}{}", RESOURCE_VOLUME_PREFIX, resource)
}

/// Absolute path of a tool binary inside the tools volume
pub fn tool_path(bin: &str) -> String {
    format!("{}/{}", TOOLS_PATH, bin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_object_names() {
        assert_eq!(run_name("hello", 42), "ferry.hello.42");
        assert_eq!(config_map_name("hello", 42), "ferry.hello.42.stages");
        assert_eq!(rsync_secret_name("hello", 42), "ferry.hello.42.rsync-keys");
    }

    #[test]
    fn test_name_formats_match_name_helpers() {
        let rendered = CONFIG_MAP_NAME_FORMAT
            .replacen("%s", "hello", 1)
            .replacen("%d", "7", 1);
        assert_eq!(rendered, config_map_name("hello", 7));
    }

    #[test]
    fn test_semaphore_paths() {
        assert_eq!(semaphore_path(STEPS_RUNNING), "/var/lock/ferry/steps-running");
        assert_eq!(container_marker("build"), "/var/lock/ferry/container-build");
    }

    #[test]
    fn test_resource_paths() {
        assert_eq!(resource_path("git"), "/ferry/resources/git");
        assert_eq!(
            resource_file("git", RESOURCE_ENV_FILE),
            "/ferry/resources/git/.ferry.resource.env"
        );
        assert_eq!(resource_volume("git"), "ferry-resource-git");
        assert_eq!(tool_path(RESOURCE_WRAPPER_BIN), "/opt/ferry/bin/ferry-resource");
    }
}
