//! Volumes and mounts shared by the generated pods

use ferry_core::protocol::{
    RSYNC_KEYS_VOLUME, RSYNC_PRIVATE_KEY, RSYNC_PUBLIC_KEY, RSYNC_VOLUME, SEMAPHORES_PATH,
    SEMAPHORES_VOLUME, STAGES_VOLUME, TOOLS_PATH, TOOLS_VOLUME, resource_path, resource_volume,
};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, EmptyDirVolumeSource, KeyToPath, SecretVolumeSource, Volume,
    VolumeMount,
};

/// Owner-read-only (0400)
const PRIVATE_KEY_MODE: i32 = 0o400;

fn empty_dir(name: String) -> Volume {
    Volume {
        name,
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    }
}

/// emptyDir volumes for the tools, the semaphores and each resource
pub fn ferry_volumes<S: AsRef<str>>(resources: &[S]) -> Vec<Volume> {
    [TOOLS_VOLUME.to_string(), SEMAPHORES_VOLUME.to_string()]
        .into_iter()
        .chain(resources.iter().map(|r| resource_volume(r.as_ref())))
        .map(empty_dir)
        .collect()
}

pub fn tools_mount(read_only: bool) -> VolumeMount {
    VolumeMount {
        name: TOOLS_VOLUME.to_string(),
        mount_path: TOOLS_PATH.to_string(),
        read_only: read_only.then_some(true),
        ..Default::default()
    }
}

pub fn semaphores_mount() -> VolumeMount {
    VolumeMount {
        name: SEMAPHORES_VOLUME.to_string(),
        mount_path: SEMAPHORES_PATH.to_string(),
        ..Default::default()
    }
}

pub fn resource_mount(resource: &str) -> VolumeMount {
    VolumeMount {
        name: resource_volume(resource),
        mount_path: resource_path(resource),
        ..Default::default()
    }
}

pub fn resource_mounts<S: AsRef<str>>(resources: &[S]) -> Vec<VolumeMount> {
    resources.iter().map(|r| resource_mount(r.as_ref())).collect()
}

/// The run's private key, read-only, for stage pods
pub fn private_key_volume(secret: &str) -> Volume {
    Volume {
        name: RSYNC_KEYS_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            default_mode: Some(PRIVATE_KEY_MODE),
            items: Some(vec![KeyToPath {
                key: RSYNC_PRIVATE_KEY.to_string(),
                path: "./ferry".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The run's public key as `authorized_keys`, for the rsync server
pub fn authorized_keys_volume(secret: &str) -> Volume {
    Volume {
        name: RSYNC_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret.to_string()),
            items: Some(vec![KeyToPath {
                key: RSYNC_PUBLIC_KEY.to_string(),
                path: "./authorized_keys".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The stage pod config map, for the run agent
pub fn stages_volume(config_map: &str) -> Volume {
    Volume {
        name: STAGES_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}
