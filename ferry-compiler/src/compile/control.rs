//! Run-level objects: control pod, stages config map and rsync secret

use std::collections::BTreeMap;

use ferry_core::protocol::{
    CONFIG_MAP_NAME_FORMAT, OUT_RESOURCE_CONTAINER_PREFIX, OUTPUTS_ANNOTATION, PIPELINE_LABEL,
    PODSTATUS_CONTAINER, PODSTATUS_IMAGE, RSYNC_CONTAINER, RSYNC_IMAGE, RSYNC_PRIVATE_KEY,
    RSYNC_PUBLIC_KEY, RSYNC_SECRET_NAME_FORMAT, RSYNC_SSH_MOUNT_PATH, RSYNC_VOLUME, RUN_LABEL,
    RUNNER_CONTAINER, RUNNER_IMAGE, RUNNER_SERVICE_ACCOUNT, SEMAPHORES_PATH,
    SET_SEMAPHORES_CONTAINER, SET_SEMAPHORES_IMAGE, STAGES_MOUNT_PATH, STAGES_RUNNING,
    STAGES_VOLUME, TRANSIT_RESOURCE, WAIT_FOR_ANNOTATION, config_map_name, rsync_secret_name,
    run_name, semaphore_path,
};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, EnvVar, EnvVarSource, ObjectFieldSelector, Pod, PodSpec, Secret,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::containers::env;
use super::volumes::{
    authorized_keys_volume, ferry_volumes, resource_mount, semaphores_mount, stages_volume,
};
use super::{CompileError, Compiler, Result};
use crate::defaults::RESTART_POLICY_NEVER;
use crate::keys::KeyPair;

const SECRET_TYPE_OPAQUE: &str = "Opaque";

fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Downward-API variables the run agent substitutes into `${MY_*}` placeholders
fn downward_env() -> Vec<EnvVar> {
    vec![
        field_env("MY_IP", "status.podIP"),
        field_env("MY_NAME", "metadata.name"),
        field_env("MY_NAMESPACE", "metadata.namespace"),
        field_env("MY_NODE_NAME", "spec.nodeName"),
        field_env("MY_UID", "metadata.uid"),
    ]
}

impl Compiler {
    fn metadata(&self, name: String) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            labels: Some(self.labels(None)),
            ..Default::default()
        }
    }

    /// Config map with every stage pod as a YAML document
    pub fn config_map(&self) -> Result<ConfigMap> {
        self.config_map_from(&self.stage_pods()?)
    }

    /// Config map from already compiled stage pods
    pub fn config_map_from(&self, stages: &BTreeMap<String, Pod>) -> Result<ConfigMap> {
        let data = stages
            .iter()
            .map(|(key, pod)| {
                serde_yaml::to_string(pod)
                    .map(|yaml| (key.clone(), yaml))
                    .map_err(|source| CompileError::Serialize {
                        stage: key.clone(),
                        source,
                    })
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(ConfigMap {
            metadata: self.metadata(config_map_name(self.pipeline.name(), self.build_no())),
            data: Some(data),
            ..Default::default()
        })
    }

    /// Secret holding the rsync keypair of the run
    pub fn rsync_secret(&self, keys: &KeyPair) -> Secret {
        let data = BTreeMap::from([
            (
                RSYNC_PRIVATE_KEY.to_string(),
                ByteString(keys.private_key.clone().into_bytes()),
            ),
            (
                RSYNC_PUBLIC_KEY.to_string(),
                ByteString(keys.public_key.clone().into_bytes()),
            ),
        ]);

        Secret {
            metadata: self.metadata(rsync_secret_name(self.pipeline.name(), self.build_no())),
            type_: Some(SECRET_TYPE_OPAQUE.to_string()),
            data: Some(data),
            ..Default::default()
        }
    }

    /// Pod driving the run: run agent, status service and rsync server
    pub fn control_pod(&self) -> Pod {
        let pipeline = self.pipeline.name();
        let build_no = self.build_no();

        let mut volumes = ferry_volumes(&[TRANSIT_RESOURCE]);
        volumes.push(stages_volume(&config_map_name(pipeline, build_no)));
        volumes.push(authorized_keys_volume(&rsync_secret_name(pipeline, build_no)));

        Pod {
            metadata: self.metadata(run_name(pipeline, build_no)),
            spec: Some(PodSpec {
                init_containers: Some(vec![self.set_semaphores_container()]),
                containers: vec![
                    self.runner_container(),
                    self.podstatus_container(),
                    self.rsync_container(),
                ],
                volumes: Some(volumes),
                restart_policy: Some(RESTART_POLICY_NEVER.to_string()),
                service_account_name: Some(RUNNER_SERVICE_ACCOUNT.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn set_semaphores_container(&self) -> Container {
        Container {
            name: SET_SEMAPHORES_CONTAINER.to_string(),
            image: Some(SET_SEMAPHORES_IMAGE.to_string()),
            image_pull_policy: self.pull_policy(Some("IfNotPresent")),
            command: Some(vec![
                "sh".to_string(),
                "-xc".to_string(),
                format!("touch {}", semaphore_path(STAGES_RUNNING)),
            ]),
            volume_mounts: Some(vec![semaphores_mount()]),
            ..Default::default()
        }
    }

    fn runner_container(&self) -> Container {
        let mut env_vars = vec![
            env("CONFIG_MAP_NAME_FORMAT_STRING", CONFIG_MAP_NAME_FORMAT),
            env("FERRY_PIPELINE_NAME", self.pipeline.name()),
            env("FERRY_PIPELINE_RUN_NO", &self.build_no().to_string()),
            env("FERRY_SEMAPHORE_MOUNT_PATH", SEMAPHORES_PATH),
            env("FERRY_STAGES_MOUNT_PATH", STAGES_MOUNT_PATH),
            env("OUT_RESOURCE_ANNOTATION_KEY", OUTPUTS_ANNOTATION),
            env("OUT_RESOURCE_CONTAINER_NAME_PREFIX", OUT_RESOURCE_CONTAINER_PREFIX),
            env("PIPELINE_LABEL_KEY", PIPELINE_LABEL),
            env("STAGES_RUNNING_SEMAPHORE", &semaphore_path(STAGES_RUNNING)),
            env("RSYNC_KEY_NAME_FORMAT_STRING", RSYNC_SECRET_NAME_FORMAT),
            env("RUN_LABEL_KEY", RUN_LABEL),
            env("WAIT_FOR_ANNOTATION_KEY", WAIT_FOR_ANNOTATION),
        ];
        env_vars.extend(downward_env());

        Container {
            name: RUNNER_CONTAINER.to_string(),
            image: Some(RUNNER_IMAGE.to_string()),
            image_pull_policy: self.pull_policy(Some("Always")),
            env: Some(env_vars),
            volume_mounts: Some(vec![
                resource_mount(TRANSIT_RESOURCE),
                semaphores_mount(),
                VolumeMount {
                    name: STAGES_VOLUME.to_string(),
                    mount_path: STAGES_MOUNT_PATH.to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }
    }

    fn podstatus_container(&self) -> Container {
        Container {
            name: PODSTATUS_CONTAINER.to_string(),
            image: Some(PODSTATUS_IMAGE.to_string()),
            image_pull_policy: self.pull_policy(None),
            env: Some(vec![
                env("STAGES_RUNNING_SEMAPHORE", &semaphore_path(STAGES_RUNNING)),
                field_env("KUBECTL_NAMESPACE", "metadata.namespace"),
            ]),
            volume_mounts: Some(vec![semaphores_mount()]),
            ..Default::default()
        }
    }

    fn rsync_container(&self) -> Container {
        Container {
            name: RSYNC_CONTAINER.to_string(),
            image: Some(RSYNC_IMAGE.to_string()),
            image_pull_policy: self.pull_policy(None),
            env: Some(vec![
                env("SSH_ENABLE_ROOT", "true"),
                env("STAGES_RUNNING_SEMAPHORE", &semaphore_path(STAGES_RUNNING)),
            ]),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: RSYNC_VOLUME.to_string(),
                    mount_path: RSYNC_SSH_MOUNT_PATH.to_string(),
                    ..Default::default()
                },
                semaphores_mount(),
            ]),
            ..Default::default()
        }
    }
}
