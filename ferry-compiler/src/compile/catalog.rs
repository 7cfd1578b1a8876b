//! Resource template lookup
//!
//! Stages reference resources by name. A name resolves to the template the
//! pipeline declares, and only when none is declared does the reserved
//! `transit` name fall back to the built-in rsync resource of the run.

use ferry_core::protocol::{RSYNC_PRIVATE_KEY, TRANSIT_IMAGE, TRANSIT_RESOURCE};
use k8s_openapi::api::core::v1::{Container, EnvVar, EnvVarSource, SecretKeySelector};

use super::containers::env;

/// Two-tier resource lookup: declared templates, then the transit fallback
#[derive(Debug, Clone)]
pub struct ResourceCatalog {
    declared: Vec<Container>,
    transit: Container,
}

impl ResourceCatalog {
    pub fn new(declared: Vec<Container>, transit: Container) -> Self {
        Self { declared, transit }
    }

    /// Catalog of a run whose rsync keys live in `rsync_secret`
    pub fn for_run(declared: &[Container], rsync_secret: &str) -> Self {
        Self::new(declared.to_vec(), transit_resource(rsync_secret))
    }

    /// Resolve a resource name to its template
    pub fn lookup(&self, name: &str) -> Option<&Container> {
        self.declared
            .iter()
            .find(|container| container.name == name)
            .or_else(|| (name == TRANSIT_RESOURCE).then_some(&self.transit))
    }
}

/// The built-in transit resource
///
/// An rsync resource talking to the rsync server of the control pod, which
/// the run agent resolves through `${MY_IP}`. The private key comes from the
/// run's secret.
pub fn transit_resource(rsync_secret: &str) -> Container {
    Container {
        name: TRANSIT_RESOURCE.to_string(),
        image: Some(TRANSIT_IMAGE.to_string()),
        env: Some(vec![
            env("transit.params.rsync_opts", r#"["--delete", "--recursive"]"#),
            env("transit.source.server", "${MY_IP}"),
            env("transit.source.base_dir", "/tmp"),
            env("transit.source.user", "root"),
            env("transit.source.disable_version_path", "true"),
            env("transit.version", r#"{"ref":"tmp"}"#),
            EnvVar {
                name: "transit.source.private_key".to_string(),
                value_from: Some(EnvVarSource {
                    secret_key_ref: Some(SecretKeySelector {
                        key: RSYNC_PRIVATE_KEY.to_string(),
                        name: rsync_secret.to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}
