//! Pipeline compiler
//!
//! Compiles a defaulted, validated pipeline and a build number into the
//! objects of one run:
//! - one stage pod per materialized stage template, keyed `<NN>-<stage>.yaml`
//! - a config map holding those stage pods as YAML documents
//! - a secret holding a fresh SSH keypair for the rsync transit channel
//! - the control pod running the run agent, the status service and the rsync server
//!
//! Stage pods carry the synchronization protocol: the tool installer creates
//! the semaphores, resource wrappers wait on them and a watcher container
//! releases the outputs once the declared containers completed.
//!
//! A first-init-container that the stage does not declare aborts the
//! compilation. A resource reference without a template only drops that
//! wrapper container and is logged.

mod catalog;
mod containers;
mod control;
mod stage;
mod volumes;

pub use catalog::{ResourceCatalog, transit_resource};

use std::collections::BTreeMap;

use ferry_core::domain::pipeline::Pipeline;
use ferry_core::protocol::{PIPELINE_LABEL, RUN_LABEL, STAGE_LABEL, rsync_secret_name};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use thiserror::Error;

use crate::keys::{KeyError, KeyPair};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(
        "pipeline '{pipeline}', stage '{stage}': first init container '{container}' is not an init container of the stage"
    )]
    FirstInitContainerNotFound {
        pipeline: String,
        stage: String,
        container: String,
    },

    #[error("cannot serialize stage pod '{stage}': {source}")]
    Serialize {
        stage: String,
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Keys(#[from] KeyError),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// All objects of one run
#[derive(Debug, Clone)]
pub struct CompiledRun {
    /// Stage pods keyed by config map entry name
    pub stages: BTreeMap<String, Pod>,
    pub config_map: ConfigMap,
    pub secret: Secret,
    pub control_pod: Pod,
}

/// Compiler for one run of a pipeline
///
/// Works on its own copy of the pipeline, whose status carries the build
/// number of the run.
#[derive(Debug, Clone)]
pub struct Compiler {
    pipeline: Pipeline,
    catalog: ResourceCatalog,
}

impl Compiler {
    pub fn new(pipeline: &Pipeline, build_no: i64) -> Self {
        let mut pipeline = pipeline.clone();
        pipeline.status.build_no = build_no;

        let catalog = ResourceCatalog::for_run(
            &pipeline.spec.resources.containers,
            &rsync_secret_name(pipeline.name(), build_no),
        );

        Self { pipeline, catalog }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn build_no(&self) -> i64 {
        self.pipeline.status.build_no
    }

    /// Standard labels of the run, plus the stage label for stage pods
    fn labels(&self, stage: Option<&str>) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::from([
            (PIPELINE_LABEL.to_string(), self.pipeline.name().to_string()),
            (RUN_LABEL.to_string(), self.build_no().to_string()),
        ]);
        if let Some(stage) = stage.filter(|s| !s.is_empty()) {
            labels.insert(STAGE_LABEL.to_string(), stage.to_string());
        }
        labels
    }

    /// Pull policy of a platform container: the pipeline override, else `fallback`
    fn pull_policy(&self, fallback: Option<&str>) -> Option<String> {
        self.pipeline
            .image_pull_policy()
            .or(fallback)
            .map(str::to_string)
    }

    /// Compile every object of the run with the given keypair
    pub fn compile(&self, keys: &KeyPair) -> Result<CompiledRun> {
        let stages = self.stage_pods()?;
        let config_map = self.config_map_from(&stages)?;

        Ok(CompiledRun {
            stages,
            config_map,
            secret: self.rsync_secret(keys),
            control_pod: self.control_pod(),
        })
    }
}

/// Compile a run with a freshly generated keypair
pub fn compile(pipeline: &Pipeline, build_no: i64) -> Result<CompiledRun> {
    let keys = KeyPair::generate()?;
    compile_with_keys(pipeline, build_no, &keys)
}

pub fn compile_with_keys(pipeline: &Pipeline, build_no: i64, keys: &KeyPair) -> Result<CompiledRun> {
    Compiler::new(pipeline, build_no).compile(keys)
}
