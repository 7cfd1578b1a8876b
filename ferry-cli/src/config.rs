//! Configuration module
//!
//! Global CLI options and loading of the pipeline document they point at.

use std::io::Read;

use anyhow::{Context, Result, anyhow, bail};
use colored::*;
use ferry_compiler::{apply_defaults, validate};
use ferry_core::domain::pipeline::Pipeline;

/// Source name that reads the document from stdin
pub const STDIN: &str = "-";

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the pipeline document or `-`
    pub source: String,
    /// Build number before the pipeline's offset is added
    pub build: i64,
    pub apply_defaults: bool,
    pub validate: bool,
}

impl Config {
    fn read_source(&self) -> Result<String> {
        if self.source == STDIN {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read pipeline from stdin")?;
            return Ok(content);
        }

        std::fs::read_to_string(&self.source)
            .with_context(|| format!("Failed to read pipeline file: {}", self.source))
    }

    /// Parse the pipeline document as given
    pub fn load_pipeline(&self) -> Result<Pipeline> {
        let content = self.read_source()?;
        Pipeline::from_yaml(&content)
            .with_context(|| format!("Failed to parse pipeline: {}", self.source))
    }

    /// Load the pipeline with defaults applied and validated, as configured
    pub fn prepare(&self) -> Result<Pipeline> {
        let pipeline = self.load_pipeline()?;
        let pipeline = if self.apply_defaults {
            apply_defaults(&pipeline).pipeline
        } else {
            pipeline
        };

        if self.validate {
            check(&pipeline)?;
        }

        Ok(pipeline)
    }

    /// Build number of the run: `--build` plus the pipeline's offset
    pub fn effective_build(&self, pipeline: &Pipeline) -> Result<i64> {
        let offset = pipeline
            .build_no_offset()
            .context("Failed to read build number offset")?;
        self.build.checked_add(offset).ok_or_else(|| {
            anyhow!(
                "Build number {} plus offset {} does not fit into a build number",
                self.build,
                offset
            )
        })
    }
}

/// Validate `pipeline`, turning a violation into a coloured error
pub fn check(pipeline: &Pipeline) -> Result<()> {
    if let Err(e) = validate(pipeline) {
        bail!(
            "{}",
            format!("✗ Pipeline '{}' is invalid: {}", pipeline.name(), e)
                .red()
                .bold()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const PIPELINE: &str = r#"
metadata:
  name: demo
  annotations:
    ferry.io/build-no-offset: "1000"
spec:
  resources:
    containers:
      - name: git
        image: concourse/git-resource
  stages:
    - metadata:
        name: build
        annotations:
          ferry.io/inputs: git
      spec:
        containers:
          - name: compile
            image: rust:1
"#;

    fn config_for(file: &tempfile::NamedTempFile) -> Config {
        Config {
            source: file.path().display().to_string(),
            build: 42,
            apply_defaults: true,
            validate: true,
        }
    }

    fn write_pipeline(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_prepare_applies_defaults() {
        let file = write_pipeline(PIPELINE);
        let pipeline = config_for(&file).prepare().unwrap();

        assert_eq!(pipeline.name(), "demo");
        assert_eq!(
            pipeline.spec.stages[0]
                .spec
                .as_ref()
                .and_then(|spec| spec.restart_policy.as_deref()),
            Some("Never")
        );
    }

    #[test]
    fn test_no_defaults_keeps_document() {
        let file = write_pipeline(PIPELINE);
        let mut config = config_for(&file);
        config.apply_defaults = false;

        let pipeline = config.prepare().unwrap();
        assert_eq!(
            pipeline.spec.stages[0]
                .spec
                .as_ref()
                .and_then(|spec| spec.restart_policy.as_deref()),
            None
        );
    }

    #[test]
    fn test_effective_build_adds_offset() {
        let file = write_pipeline(PIPELINE);
        let config = config_for(&file);
        let pipeline = config.prepare().unwrap();

        assert_eq!(config.effective_build(&pipeline).unwrap(), 1042);
    }

    #[test]
    fn test_effective_build_overflow_is_an_error() {
        let file = write_pipeline(&PIPELINE.replace("\"1000\"", &format!("\"{}\"", i64::MAX)));
        let config = config_for(&file);
        let pipeline = config.prepare().unwrap();

        let err = config.effective_build(&pipeline).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn test_invalid_pipeline_is_rejected() {
        let file = write_pipeline(&PIPELINE.replace("ferry.io/inputs: git", "ferry.io/inputs: svn"));
        let err = config_for(&file).prepare().unwrap_err();

        assert!(err.to_string().contains("input resource 'svn' referenced in stage 'build' does not exist"));
    }

    #[test]
    fn test_no_validate_skips_checks() {
        let file = write_pipeline(&PIPELINE.replace("ferry.io/inputs: git", "ferry.io/inputs: svn"));
        let mut config = config_for(&file);
        config.validate = false;

        assert!(config.prepare().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let config = Config {
            source: "/does/not/exist.yaml".to_string(),
            build: 1,
            apply_defaults: true,
            validate: true,
        };

        let err = config.load_pipeline().unwrap_err();
        assert!(err.to_string().contains("/does/not/exist.yaml"));
    }
}
