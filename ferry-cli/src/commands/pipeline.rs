//! Pipeline command handlers
//!
//! Defaulting and validation of the document itself, independent of
//! `--no-defaults` and `--no-validate`.

use anyhow::Result;
use colored::*;
use ferry_compiler::apply_defaults;

use super::output;
use crate::config::{Config, check};

/// Print the defaulted pipeline and list what was filled in on stderr
pub fn defaults(config: &Config) -> Result<()> {
    let pipeline = config.load_pipeline()?;
    let defaulted = apply_defaults(&pipeline);

    if defaulted.changes.is_empty() {
        eprintln!("{}", "No defaults applied.".yellow());
    } else {
        eprintln!("{}", "Defaults applied:".bold());
        for change in &defaulted.changes {
            eprintln!("  {} {} = {}", "▸".cyan(), change.path, change.value.dimmed());
        }
    }

    output::print(&[output::document(&defaulted.pipeline)?])
}

pub fn validate(config: &Config) -> Result<()> {
    let pipeline = config.load_pipeline()?;
    let pipeline = if config.apply_defaults {
        apply_defaults(&pipeline).pipeline
    } else {
        pipeline
    };

    check(&pipeline)?;
    println!(
        "{}",
        format!("✓ Pipeline '{}' is valid", pipeline.name()).green().bold()
    );
    Ok(())
}
