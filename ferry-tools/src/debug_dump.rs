//! Reproduction script for failed resource runs
//!
//! Written to `--debug-out` when the wrapped script fails. It recreates the
//! environment the script saw and prints how to invoke the resource again by
//! hand. The file can contain credentials.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::env_file;

/// Where the reproduction script writes the env file
pub const REPRODUCTION_ENV_FILE: &str = "/tmp/env";
/// Working directory used by the printed invocations
pub const REPRODUCTION_OUT_DIR: &str = "/tmp/ferry-resource";
/// Semaphore that never exists, so the invocation starts immediately
const NO_SEMAPHORE: &str = "/tmp/does-not-exist";

/// Pretty print `document` with every line commented out
fn commented(document: &str) -> String {
    let pretty = serde_json::from_str::<Value>(document)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| document.to_string());

    pretty
        .lines()
        .map(|line| format!("# {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the reproduction script
///
/// # Arguments
/// * `bin` - Path of the wrapper binary
/// * `prefix` - Env prefix of the resource
/// * `script` - Resource script that failed
/// * `document` - Input document the script received
/// * `env` - Environment the script ran with
pub fn render(
    bin: &str,
    prefix: &str,
    script: &str,
    document: &str,
    env: &BTreeMap<String, String>,
) -> String {
    let invocation = format!(
        "{} --env-prefix={} --semaphore-file={} --env-file={}",
        bin, prefix, NO_SEMAPHORE, REPRODUCTION_ENV_FILE
    );

    format!(
        "#!/bin/sh
# Recreates the environment of the failed resource run in {env_file}
# and prints how to call the resource again. Adjust {env_file} as needed.
#
# input document of the resource was:
{commented}
#
cat<<'EOF'>{env_file}
{env}EOF

cat<<'EOF'

call the resource:
\t{invocation} {script} {out_dir}

just print the document the resource gets on stdin:
\t{invocation} --just-print-json {script} {out_dir}

EOF
",
        env_file = REPRODUCTION_ENV_FILE,
        commented = commented(document),
        env = env_file::render(env),
        invocation = invocation,
        script = script,
        out_dir = REPRODUCTION_OUT_DIR,
    )
}

/// Write the reproduction script to `path`
pub async fn write(path: &Path, content: &str) -> std::io::Result<()> {
    tokio::fs::write(path, content).await
}
