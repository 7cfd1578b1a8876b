//! Flat `key=value` environment files
//!
//! One variable per line, no quoting and no interpolation. Leading
//! whitespace is trimmed, the value is everything after the first `=`, and
//! lines without `=` are ignored.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::wrapper::WrapperError;

pub fn parse(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(|line| line.trim_start())
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Read an env file
///
/// A missing file yields no variables when `ignore_missing` is set. With
/// `delete_after_read` the file is removed once read; failing to remove it
/// is only logged.
pub async fn load(
    path: &Path,
    ignore_missing: bool,
    delete_after_read: bool,
) -> Result<Vec<(String, String)>, WrapperError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound && ignore_missing => {
            debug!(path = %path.display(), "Env file does not exist, ignoring");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(WrapperError::EnvFile {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    if delete_after_read {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to delete env file, continuing");
        }
    }

    Ok(parse(&content))
}

/// Entries of the env file layered over a base environment
pub fn merge<I>(base: I, overrides: Vec<(String, String)>) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = base.into_iter().collect();
    env.extend(overrides);
    env
}

/// Render an environment back into env file form
pub fn render(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect()
}
