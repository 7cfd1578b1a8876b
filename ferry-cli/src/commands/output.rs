//! YAML output
//!
//! Manifests go to stdout as a multi-document YAML stream; everything else
//! goes to stderr.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_yaml::Value;

/// Separator between two documents of the stream
pub const SEPARATOR: &str = "---\n";

/// Convert one object into a document of the stream
pub fn document<T: Serialize>(object: &T) -> Result<Value> {
    serde_yaml::to_value(object).context("Failed to serialize manifest")
}

/// Render documents separated by `---`
pub fn render(documents: &[Value]) -> Result<String> {
    let rendered = documents
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to render YAML")?;
    Ok(rendered.join(SEPARATOR))
}

pub fn print(documents: &[Value]) -> Result<()> {
    print!("{}", render(documents)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_render_separates_documents() {
        let first = document(&BTreeMap::from([("kind", "ConfigMap")])).unwrap();
        let second = document(&BTreeMap::from([("kind", "Pod")])).unwrap();

        assert_eq!(
            render(&[first, second]).unwrap(),
            "kind: ConfigMap\n---\nkind: Pod\n"
        );
    }

    #[test]
    fn test_render_nothing() {
        assert_eq!(render(&[]).unwrap(), "");
    }
}
