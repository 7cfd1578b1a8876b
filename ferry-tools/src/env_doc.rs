//! Environment to resource document conversion
//!
//! Resource scripts read their configuration as one JSON document on stdin.
//! The compiler can only hand them environment variables, so the document
//! is spelled out as dotted variable names:
//!
//! ```text
//! git.source.uri=https://example.com/repo.git
//! git.source.branch=main
//! git.params.depth=1
//! ```
//!
//! becomes, for the prefix `git`:
//!
//! ```json
//! {
//!   "params": { "depth": 1 },
//!   "source": { "branch": "main", "uri": "https://example.com/repo.git" }
//! }
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvDocError {
    #[error("cannot convert '{var}': '{path}' is already a value, not an object")]
    Conflict { var: String, path: String },

    #[error("cannot convert '{var}': '{path}' is already set")]
    Duplicate { var: String, path: String },
}

/// Whether `key` takes part in the document for `prefix`
fn is_eligible(key: &str, prefix: &str) -> bool {
    key.contains('.') && (prefix.is_empty() || key.starts_with(&format!("{}.", prefix)))
}

/// Final segment value: JSON if it parses, the literal string otherwise
fn decode(value: &str) -> Value {
    serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

/// Build the nested document from the variables under `prefix`
///
/// Variables are applied in sorted key order. A key with an empty last
/// segment (`git.version.`) sets its parent (`version`) instead of an
/// empty-named child; at the root such a key is ignored.
pub fn env_to_document(vars: &BTreeMap<String, String>, prefix: &str) -> Result<Value, EnvDocError> {
    let mut root = Map::new();

    for (key, value) in vars.iter().filter(|(key, _)| is_eligible(key, prefix)) {
        let mut segments: Vec<&str> = key.split('.').collect();
        if !prefix.is_empty() {
            segments.remove(0);
        }

        let Some((last, parents)) = segments.split_last() else {
            continue;
        };

        if last.is_empty() {
            // `a.b.` sets `b` inside `a`
            let Some((parent, ancestors)) = parents.split_last() else {
                continue;
            };
            let map = descend(&mut root, ancestors, key)?;
            if map.contains_key(*parent) {
                return Err(EnvDocError::Duplicate {
                    var: key.to_string(),
                    path: parents.join("."),
                });
            }
            map.insert(parent.to_string(), decode(value));
        } else {
            let map = descend(&mut root, parents, key)?;
            map.insert(last.to_string(), decode(value));
        }
    }

    Ok(Value::Object(root))
}

/// Walk down `path`, creating objects as needed
fn descend<'a>(
    root: &'a mut Map<String, Value>,
    path: &[&str],
    var: &str,
) -> Result<&'a mut Map<String, Value>, EnvDocError> {
    let mut current = root;

    for (depth, segment) in path.iter().enumerate() {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(EnvDocError::Conflict {
                    var: var.to_string(),
                    path: path[..=depth].join("."),
                });
            }
        };
    }

    Ok(current)
}

/// The document for `prefix`, pretty printed with two-space indentation
pub fn env_to_json(vars: &BTreeMap<String, String>, prefix: &str) -> Result<String, EnvDocError> {
    let document = env_to_document(vars, prefix)?;
    Ok(serde_json::to_string_pretty(&document).unwrap_or_else(|_| "{}".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_simple() {
        let json = env_to_json(&vars(&[("git.foo.bar", "baz")]), "git").unwrap();
        assert_eq!(json, "{\n  \"foo\": {\n    \"bar\": \"baz\"\n  }\n}");
    }

    #[test]
    fn test_embedded_array_and_object() {
        let document = env_to_document(
            &vars(&[
                ("git.foo.list", r#"["baz","foo","too"]"#),
                ("git.foo.map", r#"{"baz":"foo","too":"bad"}"#),
            ]),
            "git",
        )
        .unwrap();

        assert_eq!(
            document,
            serde_json::json!({
                "foo": {
                    "list": ["baz", "foo", "too"],
                    "map": {"baz": "foo", "too": "bad"}
                }
            })
        );
    }

    #[test]
    fn test_scalars_are_decoded() {
        let document = env_to_document(
            &vars(&[("image.a.b.c", "1"), ("image.flag", "true"), ("image.ref", "main")]),
            "image",
        )
        .unwrap();

        assert_eq!(
            document,
            serde_json::json!({"a": {"b": {"c": 1}}, "flag": true, "ref": "main"})
        );
    }

    #[test]
    fn test_other_prefixes_are_ignored() {
        let document = env_to_document(
            &vars(&[
                ("git.foo.bar", "bar"),
                ("docker.foo.baz", "less"),
                ("gitlab.foo", "x"),
                ("PATH", "/bin"),
            ]),
            "git",
        )
        .unwrap();
        assert_eq!(document, serde_json::json!({"foo": {"bar": "bar"}}));
    }

    #[test]
    fn test_no_prefix_takes_every_dotted_variable() {
        let document = env_to_document(
            &vars(&[("foo.bar", "baz"), ("bar.foo", "baz"), ("HOME", "/root")]),
            "",
        )
        .unwrap();
        assert_eq!(
            document,
            serde_json::json!({"bar": {"foo": "baz"}, "foo": {"bar": "baz"}})
        );
    }

    #[test]
    fn test_trailing_dot_sets_parent() {
        let document = env_to_document(
            &vars(&[
                ("root", "boo"),
                ("foo.", "bar"),
                ("versions.", r#"[{"ref":"61cbef"},{"ref":"d74e01"}]"#),
            ]),
            "",
        )
        .unwrap();

        assert_eq!(
            document,
            serde_json::json!({
                "foo": "bar",
                "versions": [{"ref": "61cbef"}, {"ref": "d74e01"}]
            })
        );
    }

    #[test]
    fn test_trailing_dot_with_prefix() {
        let document = env_to_document(
            &vars(&[("transit.version.", r#"{"ref":"tmp"}"#), ("transit.", "dropped")]),
            "transit",
        )
        .unwrap();
        assert_eq!(document, serde_json::json!({"version": {"ref": "tmp"}}));
    }

    #[test]
    fn test_scalar_then_nested_is_a_conflict() {
        let err = env_to_document(
            &vars(&[("git.source", "plain"), ("git.source.uri", "https://example.com")]),
            "git",
        )
        .unwrap_err();

        assert_eq!(
            err,
            EnvDocError::Conflict {
                var: "git.source.uri".to_string(),
                path: "source".to_string(),
            }
        );
    }

    #[test]
    fn test_trailing_dot_over_scalar_is_a_duplicate() {
        let err = env_to_document(
            &vars(&[("git.version", "1"), ("git.version.", r#"{"ref":"tmp"}"#)]),
            "git",
        )
        .unwrap_err();

        assert_eq!(
            err,
            EnvDocError::Duplicate {
                var: "git.version.".to_string(),
                path: "version".to_string(),
            }
        );
    }

    #[test]
    fn test_empty_environment() {
        assert_eq!(env_to_json(&BTreeMap::new(), "git").unwrap(), "{}");
    }
}
