//! Reference extraction
//!
//! Two variants:
//! - structured: walks a JSON tree and collects `{type, referenceName}` leaves
//! - text: reads a single `/* DependsOn: [a, b] */` block from a script

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::reference::{ArtifactReference, IgnoreRules};

#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("Multiple DependsOn declarations found in {artifact} ({count} blocks)")]
    MultipleDependencyDeclarations { artifact: String, count: usize },
}

const DEPENDS_ON_PATTERN: &str = r"(?s)/\*\s*DependsOn:\s*\[(.*?)\]\s*\*/";

fn depends_on_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DEPENDS_ON_PATTERN).expect("DependsOn pattern is valid"))
}

/// Collects references embedded in a JSON tree
///
/// Depth-first, pre-order. An object holding both `type` and `referenceName`
/// is a reference leaf and is not descended into. The first occurrence of a
/// `(name, type)` pair wins, including its ignore flag.
pub fn structured_references(root: &Value, rules: &IgnoreRules) -> Vec<ArtifactReference> {
    let mut found = Vec::new();
    walk(root, rules, &mut found);
    found
}

fn walk(node: &Value, rules: &IgnoreRules, found: &mut Vec<ArtifactReference>) {
    match node {
        Value::Object(map) => match (map.get("type"), map.get("referenceName")) {
            (Some(reference_type), Some(name)) => {
                let reference =
                    ArtifactReference::classified(scalar_text(name), scalar_text(reference_type), rules);
                if !found.contains(&reference) {
                    found.push(reference);
                }
            }
            _ => {
                for value in map.values() {
                    walk(value, rules, found);
                }
            }
        },
        Value::Array(items) => {
            for item in items {
                walk(item, rules, found);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads the dependency names declared in a script's `DependsOn` block
///
/// Returns an empty list when the script has no block. The names carry no
/// reference type.
pub fn declared_dependencies(
    artifact: &str,
    text: &str,
) -> Result<Vec<ArtifactReference>, ExtractError> {
    let blocks: Vec<_> = depends_on_regex().captures_iter(text).collect();

    if blocks.len() > 1 {
        return Err(ExtractError::MultipleDependencyDeclarations {
            artifact: artifact.to_string(),
            count: blocks.len(),
        });
    }

    let mut found: Vec<ArtifactReference> = Vec::new();
    if let Some(list) = blocks.first().and_then(|caps| caps.get(1)) {
        for token in list.as_str().split(',') {
            let name = token.trim();
            if name.is_empty() {
                continue;
            }

            let reference = ArtifactReference::new(name, "");
            if !found.contains(&reference) {
                found.push(reference);
            }
        }
    }

    tracing::debug!(artifact, dependencies = ?found.iter().map(|r| &r.name).collect::<Vec<_>>(), "declared dependencies");
    Ok(found)
}
