//! Environment overrides for workspace documents
//!
//! An override config maps workspace kind directories to actions:
//!
//! ```json
//! {
//!   "linkedService": [
//!     {
//!       "name": "MyLinkedService",
//!       "path": "$.properties.typeProperties.baseUrl",
//!       "value": "https://prod.example.com",
//!       "action": "update"
//!     }
//!   ]
//! }
//! ```
//!
//! `name` is the document file stem. Paths start at `$`, separate keys with
//! dots and use numeric segments to index arrays.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use fs2::FileExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::workspace::WorkspaceDocument;
use crate::domain::ArtifactKind;

#[derive(Debug, Error)]
pub enum OverrideError {
    #[error("Failed to parse override config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Override for {kind} is missing parameter '{field}'")]
    MissingParameter { kind: String, field: &'static str },

    #[error("Invalid path '{0}': expecting '$' as root")]
    InvalidRoot(String),

    #[error("Invalid action '{0}'")]
    InvalidAction(String),

    #[error("Path '{path}' does not exist in {}", file.display())]
    MissingPath { path: String, file: PathBuf },

    #[error("No {kind} document named {name}")]
    MissingTarget { kind: ArtifactKind, name: String },

    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Operation an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Update,
}

impl FromStr for ActionKind {
    type Err = OverrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(ActionKind::Update),
            other => Err(OverrideError::InvalidAction(other.to_string())),
        }
    }
}

/// A single override on one document
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub name: String,
    pub path: String,
    pub value: Value,
    pub action: ActionKind,
}

#[derive(Deserialize)]
struct RawAction {
    name: Option<String>,
    path: Option<String>,
    value: Option<Value>,
    action: Option<String>,
}

impl Action {
    fn from_raw(kind: &str, raw: RawAction) -> Result<Self, OverrideError> {
        let missing = |field| OverrideError::MissingParameter {
            kind: kind.to_string(),
            field,
        };

        let action = raw.action.ok_or_else(|| missing("action"))?.parse::<ActionKind>()?;
        let path = raw.path.ok_or_else(|| missing("path"))?;
        parse_path(&path)?;

        Ok(Self {
            name: raw.name.ok_or_else(|| missing("name"))?,
            path,
            value: raw.value.ok_or_else(|| missing("value"))?,
            action,
        })
    }
}

/// Record of an applied override
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AppliedOverride {
    pub kind: ArtifactKind,
    pub name: String,
    pub path: String,
    pub file: PathBuf,
}

/// Overrides grouped by workspace kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideTemplate {
    actions: Vec<(ArtifactKind, Vec<Action>)>,
}

impl OverrideTemplate {
    /// Parses an override config
    pub fn from_json(text: &str) -> Result<Self, OverrideError> {
        let raw: Map<String, Value> = serde_json::from_str(text)?;
        let mut actions = Vec::new();

        for kind in ArtifactKind::WORKSPACE {
            let Some(entries) = raw.get(kind.dir()) else {
                continue;
            };

            let entries: Vec<RawAction> = serde_json::from_value(entries.clone())?;
            let parsed = entries
                .into_iter()
                .map(|entry| Action::from_raw(kind.dir(), entry))
                .collect::<Result<Vec<_>, _>>()?;

            if !parsed.is_empty() {
                actions.push((kind, parsed));
            }
        }

        for key in raw.keys() {
            if !ArtifactKind::WORKSPACE.iter().any(|k| k.dir() == key) {
                tracing::warn!(key = %key, "ignoring overrides for unknown kind");
            }
        }

        Ok(Self { actions })
    }

    /// Reads an override config file
    pub fn load(path: &Path) -> Result<Self, OverrideError> {
        let text = fs::read_to_string(path).map_err(|source| OverrideError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Returns the actions for one kind
    pub fn actions_for(&self, kind: ArtifactKind) -> &[Action] {
        self.actions
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, actions)| actions.as_slice())
            .unwrap_or_default()
    }

    /// Total number of actions
    pub fn len(&self) -> usize {
        self.actions.iter().map(|(_, a)| a.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies every action to the matching documents
    ///
    /// Documents are matched by kind and file stem. Each change is returned
    /// in application order.
    pub fn apply(&self, documents: &mut [WorkspaceDocument]) -> Result<Vec<AppliedOverride>, OverrideError> {
        let mut applied = Vec::new();

        for (kind, actions) in &self.actions {
            for action in actions {
                let document = documents
                    .iter_mut()
                    .find(|d| d.kind == *kind && d.file_stem() == Some(action.name.as_str()))
                    .ok_or_else(|| OverrideError::MissingTarget {
                        kind: *kind,
                        name: action.name.clone(),
                    })?;

                match action.action {
                    ActionKind::Update => {
                        update_path(&mut document.value, &action.path, action.value.clone())
                            .map_err(|e| with_file(e, &document.path))?;
                    }
                }

                tracing::info!(kind = %kind, name = %action.name, path = %action.path, "applied override");
                applied.push(AppliedOverride {
                    kind: *kind,
                    name: action.name.clone(),
                    path: action.path.clone(),
                    file: document.path.clone(),
                });
            }
        }

        Ok(applied)
    }
}

fn with_file(err: OverrideError, file: &Path) -> OverrideError {
    match err {
        OverrideError::MissingPath { path, .. } => OverrideError::MissingPath {
            path,
            file: file.to_path_buf(),
        },
        other => other,
    }
}

/// Splits a `$`-rooted dot path into segments
fn parse_path(path: &str) -> Result<Vec<&str>, OverrideError> {
    let mut segments = path.split('.');
    if segments.next() != Some("$") {
        return Err(OverrideError::InvalidRoot(path.to_string()));
    }
    Ok(segments.collect())
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

/// Reads the value at a dot path
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Result<&'a Value, OverrideError> {
    let missing = || OverrideError::MissingPath {
        path: path.to_string(),
        file: PathBuf::new(),
    };

    parse_path(path)?
        .into_iter()
        .try_fold(root, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
        .ok_or_else(missing)
}

/// Sets the value at a dot path
///
/// Intermediate segments must exist. The last segment may add a new key to
/// an object but must index an existing array element.
pub fn update_path(root: &mut Value, path: &str, new_value: Value) -> Result<(), OverrideError> {
    let missing = || OverrideError::MissingPath {
        path: path.to_string(),
        file: PathBuf::new(),
    };

    let segments = parse_path(path)?;
    let (last, parents) = segments.split_last().ok_or_else(missing)?;

    let mut target = root;
    for segment in parents {
        target = child_mut(target, segment).ok_or_else(missing)?;
    }

    match target {
        Value::Object(map) => {
            map.insert((*last).to_string(), new_value);
        }
        Value::Array(items) => {
            let slot = last
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(missing)?;
            *slot = new_value;
        }
        _ => return Err(missing()),
    }

    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> OverrideError + '_ {
    move |source| OverrideError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes a document back to its file atomically
pub fn write_document(document: &WorkspaceDocument) -> Result<(), OverrideError> {
    let temp_path = document.path.with_extension("json.tmp");

    {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(io_error(&temp_path))?;

        // Exclusive lock while the new content is written
        file.lock_exclusive().map_err(io_error(&temp_path))?;

        let mut writer = BufWriter::new(&file);
        serde_json::to_writer_pretty(&mut writer, &document.value)?;
        writeln!(writer).map_err(io_error(&temp_path))?;
        writer.flush().map_err(io_error(&temp_path))?;
    }

    fs::rename(&temp_path, &document.path).map_err(io_error(&document.path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::WorkspaceSource;
    use serde_json::json;
    use tempfile::TempDir;

    const CONFIG: &str = r#"{
        "linkedService": [{
            "name": "MyLinkedService",
            "path": "$.properties.typeProperties.baseUrl",
            "value": "https://__MYTAG__.com",
            "action": "update"
        }]
    }"#;

    fn example() -> Value {
        json!({
            "name": "MyLinkedService",
            "properties": {
                "typeProperties": {"baseUrl": "https://dummy.fake"},
                "annotations": [{"type": "tag", "name": "MyAnnotation"}]
            }
        })
    }

    fn workspace_with_example() -> TempDir {
        let dir = TempDir::new().unwrap();
        let ls = dir.path().join("linkedService");
        fs::create_dir_all(&ls).unwrap();
        fs::write(ls.join("MyLinkedService.json"), example().to_string()).unwrap();
        dir
    }

    #[test]
    fn parses_config() {
        let template = OverrideTemplate::from_json(CONFIG).unwrap();
        assert_eq!(template.len(), 1);

        let actions = template.actions_for(ArtifactKind::LinkedService);
        assert_eq!(actions[0].name, "MyLinkedService");
        assert_eq!(actions[0].action, ActionKind::Update);
        assert!(template.actions_for(ArtifactKind::Pipeline).is_empty());
    }

    #[test]
    fn missing_parameter_is_rejected() {
        let config = r#"{"dataset": [{"name": "D", "path": "$.properties.type", "action": "update"}]}"#;
        let err = OverrideTemplate::from_json(config).unwrap_err();
        assert!(matches!(err, OverrideError::MissingParameter { field: "value", .. }));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let config = r#"{"dataset": [{"name": "D", "path": "$.a", "value": 1, "action": "delete"}]}"#;
        let err = OverrideTemplate::from_json(config).unwrap_err();
        assert!(matches!(err, OverrideError::InvalidAction(ref a) if a == "delete"));
    }

    #[test]
    fn path_must_start_at_root() {
        assert!(matches!(
            parse_path("$properties.typeProperties.baseUrl"),
            Err(OverrideError::InvalidRoot(_))
        ));
        assert_eq!(
            parse_path("$.properties.typeProperties.0.annotations.name").unwrap(),
            vec!["properties", "typeProperties", "0", "annotations", "name"]
        );
    }

    #[test]
    fn update_object_and_array_paths() {
        let mut target = example();

        update_path(&mut target, "$.properties.typeProperties.baseUrl", json!("https://superdummy.fake.com")).unwrap();
        assert_eq!(
            lookup_path(&target, "$.properties.typeProperties.baseUrl").unwrap(),
            "https://superdummy.fake.com"
        );

        update_path(&mut target, "$.properties.annotations.0.name", json!("MyNewAnnotationTag")).unwrap();
        assert_eq!(target["properties"]["annotations"][0]["name"], "MyNewAnnotationTag");
    }

    #[test]
    fn update_missing_intermediate_fails() {
        let mut target = example();
        let err = update_path(&mut target, "$.properties.nope.baseUrl", json!(1)).unwrap_err();
        assert!(matches!(err, OverrideError::MissingPath { .. }));

        let err = update_path(&mut target, "$.properties.annotations.5", json!(1)).unwrap_err();
        assert!(matches!(err, OverrideError::MissingPath { .. }));
    }

    #[test]
    fn apply_to_documents() {
        let dir = workspace_with_example();
        let mut documents = WorkspaceSource::new(dir.path()).documents().unwrap();

        let template = OverrideTemplate::from_json(CONFIG).unwrap();
        let applied = template.apply(&mut documents).unwrap();

        assert_eq!(applied.len(), 1);
        assert_eq!(
            documents[0].value["properties"]["typeProperties"]["baseUrl"],
            "https://__MYTAG__.com"
        );
        // Untouched keys survive
        assert_eq!(documents[0].value["properties"]["annotations"][0]["name"], "MyAnnotation");
    }

    #[test]
    fn apply_requires_target_document() {
        let dir = TempDir::new().unwrap();
        let mut documents = WorkspaceSource::new(dir.path()).documents().unwrap();

        let err = OverrideTemplate::from_json(CONFIG)
            .unwrap()
            .apply(&mut documents)
            .unwrap_err();
        assert!(matches!(err, OverrideError::MissingTarget { .. }));
    }

    #[test]
    fn write_document_in_place() {
        let dir = workspace_with_example();
        let mut documents = WorkspaceSource::new(dir.path()).documents().unwrap();
        OverrideTemplate::from_json(CONFIG)
            .unwrap()
            .apply(&mut documents)
            .unwrap();

        write_document(&documents[0]).unwrap();

        let reread = WorkspaceSource::new(dir.path()).documents().unwrap();
        assert_eq!(reread[0].value, documents[0].value);
        assert!(!documents[0].path.with_extension("json.tmp").exists());
    }
}
