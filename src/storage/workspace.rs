//! Synapse workspace export reader
//!
//! A workspace export keeps one JSON document per artifact under a directory
//! named after its kind (`linkedService/`, `pipeline/`, ...). Each document
//! carries the artifact `name` and its `properties`.

use std::path::PathBuf;

use serde_json::Value;

use super::{files_with_extension, read_json, ArtifactSource, SourceError};
use crate::domain::{Artifact, ArtifactContent, ArtifactKind};

/// A raw workspace document as found on disk
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceDocument {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub value: Value,
}

impl WorkspaceDocument {
    /// Returns the file name without extension
    pub fn file_stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }

    /// Converts the document into an artifact keyed by its `name`
    pub fn to_artifact(&self) -> Result<Artifact, SourceError> {
        let malformed = |reason: &str| SourceError::MalformedArtifact {
            path: self.path.clone(),
            reason: reason.to_string(),
        };

        let object = self
            .value
            .as_object()
            .ok_or_else(|| malformed("document is not a JSON object"))?;

        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing string key 'name'"))?;

        let properties = object
            .get("properties")
            .ok_or_else(|| malformed("missing key 'properties'"))?;

        Ok(Artifact::new(
            name,
            self.kind,
            ArtifactContent::Structured(properties.clone()),
        ))
    }
}

/// Reads artifacts from a Synapse workspace export
#[derive(Debug, Clone)]
pub struct WorkspaceSource {
    root: PathBuf,
}

impl WorkspaceSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the directory holding one kind
    pub fn kind_dir(&self, kind: ArtifactKind) -> PathBuf {
        self.root.join(kind.dir())
    }

    /// Reads every document, kind by kind in load order
    pub fn documents(&self) -> Result<Vec<WorkspaceDocument>, SourceError> {
        let mut documents = Vec::new();

        for kind in ArtifactKind::WORKSPACE {
            for path in files_with_extension(&self.kind_dir(kind), "json")? {
                let value = read_json(&path)?;
                documents.push(WorkspaceDocument { kind, path, value });
            }
        }

        tracing::debug!(root = %self.root.display(), count = documents.len(), "read workspace documents");
        Ok(documents)
    }
}

impl ArtifactSource for WorkspaceSource {
    fn load_all(&self) -> Result<Vec<Artifact>, SourceError> {
        self.documents()?
            .iter()
            .map(WorkspaceDocument::to_artifact)
            .collect()
    }
}
