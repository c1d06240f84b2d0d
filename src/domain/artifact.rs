//! Artifact domain model
//!
//! An artifact is a named unit of configuration taking part in dependency
//! resolution: a Synapse workspace resource definition or a SQL script.
//! Kind-specific behaviour is looked up in a static table instead of being
//! spread over a type hierarchy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::extract::{self, ExtractError};
use super::reference::{ArtifactReference, IgnoreRules};

/// Kind of artifact
///
/// Variant order must match `KIND_TABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    Pipeline,
    LinkedService,
    Dataset,
    Trigger,
    Credential,
    Notebook,
    IntegrationRuntime,
    SqlScript,
}

/// Static description of an artifact kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSpec {
    /// Directory holding this kind in a workspace export
    pub dir: &'static str,

    /// ARM resource type suffix, if the kind is deployable through ARM
    pub arm_resource_type: Option<&'static str>,

    /// Whether the ARM resource may carry `dependsOn` entries
    pub accepts_depends_on: bool,

    /// Reference type naming this kind inside other artifacts
    ///
    /// Kinds with a reference type are keyed by kind and name in a graph.
    pub reference_type: Option<&'static str>,
}

const KIND_TABLE: [(ArtifactKind, KindSpec); 8] = [
    (
        ArtifactKind::Pipeline,
        KindSpec {
            dir: "pipeline",
            arm_resource_type: Some("pipelines"),
            accepts_depends_on: true,
            reference_type: Some("PipelineReference"),
        },
    ),
    (
        ArtifactKind::LinkedService,
        KindSpec {
            dir: "linkedService",
            arm_resource_type: Some("linkedServices"),
            accepts_depends_on: true,
            reference_type: Some("LinkedServiceReference"),
        },
    ),
    (
        ArtifactKind::Dataset,
        KindSpec {
            dir: "dataset",
            arm_resource_type: Some("datasets"),
            accepts_depends_on: true,
            reference_type: Some("DatasetReference"),
        },
    ),
    (
        ArtifactKind::Trigger,
        KindSpec {
            dir: "trigger",
            arm_resource_type: Some("triggers"),
            accepts_depends_on: true,
            reference_type: Some("TriggerReference"),
        },
    ),
    (
        ArtifactKind::Credential,
        KindSpec {
            dir: "credential",
            arm_resource_type: Some("credentials"),
            accepts_depends_on: true,
            reference_type: Some("CredentialReference"),
        },
    ),
    // Synapse rejects ordering constraints on notebooks
    (
        ArtifactKind::Notebook,
        KindSpec {
            dir: "notebook",
            arm_resource_type: Some("notebooks"),
            accepts_depends_on: false,
            reference_type: Some("NotebookReference"),
        },
    ),
    (
        ArtifactKind::IntegrationRuntime,
        KindSpec {
            dir: "integrationRuntime",
            arm_resource_type: Some("integrationRuntimes"),
            accepts_depends_on: true,
            reference_type: Some("IntegrationRuntimeReference"),
        },
    ),
    (
        ArtifactKind::SqlScript,
        KindSpec {
            dir: "sqlscript",
            arm_resource_type: None,
            accepts_depends_on: false,
            reference_type: None,
        },
    ),
];

impl ArtifactKind {
    /// Kinds found in a Synapse workspace export, in load order
    pub const WORKSPACE: [ArtifactKind; 7] = [
        ArtifactKind::LinkedService,
        ArtifactKind::IntegrationRuntime,
        ArtifactKind::Credential,
        ArtifactKind::Dataset,
        ArtifactKind::Notebook,
        ArtifactKind::Pipeline,
        ArtifactKind::Trigger,
    ];

    /// Returns the static description of this kind
    pub fn spec(&self) -> &'static KindSpec {
        // Table rows follow declaration order
        &KIND_TABLE[*self as usize].1
    }

    /// Returns the workspace directory name for this kind
    pub fn dir(&self) -> &'static str {
        self.spec().dir
    }

    /// Looks up the kind a reference type points at
    pub fn from_reference_type(reference_type: &str) -> Option<Self> {
        KIND_TABLE
            .iter()
            .find(|(_, spec)| spec.reference_type == Some(reference_type))
            .map(|(kind, _)| *kind)
    }

    /// Returns the graph key of an artifact of this kind named `name`
    ///
    /// Workspace kinds share one namespace per kind, so `Sales` the dataset
    /// and `Sales` the linked service become `dataset/Sales` and
    /// `linkedService/Sales`. Scripts keep their bare name.
    pub fn key_for(&self, name: &str) -> String {
        match self.spec().reference_type {
            Some(_) => format!("{}/{}", self.dir(), name),
            None => name.to_string(),
        }
    }

    /// Looks up a kind by its workspace directory name
    pub fn from_dir(dir: &str) -> Option<Self> {
        KIND_TABLE
            .iter()
            .find(|(_, spec)| spec.dir == dir)
            .map(|(kind, _)| *kind)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_dir(s).ok_or_else(|| format!("Unknown artifact kind: {}", s))
    }
}

/// Raw content of an artifact
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    /// A JSON tree (workspace resources keep their `properties` here)
    Structured(Value),

    /// Raw script text
    Text(String),
}

impl ArtifactContent {
    /// Returns the script text, if this is a text artifact
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArtifactContent::Text(text) => Some(text),
            ArtifactContent::Structured(_) => None,
        }
    }

    /// Returns the JSON tree, if this is a structured artifact
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ArtifactContent::Structured(value) => Some(value),
            ArtifactContent::Text(_) => None,
        }
    }
}

/// A named artifact and the references discovered in it
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Unique id within its collection
    pub id: String,

    /// Kind of artifact
    pub kind: ArtifactKind,

    /// Raw content
    pub content: ArtifactContent,

    /// References found by the last extraction pass, deduplicated
    pub references: Vec<ArtifactReference>,
}

impl Artifact {
    /// Creates an artifact with no references extracted yet
    pub fn new(id: impl Into<String>, kind: ArtifactKind, content: ArtifactContent) -> Self {
        Self {
            id: id.into(),
            kind,
            content,
            references: Vec::new(),
        }
    }

    /// Creates a SQL script artifact
    pub fn script(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, ArtifactKind::SqlScript, ArtifactContent::Text(text.into()))
    }

    /// Returns the key identifying this artifact in a graph
    pub fn key(&self) -> String {
        self.kind.key_for(&self.id)
    }

    /// Rebuilds the reference list from the raw content
    ///
    /// Replaces any previous result, so repeated calls over the same content
    /// yield the same list.
    pub fn extract_references(&mut self, rules: &IgnoreRules) -> Result<(), ExtractError> {
        self.references = match &self.content {
            ArtifactContent::Structured(value) => extract::structured_references(value, rules),
            ArtifactContent::Text(text) => extract::declared_dependencies(&self.id, text)?,
        };

        Ok(())
    }

    /// Iterates over references that take part in ordering
    pub fn ordering_references(&self) -> impl Iterator<Item = &ArtifactReference> {
        self.references.iter().filter(|r| !r.ignore)
    }

    /// Builder-style helper that sets references directly
    pub fn with_references(mut self, references: Vec<ArtifactReference>) -> Self {
        self.references = references;
        self
    }
}
