//! Artifact references
//!
//! A reference is a directed edge from one artifact to another, discovered
//! while scanning the artifact's content. References that point at
//! environment-bound compute pools or implicit workspace singletons are kept
//! but flagged as ignored, so they never produce ordering edges.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::artifact::ArtifactKind;

/// Rules deciding which references are flagged as ignored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRules {
    /// Substrings matched case-insensitively against the reference type
    pub type_markers: Vec<String>,

    /// Substrings matched against the referenced name
    pub name_markers: Vec<String>,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            type_markers: vec!["sqlpool".to_string(), "bigdatapool".to_string()],
            name_markers: vec!["WorkspaceDefault".to_string()],
        }
    }
}

impl IgnoreRules {
    /// Returns true if a reference with this name and type must not order anything
    pub fn is_ignored(&self, name: &str, reference_type: &str) -> bool {
        let lowered = reference_type.to_lowercase();
        let pool_type = self
            .type_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()));

        pool_type || self.name_markers.iter().any(|marker| name.contains(marker.as_str()))
    }
}

/// A reference from one artifact to another
///
/// Equality and hashing only consider `name` and `reference_type`; the
/// ignore flag is a classification, not part of the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// Name of the referenced artifact
    pub name: String,

    /// Reference type as written in the source (e.g. `LinkedServiceReference`)
    #[serde(rename = "type")]
    pub reference_type: String,

    /// Excluded from ordering constraints
    #[serde(default)]
    pub ignore: bool,
}

impl ArtifactReference {
    /// Creates a reference that takes part in ordering
    pub fn new(name: impl Into<String>, reference_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference_type: reference_type.into(),
            ignore: false,
        }
    }

    /// Creates a reference and classifies it against the ignore rules
    pub fn classified(
        name: impl Into<String>,
        reference_type: impl Into<String>,
        rules: &IgnoreRules,
    ) -> Self {
        let mut reference = Self::new(name, reference_type);
        reference.ignore = rules.is_ignored(&reference.name, &reference.reference_type);
        reference
    }

    /// Creates a reference that is kept but never orders anything
    pub fn ignored(name: impl Into<String>, reference_type: impl Into<String>) -> Self {
        Self {
            ignore: true,
            ..Self::new(name, reference_type)
        }
    }

    /// Returns the graph key of the artifact this reference points at
    ///
    /// Typed references resolve within their kind; untyped ones, such as
    /// `DependsOn` entries, resolve by bare name.
    pub fn target_key(&self) -> String {
        match ArtifactKind::from_reference_type(&self.reference_type) {
            Some(kind) => kind.key_for(&self.name),
            None => self.name.clone(),
        }
    }

    /// Returns the pluralised resource segment for this reference type
    ///
    /// `DatasetReference` becomes `datasets`, `LinkedServiceReference`
    /// becomes `linkedServices`.
    pub fn arm_type_segment(&self) -> String {
        let mut chars = self.reference_type.chars();
        let camel = match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect::<String>(),
            None => String::new(),
        };

        let mut segment = camel.replace("Reference", "");
        segment.push('s');
        segment
    }

    /// Formats the reference as an ARM dependency path under `prefix`
    pub fn format_arm_path(&self, prefix: &str) -> String {
        format!("{}/{}/{}", prefix, self.arm_type_segment(), self.name)
    }
}

impl PartialEq for ArtifactReference {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.reference_type == other.reference_type
    }
}

impl Eq for ArtifactReference {}

impl Hash for ArtifactReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.reference_type.hash(state);
    }
}
