//! Domain models for cloudforge
//!
//! Contains the dependency engine without any I/O concerns: artifacts,
//! the references between them, and the graph that orders them.

mod artifact;
mod extract;
mod graph;
mod reference;

pub use artifact::{Artifact, ArtifactContent, ArtifactKind, KindSpec};
pub use extract::{declared_dependencies, structured_references, ExtractError};
pub use graph::{ArtifactGraph, GraphError};
pub use reference::{ArtifactReference, IgnoreRules};
