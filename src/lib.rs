//! cloudforge - Dependency-aware deployments for Azure Synapse
//!
//! Turns a Synapse workspace export into an ARM template whose `dependsOn`
//! lists follow the artifact dependency graph, and runs SQL migrations and
//! ETL object refreshes in dependency order against a tracked database.

pub mod arm;
pub mod cli;
pub mod domain;
pub mod migrate;
pub mod storage;

pub use domain::{Artifact, ArtifactGraph, ArtifactKind, ArtifactReference, GraphError};
