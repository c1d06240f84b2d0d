//! # Storage Layer
//!
//! Reads artifacts from disk and writes environment overrides back.
//!
//! ## Source Layouts
//!
//! | Source | Layout | Artifact id |
//! |--------|--------|-------------|
//! | Synapse workspace | `<root>/<kind>/*.json` with `name` + `properties` | `name` key |
//! | SQL scripts | `<root>/dbo_initial_setup.sql`, `<root>/migrations/*.sql`, `<root>/etl/*.sql` | file stem |
//! | Synapse SQL scripts | `<root>/sqlscript/*.json`, classified by `properties.folder.name` | `name` key |
//! | Config | TOML | `cloudforge.toml` |
//!
//! Files within a directory are always read in file name order, so loads are
//! deterministic across platforms.
//!
//! ## Concurrency Safety
//!
//! - In-place override writes take an exclusive `fs2` lock
//! - All writes are atomic (temp file + rename)
//!
//! ## Key Types
//!
//! - [`ArtifactSource`] - Anything that yields artifacts from a root directory
//! - [`WorkspaceSource`] - Synapse workspace export
//! - [`ScriptSource`] - SQL migration and ETL scripts
//! - [`OverrideTemplate`] - Per-environment JSON updates
//! - [`Config`] - Project and global configuration

mod config;
mod overrides;
mod scripts;
mod workspace;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::Artifact;

pub use config::{
    Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig, SqlConfig, SynapseConfig,
    CONFIG_FILE,
};
pub use overrides::{
    lookup_path, update_path, write_document, Action, ActionKind, AppliedOverride, OverrideError,
    OverrideTemplate,
};
pub use scripts::{ScriptSource, DEFAULT_INITIAL_SETUP};
pub use workspace::{WorkspaceDocument, WorkspaceSource};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Malformed artifact {}: {reason}", path.display())]
    MalformedArtifact { path: PathBuf, reason: String },
}

/// Yields artifacts from a directory tree
pub trait ArtifactSource {
    /// Loads every artifact, failing on the first unreadable one
    fn load_all(&self) -> Result<Vec<Artifact>, SourceError>;
}

/// Lists files with the given extension, sorted by file name
///
/// A missing directory yields no files.
fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, SourceError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|source| SourceError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| SourceError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();

        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn read_text(path: &Path) -> Result<String, SourceError> {
    fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json(path: &Path) -> Result<serde_json::Value, SourceError> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
