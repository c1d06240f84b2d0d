//! SQL script tree reader
//!
//! Two layouts are understood side by side:
//!
//! ```text
//! <root>/
//! ├── dbo_initial_setup.sql   # initial setup, always first
//! ├── migrations/*.sql        # ledger-tracked, id = file stem
//! ├── etl/*.sql               # refreshed on every run
//! └── sqlscript/*.json        # Synapse SQL scripts, folder decides the group
//! ```

use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{files_with_extension, read_json, read_text, ArtifactSource, SourceError};
use crate::domain::Artifact;
use crate::migrate::ScriptSet;

/// Default name of the initial setup script
pub const DEFAULT_INITIAL_SETUP: &str = "dbo_initial_setup";

const MIGRATIONS_DIR: &str = "migrations";
const ETL_DIR: &str = "etl";
const SQLSCRIPT_DIR: &str = "sqlscript";

/// Reads migration and ETL scripts from a target directory
#[derive(Debug, Clone)]
pub struct ScriptSource {
    root: PathBuf,
    initial_setup: String,
}

impl ScriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            initial_setup: DEFAULT_INITIAL_SETUP.to_string(),
        }
    }

    /// Overrides the initial setup script name
    pub fn with_initial_setup(mut self, name: impl Into<String>) -> Self {
        self.initial_setup = name.into();
        self
    }

    /// Loads all scripts grouped by stage
    pub fn load(&self) -> Result<ScriptSet, SourceError> {
        let mut set = ScriptSet::default();

        let setup_path = self.root.join(format!("{}.sql", self.initial_setup));
        if setup_path.is_file() {
            set.initial_setup = Some(Artifact::script(&self.initial_setup, read_text(&setup_path)?));
        }

        set.migrations = plain_scripts(&self.root.join(MIGRATIONS_DIR))?;
        set.etl = plain_scripts(&self.root.join(ETL_DIR))?;

        for path in files_with_extension(&self.root.join(SQLSCRIPT_DIR), "json")? {
            let (name, folder, query) = synapse_script(&path)?;

            if name == self.initial_setup {
                if set.initial_setup.is_none() {
                    set.initial_setup = Some(Artifact::script(name, query));
                }
                continue;
            }

            match folder.as_deref() {
                Some(MIGRATIONS_DIR) => set.migrations.push(Artifact::script(name, query)),
                Some(ETL_DIR) => set.etl.push(Artifact::script(name, query)),
                other => {
                    tracing::debug!(script = %name, folder = ?other, "skipping unclassified SQL script");
                }
            }
        }

        tracing::debug!(
            root = %self.root.display(),
            migrations = set.migrations.len(),
            etl = set.etl.len(),
            "read SQL scripts"
        );
        Ok(set)
    }
}

impl ArtifactSource for ScriptSource {
    fn load_all(&self) -> Result<Vec<Artifact>, SourceError> {
        let set = self.load()?;
        Ok(set
            .initial_setup
            .into_iter()
            .chain(set.migrations)
            .chain(set.etl)
            .collect())
    }
}

fn plain_scripts(dir: &Path) -> Result<Vec<Artifact>, SourceError> {
    files_with_extension(dir, "sql")?
        .into_iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| SourceError::MalformedArtifact {
                    path: path.clone(),
                    reason: "file name is not valid UTF-8".to_string(),
                })?
                .to_string();
            Ok(Artifact::script(stem, read_text(&path)?))
        })
        .collect()
}

/// Extracts `(name, folder, query)` from a Synapse `sqlscript` document
fn synapse_script(path: &Path) -> Result<(String, Option<String>, String), SourceError> {
    let value = read_json(path)?;
    let malformed = |reason: &str| SourceError::MalformedArtifact {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let name = value
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing string key 'name'"))?;

    let query = value
        .pointer("/properties/content/query")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing string key 'properties.content.query'"))?;

    let folder = value
        .pointer("/properties/folder/name")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok((name.to_string(), folder, query.to_string()))
}
