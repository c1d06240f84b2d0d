//! Synapse workspace CLI commands

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use super::output::Output;
use crate::arm::ArmSerializer;
use crate::domain::{Artifact, ArtifactGraph, IgnoreRules};
use crate::storage::{
    write_document, ArtifactSource, Config, OverrideTemplate, WorkspaceDocument, WorkspaceSource,
};

#[derive(Subcommand)]
pub enum SynCommands {
    /// Generate an ARM template from a workspace export
    Arm {
        /// Workspace export directory
        #[arg(long, short = 'd')]
        dir: PathBuf,

        /// Target workspace name (overrides [synapse] workspace_name)
        #[arg(long, short = 'w')]
        workspace_name: Option<String>,

        /// Override config applied before conversion
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Write the template here instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Show the deployment order of a workspace
    Plan {
        /// Workspace export directory
        #[arg(long, short = 'd')]
        dir: PathBuf,

        /// Only show this artifact and what it needs, in deployment order
        ///
        /// Takes a bare name, or `kind/name` when the name is shared by kinds.
        #[arg(long, short = 'a')]
        artifact: Option<String>,
    },

    /// Apply environment overrides to workspace documents
    Override {
        /// Workspace export directory
        #[arg(long, short = 'd')]
        dir: PathBuf,

        /// Override config file
        #[arg(long)]
        overrides: PathBuf,

        /// Write the changes back to the workspace files
        #[arg(long)]
        inplace: bool,
    },
}

pub fn run(cmd: SynCommands, config: &Config, output: &Output) -> Result<()> {
    let rules = config.project.synapse.ignore_rules();

    match cmd {
        SynCommands::Arm {
            dir,
            workspace_name,
            overrides,
            out,
        } => {
            let workspace_name = workspace_name
                .or_else(|| config.project.synapse.workspace_name.clone())
                .ok_or_else(|| {
                    anyhow::anyhow!("No workspace name. Pass --workspace-name or set [synapse] workspace_name")
                })?;
            generate_arm(output, &dir, &workspace_name, overrides.as_deref(), out.as_deref(), &rules)
        }
        SynCommands::Plan { dir, artifact } => show_plan(output, &dir, artifact.as_deref(), &rules),
        SynCommands::Override {
            dir,
            overrides,
            inplace,
        } => apply_overrides(output, &dir, &overrides, inplace),
    }
}

fn workspace_source(dir: &Path) -> Result<WorkspaceSource> {
    if !dir.is_dir() {
        anyhow::bail!("Workspace directory not found: {}", dir.display());
    }
    Ok(WorkspaceSource::new(dir))
}

fn read_documents(dir: &Path) -> Result<Vec<WorkspaceDocument>> {
    workspace_source(dir)?
        .documents()
        .with_context(|| format!("Failed to read workspace: {}", dir.display()))
}

fn read_artifacts(dir: &Path) -> Result<Vec<Artifact>> {
    workspace_source(dir)?
        .load_all()
        .with_context(|| format!("Failed to read workspace: {}", dir.display()))
}

fn build_graph(output: &Output, mut artifacts: Vec<Artifact>, rules: &IgnoreRules) -> Result<ArtifactGraph> {
    for artifact in &mut artifacts {
        artifact.extract_references(rules)?;
        output.verbose_ctx(
            "extract",
            &format!("{} -> {} reference(s)", artifact.key(), artifact.references.len()),
        );
    }

    let graph = ArtifactGraph::build(artifacts).context("Failed to resolve workspace dependencies")?;
    output.verbose_ctx(
        "graph",
        &format!("{} artifacts, {} edges", graph.len(), graph.edge_count()),
    );
    Ok(graph)
}

fn generate_arm(
    output: &Output,
    dir: &Path,
    workspace_name: &str,
    overrides: Option<&Path>,
    out: Option<&Path>,
    rules: &IgnoreRules,
) -> Result<()> {
    let mut documents = read_documents(dir)?;

    if let Some(path) = overrides {
        let template = OverrideTemplate::load(path)
            .with_context(|| format!("Failed to load overrides: {}", path.display()))?;
        let applied = template.apply(&mut documents)?;
        output.verbose_ctx("override", &format!("Applied {} override(s)", applied.len()));
    }

    let artifacts = documents
        .iter()
        .map(WorkspaceDocument::to_artifact)
        .collect::<Result<Vec<_>, _>>()?;

    let graph = build_graph(output, artifacts, rules)?;
    let template = ArmSerializer::new(workspace_name)?.template(&graph)?;
    let json = template
        .to_json_pretty()
        .context("Failed to serialize ARM template")?;

    match out {
        Some(path) => {
            fs::write(path, format!("{}\n", json))
                .with_context(|| format!("Failed to write template: {}", path.display()))?;

            if output.is_json() {
                output.data(&serde_json::json!({
                    "path": path.display().to_string(),
                    "resources": template.resources.len(),
                }));
            } else {
                output.success(&format!(
                    "Wrote {} resource(s) to {}",
                    template.resources.len(),
                    path.display()
                ));
            }
        }
        None => println!("{}", json),
    }

    Ok(())
}

fn show_plan(output: &Output, dir: &Path, artifact: Option<&str>, rules: &IgnoreRules) -> Result<()> {
    let graph = build_graph(output, read_artifacts(dir)?, rules)?;

    let order = graph.execution_order();
    let selected = artifact.map(|name| select_artifact(&graph, name)).transpose()?;
    let keys: Vec<&str> = match &selected {
        Some(key) => {
            let mut keys = graph.upstream(key);
            keys.push(key.as_str());
            keys
        }
        None => order.iter().map(String::as_str).collect(),
    };

    let rows: Vec<(&str, &Artifact)> = keys
        .iter()
        .filter_map(|key| graph.get(key).map(|a| (*key, a)))
        .collect();

    if output.is_json() {
        let items: Vec<_> = rows
            .iter()
            .map(|(key, a)| {
                serde_json::json!({
                    "key": key,
                    "id": a.id,
                    "kind": a.kind,
                    "depends_on": graph.dependencies(key),
                    "dependents": graph.dependents(key),
                })
            })
            .collect();
        output.data(&items);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No artifacts found in {}", dir.display());
        return Ok(());
    }

    println!(
        "{:<4} {:<20} {:<32} {:<40} USED BY",
        "#", "KIND", "ARTIFACT", "DEPENDS ON"
    );
    println!("{}", "-".repeat(110));
    for (position, (key, artifact)) in rows.iter().enumerate() {
        println!(
            "{:<4} {:<20} {:<32} {:<40} {}",
            position + 1,
            artifact.kind.dir(),
            artifact.id,
            graph.dependencies(key).join(", "),
            graph.dependents(key).join(", ")
        );
    }
    output.blank();
    println!("{} artifact(s)", rows.len());

    Ok(())
}

/// Resolves `--artifact` to a graph key
fn select_artifact(graph: &ArtifactGraph, name: &str) -> Result<String> {
    if graph.contains(name) {
        return Ok(name.to_string());
    }

    match graph.find_by_name(name).as_slice() {
        [] => anyhow::bail!("Artifact not found: {}", name),
        [key] => Ok(key.to_string()),
        keys => anyhow::bail!("Artifact name {} is ambiguous, use one of: {}", name, keys.join(", ")),
    }
}

fn apply_overrides(output: &Output, dir: &Path, overrides: &Path, inplace: bool) -> Result<()> {
    let mut documents = read_documents(dir)?;
    let template = OverrideTemplate::load(overrides)
        .with_context(|| format!("Failed to load overrides: {}", overrides.display()))?;

    let applied = template.apply(&mut documents)?;
    let changed: BTreeSet<&Path> = applied.iter().map(|a| a.file.as_path()).collect();

    if inplace {
        for document in documents.iter().filter(|d| changed.contains(d.path.as_path())) {
            write_document(document)?;
            output.verbose_ctx("override", &format!("Wrote {}", document.path.display()));
        }
    }

    if output.is_json() {
        let changed_documents: Vec<_> = documents
            .iter()
            .filter(|d| changed.contains(d.path.as_path()))
            .map(|d| &d.value)
            .collect();
        output.data(&serde_json::json!({
            "applied": applied,
            "inplace": inplace,
            "documents": changed_documents,
        }));
        return Ok(());
    }

    for change in &applied {
        output.row(&[change.kind.dir(), change.name.as_str(), change.path.as_str()]);
    }

    if inplace {
        output.success(&format!("Updated {} file(s)", changed.len()));
    } else {
        output.success(&format!(
            "{} override(s) checked; pass --inplace to write {} file(s)",
            applied.len(),
            changed.len()
        ));
    }

    Ok(())
}
