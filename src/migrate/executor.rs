//! Migration executor
//!
//! Runs a resolved plan strictly in sequence over one connection:
//!
//! ```text
//! initial setup ──► migrations (ledger tracked) ──► ETL objects (always refreshed)
//! ```
//!
//! Each migration goes `Checking → Skip` when the ledger already has it, or
//! `Checking → Executing → Recording` otherwise. Declining an interactive
//! confirmation aborts the whole run.

use std::fmt;
use std::io::{self, BufRead, Write};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ledger::Ledger;
use super::runner::{run_script, RunnerError, ScriptRunner};
use crate::domain::{Artifact, ArtifactGraph, ExtractError, GraphError, IgnoreRules};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Initial setup {name} failed: {source}")]
    InitialSetupFailed { name: String, source: RunnerError },

    /// Halted run; `report` holds every step up to and including the failure
    #[error("Failed to execute {name}: {source}")]
    ScriptFailed {
        name: String,
        source: RunnerError,
        report: RunReport,
    },

    #[error("Script {0} has no SQL text")]
    NotAScript(String),

    #[error("Ledger query for {name} failed: {source}")]
    Ledger { name: String, source: RunnerError },

    #[error("Aborted by operator at {name}")]
    Aborted { name: String },

    #[error("Failed to read confirmation: {0}")]
    Prompt(#[from] io::Error),
}

/// What to do when a single script fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and carry on with the next script
    #[default]
    Continue,
    /// Stop the run at the first failure
    Halt,
}

/// Scripts making up one deployment, before resolution
#[derive(Debug, Clone, Default)]
pub struct ScriptSet {
    pub initial_setup: Option<Artifact>,
    pub migrations: Vec<Artifact>,
    pub etl: Vec<Artifact>,
}

/// A fully resolved deployment
#[derive(Debug)]
pub struct MigrationPlan {
    pub initial_setup: Option<Artifact>,
    pub migrations: ArtifactGraph,
    pub etl: ArtifactGraph,
}

impl MigrationPlan {
    /// Extracts dependencies and orders both script groups
    ///
    /// Migrations are taken in name order before their own `DependsOn`
    /// constraints apply. Any failure here happens before a single statement
    /// is sent to the database.
    pub fn resolve(scripts: ScriptSet, rules: &IgnoreRules) -> Result<Self, ExecutorError> {
        let ScriptSet {
            initial_setup,
            mut migrations,
            mut etl,
        } = scripts;

        for script in initial_setup.iter().chain(&migrations).chain(&etl) {
            script_text(script)?;
        }

        migrations.sort_by(|a, b| a.id.cmp(&b.id));

        for script in migrations.iter_mut().chain(etl.iter_mut()) {
            script.extract_references(rules)?;
        }

        Ok(Self {
            initial_setup,
            migrations: ArtifactGraph::build(migrations)?,
            etl: ArtifactGraph::build(etl)?,
        })
    }
}

/// Stage a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    InitialSetup,
    Migration,
    Etl,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::InitialSetup => "setup",
            Stage::Migration => "migration",
            Stage::Etl => "etl",
        };
        write!(f, "{}", label)
    }
}

/// Result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    Skipped,
    Refreshed,
    Failed(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Applied => write!(f, "applied"),
            StepOutcome::Skipped => write!(f, "skipped"),
            StepOutcome::Refreshed => write!(f, "refreshed"),
            StepOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub stage: Stage,
    pub name: String,
    pub outcome: StepOutcome,
}

/// Everything that happened during a run, in order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
}

impl RunReport {
    fn push(&mut self, stage: Stage, name: &str, outcome: StepOutcome) {
        self.steps.push(StepReport {
            stage,
            name: name.to_string(),
            outcome,
        });
    }

    /// Names of steps with the given outcome
    pub fn names_with(&self, outcome: &StepOutcome) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| &s.outcome == outcome)
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Steps that failed
    pub fn failures(&self) -> Vec<&StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
            .collect()
    }
}

/// Asks the operator before a script runs
pub trait Confirm {
    fn confirm(&mut self, name: &str, script: &str) -> io::Result<bool>;
}

impl<F> Confirm for F
where
    F: FnMut(&str, &str) -> bool,
{
    fn confirm(&mut self, name: &str, script: &str) -> io::Result<bool> {
        Ok(self(name, script))
    }
}

/// Prompts on the terminal
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, name: &str, script: &str) -> io::Result<bool> {
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "Executing script [{}]:", name)?;
        writeln!(stdout, "{}", script)?;
        write!(stdout, "Execute script? (y/n): ")?;
        stdout.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }
}

/// Options for a run
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorOptions {
    pub interactive: bool,
    pub failure_policy: FailurePolicy,
}

/// Executes a plan over one exclusive connection
pub struct MigrationExecutor<R, L> {
    runner: R,
    ledger: L,
    options: ExecutorOptions,
    confirm: Box<dyn Confirm>,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl<R: ScriptRunner, L: Ledger> MigrationExecutor<R, L> {
    pub fn new(runner: R, ledger: L, options: ExecutorOptions) -> Self {
        Self {
            runner,
            ledger,
            options,
            confirm: Box::new(StdinConfirm),
            clock: local_now,
        }
    }

    /// Replaces the terminal prompt
    pub fn with_confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Replaces the clock used for ledger timestamps
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Releases the connection and ledger
    pub fn into_parts(self) -> (R, L) {
        (self.runner, self.ledger)
    }

    /// Runs the plan
    pub fn run(&mut self, plan: &MigrationPlan) -> Result<RunReport, ExecutorError> {
        let mut report = RunReport::default();

        if let Some(setup) = &plan.initial_setup {
            tracing::info!(script = %setup.id, "running initial setup");
            self.confirm_step(setup)?;
            run_script(&mut self.runner, script_text(setup)?).map_err(|source| {
                ExecutorError::InitialSetupFailed {
                    name: setup.id.clone(),
                    source,
                }
            })?;
            report.push(Stage::InitialSetup, &setup.id, StepOutcome::Applied);
        }

        for migration in plan.migrations.ordered() {
            let name = migration.id.as_str();

            let applied = self
                .ledger
                .already_applied(&mut self.runner, name)
                .map_err(|source| ExecutorError::Ledger {
                    name: name.to_string(),
                    source,
                })?;
            if applied {
                tracing::info!(migration = name, "migration exists, skipping");
                report.push(Stage::Migration, name, StepOutcome::Skipped);
                continue;
            }

            tracing::info!(migration = name, "executing migration");
            self.confirm_step(migration)?;

            let result = run_script(&mut self.runner, script_text(migration)?).and_then(|_| {
                self.ledger
                    .record_applied(&mut self.runner, name, (self.clock)())
            });

            match result {
                Ok(()) => report.push(Stage::Migration, name, StepOutcome::Applied),
                Err(source) => self.fail(&mut report, Stage::Migration, name, source)?,
            }
        }

        for object in plan.etl.ordered() {
            let name = object.id.as_str();

            tracing::info!(object = name, "refreshing ETL object");
            self.confirm_step(object)?;

            match run_script(&mut self.runner, script_text(object)?) {
                Ok(_) => report.push(Stage::Etl, name, StepOutcome::Refreshed),
                Err(source) => self.fail(&mut report, Stage::Etl, name, source)?,
            }
        }

        Ok(report)
    }

    fn confirm_step(&mut self, script: &Artifact) -> Result<(), ExecutorError> {
        if !self.options.interactive {
            return Ok(());
        }

        if self.confirm.confirm(&script.id, script_text(script)?)? {
            Ok(())
        } else {
            tracing::error!(script = %script.id, "aborted by operator");
            Err(ExecutorError::Aborted {
                name: script.id.clone(),
            })
        }
    }

    fn fail(
        &self,
        report: &mut RunReport,
        stage: Stage,
        name: &str,
        source: RunnerError,
    ) -> Result<(), ExecutorError> {
        tracing::error!(%stage, script = name, error = %source, "script failed");
        report.push(stage, name, StepOutcome::Failed(source.to_string()));

        match self.options.failure_policy {
            FailurePolicy::Continue => Ok(()),
            FailurePolicy::Halt => Err(ExecutorError::ScriptFailed {
                name: name.to_string(),
                source,
                report: std::mem::take(report),
            }),
        }
    }
}

fn script_text(script: &Artifact) -> Result<&str, ExecutorError> {
    script
        .content
        .as_text()
        .ok_or_else(|| ExecutorError::NotAScript(script.id.clone()))
}
