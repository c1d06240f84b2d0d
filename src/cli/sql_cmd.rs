//! SQL deployment CLI commands

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use super::output::Output;
use crate::migrate::{
    ControlTableLedger, ExecutorError, ExecutorOptions, FailurePolicy, MigrationExecutor, MigrationPlan,
    RunReport, SqliteRunner, StdinConfirm,
};
use crate::storage::{Config, ScriptSource};

#[derive(Subcommand)]
pub enum SqlCommands {
    /// Show the order scripts would run in
    Plan {
        /// Directory holding the scripts
        #[arg(long, short = 't', default_value = ".")]
        target_dir: PathBuf,
    },

    /// Run the initial setup, pending migrations and ETL objects
    Deploy {
        /// Directory holding the scripts
        #[arg(long, short = 't', default_value = ".")]
        target_dir: PathBuf,

        /// SQLite database file to deploy to
        #[arg(long, short = 'd')]
        database: PathBuf,

        /// Confirm each script before it runs
        #[arg(long, short = 'i')]
        interactive: bool,

        /// Stop at the first failing script
        #[arg(long)]
        halt_on_failure: bool,
    },
}

pub fn run(cmd: SqlCommands, config: &Config, output: &Output) -> Result<()> {
    match cmd {
        SqlCommands::Plan { target_dir } => show_plan(output, config, &target_dir),
        SqlCommands::Deploy {
            target_dir,
            database,
            interactive,
            halt_on_failure,
        } => {
            let options = ExecutorOptions {
                interactive: interactive || config.project.sql.interactive,
                failure_policy: if halt_on_failure {
                    FailurePolicy::Halt
                } else {
                    config.project.sql.failure_policy
                },
            };
            deploy(output, config, &target_dir, &database, options)
        }
    }
}

fn load_plan(output: &Output, config: &Config, target_dir: &Path) -> Result<MigrationPlan> {
    if !target_dir.is_dir() {
        anyhow::bail!("Target directory not found: {}", target_dir.display());
    }

    let scripts = ScriptSource::new(target_dir)
        .with_initial_setup(&config.project.sql.initial_setup)
        .load()
        .with_context(|| format!("Failed to read scripts: {}", target_dir.display()))?;

    output.verbose_ctx(
        "plan",
        &format!(
            "initial setup: {}, {} migration(s), {} ETL object(s)",
            scripts.initial_setup.is_some(),
            scripts.migrations.len(),
            scripts.etl.len()
        ),
    );

    MigrationPlan::resolve(scripts, &config.project.synapse.ignore_rules())
        .context("Failed to resolve script dependencies")
}

fn show_plan(output: &Output, config: &Config, target_dir: &Path) -> Result<()> {
    let plan = load_plan(output, config, target_dir)?;

    let setup: Vec<&str> = plan.initial_setup.iter().map(|s| s.id.as_str()).collect();
    let migrations = plan.migrations.execution_order();
    let etl = plan.etl.execution_order();

    if output.is_json() {
        output.data(&serde_json::json!({
            "initial_setup": setup.first(),
            "migrations": migrations,
            "etl": etl,
        }));
        return Ok(());
    }

    println!("{:<4} {:<12} SCRIPT", "#", "STAGE");
    println!("{}", "-".repeat(60));

    let stages = setup
        .iter()
        .map(|name| ("setup", *name))
        .chain(migrations.iter().map(|name| ("migration", name.as_str())))
        .chain(etl.iter().map(|name| ("etl", name.as_str())));

    let mut count = 0;
    for (position, (stage, name)) in stages.enumerate() {
        println!("{:<4} {:<12} {}", position + 1, stage, name);
        count += 1;
    }

    output.blank();
    println!("{} script(s)", count);
    Ok(())
}

fn deploy(
    output: &Output,
    config: &Config,
    target_dir: &Path,
    database: &Path,
    options: ExecutorOptions,
) -> Result<()> {
    if options.interactive && !std::io::stdin().is_terminal() {
        anyhow::bail!("Interactive mode requires a terminal");
    }

    // Resolve everything before touching the database
    let plan = load_plan(output, config, target_dir)?;

    let runner = SqliteRunner::open(database)
        .with_context(|| format!("Failed to open database: {}", database.display()))?;
    let ledger = ControlTableLedger::new(&config.project.sql.control_table);
    output.verbose_ctx(
        "deploy",
        &format!("ledger table {}, policy {:?}", ledger.table(), options.failure_policy),
    );

    let mut executor = MigrationExecutor::new(runner, ledger, options).with_confirm(StdinConfirm);
    let report = match executor.run(&plan) {
        Ok(report) => report,
        Err(err) => {
            if let ExecutorError::ScriptFailed { report, .. } = &err {
                print_report(output, report);
            }
            return Err(anyhow::Error::new(err).context("Deployment stopped"));
        }
    };
    print_report(output, &report);

    let failures = report.failures();
    if !failures.is_empty() {
        let names: Vec<&str> = failures.iter().map(|s| s.name.as_str()).collect();
        anyhow::bail!("{} script(s) failed: {}", failures.len(), names.join(", "));
    }

    if !output.is_json() {
        output.success(&format!("Deployed {} step(s) to {}", report.steps.len(), database.display()));
    }
    Ok(())
}

fn print_report(output: &Output, report: &RunReport) {
    if output.is_json() {
        output.data(report);
        return;
    }

    for step in &report.steps {
        output.row(&[
            step.stage.to_string().as_str(),
            step.name.as_str(),
            step.outcome.to_string().as_str(),
        ]);
    }
}
