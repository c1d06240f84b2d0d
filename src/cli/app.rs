//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::output::{Output, OutputFormat};
use super::{sql_cmd, syn_cmd};
use crate::storage::Config;

#[derive(Parser)]
#[command(name = "cloudforge")]
#[command(author, version, about = "Dependency-aware deployments for Synapse workspaces and SQL pools")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global config, then text)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project config file (defaults to cloudforge.toml here or in a parent)
    #[arg(long, short = 'c', global = true, env = "CLOUDFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synapse workspace artifacts
    #[command(subcommand)]
    Syn(syn_cmd::SynCommands),

    /// SQL migrations and ETL objects
    #[command(subcommand)]
    Sql(sql_cmd::SqlCommands),
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    let format = cli
        .format
        .unwrap_or_else(|| config.global.default_format.into());
    let output = Output::new(format, cli.verbose);

    output.verbose("cloudforge starting");
    if let Some(path) = &config.config_path {
        output.verbose_ctx("config", &format!("Using {}", path.display()));
    }

    match cli.command {
        Commands::Syn(cmd) => syn_cmd::run(cmd, &config, &output)?,
        Commands::Sql(cmd) => sql_cmd::run(cmd, &config, &output)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}

/// Installs the stderr log subscriber
///
/// `RUST_LOG` wins when set; otherwise warnings only, or debug with `--verbose`.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    // A second install (e.g. in tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
