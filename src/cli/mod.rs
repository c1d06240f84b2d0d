//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Synapse | Workspace artifacts | `syn arm`, `syn plan`, `syn override` |
//! | SQL | Migrations and ETL objects | `sql plan`, `sql deploy` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! The default can be changed with `default_format` in the global config.
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output. It also raises the log level
//! to `debug` unless `RUST_LOG` is set:
//! ```bash
//! cloudforge --verbose sql plan --target-dir ./db
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod output;
mod sql_cmd;
mod syn_cmd;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
