//! # SQL Migration Execution
//!
//! Applies SQL scripts to a database in a safe order.
//!
//! ## Stages
//!
//! | Stage | Source | Order | Ledger |
//! |-------|--------|-------|--------|
//! | Initial setup | `dbo_initial_setup.sql` | first, fatal on failure | no |
//! | Migrations | `migrations/*.sql` | name order, then `DependsOn` | yes |
//! | ETL objects | `etl/*.sql` | `DependsOn` | no, refreshed on every run |
//!
//! Scripts are split into batches on `GO` lines and every batch goes through
//! one exclusive [`ScriptRunner`].

mod executor;
mod ledger;
mod runner;

pub use executor::{
    Confirm, ExecutorError, ExecutorOptions, FailurePolicy, MigrationExecutor, MigrationPlan,
    RunReport, ScriptSet, Stage, StdinConfirm, StepOutcome, StepReport,
};
pub use ledger::{ControlTableLedger, Ledger, MemoryLedger, APPLIED_FORMAT, DEFAULT_CONTROL_TABLE};
pub use runner::{run_script, split_batches, Row, Rows, RunnerError, ScriptRunner, SqlValue, SqliteRunner};
