//! Migration ledger
//!
//! Records which migrations were applied so re-runs skip them. The ledger
//! talks to the database through the same connection as the run itself.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use super::runner::{RunnerError, ScriptRunner};

/// Default control table holding applied migrations
pub const DEFAULT_CONTROL_TABLE: &str = "MigrationControl";

/// Format of the `Applied` column
pub const APPLIED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Persistent record of applied migrations
pub trait Ledger {
    /// Returns true if the migration was applied before
    fn already_applied(
        &mut self,
        conn: &mut dyn ScriptRunner,
        name: &str,
    ) -> Result<bool, RunnerError>;

    /// Records a migration as applied at the given time
    fn record_applied(
        &mut self,
        conn: &mut dyn ScriptRunner,
        name: &str,
        at: NaiveDateTime,
    ) -> Result<(), RunnerError>;
}

/// Ledger backed by a control table with `ScriptName` and `Applied` columns
#[derive(Debug, Clone)]
pub struct ControlTableLedger {
    table: String,
}

impl ControlTableLedger {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    /// Returns the control table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Statement counting rows for a migration name
    pub fn exists_statement(&self, name: &str) -> String {
        format!(
            "SELECT COUNT(1) FROM {} WHERE ScriptName = '{}'",
            self.table,
            quote(name)
        )
    }

    /// Statement inserting a ledger row
    pub fn insert_statement(&self, name: &str, at: NaiveDateTime) -> String {
        format!(
            "INSERT INTO {} (ScriptName, Applied) VALUES ('{}', '{}')",
            self.table,
            quote(name),
            at.format(APPLIED_FORMAT)
        )
    }
}

impl Default for ControlTableLedger {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROL_TABLE)
    }
}

fn quote(value: &str) -> String {
    value.replace('\'', "''")
}

impl Ledger for ControlTableLedger {
    fn already_applied(
        &mut self,
        conn: &mut dyn ScriptRunner,
        name: &str,
    ) -> Result<bool, RunnerError> {
        let rows = conn
            .execute(&self.exists_statement(name))?
            .ok_or_else(|| RunnerError::UnexpectedResult(format!("no rows counting {}", name)))?;

        let count = rows
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_i64())
            .ok_or_else(|| RunnerError::UnexpectedResult(format!("non-numeric count for {}", name)))?;

        Ok(count > 0)
    }

    fn record_applied(
        &mut self,
        conn: &mut dyn ScriptRunner,
        name: &str,
        at: NaiveDateTime,
    ) -> Result<(), RunnerError> {
        if self.already_applied(conn, name)? {
            tracing::warn!(migration = name, "migration already recorded");
            return Ok(());
        }

        conn.execute(&self.insert_statement(name, at))?;
        Ok(())
    }
}

/// In-memory ledger for dry runs
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    applied: BTreeMap<String, NaiveDateTime>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger that already holds the given names
    pub fn with_applied<'a>(names: impl IntoIterator<Item = &'a str>, at: NaiveDateTime) -> Self {
        Self {
            applied: names.into_iter().map(|n| (n.to_string(), at)).collect(),
        }
    }

    /// Returns when a migration was applied
    pub fn applied_at(&self, name: &str) -> Option<NaiveDateTime> {
        self.applied.get(name).copied()
    }

    /// Returns applied names in lexical order
    pub fn names(&self) -> Vec<&str> {
        self.applied.keys().map(String::as_str).collect()
    }
}

impl Ledger for MemoryLedger {
    fn already_applied(
        &mut self,
        _conn: &mut dyn ScriptRunner,
        name: &str,
    ) -> Result<bool, RunnerError> {
        Ok(self.applied.contains_key(name))
    }

    fn record_applied(
        &mut self,
        _conn: &mut dyn ScriptRunner,
        name: &str,
        at: NaiveDateTime,
    ) -> Result<(), RunnerError> {
        self.applied.entry(name.to_string()).or_insert(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::SqliteRunner;
    use chrono::NaiveDate;

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 5, 23)
            .unwrap()
            .and_hms_milli_opt(13, 41, 26, 0)
            .unwrap()
    }

    fn runner_with_table() -> SqliteRunner {
        let mut runner = SqliteRunner::in_memory().unwrap();
        runner
            .execute("CREATE TABLE MigrationControl (ScriptName TEXT NOT NULL, Applied TEXT NOT NULL)")
            .unwrap();
        runner
    }

    #[test]
    fn statements_match_control_table_layout() {
        let ledger = ControlTableLedger::default();

        assert_eq!(
            ledger.exists_statement("test_migration"),
            "SELECT COUNT(1) FROM MigrationControl WHERE ScriptName = 'test_migration'"
        );
        assert_eq!(
            ledger.insert_statement("test_migration", fixed_time()),
            "INSERT INTO MigrationControl (ScriptName, Applied) VALUES ('test_migration', '2023-05-23 13:41:26.000')"
        );
    }

    #[test]
    fn names_are_quoted() {
        let ledger = ControlTableLedger::new("[dbo].[MigrationControl]");
        assert_eq!(
            ledger.exists_statement("o'brien"),
            "SELECT COUNT(1) FROM [dbo].[MigrationControl] WHERE ScriptName = 'o''brien'"
        );
    }

    #[test]
    fn control_table_round_trip() {
        let mut runner = runner_with_table();
        let mut ledger = ControlTableLedger::default();

        assert!(!ledger.already_applied(&mut runner, "001_init").unwrap());
        ledger.record_applied(&mut runner, "001_init", fixed_time()).unwrap();
        assert!(ledger.already_applied(&mut runner, "001_init").unwrap());

        // Recording twice keeps one row
        ledger.record_applied(&mut runner, "001_init", fixed_time()).unwrap();
        let rows = runner
            .execute("SELECT COUNT(1) FROM MigrationControl")
            .unwrap()
            .unwrap();
        assert_eq!(rows[0][0].as_i64(), Some(1));
    }

    #[test]
    fn missing_control_table_is_an_error() {
        let mut runner = SqliteRunner::in_memory().unwrap();
        let mut ledger = ControlTableLedger::default();
        assert!(ledger.already_applied(&mut runner, "x").is_err());
    }

    #[test]
    fn memory_ledger() {
        let mut runner = SqliteRunner::in_memory().unwrap();
        let mut ledger = MemoryLedger::with_applied(["a"], fixed_time());

        assert!(ledger.already_applied(&mut runner, "a").unwrap());
        assert!(!ledger.already_applied(&mut runner, "b").unwrap());

        ledger.record_applied(&mut runner, "b", fixed_time()).unwrap();
        assert_eq!(ledger.names(), vec!["a", "b"]);
        assert_eq!(ledger.applied_at("b"), Some(fixed_time()));
    }
}
