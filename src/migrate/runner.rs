//! Script execution against a SQL connection
//!
//! Scripts are split into batches on lines holding only `GO`. Each batch is
//! sent to the same connection in turn.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Batch, Connection};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),
}

/// A single cell returned by a batch
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns the value as an integer, if it is one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

pub type Row = Vec<SqlValue>;
pub type Rows = Vec<Row>;

/// An exclusive connection that runs one batch at a time
pub trait ScriptRunner {
    /// Executes a batch, returning rows when the batch produces any
    fn execute(&mut self, batch: &str) -> Result<Option<Rows>, RunnerError>;
}

/// Splits a script into batches on `GO` separator lines
///
/// The separator is matched case-insensitively on a line of its own.
/// Blank batches are dropped.
pub fn split_batches(script: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for line in script.lines() {
        if line.trim().eq_ignore_ascii_case("GO") {
            push_batch(&mut batches, &mut current);
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    push_batch(&mut batches, &mut current);

    batches
}

fn push_batch(batches: &mut Vec<String>, current: &mut String) {
    let batch = current.trim();
    if !batch.is_empty() {
        batches.push(batch.to_string());
    }
    current.clear();
}

/// Runs every batch of a script, keeping results of row-producing batches
pub fn run_script(runner: &mut dyn ScriptRunner, script: &str) -> Result<Vec<Rows>, RunnerError> {
    let mut results = Vec::new();
    for batch in split_batches(script) {
        if let Some(rows) = runner.execute(&batch)? {
            results.push(rows);
        }
    }
    Ok(results)
}

/// Runs scripts against a SQLite database
///
/// Used for local rehearsal of a deployment and in tests.
pub struct SqliteRunner {
    conn: Connection,
}

impl SqliteRunner {
    /// Opens (or creates) a database file
    pub fn open(path: &Path) -> Result<Self, RunnerError> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    /// Opens a private in-memory database
    pub fn in_memory() -> Result<Self, RunnerError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }
}

impl ScriptRunner for SqliteRunner {
    fn execute(&mut self, batch: &str) -> Result<Option<Rows>, RunnerError> {
        tracing::debug!(batch, "executing batch");

        let mut produced: Option<Rows> = None;
        let mut statements = Batch::new(&self.conn, batch);

        while let Some(mut stmt) = statements.next()? {
            let columns = stmt.column_count();
            if columns == 0 {
                stmt.execute([])?;
                continue;
            }

            let collected = produced.get_or_insert_with(Vec::new);
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(columns);
                for i in 0..columns {
                    values.push(match row.get_ref(i)? {
                        ValueRef::Null => SqlValue::Null,
                        ValueRef::Integer(v) => SqlValue::Integer(v),
                        ValueRef::Real(v) => SqlValue::Real(v),
                        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
                        ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
                    });
                }
                collected.push(values);
            }
        }

        Ok(produced)
    }
}
