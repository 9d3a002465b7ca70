use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Number, Value};
use std::path::{Path, PathBuf};

use crate::evaluation::executor::{CancelFlag, ExecutionError, QueryExecutor};
use crate::scoring::ResultSet;

/// Runs queries against a SQLite database file, read-only.
///
/// Every call opens its own connection and closes it before returning, so a
/// cancelled or failed query never leaves a connection behind. Cancellation
/// interrupts the running statement through SQLite's interrupt handle.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    path: PathBuf,
}

impl SqliteExecutor {
    /// Executor for the database at `path`; fails if it cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let executor = Self {
            path: path.as_ref().to_path_buf(),
        };
        executor.connect()?;
        Ok(executor)
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, ExecutionError> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| ExecutionError::Connection(format!("{}: {err}", self.path.display())))
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => Value::from(int),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::String(blob.iter().map(|byte| format!("{byte:02x}")).collect()),
    }
}

fn query_error(err: rusqlite::Error, cancel: &CancelFlag) -> ExecutionError {
    if cancel.is_cancelled() {
        ExecutionError::Cancelled
    } else {
        ExecutionError::Query(err.to_string())
    }
}

impl QueryExecutor for SqliteExecutor {
    fn execute(&self, query: &str, cancel: &CancelFlag) -> Result<ResultSet, ExecutionError> {
        let connection = self.connect()?;
        let interrupt = connection.get_interrupt_handle();
        cancel.on_cancel(move || interrupt.interrupt());

        let mut statement = connection
            .prepare(query)
            .map_err(|err| query_error(err, cancel))?;
        let width = statement.column_count();
        let mut rows = statement.query([]).map_err(|err| query_error(err, cancel))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().map_err(|err| query_error(err, cancel))? {
            let mut tuple = Vec::with_capacity(width);
            for index in 0..width {
                let value = row.get_ref(index).map_err(|err| query_error(err, cancel))?;
                tuple.push(json_value(value));
            }
            results.push(Value::Array(tuple));
        }
        Ok(results)
    }
}
