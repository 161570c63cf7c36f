//! Error types for the schema store.

use std::fmt;
use std::path::PathBuf;

use rusqlite::types::Value;

use crate::ident::InvalidIdentifier;

/// A statement together with the parameters it was bound with.
///
/// The store keeps the most recent one for diagnostics and embeds it in
/// every statement-level error.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    /// The statement text as supplied by the caller.
    pub sql: String,
    /// Positional parameters, in binding order.
    pub params: Vec<Value>,
}

impl Operation {
    pub(crate) fn new(sql: &str, params: Vec<Value>) -> Self {
        Self {
            sql: sql.to_string(),
            params,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sql=\"{}\", params=(", self.sql.trim())?;
        for (i, value) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match value {
                Value::Null => f.write_str("NULL")?,
                Value::Integer(n) => write!(f, "{n}")?,
                Value::Real(r) => write!(f, "{r}")?,
                Value::Text(s) => write!(f, "{s:?}")?,
                Value::Blob(b) => write!(f, "<blob {} bytes>", b.len())?,
            }
        }
        f.write_str(")")
    }
}

/// Errors raised by [`SchemaStore`](crate::SchemaStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database file could not be opened or configured.
    #[error("failed to open database {}: {source}", path.display())]
    Open {
        /// Path of the database file.
        path: PathBuf,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// SQLite rejected or failed to run a statement.
    #[error("{context} ({source}) ({operation})")]
    Statement {
        /// What the store was trying to do.
        context: &'static str,
        /// The statement and parameters that failed.
        operation: Operation,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// An insert affected a number of rows other than exactly one.
    #[error("{context} (rowcount {affected} != 1) ({operation})")]
    RowCount {
        /// What the store was trying to do.
        context: &'static str,
        /// The statement and parameters that ran.
        operation: Operation,
        /// Rows actually affected.
        affected: usize,
    },

    /// The statement text holds no SQL, only whitespace or comments.
    #[error("{context} (statement contains no SQL) ({operation})")]
    EmptyStatement {
        /// What the store was trying to do.
        context: &'static str,
        /// The statement and parameters that were supplied.
        operation: Operation,
    },

    /// The table is not part of the schema registry.
    #[error("table `{table}` is not in the schema registry")]
    UnknownTable {
        /// The rejected table name.
        table: String,
    },

    /// The column does not exist on a registry table.
    #[error("table `{table}` has no column `{column}`")]
    UnknownColumn {
        /// The table that was searched.
        table: String,
        /// The rejected column name.
        column: String,
    },

    /// A table or column name is not a plain SQL identifier.
    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),
}

impl StoreError {
    /// Returns the statement involved in the failure, if there was one.
    pub fn operation(&self) -> Option<&Operation> {
        match self {
            StoreError::Statement { operation, .. }
            | StoreError::RowCount { operation, .. }
            | StoreError::EmptyStatement { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// Returns the SQLite error code when the engine reported the failure.
    pub fn sqlite_error_code(&self) -> Option<rusqlite::ErrorCode> {
        match self {
            StoreError::Open { source, .. } | StoreError::Statement { source, .. } => {
                match source {
                    // Prepare-time failures (syntax, missing table or column)
                    // carry their code here rather than in `SqliteFailure`.
                    rusqlite::Error::SqlInputError { error, .. } => Some(error.code),
                    other => other.sqlite_error_code(),
                }
            }
            _ => None,
        }
    }
}
