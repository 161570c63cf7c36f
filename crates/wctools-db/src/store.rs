//! The schema store itself.
//!
//! Every public operation opens a fresh connection, runs inside its own
//! transaction and commits before returning. The last attempted statement
//! is kept for diagnostics and is embedded in every statement error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rusqlite::{Connection, Transaction};

use crate::connection::{open_connection, StoreOptions};
use crate::error::{Operation, StoreError};
use crate::ident::{quote, Ident};
use crate::registry::SchemaRegistry;

/// One result row, columns in statement order.
pub type Row = Vec<Value>;

/// Result of running a single statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    /// Rows changed by the statement. Zero for pure reads and DDL.
    pub affected: usize,
    /// Rows returned by the statement, if it returns any.
    pub rows: Vec<Row>,
}

const LIST_TABLES_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
     ORDER BY name";

const LIST_COLUMNS_SQL: &str = "SELECT name FROM pragma_table_info(?1) ORDER BY cid";

/// A single-file SQLite store that owns the tables of a [`SchemaRegistry`].
#[derive(Debug)]
pub struct SchemaStore {
    path: PathBuf,
    registry: SchemaRegistry,
    options: StoreOptions,
    last_operation: Mutex<Option<Operation>>,
}

impl SchemaStore {
    /// Opens the store at `path` and applies `registry`.
    ///
    /// When `options.wipe_on_init` is set every existing user table is
    /// dropped first, including tables the registry does not know about.
    /// Registry tables missing from storage are then created.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file cannot be opened, the wipe fails or
    /// a registry definition is rejected by SQLite.
    pub fn open(
        path: impl AsRef<Path>,
        registry: SchemaRegistry,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            registry,
            options,
            last_operation: Mutex::new(None),
        };

        let created = store.init_tables(options.wipe_on_init)?;
        tracing::info!(
            path = %store.path.display(),
            wiped = options.wipe_on_init,
            created = created.len(),
            "schema store ready"
        );

        Ok(store)
    }

    /// Opens the store at `path` with the built-in registry and default
    /// options (wipe on init).
    ///
    /// # Errors
    ///
    /// See [`SchemaStore::open`].
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(path, SchemaRegistry::default(), StoreOptions::default())
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The registry this store was built with.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The most recently attempted statement and its parameters.
    pub fn last_operation(&self) -> Option<Operation> {
        self.last_operation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Runs one statement with positional parameters and commits.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Statement` if SQLite rejects the statement, and
    /// `StoreError::Open` if no connection can be made.
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Execution, StoreError> {
        self.run("Execute query failed.", sql, params, false)
            .map(|(_, execution)| execution)
    }

    /// Runs an insert that must affect exactly one row.
    ///
    /// Any other affected-row count rolls the statement back.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Statement` on SQLite failure (e.g. a primary key
    /// conflict) and `StoreError::RowCount` when zero or several rows were
    /// affected.
    pub fn insert_row(&self, sql: &str, params: &[&dyn ToSql]) -> Result<(), StoreError> {
        self.run("Execute insert query failed.", sql, params, true)?;
        Ok(())
    }

    /// Runs a parameterless table-creation statement.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Statement` on SQLite failure, including when
    /// the table already exists.
    pub fn create_table(&self, sql: &str) -> Result<(), StoreError> {
        self.run("Execute create table query failed.", sql, &[], false)?;
        Ok(())
    }

    /// Runs a read statement and returns every result row.
    ///
    /// Rows come back in whatever order the statement produces.
    ///
    /// # Errors
    ///
    /// Returns the original `StoreError::Statement` on SQLite failure.
    pub fn select(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        self.run("Select query failed.", sql, params, false)
            .map(|(_, execution)| execution.rows)
    }

    /// Names of the user tables currently in storage, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if `sqlite_master` cannot be read.
    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.run("List tables failed.", LIST_TABLES_SQL, &[], false)?.1.rows;
        Ok(text_column(rows))
    }

    /// Column names of `table` as stored, in declaration order.
    ///
    /// Returns an empty list when the table does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the table info cannot be read.
    pub fn column_names(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let rows = self
            .run("List columns failed.", LIST_COLUMNS_SQL, &[&table], false)?
            .1
            .rows;
        Ok(text_column(rows))
    }

    /// Drops every user table in storage and returns how many were dropped.
    ///
    /// All drops run in one transaction with foreign key enforcement off,
    /// so either every table goes or none does.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Statement` naming the drop that failed.
    pub fn drop_all_tables(&self) -> Result<usize, StoreError> {
        const CONTEXT: &str = "Drop all tables failed.";

        let names = self.table_names()?;
        if names.is_empty() {
            return Ok(0);
        }

        let mut conn = open_connection(&self.path, &self.options)?;
        let statements: Vec<Operation> = names
            .iter()
            .map(|name| Operation::new(&format!("DROP TABLE IF EXISTS {}", quote(name)), Vec::new()))
            .collect();

        let mut current = None;
        let result = drop_tables(&mut conn, &statements, |op| {
            self.record(op.clone());
            current = Some(op.clone());
        });

        result.map_err(|source| StoreError::Statement {
            context: CONTEXT,
            operation: current.unwrap_or_else(|| Operation::new("PRAGMA foreign_keys = OFF", Vec::new())),
            source,
        })?;

        tracing::info!(tables = ?names, "dropped all tables");
        Ok(names.len())
    }

    /// Returns true if `table` has at least one row whose `column` equals
    /// `value`.
    ///
    /// `table` must be a registry table and `column` one of its stored
    /// columns; both are validated before being placed in the statement.
    /// `value` is always bound as a parameter.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidIdentifier`, `StoreError::UnknownTable`
    /// or `StoreError::UnknownColumn` for rejected names, and
    /// `StoreError::Statement` on SQLite failure, including "no such table"
    /// when a registry table is missing from storage.
    pub fn item_exists(
        &self,
        table: &str,
        column: &str,
        value: &dyn ToSql,
    ) -> Result<bool, StoreError> {
        let table_ident = Ident::new(table)?;
        let column_ident = Ident::new(column)?;

        if !self.registry.contains(table) {
            return Err(StoreError::UnknownTable {
                table: table.to_string(),
            });
        }
        // A registry table missing from storage has no columns; let the
        // select below report it.
        let columns = self.column_names(table)?;
        if !columns.is_empty() && !columns.iter().any(|c| c == column) {
            return Err(StoreError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
            table_ident.quoted(),
            column_ident.quoted()
        );
        Ok(!self.select(&sql, &[value])?.is_empty())
    }

    /// Ensures every registry table exists, optionally wiping storage first.
    ///
    /// Returns the names of the tables that were created. Tables already
    /// present are left untouched, so repeated calls without `wipe` are
    /// no-ops.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the wipe, the table listing or any creation
    /// statement fails.
    pub fn init_tables(&self, wipe: bool) -> Result<Vec<String>, StoreError> {
        if wipe {
            let dropped = self.drop_all_tables()?;
            tracing::warn!(
                path = %self.path.display(),
                dropped,
                "wiped existing tables before init"
            );
        }

        let existing: HashSet<String> = self.table_names()?.into_iter().collect();
        let mut created = Vec::new();

        for table in self.registry.tables() {
            if existing.contains(table.name.as_str()) {
                tracing::debug!(table = %table.name, "table already exists, skipping");
                continue;
            }

            tracing::info!(table = %table.name, "creating table");
            self.create_table(&table.definition)?;
            created.push(table.name.to_string());
        }

        Ok(created)
    }

    fn record(&self, operation: Operation) {
        *self
            .last_operation
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(operation);
    }

    /// Records the operation, then runs it on a fresh connection.
    ///
    /// With `single_row` set, the transaction only commits when exactly one
    /// row was affected.
    fn run(
        &self,
        context: &'static str,
        sql: &str,
        params: &[&dyn ToSql],
        single_row: bool,
    ) -> Result<(Operation, Execution), StoreError> {
        let values: Result<Vec<Value>, rusqlite::Error> =
            params.iter().map(|p| to_value(*p)).collect();
        let values = values.map_err(|source| StoreError::Statement {
            context,
            operation: Operation::new(sql, Vec::new()),
            source,
        })?;

        let operation = Operation::new(sql, values);
        self.record(operation.clone());

        let mut conn = open_connection(&self.path, &self.options)?;
        let (tx, execution) = match execute_uncommitted(&mut conn, &operation) {
            Ok(Some(stepped)) => stepped,
            Ok(None) => return Err(StoreError::EmptyStatement { context, operation }),
            Err(source) => {
                return Err(StoreError::Statement {
                    context,
                    operation,
                    source,
                })
            }
        };

        if single_row && execution.affected != 1 {
            // Dropping the transaction rolls the statement back.
            drop(tx);
            return Err(StoreError::RowCount {
                context,
                operation,
                affected: execution.affected,
            });
        }

        if let Err(source) = tx.commit() {
            return Err(StoreError::Statement {
                context,
                operation,
                source,
            });
        }

        tracing::debug!(
            sql = operation.sql.trim(),
            params = operation.params.len(),
            affected = execution.affected,
            rows = execution.rows.len(),
            "executed statement"
        );
        Ok((operation, execution))
    }
}

/// Snapshots a bound parameter as an owned value.
fn to_value(param: &dyn ToSql) -> rusqlite::Result<Value> {
    Ok(match param.to_sql()? {
        ToSqlOutput::Borrowed(value) => value.into(),
        ToSqlOutput::Owned(value) => value,
        _ => Value::Null,
    })
}

/// Runs the statement inside a transaction and hands the transaction back
/// uncommitted. Returns `None` when the text prepares to no statement.
fn execute_uncommitted<'c>(
    conn: &'c mut Connection,
    operation: &Operation,
) -> rusqlite::Result<Option<(Transaction<'c>, Execution)>> {
    let tx = conn.transaction()?;

    let execution = {
        let mut stmt = tx.prepare(&operation.sql)?;
        // Empty or comment-only input prepares to a null statement, which
        // has no expanded text.
        if stmt.expanded_sql().is_none() {
            return Ok(None);
        }
        let params = rusqlite::params_from_iter(operation.params.iter());
        let width = stmt.column_count();

        if width == 0 {
            let affected = stmt.execute(params)?;
            Execution {
                affected,
                rows: Vec::new(),
            }
        } else {
            let readonly = stmt.readonly();
            let mut collected = Vec::new();
            let mut rows = stmt.query(params)?;
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    values.push(row.get::<_, Value>(idx)?);
                }
                collected.push(values);
            }

            // INSERT ... RETURNING and friends report rows and changes.
            let affected = if readonly { 0 } else { tx.changes() as usize };
            Execution {
                affected,
                rows: collected,
            }
        }
    };

    Ok(Some((tx, execution)))
}

fn drop_tables(
    conn: &mut Connection,
    statements: &[Operation],
    mut on_statement: impl FnMut(&Operation),
) -> rusqlite::Result<()> {
    // Must be set outside a transaction to take effect.
    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;

    let tx = conn.transaction()?;
    for op in statements {
        on_statement(op);
        tx.execute(&op.sql, [])?;
    }
    tx.commit()
}

fn text_column(rows: Vec<Row>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|row| match row.into_iter().next() {
            Some(Value::Text(name)) => Some(name),
            _ => None,
        })
        .collect()
}
