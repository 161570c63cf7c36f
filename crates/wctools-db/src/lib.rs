//! Schema-registry backed SQLite store for wctools.
//!
//! Provides [`SchemaStore`], a thin wrapper over a single-file SQLite
//! database that owns a fixed set of table definitions and offers
//! parameterized execute, insert, select and existence-check helpers.
//!
//! # Design decisions
//!
//! - **Connection per call**: every operation opens its own connection,
//!   runs inside its own transaction and closes before returning. No
//!   connection state outlives a call.
//! - **Fixed registry**: the known tables are declared once (see
//!   [`SchemaRegistry::default`]) and checked on construction. Missing
//!   tables are created; existing ones are left alone.
//! - **Destructive init by default**: [`StoreOptions::wipe_on_init`] drops
//!   every user table before the registry is applied. Turn it off to keep
//!   data across restarts.
//! - **Structured errors**: every [`StoreError`] carries the offending
//!   statement and its bound parameters.

mod connection;
mod error;
mod ident;
mod registry;
mod store;

pub use connection::{open_connection, StoreOptions};
pub use error::{Operation, StoreError};
pub use ident::{Ident, InvalidIdentifier};
pub use registry::{RegistryError, SchemaRegistry, TableSchema};
pub use store::{Execution, Row, SchemaStore};

pub use rusqlite::types::Value;

#[cfg(test)]
mod tests;
