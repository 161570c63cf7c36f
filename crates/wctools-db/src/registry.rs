//! The schema registry: the fixed set of tables a store owns.
//!
//! A registry is built once, either from the embedded defaults or from
//! configuration, and is immutable afterwards. On store construction each
//! registry table that is missing from storage is created from its
//! definition; tables already present are skipped.

use std::collections::HashSet;

use thiserror::Error;

use crate::ident::{Ident, InvalidIdentifier};

/// A single named table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name as it appears in `sqlite_master`.
    pub name: Ident,
    /// The `CREATE TABLE` statement for this table.
    pub definition: String,
}

/// A built-in table definition.
struct BuiltinTable {
    name: &'static str,
    definition: &'static str,
}

/// Tables every default store owns, in creation order.
const DEFAULT_TABLES: &[BuiltinTable] = &[
    BuiltinTable {
        name: "users",
        definition: include_str!("schema/users.sql"),
    },
    BuiltinTable {
        name: "waiting_rooms",
        definition: include_str!("schema/waiting_rooms.sql"),
    },
];

/// Errors that can occur when building a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two entries share a table name.
    #[error("table `{0}` is declared more than once")]
    DuplicateTable(String),

    /// A table has a blank definition.
    #[error("table `{0}` has an empty definition")]
    EmptyDefinition(String),

    /// A table name is not a plain identifier.
    #[error("invalid table name: {0}")]
    InvalidIdentifier(#[from] InvalidIdentifier),

    /// A definition is not a `CREATE TABLE` statement.
    #[error("definition of `{0}` is not a CREATE TABLE statement")]
    NotCreateTable(String),

    /// A definition creates a table under a different name.
    #[error("table `{name}` is defined as `{defined}`")]
    NameMismatch {
        /// The registry name.
        name: String,
        /// The table the definition actually creates.
        defined: String,
    },
}

/// Ordered, immutable mapping from table name to creation statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    tables: Vec<TableSchema>,
}

impl SchemaRegistry {
    /// Builds a registry from `(name, definition)` pairs, preserving order.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if a name is not a valid identifier, a name
    /// appears twice, a definition is blank, or a definition does not
    /// create the table it is registered under (spelled exactly as
    /// registered, since that is the name stored in `sqlite_master`).
    pub fn new<I, N, D>(entries: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (N, D)>,
        N: AsRef<str>,
        D: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut tables = Vec::new();

        for (name, definition) in entries {
            let name = Ident::new(name.as_ref())?;
            let definition = definition.into();

            if definition.trim().is_empty() {
                return Err(RegistryError::EmptyDefinition(name.0));
            }
            match defined_table_name(&definition) {
                None => return Err(RegistryError::NotCreateTable(name.0)),
                Some(defined) if defined != name.as_str() => {
                    return Err(RegistryError::NameMismatch {
                        name: name.0,
                        defined,
                    })
                }
                Some(_) => {}
            }
            if !seen.insert(name.clone()) {
                return Err(RegistryError::DuplicateTable(name.0));
            }

            tables.push(TableSchema { name, definition });
        }

        Ok(Self { tables })
    }

    /// All table definitions in creation order.
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// Looks up a table definition by name.
    pub fn get(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.as_str() == name)
    }

    /// Returns true if `name` is a registry table.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of tables in the registry.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if the registry declares no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Iterates over the table names in creation order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }
}

/// Extracts the table name from `CREATE [TEMP] TABLE [IF NOT EXISTS] name`.
fn defined_table_name(definition: &str) -> Option<String> {
    let mut rest = strip_keyword(definition.trim_start(), "CREATE")?;
    if let Some(r) = strip_keyword(rest, "TEMPORARY").or_else(|| strip_keyword(rest, "TEMP")) {
        rest = r;
    }
    rest = strip_keyword(rest, "TABLE")?;
    if let Some(r) = strip_keyword(rest, "IF")
        .and_then(|r| strip_keyword(r, "NOT"))
        .and_then(|r| strip_keyword(r, "EXISTS"))
    {
        rest = r;
    }

    let end = rest
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(rest.len());
    let name = rest[..end].trim_matches(|c| matches!(c, '"' | '`' | '[' | ']'));
    (!name.is_empty()).then(|| name.to_string())
}

/// Strips a leading case-insensitive keyword and the whitespace after it.
fn strip_keyword<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let head = s.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let tail = &s[keyword.len()..];
    if tail.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some(tail.trim_start())
}

impl Default for SchemaRegistry {
    /// The built-in `users` and `waiting_rooms` tables.
    fn default() -> Self {
        Self {
            tables: DEFAULT_TABLES
                .iter()
                .map(|t| TableSchema {
                    name: Ident(t.name.to_string()),
                    definition: t.definition.to_string(),
                })
                .collect(),
        }
    }
}
