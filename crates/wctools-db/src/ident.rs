//! Validated SQL identifiers.
//!
//! Table and column names are spliced into statement text, so they are
//! restricted to plain identifiers and always emitted double-quoted.

use std::fmt;
use std::str::FromStr;

/// A name that failed identifier validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid SQL identifier `{0}`")]
pub struct InvalidIdentifier(pub String);

/// A plain SQL identifier: an ASCII letter or `_`, then ASCII letters,
/// digits or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(pub(crate) String);

impl Ident {
    /// Validates `name` as an identifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` if `name` is empty or contains anything
    /// other than ASCII alphanumerics and `_`, or starts with a digit.
    pub fn new(name: &str) -> Result<Self, InvalidIdentifier> {
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            Ok(Self(name.to_string()))
        } else {
            Err(InvalidIdentifier(name.to_string()))
        }
    }

    /// The bare identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier wrapped in double quotes, ready for statement text.
    pub fn quoted(&self) -> String {
        quote(&self.0)
    }
}

/// Double-quotes a name read back from storage, doubling embedded quotes.
pub(crate) fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl FromStr for Ident {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
