//! Export identifiers
//!
//! A guest executable imports kernel functionality by module name plus either
//! an ordinal or a symbol name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one export within a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExportKey {
    /// Import by ordinal number
    Ordinal(u16),
    /// Import by symbol name
    Name(String),
}

impl ExportKey {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }
}

impl fmt::Display for ExportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportKey::Ordinal(ordinal) => write!(f, "@{:#06X}", ordinal),
            ExportKey::Name(name) => f.write_str(name),
        }
    }
}

impl From<u16> for ExportKey {
    fn from(ordinal: u16) -> Self {
        Self::Ordinal(ordinal)
    }
}

impl From<&str> for ExportKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// What an export resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExportKind {
    /// A callable kernel function implemented on the host
    Function,
    /// A kernel variable living at a fixed guest address
    Variable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(ExportKey::Ordinal(0x194).to_string(), "@0x0194");
        assert_eq!(ExportKey::name("XexGetModuleHandle").to_string(), "XexGetModuleHandle");
    }

    #[test]
    fn test_ordinal_and_name_are_distinct_keys() {
        assert_ne!(ExportKey::from(16u16), ExportKey::from("16"));
    }
}
