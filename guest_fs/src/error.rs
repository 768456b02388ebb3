//! Filesystem error types

use thiserror::Error;

/// Errors that can occur during path resolution and device setup
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FsError {
    /// Path is empty or contains an illegal component
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No mounted device's prefix matches the path
    #[error("No device mounted for path: {0}")]
    NoDevice(String),

    /// A device is mounted but has no entry at the path
    #[error("Not found: {0}")]
    NotFound(String),

    /// Symbolic link chain revisits a source
    #[error("Symbolic link cycle at: {0}")]
    SymlinkCycle(String),

    /// Acyclic symbolic link chain longer than the resolver follows
    #[error("Symbolic link chain too long at: {0}")]
    SymlinkChainTooLong(String),

    /// No symbolic link with that source
    #[error("No symbolic link: {0}")]
    SymlinkNotFound(String),

    /// Host I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Disc image is not a readable GDFX volume
    #[error("Invalid disc image: {0}")]
    InvalidImage(String),
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        FsError::Io(err.to_string())
    }
}
