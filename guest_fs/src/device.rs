//! Device contract and resolved entries

use crate::error::FsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Type of a resolved filesystem node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// Where an entry's bytes live on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryLocation {
    /// A file or directory in the host filesystem
    Host(PathBuf),
    /// A byte range inside a disc image
    Disc { offset: u64 },
}

/// A resolved filesystem node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Device-relative path, `/`-separated, empty for the device root
    pub path: String,
    /// Final path component, empty for the device root
    pub name: String,
    pub kind: EntryKind,
    /// Size in bytes (zero for directories)
    pub size: u64,
    pub location: EntryLocation,
}

impl Entry {
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// A filesystem backend mounted under a path prefix.
///
/// Devices receive the path with the mount prefix already stripped. They
/// own their attribute model; the core only needs an [`Entry`] or
/// [`FsError::NotFound`].
pub trait Device: fmt::Debug + Send + Sync {
    /// Short human-readable description of the backend
    fn describe(&self) -> String;

    /// Resolves a device-relative path
    fn resolve_entry(&self, relative_path: &str) -> Result<Entry, FsError>;
}
