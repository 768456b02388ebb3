//! Host-directory-backed device

use crate::device::{Device, Entry, EntryKind, EntryLocation};
use crate::error::FsError;
use crate::path::{join_components, split_components};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Serves a host directory tree as a guest device.
#[derive(Debug, Clone)]
pub struct LocalDirectoryDevice {
    root: PathBuf,
}

impl LocalDirectoryDevice {
    /// Creates a device rooted at `root`, which must be an existing directory
    pub fn new(root: impl AsRef<Path>) -> Result<Self, FsError> {
        let root = root.as_ref();
        let metadata = fs::metadata(root)
            .map_err(|err| FsError::Io(format!("{}: {}", root.display(), err)))?;
        if !metadata.is_dir() {
            return Err(FsError::Io(format!("{} is not a directory", root.display())));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Device for LocalDirectoryDevice {
    fn describe(&self) -> String {
        format!("local directory {}", self.root.display())
    }

    fn resolve_entry(&self, relative_path: &str) -> Result<Entry, FsError> {
        let components = split_components(relative_path)?;
        let mut host_path = self.root.clone();
        for component in &components {
            host_path.push(component);
        }

        let metadata = match fs::metadata(&host_path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(FsError::NotFound(relative_path.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let (kind, size) = if metadata.is_dir() {
            (EntryKind::Directory, 0)
        } else {
            (EntryKind::File, metadata.len())
        };

        Ok(Entry {
            path: join_components(&components),
            name: components.last().map(|c| c.to_string()).unwrap_or_default(),
            kind,
            size,
            location: EntryLocation::Host(host_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_file_and_directory() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("media")).unwrap();
        fs::write(dir.path().join("media").join("logo.png"), b"png!").unwrap();

        let device = LocalDirectoryDevice::new(dir.path()).unwrap();

        let file = device.resolve_entry("media\\logo.png").unwrap();
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.size, 4);
        assert_eq!(file.path, "media/logo.png");
        assert_eq!(file.name, "logo.png");

        let media = device.resolve_entry("media").unwrap();
        assert!(media.is_directory());
        assert_eq!(media.size, 0);
    }

    #[test]
    fn test_resolve_root() {
        let dir = tempdir().unwrap();
        let device = LocalDirectoryDevice::new(dir.path()).unwrap();

        let root = device.resolve_entry("").unwrap();
        assert!(root.is_directory());
        assert_eq!(root.name, "");
        assert_eq!(root.location, EntryLocation::Host(dir.path().to_path_buf()));
    }

    #[test]
    fn test_missing_entry() {
        let dir = tempdir().unwrap();
        let device = LocalDirectoryDevice::new(dir.path()).unwrap();

        assert_eq!(
            device.resolve_entry("nope.xex"),
            Err(FsError::NotFound("nope.xex".to_string()))
        );
    }

    #[test]
    fn test_parent_escape_rejected() {
        let dir = tempdir().unwrap();
        let device = LocalDirectoryDevice::new(dir.path()).unwrap();

        assert!(matches!(
            device.resolve_entry("../outside"),
            Err(FsError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_root_must_be_directory() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("file.bin");
        fs::write(&file_path, b"x").unwrap();

        assert!(matches!(
            LocalDirectoryDevice::new(&file_path),
            Err(FsError::Io(_))
        ));
        assert!(LocalDirectoryDevice::new(dir.path().join("missing")).is_err());
    }
}
