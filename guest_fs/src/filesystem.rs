//! Mount table, symbolic links and path resolution

use crate::device::{Device, Entry};
use crate::disc::DiscImageDevice;
use crate::error::FsError;
use crate::local::LocalDirectoryDevice;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Longest symlink chain `resolve_path` follows
pub const MAX_SYMLINK_HOPS: usize = 32;

#[derive(Debug, Clone)]
struct MountPoint {
    prefix: String,
    device: Arc<dyn Device>,
}

#[derive(Debug, Default)]
struct FsTables {
    devices: Vec<MountPoint>,
    symlinks: HashMap<String, String>,
}

/// Snapshot of one mount, for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub prefix: String,
    pub description: String,
}

/// Guest virtual filesystem.
///
/// Devices are mounted under path prefixes and a path resolves through the
/// device with the longest matching prefix, so a disc mounted at `/game/`
/// shadows a root device at `/` for everything below it. Prefixes compare
/// as plain strings: `/game` also matches `/gamedata/x`, so mount prefixes
/// normally end in a separator.
///
/// Registering a device under a prefix that is already mounted replaces the
/// old device, and creating a symlink over an existing source replaces its
/// target. Resolutions already in progress keep the device they picked.
///
/// Resolution takes a shared lock; mount and symlink edits take it
/// exclusively.
#[derive(Debug, Default)]
pub struct FileSystem {
    tables: RwLock<FsTables>,
}

impl FileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, FsTables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, FsTables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mounts `device` under `mount_prefix`, replacing any device already
    /// mounted at exactly that prefix
    pub fn register_device(
        &self,
        mount_prefix: &str,
        device: Arc<dyn Device>,
    ) -> Result<(), FsError> {
        if mount_prefix.is_empty() {
            return Err(FsError::InvalidPath("empty mount prefix".to_string()));
        }

        let description = device.describe();
        let mut tables = self.write_tables();
        match tables
            .devices
            .iter_mut()
            .find(|mount| mount.prefix == mount_prefix)
        {
            Some(mount) => {
                log::debug!(
                    "replacing device at {} ({} -> {})",
                    mount_prefix,
                    mount.device.describe(),
                    description
                );
                mount.device = device;
            }
            None => {
                log::debug!("mounted {} at {}", description, mount_prefix);
                tables.devices.push(MountPoint {
                    prefix: mount_prefix.to_string(),
                    device,
                });
            }
        }
        Ok(())
    }

    /// Mounts a host directory
    pub fn register_local_directory_device(
        &self,
        mount_prefix: &str,
        host_directory: impl AsRef<Path>,
    ) -> Result<(), FsError> {
        let device = LocalDirectoryDevice::new(host_directory)?;
        self.register_device(mount_prefix, Arc::new(device))
    }

    /// Mounts a GDFX disc image
    pub fn register_disc_image_device(
        &self,
        mount_prefix: &str,
        host_image_path: impl AsRef<Path>,
    ) -> Result<(), FsError> {
        let device = DiscImageDevice::open(host_image_path)?;
        self.register_device(mount_prefix, Arc::new(device))
    }

    /// Removes the device mounted at exactly `mount_prefix`
    pub fn unregister_device(&self, mount_prefix: &str) -> Result<(), FsError> {
        let mut tables = self.write_tables();
        let before = tables.devices.len();
        tables.devices.retain(|mount| mount.prefix != mount_prefix);
        if tables.devices.len() == before {
            return Err(FsError::NoDevice(mount_prefix.to_string()));
        }
        log::debug!("unmounted {}", mount_prefix);
        Ok(())
    }

    /// Current mounts in registration order
    pub fn mounts(&self) -> Vec<MountInfo> {
        self.read_tables()
            .devices
            .iter()
            .map(|mount| MountInfo {
                prefix: mount.prefix.clone(),
                description: mount.device.describe(),
            })
            .collect()
    }

    /// Maps `source` to `target`; an existing link from `source` is replaced
    pub fn create_symbolic_link(&self, source: &str, target: &str) -> Result<(), FsError> {
        if source.is_empty() {
            return Err(FsError::InvalidPath("empty symlink source".to_string()));
        }
        let previous = self
            .write_tables()
            .symlinks
            .insert(source.to_string(), target.to_string());
        match previous {
            Some(old) => log::debug!("symlink {} -> {} (was {})", source, target, old),
            None => log::debug!("symlink {} -> {}", source, target),
        }
        Ok(())
    }

    pub fn delete_symbolic_link(&self, source: &str) -> Result<(), FsError> {
        match self.write_tables().symlinks.remove(source) {
            Some(_) => Ok(()),
            None => Err(FsError::SymlinkNotFound(source.to_string())),
        }
    }

    pub fn symlink_target(&self, source: &str) -> Option<String> {
        self.read_tables().symlinks.get(source).cloned()
    }

    /// Resolves a guest path to an entry.
    ///
    /// Symlinks are followed while the whole path matches a link source,
    /// for at most [`MAX_SYMLINK_HOPS`] links. A chain that revisits a
    /// source fails with [`FsError::SymlinkCycle`]; a longer acyclic chain
    /// fails with [`FsError::SymlinkChainTooLong`]. The device with the
    /// longest prefix of the result then resolves the remainder.
    ///
    /// [`FsError::NoDevice`] means nothing is mounted for the path;
    /// [`FsError::NotFound`] means the device has no such entry.
    pub fn resolve_path(&self, path: &str) -> Result<Entry, FsError> {
        let (device, relative) = {
            let tables = self.read_tables();
            let path = follow_symlinks(&tables.symlinks, path)?;

            let mount = tables
                .devices
                .iter()
                .filter(|mount| path.starts_with(mount.prefix.as_str()))
                .max_by_key(|mount| mount.prefix.len())
                .ok_or_else(|| FsError::NoDevice(path.clone()))?;

            let relative = path[mount.prefix.len()..].to_string();
            (Arc::clone(&mount.device), relative)
        };

        log::trace!("resolving '{}' on {}", relative, device.describe());
        device.resolve_entry(&relative)
    }
}

fn follow_symlinks(symlinks: &HashMap<String, String>, path: &str) -> Result<String, FsError> {
    let mut current = path.to_string();
    let mut visited = HashSet::new();
    while let Some(target) = symlinks.get(&current) {
        if !visited.insert(current.clone()) {
            return Err(FsError::SymlinkCycle(path.to_string()));
        }
        if visited.len() > MAX_SYMLINK_HOPS {
            return Err(FsError::SymlinkChainTooLong(path.to_string()));
        }
        current = target.clone();
    }
    Ok(current)
}
