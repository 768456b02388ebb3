//! # Guest Filesystem
//!
//! This crate resolves guest paths to filesystem entries.
//!
//! ## Design
//!
//! - Devices are mounted under path prefixes (`/`, `/game/`, `\Device\Cdrom0\`)
//! - A path is served by the device with the longest matching prefix
//! - Symbolic links rewrite whole paths before prefix matching; chains are
//!   followed and cycles are reported rather than looped on
//! - Devices are trait objects; backends only implement entry resolution
//!
//! Two backends ship here: [`LocalDirectoryDevice`] (a host directory) and
//! [`DiscImageDevice`] (a GDFX game disc image).
//!
//! ## Failure reasons
//!
//! Resolution distinguishes "no device is mounted here"
//! ([`FsError::NoDevice`]) from "the device has no such entry"
//! ([`FsError::NotFound`]).

pub mod device;
pub mod disc;
pub mod error;
pub mod filesystem;
pub mod local;
pub mod path;

pub use device::{Device, Entry, EntryKind, EntryLocation};
pub use disc::DiscImageDevice;
pub use error::FsError;
pub use filesystem::{FileSystem, MountInfo, MAX_SYMLINK_HOPS};
pub use local::LocalDirectoryDevice;
