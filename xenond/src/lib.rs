//! # Xenon Host Daemon
//!
//! Host runtime for the kernel HLE layer.
//!
//! ## Responsibilities
//!
//! The host runtime:
//! - Loads configuration from a JSON file and command-line flags
//! - Mounts devices and creates symbolic links in one virtual filesystem
//! - Builds the kernel state and binds the xboxkrnl exports against it
//! - Registers the executable module and its privilege flags
//! - Answers queries by calling the bound exports through a simulated
//!   guest context, exactly as a title would
//!
//! ## Non-Responsibilities
//!
//! The host does NOT:
//! - Execute guest code
//! - Parse executable images
//! - Read file contents on behalf of the guest

pub mod commands;
pub mod config;
pub mod logger;
pub mod runtime;

pub use commands::{HostCommand, HostCommandError, HostCommandParser};
pub use config::{
    ConfigError, ExecutableConfig, HostRuntimeConfig, MountConfig, MountKind, SymlinkConfig,
};
pub use runtime::{CommandOutput, HostRuntime, HostRuntimeError};
