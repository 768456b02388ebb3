//! # Kernel State
//!
//! Shared kernel bookkeeping for one emulator instance: loaded modules,
//! their handles, the designated executable module and the virtual
//! filesystem the kernel functions resolve paths through.
//!
//! ## Reference model
//!
//! - Loading a module hands the loader its first reference
//! - Every successful lookup (by name or handle) adds a reference
//! - [`KernelState::release`] drops one; the last release unloads the
//!   module and recycles its handle
//! - The executable designation is weak: it never keeps a module loaded
//!   and is cleared when that module unloads
//!
//! Releasing a module that has no references left is a host bug. With
//! [`KernelConfig::strict_lifetimes`] it panics; otherwise it is logged and
//! reported as [`KernelError::DoubleRelease`].

pub mod error;
pub mod module;
pub mod state;
pub mod xex;

pub use error::KernelError;
pub use module::{Module, ModuleHandle};
pub use state::{KernelConfig, KernelState};
pub use xex::XexHeader;
