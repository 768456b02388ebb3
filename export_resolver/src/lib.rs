//! # Export Resolver
//!
//! This crate binds guest kernel imports to host-implemented shims.
//!
//! ## Model
//!
//! - An export is named by module (`"xboxkrnl.exe"`) plus an [`ExportKey`]
//! - A function export carries a declared argument signature and a shim
//! - Dispatch decodes the signature from the guest context, runs the shim,
//!   and writes the shim's result into the return slot
//!
//! Argument widths are data, not code: one generic dispatch loop serves every
//! shim.
//!
//! ## Registration semantics
//!
//! Registering the same `(module, key)` twice replaces the earlier entry.
//! This is how one export table gets rebound to a different kernel instance.
//! A replaced entry may still be running on another guest thread; it keeps
//! its own reference and finishes normally.
//!
//! [`ExportKey`]: guest_abi::ExportKey

pub mod dispatch;
pub mod resolver;

pub use dispatch::{DispatchOutcome, ShimCall};
pub use resolver::{ExportBinding, ExportEntry, ExportResolver, ShimFn};
