//! # Guest ABI
//!
//! This crate defines the shape of the boundary between guest code and the
//! host-side kernel.
//!
//! ## Philosophy
//!
//! The guest is a big-endian PowerPC program. The host is whatever the
//! emulator runs on. Nothing crossing the boundary may depend on host byte
//! order:
//! - Every guest memory access goes through the big-endian codec
//! - Arguments are read by slot with an explicit declared width
//! - Outcomes are reported as status codes, never as host faults
//!
//! ## Contents
//!
//! - [`XStatus`]: guest-visible status codes
//! - [`ExportKey`] / [`ExportKind`]: how a guest import names a kernel export
//! - [`GuestMemory`] and [`BigEndianCodec`]: flat guest address space access
//! - [`GuestContext`]: register file view with argument and return slots
//! - [`SimGuestContext`]: an in-process context for tests and host tools

pub mod context;
pub mod export;
pub mod memory;
pub mod status;

pub use context::{
    ArgWidth, GuestContext, SimGuestContext, ARG_REGISTER_BASE, ARG_REGISTER_COUNT,
    RETURN_REGISTER, STACK_ARG_OFFSET, STACK_POINTER_REGISTER,
};
pub use export::{ExportKey, ExportKind};
pub use memory::{BigEndianCodec, FlatMemory, GuestAddr, GuestMemory, MemoryError};
pub use status::XStatus;
