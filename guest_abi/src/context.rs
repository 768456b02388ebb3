//! Guest execution context
//!
//! The CPU core that actually runs guest code lives elsewhere. The kernel only
//! needs a narrow view of it: general-purpose registers and guest memory. On
//! top of that view this module encodes the guest calling convention:
//!
//! - Argument slots 0..7 are r3..r10
//! - Argument slots 8.. live on the guest stack at `r1 + 0x54`, one big-endian
//!   doubleword per slot
//! - The return value goes to r3

use crate::memory::{BigEndianCodec, FlatMemory, GuestAddr, GuestMemory, MemoryError};
use serde::{Deserialize, Serialize};

/// First argument register (r3)
pub const ARG_REGISTER_BASE: usize = 3;
/// Number of arguments passed in registers (r3..r10)
pub const ARG_REGISTER_COUNT: usize = 8;
/// Register receiving the return value (r3)
pub const RETURN_REGISTER: usize = 3;
/// Stack pointer register (r1)
pub const STACK_POINTER_REGISTER: usize = 1;
/// Offset from the stack pointer to the first stack-passed argument
pub const STACK_ARG_OFFSET: u32 = 0x54;

/// Declared width of one shim argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgWidth {
    U8,
    U16,
    U32,
    U64,
    /// 32-bit guest address, zero meaning null
    Pointer,
}

impl ArgWidth {
    /// Number of meaningful bytes for this width
    pub const fn size(self) -> usize {
        match self {
            ArgWidth::U8 => 1,
            ArgWidth::U16 => 2,
            ArgWidth::U32 | ArgWidth::Pointer => 4,
            ArgWidth::U64 => 8,
        }
    }

    /// Truncates a raw 64-bit slot value to this width
    pub const fn narrow(self, raw: u64) -> u64 {
        match self {
            ArgWidth::U8 => raw as u8 as u64,
            ArgWidth::U16 => raw as u16 as u64,
            ArgWidth::U32 | ArgWidth::Pointer => raw as u32 as u64,
            ArgWidth::U64 => raw,
        }
    }
}

/// The slice of a guest thread's state visible to kernel shims.
pub trait GuestContext {
    /// Reads general-purpose register `index`
    fn gpr(&self, index: usize) -> u64;

    /// Writes general-purpose register `index`
    fn set_gpr(&mut self, index: usize, value: u64);

    fn memory(&self) -> &dyn GuestMemory;

    fn memory_mut(&mut self) -> &mut dyn GuestMemory;

    /// Reads argument `slot` and narrows it to `width`.
    ///
    /// Register slots never fail; stack slots fail if the stack is not
    /// backed by guest memory.
    fn arg(&self, slot: usize, width: ArgWidth) -> Result<u64, MemoryError> {
        let raw = if slot < ARG_REGISTER_COUNT {
            self.gpr(ARG_REGISTER_BASE + slot)
        } else {
            let sp = self.gpr(STACK_POINTER_REGISTER) as GuestAddr;
            let offset = STACK_ARG_OFFSET + ((slot - ARG_REGISTER_COUNT) as u32) * 8;
            self.memory().load_u64(sp.wrapping_add(offset))?
        };
        Ok(width.narrow(raw))
    }

    /// Places `value` in the return slot
    fn set_return(&mut self, value: u64) {
        self.set_gpr(RETURN_REGISTER, value);
    }

    /// Current contents of the return slot
    fn return_value(&self) -> u64 {
        self.gpr(RETURN_REGISTER)
    }
}

/// In-process guest context: 32 GPRs over a [`FlatMemory`].
///
/// Used by tests and by host tools that call shims without a CPU core.
#[derive(Debug, Clone)]
pub struct SimGuestContext {
    gprs: [u64; 32],
    memory: FlatMemory,
}

impl SimGuestContext {
    pub fn new(memory: FlatMemory) -> Self {
        Self {
            gprs: [0; 32],
            memory,
        }
    }

    /// Creates a context with `size` bytes of memory at `base` and the stack
    /// pointer parked near the top
    pub fn with_memory(base: GuestAddr, size: usize) -> Self {
        let mut ctx = Self::new(FlatMemory::new(base, size));
        let stack_top = base as u64 + size as u64 - 0x100;
        ctx.set_gpr(STACK_POINTER_REGISTER, stack_top);
        ctx
    }

    /// Loads call arguments into slots, spilling past r10 onto the stack
    pub fn set_args(&mut self, args: &[u64]) -> Result<(), MemoryError> {
        for (slot, value) in args.iter().enumerate() {
            if slot < ARG_REGISTER_COUNT {
                self.set_gpr(ARG_REGISTER_BASE + slot, *value);
            } else {
                let sp = self.gpr(STACK_POINTER_REGISTER) as GuestAddr;
                let offset = STACK_ARG_OFFSET + ((slot - ARG_REGISTER_COUNT) as u32) * 8;
                self.memory.store_u64(sp.wrapping_add(offset), *value)?;
            }
        }
        Ok(())
    }

    pub fn flat_memory(&self) -> &FlatMemory {
        &self.memory
    }

    pub fn flat_memory_mut(&mut self) -> &mut FlatMemory {
        &mut self.memory
    }
}

impl GuestContext for SimGuestContext {
    fn gpr(&self, index: usize) -> u64 {
        self.gprs[index]
    }

    fn set_gpr(&mut self, index: usize, value: u64) {
        self.gprs[index] = value;
    }

    fn memory(&self) -> &dyn GuestMemory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut dyn GuestMemory {
        &mut self.memory
    }
}
