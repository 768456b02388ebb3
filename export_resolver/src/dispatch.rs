//! Generic shim dispatch
//!
//! One loop serves every export: look the entry up, decode its declared
//! argument widths from the guest context, run the shim, and store the result
//! in the return slot.

use crate::resolver::{ExportBinding, ExportResolver};
use guest_abi::{
    ArgWidth, BigEndianCodec, ExportKey, GuestAddr, GuestContext, GuestMemory, MemoryError,
    XStatus,
};

/// Result of dispatching one guest import call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The shim ran and returned this value
    Completed(u64),
    /// No callable export is bound to the key; NOT_IMPLEMENTED was returned
    NotImplemented,
    /// Decoding a stack argument faulted; ACCESS_VIOLATION was returned
    Fault(MemoryError),
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DispatchOutcome::Completed(_))
    }
}

/// One in-flight shim invocation: decoded arguments plus the guest context.
pub struct ShimCall<'a> {
    module_name: &'a str,
    key: &'a ExportKey,
    args: &'a [u64],
    context: &'a mut dyn GuestContext,
}

impl<'a> ShimCall<'a> {
    pub fn new(
        module_name: &'a str,
        key: &'a ExportKey,
        args: &'a [u64],
        context: &'a mut dyn GuestContext,
    ) -> Self {
        Self {
            module_name,
            key,
            args,
            context,
        }
    }

    pub fn module_name(&self) -> &str {
        self.module_name
    }

    pub fn key(&self) -> &ExportKey {
        self.key
    }

    /// Decoded argument `index`, already narrowed to its declared width
    pub fn arg(&self, index: usize) -> u64 {
        debug_assert!(
            index < self.args.len(),
            "{}!{} reads undeclared argument {}",
            self.module_name,
            self.key,
            index
        );
        self.args.get(index).copied().unwrap_or(0)
    }

    pub fn arg_u16(&self, index: usize) -> u16 {
        self.arg(index) as u16
    }

    pub fn arg_u32(&self, index: usize) -> u32 {
        self.arg(index) as u32
    }

    pub fn arg_ptr(&self, index: usize) -> GuestAddr {
        self.arg(index) as GuestAddr
    }

    /// Pointer argument, `None` when the guest passed null
    pub fn optional_ptr(&self, index: usize) -> Option<GuestAddr> {
        match self.arg_ptr(index) {
            0 => None,
            addr => Some(addr),
        }
    }

    pub fn memory(&self) -> &dyn GuestMemory {
        self.context.memory()
    }

    pub fn memory_mut(&mut self) -> &mut dyn GuestMemory {
        self.context.memory_mut()
    }

    /// Stores a big-endian u16 at a guest pointer
    pub fn store_u16(&mut self, addr: GuestAddr, value: u16) -> Result<(), MemoryError> {
        self.memory_mut().store_u16(addr, value)
    }

    /// Stores a big-endian u32 at a guest pointer
    pub fn store_u32(&mut self, addr: GuestAddr, value: u32) -> Result<(), MemoryError> {
        self.memory_mut().store_u32(addr, value)
    }
}

fn decode_args(
    signature: &[ArgWidth],
    context: &dyn GuestContext,
) -> Result<Vec<u64>, MemoryError> {
    signature
        .iter()
        .enumerate()
        .map(|(slot, width)| context.arg(slot, *width))
        .collect()
}

impl ExportResolver {
    /// Dispatches a guest call to `module_name!key`.
    ///
    /// Unknown keys are not fatal: the guest gets NOT_IMPLEMENTED and
    /// execution continues. No shared state is touched in that case.
    pub fn dispatch(
        &self,
        module_name: &str,
        key: &ExportKey,
        context: &mut dyn GuestContext,
    ) -> DispatchOutcome {
        let entry = match self.lookup(module_name, key) {
            Some(entry) => entry,
            None => {
                log::warn!("unimplemented export {}!{}", module_name, key);
                context.set_return(XStatus::NOT_IMPLEMENTED.as_return_value());
                return DispatchOutcome::NotImplemented;
            }
        };

        let (signature, shim) = match &entry.binding {
            ExportBinding::Function { signature, shim } => (*signature, shim),
            ExportBinding::Variable { address } => {
                log::warn!(
                    "guest called variable export {}!{} at {:#010x}",
                    module_name,
                    key,
                    address
                );
                context.set_return(XStatus::NOT_IMPLEMENTED.as_return_value());
                return DispatchOutcome::NotImplemented;
            }
        };

        let args = match decode_args(signature, context) {
            Ok(args) => args,
            Err(err) => {
                log::error!("{}!{} argument decode failed: {}", module_name, key, err);
                context.set_return(XStatus::ACCESS_VIOLATION.as_return_value());
                return DispatchOutcome::Fault(err);
            }
        };

        let result = {
            let mut call = ShimCall::new(&entry.module_name, &entry.key, &args, context);
            (**shim)(&mut call)
        };
        context.set_return(result);
        DispatchOutcome::Completed(result)
    }
}
