//! Loaded modules and their handles

use crate::xex::XexHeader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Guest-visible module handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleHandle(pub u32);

impl ModuleHandle {
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle {:#010x}", self.0)
    }
}

/// A loaded executable image.
///
/// Owned jointly by the kernel's tables and every caller holding a
/// reference from a lookup. The count is only changed by `KernelState`
/// while its table lock is held; it is atomic so it can be read without
/// that lock.
#[derive(Debug)]
pub struct Module {
    name: String,
    handle: ModuleHandle,
    header: XexHeader,
    pub(crate) ref_count: AtomicU32,
}

impl Module {
    pub(crate) fn new(name: String, handle: ModuleHandle, header: XexHeader) -> Self {
        Self {
            name,
            handle,
            header,
            ref_count: AtomicU32::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> ModuleHandle {
        self.handle
    }

    pub fn header(&self) -> &XexHeader {
        &self.header
    }

    pub fn system_flags(&self) -> u32 {
        self.header.system_flags
    }

    /// Outstanding references, including the loader's initial one
    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }
}
