//! Kernel state error types

use crate::module::ModuleHandle;
use thiserror::Error;

/// Errors from module and handle bookkeeping
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KernelError {
    /// A module with this name is already loaded
    #[error("Module already loaded: {0}")]
    ModuleAlreadyLoaded(String),

    /// No loaded module has this name
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// No loaded module owns this handle
    #[error("Handle not found: {0}")]
    HandleNotFound(ModuleHandle),

    /// Release of a module whose reference count is already zero
    #[error("Double release of module {name} ({handle})")]
    DoubleRelease { name: String, handle: ModuleHandle },

    /// Handle allocator produced a handle that is still live
    #[error("Handle collision: {0}")]
    HandleCollision(ModuleHandle),

    /// Handle space exhausted
    #[error("No module handles left")]
    HandlesExhausted,
}
