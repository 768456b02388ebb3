//! Module registry, handle table and executable designation

use crate::error::KernelError;
use crate::module::{Module, ModuleHandle};
use crate::xex::XexHeader;
use guest_fs::FileSystem;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Kernel behavior switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Panic on host lifetime bugs (double release, handle collision)
    /// instead of logging them and leaving state untouched
    pub strict_lifetimes: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            strict_lifetimes: cfg!(debug_assertions),
        }
    }
}

const FIRST_HANDLE: u32 = 1;

struct ModuleTable {
    /// Keyed by lowercased name
    modules: HashMap<String, Arc<Module>>,
    handles: HashMap<ModuleHandle, Arc<Module>>,
    free_handles: BTreeSet<u32>,
    next_handle: u32,
    executable: Weak<Module>,
}

impl ModuleTable {
    fn new() -> Self {
        Self {
            modules: HashMap::new(),
            handles: HashMap::new(),
            free_handles: BTreeSet::new(),
            next_handle: FIRST_HANDLE,
            executable: Weak::new(),
        }
    }

    /// Lowest released handle first, then fresh ones
    fn allocate_handle(&mut self) -> Result<ModuleHandle, KernelError> {
        if let Some(raw) = self.free_handles.pop_first() {
            return Ok(ModuleHandle(raw));
        }
        let raw = self.next_handle;
        self.next_handle = raw.checked_add(1).ok_or(KernelError::HandlesExhausted)?;
        Ok(ModuleHandle(raw))
    }

    fn is_live(&self, module: &Arc<Module>) -> bool {
        self.handles
            .get(&module.handle())
            .is_some_and(|live| Arc::ptr_eq(live, module))
    }
}

/// Kernel-wide shared state for one emulator instance.
///
/// Every lookup that hands out an `Arc<Module>` also bumps the module's
/// reference count, and the caller must pass it back to
/// [`KernelState::release`]. The find, bump and return sequence runs under
/// one lock, so a module cannot be unloaded between a concurrent lookup and
/// its increment.
pub struct KernelState {
    config: KernelConfig,
    file_system: Arc<FileSystem>,
    table: Mutex<ModuleTable>,
}

impl KernelState {
    pub fn new(config: KernelConfig, file_system: Arc<FileSystem>) -> Self {
        Self {
            config,
            file_system,
            table: Mutex::new(ModuleTable::new()),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn file_system(&self) -> &Arc<FileSystem> {
        &self.file_system
    }

    fn lock_table(&self) -> MutexGuard<'_, ModuleTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifetime_violation(&self, err: KernelError) -> KernelError {
        if self.config.strict_lifetimes {
            panic!("kernel lifetime violation: {}", err);
        }
        log::error!("kernel lifetime violation: {}", err);
        err
    }

    /// Loads a module with one reference held by the caller
    pub fn register_module(
        &self,
        name: &str,
        header: XexHeader,
    ) -> Result<Arc<Module>, KernelError> {
        let key = name.to_ascii_lowercase();
        let mut table = self.lock_table();
        if table.modules.contains_key(&key) {
            return Err(KernelError::ModuleAlreadyLoaded(name.to_string()));
        }

        let handle = table.allocate_handle()?;
        if table.handles.contains_key(&handle) {
            return Err(self.lifetime_violation(KernelError::HandleCollision(handle)));
        }

        let module = Arc::new(Module::new(name.to_string(), handle, header));
        table.modules.insert(key, Arc::clone(&module));
        table.handles.insert(handle, Arc::clone(&module));
        log::debug!("loaded module {} as {}", name, handle);
        Ok(module)
    }

    /// Looks a module up by name (case-insensitive), adding a reference
    pub fn get_module(&self, name: &str) -> Result<Arc<Module>, KernelError> {
        let table = self.lock_table();
        let module = table
            .modules
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| KernelError::ModuleNotFound(name.to_string()))?;
        module.ref_count.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::clone(module))
    }

    /// Looks a module up by handle, adding a reference
    pub fn get_module_by_handle(&self, handle: ModuleHandle) -> Result<Arc<Module>, KernelError> {
        let table = self.lock_table();
        let module = table
            .handles
            .get(&handle)
            .ok_or(KernelError::HandleNotFound(handle))?;
        module.ref_count.fetch_add(1, Ordering::AcqRel);
        Ok(Arc::clone(module))
    }

    /// Drops one reference.
    ///
    /// The last release unloads the module: it leaves both tables, its
    /// handle becomes reusable and, if it was the executable, the
    /// executable designation is cleared.
    pub fn release(&self, module: &Arc<Module>) -> Result<(), KernelError> {
        let mut table = self.lock_table();
        let current = module.ref_count.load(Ordering::Acquire);
        if current == 0 {
            return Err(self.lifetime_violation(KernelError::DoubleRelease {
                name: module.name().to_string(),
                handle: module.handle(),
            }));
        }

        let remaining = current - 1;
        module.ref_count.store(remaining, Ordering::Release);
        if remaining > 0 {
            return Ok(());
        }

        if table.is_live(module) {
            table.modules.remove(&module.name().to_ascii_lowercase());
            table.handles.remove(&module.handle());
            table.free_handles.insert(module.handle().as_raw());
        }
        if table
            .executable
            .upgrade()
            .is_some_and(|executable| Arc::ptr_eq(&executable, module))
        {
            table.executable = Weak::new();
            log::debug!("executable module {} unloaded", module.name());
        }
        log::debug!("unloaded module {} ({})", module.name(), module.handle());
        Ok(())
    }

    /// Designates the entry-point executable without taking a reference
    pub fn set_executable_module(&self, module: &Arc<Module>) -> Result<(), KernelError> {
        let mut table = self.lock_table();
        if !table.is_live(module) {
            return Err(KernelError::ModuleNotFound(module.name().to_string()));
        }
        table.executable = Arc::downgrade(module);
        log::info!("executable module is {} ({})", module.name(), module.handle());
        Ok(())
    }

    /// The executable module, if one is designated and still loaded.
    ///
    /// Does not add a reference; the result must not be passed to
    /// [`KernelState::release`].
    pub fn get_executable_module(&self) -> Option<Arc<Module>> {
        self.lock_table().executable.upgrade()
    }

    /// Reads privilege bit `bit` of the executable's system flags.
    ///
    /// No executable means no privilege.
    pub fn check_executable_privilege(&self, bit: u32) -> bool {
        self.get_executable_module()
            .is_some_and(|module| module.header().has_privilege(bit))
    }

    /// Loaded modules as `(name, handle)`, ordered by handle
    pub fn loaded_modules(&self) -> Vec<(String, ModuleHandle)> {
        let table = self.lock_table();
        let mut modules: Vec<_> = table
            .handles
            .values()
            .map(|module| (module.name().to_string(), module.handle()))
            .collect();
        modules.sort_by_key(|(_, handle)| *handle);
        modules
    }

    pub fn module_count(&self) -> usize {
        self.lock_table().modules.len()
    }
}

impl std::fmt::Debug for KernelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelState")
            .field("config", &self.config)
            .field("modules", &self.loaded_modules())
            .finish()
    }
}
