//! Export registry

use crate::dispatch::ShimCall;
use guest_abi::{ArgWidth, ExportKey, ExportKind, GuestAddr};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Host implementation of a kernel function.
///
/// The shim receives decoded arguments plus access to guest memory and
/// returns the value for the guest return register. Anything else the shim
/// needs (kernel state, filesystem) is captured when it is registered.
pub type ShimFn = Arc<dyn Fn(&mut ShimCall<'_>) -> u64 + Send + Sync>;

/// What an export is bound to
#[derive(Clone)]
pub enum ExportBinding {
    Function {
        signature: &'static [ArgWidth],
        shim: ShimFn,
    },
    Variable {
        address: GuestAddr,
    },
}

impl fmt::Debug for ExportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportBinding::Function { signature, .. } => f
                .debug_struct("Function")
                .field("signature", signature)
                .finish_non_exhaustive(),
            ExportBinding::Variable { address } => f
                .debug_struct("Variable")
                .field("address", &format_args!("{:#010x}", address))
                .finish(),
        }
    }
}

/// A single registered export. Immutable once registered.
#[derive(Debug, Clone)]
pub struct ExportEntry {
    pub module_name: String,
    pub key: ExportKey,
    pub binding: ExportBinding,
}

impl ExportEntry {
    /// Creates a function export
    pub fn function<F>(
        module_name: impl Into<String>,
        key: impl Into<ExportKey>,
        signature: &'static [ArgWidth],
        shim: F,
    ) -> Self
    where
        F: Fn(&mut ShimCall<'_>) -> u64 + Send + Sync + 'static,
    {
        Self {
            module_name: module_name.into(),
            key: key.into(),
            binding: ExportBinding::Function {
                signature,
                shim: Arc::new(shim),
            },
        }
    }

    /// Creates a variable export living at `address`
    pub fn variable(
        module_name: impl Into<String>,
        key: impl Into<ExportKey>,
        address: GuestAddr,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            key: key.into(),
            binding: ExportBinding::Variable { address },
        }
    }

    pub fn kind(&self) -> ExportKind {
        match self.binding {
            ExportBinding::Function { .. } => ExportKind::Function,
            ExportBinding::Variable { .. } => ExportKind::Variable,
        }
    }
}

/// Exports by module name, then by key
type ExportTable = HashMap<String, HashMap<ExportKey, Arc<ExportEntry>>>;

/// Process-wide mapping from `(module, key)` to export entries.
///
/// Lookups take a shared lock; registration takes an exclusive lock. Entries
/// are handed out as `Arc`s so no lock is held while a shim runs.
#[derive(Default)]
pub struct ExportResolver {
    modules: RwLock<ExportTable>,
}

impl ExportResolver {
    /// Creates an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    fn read_table(&self) -> RwLockReadGuard<'_, ExportTable> {
        self.modules.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, ExportTable> {
        self.modules.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds a function export, replacing any previous binding for the key
    pub fn register_mapping<F>(
        &self,
        module_name: &str,
        key: impl Into<ExportKey>,
        signature: &'static [ArgWidth],
        shim: F,
    ) where
        F: Fn(&mut ShimCall<'_>) -> u64 + Send + Sync + 'static,
    {
        self.register_entry(ExportEntry::function(module_name, key, signature, shim));
    }

    /// Inserts one entry (last registration wins)
    ///
    /// Returns the entry that was replaced, if any.
    pub fn register_entry(&self, entry: ExportEntry) -> Option<Arc<ExportEntry>> {
        let mut table = self.write_table();
        Self::insert(&mut table, entry)
    }

    /// Inserts many entries under a single write lock
    pub fn register_exports<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = ExportEntry>,
    {
        let mut table = self.write_table();
        let mut count = 0;
        for entry in entries {
            Self::insert(&mut table, entry);
            count += 1;
        }
        count
    }

    fn insert(
        table: &mut ExportTable,
        entry: ExportEntry,
    ) -> Option<Arc<ExportEntry>> {
        let module = table.entry(entry.module_name.clone()).or_default();
        let key = entry.key.clone();
        let previous = module.insert(key, Arc::new(entry));
        if let Some(previous) = &previous {
            log::debug!(
                "export {}!{} rebound ({:?})",
                previous.module_name,
                previous.key,
                previous.kind()
            );
        }
        previous
    }

    /// Looks up an export
    pub fn lookup(&self, module_name: &str, key: &ExportKey) -> Option<Arc<ExportEntry>> {
        self.read_table()
            .get(module_name)
            .and_then(|exports| exports.get(key))
            .cloned()
    }

    /// Returns the guest address of a variable export
    pub fn variable_address(&self, module_name: &str, key: &ExportKey) -> Option<GuestAddr> {
        match self.lookup(module_name, key)?.binding {
            ExportBinding::Variable { address } => Some(address),
            ExportBinding::Function { .. } => None,
        }
    }

    pub fn is_registered(&self, module_name: &str, key: &ExportKey) -> bool {
        self.lookup(module_name, key).is_some()
    }

    /// Lists the keys registered for a module, sorted
    pub fn exports_for(&self, module_name: &str) -> Vec<ExportKey> {
        let mut keys: Vec<ExportKey> = self
            .read_table()
            .get(module_name)
            .map(|exports| exports.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Total number of registered exports across all modules
    pub fn len(&self) -> usize {
        self.read_table().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ExportResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportResolver")
            .field("exports", &self.len())
            .finish()
    }
}
