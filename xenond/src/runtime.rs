//! # Host Runtime
//!
//! Builds one emulator instance: filesystem, kernel state and export
//! resolver, wired together the way a title sees them.

use crate::commands::HostCommand;
use crate::config::{ConfigError, HostRuntimeConfig, MountKind};
use export_resolver::{DispatchOutcome, ExportResolver};
use guest_abi::{
    BigEndianCodec, ExportKey, GuestAddr, GuestContext, GuestMemory, MemoryError,
    SimGuestContext, XStatus,
};
use guest_fs::{Entry, FileSystem, FsError, MountInfo};
use kernel_state::{KernelError, KernelState, Module, ModuleHandle, XexHeader};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Scratch guest memory for host-issued calls
const SCRATCH_BASE: GuestAddr = 0x7000_0000;
const SCRATCH_SIZE: usize = 0x1000;
const XCONFIG_BUFFER: GuestAddr = SCRATCH_BASE;
const XCONFIG_BUFFER_SIZE: u16 = 0x20;
const REQUIRED_SIZE_OUT: GuestAddr = SCRATCH_BASE + 0x40;
const HANDLE_OUT: GuestAddr = SCRATCH_BASE + 0x44;
const MODULE_NAME_IN: GuestAddr = SCRATCH_BASE + 0x100;
const MAX_MODULE_NAME: usize = 0x100;

/// Host runtime error types
#[derive(Debug, Error)]
pub enum HostRuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Guest memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Export not implemented: {0}")]
    NotImplemented(String),
}

/// Result of a [`HostCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Entry(Entry),
    XConfig {
        status: XStatus,
        required_size: u16,
        value: Vec<u8>,
    },
    Privilege {
        bit: u32,
        granted: bool,
    },
    ModuleHandle {
        name: String,
        handle: Option<ModuleHandle>,
    },
    Mounts(Vec<MountInfo>),
    Exports(Vec<ExportKey>),
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutput::Entry(entry) => write!(
                f,
                "{:?} '{}' ({} bytes) at {:?}",
                entry.kind, entry.path, entry.size, entry.location
            ),
            CommandOutput::XConfig {
                status,
                required_size,
                value,
            } => {
                write!(f, "{} required_size={}", status, required_size)?;
                if !value.is_empty() {
                    write!(f, " value=")?;
                    for byte in value {
                        write!(f, "{:02X}", byte)?;
                    }
                }
                Ok(())
            }
            CommandOutput::Privilege { bit, granted } => {
                write!(f, "privilege {}: {}", bit, if *granted { "granted" } else { "denied" })
            }
            CommandOutput::ModuleHandle { name, handle } => match handle {
                Some(handle) => write!(f, "{}: {}", name, handle),
                None => write!(f, "{}: not loaded", name),
            },
            CommandOutput::Mounts(mounts) => {
                for (i, mount) in mounts.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{} -> {}", mount.prefix, mount.description)?;
                }
                Ok(())
            }
            CommandOutput::Exports(keys) => {
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}!{}", xboxkrnl::MODULE_NAME, key)?;
                }
                Ok(())
            }
        }
    }
}

/// Host runtime
pub struct HostRuntime {
    file_system: Arc<FileSystem>,
    kernel: Arc<KernelState>,
    resolver: ExportResolver,
    /// Loader's reference to the executable, dropped on shutdown
    executable: Option<Arc<Module>>,
}

impl HostRuntime {
    /// Creates a runtime from a validated configuration
    pub fn new(config: HostRuntimeConfig) -> Result<Self, HostRuntimeError> {
        config.validate()?;

        let file_system = Arc::new(FileSystem::new());
        for mount in &config.mounts {
            match mount.kind {
                MountKind::LocalDirectory => {
                    file_system.register_local_directory_device(&mount.prefix, &mount.host_path)?
                }
                MountKind::DiscImage => {
                    file_system.register_disc_image_device(&mount.prefix, &mount.host_path)?
                }
            }
            log::info!("mounted {} at {}", mount.host_path.display(), mount.prefix);
        }
        for symlink in &config.symlinks {
            file_system.create_symbolic_link(&symlink.source, &symlink.target)?;
        }

        let kernel = Arc::new(KernelState::new(
            config.kernel_config(),
            Arc::clone(&file_system),
        ));
        let resolver = ExportResolver::new();
        xboxkrnl::register_module_exports(&resolver, Arc::clone(&kernel));

        let executable = match &config.executable {
            Some(executable) => {
                let header = XexHeader::with_system_flags(executable.system_flags);
                let module = kernel.register_module(&executable.name, header)?;
                kernel.set_executable_module(&module)?;
                Some(module)
            }
            None => None,
        };

        log::info!(
            "runtime ready: {} mounts, {} symlinks, {} exports",
            config.mounts.len(),
            config.symlinks.len(),
            resolver.len()
        );
        Ok(Self {
            file_system,
            kernel,
            resolver,
            executable,
        })
    }

    pub fn file_system(&self) -> &Arc<FileSystem> {
        &self.file_system
    }

    pub fn kernel(&self) -> &Arc<KernelState> {
        &self.kernel
    }

    pub fn resolver(&self) -> &ExportResolver {
        &self.resolver
    }

    pub fn executable_module(&self) -> Option<&Arc<Module>> {
        self.executable.as_ref()
    }

    /// Runs one query
    pub fn execute(&self, command: &HostCommand) -> Result<CommandOutput, HostRuntimeError> {
        match command {
            HostCommand::Resolve { path } => {
                Ok(CommandOutput::Entry(self.file_system.resolve_path(path)?))
            }
            HostCommand::XConfig { category, setting } => self.query_xconfig(*category, *setting),
            HostCommand::Privilege { bit } => {
                let mut ctx = SimGuestContext::with_memory(SCRATCH_BASE, SCRATCH_SIZE);
                let granted = self.call(&mut ctx, "XexCheckExecutablePrivilege", &[*bit as u64])?;
                Ok(CommandOutput::Privilege {
                    bit: *bit,
                    granted: granted != 0,
                })
            }
            HostCommand::ModuleHandle { name } => self.query_module_handle(name),
            HostCommand::Mounts => Ok(CommandOutput::Mounts(self.file_system.mounts())),
            HostCommand::Exports => Ok(CommandOutput::Exports(
                self.resolver.exports_for(xboxkrnl::MODULE_NAME),
            )),
        }
    }

    /// Calls an xboxkrnl export by name in a scratch guest context
    fn call(
        &self,
        ctx: &mut SimGuestContext,
        export: &str,
        args: &[u64],
    ) -> Result<u64, HostRuntimeError> {
        ctx.set_args(args)?;
        let key = ExportKey::name(export);
        match self.resolver.dispatch(xboxkrnl::MODULE_NAME, &key, ctx) {
            DispatchOutcome::Completed(value) => Ok(value),
            DispatchOutcome::NotImplemented => Err(HostRuntimeError::NotImplemented(format!(
                "{}!{}",
                xboxkrnl::MODULE_NAME,
                export
            ))),
            DispatchOutcome::Fault(err) => Err(err.into()),
        }
    }

    fn query_xconfig(
        &self,
        category: u16,
        setting: u16,
    ) -> Result<CommandOutput, HostRuntimeError> {
        let mut ctx = SimGuestContext::with_memory(SCRATCH_BASE, SCRATCH_SIZE);
        let result = self.call(
            &mut ctx,
            "ExGetXConfigSetting",
            &[
                category as u64,
                setting as u64,
                XCONFIG_BUFFER as u64,
                XCONFIG_BUFFER_SIZE as u64,
                REQUIRED_SIZE_OUT as u64,
            ],
        )?;

        let status = XStatus(result as u32);
        let required_size = ctx.memory().load_u16(REQUIRED_SIZE_OUT)?;
        let mut value = Vec::new();
        if status.is_success() {
            value.resize(required_size as usize, 0);
            ctx.memory().read(XCONFIG_BUFFER, &mut value)?;
        }
        Ok(CommandOutput::XConfig {
            status,
            required_size,
            value,
        })
    }

    fn query_module_handle(&self, name: &str) -> Result<CommandOutput, HostRuntimeError> {
        if name.len() >= MAX_MODULE_NAME {
            let err = ConfigError::InvalidArgument(format!("module name too long: {}", name));
            return Err(err.into());
        }
        let mut ctx = SimGuestContext::with_memory(SCRATCH_BASE, SCRATCH_SIZE);
        let mut name_bytes = name.as_bytes().to_vec();
        name_bytes.push(0);
        ctx.memory_mut().write(MODULE_NAME_IN, &name_bytes)?;

        let found = self.call(
            &mut ctx,
            "XexGetModuleHandle",
            &[MODULE_NAME_IN as u64, HANDLE_OUT as u64],
        )?;
        let handle = if found != 0 {
            Some(ModuleHandle(ctx.memory().load_u32(HANDLE_OUT)?))
        } else {
            None
        };
        Ok(CommandOutput::ModuleHandle {
            name: name.to_string(),
            handle,
        })
    }
}

impl Drop for HostRuntime {
    fn drop(&mut self) {
        if let Some(module) = self.executable.take() {
            if let Err(err) = self.kernel.release(&module) {
                log::error!("releasing executable {}: {}", module.name(), err);
            }
        }
    }
}
