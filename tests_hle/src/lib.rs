//! HLE Test Utilities
//!
//! Shared fixtures for cross-crate tests of the kernel surface.
//!
//! ## Test Philosophy
//!
//! - **Guest-eye view**: Kernel functions are exercised through dispatch
//!   with a simulated guest context, the same path a title takes
//! - **Shared state stays consistent**: Reference counts, handle tables and
//!   mount tables are checked after every interesting sequence
//! - **Real backends**: Devices are backed by temporary host directories and
//!   disc images built in memory

use export_resolver::{DispatchOutcome, ExportResolver};
use guest_abi::{ExportKey, GuestAddr, SimGuestContext};
use guest_fs::FileSystem;
use kernel_state::{KernelConfig, KernelState};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Base of the fixture's guest memory
pub const GUEST_BASE: GuestAddr = 0x8200_0000;
/// Size of the fixture's guest memory
pub const GUEST_SIZE: usize = 0x10000;

/// One wired-up emulator instance plus a guest context to call it from
pub struct HleFixture {
    pub file_system: Arc<FileSystem>,
    pub kernel: Arc<KernelState>,
    pub resolver: ExportResolver,
    pub context: SimGuestContext,
}

impl HleFixture {
    /// Dispatches `xboxkrnl.exe!key` with `args`
    pub fn call(&mut self, key: impl Into<ExportKey>, args: &[u64]) -> DispatchOutcome {
        self.call_module(xboxkrnl::MODULE_NAME, key, args)
    }

    pub fn call_module(
        &mut self,
        module_name: &str,
        key: impl Into<ExportKey>,
        args: &[u64],
    ) -> DispatchOutcome {
        if let Err(err) = self.context.set_args(args) {
            return DispatchOutcome::Fault(err);
        }
        self.resolver
            .dispatch(module_name, &key.into(), &mut self.context)
    }
}

/// Bootstrap helper for tests
///
/// Creates an empty filesystem, a kernel with strict lifetime checks and a
/// resolver with the xboxkrnl exports bound.
pub fn test_bootstrap() -> HleFixture {
    bootstrap_with(KernelConfig {
        strict_lifetimes: true,
    })
}

pub fn bootstrap_with(config: KernelConfig) -> HleFixture {
    let file_system = Arc::new(FileSystem::new());
    let kernel = Arc::new(KernelState::new(config, Arc::clone(&file_system)));
    let resolver = ExportResolver::new();
    xboxkrnl::register_module_exports(&resolver, Arc::clone(&kernel));

    HleFixture {
        file_system,
        kernel,
        resolver,
        context: SimGuestContext::with_memory(GUEST_BASE, GUEST_SIZE),
    }
}

const SECTOR_SIZE: usize = 0x800;
const VOLUME_DESCRIPTOR_SECTOR: usize = 32;
const FIRST_FREE_SECTOR: usize = 34;
const ATTRIBUTE_DIRECTORY: u8 = 0x10;
const ATTRIBUTE_NORMAL: u8 = 0x80;

#[derive(Default)]
struct DirNode {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeMap<String, DirNode>,
}

/// Builds GDFX disc images in memory.
///
/// ```
/// use tests_hle::GdfxImageBuilder;
///
/// let image = GdfxImageBuilder::new()
///     .file("default.xex", b"XEX2")
///     .file("media/logo.png", b"PNG")
///     .build();
/// assert_eq!(image.len() % 0x800, 0);
/// ```
#[derive(Default)]
pub struct GdfxImageBuilder {
    root: DirNode,
}

impl GdfxImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, creating parent directories; `/` separates components
    pub fn file(mut self, path: &str, contents: &[u8]) -> Self {
        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let Some(name) = components.pop() else {
            return self;
        };
        let mut dir = &mut self.root;
        for component in components {
            dir = dir.dirs.entry(component.to_string()).or_default();
        }
        dir.files.insert(name.to_string(), contents.to_vec());
        self
    }

    /// Adds an empty directory
    pub fn directory(mut self, path: &str) -> Self {
        let mut dir = &mut self.root;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            dir = dir.dirs.entry(component.to_string()).or_default();
        }
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut image = vec![0u8; FIRST_FREE_SECTOR * SECTOR_SIZE];
        let (root_sector, root_size) = write_directory(&mut image, &self.root);

        let at = VOLUME_DESCRIPTOR_SECTOR * SECTOR_SIZE;
        image[at..at + 20].copy_from_slice(b"MICROSOFT*XBOX*MEDIA");
        image[at + 20..at + 24].copy_from_slice(&root_sector.to_le_bytes());
        image[at + 24..at + 28].copy_from_slice(&root_size.to_le_bytes());
        image
    }
}

/// Appends `bytes` at the next sector boundary and returns its sector
fn append(image: &mut Vec<u8>, bytes: &[u8]) -> u32 {
    let sector = (image.len() / SECTOR_SIZE) as u32;
    image.extend_from_slice(bytes);
    let padded = image.len().div_ceil(SECTOR_SIZE) * SECTOR_SIZE;
    image.resize(padded, 0);
    sector
}

fn write_directory(image: &mut Vec<u8>, dir: &DirNode) -> (u32, u32) {
    let mut entries: Vec<(String, u8, u32, u32)> = Vec::new();
    for (name, contents) in &dir.files {
        let sector = append(image, contents);
        entries.push((name.clone(), ATTRIBUTE_NORMAL, sector, contents.len() as u32));
    }
    for (name, child) in &dir.dirs {
        let (sector, size) = write_directory(image, child);
        entries.push((name.clone(), ATTRIBUTE_DIRECTORY, sector, size));
    }
    if entries.is_empty() {
        return (0, 0);
    }

    let entry_size = |name: &str| (14 + name.len() + 3) & !3;
    let mut ordinals = Vec::new();
    let mut next = 0usize;
    for (name, ..) in &entries {
        ordinals.push(next as u16);
        next += entry_size(name) / 4;
    }

    let mut table = Vec::new();
    for (i, (name, attributes, sector, length)) in entries.iter().enumerate() {
        let right = ordinals.get(i + 1).copied().unwrap_or(0);
        let start = table.len();
        table.extend_from_slice(&0u16.to_le_bytes());
        table.extend_from_slice(&right.to_le_bytes());
        table.extend_from_slice(&sector.to_le_bytes());
        table.extend_from_slice(&length.to_le_bytes());
        table.push(*attributes);
        table.push(name.len() as u8);
        table.extend_from_slice(name.as_bytes());
        table.resize(start + entry_size(name), 0xFF);
    }
    let size = table.len() as u32;
    (append(image, &table), size)
}
