//! Disc-image-backed device (GDFX)
//!
//! Game discs carry a GDFX volume inside a game partition. Layout, all
//! little-endian:
//!
//! - Sector size 0x800; the volume descriptor is sector 32 of the partition
//! - Descriptor: `"MICROSOFT*XBOX*MEDIA"`, root table sector (u32), root
//!   table size (u32)
//! - A directory table is a binary tree of entries addressed in 4-byte units:
//!   `u16 left, u16 right, u32 sector, u32 length, u8 attributes,
//!   u8 name_length, name`
//!
//! The whole tree is indexed once when the image is opened.

use crate::device::{Device, Entry, EntryKind, EntryLocation};
use crate::error::FsError;
use crate::path::{join_components, split_components};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

const SECTOR_SIZE: u64 = 0x800;
const VOLUME_DESCRIPTOR_SECTOR: u64 = 32;
const VOLUME_MAGIC: &[u8; 20] = b"MICROSOFT*XBOX*MEDIA";

/// Candidate game partition offsets: plain GDFX, XGD2, XGD3, XGD1
const GAME_PARTITION_OFFSETS: [u64; 4] = [0x0000_0000, 0x0FD9_0000, 0x0208_0000, 0x1830_0000];

const ATTRIBUTE_DIRECTORY: u8 = 0x10;
const ENTRY_HEADER_SIZE: usize = 14;
const MAX_DIRECTORY_DEPTH: usize = 64;
const MAX_TABLE_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
struct DiscNode {
    path: String,
    name: String,
    kind: EntryKind,
    size: u64,
    offset: u64,
}

/// Serves the contents of a GDFX disc image.
///
/// Lookups are case-insensitive, matching the console.
#[derive(Debug)]
pub struct DiscImageDevice {
    label: String,
    game_offset: u64,
    root_offset: u64,
    nodes: HashMap<String, DiscNode>,
}

impl DiscImageDevice {
    /// Opens and indexes the image at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FsError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|err| FsError::Io(format!("{}: {}", path.display(), err)))?;
        Self::from_reader(BufReader::new(file), path.display().to_string())
    }

    /// Indexes an image from any seekable source
    pub fn from_reader<R: Read + Seek>(
        mut reader: R,
        label: impl Into<String>,
    ) -> Result<Self, FsError> {
        let label = label.into();
        let volume = find_volume(&mut reader)?;
        log::debug!(
            "GDFX volume in {} at {:#x}: root sector {}, {} bytes",
            label,
            volume.game_offset,
            volume.root_sector,
            volume.root_size
        );

        let mut indexer = Indexer {
            reader: &mut reader,
            game_offset: volume.game_offset,
            nodes: HashMap::new(),
        };
        let root_table = indexer.read_table(volume.root_sector, volume.root_size)?;
        indexer.index_directory("", &root_table, 0)?;
        let nodes = indexer.nodes;

        log::info!("indexed {} entries from disc image {}", nodes.len(), label);
        Ok(Self {
            label,
            game_offset: volume.game_offset,
            root_offset: volume.game_offset + volume.root_sector as u64 * SECTOR_SIZE,
            nodes,
        })
    }

    /// Byte offset of the game partition within the image
    pub fn game_offset(&self) -> u64 {
        self.game_offset
    }

    /// Number of indexed files and directories
    pub fn entry_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Device for DiscImageDevice {
    fn describe(&self) -> String {
        format!("disc image {}", self.label)
    }

    fn resolve_entry(&self, relative_path: &str) -> Result<Entry, FsError> {
        let components = split_components(relative_path)?;
        if components.is_empty() {
            return Ok(Entry {
                path: String::new(),
                name: String::new(),
                kind: EntryKind::Directory,
                size: 0,
                location: EntryLocation::Disc {
                    offset: self.root_offset,
                },
            });
        }

        let key = join_components(&components).to_ascii_lowercase();
        let node = self
            .nodes
            .get(&key)
            .ok_or_else(|| FsError::NotFound(relative_path.to_string()))?;

        Ok(Entry {
            path: node.path.clone(),
            name: node.name.clone(),
            kind: node.kind,
            size: node.size,
            location: EntryLocation::Disc {
                offset: node.offset,
            },
        })
    }
}

struct Volume {
    game_offset: u64,
    root_sector: u32,
    root_size: u32,
}

fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(buf)
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn find_volume<R: Read + Seek>(reader: &mut R) -> Result<Volume, FsError> {
    for game_offset in GAME_PARTITION_OFFSETS {
        let mut descriptor = [0u8; 28];
        let at = game_offset + VOLUME_DESCRIPTOR_SECTOR * SECTOR_SIZE;
        match read_at(reader, at, &mut descriptor) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => continue,
            Err(err) => return Err(err.into()),
        }
        if &descriptor[..20] == VOLUME_MAGIC {
            return Ok(Volume {
                game_offset,
                root_sector: le_u32(&descriptor, 20),
                root_size: le_u32(&descriptor, 24),
            });
        }
    }
    Err(FsError::InvalidImage(
        "no GDFX volume descriptor found".to_string(),
    ))
}

struct Indexer<'a, R> {
    reader: &'a mut R,
    game_offset: u64,
    nodes: HashMap<String, DiscNode>,
}

impl<R: Read + Seek> Indexer<'_, R> {
    fn read_table(&mut self, sector: u32, size: u32) -> Result<Vec<u8>, FsError> {
        if size > MAX_TABLE_SIZE {
            return Err(FsError::InvalidImage(format!(
                "directory table at sector {} is {} bytes",
                sector, size
            )));
        }
        let mut table = vec![0u8; size as usize];
        let at = self.game_offset + sector as u64 * SECTOR_SIZE;
        read_at(self.reader, at, &mut table).map_err(|err| {
            FsError::InvalidImage(format!("directory table at sector {}: {}", sector, err))
        })?;
        Ok(table)
    }

    fn index_directory(&mut self, parent: &str, table: &[u8], depth: usize) -> Result<(), FsError> {
        if depth > MAX_DIRECTORY_DEPTH {
            return Err(FsError::InvalidImage(format!(
                "directory nesting too deep at {}",
                parent
            )));
        }
        // Empty directories are a single all-ones node.
        if table.len() < 4 || (le_u16(table, 0) == 0xFFFF && le_u16(table, 2) == 0xFFFF) {
            return Ok(());
        }
        self.walk(parent, table, depth)
    }

    /// In-order walk of one directory table.
    ///
    /// Sibling chains can be as long as the table allows, so the walk keeps
    /// its own stack. Only subdirectories recurse, bounded by
    /// `MAX_DIRECTORY_DEPTH`.
    fn walk(&mut self, parent: &str, table: &[u8], depth: usize) -> Result<(), FsError> {
        let mut visited = HashSet::new();
        let mut pending: Vec<TreeNode> = Vec::new();
        let mut cursor = Some(0u16);

        loop {
            while let Some(ordinal) = cursor {
                if !visited.insert(ordinal) {
                    return Err(FsError::InvalidImage(format!(
                        "directory tree under '{}' revisits node {}",
                        parent, ordinal
                    )));
                }
                let node = TreeNode::parse(table, ordinal)?;
                cursor = (node.left != 0).then_some(node.left);
                pending.push(node);
            }

            let Some(node) = pending.pop() else {
                return Ok(());
            };
            cursor = (node.right != 0).then_some(node.right);
            self.insert_node(parent, node, depth)?;
        }
    }

    fn insert_node(&mut self, parent: &str, node: TreeNode, depth: usize) -> Result<(), FsError> {
        let path = if parent.is_empty() {
            node.name.clone()
        } else {
            format!("{}/{}", parent, node.name)
        };
        let is_directory = node.attributes & ATTRIBUTE_DIRECTORY != 0;
        self.nodes.insert(
            path.to_ascii_lowercase(),
            DiscNode {
                path: path.clone(),
                name: node.name,
                kind: if is_directory {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                size: if is_directory { 0 } else { node.length as u64 },
                offset: self.game_offset + node.sector as u64 * SECTOR_SIZE,
            },
        );

        if is_directory && node.length > 0 {
            let child_table = self.read_table(node.sector, node.length)?;
            self.index_directory(&path, &child_table, depth + 1)?;
        }
        Ok(())
    }
}

/// One decoded directory table entry
struct TreeNode {
    left: u16,
    right: u16,
    sector: u32,
    length: u32,
    attributes: u8,
    name: String,
}

impl TreeNode {
    fn parse(table: &[u8], ordinal: u16) -> Result<Self, FsError> {
        let at = ordinal as usize * 4;
        let header = table.get(at..at + ENTRY_HEADER_SIZE).ok_or_else(|| {
            FsError::InvalidImage(format!("node {} outside directory table", ordinal))
        })?;
        let name_len = header[13] as usize;
        let name_start = at + ENTRY_HEADER_SIZE;
        let name_bytes = table.get(name_start..name_start + name_len).ok_or_else(|| {
            FsError::InvalidImage(format!("node {} name outside directory table", ordinal))
        })?;

        Ok(Self {
            left: le_u16(header, 0),
            right: le_u16(header, 2),
            sector: le_u32(header, 4),
            length: le_u32(header, 8),
            attributes: header[12],
            name: String::from_utf8_lossy(name_bytes).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FILE: u8 = 0x80;

    /// Builds a directory table whose entries are chained through right links
    fn dir_table(entries: &[(&str, u8, u32, u32)]) -> Vec<u8> {
        let entry_size = |name: &str| (ENTRY_HEADER_SIZE + name.len() + 3) & !3;
        let mut ordinals = Vec::new();
        let mut next = 0u16;
        for (name, ..) in entries {
            ordinals.push(next);
            next += (entry_size(name) / 4) as u16;
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
        table
    }

    fn put(image: &mut [u8], sector: u64, bytes: &[u8]) {
        let at = (sector * SECTOR_SIZE) as usize;
        image[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn build_image() -> Vec<u8> {
        let media = dir_table(&[("logo.png", FILE, 41, 3)]);
        let root = dir_table(&[
            ("default.xex", FILE, 40, 5),
            ("media", ATTRIBUTE_DIRECTORY, 36, media.len() as u32),
        ]);

        let mut image = vec![0u8; (48 * SECTOR_SIZE) as usize];
        let mut descriptor = VOLUME_MAGIC.to_vec();
        descriptor.extend_from_slice(&34u32.to_le_bytes());
        descriptor.extend_from_slice(&(root.len() as u32).to_le_bytes());
        put(&mut image, VOLUME_DESCRIPTOR_SECTOR, &descriptor);
        put(&mut image, 34, &root);
        put(&mut image, 36, &media);
        put(&mut image, 40, b"XEX2!");
        put(&mut image, 41, b"PNG");
        image
    }

    #[test]
    fn test_index_and_resolve() {
        let device = DiscImageDevice::from_reader(Cursor::new(build_image()), "test.iso").unwrap();
        assert_eq!(device.game_offset(), 0);
        assert_eq!(device.entry_count(), 3);

        let xex = device.resolve_entry("default.xex").unwrap();
        assert_eq!(xex.kind, EntryKind::File);
        assert_eq!(xex.size, 5);
        assert_eq!(xex.location, EntryLocation::Disc { offset: 40 * SECTOR_SIZE });

        let logo = device.resolve_entry("\\media\\logo.png").unwrap();
        assert_eq!(logo.path, "media/logo.png");
        assert_eq!(logo.size, 3);

        assert!(device.resolve_entry("media").unwrap().is_directory());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let device = DiscImageDevice::from_reader(Cursor::new(build_image()), "test.iso").unwrap();
        let entry = device.resolve_entry("MEDIA/Logo.PNG").unwrap();
        assert_eq!(entry.name, "logo.png");
    }

    #[test]
    fn test_root_and_missing() {
        let device = DiscImageDevice::from_reader(Cursor::new(build_image()), "test.iso").unwrap();
        let root = device.resolve_entry("").unwrap();
        assert!(root.is_directory());
        assert_eq!(root.location, EntryLocation::Disc { offset: 34 * SECTOR_SIZE });

        assert_eq!(
            device.resolve_entry("missing.bin"),
            Err(FsError::NotFound("missing.bin".to_string()))
        );
    }

    #[test]
    fn test_not_a_gdfx_image() {
        let result = DiscImageDevice::from_reader(Cursor::new(vec![0u8; 0x20000]), "zeros.iso");
        assert!(matches!(result, Err(FsError::InvalidImage(_))));
    }

    #[test]
    fn test_cyclic_tree_rejected() {
        let mut root = dir_table(&[("a", FILE, 40, 1), ("b", FILE, 40, 1)]);
        // Point "b" (ordinal 4) back at itself.
        root[16 + 2..16 + 4].copy_from_slice(&4u16.to_le_bytes());

        let result = DiscImageDevice::from_reader(Cursor::new(image_with_root(&root)), "cycle.iso");
        assert!(matches!(result, Err(FsError::InvalidImage(_))));
    }

    /// Image whose root table is `root`, stored from sector 34
    fn image_with_root(root: &[u8]) -> Vec<u8> {
        let sectors = 34 + root.len() as u64 / SECTOR_SIZE + 1;
        let mut image = vec![0u8; (sectors * SECTOR_SIZE) as usize];
        let mut descriptor = VOLUME_MAGIC.to_vec();
        descriptor.extend_from_slice(&34u32.to_le_bytes());
        descriptor.extend_from_slice(&(root.len() as u32).to_le_bytes());
        put(&mut image, VOLUME_DESCRIPTOR_SECTOR, &descriptor);
        put(&mut image, 34, root);
        image
    }

    /// Root table with `count` files, each linked to the next through `right`
    fn long_sibling_chain(count: usize) -> Vec<u8> {
        let names: Vec<String> = (0..count).map(|i| format!("{:05}", i)).collect();
        let entries: Vec<(&str, u8, u32, u32)> =
            names.iter().map(|name| (name.as_str(), FILE, 40, 1)).collect();
        dir_table(&entries)
    }

    // 13000 five-character entries is close to the 16-bit ordinal limit.
    const LONG_CHAIN: usize = 13000;

    #[test]
    fn test_long_right_sibling_chain_indexes() {
        let root = long_sibling_chain(LONG_CHAIN);
        let device =
            DiscImageDevice::from_reader(Cursor::new(image_with_root(&root)), "wide.iso").unwrap();

        assert_eq!(device.entry_count(), LONG_CHAIN);
        assert!(device.resolve_entry("00000").is_ok());
        assert!(device.resolve_entry("12999").is_ok());
    }

    #[test]
    fn test_long_left_sibling_chain_indexes() {
        let mut root = long_sibling_chain(LONG_CHAIN);
        // Move every right link to the left slot.
        for entry in root.chunks_exact_mut(20) {
            let right = [entry[2], entry[3]];
            entry[0..2].copy_from_slice(&right);
            entry[2..4].copy_from_slice(&[0, 0]);
        }

        let device =
            DiscImageDevice::from_reader(Cursor::new(image_with_root(&root)), "wide.iso").unwrap();
        assert_eq!(device.entry_count(), LONG_CHAIN);
        assert_eq!(device.resolve_entry("06500").unwrap().size, 1);
    }

    #[test]
    fn test_open_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.iso");
        std::fs::write(&path, build_image()).unwrap();

        let device = DiscImageDevice::open(&path).unwrap();
        assert!(device.describe().contains("game.iso"));
        assert!(device.resolve_entry("default.xex").is_ok());

        assert!(matches!(
            DiscImageDevice::open(dir.path().join("missing.iso")),
            Err(FsError::Io(_))
        ));
    }
}
