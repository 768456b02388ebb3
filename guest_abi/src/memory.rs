//! Guest memory access and the big-endian value codec

use thiserror::Error;

/// A 32-bit guest virtual address. Zero is the null pointer.
pub type GuestAddr = u32;

/// Errors that can occur when touching guest memory
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    /// Address range is not backed by guest memory
    #[error("Invalid guest address: {addr:#010x} (+{len})")]
    InvalidAddress { addr: GuestAddr, len: usize },

    /// Null pointer where a value was required
    #[error("Null guest pointer")]
    NullPointer,

    /// Guest string ran past the allowed length without a terminator
    #[error("Unterminated guest string at {0:#010x}")]
    UnterminatedString(GuestAddr),
}

/// Byte-addressable view of the flat guest address space.
///
/// Implementations only move raw bytes. Interpretation of those bytes as
/// integers is the job of [`BigEndianCodec`].
pub trait GuestMemory {
    /// Copies `buf.len()` bytes starting at `addr` into `buf`
    fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> Result<(), MemoryError>;

    /// Copies `data` into guest memory starting at `addr`
    fn write(&mut self, addr: GuestAddr, data: &[u8]) -> Result<(), MemoryError>;
}

/// Big-endian loads and stores over any [`GuestMemory`].
///
/// Conversion is always explicit; host byte order never leaks into guest
/// memory.
pub trait BigEndianCodec: GuestMemory {
    fn load_u8(&self, addr: GuestAddr) -> Result<u8, MemoryError> {
        let mut buf = [0u8; 1];
        self.read(addr, &mut buf)?;
        Ok(buf[0])
    }

    fn load_u16(&self, addr: GuestAddr) -> Result<u16, MemoryError> {
        let mut buf = [0u8; 2];
        self.read(addr, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn load_u32(&self, addr: GuestAddr) -> Result<u32, MemoryError> {
        let mut buf = [0u8; 4];
        self.read(addr, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn load_u64(&self, addr: GuestAddr) -> Result<u64, MemoryError> {
        let mut buf = [0u8; 8];
        self.read(addr, &mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn store_u8(&mut self, addr: GuestAddr, value: u8) -> Result<(), MemoryError> {
        self.write(addr, &[value])
    }

    fn store_u16(&mut self, addr: GuestAddr, value: u16) -> Result<(), MemoryError> {
        self.write(addr, &value.to_be_bytes())
    }

    fn store_u32(&mut self, addr: GuestAddr, value: u32) -> Result<(), MemoryError> {
        self.write(addr, &value.to_be_bytes())
    }

    fn store_u64(&mut self, addr: GuestAddr, value: u64) -> Result<(), MemoryError> {
        self.write(addr, &value.to_be_bytes())
    }

    /// Reads a NUL-terminated byte string of at most `max_len` bytes
    fn load_c_string(&self, addr: GuestAddr, max_len: usize) -> Result<String, MemoryError> {
        if addr == 0 {
            return Err(MemoryError::NullPointer);
        }
        let mut bytes = Vec::new();
        for offset in 0..max_len {
            let byte = self.load_u8(addr.wrapping_add(offset as u32))?;
            if byte == 0 {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.push(byte);
        }
        Err(MemoryError::UnterminatedString(addr))
    }
}

impl<T: GuestMemory + ?Sized> BigEndianCodec for T {}

/// A single contiguous region of guest memory starting at `base`.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    base: GuestAddr,
    bytes: Vec<u8>,
}

impl FlatMemory {
    /// Creates zero-filled memory covering `base..base + size`
    pub fn new(base: GuestAddr, size: usize) -> Self {
        Self {
            base,
            bytes: vec![0u8; size],
        }
    }

    pub fn base(&self) -> GuestAddr {
        self.base
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Raw view of the backing bytes (test inspection)
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn range(&self, addr: GuestAddr, len: usize) -> Result<std::ops::Range<usize>, MemoryError> {
        let invalid = MemoryError::InvalidAddress { addr, len };
        let start = addr.checked_sub(self.base).ok_or(invalid.clone())? as usize;
        let end = start.checked_add(len).ok_or(invalid.clone())?;
        if end > self.bytes.len() {
            return Err(invalid);
        }
        Ok(start..end)
    }
}

impl GuestMemory for FlatMemory {
    fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> Result<(), MemoryError> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write(&mut self, addr: GuestAddr, data: &[u8]) -> Result<(), MemoryError> {
        let range = self.range(addr, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }
}
