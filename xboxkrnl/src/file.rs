//! File attribute queries (`NtQueryFullAttributesFile`)

use export_resolver::ShimCall;
use guest_abi::{BigEndianCodec, GuestAddr, GuestMemory, MemoryError, XStatus};
use guest_fs::{Entry, FsError};
use kernel_state::KernelState;

pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;
pub const FILE_ATTRIBUTE_NORMAL: u32 = 0x0000_0080;

/// Encoded size of `FILE_NETWORK_OPEN_INFORMATION`
pub const FILE_NETWORK_OPEN_INFORMATION_SIZE: usize = 56;

/// Reads the path out of an `OBJECT_ATTRIBUTES`.
///
/// ```text
/// OBJECT_ATTRIBUTES { u32 root_directory; u32 object_name; u32 attributes; }
/// ANSI_STRING       { u16 length; u16 maximum_length; u32 buffer; }
/// ```
pub fn read_object_name(
    memory: &dyn GuestMemory,
    object_attributes_ptr: GuestAddr,
) -> Result<String, MemoryError> {
    if object_attributes_ptr == 0 {
        return Err(MemoryError::NullPointer);
    }
    let object_name_ptr = memory.load_u32(object_attributes_ptr.wrapping_add(4))?;
    if object_name_ptr == 0 {
        return Err(MemoryError::NullPointer);
    }

    let length = memory.load_u16(object_name_ptr)? as usize;
    let buffer_ptr = memory.load_u32(object_name_ptr.wrapping_add(4))?;
    if length == 0 {
        return Ok(String::new());
    }
    if buffer_ptr == 0 {
        return Err(MemoryError::NullPointer);
    }

    let mut bytes = vec![0u8; length];
    memory.read(buffer_ptr, &mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Encodes `FILE_NETWORK_OPEN_INFORMATION` big-endian.
///
/// Timestamps are not tracked and are reported as zero.
pub fn encode_network_open_information(entry: &Entry) -> [u8; FILE_NETWORK_OPEN_INFORMATION_SIZE] {
    let mut info = [0u8; FILE_NETWORK_OPEN_INFORMATION_SIZE];
    let attributes = if entry.is_directory() {
        FILE_ATTRIBUTE_DIRECTORY
    } else {
        FILE_ATTRIBUTE_NORMAL
    };
    // creation, last access, last write, change times at 0..32
    info[32..40].copy_from_slice(&entry.size.to_be_bytes()); // allocation size
    info[40..48].copy_from_slice(&entry.size.to_be_bytes()); // end of file
    info[48..52].copy_from_slice(&attributes.to_be_bytes());
    info
}

/// Maps a resolution failure to the status a guest sees
pub fn status_for_fs_error(err: &FsError) -> XStatus {
    match err {
        FsError::NotFound(_) | FsError::Io(_) => XStatus::NO_SUCH_FILE,
        FsError::NoDevice(_)
        | FsError::SymlinkCycle(_)
        | FsError::SymlinkChainTooLong(_)
        | FsError::SymlinkNotFound(_)
        | FsError::InvalidPath(_)
        | FsError::InvalidImage(_) => XStatus::OBJECT_NAME_NOT_FOUND,
    }
}

fn query_full_attributes(
    kernel: &KernelState,
    call: &mut ShimCall<'_>,
    object_attributes_ptr: GuestAddr,
    file_info_ptr: GuestAddr,
) -> Result<XStatus, MemoryError> {
    let path = read_object_name(call.memory(), object_attributes_ptr)?;
    log::debug!("NtQueryFullAttributesFile: {}", path);

    match kernel.file_system().resolve_path(&path) {
        Ok(entry) => {
            let info = encode_network_open_information(&entry);
            call.memory_mut().write(file_info_ptr, &info)?;
            Ok(XStatus::SUCCESS)
        }
        Err(err) => {
            log::debug!("NtQueryFullAttributesFile: {}", err);
            Ok(status_for_fs_error(&err))
        }
    }
}

/// `NtQueryFullAttributesFile(object_attributes, file_information)`
pub fn nt_query_full_attributes_file(kernel: &KernelState, call: &mut ShimCall<'_>) -> u64 {
    let object_attributes_ptr = call.arg_ptr(0);
    let file_info_ptr = call.arg_ptr(1);
    log::debug!(
        "NtQueryFullAttributesFile({:08X}, {:08X})",
        object_attributes_ptr,
        file_info_ptr
    );

    if object_attributes_ptr == 0 || file_info_ptr == 0 {
        return XStatus::INVALID_PARAMETER.as_return_value();
    }
    let status = query_full_attributes(kernel, call, object_attributes_ptr, file_info_ptr)
        .unwrap_or_else(|err| {
            log::warn!("NtQueryFullAttributesFile faulted: {}", err);
            XStatus::ACCESS_VIOLATION
        });
    status.as_return_value()
}
