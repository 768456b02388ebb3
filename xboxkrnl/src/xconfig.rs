//! Fixed-value configuration settings (`ExGetXConfigSetting`)
//!
//! Settings are keyed by `(category, setting)` and returned as fixed-size
//! big-endian values. The lookup, size checks and required-size report are
//! shared by every table; callers only supply the table.

use export_resolver::ShimCall;
use guest_abi::{GuestAddr, GuestMemory, MemoryError, XStatus};

pub const XCONFIG_SECURED_CATEGORY: u16 = 0x0002;
pub const XCONFIG_USER_CATEGORY: u16 = 0x0003;

/// A fixed setting value and its encoded width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingValue {
    U8(u8),
    U16(u16),
    U32(u32),
}

impl SettingValue {
    pub fn size(self) -> u16 {
        match self {
            SettingValue::U8(_) => 1,
            SettingValue::U16(_) => 2,
            SettingValue::U32(_) => 4,
        }
    }

    pub fn to_be_bytes(self) -> Vec<u8> {
        match self {
            SettingValue::U8(value) => vec![value],
            SettingValue::U16(value) => value.to_be_bytes().to_vec(),
            SettingValue::U32(value) => value.to_be_bytes().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSetting {
    pub category: u16,
    pub setting: u16,
    pub value: SettingValue,
}

const fn fixed(category: u16, setting: u16, value: SettingValue) -> FixedSetting {
    FixedSetting {
        category,
        setting,
        value,
    }
}

/// Values reported to titles
pub static XCONFIG_SETTINGS: &[FixedSetting] = &[
    // Secured
    fixed(XCONFIG_SECURED_CATEGORY, 0x0002, SettingValue::U32(0x0000_1000)), // AV region
    // User: time zone
    fixed(XCONFIG_USER_CATEGORY, 0x0001, SettingValue::U32(0)),
    fixed(XCONFIG_USER_CATEGORY, 0x0002, SettingValue::U32(0)),
    fixed(XCONFIG_USER_CATEGORY, 0x0003, SettingValue::U32(0)),
    fixed(XCONFIG_USER_CATEGORY, 0x0004, SettingValue::U32(0)),
    fixed(XCONFIG_USER_CATEGORY, 0x0005, SettingValue::U32(0)),
    fixed(XCONFIG_USER_CATEGORY, 0x0006, SettingValue::U32(0)),
    fixed(XCONFIG_USER_CATEGORY, 0x0007, SettingValue::U32(0)),
    // User
    fixed(XCONFIG_USER_CATEGORY, 0x0009, SettingValue::U32(1)), // language: English
    fixed(XCONFIG_USER_CATEGORY, 0x000A, SettingValue::U32(0x0004_0000)), // video flags
    fixed(XCONFIG_USER_CATEGORY, 0x000C, SettingValue::U32(0x40)), // retail flags
    fixed(XCONFIG_USER_CATEGORY, 0x000E, SettingValue::U8(103)), // country: US
];

/// Finds a setting, distinguishing an unknown category (parameter 1) from
/// an unknown setting in a known category (parameter 2)
pub fn lookup_setting(
    table: &[FixedSetting],
    category: u16,
    setting: u16,
) -> Result<SettingValue, XStatus> {
    let mut category_known = false;
    for entry in table.iter().filter(|entry| entry.category == category) {
        category_known = true;
        if entry.setting == setting {
            return Ok(entry.value);
        }
    }
    if category_known {
        Err(XStatus::INVALID_PARAMETER_2)
    } else {
        Err(XStatus::INVALID_PARAMETER_1)
    }
}

/// Outcome of a fixed-value query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingQuery {
    pub status: XStatus,
    /// Size of the value when the key is known, zero otherwise
    pub required_size: u16,
}

/// Runs a fixed-value query against guest memory.
///
/// The value is written only on success. An undersized buffer is reported
/// before a missing one. Fails only if guest memory faults.
pub fn query_setting(
    table: &[FixedSetting],
    memory: &mut dyn GuestMemory,
    category: u16,
    setting: u16,
    buffer: Option<GuestAddr>,
    buffer_size: u16,
) -> Result<SettingQuery, MemoryError> {
    let value = match lookup_setting(table, category, setting) {
        Ok(value) => value,
        Err(status) => {
            return Ok(SettingQuery {
                status,
                required_size: 0,
            })
        }
    };

    let required_size = value.size();
    let status = if buffer_size < required_size {
        XStatus::BUFFER_TOO_SMALL
    } else {
        match buffer {
            None if buffer_size != 0 => XStatus::INVALID_PARAMETER_3,
            None => XStatus::SUCCESS,
            Some(addr) => {
                memory.write(addr, &value.to_be_bytes())?;
                XStatus::SUCCESS
            }
        }
    };
    Ok(SettingQuery {
        status,
        required_size,
    })
}

fn get_xconfig_setting(call: &mut ShimCall<'_>) -> Result<XStatus, MemoryError> {
    let category = call.arg_u16(0);
    let setting = call.arg_u16(1);
    let buffer = call.optional_ptr(2);
    let buffer_size = call.arg_u16(3);

    let query = query_setting(
        XCONFIG_SETTINGS,
        call.memory_mut(),
        category,
        setting,
        buffer,
        buffer_size,
    )?;
    if let Some(required_size_ptr) = call.optional_ptr(4) {
        call.store_u16(required_size_ptr, query.required_size)?;
    }
    Ok(query.status)
}

/// `ExGetXConfigSetting(category, setting, buffer, buffer_size, required_size)`
pub fn ex_get_xconfig_setting(call: &mut ShimCall<'_>) -> u64 {
    log::debug!(
        "ExGetXConfigSetting({:04X}, {:04X}, {:08X}, {:04X}, {:08X})",
        call.arg_u16(0),
        call.arg_u16(1),
        call.arg_ptr(2),
        call.arg_u16(3),
        call.arg_ptr(4)
    );

    let status = get_xconfig_setting(call).unwrap_or_else(|err| {
        log::warn!("ExGetXConfigSetting faulted: {}", err);
        XStatus::ACCESS_VIOLATION
    });
    if !status.is_success() {
        log::debug!("ExGetXConfigSetting -> {}", status);
    }
    status.as_return_value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use guest_abi::{BigEndianCodec, FlatMemory};

    const BASE: GuestAddr = 0x4000_0000;

    fn memory() -> FlatMemory {
        FlatMemory::new(BASE, 0x100)
    }

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(
            lookup_setting(XCONFIG_SETTINGS, 0x0003, 0x000A),
            Ok(SettingValue::U32(0x0004_0000))
        );
        assert_eq!(
            lookup_setting(XCONFIG_SETTINGS, 0x0003, 0x0099),
            Err(XStatus::INVALID_PARAMETER_2)
        );
        assert_eq!(
            lookup_setting(XCONFIG_SETTINGS, 0x0099, 0x000A),
            Err(XStatus::INVALID_PARAMETER_1)
        );
    }

    #[test]
    fn test_query_writes_value() {
        let mut memory = memory();
        let query =
            query_setting(XCONFIG_SETTINGS, &mut memory, 0x0003, 0x000A, Some(BASE), 4).unwrap();
        assert_eq!(query.status, XStatus::SUCCESS);
        assert_eq!(query.required_size, 4);
        assert_eq!(&memory.bytes()[..4], &[0x00, 0x04, 0x00, 0x00]);
        assert_eq!(memory.bytes()[4], 0);
    }

    #[test]
    fn test_query_single_byte_value() {
        let mut memory = memory();
        memory.store_u32(BASE, 0xFFFF_FFFF).unwrap();
        let query =
            query_setting(XCONFIG_SETTINGS, &mut memory, 0x0003, 0x000E, Some(BASE), 4).unwrap();
        assert_eq!(query.status, XStatus::SUCCESS);
        assert_eq!(query.required_size, 1);
        assert_eq!(&memory.bytes()[..4], &[103, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_buffer_too_small_leaves_memory() {
        let mut memory = memory();
        let query =
            query_setting(XCONFIG_SETTINGS, &mut memory, 0x0003, 0x000A, Some(BASE), 2).unwrap();
        assert_eq!(query.status, XStatus::BUFFER_TOO_SMALL);
        assert_eq!(query.required_size, 4);
        assert!(memory.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_missing_buffer() {
        let mut memory = memory();
        let query = query_setting(XCONFIG_SETTINGS, &mut memory, 0x0003, 0x000A, None, 4).unwrap();
        assert_eq!(query.status, XStatus::INVALID_PARAMETER_3);
        assert_eq!(query.required_size, 4);

        // Undersized takes precedence over missing.
        let query = query_setting(XCONFIG_SETTINGS, &mut memory, 0x0003, 0x000A, None, 0).unwrap();
        assert_eq!(query.status, XStatus::BUFFER_TOO_SMALL);
    }

    #[test]
    fn test_unknown_keys_report_zero_size() {
        let mut memory = memory();
        let query =
            query_setting(XCONFIG_SETTINGS, &mut memory, 0x0099, 0x0001, Some(BASE), 4).unwrap();
        assert_eq!(query.status, XStatus::INVALID_PARAMETER_1);
        assert_eq!(query.required_size, 0);
        assert!(memory.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_buffer_fault() {
        let mut memory = memory();
        let result = query_setting(XCONFIG_SETTINGS, &mut memory, 0x0003, 0x000A, Some(0x10), 4);
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_table() {
        let table = [fixed(0x0007, 0x0001, SettingValue::U16(0xBEEF))];
        let mut memory = memory();
        let query = query_setting(&table, &mut memory, 0x0007, 0x0001, Some(BASE), 2).unwrap();
        assert_eq!(query.status, XStatus::SUCCESS);
        assert_eq!(memory.load_u16(BASE).unwrap(), 0xBEEF);
    }
}
