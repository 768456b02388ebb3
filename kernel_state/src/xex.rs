//! Parsed executable header values
//!
//! Header parsing lives with the loader; the kernel only consumes the
//! fields below.

use serde::{Deserialize, Serialize};

pub const XEX_SYSTEM_NO_FORCED_REBOOT: u32 = 0x0000_0001;
pub const XEX_SYSTEM_FOREGROUND_TASKS: u32 = 0x0000_0002;
pub const XEX_SYSTEM_NO_ODD_MAPPING: u32 = 0x0000_0004;
pub const XEX_SYSTEM_HANDLE_MCE_INPUT: u32 = 0x0000_0008;
pub const XEX_SYSTEM_RESTRICTED_HUD_FEATURES: u32 = 0x0000_0010;
pub const XEX_SYSTEM_HANDLE_GAMEPAD_DISCONNECT: u32 = 0x0000_0020;
pub const XEX_SYSTEM_INSECURE_SOCKETS: u32 = 0x0000_0040;
pub const XEX_SYSTEM_XBOX1_INTEROPERABILITY: u32 = 0x0000_0080;
pub const XEX_SYSTEM_DASH_CONTEXT: u32 = 0x0000_0100;
pub const XEX_SYSTEM_USES_GAME_VOICE_CHANNEL: u32 = 0x0000_0200;
pub const XEX_SYSTEM_PAL50_INCOMPATIBLE: u32 = 0x0000_0400;
pub const XEX_SYSTEM_INSECURE_UTILITY_DRIVE: u32 = 0x0000_0800;

/// XEX2 header fields the kernel consults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XexHeader {
    /// Privilege bitmask, queried by bit position
    pub system_flags: u32,
    pub image_base: u32,
    pub entry_point: u32,
}

impl XexHeader {
    pub fn with_system_flags(system_flags: u32) -> Self {
        Self {
            system_flags,
            ..Self::default()
        }
    }

    /// Tests privilege bit `bit`; bits past 31 are never set
    pub fn has_privilege(&self, bit: u32) -> bool {
        bit < u32::BITS && (self.system_flags >> bit) & 1 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_bits() {
        let header = XexHeader::with_system_flags(XEX_SYSTEM_INSECURE_SOCKETS);
        assert!(header.has_privilege(6));
        assert!(!header.has_privilege(5));
        assert!(!header.has_privilege(7));
    }

    #[test]
    fn test_out_of_range_bit() {
        let header = XexHeader::with_system_flags(u32::MAX);
        assert!(header.has_privilege(31));
        assert!(!header.has_privilege(32));
        assert!(!header.has_privilege(u32::MAX));
    }
}
