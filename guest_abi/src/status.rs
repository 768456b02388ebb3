//! Guest-visible status codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// An NT-style status code as the guest sees it in its return register.
///
/// Values must match the console kernel exactly; guest code compares them
/// bit for bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XStatus(pub u32);

impl XStatus {
    pub const SUCCESS: XStatus = XStatus(0x0000_0000);
    pub const NOT_IMPLEMENTED: XStatus = XStatus(0xC000_0002);
    pub const ACCESS_VIOLATION: XStatus = XStatus(0xC000_0005);
    pub const INVALID_PARAMETER: XStatus = XStatus(0xC000_000D);
    pub const NO_SUCH_FILE: XStatus = XStatus(0xC000_000F);
    pub const BUFFER_TOO_SMALL: XStatus = XStatus(0xC000_0023);
    pub const OBJECT_NAME_NOT_FOUND: XStatus = XStatus(0xC000_0034);
    pub const INVALID_PARAMETER_1: XStatus = XStatus(0xC000_00EF);
    pub const INVALID_PARAMETER_2: XStatus = XStatus(0xC000_00F0);
    pub const INVALID_PARAMETER_3: XStatus = XStatus(0xC000_00F1);

    /// Returns the raw 32-bit code
    pub const fn code(self) -> u32 {
        self.0
    }

    /// True for success and informational codes (severity bits clear)
    pub const fn is_success(self) -> bool {
        self.0 >> 30 == 0
    }

    /// Returns the value placed in the guest return register
    pub const fn as_return_value(self) -> u64 {
        self.0 as u64
    }

    fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::SUCCESS => "STATUS_SUCCESS",
            Self::NOT_IMPLEMENTED => "STATUS_NOT_IMPLEMENTED",
            Self::ACCESS_VIOLATION => "STATUS_ACCESS_VIOLATION",
            Self::INVALID_PARAMETER => "STATUS_INVALID_PARAMETER",
            Self::NO_SUCH_FILE => "STATUS_NO_SUCH_FILE",
            Self::BUFFER_TOO_SMALL => "STATUS_BUFFER_TOO_SMALL",
            Self::OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            Self::INVALID_PARAMETER_1 => "STATUS_INVALID_PARAMETER_1",
            Self::INVALID_PARAMETER_2 => "STATUS_INVALID_PARAMETER_2",
            Self::INVALID_PARAMETER_3 => "STATUS_INVALID_PARAMETER_3",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for XStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({:#010X})", name, self.0),
            None => write!(f, "{:#010X}", self.0),
        }
    }
}

impl From<XStatus> for u32 {
    fn from(status: XStatus) -> Self {
        status.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_console_values() {
        assert_eq!(XStatus::SUCCESS.code(), 0);
        assert_eq!(XStatus::NOT_IMPLEMENTED.code(), 0xC0000002);
        assert_eq!(XStatus::BUFFER_TOO_SMALL.code(), 0xC0000023);
        assert_eq!(XStatus::INVALID_PARAMETER_1.code(), 0xC00000EF);
        assert_eq!(XStatus::INVALID_PARAMETER_2.code(), 0xC00000F0);
        assert_eq!(XStatus::INVALID_PARAMETER_3.code(), 0xC00000F1);
    }

    #[test]
    fn test_is_success() {
        assert!(XStatus::SUCCESS.is_success());
        assert!(!XStatus::NOT_IMPLEMENTED.is_success());
        assert!(!XStatus::INVALID_PARAMETER_2.is_success());
    }

    #[test]
    fn test_display_names_known_codes() {
        assert_eq!(
            XStatus::BUFFER_TOO_SMALL.to_string(),
            "STATUS_BUFFER_TOO_SMALL (0xC0000023)"
        );
        assert_eq!(XStatus(0x1234).to_string(), "0x00001234");
    }
}
