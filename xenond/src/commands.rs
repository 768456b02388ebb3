//! # Host Query Commands
//!
//! Queries run against a live runtime:
//!
//! - `resolve <path>` - Resolve a guest path through the filesystem
//! - `xconfig <category>:<setting>` - Read a setting through `ExGetXConfigSetting`
//! - `privilege <bit>` - Ask `XexCheckExecutablePrivilege` about a bit
//! - `module <name>` - Look a module handle up through `XexGetModuleHandle`
//! - `mounts` - List mounted devices
//! - `exports` - List bound xboxkrnl exports
//!
//! Numbers in `xconfig` are hexadecimal; the privilege bit is decimal.

use thiserror::Error;

/// Host command error types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostCommandError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

/// Host commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Resolve { path: String },
    XConfig { category: u16, setting: u16 },
    Privilege { bit: u32 },
    ModuleHandle { name: String },
    Mounts,
    Exports,
}

/// Host command parser
pub struct HostCommandParser;

impl HostCommandParser {
    /// Parses a command string
    pub fn parse(input: &str) -> Result<HostCommand, HostCommandError> {
        let input = input.trim();
        let (cmd, rest) = match input.split_once(char::is_whitespace) {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (input, ""),
        };
        if cmd.is_empty() {
            return Err(HostCommandError::InvalidCommand(
                "Empty command".to_string(),
            ));
        }

        match cmd.to_lowercase().as_str() {
            "resolve" => Self::require(rest, "guest path").map(|path| HostCommand::Resolve {
                path: path.to_string(),
            }),
            "xconfig" => Self::parse_xconfig(Self::require(rest, "category:setting")?),
            "privilege" => Self::parse_privilege(Self::require(rest, "privilege bit")?),
            "module" => Self::require(rest, "module name").map(|name| {
                HostCommand::ModuleHandle {
                    name: name.to_string(),
                }
            }),
            "mounts" => Ok(HostCommand::Mounts),
            "exports" => Ok(HostCommand::Exports),
            other => Err(HostCommandError::UnknownCommand(other.to_string())),
        }
    }

    fn require<'a>(rest: &'a str, what: &str) -> Result<&'a str, HostCommandError> {
        if rest.is_empty() {
            Err(HostCommandError::MissingArgument(what.to_string()))
        } else {
            Ok(rest)
        }
    }

    /// Parses `CAT:SET` (or `CAT SET`), both hexadecimal
    pub fn parse_xconfig(args: &str) -> Result<HostCommand, HostCommandError> {
        let (category, setting) = args
            .split_once(|c: char| c == ':' || c.is_whitespace())
            .ok_or_else(|| HostCommandError::MissingArgument("setting".to_string()))?;
        Ok(HostCommand::XConfig {
            category: Self::parse_hex_u16(category.trim())?,
            setting: Self::parse_hex_u16(setting.trim())?,
        })
    }

    pub fn parse_privilege(args: &str) -> Result<HostCommand, HostCommandError> {
        let bit = args
            .trim()
            .parse()
            .map_err(|_| HostCommandError::InvalidNumber(args.to_string()))?;
        Ok(HostCommand::Privilege { bit })
    }

    fn parse_hex_u16(text: &str) -> Result<u16, HostCommandError> {
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        u16::from_str_radix(digits, 16)
            .map_err(|_| HostCommandError::InvalidNumber(text.to_string()))
    }
}
