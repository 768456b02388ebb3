//! # Host Configuration
//!
//! Runtime settings come from an optional JSON file, with command-line
//! flags layered on top:
//!
//! ```json
//! {
//!   "log_level": "debug",
//!   "strict_lifetimes": false,
//!   "mounts": [
//!     { "prefix": "\\Device\\Cdrom0\\", "kind": "disc_image", "host_path": "game.iso" }
//!   ],
//!   "symlinks": [{ "source": "d:", "target": "\\Device\\Cdrom0\\" }],
//!   "executable": { "name": "default.xex", "system_flags": 64 }
//! }
//! ```
//!
//! Every field is optional. A symlink source is matched against the whole
//! guest path, so the `d:` link above serves `d:` itself; files on the disc
//! are reached through the mount prefix (`\Device\Cdrom0\default.xex`).

use kernel_state::KernelConfig;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Mount {0} has an empty prefix")]
    EmptyMountPrefix(usize),

    #[error("Symlink {0} has an empty source")]
    EmptySymlinkSource(usize),

    #[error("Executable module name is empty")]
    EmptyExecutableName,

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Device backend for a mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountKind {
    LocalDirectory,
    DiscImage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    pub prefix: String,
    pub kind: MountKind,
    pub host_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkConfig {
    pub source: String,
    pub target: String,
}

/// Module registered as the running executable at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableConfig {
    pub name: String,
    #[serde(default)]
    pub system_flags: u32,
}

/// Host runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostRuntimeConfig {
    /// `off`, `error`, `warn`, `info`, `debug` or `trace`
    pub log_level: String,
    /// Panic on kernel lifetime bugs instead of logging them
    pub strict_lifetimes: bool,
    /// Applied in order, so a later mount at the same prefix wins
    pub mounts: Vec<MountConfig>,
    pub symlinks: Vec<SymlinkConfig>,
    pub executable: Option<ExecutableConfig>,
}

impl Default for HostRuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            strict_lifetimes: KernelConfig::default().strict_lifetimes,
            mounts: Vec::new(),
            symlinks: Vec::new(),
            executable: None,
        }
    }
}

impl HostRuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Rejects settings that could never be applied
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_level_filter()?;
        if let Some(index) = self.mounts.iter().position(|m| m.prefix.is_empty()) {
            return Err(ConfigError::EmptyMountPrefix(index));
        }
        if let Some(index) = self.symlinks.iter().position(|s| s.source.is_empty()) {
            return Err(ConfigError::EmptySymlinkSource(index));
        }
        if self
            .executable
            .as_ref()
            .is_some_and(|executable| executable.name.is_empty())
        {
            return Err(ConfigError::EmptyExecutableName);
        }
        Ok(())
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn kernel_config(&self) -> KernelConfig {
        KernelConfig {
            strict_lifetimes: self.strict_lifetimes,
        }
    }
}

/// Splits a `KEY=VALUE` command-line argument at the first `=`
pub fn parse_assignment(arg: &str) -> Result<(String, String), ConfigError> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(ConfigError::InvalidArgument(format!(
            "expected KEY=VALUE, got '{}'",
            arg
        ))),
    }
}

/// Parses a hexadecimal value with or without a `0x` prefix
pub fn parse_hex_u32(text: &str) -> Result<u32, ConfigError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16)
        .map_err(|_| ConfigError::InvalidArgument(format!("not a hex value: '{}'", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = HostRuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, HostRuntimeConfig::default());
        assert_eq!(config.log_level_filter().unwrap(), LevelFilter::Info);
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "log_level": "debug",
            "strict_lifetimes": false,
            "mounts": [
                { "prefix": "/game/", "kind": "disc_image", "host_path": "/tmp/game.iso" },
                { "prefix": "/", "kind": "local_directory", "host_path": "/tmp/root" }
            ],
            "symlinks": [{ "source": "d:", "target": "/game/" }],
            "executable": { "name": "default.xex", "system_flags": 64 }
        }"#;
        let config = HostRuntimeConfig::from_json(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.mounts.len(), 2);
        assert_eq!(config.mounts[0].kind, MountKind::DiscImage);
        assert_eq!(config.mounts[1].kind, MountKind::LocalDirectory);
        assert_eq!(config.symlinks[0].target, "/game/");
        assert_eq!(config.executable.as_ref().unwrap().system_flags, 0x40);
        assert!(!config.kernel_config().strict_lifetimes);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = HostRuntimeConfig {
            executable: Some(ExecutableConfig {
                name: "default.xex".to_string(),
                system_flags: 0x40,
            }),
            ..HostRuntimeConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(HostRuntimeConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_validation_errors() {
        let config = HostRuntimeConfig::from_json(
            r#"{ "mounts": [{ "prefix": "", "kind": "local_directory", "host_path": "." }] }"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyMountPrefix(0))
        ));

        let config = HostRuntimeConfig {
            log_level: "loud".to_string(),
            ..HostRuntimeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_unknown_mount_kind() {
        let result = HostRuntimeConfig::from_json(
            r#"{ "mounts": [{ "prefix": "/", "kind": "network", "host_path": "." }] }"#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = HostRuntimeConfig::load(dir.path().join("xenond.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("d:=/game/").unwrap(),
            ("d:".to_string(), "/game/".to_string())
        );
        assert_eq!(
            parse_assignment("/a=b=c").unwrap(),
            ("/a".to_string(), "b=c".to_string())
        );
        assert!(parse_assignment("=x").is_err());
        assert!(parse_assignment("novalue").is_err());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u32("0x40").unwrap(), 0x40);
        assert_eq!(parse_hex_u32("40").unwrap(), 0x40);
        assert!(parse_hex_u32("0xZZ").is_err());
    }
}
