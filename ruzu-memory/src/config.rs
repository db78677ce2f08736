// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::Path;

use ini::Ini;
use log::{debug, info, warn};

use ruzu_common::ADDRESS_SPACE_SIZE;

use crate::error::MemoryResult;
use crate::memory_block::MemoryBlock;

/// Default backing memory size: 4 GiB.
pub const DEFAULT_BACKING_SIZE: usize = 4 << 30;

/// Sizing of the guest address space and its backing memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Requested virtual address space size; rounded up to a power of two.
    pub address_space_size: u64,
    /// Size of the backing memory block in bytes.
    pub backing_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            address_space_size: ADDRESS_SPACE_SIZE,
            backing_size: DEFAULT_BACKING_SIZE,
        }
    }
}

impl MemoryConfig {
    /// Read the `[Memory]` section. Missing or malformed keys keep their
    /// defaults.
    pub fn from_ini(conf: &Ini) -> Self {
        let mut config = Self::default();

        let Some(section) = conf.section(Some("Memory")) else {
            return config;
        };

        if let Some(value) = section.get("address_space_size") {
            match parse_size(value) {
                Some(size) => config.address_space_size = size,
                None => warn!("Invalid address_space_size '{}', using default", value),
            }
        }
        if let Some(value) = section.get("backing_size") {
            match parse_size(value).and_then(|size| usize::try_from(size).ok()) {
                Some(size) if size != 0 => config.backing_size = size,
                _ => warn!("Invalid backing_size '{}', using default", value),
            }
        }

        debug!(
            "Memory config: address_space_size={:#X} backing_size={:#X}",
            config.address_space_size, config.backing_size
        );
        config
    }

    /// Allocate a backing block of `backing_size` bytes.
    pub fn create_backing(&self) -> MemoryResult<MemoryBlock> {
        MemoryBlock::new(self.backing_size)
    }
}

/// Load the memory config from an INI file, falling back to defaults when
/// no path is given or the file cannot be read.
pub fn load_config(path: Option<&Path>) -> MemoryConfig {
    let Some(path) = path else {
        info!("No memory config given, using defaults");
        return MemoryConfig::default();
    };

    if !path.exists() {
        warn!("Config file not found: {}", path.display());
        return MemoryConfig::default();
    }

    info!("Loading memory config from: {}", path.display());

    match Ini::load_from_file(path) {
        Ok(conf) => MemoryConfig::from_ini(&conf),
        Err(e) => {
            warn!("Failed to parse config: {}", e);
            MemoryConfig::default()
        }
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal size.
fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size(" 0x1000 "), Some(0x1000));
        assert_eq!(parse_size("0X8000000000"), Some(1 << 39));
        assert_eq!(parse_size("0x"), None);
        assert_eq!(parse_size("lots"), None);
    }

    #[test]
    fn test_from_ini() {
        let conf = Ini::load_from_str(
            "[Memory]\naddress_space_size = 0x1000000000\nbacking_size = 1048576\n",
        )
        .unwrap();
        let config = MemoryConfig::from_ini(&conf);
        assert_eq!(config.address_space_size, 1 << 36);
        assert_eq!(config.backing_size, 1 << 20);
    }

    #[test]
    fn test_from_ini_defaults() {
        let conf = Ini::load_from_str("[Renderer]\nuse_vsync = true\n").unwrap();
        assert_eq!(MemoryConfig::from_ini(&conf), MemoryConfig::default());

        let conf = Ini::load_from_str("[Memory]\naddress_space_size = big\nbacking_size = 0\n")
            .unwrap();
        assert_eq!(MemoryConfig::from_ini(&conf), MemoryConfig::default());
    }

    #[test]
    fn test_load_config_missing_file() {
        let config = load_config(Some(Path::new("/nonexistent/ruzu-memory.ini")));
        assert_eq!(config, MemoryConfig::default());
        assert_eq!(load_config(None), MemoryConfig::default());
    }

    #[test]
    fn test_create_backing() {
        let config = MemoryConfig {
            address_space_size: 1 << 20,
            backing_size: 0x3000,
        };
        let block = config.create_backing().unwrap();
        assert_eq!(block.size(), 0x3000);
    }
}
