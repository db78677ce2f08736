// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// HOS result code: module (9 bits) + description (13 bits).
/// Layout: bits [8:0] = module, bits [21:9] = description.
/// Value 0 = success.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub u32);

impl ResultCode {
    pub const SUCCESS: Self = Self(0);

    #[inline]
    pub const fn new(module: u32, description: u32) -> Self {
        Self((module & 0x1FF) | ((description & 0x1FFF) << 9))
    }

    #[inline]
    pub const fn module(self) -> u32 {
        self.0 & 0x1FF
    }

    #[inline]
    pub const fn description(self) -> u32 {
        (self.0 >> 9) & 0x1FFF
    }

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_success() {
            return write!(f, "ResultCode::SUCCESS");
        }
        write!(
            f,
            "ResultCode(module={}, desc={}, raw=0x{:08X})",
            self.module(),
            self.description(),
            self.0
        )
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_success() {
            write!(f, "Success")
        } else {
            write!(f, "{}-{:04}", 2000 + self.module(), self.description())
        }
    }
}

impl std::error::Error for ResultCode {}

/// Kernel module number.
pub const MODULE_KERNEL: u32 = 1;

// Kernel result codes surfaced by the memory subsystem.
pub const NOT_IMPLEMENTED: ResultCode = ResultCode::new(MODULE_KERNEL, 33);
pub const INVALID_SIZE: ResultCode = ResultCode::new(MODULE_KERNEL, 101);
pub const INVALID_ADDRESS: ResultCode = ResultCode::new(MODULE_KERNEL, 102);
pub const OUT_OF_MEMORY: ResultCode = ResultCode::new(MODULE_KERNEL, 104);
pub const INVALID_MEMORY_STATE: ResultCode = ResultCode::new(MODULE_KERNEL, 106);
pub const INVALID_MEMORY_RANGE: ResultCode = ResultCode::new(MODULE_KERNEL, 110);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_fields() {
        assert_eq!(INVALID_ADDRESS.module(), MODULE_KERNEL);
        assert_eq!(INVALID_ADDRESS.description(), 102);
        assert!(!INVALID_ADDRESS.is_success());
        assert!(ResultCode::SUCCESS.is_success());
    }

    #[test]
    fn test_display_uses_error_code_format() {
        assert_eq!(INVALID_MEMORY_RANGE.to_string(), "2001-0110");
        assert_eq!(ResultCode::SUCCESS.to_string(), "Success");
    }
}
