// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

use ruzu_common::{error, PAddr, ResultCode, VAddr};

/// Errors returned by the guest address space.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("invalid virtual address 0x{0:016X}")]
    InvalidAddress(VAddr),

    #[error("invalid size 0x{size:X} for region at 0x{va:016X}")]
    InvalidSize { va: VAddr, size: u64 },

    #[error("physical range [0x{pa:X}..+0x{size:X}) is outside the backing memory")]
    InvalidPhysicalAddress { pa: PAddr, size: u64 },

    #[error("address 0x{0:016X} is not mapped")]
    Unmapped(VAddr),

    #[error("memory at 0x{0:016X} is not contiguous")]
    MemoryNotContiguous(VAddr),

    #[error("host address for 0x{0:016X} is misaligned for the requested type")]
    Misaligned(VAddr),

    #[error("{0} is not supported by this backend")]
    NotSupported(&'static str),

    #[error("failed to create backing mmap: {0}")]
    Mmap(#[from] std::io::Error),
}

impl MemoryError {
    /// Kernel result code reported to the guest for this error.
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::InvalidAddress(_) | Self::Misaligned(_) => error::INVALID_ADDRESS,
            Self::InvalidSize { .. } => error::INVALID_SIZE,
            Self::InvalidPhysicalAddress { .. } | Self::MemoryNotContiguous(_) => {
                error::INVALID_MEMORY_RANGE
            }
            Self::Unmapped(_) => error::INVALID_MEMORY_STATE,
            Self::NotSupported(_) => error::NOT_IMPLEMENTED,
            Self::Mmap(_) => error::OUT_OF_MEMORY,
        }
    }
}

impl From<MemoryError> for ResultCode {
    fn from(err: MemoryError) -> Self {
        err.result_code()
    }
}

/// Result alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_mapping() {
        assert_eq!(
            MemoryError::InvalidAddress(0x1000).result_code(),
            error::INVALID_ADDRESS
        );
        assert_eq!(
            MemoryError::InvalidSize { va: 0, size: 1 }.result_code(),
            error::INVALID_SIZE
        );
        assert_eq!(
            ResultCode::from(MemoryError::NotSupported("tracking reprotect")),
            error::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn test_display() {
        let err = MemoryError::Unmapped(0x8000);
        assert_eq!(err.to_string(), "address 0x0000000000008000 is not mapped");
    }
}
