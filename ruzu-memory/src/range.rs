// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Contiguous ranges produced by region queries.

/// Address in the emulator's own address space.
pub type HostAddress = usize;

/// A contiguous range of host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostMemoryRange {
    pub address: HostAddress,
    pub size: u64,
}

impl HostMemoryRange {
    pub const fn new(address: HostAddress, size: u64) -> Self {
        Self { address, size }
    }

    /// One past the last host address of the range.
    pub const fn end(&self) -> HostAddress {
        self.address + self.size as usize
    }
}

/// A contiguous range of guest physical memory, as an offset into the
/// backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRange {
    pub address: u64,
    pub size: u64,
}

impl MemoryRange {
    pub const fn new(address: u64, size: u64) -> Self {
        Self { address, size }
    }

    pub const fn end(&self) -> u64 {
        self.address + self.size
    }
}
