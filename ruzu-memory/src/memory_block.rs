// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host backing memory for guest physical RAM.
//!
//! [`MemoryBlock`] is a single anonymous mapping standing in for the guest's
//! physical memory. Address space managers only see it through the
//! [`BackingMemory`] contract, so other stores can be substituted.

use std::ptr::{self, NonNull};

use memmap2::MmapMut;

use ruzu_common::{align_up, PAddr, PAGE_SIZE_U64};

use crate::error::{MemoryError, MemoryResult};
use crate::range::HostAddress;

/// Contract for the host allocation backing guest physical memory.
pub trait BackingMemory {
    /// Host address of `[pa, pa + size)`. Fails if the range is not entirely
    /// inside the store.
    fn pointer_at(&self, pa: PAddr, size: usize) -> MemoryResult<HostAddress>;

    /// Host address of the first byte of the store.
    fn base_pointer(&self) -> HostAddress;

    /// Size of the store in bytes.
    fn total_size(&self) -> usize;

    /// Returns `true` if `address` points inside the store.
    fn contains_host(&self, address: HostAddress) -> bool {
        let base = self.base_pointer();
        address >= base && address - base < self.total_size()
    }
}

/// Zero-initialized anonymous mapping used as guest physical memory.
pub struct MemoryBlock {
    // Owns the mapping; every access goes through `base`.
    _mmap: MmapMut,
    base: NonNull<u8>,
    size: usize,
}

impl MemoryBlock {
    /// Map `size` bytes (rounded up to the page size) of zeroed memory.
    pub fn new(size: usize) -> MemoryResult<Self> {
        if size == 0 {
            return Err(MemoryError::InvalidSize { va: 0, size: 0 });
        }

        let size = align_up(size as u64, PAGE_SIZE_U64) as usize;
        let mut mmap = MmapMut::map_anon(size)?;
        let base = NonNull::from(&mut mmap[..]).cast::<u8>();

        log::debug!(
            "MemoryBlock::new size={:#X} host=[{:#X}..{:#X})",
            size,
            base.as_ptr() as usize,
            base.as_ptr() as usize + size,
        );

        Ok(Self {
            _mmap: mmap,
            base,
            size,
        })
    }

    /// Pointer to the first byte of the block.
    pub fn pointer(&self) -> NonNull<u8> {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Copy bytes out of the block starting at physical offset `offset`.
    pub fn read(&self, offset: u64, data: &mut [u8]) -> MemoryResult<()> {
        let start = self.check_range(offset, data.len())?;
        // SAFETY: the range was bounds-checked against the live mapping.
        unsafe {
            ptr::copy_nonoverlapping(
                self.base.as_ptr().add(start),
                data.as_mut_ptr(),
                data.len(),
            );
        }
        Ok(())
    }

    /// Copy bytes into the block starting at physical offset `offset`.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> MemoryResult<()> {
        let start = self.check_range(offset, data.len())?;
        // SAFETY: the range was bounds-checked and `&mut self` excludes any
        // outstanding view derived from this block.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.base.as_ptr().add(start), data.len());
        }
        Ok(())
    }

    fn check_range(&self, offset: u64, size: usize) -> MemoryResult<usize> {
        let invalid = MemoryError::InvalidPhysicalAddress {
            pa: offset,
            size: size as u64,
        };
        match offset.checked_add(size as u64) {
            Some(end) if end <= self.size as u64 => Ok(offset as usize),
            _ => Err(invalid),
        }
    }
}

impl BackingMemory for MemoryBlock {
    fn pointer_at(&self, pa: PAddr, size: usize) -> MemoryResult<HostAddress> {
        let start = self.check_range(pa, size)?;
        Ok(self.base.as_ptr() as HostAddress + start)
    }

    fn base_pointer(&self) -> HostAddress {
        self.base.as_ptr() as HostAddress
    }

    fn total_size(&self) -> usize {
        self.size
    }
}

impl std::fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("base", &self.base)
            .field("size", &format_args!("{:#X}", self.size))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruzu_common::PAGE_SIZE;

    #[test]
    fn test_size_rounded_to_page() {
        let block = MemoryBlock::new(PAGE_SIZE + 1).unwrap();
        assert_eq!(block.size(), PAGE_SIZE * 2);
        assert_eq!(block.total_size(), PAGE_SIZE * 2);
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            MemoryBlock::new(0),
            Err(MemoryError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_pointer_at_bounds() {
        let block = MemoryBlock::new(PAGE_SIZE * 4).unwrap();
        let base = block.base_pointer();

        assert_eq!(block.pointer_at(0, PAGE_SIZE).unwrap(), base);
        assert_eq!(
            block.pointer_at(PAGE_SIZE_U64 * 3, PAGE_SIZE).unwrap(),
            base + PAGE_SIZE * 3
        );
        assert!(matches!(
            block.pointer_at(PAGE_SIZE_U64 * 3, PAGE_SIZE + 1),
            Err(MemoryError::InvalidPhysicalAddress { .. })
        ));
        assert!(block.pointer_at(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_read_write() {
        let mut block = MemoryBlock::new(PAGE_SIZE).unwrap();
        let mut buf = [0xFFu8; 4];
        block.read(0x10, &mut buf).unwrap();
        assert_eq!(buf, [0; 4]);

        block.write(0x10, &[1, 2, 3, 4]).unwrap();
        block.read(0x10, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);

        assert!(block.write(PAGE_SIZE_U64 - 2, &[0; 4]).is_err());
    }

    #[test]
    fn test_contains_host() {
        let block = MemoryBlock::new(PAGE_SIZE * 2).unwrap();
        let base = block.base_pointer();
        assert!(block.contains_host(base));
        assert!(block.contains_host(base + PAGE_SIZE * 2 - 1));
        assert!(!block.contains_host(base + PAGE_SIZE * 2));
        assert!(!block.contains_host(base.wrapping_sub(1)));
    }
}
