// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Software page table backend for the guest address space.
//!
//! Every guest page maps either into the shared backing memory or to a
//! foreign host pointer. Translations live in a sparse [`PageTable`] holding
//! the host base address of each page (0 for unmapped pages). Protection
//! changes are accepted but not enforced.

use std::ptr::NonNull;

use ruzu_common::{is_page_aligned, page_offset, PAddr, VAddr, PAGE_SHIFT, PAGE_SIZE_U64};

use crate::config::MemoryConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::memory_block::{BackingMemory, MemoryBlock};
use crate::page_table::{PageTable, PAGE_TABLE_VA_BITS};
use crate::range::{HostAddress, HostMemoryRange, MemoryRange};
use crate::translation::{AddressTranslator, HostRegions};
use crate::virtual_memory_manager::{MemoryMapFlags, MemoryPermission, VirtualMemoryManager};

/// Guest address space backed by a software page table.
///
/// Borrows its backing memory exclusively, so the store outlives the manager
/// and no other writer can reach it while references handed out by
/// [`get_ref`](VirtualMemoryManager::get_ref) are alive.
///
/// ```compile_fail
/// use ruzu_memory::{AddressSpaceManager, MemoryBlock};
///
/// let mut block = MemoryBlock::new(0x1000).unwrap();
/// let a = AddressSpaceManager::new(&mut block, 1 << 20).unwrap();
/// let b = AddressSpaceManager::new(&mut block, 1 << 20).unwrap();
/// drop((a, b));
/// ```
pub struct AddressSpaceManager<'b, B: BackingMemory = MemoryBlock> {
    backing: &'b mut B,
    page_table: PageTable<HostAddress>,
    address_space_bits: u32,
    address_space_size: u64,
}

impl<'b, B: BackingMemory> AddressSpaceManager<'b, B> {
    /// Create an empty address space of at least `address_space_size` bytes.
    ///
    /// The size is rounded up to a power of two no smaller than one page.
    pub fn new(backing: &'b mut B, address_space_size: u64) -> MemoryResult<Self> {
        if address_space_size > 1 << PAGE_TABLE_VA_BITS {
            return Err(MemoryError::InvalidSize {
                va: 0,
                size: address_space_size,
            });
        }

        let mut as_size = PAGE_SIZE_U64;
        let mut as_bits = PAGE_SHIFT;
        while as_size < address_space_size {
            as_size <<= 1;
            as_bits += 1;
        }

        log::debug!(
            "AddressSpaceManager::new size={:#X} bits={} backing={:#X}",
            as_size,
            as_bits,
            backing.total_size(),
        );

        Ok(Self {
            backing,
            page_table: PageTable::new(),
            address_space_bits: as_bits,
            address_space_size: as_size,
        })
    }

    /// Create an address space sized by `config`.
    pub fn from_config(backing: &'b mut B, config: &MemoryConfig) -> MemoryResult<Self> {
        Self::new(backing, config.address_space_size)
    }

    /// Address space width in bits.
    pub fn address_space_bits(&self) -> u32 {
        self.address_space_bits
    }

    pub fn backing(&self) -> &B {
        &*self.backing
    }

    /// Validate a page-granular `[va, va + size)` before touching the table.
    fn validate_mapping(&self, va: VAddr, size: u64) -> MemoryResult<()> {
        if !is_page_aligned(va) {
            return Err(MemoryError::InvalidAddress(va));
        }
        if !is_page_aligned(size) {
            return Err(MemoryError::InvalidSize { va, size });
        }
        self.assert_valid_address_and_size(va, size)
    }

    /// Point every page of `[va, va + size)` at consecutive host pages
    /// starting at `host`.
    fn map_pages(&mut self, va: VAddr, host: HostAddress, size: u64) {
        let mut offset = 0;
        while offset < size {
            self.page_table.map(va + offset, host + offset as usize);
            offset += PAGE_SIZE_U64;
        }
    }
}

impl<B: BackingMemory> AddressTranslator for AddressSpaceManager<'_, B> {
    #[inline]
    fn address_space_size(&self) -> u64 {
        self.address_space_size
    }

    #[inline]
    fn is_mapped(&self, va: VAddr) -> bool {
        self.validate_address(va) && self.page_table.read(va) != 0
    }

    #[inline]
    fn translate_unchecked(&self, va: VAddr) -> HostAddress {
        self.page_table
            .read(va)
            .wrapping_add(page_offset(va) as usize)
    }

    unsafe fn host_view(&self, host: HostAddress, len: usize) -> &[u8] {
        if len == 0 {
            return &[];
        }
        // SAFETY: upheld by the caller.
        unsafe { std::slice::from_raw_parts(host as *const u8, len) }
    }

    unsafe fn host_view_mut(&mut self, host: HostAddress, len: usize) -> &mut [u8] {
        if len == 0 {
            return &mut [];
        }
        // SAFETY: upheld by the caller.
        unsafe { std::slice::from_raw_parts_mut(host as *mut u8, len) }
    }
}

impl<B: BackingMemory> VirtualMemoryManager for AddressSpaceManager<'_, B> {
    fn uses_private_allocations(&self) -> bool {
        false
    }

    /// `flags` is accepted for parity with other backends and ignored.
    fn map(&mut self, va: VAddr, pa: PAddr, size: u64, _flags: MemoryMapFlags) -> MemoryResult<()> {
        self.validate_mapping(va, size)?;
        if size == 0 {
            return Ok(());
        }
        // Resolving the whole physical range first keeps a bad `pa` from
        // leaving a partial mapping behind.
        let host = self.backing.pointer_at(pa, size as usize)?;
        self.map_pages(va, host, size);

        log::debug!(
            "AddressSpaceManager::map [{:#010X}..{:#010X}) -> pa {:#X}",
            va,
            va + size,
            pa,
        );
        Ok(())
    }

    unsafe fn map_foreign(&mut self, va: VAddr, host: NonNull<u8>, size: u64) -> MemoryResult<()> {
        self.validate_mapping(va, size)?;
        let host = host.as_ptr() as HostAddress;
        if host.checked_add(size as usize).is_none() {
            return Err(MemoryError::InvalidSize { va, size });
        }
        self.map_pages(va, host, size);

        log::debug!(
            "AddressSpaceManager::map_foreign [{:#010X}..{:#010X}) -> host {:#X}",
            va,
            va + size,
            host,
        );
        Ok(())
    }

    fn unmap(&mut self, va: VAddr, size: u64) -> MemoryResult<()> {
        self.validate_mapping(va, size)?;

        let mut offset = 0;
        while offset < size {
            self.page_table.unmap(va + offset);
            offset += PAGE_SIZE_U64;
        }

        log::debug!(
            "AddressSpaceManager::unmap [{:#010X}..{:#010X})",
            va,
            va + size,
        );
        Ok(())
    }

    fn get_host_regions(
        &self,
        va: VAddr,
        size: u64,
    ) -> MemoryResult<impl Iterator<Item = HostMemoryRange> + '_> {
        self.check_range_mapped(va, size)?;
        log::trace!("get_host_regions [{:#010X}..+{:#X})", va, size);
        Ok(HostRegions::new(self, va, size))
    }

    fn get_physical_regions(
        &self,
        va: VAddr,
        size: u64,
    ) -> MemoryResult<impl Iterator<Item = MemoryRange> + '_> {
        let backing: &B = &*self.backing;
        let base = backing.base_pointer();
        let total = backing.total_size();
        let regions = self.get_host_regions(va, size)?;
        // Host contiguity can run past the end of the store into foreign
        // memory; only the part inside the store is physical.
        Ok(regions.filter_map(move |region| {
            if !backing.contains_host(region.address) {
                return None;
            }
            let offset = region.address - base;
            let size = region.size.min((total - offset) as u64);
            Some(MemoryRange::new(offset as u64, size))
        }))
    }

    /// Protection is not enforced by this backend.
    fn reprotect(
        &mut self,
        _va: VAddr,
        _size: u64,
        _protection: MemoryPermission,
    ) -> MemoryResult<()> {
        Ok(())
    }

    fn tracking_reprotect(
        &mut self,
        _va: VAddr,
        _size: u64,
        _protection: MemoryPermission,
        _guest: bool,
    ) -> MemoryResult<()> {
        Err(MemoryError::NotSupported("tracking reprotect"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
