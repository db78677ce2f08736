// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Contract shared by guest address space backends.

use std::ptr::NonNull;

use bitflags::bitflags;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use ruzu_common::{PAddr, VAddr};

use crate::error::{MemoryError, MemoryResult};
use crate::range::{HostMemoryRange, MemoryRange};
use crate::translation::AddressTranslator;

bitflags! {
    /// Options for [`VirtualMemoryManager::map`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemoryMapFlags: u32 {
        /// The mapping should get its own private host allocation.
        const PRIVATE = 1;
    }
}

bitflags! {
    /// Guest page permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPermission: u32 {
        const READ    = 1;
        const WRITE   = 2;
        const EXECUTE = 4;

        const READ_WRITE         = Self::READ.bits() | Self::WRITE.bits();
        const READ_EXECUTE       = Self::READ.bits() | Self::EXECUTE.bits();
        const READ_WRITE_EXECUTE = Self::READ.bits() | Self::WRITE.bits() | Self::EXECUTE.bits();
        const NONE               = 0;
    }
}

impl std::fmt::Display for MemoryPermission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = if self.contains(Self::READ) { 'R' } else { '-' };
        let w = if self.contains(Self::WRITE) { 'W' } else { '-' };
        let x = if self.contains(Self::EXECUTE) { 'X' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

/// A guest virtual address space backend.
///
/// Backends differ only in how they store translations and what they
/// enforce; callers can swap one for another without relying on anything
/// beyond the behavior documented here.
pub trait VirtualMemoryManager: AddressTranslator {
    /// Returns `true` if mappings get private host allocations instead of
    /// views into shared backing memory.
    fn uses_private_allocations(&self) -> bool;

    /// Map `[va, va + size)` to guest physical memory starting at `pa`.
    fn map(&mut self, va: VAddr, pa: PAddr, size: u64, flags: MemoryMapFlags) -> MemoryResult<()>;

    /// Map `[va, va + size)` directly to host memory not owned by the
    /// backing store.
    ///
    /// # Safety
    ///
    /// `[host, host + size)` must stay valid for reads and writes until the
    /// range is unmapped or remapped.
    unsafe fn map_foreign(&mut self, va: VAddr, host: NonNull<u8>, size: u64) -> MemoryResult<()>;

    /// Remove the mappings of `[va, va + size)`.
    fn unmap(&mut self, va: VAddr, size: u64) -> MemoryResult<()>;

    /// Reference to a `T` stored at `va`.
    ///
    /// Fails with `MemoryNotContiguous` unless all of `[va, va + size_of::<T>())`
    /// is mapped to one contiguous stretch of host memory. The reference
    /// borrows the manager, so the mapping cannot change while it is alive.
    fn get_ref<T>(&self, va: VAddr) -> MemoryResult<&T>
    where
        T: FromBytes + KnownLayout + Immutable,
    {
        let size = std::mem::size_of::<T>();
        if !self.is_contiguous_and_mapped(va, size) {
            return Err(MemoryError::MemoryNotContiguous(va));
        }
        let host = self.translate_unchecked(va);
        // SAFETY: the whole range is mapped and host contiguous.
        let bytes = unsafe { self.host_view(host, size) };
        T::ref_from_bytes(bytes).map_err(|_| MemoryError::Misaligned(va))
    }

    /// Mutable counterpart of [`get_ref`](Self::get_ref).
    fn get_ref_mut<T>(&mut self, va: VAddr) -> MemoryResult<&mut T>
    where
        T: FromBytes + IntoBytes + KnownLayout,
    {
        let size = std::mem::size_of::<T>();
        if !self.is_contiguous_and_mapped(va, size) {
            return Err(MemoryError::MemoryNotContiguous(va));
        }
        let host = self.translate_unchecked(va);
        // SAFETY: the whole range is mapped and host contiguous.
        let bytes = unsafe { self.host_view_mut(host, size) };
        T::mut_from_bytes(bytes).map_err(|_| MemoryError::Misaligned(va))
    }

    /// Host ranges backing `[va, va + size)`, adjacent pages merged.
    fn get_host_regions(
        &self,
        va: VAddr,
        size: u64,
    ) -> MemoryResult<impl Iterator<Item = HostMemoryRange> + '_>;

    /// Backing-store ranges backing `[va, va + size)`. Parts mapped to
    /// foreign memory are left out.
    fn get_physical_regions(
        &self,
        va: VAddr,
        size: u64,
    ) -> MemoryResult<impl Iterator<Item = MemoryRange> + '_>;

    /// Change the protection of `[va, va + size)`.
    fn reprotect(&mut self, va: VAddr, size: u64, protection: MemoryPermission) -> MemoryResult<()>;

    /// Change the protection used for write tracking of `[va, va + size)`.
    fn tracking_reprotect(
        &mut self,
        va: VAddr,
        size: u64,
        protection: MemoryPermission,
        guest: bool,
    ) -> MemoryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_display() {
        assert_eq!(MemoryPermission::READ_WRITE.to_string(), "RW-");
        assert_eq!(MemoryPermission::READ_EXECUTE.to_string(), "R-X");
        assert_eq!(MemoryPermission::NONE.to_string(), "---");
    }

    #[test]
    fn test_map_flags_default_is_empty() {
        assert!(MemoryMapFlags::default().is_empty());
    }
}
