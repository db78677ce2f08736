// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Backend-independent guest memory access.
//!
//! [`AddressTranslator`] needs four things from a backend: whether a page is
//! mapped, how a virtual address translates to a host address, and a
//! shared/mutable view over host memory. Everything else (bounds validation,
//! page-split reads and writes, fills, copies and contiguity checks) is
//! provided on top of those primitives, so every backend shares one bulk
//! access algorithm.

use std::borrow::Cow;

use zerocopy::{FromBytes, Immutable, IntoBytes};

use ruzu_common::{page_offset, VAddr, PAGE_MASK, PAGE_SIZE, PAGE_SIZE_U64};

use crate::error::{MemoryError, MemoryResult};
use crate::range::{HostAddress, HostMemoryRange};
use crate::writable_region::WritableRegion;

/// Largest chunk `fill` and `copy` touch at once.
const MAX_CHUNK_SIZE: u64 = 1 << 24;

/// Number of pages touched by `[va, va + size)` and the page-aligned start.
#[inline]
pub fn pages_count(va: VAddr, size: u64) -> (usize, VAddr) {
    let start = va & !PAGE_MASK;
    let span = (va - start + size + PAGE_MASK) & !PAGE_MASK;
    ((span / PAGE_SIZE_U64) as usize, start)
}

/// Guest memory access built on a backend's translation primitives.
pub trait AddressTranslator {
    /// Size of the virtual address space in bytes.
    fn address_space_size(&self) -> u64;

    /// Returns `true` if the page containing `va` is mapped.
    fn is_mapped(&self, va: VAddr) -> bool;

    /// Host address backing `va`. The result is meaningless for unmapped
    /// pages; use [`translate_checked`](Self::translate_checked) unless the
    /// page is known to be mapped.
    fn translate_unchecked(&self, va: VAddr) -> HostAddress;

    /// Shared view of `len` bytes of host memory.
    ///
    /// # Safety
    ///
    /// `[host, host + len)` must be valid for reads for as long as the
    /// returned slice lives.
    unsafe fn host_view(&self, host: HostAddress, len: usize) -> &[u8];

    /// Mutable view of `len` bytes of host memory.
    ///
    /// # Safety
    ///
    /// `[host, host + len)` must be valid for reads and writes for as long as
    /// the returned slice lives.
    unsafe fn host_view_mut(&mut self, host: HostAddress, len: usize) -> &mut [u8];

    fn translate_checked(&self, va: VAddr) -> MemoryResult<HostAddress> {
        if !self.is_mapped(va) {
            return Err(MemoryError::Unmapped(va));
        }
        Ok(self.translate_unchecked(va))
    }

    // -- Validation ---------------------------------------------------------

    #[inline]
    fn validate_address(&self, va: VAddr) -> bool {
        va < self.address_space_size()
    }

    #[inline]
    fn validate_address_and_size(&self, va: VAddr, size: u64) -> bool {
        va.checked_add(size)
            .is_some_and(|end| end <= self.address_space_size())
    }

    /// Fail with `InvalidAddress` / `InvalidSize` unless `[va, va + size)`
    /// lies inside the address space.
    fn assert_valid_address_and_size(&self, va: VAddr, size: u64) -> MemoryResult<()> {
        if self.validate_address_and_size(va, size) {
            return Ok(());
        }
        if va >= self.address_space_size() {
            Err(MemoryError::InvalidAddress(va))
        } else {
            Err(MemoryError::InvalidSize { va, size })
        }
    }

    /// Fail unless every page of `[va, va + size)` is mapped. Reports the
    /// first unmapped address.
    fn check_range_mapped(&self, va: VAddr, size: u64) -> MemoryResult<()> {
        if size == 0 {
            return Ok(());
        }
        self.assert_valid_address_and_size(va, size)?;

        let (pages, mut page_va) = pages_count(va, size);
        for _ in 0..pages {
            if !self.is_mapped(page_va) {
                return Err(MemoryError::Unmapped(page_va.max(va)));
            }
            page_va += PAGE_SIZE_U64;
        }
        Ok(())
    }

    /// Returns `true` if every page of `[va, va + size)` is mapped. An empty
    /// range is always mapped.
    fn is_range_mapped(&self, va: VAddr, size: u64) -> bool {
        self.check_range_mapped(va, size).is_ok()
    }

    /// Returns `true` if the pages of `[va, va + size)` are backed by one
    /// contiguous stretch of host memory.
    fn is_contiguous(&self, va: VAddr, size: usize) -> bool {
        if !self.validate_address(va) || !self.validate_address_and_size(va, size as u64) {
            return false;
        }

        let (pages, mut page_va) = pages_count(va, size as u64);
        for _ in 1..pages {
            let next_va = page_va + PAGE_SIZE_U64;
            if !self.validate_address(next_va) {
                return false;
            }
            let expected = self.translate_unchecked(page_va).wrapping_add(PAGE_SIZE);
            if self.translate_unchecked(next_va) != expected {
                return false;
            }
            page_va = next_va;
        }
        true
    }

    fn is_contiguous_and_mapped(&self, va: VAddr, size: usize) -> bool {
        self.is_contiguous(va, size) && self.is_range_mapped(va, size as u64)
    }

    // -- Reads --------------------------------------------------------------

    /// Read `data.len()` bytes starting at `va`, splitting at page
    /// boundaries.
    fn read(&self, va: VAddr, data: &mut [u8]) -> MemoryResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.assert_valid_address_and_size(va, data.len() as u64)?;

        let mut offset = 0;
        while offset < data.len() {
            let current = va + offset as u64;
            let chunk = (data.len() - offset).min(PAGE_SIZE - page_offset(current) as usize);

            let host = self.translate_checked(current)?;
            // SAFETY: `host` belongs to a mapped page and `chunk` does not
            // cross its end.
            let src = unsafe { self.host_view(host, chunk) };
            data[offset..offset + chunk].copy_from_slice(src);

            offset += chunk;
        }
        Ok(())
    }

    /// Read a plain-data value from `va`.
    fn read_value<T: FromBytes>(&self, va: VAddr) -> MemoryResult<T> {
        let size = std::mem::size_of::<T>();
        let span = self.get_span(va, size)?;
        T::read_from_bytes(&span).map_err(|_| MemoryError::InvalidSize {
            va,
            size: size as u64,
        })
    }

    /// Bytes of `[va, va + size)`: borrowed straight from host memory when
    /// the range is contiguous, otherwise copied.
    fn get_span(&self, va: VAddr, size: usize) -> MemoryResult<Cow<'_, [u8]>> {
        if size == 0 {
            return Ok(Cow::Borrowed(&[]));
        }

        if self.is_contiguous_and_mapped(va, size) {
            let host = self.translate_unchecked(va);
            // SAFETY: every page in the range is mapped and host contiguous.
            return Ok(Cow::Borrowed(unsafe { self.host_view(host, size) }));
        }

        let mut data = vec![0u8; size];
        self.read(va, &mut data)?;
        Ok(Cow::Owned(data))
    }

    // -- Writes -------------------------------------------------------------

    /// Write `data` starting at `va`. Nothing is written unless the whole
    /// range is mapped.
    fn write(&mut self, va: VAddr, data: &[u8]) -> MemoryResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_range_mapped(va, data.len() as u64)?;

        if self.is_contiguous(va, data.len()) {
            let host = self.translate_unchecked(va);
            // SAFETY: the whole range is mapped and host contiguous.
            unsafe { self.host_view_mut(host, data.len()) }.copy_from_slice(data);
            return Ok(());
        }

        let mut offset = 0;
        while offset < data.len() {
            let current = va + offset as u64;
            let chunk = (data.len() - offset).min(PAGE_SIZE - page_offset(current) as usize);

            let host = self.translate_checked(current)?;
            // SAFETY: `host` belongs to a mapped page and `chunk` does not
            // cross its end.
            unsafe { self.host_view_mut(host, chunk) }
                .copy_from_slice(&data[offset..offset + chunk]);

            offset += chunk;
        }
        Ok(())
    }

    /// Write a plain-data value to `va`.
    fn write_value<T: IntoBytes + Immutable>(&mut self, va: VAddr, value: &T) -> MemoryResult<()> {
        self.write(va, value.as_bytes())
    }

    /// Write `data` to `va` and report whether guest memory changed.
    fn write_with_redundancy_check(&mut self, va: VAddr, data: &[u8]) -> MemoryResult<bool> {
        if data.is_empty() {
            return Ok(false);
        }

        if self.is_contiguous_and_mapped(va, data.len()) {
            let host = self.translate_unchecked(va);
            // SAFETY: the whole range is mapped and host contiguous.
            let target = unsafe { self.host_view_mut(host, data.len()) };
            let changed = target != data;
            if changed {
                target.copy_from_slice(data);
            }
            return Ok(changed);
        }

        self.write(va, data)?;
        Ok(true)
    }

    /// Mutable access to `[va, va + size)`. Contiguous ranges are written in
    /// place; split ranges go through a buffer written back on drop.
    fn get_writable_region(
        &mut self,
        va: VAddr,
        size: usize,
    ) -> MemoryResult<WritableRegion<'_, Self>> {
        if size == 0 {
            return Ok(WritableRegion::direct(&mut []));
        }

        if self.is_contiguous_and_mapped(va, size) {
            let host = self.translate_unchecked(va);
            // SAFETY: the whole range is mapped and host contiguous.
            let data = unsafe { self.host_view_mut(host, size) };
            return Ok(WritableRegion::direct(data));
        }

        let mut data = vec![0u8; size];
        self.read(va, &mut data)?;
        Ok(WritableRegion::buffered(self, va, data))
    }

    /// Set `size` bytes starting at `va` to `value`.
    fn fill(&mut self, va: VAddr, size: u64, value: u8) -> MemoryResult<()> {
        self.check_range_mapped(va, size)?;

        let mut done = 0;
        while done < size {
            let chunk = (size - done).min(MAX_CHUNK_SIZE);
            let mut region = self.get_writable_region(va + done, chunk as usize)?;
            region.fill(value);
            done += chunk;
        }
        Ok(())
    }

    /// Copy `size` bytes from `src` to `dst`. Overlapping ranges behave like
    /// `memmove`.
    fn copy(&mut self, dst: VAddr, src: VAddr, size: u64) -> MemoryResult<()> {
        if size == 0 {
            return Ok(());
        }
        self.check_range_mapped(src, size)?;
        self.check_range_mapped(dst, size)?;

        // Copy from the end when the destination overlaps the source tail.
        let backward = dst > src && dst < src + size;
        let mut buf = vec![0u8; size.min(MAX_CHUNK_SIZE) as usize];

        let mut done = 0;
        while done < size {
            let chunk = (size - done).min(MAX_CHUNK_SIZE);
            let offset = if backward { size - done - chunk } else { done };
            let chunk_buf = &mut buf[..chunk as usize];

            self.read(src + offset, chunk_buf)?;
            self.write(dst + offset, chunk_buf)?;

            done += chunk;
        }
        Ok(())
    }
}

/// Lazily merged host ranges covering a guest virtual range.
///
/// Consecutive pages are merged while each one starts exactly where the
/// previous one ended in host memory. The first range starts at the host
/// address of the first byte and the ranges add up to the requested size.
pub struct HostRegions<'m, M: ?Sized> {
    translator: &'m M,
    va: VAddr,
    remaining: u64,
}

impl<'m, M: AddressTranslator + ?Sized> HostRegions<'m, M> {
    /// Every page of `[va, va + size)` must already be known to be mapped.
    pub(crate) fn new(translator: &'m M, va: VAddr, size: u64) -> Self {
        Self {
            translator,
            va,
            remaining: size,
        }
    }
}

impl<M: AddressTranslator + ?Sized> Iterator for HostRegions<'_, M> {
    type Item = HostMemoryRange;

    fn next(&mut self) -> Option<HostMemoryRange> {
        if self.remaining == 0 {
            return None;
        }

        let start = self.translator.translate_unchecked(self.va);
        let first = self.remaining.min(PAGE_SIZE_U64 - page_offset(self.va));
        let mut size = first;
        let mut expected = start.wrapping_add(first as usize);
        self.va += first;
        self.remaining -= first;

        while self.remaining > 0 {
            let host = self.translator.translate_unchecked(self.va);
            if host != expected {
                break;
            }
            let chunk = self.remaining.min(PAGE_SIZE_U64);
            size += chunk;
            expected = host.wrapping_add(chunk as usize);
            self.va += chunk;
            self.remaining -= chunk;
        }

        Some(HostMemoryRange::new(start, size))
    }
}

impl<M: AddressTranslator + ?Sized> std::iter::FusedIterator for HostRegions<'_, M> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_count() {
        assert_eq!(pages_count(0x1000, 0x1000), (1, 0x1000));
        assert_eq!(pages_count(0x1FFF, 2), (2, 0x1000));
        assert_eq!(pages_count(0x1800, 0x1000), (2, 0x1000));
        assert_eq!(pages_count(0x1000, 0), (0, 0x1000));
        assert_eq!(pages_count(0x1234, 1), (1, 0x1000));
    }
}
