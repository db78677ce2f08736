// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sparse multi-level page table.
//!
//! Maps a guest virtual page to a value (usually a host base address) using
//! four lazily allocated levels of 512 entries each.
//!
//! Layout: `[L0: 9 bits][L1: 9 bits][L2: 9 bits][L3: 9 bits][Offset: 12 bits]` = 48 bits total.
//!
//! A level only exists while at least one page below it is mapped, so memory
//! use follows the number of mapped regions rather than the size of the
//! address space. `T::default()` is the "unmapped" sentinel.

use ruzu_common::{VAddr, PAGE_SHIFT};

const LEVEL_BITS: u32 = 9;
const LEVEL_SIZE: usize = 1 << LEVEL_BITS;
const LEVEL_MASK: u64 = LEVEL_SIZE as u64 - 1;

/// Number of virtual address bits the table can index.
pub const PAGE_TABLE_VA_BITS: u32 = PAGE_SHIFT + LEVEL_BITS * 4;

const L3_SHIFT: u32 = PAGE_SHIFT;
const L2_SHIFT: u32 = L3_SHIFT + LEVEL_BITS;
const L1_SHIFT: u32 = L2_SHIFT + LEVEL_BITS;
const L0_SHIFT: u32 = L1_SHIFT + LEVEL_BITS;

#[inline]
const fn level_index(va: VAddr, shift: u32) -> usize {
    ((va >> shift) & LEVEL_MASK) as usize
}

trait Level {
    type Entry: Copy + Default + PartialEq;

    fn new() -> Self;
    fn read(&self, va: VAddr) -> Self::Entry;
    fn map(&mut self, va: VAddr, value: Self::Entry);
    /// Clears the entry for `va`. Returns `true` once the level is empty.
    fn unmap(&mut self, va: VAddr) -> bool;
    fn is_empty(&self) -> bool;
}

/// Last level: one value per page.
struct Leaf<T> {
    entries: Box<[T]>,
    live: usize,
}

impl<T: Copy + Default + PartialEq> Level for Leaf<T> {
    type Entry = T;

    fn new() -> Self {
        Self {
            entries: vec![T::default(); LEVEL_SIZE].into_boxed_slice(),
            live: 0,
        }
    }

    #[inline]
    fn read(&self, va: VAddr) -> T {
        self.entries[level_index(va, L3_SHIFT)]
    }

    fn map(&mut self, va: VAddr, value: T) {
        let slot = &mut self.entries[level_index(va, L3_SHIFT)];
        if *slot == T::default() {
            self.live += 1;
        }
        *slot = value;
    }

    fn unmap(&mut self, va: VAddr) -> bool {
        let slot = &mut self.entries[level_index(va, L3_SHIFT)];
        if *slot != T::default() {
            *slot = T::default();
            self.live -= 1;
        }
        self.live == 0
    }

    fn is_empty(&self) -> bool {
        self.live == 0
    }
}

/// Intermediate level indexed by the address bits at `SHIFT`.
struct Directory<C, const SHIFT: u32> {
    children: Box<[Option<Box<C>>]>,
    live: usize,
}

impl<C: Level, const SHIFT: u32> Level for Directory<C, SHIFT> {
    type Entry = C::Entry;

    fn new() -> Self {
        Self {
            children: (0..LEVEL_SIZE).map(|_| None).collect(),
            live: 0,
        }
    }

    #[inline]
    fn read(&self, va: VAddr) -> C::Entry {
        match &self.children[level_index(va, SHIFT)] {
            Some(child) => child.read(va),
            None => C::Entry::default(),
        }
    }

    fn map(&mut self, va: VAddr, value: C::Entry) {
        let slot = &mut self.children[level_index(va, SHIFT)];
        if slot.is_none() {
            *slot = Some(Box::new(C::new()));
            self.live += 1;
        }
        if let Some(child) = slot {
            child.map(va, value);
        }
    }

    fn unmap(&mut self, va: VAddr) -> bool {
        let slot = &mut self.children[level_index(va, SHIFT)];
        let child_empty = match slot.as_mut() {
            Some(child) => child.unmap(va),
            None => return self.live == 0,
        };
        if child_empty {
            *slot = None;
            self.live -= 1;
        }
        self.live == 0
    }

    fn is_empty(&self) -> bool {
        self.live == 0
    }
}

type Root<T> = Directory<Directory<Directory<Leaf<T>, L2_SHIFT>, L1_SHIFT>, L0_SHIFT>;

/// Sparse page table covering [`PAGE_TABLE_VA_BITS`] bits of virtual address.
///
/// Address bits above that width are ignored; callers bound-check first.
pub struct PageTable<T: Copy + Default + PartialEq> {
    root: Root<T>,
}

impl<T: Copy + Default + PartialEq> PageTable<T> {
    pub fn new() -> Self {
        Self {
            root: Root::<T>::new(),
        }
    }

    /// Read the entry for the page containing `va`, or `T::default()` if the
    /// page is not mapped.
    #[inline]
    pub fn read(&self, va: VAddr) -> T {
        self.root.read(va)
    }

    /// Set the entry for the page containing `va`, allocating missing levels.
    pub fn map(&mut self, va: VAddr, value: T) {
        if value == T::default() {
            self.unmap(va);
        } else {
            self.root.map(va, value);
        }
    }

    /// Reset the entry for the page containing `va` and release any level
    /// left empty.
    pub fn unmap(&mut self, va: VAddr) {
        self.root.unmap(va);
    }

    /// Returns `true` if no page is mapped.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl<T: Copy + Default + PartialEq> Default for PageTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruzu_common::PAGE_SIZE_U64;

    #[test]
    fn test_unmapped_reads_default() {
        let pt = PageTable::<usize>::new();
        assert_eq!(pt.read(0), 0);
        assert_eq!(pt.read(0x7FFF_FFFF_F000), 0);
        assert!(pt.is_empty());
    }

    #[test]
    fn test_map_and_read() {
        let mut pt = PageTable::<usize>::new();
        pt.map(0x5000, 0xDEAD_0000);

        assert_eq!(pt.read(0x5000), 0xDEAD_0000);
        // Every offset within the page resolves to the same entry.
        assert_eq!(pt.read(0x5ABC), 0xDEAD_0000);
        assert_eq!(pt.read(0x4FFF), 0);
        assert_eq!(pt.read(0x6000), 0);
    }

    #[test]
    fn test_remap_overwrites() {
        let mut pt = PageTable::<usize>::new();
        pt.map(0x1000, 0xAAAA_0000);
        pt.map(0x1000, 0xBBBB_0000);
        assert_eq!(pt.read(0x1000), 0xBBBB_0000);

        pt.unmap(0x1000);
        assert!(pt.is_empty());
    }

    #[test]
    fn test_sparse_far_apart_pages() {
        let mut pt = PageTable::<usize>::new();
        let low: VAddr = 0x1000;
        let high: VAddr = (1 << (PAGE_TABLE_VA_BITS - 1)) + 0x3000;

        pt.map(low, 0x1111_0000);
        pt.map(high, 0x2222_0000);

        assert_eq!(pt.read(low), 0x1111_0000);
        assert_eq!(pt.read(high), 0x2222_0000);
        assert_eq!(pt.read(high - PAGE_SIZE_U64), 0);
    }

    #[test]
    fn test_levels_released_after_unmap() {
        let mut pt = PageTable::<usize>::new();
        for i in 0..1024u64 {
            pt.map(i * PAGE_SIZE_U64, 0x10_0000 + i as usize * 0x1000);
        }
        assert!(!pt.is_empty());
        assert!(pt.root.live > 0);

        for i in 0..1024u64 {
            pt.unmap(i * PAGE_SIZE_U64);
        }
        assert!(pt.is_empty());
        assert!(pt.root.children.iter().all(Option::is_none));
    }

    #[test]
    fn test_unmap_of_absent_page_is_noop() {
        let mut pt = PageTable::<usize>::new();
        pt.map(0x2000, 0x9000);
        pt.unmap(0x8000_0000);
        assert_eq!(pt.read(0x2000), 0x9000);
    }

    #[test]
    fn test_mapping_sentinel_unmaps() {
        let mut pt = PageTable::<usize>::new();
        pt.map(0x3000, 0x4000);
        pt.map(0x3000, 0);
        assert_eq!(pt.read(0x3000), 0);
        assert!(pt.is_empty());
    }
}
