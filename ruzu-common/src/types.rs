// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Virtual address in guest memory (64-bit).
pub type VAddr = u64;

/// Physical address in guest memory (64-bit).
pub type PAddr = u64;

/// Page size (4 KiB, matching ARM64 / Switch).
pub const PAGE_SIZE: usize = 0x1000;

/// Page size as u64 for address math.
pub const PAGE_SIZE_U64: u64 = PAGE_SIZE as u64;

/// Page shift (log2 of PAGE_SIZE).
pub const PAGE_SHIFT: u32 = 12;

/// Page mask for alignment checks.
pub const PAGE_MASK: u64 = PAGE_SIZE_U64 - 1;

/// Guest address space size: 39-bit (512 GiB).
pub const ADDRESS_SPACE_SIZE: u64 = 1 << 39;

/// Align a value up to the given power-of-two alignment.
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// Align a value down to the given power-of-two alignment.
#[inline]
pub const fn align_down(value: u64, alignment: u64) -> u64 {
    value & !(alignment - 1)
}

/// Check if a value is page-aligned.
#[inline]
pub const fn is_page_aligned(value: u64) -> bool {
    value & PAGE_MASK == 0
}

/// Index of the page containing `va`.
#[inline]
pub const fn page_index(va: VAddr) -> u64 {
    va >> PAGE_SHIFT
}

/// Byte offset of `va` within its page.
#[inline]
pub const fn page_offset(va: VAddr) -> u64 {
    va & PAGE_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, PAGE_SIZE_U64), 0);
        assert_eq!(align_up(1, PAGE_SIZE_U64), PAGE_SIZE_U64);
        assert_eq!(align_up(PAGE_SIZE_U64, PAGE_SIZE_U64), PAGE_SIZE_U64);
        assert_eq!(align_up(10_000, PAGE_SIZE_U64), 3 * PAGE_SIZE_U64);
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(0, PAGE_SIZE_U64), 0);
        assert_eq!(align_down(PAGE_SIZE_U64 - 1, PAGE_SIZE_U64), 0);
        assert_eq!(align_down(0x1_2345, PAGE_SIZE_U64), 0x1_2000);
    }

    #[test]
    fn test_page_split() {
        assert_eq!(page_index(0x1_2345), 0x12);
        assert_eq!(page_offset(0x1_2345), 0x345);
        assert!(is_page_aligned(0x8000));
        assert!(!is_page_aligned(0x8001));
    }
}
