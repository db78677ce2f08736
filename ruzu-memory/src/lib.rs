// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Guest virtual address space for ruzu.
//!
//! A sparse [`PageTable`] records where each guest page lives in host memory,
//! [`AddressSpaceManager`] maintains it on top of a [`MemoryBlock`], and the
//! [`AddressTranslator`] trait provides bulk reads, writes, fills and copies
//! for any backend.

pub mod address_space_manager;
pub mod config;
pub mod error;
pub mod memory_block;
pub mod page_table;
pub mod range;
pub mod translation;
pub mod virtual_memory_manager;
pub mod writable_region;

pub use address_space_manager::AddressSpaceManager;
pub use config::{load_config, MemoryConfig};
pub use error::{MemoryError, MemoryResult};
pub use memory_block::{BackingMemory, MemoryBlock};
pub use page_table::PageTable;
pub use range::{HostAddress, HostMemoryRange, MemoryRange};
pub use translation::{AddressTranslator, HostRegions};
pub use virtual_memory_manager::{MemoryMapFlags, MemoryPermission, VirtualMemoryManager};
pub use writable_region::WritableRegion;
