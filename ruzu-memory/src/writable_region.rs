// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::ops::{Deref, DerefMut};

use ruzu_common::VAddr;

use crate::translation::AddressTranslator;

/// Mutable window over guest memory returned by
/// [`AddressTranslator::get_writable_region`].
///
/// A direct region aliases host memory. A buffered region holds a copy of a
/// range that is split across host memory; the copy is written back to the
/// guest when the region is dropped.
pub struct WritableRegion<'a, M: AddressTranslator + ?Sized> {
    inner: Inner<'a, M>,
}

enum Inner<'a, M: AddressTranslator + ?Sized> {
    Direct(&'a mut [u8]),
    Buffered {
        translator: &'a mut M,
        va: VAddr,
        data: Vec<u8>,
    },
}

impl<'a, M: AddressTranslator + ?Sized> WritableRegion<'a, M> {
    pub(crate) fn direct(data: &'a mut [u8]) -> Self {
        Self {
            inner: Inner::Direct(data),
        }
    }

    pub(crate) fn buffered(translator: &'a mut M, va: VAddr, data: Vec<u8>) -> Self {
        Self {
            inner: Inner::Buffered {
                translator,
                va,
                data,
            },
        }
    }

    /// Returns `true` if writes go straight to host memory.
    pub fn is_direct(&self) -> bool {
        matches!(self.inner, Inner::Direct(_))
    }
}

impl<M: AddressTranslator + ?Sized> Deref for WritableRegion<'_, M> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.inner {
            Inner::Direct(data) => &data[..],
            Inner::Buffered { data, .. } => &data[..],
        }
    }
}

impl<M: AddressTranslator + ?Sized> DerefMut for WritableRegion<'_, M> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.inner {
            Inner::Direct(data) => &mut data[..],
            Inner::Buffered { data, .. } => &mut data[..],
        }
    }
}

impl<M: AddressTranslator + ?Sized> Drop for WritableRegion<'_, M> {
    fn drop(&mut self) {
        if let Inner::Buffered {
            translator,
            va,
            data,
        } = &mut self.inner
        {
            if let Err(e) = translator.write(*va, data) {
                log::warn!("WritableRegion: write-back to 0x{:016X} failed: {}", va, e);
            }
        }
    }
}
