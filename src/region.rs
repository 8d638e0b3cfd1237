// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Owned byte region backing a channel: fixed atomic header followed by the
// slot ring. Every execution context that holds a clone of the owning Arc
// reads and writes the same bytes; all coordination goes through the header.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::{Error, Result};

/// Cache-line alignment for the region base, so the header words do not
/// share a line with unrelated allocations.
const REGION_ALIGN: usize = 64;

/// A zero-initialised, heap-allocated shared memory region.
///
/// The region is created once by the channel constructor and dropped when
/// the last `Arc` referencing the owning channel goes away. Interior
/// mutation is done through atomic references and raw slot pointers derived
/// from `base()`; the struct itself hands out only the base pointer.
pub(crate) struct SharedRegion {
    base: NonNull<u8>,
    size: usize,
}

// All mutation goes through atomics or exclusively-owned slots.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Allocate `size` zeroed bytes. Fails if `size` cannot be laid out on
    /// this platform.
    pub(crate) fn alloc(size: usize) -> Result<Self> {
        let layout = Layout::from_size_align(size, REGION_ALIGN)
            .map_err(|_| Error::InvalidLayout("region size overflows the platform word"))?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let base =
            NonNull::new(ptr).ok_or(Error::InvalidLayout("region allocation failed"))?;
        Ok(Self { base, size })
    }

    /// Base pointer of the region. Callers derive header and slot pointers
    /// from it.
    pub(crate) fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // Size/align validated at construction.
        let layout = unsafe { Layout::from_size_align_unchecked(self.size, REGION_ALIGN) };
        unsafe { dealloc(self.base.as_ptr(), layout) };
    }
}
