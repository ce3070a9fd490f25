//! Raw memory backing the arena
//!
//! The only module allowed to use `unsafe`. Everything above it addresses
//! memory by byte offset and gets pointers back through [`Region::ptr_at`].

#![allow(unsafe_code)]

use crate::error::ConfigError;
use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

/// One zeroed, slab-aligned heap block owned for the allocator's lifetime
pub(crate) struct Region {
    base: NonNull<u8>,
    layout: Layout,
}

impl Region {
    /// Reserve `size` bytes aligned to `align`
    pub(crate) fn reserve(size: usize, align: usize) -> Result<Self, ConfigError> {
        let layout =
            Layout::from_size_align(size, align).map_err(|_| ConfigError::Reserve(size))?;
        if layout.size() == 0 {
            return Err(ConfigError::Reserve(size));
        }
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw).ok_or(ConfigError::Reserve(size))?;
        Ok(Self { base, layout })
    }

    pub(crate) fn len(&self) -> usize {
        self.layout.size()
    }

    pub(crate) fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Pointer to the byte at `offset`
    ///
    /// Panics if `offset` is outside the region.
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset < self.len(), "offset {offset} outside region");
        // SAFETY: offset is in bounds of the allocation, so the result is
        // non-null and derived from the same allocation.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Byte offset of `ptr` from the region base, if it lies inside
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = (ptr.as_ptr() as usize).checked_sub(self.base_addr())?;
        (offset < self.len()).then_some(offset)
    }

    /// Copy `bytes` into the region at `offset`
    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) {
        self.check_span(offset, bytes.len());
        // SAFETY: span checked above; source is a distinct Rust slice.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.as_ptr().add(offset), bytes.len());
        }
    }

    /// Copy `buf.len()` bytes out of the region at `offset`
    pub(crate) fn read(&self, offset: usize, buf: &mut [u8]) {
        self.check_span(offset, buf.len());
        // SAFETY: span checked above; destination is a distinct Rust slice.
        unsafe {
            ptr::copy_nonoverlapping(self.base.as_ptr().add(offset), buf.as_mut_ptr(), buf.len());
        }
    }

    fn check_span(&self, offset: usize, len: usize) {
        let end = offset.checked_add(len);
        assert!(
            end.is_some_and(|end| end <= self.len()),
            "span {offset}+{len} outside region of {} bytes",
            self.len()
        );
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: base was returned by alloc_zeroed with this exact layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region")
            .field("base", &format_args!("{:#x}", self.base_addr()))
            .field("len", &self.len())
            .finish()
    }
}
