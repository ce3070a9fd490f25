//! Arena: one reservation carved into fixed-size slabs
//!
//! # Architecture
//!
//! ```text
//! base                                              base + size
//!  ├── slab 0 ──┼── slab 1 ──┼── slab 2 ──┼ ... ┼── virgin ──┤
//!  │ class 3    │ free pool  │ class 0    │     │ untouched  │
//!  └────────────┴────────────┴────────────┴─────┴────────────┘
//!                                                ^ used (watermark)
//! ```
//!
//! Slabs below the watermark are either formatted for a size class or parked
//! in the free pool. A slab is found from an item address by plain division
//! of its offset from `base`, and its header by that ordinal.

use super::header::SlabHeader;
use super::region::Region;
use super::size_class::SizeClassTable;
use crate::error::ConfigError;
use std::ptr::NonNull;
use tracing::debug;

/// The arena backing every slab of one allocator
#[derive(Debug)]
pub struct Arena {
    region: Region,
    slab_size: usize,
    /// Virgin watermark: bytes carved into slabs so far
    used: usize,
    /// Headers of every carved slab, indexed by slab ordinal
    slabs: Vec<SlabHeader>,
    /// Emptied slabs waiting to be formatted again (LIFO)
    free_slabs: Vec<usize>,
}

impl Arena {
    /// Reserve `size` bytes, rounded down to whole slabs
    pub fn new(size: usize, slab_size: usize) -> Result<Self, ConfigError> {
        let size = size - size % slab_size;
        if size < slab_size * 2 {
            return Err(ConfigError::ArenaTooSmall {
                size,
                min: slab_size * 2,
            });
        }

        let region = Region::reserve(size, slab_size)?;
        debug!(?region, slab_size, "Reserved slab arena");

        Ok(Self {
            region,
            slab_size,
            used: 0,
            slabs: Vec::with_capacity(size / slab_size),
            free_slabs: Vec::new(),
        })
    }

    /// Total bytes available to slabs
    pub fn size(&self) -> usize {
        self.region.len()
    }

    /// Bytes carved into slabs so far
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn slab_size(&self) -> usize {
        self.slab_size
    }

    /// Number of slabs ever carved from virgin memory
    pub fn carved(&self) -> usize {
        self.slabs.len()
    }

    /// Number of emptied slabs in the free pool
    pub fn free_slab_count(&self) -> usize {
        self.free_slabs.len()
    }

    /// Emptied slabs, most recently returned last
    pub fn free_slabs(&self) -> &[usize] {
        &self.free_slabs
    }

    /// Find a slab that can serve `class`
    ///
    /// Order: a slab of the class with room, then a recycled slab from the
    /// free pool, then fresh memory from the watermark. Recycling first keeps
    /// the touched part of the arena small.
    pub fn get_slab_for(&mut self, classes: &mut SizeClassTable, class: usize) -> Option<usize> {
        if let Some(slab) = classes.get(class).slab_with_room() {
            return Some(slab);
        }

        let slab = match self.free_slabs.pop() {
            Some(slab) => {
                debug!(slab, class, "Reformatting recycled slab");
                slab
            }
            None => {
                let slab = self.carve()?;
                debug!(slab, class, used = self.used, "Carved slab from arena");
                slab
            }
        };

        self.slabs[slab].format(class);
        classes.get_mut(class).attach(slab);
        Some(slab)
    }

    /// Take a never-used slab off the watermark
    fn carve(&mut self) -> Option<usize> {
        if self.size() - self.used < self.slab_size {
            return None;
        }
        let slab = self.slabs.len();
        self.slabs.push(SlabHeader::default());
        self.used += self.slab_size;
        Some(slab)
    }

    /// Park an emptied slab in the free pool; its memory stays reserved
    pub fn return_slab(&mut self, slab: usize) {
        self.slabs[slab].clear();
        self.free_slabs.push(slab);
    }

    pub fn header(&self, slab: usize) -> &SlabHeader {
        &self.slabs[slab]
    }

    pub fn header_mut(&mut self, slab: usize) -> &mut SlabHeader {
        &mut self.slabs[slab]
    }

    /// Headers of all carved slabs, by ordinal
    pub fn headers(&self) -> impl Iterator<Item = (usize, &SlabHeader)> {
        self.slabs.iter().enumerate()
    }

    /// Split an address into slab ordinal and offset within that slab
    ///
    /// `None` if the address is outside the carved part of the arena.
    pub fn locate(&self, ptr: NonNull<u8>) -> Option<(usize, usize)> {
        let offset = self.region.offset_of(ptr)?;
        if offset >= self.used {
            return None;
        }
        Some((offset / self.slab_size, offset % self.slab_size))
    }

    /// Address of the byte at `offset` within `slab`
    pub fn ptr_at(&self, slab: usize, offset: usize) -> NonNull<u8> {
        self.region.ptr_at(slab * self.slab_size + offset)
    }

    pub(crate) fn write(&mut self, slab: usize, offset: usize, bytes: &[u8]) {
        self.region.write(slab * self.slab_size + offset, bytes);
    }

    pub(crate) fn read(&self, slab: usize, offset: usize, buf: &mut [u8]) {
        self.region.read(slab * self.slab_size + offset, buf);
    }
}
