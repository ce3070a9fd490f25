//! Slab allocator implementation

use super::arena::Arena;
use super::delayed::{DelayedFreeQueue, QueueFull};
use super::header::RED_ZONE;
use super::index::{IndexCodec, ItemIndex};
use super::size_class::SizeClassTable;
use super::stats::{self, ArenaSummary, ClassStats, SlabStats};
use crate::config::SlabConfig;
use crate::error::{AllocError, ConfigError, Result};
use std::mem::size_of;
use std::ops::ControlFlow;
use std::ptr::NonNull;
use tracing::{debug, error, info, warn};

/// Slab allocator for in-memory tuples
///
/// Owns one arena for its whole lifetime. Not thread-safe: callers run on a
/// single cooperative scheduler or serialize access themselves.
///
/// Every method that changes allocator state takes `&mut self`, so an error
/// path can never re-enter the allocator while its lists are mid-update.
#[derive(Debug)]
pub struct SlabAllocator {
    config: SlabConfig,
    arena: Arena,
    classes: SizeClassTable,
    codec: IndexCodec,
    batch_mode: bool,
    delayed: DelayedFreeQueue,
}

impl SlabAllocator {
    /// Create an allocator over `total_size` bytes with default settings
    /// for everything but the class table
    ///
    /// # Arguments
    /// * `total_size` - Arena size, at least two slabs
    /// * `min_item_size` - Item size of the smallest class
    /// * `growth_factor` - Ratio between neighbouring classes, above 1.0
    pub fn init(
        total_size: usize,
        min_item_size: usize,
        growth_factor: f64,
    ) -> std::result::Result<Self, ConfigError> {
        Self::new(SlabConfig::new(total_size, min_item_size, growth_factor))
    }

    /// Create an allocator from a full configuration
    pub fn new(config: SlabConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let classes = SizeClassTable::new(
            config.min_item_size,
            config.growth_factor,
            config.max_item_size,
            config.slab_size,
        )
        .ok_or(ConfigError::EmptyClassTable {
            min_item_size: config.min_item_size,
            ceiling: config.max_item_size,
        })?;

        let arena = Arena::new(config.arena_size, config.slab_size)?;
        let codec = IndexCodec::new(classes.max_items_per_slab());
        let delayed = DelayedFreeQueue::new(config.delayed_queue_capacity, config.max_delayed_frees);

        info!(
            arena_size = arena.size(),
            slab_size = config.slab_size,
            classes = classes.len(),
            max_item_size = classes.max_item_size(),
            "Initializing slab allocator"
        );
        debug!(sizes = ?classes.item_sizes(), "Slab size classes");

        Ok(Self {
            config,
            arena,
            classes,
            codec,
            batch_mode: false,
            delayed,
        })
    }

    /// Release the arena
    pub fn destroy(self) {
        drop(self);
    }

    pub fn config(&self) -> &SlabConfig {
        &self.config
    }

    pub fn size_classes(&self) -> &SizeClassTable {
        &self.classes
    }

    /// Largest request `alloc` accepts
    pub fn max_item_size(&self) -> usize {
        self.classes.max_item_size()
    }

    /// Usable bytes of an item allocated for `size`, if `size` is accepted
    pub fn item_size_for(&self, size: usize) -> Option<usize> {
        self.classes
            .cache_for(size)
            .map(|class| self.classes.get(class).item_size)
    }

    /// Allocate `size` bytes
    ///
    /// `tag` names the caller in logs and errors only. Unless batch mode is
    /// on, a bounded batch of delayed frees runs first.
    pub fn alloc(&mut self, size: usize, tag: &str) -> Result<NonNull<u8>> {
        let Some(class) = self.classes.cache_for(size) else {
            let max = self.classes.max_item_size();
            warn!(size, max, tag, "Oversize slab allocation request");
            return Err(AllocError::OversizeRequest {
                size,
                max,
                tag: tag.to_string(),
            });
        };

        if !self.batch_mode {
            self.drain(self.config.delayed_free_batch);
        }

        let Some(slab) = self.arena.get_slab_for(&mut self.classes, class) else {
            error!(
                size,
                tag,
                arena_used = self.arena.used(),
                free_slabs = self.arena.free_slab_count(),
                "Slab arena exhausted"
            );
            return Err(AllocError::OutOfMemory {
                size,
                tag: tag.to_string(),
            });
        };

        Ok(self.allocate_item(class, slab))
    }

    fn allocate_item(&mut self, class: usize, slab: usize) -> NonNull<u8> {
        let (item_size, stride) = {
            let class = self.classes.get(class);
            (class.item_size, class.stride)
        };
        let slab_size = self.arena.slab_size();

        let header = self.arena.header_mut(slab);
        let (offset, fresh) = header.take_item(stride);
        let full = header.is_full(stride, slab_size);

        if fresh && !RED_ZONE.is_empty() {
            self.arena.write(slab, offset + item_size, RED_ZONE);
        }
        if full {
            self.classes.get_mut(class).mark_full(slab);
        }

        self.arena.ptr_at(slab, offset)
    }

    /// Free an item returned by [`alloc`](Self::alloc)
    ///
    /// In batch mode the pointer is only queued; failing to queue it is
    /// `OutOfMemory`, as a dropped free would leak the item for good.
    /// Freeing an item twice is `InvalidPointer`.
    pub fn free(&mut self, ptr: NonNull<u8>, tag: &str) -> Result<()> {
        if self.batch_mode {
            let (slab, offset, class) = self.resolve(ptr)?;
            self.delayed.push(ptr).map_err(|reason| {
                let size = match reason {
                    QueueFull::Grow { capacity } => capacity * size_of::<NonNull<u8>>(),
                    QueueFull::Limit { limit } => (limit + 1) * size_of::<NonNull<u8>>(),
                };
                error!(?reason, pending = self.delayed.len(), tag, "Delayed free queue is full");
                AllocError::OutOfMemory {
                    size,
                    tag: tag.to_string(),
                }
            })?;
            // Queued items are no longer the caller's; a second free of the
            // same pointer fails the ownership check
            let stride = self.classes.get(class).stride;
            self.arena.header_mut(slab).retire(offset, stride);
            return Ok(());
        }

        self.drain(self.config.delayed_free_batch);
        let (slab, offset, class) = self.resolve(ptr)?;
        self.release(slab, offset, class);
        Ok(())
    }

    /// Execute a free queued in batch mode
    fn free_pending(&mut self, ptr: NonNull<u8>) -> Result<()> {
        let invalid = || AllocError::InvalidPointer {
            addr: ptr.as_ptr() as usize,
        };
        let (slab, offset) = self.arena.locate(ptr).ok_or_else(invalid)?;
        let class = self.arena.header(slab).class.ok_or_else(invalid)?;
        self.release(slab, offset, class);
        Ok(())
    }

    fn release(&mut self, slab: usize, offset: usize, class: usize) {
        let stride = self.classes.get(class).stride;
        let slab_size = self.arena.slab_size();

        let header = self.arena.header_mut(slab);
        let was_full = header.is_full(stride, slab_size);
        header.put_item(offset, stride);
        let empty = header.items == 0;

        let size_class = self.classes.get_mut(class);
        if was_full {
            size_class.mark_has_room(slab);
        }
        if empty {
            size_class.detach(slab);
            self.arena.return_slab(slab);
            debug!(slab, class, "Returned empty slab to arena");
        }
    }

    /// Slab ordinal, offset in slab and class of a live item
    fn resolve(&self, ptr: NonNull<u8>) -> Result<(usize, usize, usize)> {
        let invalid = || AllocError::InvalidPointer {
            addr: ptr.as_ptr() as usize,
        };

        let (slab, offset) = self.arena.locate(ptr).ok_or_else(invalid)?;
        let header = self.arena.header(slab);
        let class = header.class.ok_or_else(invalid)?;
        let stride = self.classes.get(class).stride;
        if !header.holds_live(offset, stride) {
            return Err(invalid());
        }
        Ok((slab, offset, class))
    }

    /// Turn batch mode on or off
    ///
    /// Switching it off does not free anything by itself; the queue drains
    /// in batches on the following allocations and frees.
    pub fn set_batch_mode(&mut self, enabled: bool) {
        if self.batch_mode != enabled {
            debug!(enabled, pending = self.delayed.len(), "Slab batch mode changed");
        }
        self.batch_mode = enabled;
    }

    pub fn is_batch_mode(&self) -> bool {
        self.batch_mode
    }

    /// Frees waiting in the delayed queue
    pub fn pending_frees(&self) -> usize {
        self.delayed.len()
    }

    /// Execute up to `max_count` delayed frees in queue order
    ///
    /// Returns how many were executed.
    pub fn drain(&mut self, max_count: usize) -> usize {
        let mut done = 0;
        while done < max_count {
            let Some(ptr) = self.delayed.pop() else {
                break;
            };
            if let Err(err) = self.free_pending(ptr) {
                // Ownership is checked when queued
                error!(%err, "Skipping invalid delayed free");
            }
            done += 1;
        }
        done
    }

    /// Execute every delayed free
    pub fn flush_delayed(&mut self) -> usize {
        self.drain(usize::MAX)
    }

    /// Dense index of a live item
    pub fn to_index(&self, ptr: NonNull<u8>) -> Result<ItemIndex> {
        let (slab, offset, class) = self.resolve(ptr)?;
        let item = offset / self.classes.get(class).stride;
        Ok(self.codec.encode(slab, item))
    }

    /// Item addressed by an index from [`to_index`](Self::to_index)
    pub fn from_index(&self, index: ItemIndex) -> Result<NonNull<u8>> {
        let invalid = || AllocError::InvalidIndex(index.0);

        let (slab, item) = self.codec.decode(index);
        if slab >= self.arena.carved() {
            return Err(invalid());
        }
        let header = self.arena.header(slab);
        let class = header.class.ok_or_else(invalid)?;
        let offset = item * self.classes.get(class).stride;
        if offset >= header.brk {
            return Err(invalid());
        }
        Ok(self.arena.ptr_at(slab, offset))
    }

    /// Walk every red zone, stopping at the first damaged one
    ///
    /// A failure means some caller wrote past its item; the heap should be
    /// treated as corrupt.
    #[cfg(debug_assertions)]
    pub fn validate(&self) -> std::result::Result<(), crate::error::CorruptionError> {
        let mut zone = [0u8; RED_ZONE.len()];

        for (slab, header) in self.arena.headers() {
            let Some(class) = header.class else {
                continue;
            };
            let class = self.classes.get(class);

            for (item, offset) in (0..header.brk).step_by(class.stride).enumerate() {
                self.arena.read(slab, offset + class.item_size, &mut zone);
                if let Some(pos) = zone.iter().zip(RED_ZONE).position(|(a, b)| a != b) {
                    error!(slab, item, item_size = class.item_size, "Slab red zone overwritten");
                    return Err(crate::error::CorruptionError::RedZone {
                        slab,
                        item,
                        offset: pos,
                    });
                }
            }
        }
        Ok(())
    }

    /// Visit per-class statistics of every non-empty class
    ///
    /// Return `ControlFlow::Break` from the visitor to stop early.
    pub fn for_each_class_stat<B>(
        &self,
        visit: impl FnMut(&ClassStats) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        stats::for_each_class(&self.arena, &self.classes, visit)
    }

    /// Arena-wide totals
    pub fn summary(&self) -> ArenaSummary {
        stats::summary(&self.arena)
    }

    /// Get statistics about the allocator
    pub fn stats(&self) -> SlabStats {
        SlabStats::collect(&self.arena, &self.classes)
    }

    /// Live items across all slabs
    pub fn live_items(&self) -> usize {
        self.arena.headers().map(|(_, header)| header.items).sum()
    }

    /// Ordinal of the slab holding `ptr`
    pub fn slab_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.arena.locate(ptr).map(|(slab, _)| slab)
    }

    /// Emptied slabs waiting in the arena's free pool
    pub fn free_slabs(&self) -> &[usize] {
        self.arena.free_slabs()
    }
}

impl Drop for SlabAllocator {
    fn drop(&mut self) {
        if !self.delayed.is_empty() {
            warn!(pending = self.delayed.len(), "Destroying slab allocator with delayed frees pending");
        }
        info!(
            arena_used = self.arena.used(),
            live_items = self.live_items(),
            "Destroying slab allocator"
        );
    }
}
