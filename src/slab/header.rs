//! Per-slab bookkeeping
//!
//! Headers live out of band in the arena's header table, indexed by slab
//! ordinal, so slab memory holds nothing but items. The free-list is a stack
//! of item ordinals kept beside the header rather than links threaded
//! through freed items; this costs up to four bytes per freed item and keeps
//! raw pointer work confined to the region. A bitmap of owned items, one bit
//! per item, lets a free of an item nobody owns be rejected.

/// Pattern written after every item in debug builds
#[cfg(debug_assertions)]
pub const RED_ZONE: &[u8] = &[0xfa, 0xfa, 0xfa, 0xfa];

/// Red zones are compiled out of release builds
#[cfg(not(debug_assertions))]
pub const RED_ZONE: &[u8] = &[];

const WORD_BITS: usize = u64::BITS as usize;

/// Bookkeeping for one slab
#[derive(Debug, Default)]
pub struct SlabHeader {
    /// Owning size class; `None` while unformatted or returned to the arena
    pub class: Option<usize>,
    /// Byte offset of the first never-used item within the slab
    pub brk: usize,
    /// Live items
    pub items: usize,
    /// Bytes held by live items, red zones included
    pub used: usize,
    free: Vec<u32>,
    /// One bit per item ordinal below `brk`, set while the item is owned
    live: Vec<u64>,
}

impl SlabHeader {
    /// Prepare the slab to serve items of `class`
    pub fn format(&mut self, class: usize) {
        self.class = Some(class);
        self.brk = 0;
        self.items = 0;
        self.used = 0;
        self.free.clear();
        self.live.clear();
    }

    /// Hand the slab back to the arena
    pub fn clear(&mut self) {
        self.class = None;
        self.free.clear();
        self.free.shrink_to_fit();
        self.live.clear();
        self.live.shrink_to_fit();
    }

    pub fn is_formatted(&self) -> bool {
        self.class.is_some()
    }

    /// Bump cursor can no longer fit an item of `stride` bytes
    pub fn fully_formatted(&self, stride: usize, slab_size: usize) -> bool {
        self.brk + stride > slab_size
    }

    /// No room left: bump area exhausted and nothing on the free-list
    pub fn is_full(&self, stride: usize, slab_size: usize) -> bool {
        self.free.is_empty() && self.fully_formatted(stride, slab_size)
    }

    /// Take an item, returning its byte offset within the slab and whether it
    /// came from the bump cursor (fresh memory)
    ///
    /// The caller guarantees the slab is not full.
    pub fn take_item(&mut self, stride: usize) -> (usize, bool) {
        let (offset, fresh) = match self.free.pop() {
            Some(ordinal) => (ordinal as usize * stride, false),
            None => {
                let offset = self.brk;
                self.brk += stride;
                (offset, true)
            }
        };
        self.set_live(offset / stride, true);
        self.items += 1;
        self.used += stride;
        (offset, fresh)
    }

    /// Put the item at byte `offset` on the free-list
    pub fn put_item(&mut self, offset: usize, stride: usize) {
        debug_assert!(self.items > 0, "free on an empty slab");
        self.set_live(offset / stride, false);
        self.free.push((offset / stride) as u32);
        self.items -= 1;
        self.used -= stride;
    }

    /// Items currently on the free-list
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Give up ownership of an item whose free is deferred
    ///
    /// The item still counts as allocated until [`put_item`](Self::put_item)
    /// runs, but no longer passes [`holds_live`](Self::holds_live).
    pub fn retire(&mut self, offset: usize, stride: usize) {
        self.set_live(offset / stride, false);
    }

    /// Offset is the start of an item currently owned by a caller
    pub fn holds_live(&self, offset: usize, stride: usize) -> bool {
        offset % stride == 0 && offset < self.brk && self.is_live(offset / stride)
    }

    fn is_live(&self, ordinal: usize) -> bool {
        self.live
            .get(ordinal / WORD_BITS)
            .is_some_and(|word| word & (1 << (ordinal % WORD_BITS)) != 0)
    }

    fn set_live(&mut self, ordinal: usize, live: bool) {
        let word = ordinal / WORD_BITS;
        if word >= self.live.len() {
            self.live.resize(word + 1, 0);
        }
        let bit = 1u64 << (ordinal % WORD_BITS);
        if live {
            self.live[word] |= bit;
        } else {
            self.live[word] &= !bit;
        }
    }
}
