//! Dense integer addressing of items
//!
//! An item is numbered `slab * max_items_per_slab + item`. The multiplier is
//! one constant for the whole allocator, taken from the smallest class, which
//! packs the most items into a slab. A per-class multiplier would let two
//! slabs of different classes produce overlapping numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Compact reference to an item, stable for the item's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemIndex(pub u64);

impl fmt::Display for ItemIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item#{}", self.0)
    }
}

impl From<u64> for ItemIndex {
    fn from(index: u64) -> Self {
        ItemIndex(index)
    }
}

impl From<ItemIndex> for u64 {
    fn from(index: ItemIndex) -> Self {
        index.0
    }
}

/// Mapping between (slab, item) ordinals and [`ItemIndex`]
#[derive(Debug, Clone, Copy)]
pub struct IndexCodec {
    max_items_per_slab: u64,
}

impl IndexCodec {
    pub fn new(max_items_per_slab: usize) -> Self {
        assert!(max_items_per_slab > 0, "slab must hold at least one item");
        Self {
            max_items_per_slab: max_items_per_slab as u64,
        }
    }

    pub fn max_items_per_slab(&self) -> u64 {
        self.max_items_per_slab
    }

    pub fn encode(&self, slab: usize, item: usize) -> ItemIndex {
        debug_assert!((item as u64) < self.max_items_per_slab);
        ItemIndex(slab as u64 * self.max_items_per_slab + item as u64)
    }

    pub fn decode(&self, index: ItemIndex) -> (usize, usize) {
        (
            (index.0 / self.max_items_per_slab) as usize,
            (index.0 % self.max_items_per_slab) as usize,
        )
    }
}
