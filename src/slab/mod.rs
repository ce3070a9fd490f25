//! Slab Allocator
//!
//! Serves small tuple-sized allocations out of one pre-reserved arena.
//! The arena is cut into fixed-size slabs; each slab is formatted for a
//! single size class and hands out items with a bump cursor, reusing freed
//! items LIFO.
//!
//! # Architecture
//!
//! ```text
//! SlabAllocator
//!   ├─→ SizeClassTable   8B → 16B → 24B → ... → 1MB (ascending)
//!   │     └─→ SizeClass(64B)  slabs: [0, 5]  with room: [5]
//!   ├─→ Arena (one reservation, slab-aligned)
//!   │     ├─→ SlabHeader[ordinal]  class, bump cursor, free-list
//!   │     ├─→ free pool            emptied slabs, reformatted on demand
//!   │     └─→ watermark            never-touched memory above it
//!   ├─→ DelayedFreeQueue  frees deferred while batch mode is on
//!   └─→ IndexCodec        item ↔ slab * max_items + item
//! ```
//!
//! A slab moves Unformatted → HasRoom → Full → HasRoom → ... → Empty, and
//! an empty slab goes back to the arena's free pool where any class can
//! pick it up again.

pub mod allocator;
pub mod arena;
pub mod bench;
pub mod delayed;
pub mod header;
pub mod index;
pub mod production_tests;
mod region;
pub mod size_class;
pub mod stats;

pub use allocator::SlabAllocator;
pub use arena::Arena;
pub use delayed::DelayedFreeQueue;
pub use header::{SlabHeader, RED_ZONE};
pub use index::{IndexCodec, ItemIndex};
pub use size_class::{SizeClass, SizeClassTable};
pub use stats::{ArenaSummary, ClassStats, SlabStats};
