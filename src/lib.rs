// PhotonDB - Slab Memory Allocator
// Arena-backed size classes serving the in-memory tuple store

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod config;
pub mod logging;
pub mod slab;

// Re-exports for convenience
pub use config::SlabConfig;
pub use error::{AllocError, ConfigError, CorruptionError};
pub use slab::{ArenaSummary, ClassStats, SlabAllocator, SlabStats};

/// Slab allocator error types
pub mod error {
    use thiserror::Error;

    /// Rejected allocator configuration.
    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum ConfigError {
        #[error("Arena of {size} bytes is smaller than two slabs ({min} bytes)")]
        ArenaTooSmall { size: usize, min: usize },

        #[error("Growth factor {0} must be a finite number greater than 1.0")]
        InvalidGrowthFactor(f64),

        #[error("Slab size {0} must be a power of two between 4 KiB and 1 GiB")]
        InvalidSlabSize(usize),

        #[error("Item size ceiling {ceiling} must fit a slab of {slab_size} bytes")]
        InvalidItemCeiling { ceiling: usize, slab_size: usize },

        #[error("Minimal item size {min_item_size} leaves no size class below {ceiling} bytes")]
        EmptyClassTable { min_item_size: usize, ceiling: usize },

        #[error("Delayed free batch must be at least 1")]
        InvalidDrainBatch,

        #[error("Failed to reserve {0} bytes for the arena")]
        Reserve(usize),

        #[error("Invalid configuration: {0}")]
        Parse(String),
    }

    /// Failures surfaced by `alloc`, `free` and the index codec.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum AllocError {
        #[error("Requested {size} bytes for {tag}, largest size class holds {max}")]
        OversizeRequest {
            size: usize,
            max: usize,
            tag: String,
        },

        #[error("Out of memory: failed to allocate {size} bytes for {tag} in slab allocator")]
        OutOfMemory { size: usize, tag: String },

        #[error("Pointer {addr:#x} is not a live item of this allocator")]
        InvalidPointer { addr: usize },

        #[error("Index {0} does not address an item of this allocator")]
        InvalidIndex(u64),
    }

    /// Heap corruption found by a full red zone walk.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum CorruptionError {
        #[error("Red zone overwritten after item {item} of slab {slab} (byte {offset} of the zone)")]
        RedZone {
            slab: usize,
            item: usize,
            offset: usize,
        },
    }

    pub type Result<T> = std::result::Result<T, AllocError>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
