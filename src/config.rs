//! Slab allocator configuration
//!
//! Values are usually read from the `[slab]` table of the server config file,
//! but every field has a default so an empty table is a valid configuration.
//!
//! ```toml
//! arena_size = 1073741824
//! min_item_size = 64
//! growth_factor = 2.0
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for [`SlabAllocator`](crate::SlabAllocator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlabConfig {
    /// Bytes reserved for the arena, rounded down to whole slabs
    pub arena_size: usize,
    /// Item size of the smallest class (raised to the pointer size)
    pub min_item_size: usize,
    /// Ratio between neighbouring size classes
    pub growth_factor: f64,
    /// Size of one slab; must be a power of two
    pub slab_size: usize,
    /// Largest item stride a class may have (item plus red zone)
    pub max_item_size: usize,
    /// Delayed frees executed before each non-batched alloc/free
    pub delayed_free_batch: usize,
    /// Initial capacity of the delayed free queue, in entries
    pub delayed_queue_capacity: usize,
    /// Hard cap on queued frees; `None` grows until the system allocator fails
    pub max_delayed_frees: Option<usize>,
}

impl SlabConfig {
    /// Default arena: 1 GiB
    pub const DEFAULT_ARENA_SIZE: usize = 1 << 30;
    /// Default slab size: 4 MiB
    pub const DEFAULT_SLAB_SIZE: usize = 1 << 22;
    /// Default per-item ceiling: 1 MiB
    pub const DEFAULT_MAX_ITEM_SIZE: usize = 1 << 20;
    /// Smallest slab size accepted by [`validate`](Self::validate)
    pub const MIN_SLAB_SIZE: usize = 4096;
    /// Largest slab size; keeps item ordinals within `u32`
    pub const MAX_SLAB_SIZE: usize = 1 << 30;

    /// Configuration with the given arena geometry and defaults elsewhere
    pub fn new(arena_size: usize, min_item_size: usize, growth_factor: f64) -> Self {
        Self {
            arena_size,
            min_item_size,
            growth_factor,
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Arena size actually used: whole slabs only
    pub fn usable_arena_size(&self) -> usize {
        self.arena_size - self.arena_size % self.slab_size
    }

    /// Check geometry before anything is reserved
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.slab_size.is_power_of_two()
            || self.slab_size < Self::MIN_SLAB_SIZE
            || self.slab_size > Self::MAX_SLAB_SIZE
        {
            return Err(ConfigError::InvalidSlabSize(self.slab_size));
        }
        if self.arena_size < self.slab_size * 2 {
            return Err(ConfigError::ArenaTooSmall {
                size: self.arena_size,
                min: self.slab_size * 2,
            });
        }
        if !self.growth_factor.is_finite() || self.growth_factor <= 1.0 {
            return Err(ConfigError::InvalidGrowthFactor(self.growth_factor));
        }
        if self.max_item_size == 0 || self.max_item_size > self.slab_size {
            return Err(ConfigError::InvalidItemCeiling {
                ceiling: self.max_item_size,
                slab_size: self.slab_size,
            });
        }
        if self.delayed_free_batch == 0 {
            return Err(ConfigError::InvalidDrainBatch);
        }
        Ok(())
    }
}

impl Default for SlabConfig {
    fn default() -> Self {
        Self {
            arena_size: Self::DEFAULT_ARENA_SIZE,
            min_item_size: 64,
            growth_factor: 2.0,
            slab_size: Self::DEFAULT_SLAB_SIZE,
            max_item_size: Self::DEFAULT_MAX_ITEM_SIZE,
            delayed_free_batch: 100,
            delayed_queue_capacity: 512,
            max_delayed_frees: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SlabConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.usable_arena_size(), 1 << 30);
    }

    #[test]
    fn test_arena_rounded_to_slabs() {
        let config = SlabConfig::new(3 * SlabConfig::DEFAULT_SLAB_SIZE + 17, 8, 1.25);
        assert_eq!(config.usable_arena_size(), 3 * SlabConfig::DEFAULT_SLAB_SIZE);
    }

    #[test]
    fn test_rejects_small_arena() {
        let config = SlabConfig::new(SlabConfig::DEFAULT_SLAB_SIZE * 2 - 1, 8, 1.25);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ArenaTooSmall { .. })
        ));
    }

    #[test]
    fn test_rejects_degenerate_factor() {
        for factor in [1.0, 0.5, f64::NAN, f64::INFINITY] {
            let config = SlabConfig::new(1 << 24, 8, factor);
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidGrowthFactor(_))
            ));
        }
    }

    #[test]
    fn test_rejects_bad_slab_geometry() {
        let mut config = SlabConfig::new(1 << 24, 8, 1.25);
        config.slab_size = 5000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSlabSize(5000))
        ));

        let mut config = SlabConfig::new(1 << 24, 8, 1.25);
        config.max_item_size = config.slab_size + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidItemCeiling { .. })
        ));
    }

    #[test]
    fn test_from_toml() {
        let config = SlabConfig::from_toml_str(
            r#"
            arena_size = 16777216
            min_item_size = 16
            growth_factor = 1.25
            max_delayed_frees = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.arena_size, 16 << 20);
        assert_eq!(config.min_item_size, 16);
        assert_eq!(config.growth_factor, 1.25);
        assert_eq!(config.max_delayed_frees, Some(1024));
        // Untouched fields keep their defaults
        assert_eq!(config.slab_size, SlabConfig::DEFAULT_SLAB_SIZE);
        assert_eq!(config.delayed_free_batch, 100);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        let err = SlabConfig::from_toml_str("growth_factor = \"fast\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
