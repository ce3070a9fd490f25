//! Production integration tests for the slab allocator
//!
//! These tests verify real-world usage scenarios with the default 4 MiB slabs

#[cfg(test)]
mod integration {
    use crate::config::SlabConfig;
    use crate::error::AllocError;
    use crate::slab::{SlabAllocator, RED_ZONE};
    use std::collections::BTreeMap;
    use std::ptr::NonNull;

    const SLAB: usize = SlabConfig::DEFAULT_SLAB_SIZE;

    #[test]
    fn test_production_alloc_free_returns_slab() -> crate::error::Result<()> {
        let mut allocator = SlabAllocator::init(2 * SLAB, 8, 1.25).unwrap();

        let a = allocator.alloc(16, "tuple")?;
        let b = allocator.alloc(16, "tuple")?;
        assert_ne!(a, b);
        assert_eq!(allocator.slab_of(a), allocator.slab_of(b));

        allocator.free(a, "tuple")?;
        allocator.free(b, "tuple")?;

        let summary = allocator.summary();
        assert_eq!(summary.total_used, 0);
        assert_eq!(summary.free_slabs, 1);
        assert_eq!(allocator.free_slabs(), &[0]);
        assert!(allocator.stats().classes.is_empty());

        Ok(())
    }

    #[test]
    fn test_production_oversize_boundary() -> crate::error::Result<()> {
        let mut allocator = SlabAllocator::init(2 * SLAB, 8, 1.25).unwrap();

        let expected = if RED_ZONE.is_empty() {
            1_048_576
        } else {
            1_048_568
        };
        assert_eq!(allocator.max_item_size(), expected);

        let big = allocator.alloc(1_000_000, "blob")?;
        assert_eq!(allocator.item_size_for(1_000_000), Some(expected));

        let err = allocator.alloc(2_000_000, "blob").unwrap_err();
        assert!(matches!(err, AllocError::OversizeRequest { size: 2_000_000, .. }));

        allocator.free(big, "blob")?;
        Ok(())
    }

    fn batch_config(drain_batch: usize) -> SlabConfig {
        SlabConfig {
            delayed_free_batch: drain_batch,
            ..SlabConfig::new(4 * SLAB, 8, 1.25)
        }
    }

    #[test]
    fn test_production_batch_mode_matches_immediate() -> crate::error::Result<()> {
        // Immediate frees
        let mut plain = SlabAllocator::new(batch_config(256)).unwrap();
        let ptrs: Vec<_> = (0..200)
            .map(|_| plain.alloc(40, "row"))
            .collect::<crate::error::Result<_>>()?;
        for p in ptrs {
            plain.free(p, "row")?;
        }
        plain.alloc(40, "row")?;

        // Same sequence with frees deferred
        let mut batched = SlabAllocator::new(batch_config(256)).unwrap();
        let ptrs: Vec<_> = (0..200)
            .map(|_| batched.alloc(40, "row"))
            .collect::<crate::error::Result<_>>()?;

        batched.set_batch_mode(true);
        for p in ptrs {
            batched.free(p, "row")?;
        }
        assert_eq!(batched.live_items(), 200);
        assert_eq!(batched.pending_frees(), 200);

        batched.set_batch_mode(false);
        batched.alloc(40, "row")?;
        assert_eq!(batched.pending_frees(), 0);

        assert_eq!(batched.live_items(), 1);
        assert_eq!(batched.stats().classes, plain.stats().classes);
        assert_eq!(batched.summary(), plain.summary());

        Ok(())
    }

    #[test]
    fn test_production_batch_drains_in_bounded_steps() -> crate::error::Result<()> {
        let mut allocator = SlabAllocator::new(batch_config(100)).unwrap();
        let ptrs: Vec<_> = (0..200)
            .map(|_| allocator.alloc(40, "row"))
            .collect::<crate::error::Result<_>>()?;

        allocator.set_batch_mode(true);
        for p in ptrs {
            allocator.free(p, "row")?;
        }

        allocator.set_batch_mode(false);
        allocator.alloc(40, "row")?;
        assert_eq!(allocator.pending_frees(), 100);
        allocator.alloc(40, "row")?;
        assert_eq!(allocator.pending_frees(), 0);
        assert_eq!(allocator.live_items(), 2);

        Ok(())
    }

    #[test]
    fn test_production_empty_slab_serves_other_class() -> crate::error::Result<()> {
        let mut allocator = SlabAllocator::init(4 * SLAB, 8, 1.25).unwrap();

        // Keep one slab busy so the recycled one is not the only slab
        let keep = allocator.alloc(200, "keep")?;

        let rows: Vec<_> = (0..64)
            .map(|_| allocator.alloc(24, "row"))
            .collect::<crate::error::Result<_>>()?;
        let slab = allocator.slab_of(rows[0]).unwrap();
        let watermark = allocator.summary().arena_used;

        for p in rows {
            allocator.free(p, "row")?;
        }
        assert_eq!(allocator.free_slabs(), &[slab]);

        let other = allocator.alloc(4000, "index")?;
        assert_eq!(allocator.slab_of(other), Some(slab));
        assert_eq!(allocator.summary().arena_used, watermark);

        allocator.free(keep, "keep")?;
        allocator.free(other, "index")?;
        Ok(())
    }

    #[test]
    #[allow(unsafe_code)]
    fn test_production_stress() -> crate::error::Result<()> {
        let mut allocator = SlabAllocator::init(32 * SLAB, 16, 1.5).unwrap();
        let mut live: BTreeMap<usize, (NonNull<u8>, usize)> = BTreeMap::new();
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut allocs = 0usize;
        let mut frees = 0usize;

        for step in 0..20_000usize {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;

            if live.is_empty() || seed % 3 != 0 {
                let size = 1 + (seed >> 8) as usize % 2000;
                let p = allocator.alloc(size, "stress")?;
                // SAFETY: p points to at least `size` writable bytes
                unsafe { std::ptr::write_bytes(p.as_ptr(), (step % 251) as u8, size) };
                assert!(live.insert(p.as_ptr() as usize, (p, size)).is_none());
                allocs += 1;
            } else {
                let key = *live.keys().nth((seed >> 16) as usize % live.len()).unwrap();
                let (p, _) = live.remove(&key).unwrap();
                allocator.free(p, "stress")?;
                frees += 1;
            }
        }

        // Live ranges never overlap
        let mut prev_end = 0usize;
        for (&start, &(_, size)) in &live {
            assert!(start >= prev_end, "overlap at {start:#x}");
            prev_end = start + size;
        }

        assert_eq!(allocator.live_items(), allocs - frees);
        let stats = allocator.stats();
        let accounted: usize = stats
            .classes
            .iter()
            .map(|c| c.bytes_used + c.bytes_free)
            .sum();
        assert!(accounted <= stats.arena.total_size);

        #[cfg(debug_assertions)]
        assert!(allocator.validate().is_ok());

        println!("{}", stats);
        Ok(())
    }
}
