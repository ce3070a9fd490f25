//! Slab allocator statistics
//!
//! Collected by walking every class and the slabs formatted for it. Not on
//! any hot path.

use super::arena::Arena;
use super::size_class::SizeClassTable;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt;
use std::ops::ControlFlow;

/// Usage of one non-empty size class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    pub item_size: usize,
    pub slabs: usize,
    pub items: usize,
    pub bytes_used: usize,
    pub bytes_free: usize,
}

/// Arena-wide totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArenaSummary {
    /// Bytes available to slabs
    pub total_size: usize,
    /// Bytes held by live items, red zones included
    pub total_used: usize,
    /// Virgin watermark: bytes ever carved into slabs
    pub arena_used: usize,
    /// Emptied slabs waiting in the free pool
    pub free_slabs: usize,
}

/// Snapshot of the whole allocator
#[derive(Debug, Clone, Default, Serialize)]
pub struct SlabStats {
    pub classes: Vec<ClassStats>,
    pub arena: ArenaSummary,
}

/// Visit each non-empty class in ascending item size
///
/// The walk stops at the first `ControlFlow::Break` and returns it.
pub(crate) fn for_each_class<B>(
    arena: &Arena,
    classes: &SizeClassTable,
    mut visit: impl FnMut(&ClassStats) -> ControlFlow<B>,
) -> ControlFlow<B> {
    for class in classes.iter() {
        if class.slab_count() == 0 {
            continue;
        }

        let mut st = ClassStats {
            item_size: class.item_size,
            ..ClassStats::default()
        };
        for slab in class.slabs() {
            let header = arena.header(slab);
            st.slabs += 1;
            st.items += header.items;
            st.bytes_used += header.used;
            st.bytes_free += arena.slab_size() - header.used;
        }

        visit(&st)?;
    }
    ControlFlow::Continue(())
}

pub(crate) fn summary(arena: &Arena) -> ArenaSummary {
    ArenaSummary {
        total_size: arena.size(),
        total_used: arena.headers().map(|(_, header)| header.used).sum(),
        arena_used: arena.used(),
        free_slabs: arena.free_slab_count(),
    }
}

impl SlabStats {
    pub(crate) fn collect(arena: &Arena, classes: &SizeClassTable) -> Self {
        let mut stats = SlabStats {
            classes: Vec::new(),
            arena: summary(arena),
        };
        let flow = for_each_class::<Infallible>(arena, classes, |st| {
            stats.classes.push(*st);
            ControlFlow::Continue(())
        });
        match flow {
            ControlFlow::Continue(()) => stats,
            ControlFlow::Break(never) => match never {},
        }
    }

    /// Live items across all classes
    pub fn items(&self) -> usize {
        self.classes.iter().map(|c| c.items).sum()
    }

    /// Share of the arena held by live items, in percent
    pub fn items_used_percent(&self) -> f64 {
        percent(self.arena.total_used, self.arena.total_size)
    }

    /// Share of the arena carved into slabs, in percent
    pub fn arena_used_percent(&self) -> f64 {
        percent(self.arena.arena_used, self.arena.total_size)
    }

    /// Export the snapshot through the `metrics` facade
    ///
    /// No-op unless the host installed a recorder.
    pub fn publish_metrics(&self) {
        metrics::gauge!("photondb_slab_arena_size_bytes").set(self.arena.total_size as f64);
        metrics::gauge!("photondb_slab_arena_used_bytes").set(self.arena.arena_used as f64);
        metrics::gauge!("photondb_slab_items_used_bytes").set(self.arena.total_used as f64);
        metrics::gauge!("photondb_slab_free_slabs").set(self.arena.free_slabs as f64);

        for class in &self.classes {
            let item_size = class.item_size.to_string();
            metrics::gauge!("photondb_slab_class_slabs", "item_size" => item_size.clone())
                .set(class.slabs as f64);
            metrics::gauge!("photondb_slab_class_items", "item_size" => item_size.clone())
                .set(class.items as f64);
            metrics::gauge!("photondb_slab_class_bytes_used", "item_size" => item_size.clone())
                .set(class.bytes_used as f64);
            metrics::gauge!("photondb_slab_class_bytes_free", "item_size" => item_size)
                .set(class.bytes_free as f64);
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

impl fmt::Display for SlabStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "slab statistics:")?;
        writeln!(f, "  classes:")?;
        for c in &self.classes {
            writeln!(
                f,
                "     - {{ item_size: {:<5}, slabs: {:<3}, items: {:<11}, bytes_used: {:<12}, bytes_free: {:<12} }}",
                c.item_size, c.slabs, c.items, c.bytes_used, c.bytes_free
            )?;
        }
        writeln!(f, "  items_used: {:.2}%", self.items_used_percent())?;
        write!(f, "  arena_used: {:.2}%", self.arena_used_percent())
    }
}
