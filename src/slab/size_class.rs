//! Size class management for slab allocator

use super::header::RED_ZONE;
use indexmap::IndexSet;
use std::mem::size_of;

/// Upper bound on the number of size classes
pub const MAX_CLASSES: usize = 256;

const PTR_SIZE: usize = size_of::<usize>();

/// A size class owns the slabs currently formatted for one item size
///
/// Slabs are referenced by their ordinal in the arena. `slabs` lists every
/// slab formatted for this class, `slabs_with_room` the subset that can still
/// serve an allocation without touching the arena.
#[derive(Debug)]
pub struct SizeClass {
    /// Usable bytes per item
    pub item_size: usize,
    /// Bytes one item occupies in a slab, red zone included
    pub stride: usize,
    slabs: IndexSet<usize>,
    slabs_with_room: IndexSet<usize>,
}

impl SizeClass {
    pub fn new(item_size: usize) -> Self {
        Self {
            item_size,
            stride: item_size + RED_ZONE.len(),
            slabs: IndexSet::new(),
            slabs_with_room: IndexSet::new(),
        }
    }

    /// Items of this class that fit in one slab
    pub fn items_per_slab(&self, slab_size: usize) -> usize {
        slab_size / self.stride
    }

    /// Slab to serve the next allocation from, if any has room
    ///
    /// Picks the most recently listed slab so a freshly formatted slab keeps
    /// serving until it fills up.
    pub fn slab_with_room(&self) -> Option<usize> {
        self.slabs_with_room.last().copied()
    }

    /// Register a slab just formatted for this class
    pub(crate) fn attach(&mut self, slab: usize) {
        self.slabs.insert(slab);
        self.slabs_with_room.insert(slab);
    }

    /// Forget an emptied slab
    pub(crate) fn detach(&mut self, slab: usize) {
        self.slabs.swap_remove(&slab);
        self.slabs_with_room.swap_remove(&slab);
    }

    pub(crate) fn mark_full(&mut self, slab: usize) {
        self.slabs_with_room.swap_remove(&slab);
    }

    pub(crate) fn mark_has_room(&mut self, slab: usize) {
        self.slabs_with_room.insert(slab);
    }

    /// Slabs formatted for this class, in listing order
    pub fn slabs(&self) -> impl Iterator<Item = usize> + '_ {
        self.slabs.iter().copied()
    }

    /// Number of slabs formatted for this class
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Number of slabs that can still serve an allocation
    pub fn room_count(&self) -> usize {
        self.slabs_with_room.len()
    }
}

/// Calculate item sizes for the class table
///
/// Each class grows by `factor` over the previous one, but by at least one
/// pointer, and is aligned down to the pointer size. Classes stop once an
/// item plus its red zone would exceed `ceiling`; a last class sized to the
/// ceiling itself is appended so the whole configured range is served.
pub fn calculate_size_classes(min_item_size: usize, factor: f64, ceiling: usize) -> Vec<usize> {
    let mut classes = Vec::new();
    let mut size = min_item_size.max(PTR_SIZE);

    while classes.len() < MAX_CLASSES && size + RED_ZONE.len() <= ceiling {
        classes.push(size);
        let grown = ((size as f64 * factor) as usize) & !(PTR_SIZE - 1);
        size = grown.max((size + PTR_SIZE) & !(PTR_SIZE - 1));
    }

    let top = ceiling.saturating_sub(RED_ZONE.len()) & !(PTR_SIZE - 1);
    if classes.len() < MAX_CLASSES && classes.last().is_some_and(|&last| last < top) {
        classes.push(top);
    }

    classes
}

/// The fixed, ascending table of size classes
#[derive(Debug)]
pub struct SizeClassTable {
    classes: Vec<SizeClass>,
    max_items_per_slab: usize,
}

impl SizeClassTable {
    /// Build the table; `None` if no class fits under the ceiling
    pub fn new(min_item_size: usize, factor: f64, ceiling: usize, slab_size: usize) -> Option<Self> {
        let classes: Vec<SizeClass> = calculate_size_classes(min_item_size, factor, ceiling)
            .into_iter()
            .map(SizeClass::new)
            .collect();

        let smallest = classes.first()?;
        let max_items_per_slab = smallest.items_per_slab(slab_size);

        Some(Self {
            classes,
            max_items_per_slab,
        })
    }

    /// Smallest class whose items hold `size` bytes
    pub fn cache_for(&self, size: usize) -> Option<usize> {
        let idx = self.classes.partition_point(|class| class.item_size < size);
        (idx < self.classes.len()).then_some(idx)
    }

    /// Item capacity of a slab of the smallest class
    ///
    /// No other class fits more items in a slab, so this bounds every item
    /// ordinal and is the stride of the index codec.
    pub fn max_items_per_slab(&self) -> usize {
        self.max_items_per_slab
    }

    /// Item size of the largest class
    pub fn max_item_size(&self) -> usize {
        self.classes.last().map_or(0, |class| class.item_size)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SizeClass> {
        self.classes.iter()
    }

    pub fn get(&self, index: usize) -> &SizeClass {
        &self.classes[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut SizeClass {
        &mut self.classes[index]
    }

    /// Item sizes of all classes, ascending
    pub fn item_sizes(&self) -> Vec<usize> {
        self.classes.iter().map(|class| class.item_size).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLAB: usize = 1 << 22;

    #[test]
    fn test_first_class_is_at_least_a_pointer() {
        let classes = calculate_size_classes(1, 2.0, 1 << 20);
        assert_eq!(classes[0], PTR_SIZE);
    }

    #[test]
    fn test_calculate_size_classes() {
        let classes = calculate_size_classes(64, 1.2, 1 << 16);

        // Should start with 64
        assert_eq!(classes[0], 64);

        // Strictly ascending and pointer aligned
        for pair in classes.windows(2) {
            assert!(pair[1] > pair[0]);
            assert_eq!(pair[1] % PTR_SIZE, 0);
        }

        // Below the top class each step grows by roughly the factor
        let body = &classes[..classes.len() - 1];
        for pair in body.windows(2) {
            let ratio = pair[1] as f64 / pair[0] as f64;
            assert!(ratio <= 1.25, "Ratio: {}", ratio);
        }

        // Largest class sits right under the ceiling
        let top = *classes.last().unwrap();
        assert!(top + RED_ZONE.len() <= 1 << 16);
        assert!(top + RED_ZONE.len() + PTR_SIZE > 1 << 16);
    }

    #[test]
    fn test_small_factor_still_grows_by_a_pointer() {
        let classes = calculate_size_classes(8, 1.01, 1 << 20);
        assert_eq!(&classes[..4], &[8, 16, 24, 32]);
        assert_eq!(classes.len(), MAX_CLASSES);
    }

    #[test]
    fn test_one_megabyte_ceiling() {
        let classes = calculate_size_classes(8, 1.25, 1 << 20);
        let top = *classes.last().unwrap();
        if RED_ZONE.is_empty() {
            assert_eq!(top, 1_048_576);
        } else {
            assert_eq!(top, 1_048_568);
        }
        // The grown class just below the top one
        assert_eq!(classes[classes.len() - 2], 964_008);
    }

    #[test]
    fn test_cache_for() {
        let table = SizeClassTable::new(8, 2.0, 1024, SLAB).unwrap();
        assert_eq!(table.get(0).item_size, 8);

        assert_eq!(table.cache_for(0), Some(0));
        assert_eq!(table.cache_for(8), Some(0));
        assert_eq!(table.cache_for(9), Some(1));
        assert_eq!(table.get(1).item_size, 16);
        assert_eq!(table.cache_for(table.max_item_size()), Some(table.len() - 1));
        assert_eq!(table.cache_for(table.max_item_size() + 1), None);
    }

    #[test]
    fn test_max_items_from_smallest_class() {
        let table = SizeClassTable::new(16, 2.0, 4096, SLAB).unwrap();
        assert_eq!(table.max_items_per_slab(), SLAB / (16 + RED_ZONE.len()));
        for class in table.iter() {
            assert!(class.items_per_slab(SLAB) <= table.max_items_per_slab());
        }
    }

    #[test]
    fn test_empty_table() {
        assert!(SizeClassTable::new(4096, 2.0, 1024, SLAB).is_none());
    }

    #[test]
    fn test_room_tracking() {
        let mut sc = SizeClass::new(64);
        sc.attach(3);
        sc.attach(7);
        assert_eq!(sc.slab_with_room(), Some(7));

        sc.mark_full(7);
        assert_eq!(sc.slab_with_room(), Some(3));
        assert_eq!(sc.slab_count(), 2);

        sc.mark_has_room(7);
        assert_eq!(sc.room_count(), 2);

        sc.detach(3);
        sc.detach(7);
        assert_eq!(sc.slab_count(), 0);
        assert_eq!(sc.slab_with_room(), None);
    }
}
