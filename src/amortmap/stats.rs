use std::sync::atomic::{AtomicU64, Ordering};

/// A point in time copy of the counters kept by an [`AmortizedMap`](super::AmortizedMap).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MapStats {
    /// The number of times the dirty view replaced the read-only view.
    pub promotions: u64,
    /// The number of dirty views built from a read-only view.
    pub materializations: u64,
    /// The number of keys left out of a dirty view because they were deleted.
    pub expunged: u64,
    /// The number of operations that took the lock to search the dirty view.
    pub dirty_lookups: u64,
    /// Counted misses against the current dirty view.
    pub misses: u64,
    /// Keys in the current read-only view, including deleted ones.
    pub read_only_len: u64,
    /// Keys in the current dirty view, if one exists.
    pub dirty_len: Option<u64>,
    /// If the read-only view is missing keys that the dirty view holds.
    pub amended: bool,
}

/// The lifetime counters, bumped as events happen.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    promotions: AtomicU64,
    materializations: AtomicU64,
    expunged: AtomicU64,
    dirty_lookups: AtomicU64,
}

impl Counters {
    pub(crate) fn promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn materialization(&self, expunged: usize) {
        self.materializations.fetch_add(1, Ordering::Relaxed);
        self.expunged.fetch_add(expunged as u64, Ordering::Relaxed);
    }

    pub(crate) fn dirty_lookup(&self) {
        self.dirty_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fill(&self, stats: &mut MapStats) {
        stats.promotions = self.promotions.load(Ordering::Relaxed);
        stats.materializations = self.materializations.load(Ordering::Relaxed);
        stats.expunged = self.expunged.load(Ordering::Relaxed);
        stats.dirty_lookups = self.dirty_lookups.load(Ordering::Relaxed);
    }
}
