//! AmortizedMap - a concurrent map for read and update heavy workloads
//!
//! An [AmortizedMap] is used in place of a `RwLock<HashMap>` when almost every
//! operation is a read or an overwrite of a key that already exists, and new
//! keys are rare.
//!
//! The map keeps two views of its contents. The read-only view is an immutable
//! map of keys to shared value slots, published through an epoch protected
//! atomic pointer. Reads, and writes to keys it already holds, never take a
//! lock. New keys go to a mutex guarded dirty view, which is built from the
//! read-only view the first time a new key arrives.
//!
//! Every operation that has to search the dirty view under the lock counts as
//! a miss. Once the misses reach the size of the dirty view, the dirty view
//! is promoted to be the new read-only view. This bounds the locked work to a
//! constant per write, amortized over the life of each dirty view.
//!
//! Deleted keys are not removed from either view. Their slot is emptied, and
//! when the next dirty view is built, empty slots are marked expunged and left
//! behind so they fall out at the following promotion.
//!
//! # Examples
//! ```
//! use amortkv::amortmap::AmortizedMap;
//!
//! let map: AmortizedMap<String, u64> = AmortizedMap::new();
//! map.insert("a".to_string(), 1);
//! assert_eq!(map.get("a"), Some(1));
//! assert_eq!(map.remove("a"), Some(1));
//! assert_eq!(map.get("a"), None);
//! ```

mod entry;
/// Counters for [AmortizedMap]
pub mod stats;
mod view;

use self::entry::{Entry, EntryState};
use self::stats::{Counters, MapStats};
use self::view::{DirtyView, ReadOnlyView};
use crate::error::BackendError;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use crossbeam_utils::CachePadded;
use std::borrow::Borrow;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

/// Which dirty view searches count toward promotion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MissPolicy {
    /// Only searches that found the key in the dirty view.
    #[default]
    DirtyHits,
    /// Every search of the dirty view, even when the key was not there. This
    /// promotes more eagerly under workloads that probe absent keys.
    AllLookups,
}

impl FromStr for MissPolicy {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hits" => Ok(MissPolicy::DirtyHits),
            "all" => Ok(MissPolicy::AllLookups),
            _ => Err(BackendError::InvalidProperty {
                name: "miss_policy".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// A configurable builder for an [AmortizedMap].
#[derive(Debug, Default, Clone)]
pub struct AmortizedMapBuilder {
    capacity: Option<usize>,
    miss_policy: MissPolicy,
}

impl AmortizedMapBuilder {
    /// Create a new builder with the default miss policy and no preallocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preallocate the initial read-only view for `capacity` keys.
    #[must_use]
    pub fn set_capacity(self, capacity: usize) -> Self {
        AmortizedMapBuilder {
            capacity: Some(capacity),
            miss_policy: self.miss_policy,
        }
    }

    /// Choose which dirty view searches count toward promotion.
    #[must_use]
    pub fn set_miss_policy(self, miss_policy: MissPolicy) -> Self {
        AmortizedMapBuilder {
            capacity: self.capacity,
            miss_policy,
        }
    }

    /// Build the map.
    pub fn build<K, V>(self) -> AmortizedMap<K, V>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        AmortizedMap {
            read_only: Atomic::new(ReadOnlyView::new(self.capacity.unwrap_or(0))),
            dirty: Mutex::new(None),
            misses: CachePadded::new(AtomicUsize::new(0)),
            miss_policy: self.miss_policy,
            counters: Counters::default(),
        }
    }
}

/// A concurrent map with lock free reads and lock free overwrites of existing
/// keys. See the [module documentation](self) for how it works.
pub struct AmortizedMap<K, V> {
    read_only: Atomic<ReadOnlyView<K, V>>,
    // The dirty view exists exactly while the read-only view is amended.
    dirty: Mutex<Option<DirtyView<K, V>>>,
    // Only reset under the dirty lock.
    misses: CachePadded<AtomicUsize>,
    miss_policy: MissPolicy,
    counters: Counters,
}

impl<K, V> Default for AmortizedMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> AmortizedMap<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create an empty map with the default configuration.
    pub fn new() -> Self {
        AmortizedMapBuilder::new().build()
    }

    /// Retrieve a copy of the value for `k`.
    pub fn get<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let guard = &epoch::pin();
        self.search(k, guard).cloned()
    }

    /// Assert if a key exists in the map.
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = &epoch::pin();
        self.search(k, guard).is_some()
    }

    /// Insert or overwrite the value for `k`, returning the previous value.
    pub fn insert(&self, k: K, v: V) -> Option<V>
    where
        V: Clone,
    {
        let guard = &epoch::pin();

        let (entry, _) = self.load_read_only(guard).lookup(&k);
        let v = match entry {
            Some(entry) => match entry.compare_and_set_if_not_expunged(v, guard) {
                Ok(prev) => return prev.cloned(),
                Err(v) => v,
            },
            None => v,
        };

        let mut dirty = self.lock_dirty();
        let read_only = self.load_read_only(guard);
        let (entry, amended) = read_only.lookup(&k);

        if let Some(entry) = entry {
            if entry.unexpunge(guard) {
                // The slot was left out of the dirty view, so the next
                // promotion would lose it. Share it again before writing.
                dirty
                    .as_mut()
                    .expect("expunged entry without a dirty view")
                    .insert(k, Arc::clone(entry));
                entry.store_value(v, guard);
                return None;
            }
            return entry.exchange_value(v, guard).value().cloned();
        }

        if amended {
            if let Some(entry) = dirty.as_ref().and_then(|d| d.get(&k)) {
                let prev = entry.exchange_value(v, guard);
                debug_assert!(
                    !matches!(prev, EntryState::Expunged),
                    "expunged entry in the dirty view"
                );
                return prev.value().cloned();
            }
        } else {
            self.materialize(&mut dirty, read_only, guard);
        }

        dirty
            .as_mut()
            .expect("amended read-only view without a dirty view")
            .insert(k, Arc::new(Entry::new(v)));
        None
    }

    /// Remove the value for `k`, returning it if one was present.
    ///
    /// A remove that races the first insert of a brand new key may miss it,
    /// leaving the inserted value in place.
    pub fn remove<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let guard = &epoch::pin();

        let (entry, amended) = self.load_read_only(guard).lookup(k);
        if let Some(entry) = entry {
            return entry.delete(guard).cloned();
        }
        if !amended {
            return None;
        }

        let mut dirty = self.lock_dirty();
        let (entry, amended) = self.load_read_only(guard).lookup(k);
        if let Some(entry) = entry {
            return entry.delete(guard).cloned();
        }
        if !amended {
            return None;
        }

        self.counters.dirty_lookup();
        let found = dirty
            .as_ref()
            .and_then(|d| d.get(k))
            .map(|entry| {
                check_dirty_entry(entry, guard);
                entry.delete(guard)
            });
        self.count_miss(&mut dirty, found.is_some(), guard);
        found.flatten().cloned()
    }

    /// Take a snapshot of the map counters and the size of both views.
    pub fn stats(&self) -> MapStats {
        let guard = &epoch::pin();
        let dirty = self.lock_dirty();
        let read_only = self.load_read_only(guard);

        let mut stats = MapStats {
            misses: self.misses.load(Relaxed) as u64,
            read_only_len: read_only.len() as u64,
            dirty_len: dirty.as_ref().map(|d| d.len() as u64),
            amended: read_only.amended(),
            ..Default::default()
        };
        self.counters.fill(&mut stats);
        stats
    }

    fn search<'g, Q>(&self, k: &Q, guard: &'g Guard) -> Option<&'g V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (entry, amended) = self.load_read_only(guard).lookup(k);
        if let Some(entry) = entry {
            return entry.load_value(guard);
        }
        if !amended {
            return None;
        }

        let mut dirty = self.lock_dirty();
        // A promotion may have landed while we waited for the lock.
        let (entry, amended) = self.load_read_only(guard).lookup(k);
        if let Some(entry) = entry {
            return entry.load_value(guard);
        }
        if !amended {
            return None;
        }

        self.counters.dirty_lookup();
        let found = dirty
            .as_ref()
            .and_then(|d| d.get(k))
            .map(|entry| {
                check_dirty_entry(entry, guard);
                entry.load_value(guard)
            });
        self.count_miss(&mut dirty, found.is_some(), guard);
        found.flatten()
    }

    fn load_read_only<'g>(&self, guard: &'g Guard) -> &'g ReadOnlyView<K, V> {
        let cur = self.read_only.load(Acquire, guard);
        // Safety: the pointer is never null, and replaced views are only
        // reclaimed once every guard that could have loaded them is dropped.
        unsafe { cur.deref() }
    }

    fn lock_dirty(&self) -> MutexGuard<'_, Option<DirtyView<K, V>>> {
        self.dirty.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a new read-only view. Must be called with the dirty lock held.
    fn publish(&self, view: ReadOnlyView<K, V>, guard: &Guard) {
        let prev = self.read_only.swap(Owned::new(view), AcqRel, guard);
        // Safety: the previous view is unlinked, readers that still hold it
        // are protected by their guard.
        unsafe { guard.defer_destroy(prev) };
    }

    /// Build the dirty view and flag the read-only view as amended. The
    /// read-only view must not already be amended.
    fn materialize(
        &self,
        dirty: &mut Option<DirtyView<K, V>>,
        read_only: &ReadOnlyView<K, V>,
        guard: &Guard,
    ) {
        debug_assert!(dirty.is_none());
        let (view, expunged) = DirtyView::materialize(read_only, guard);
        trace!(
            read_only_len = read_only.len(),
            dirty_len = view.len(),
            expunged,
            "materialized dirty view"
        );
        self.counters.materialization(expunged);
        *dirty = Some(view);
        self.publish(read_only.to_amended(), guard);
    }

    /// Record a locked search of the dirty view, promoting it once the
    /// misses catch up with its size.
    fn count_miss(&self, dirty: &mut Option<DirtyView<K, V>>, hit: bool, guard: &Guard) {
        if !hit && self.miss_policy == MissPolicy::DirtyHits {
            return;
        }
        let misses = self.misses.fetch_add(1, Relaxed);
        let dirty_len = dirty.as_ref().map_or(0, DirtyView::len);
        if misses < dirty_len {
            return;
        }
        if let Some(promoted) = dirty.take() {
            trace!(misses = misses + 1, dirty_len, "promoting dirty view");
            self.publish(promoted.into_read_only(), guard);
            self.counters.promotion();
        }
        self.misses.store(0, Relaxed);
    }
}

/// Materialization never copies an expunged entry, so none can be reached
/// through the dirty view.
fn check_dirty_entry<V>(entry: &Entry<V>, guard: &Guard) {
    debug_assert!(
        !matches!(entry.load(guard), EntryState::Expunged),
        "expunged entry in the dirty view"
    );
}

impl<K, V> Drop for AmortizedMap<K, V> {
    fn drop(&mut self) {
        // Safety: we hold the only reference to the map, so nobody can be
        // reading the current view. Older views are already with the collector.
        unsafe {
            let guard = epoch::unprotected();
            let cur = self.read_only.load(Relaxed, guard);
            if !cur.is_null() {
                drop(cur.into_owned());
            }
        }
    }
}
