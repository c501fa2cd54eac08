use super::entry::Entry;
use crate::utils::{fast_map, FastMap};

use crossbeam_epoch::Guard;
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

pub(crate) type EntryMap<K, V> = FastMap<K, Arc<Entry<V>>>;

/// An immutable snapshot of key to entry associations. Keys are never added
/// or removed once a view is published, only the entries it points to change.
#[derive(Debug)]
pub(crate) struct ReadOnlyView<K, V> {
    map: Arc<EntryMap<K, V>>,
    /// True when the dirty view holds keys that are not in `map`.
    amended: bool,
}

impl<K, V> ReadOnlyView<K, V>
where
    K: Hash + Eq,
{
    pub(crate) fn new(capacity: usize) -> Self {
        ReadOnlyView {
            map: Arc::new(fast_map(capacity)),
            amended: false,
        }
    }

    /// Look up `k`, returning the entry along with the `amended` flag of this
    /// same snapshot.
    pub(crate) fn lookup<Q>(&self, k: &Q) -> (Option<&Arc<Entry<V>>>, bool)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        (self.map.get(k), self.amended)
    }

    /// A copy of this view sharing the same map, flagged as amended.
    pub(crate) fn to_amended(&self) -> Self {
        ReadOnlyView {
            map: Arc::clone(&self.map),
            amended: true,
        }
    }

    pub(crate) fn amended(&self) -> bool {
        self.amended
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }
}

/// The mutable side of the store. Only ever touched with the store lock held.
#[derive(Debug)]
pub(crate) struct DirtyView<K, V> {
    map: EntryMap<K, V>,
}

impl<K, V> DirtyView<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Build a dirty view from `read_only`. Deleted entries are expunged and
    /// left behind, live entries are shared by reference. Returns the view
    /// and the number of keys expunged.
    pub(crate) fn materialize(read_only: &ReadOnlyView<K, V>, guard: &Guard) -> (Self, usize) {
        let mut map = fast_map(read_only.len());
        let mut expunged = 0;
        for (k, entry) in read_only.map.iter() {
            if entry.try_expunge_if_absent(guard) {
                expunged += 1;
            } else {
                map.insert(k.clone(), Arc::clone(entry));
            }
        }
        (DirtyView { map }, expunged)
    }

    pub(crate) fn get<Q>(&self, k: &Q) -> Option<&Arc<Entry<V>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(k)
    }

    pub(crate) fn insert(&mut self, k: K, entry: Arc<Entry<V>>) {
        self.map.insert(k, entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Turn this dirty view into the next read-only view.
    pub(crate) fn into_read_only(self) -> ReadOnlyView<K, V> {
        ReadOnlyView {
            map: Arc::new(self.map),
            amended: false,
        }
    }
}
