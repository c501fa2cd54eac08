use std::collections::HashMap;

#[cfg(feature = "foldhash")]
pub(crate) use foldhash::fast::RandomState;

#[cfg(all(feature = "ahash", not(feature = "foldhash")))]
pub(crate) use ahash::RandomState;

#[cfg(all(not(feature = "ahash"), not(feature = "foldhash")))]
pub(crate) use std::collections::hash_map::RandomState;

/// The map type every store in this crate is built on.
pub(crate) type FastMap<K, V> = HashMap<K, V, RandomState>;

pub(crate) fn fast_map<K, V>(capacity: usize) -> FastMap<K, V> {
    HashMap::with_capacity_and_hasher(capacity, RandomState::default())
}
