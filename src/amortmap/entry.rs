//! A single value slot shared between the read-only and dirty views.
//!
//! The slot is a tagged `crossbeam_epoch::Atomic` pointer:
//!
//! * non-null - a live value
//! * null, tag 0 - the value was deleted, the key may still be carried forward
//! * null, tag `EXPUNGED` - the key was deleted and left out of the current
//!   dirty view. It must be put back into the dirty view before it can hold
//!   a value again.
//!
//! Replaced values are handed to the epoch collector, so a `&'g V` returned
//! from any of these methods stays valid for as long as the caller's guard.

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::fmt;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};

const EXPUNGED: usize = 1;

// The tag lives in the low pointer bit, so every boxed value needs at least
// two byte alignment regardless of V.
#[repr(align(2))]
struct Slot<V> {
    value: V,
}

/// The observed state of an [`Entry`] at one point in time.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EntryState<'g, V> {
    Present(&'g V),
    Deleted,
    Expunged,
}

impl<'g, V> EntryState<'g, V> {
    fn from_shared(s: Shared<'g, Slot<V>>) -> Self {
        if s.is_null() {
            if s.tag() == EXPUNGED {
                EntryState::Expunged
            } else {
                EntryState::Deleted
            }
        } else {
            // Safety: non-null slots are only reclaimed through the guard
            // that produced `s`, or by `Entry::drop` which has exclusive access.
            EntryState::Present(unsafe { &s.deref().value })
        }
    }

    pub(crate) fn value(self) -> Option<&'g V> {
        match self {
            EntryState::Present(v) => Some(v),
            EntryState::Deleted | EntryState::Expunged => None,
        }
    }
}

fn is_expunged<V>(s: Shared<'_, Slot<V>>) -> bool {
    s.is_null() && s.tag() == EXPUNGED
}

fn is_deleted<V>(s: Shared<'_, Slot<V>>) -> bool {
    s.is_null() && s.tag() != EXPUNGED
}

pub(crate) struct Entry<V> {
    slot: Atomic<Slot<V>>,
}

impl<V> Entry<V> {
    pub(crate) fn new(value: V) -> Self {
        Entry {
            slot: Atomic::new(Slot { value }),
        }
    }

    pub(crate) fn load<'g>(&self, guard: &'g Guard) -> EntryState<'g, V> {
        EntryState::from_shared(self.slot.load(Acquire, guard))
    }

    /// The live value, if any.
    pub(crate) fn load_value<'g>(&self, guard: &'g Guard) -> Option<&'g V> {
        self.load(guard).value()
    }

    /// Move a deleted slot to expunged. Returns true if the slot is expunged
    /// when this returns, whether by this call or an earlier one.
    pub(crate) fn try_expunge_if_absent(&self, guard: &Guard) -> bool {
        let mut cur = self.slot.load(Acquire, guard);
        while is_deleted(cur) {
            match self.slot.compare_exchange(
                Shared::null(),
                Shared::null().with_tag(EXPUNGED),
                AcqRel,
                Acquire,
                guard,
            ) {
                Ok(_) => return true,
                Err(e) => cur = e.current,
            }
        }
        is_expunged(cur)
    }

    /// Move an expunged slot back to deleted. Returns true if the slot was
    /// expunged. Only called under the dirty view lock.
    pub(crate) fn unexpunge(&self, guard: &Guard) -> bool {
        self.slot
            .compare_exchange(
                Shared::null().with_tag(EXPUNGED),
                Shared::null(),
                AcqRel,
                Acquire,
                guard,
            )
            .is_ok()
    }

    /// Unconditionally install `value`.
    pub(crate) fn store_value(&self, value: V, guard: &Guard) {
        let prev = self.slot.swap(Owned::new(Slot { value }), AcqRel, guard);
        Self::retire(prev, guard);
    }

    /// Unconditionally install `value`, returning what was there before.
    pub(crate) fn exchange_value<'g>(&self, value: V, guard: &'g Guard) -> EntryState<'g, V> {
        let prev = self.slot.swap(Owned::new(Slot { value }), AcqRel, guard);
        Self::retire(prev, guard);
        EntryState::from_shared(prev)
    }

    /// Install `value` unless the slot is expunged, in which case the value
    /// is handed back untouched.
    pub(crate) fn compare_and_set_if_not_expunged<'g>(
        &self,
        value: V,
        guard: &'g Guard,
    ) -> Result<Option<&'g V>, V> {
        let mut new = Owned::new(Slot { value });
        let mut cur = self.slot.load(Acquire, guard);
        loop {
            if is_expunged(cur) {
                return Err(new.into_box().value);
            }
            match self.slot.compare_exchange(cur, new, AcqRel, Acquire, guard) {
                Ok(_) => {
                    Self::retire(cur, guard);
                    return Ok(EntryState::from_shared(cur).value());
                }
                Err(e) => {
                    cur = e.current;
                    new = e.new;
                }
            }
        }
    }

    /// Mark the slot deleted. An expunged slot is already deleted and stays
    /// expunged. Returns the value that was removed.
    pub(crate) fn delete<'g>(&self, guard: &'g Guard) -> Option<&'g V> {
        let mut cur = self.slot.load(Acquire, guard);
        while !cur.is_null() {
            match self
                .slot
                .compare_exchange(cur, Shared::null(), AcqRel, Acquire, guard)
            {
                Ok(_) => {
                    Self::retire(cur, guard);
                    return EntryState::from_shared(cur).value();
                }
                Err(e) => cur = e.current,
            }
        }
        None
    }

    fn retire(prev: Shared<'_, Slot<V>>, guard: &Guard) {
        if !prev.is_null() {
            // Safety: `prev` was unlinked by the swap that produced it, so no
            // new reader can reach it.
            unsafe { guard.defer_destroy(prev) };
        }
    }
}

impl<V> Drop for Entry<V> {
    fn drop(&mut self) {
        // Safety: we have exclusive access, and entries are only released
        // after every view that could hand them to a reader has been
        // reclaimed by the epoch collector.
        unsafe {
            let guard = epoch::unprotected();
            let cur = self.slot.load(Relaxed, guard);
            if !cur.is_null() {
                drop(cur.into_owned());
            }
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Entry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = epoch::pin();
        f.debug_tuple("Entry").field(&self.load(&guard)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Entry, EntryState};
    use crossbeam_epoch as epoch;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::scope;

    #[test]
    fn test_entry_present_delete() {
        let guard = epoch::pin();
        let e = Entry::new(1u8);
        assert_eq!(e.load_value(&guard), Some(&1));
        assert_eq!(e.delete(&guard), Some(&1));
        assert_eq!(e.load(&guard), EntryState::Deleted);
        // Deleting again removes nothing.
        assert_eq!(e.delete(&guard), None);
    }

    #[test]
    fn test_entry_expunge_only_from_deleted() {
        let guard = epoch::pin();
        let e = Entry::new(String::from("a"));
        assert!(!e.try_expunge_if_absent(&guard));
        assert_eq!(e.load_value(&guard).map(String::as_str), Some("a"));

        e.delete(&guard);
        assert!(e.try_expunge_if_absent(&guard));
        // Already expunged is still reported as expunged.
        assert!(e.try_expunge_if_absent(&guard));
        assert_eq!(e.load(&guard), EntryState::Expunged);
    }

    #[test]
    fn test_entry_expunged_rejects_cas() {
        let guard = epoch::pin();
        let e = Entry::new(1u32);
        e.delete(&guard);
        assert!(e.try_expunge_if_absent(&guard));

        assert_eq!(e.compare_and_set_if_not_expunged(2, &guard), Err(2));
        // Delete does not clear the expunged marker.
        assert_eq!(e.delete(&guard), None);
        assert_eq!(e.load(&guard), EntryState::Expunged);

        assert!(e.unexpunge(&guard));
        assert!(!e.unexpunge(&guard));
        assert_eq!(e.load(&guard), EntryState::Deleted);
        e.store_value(3, &guard);
        assert_eq!(e.load_value(&guard), Some(&3));
    }

    #[test]
    fn test_entry_cas_and_exchange_return_previous() {
        let guard = epoch::pin();
        let e = Entry::new(1u32);
        assert_eq!(e.compare_and_set_if_not_expunged(2, &guard), Ok(Some(&1)));
        assert_eq!(e.exchange_value(3, &guard), EntryState::Present(&2));
        e.delete(&guard);
        assert_eq!(e.compare_and_set_if_not_expunged(4, &guard), Ok(None));
        assert_eq!(e.exchange_value(5, &guard), EntryState::Present(&4));
    }

    static DROP_COUNT: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct TestDropWrapper(#[allow(dead_code)] u64);

    impl Drop for TestDropWrapper {
        fn drop(&mut self) {
            DROP_COUNT.fetch_add(1, Ordering::Release);
        }
    }

    #[test]
    fn test_entry_drop_releases_value() {
        DROP_COUNT.store(0, Ordering::Release);
        {
            let e = Entry::new(TestDropWrapper(0));
            drop(e);
        }
        assert_eq!(DROP_COUNT.load(Ordering::Acquire), 1);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn test_entry_racing_expunge_and_write() {
        // A writer racing an expunge must either land its value or observe
        // the expunged marker - never both, never neither.
        for _ in 0..200 {
            let e = Entry::new(0u64);
            let guard = epoch::pin();
            e.delete(&guard);
            drop(guard);

            let (expunged, written) = scope(|s| {
                let e_ref = &e;
                let ex = s.spawn(move || {
                    let guard = epoch::pin();
                    e_ref.try_expunge_if_absent(&guard)
                });
                let wr = s.spawn(move || {
                    let guard = epoch::pin();
                    e_ref.compare_and_set_if_not_expunged(7, &guard).is_ok()
                });
                (ex.join().unwrap(), wr.join().unwrap())
            });

            assert_ne!(expunged, written);
            let guard = epoch::pin();
            if written {
                assert_eq!(e.load_value(&guard), Some(&7));
            } else {
                assert_eq!(e.load(&guard), EntryState::Expunged);
            }
        }
    }
}
