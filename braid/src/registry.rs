//! Bookkeeping for suspended continuations.
//!
//! A [`Registry`] names every outstanding continuation with a small integer
//! [`Id`] and remembers how many more times it may legitimately be resumed.
//! Ids come from a per-registry counter that starts over at zero whenever
//! the registry becomes empty, so an id is only unique while its entry is
//! outstanding.
//!
//! No operation blocks or panics. Unknown ids are ignored: a Clock callback
//! scheduled before a cancellation may still fire after its entry is gone.

use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a registered continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(usize);

impl Id {
    /// Returns the raw integer value of the id.
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered continuation and its remaining resume count.
struct Entry<K> {
    count: usize,
    continuation: K,
}

/// Mapping from [`Id`] to registered continuations.
///
/// Entries iterate in ascending id order, which keeps mass cancellation
/// deterministic.
pub struct Registry<K> {
    /// Outstanding entries keyed by id.
    entries: BTreeMap<Id, Entry<K>>,

    /// Next id handed out by [`register`](Self::register).
    next: usize,
}

impl<K> Registry<K> {
    /// Creates an empty registry with its counter at zero.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next: 0,
        }
    }

    /// Registers a continuation that may be resumed `count` times.
    ///
    /// A `count` of zero is treated as one.
    pub fn register(&mut self, continuation: K, count: usize) -> Id {
        let id = Id(self.next);
        self.next += 1;

        self.entries.insert(
            id,
            Entry {
                count: count.max(1),
                continuation,
            },
        );

        id
    }

    /// Consumes one resumption of `id`.
    ///
    /// The entry is removed once its count reaches zero, or immediately when
    /// `force` is set. Unknown ids are ignored.
    pub fn unregister(&mut self, id: Id, force: bool) {
        self.unregister_if(id, force, |_| true);
    }

    /// Like [`unregister`](Self::unregister), but only touches the entry if
    /// `matches` accepts its continuation.
    ///
    /// Used by owners that hold on to an id for a long time and must not
    /// remove an unrelated entry that recycled it.
    pub fn unregister_if(&mut self, id: Id, force: bool, matches: impl FnOnce(&K) -> bool) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };

        if !matches(&entry.continuation) {
            return;
        }

        entry.count = entry.count.saturating_sub(1);

        if force || entry.count == 0 {
            self.entries.remove(&id);
        }

        if self.entries.is_empty() {
            self.next = 0;
        }
    }

    /// Returns the continuation registered under `id`.
    pub fn get(&self, id: Id) -> Option<&K> {
        self.entries.get(&id).map(|entry| &entry.continuation)
    }

    /// Returns `true` if `id` is outstanding.
    pub fn contains(&self, id: Id) -> bool {
        self.entries.contains_key(&id)
    }

    /// Returns the remaining resume count of `id`.
    pub fn remaining(&self, id: Id) -> Option<usize> {
        self.entries.get(&id).map(|entry| entry.count)
    }

    /// Removes every entry and resets the counter.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next = 0;
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Clone> Registry<K> {
    /// Returns a snapshot of all continuations in ascending id order.
    ///
    /// The snapshot is independent of later mutation of the registry.
    pub fn elements(&self) -> Vec<K> {
        self.entries
            .values()
            .map(|entry| entry.continuation.clone())
            .collect()
    }
}

impl<K> Default for Registry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for Registry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("ids", &self.entries.keys().collect::<Vec<_>>())
            .field("next", &self.next)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_while_outstanding() {
        let mut registry = Registry::new();

        let a = registry.register("a", 1);
        let b = registry.register("b", 1);
        let c = registry.register("c", 1);

        assert_eq!((a.get(), b.get(), c.get()), (0, 1, 2));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn refcount_limits_resumptions() {
        let mut registry = Registry::new();
        let id = registry.register("multi", 3);

        registry.unregister(id, false);
        registry.unregister(id, false);
        assert_eq!(registry.remaining(id), Some(1));

        registry.unregister(id, false);
        assert!(!registry.contains(id));

        // Excess wakeups are no-ops.
        registry.unregister(id, false);
        assert!(registry.is_empty());
    }

    #[test]
    fn force_removes_regardless_of_count() {
        let mut registry = Registry::new();
        let keep = registry.register("keep", 1);
        let id = registry.register("multi", 5);

        registry.unregister(id, true);

        assert!(!registry.contains(id));
        assert!(registry.contains(keep));
    }

    #[test]
    fn counter_rolls_over_when_drained() {
        let mut registry = Registry::new();
        let a = registry.register("a", 1);
        let b = registry.register("b", 1);

        registry.unregister(b, false);
        assert_eq!(registry.register("c", 1).get(), 2);

        registry.clear();
        let d = registry.register("d", 1);
        assert_eq!(d, a);

        registry.unregister(d, false);
        assert!(registry.is_empty());
        assert_eq!(registry.register("e", 1).get(), 0);
    }

    #[test]
    fn elements_is_an_ordered_snapshot() {
        let mut registry = Registry::new();
        registry.register(10, 1);
        let middle = registry.register(20, 1);
        registry.register(30, 1);

        let snapshot = registry.elements();
        registry.unregister(middle, false);
        registry.clear();

        assert_eq!(snapshot, vec![10, 20, 30]);
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_ids_are_tolerated() {
        let mut registry: Registry<&str> = Registry::new();

        registry.unregister(Id(42), false);
        registry.unregister(Id(7), true);

        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_if_skips_recycled_ids() {
        let mut registry = Registry::new();
        let id = registry.register("old", 1);
        registry.unregister(id, false);

        let recycled = registry.register("new", 1);
        assert_eq!(recycled, id);

        registry.unregister_if(id, true, |continuation| *continuation == "old");
        assert!(registry.contains(recycled));
    }
}
