//! Capacity-bounded insertion-ordered set keyed by item fingerprint.
//!
//! An alternative to the ring buffer for small caches: fast lookup by
//! fingerprint, insertion-order eviction, no cursor seeking. Recency is
//! insertion recency only — re-adding an existing fingerprint returns the
//! stored item and does not promote it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use logfold_core::Fingerprint;

struct SetInner<T> {
    /// Fingerprints newest-first.
    keys: VecDeque<u64>,
    items: HashMap<u64, Arc<T>>,
}

/// Bounded ordered set with at most one entry per fingerprint.
pub struct FixedHashSet<T: Fingerprint> {
    capacity: usize,
    inner: RwLock<SetInner<T>>,
}

impl<T: Fingerprint> FixedHashSet<T> {
    /// Create a set holding at most `capacity` items. Values `<= 0` are
    /// coerced to 1 so at least one item can always be stored.
    pub fn new(capacity: i64) -> Self {
        let capacity = capacity.max(1) as usize;
        Self {
            capacity,
            inner: RwLock::new(SetInner {
                keys: VecDeque::with_capacity(capacity),
                items: HashMap::with_capacity(capacity),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size(&self) -> usize {
        self.inner.read().expect("set lock poisoned").keys.len()
    }

    /// Look up an item by fingerprint. Does not mutate order.
    pub fn get(&self, hash: u64) -> Option<SetElement<'_, T>> {
        let inner = self.inner.read().expect("set lock poisoned");
        let item = inner.items.get(&hash)?;
        Some(SetElement {
            item: Arc::clone(item),
            hash,
            set: self,
        })
    }

    /// Insert an item, evicting the oldest entry when full.
    ///
    /// If the fingerprint already exists the stored item is returned
    /// unchanged and `item` is discarded; the entry keeps its position.
    pub fn add(&self, item: T) -> SetElement<'_, T> {
        let hash = item.fingerprint();
        let mut inner = self.inner.write().expect("set lock poisoned");

        if let Some(existing) = inner.items.get(&hash) {
            return SetElement {
                item: Arc::clone(existing),
                hash,
                set: self,
            };
        }

        if inner.keys.len() >= self.capacity {
            if let Some(oldest) = inner.keys.pop_back() {
                inner.items.remove(&oldest);
            }
        }

        let item = Arc::new(item);
        inner.keys.push_front(hash);
        inner.items.insert(hash, Arc::clone(&item));

        SetElement {
            item,
            hash,
            set: self,
        }
    }

    /// Remove an item by its fingerprint. Returns whether removal occurred.
    pub fn remove(&self, item: &T) -> bool {
        let hash = item.fingerprint();
        let mut inner = self.inner.write().expect("set lock poisoned");

        if inner.items.remove(&hash).is_none() {
            return false;
        }
        if let Some(pos) = inner.keys.iter().position(|&k| k == hash) {
            inner.keys.remove(pos);
        }
        true
    }
}

impl<T: Fingerprint> std::fmt::Debug for FixedHashSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedHashSet")
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .finish()
    }
}

/// A handle to one stored entry, supporting iteration toward older entries.
pub struct SetElement<'a, T: Fingerprint> {
    item: Arc<T>,
    hash: u64,
    set: &'a FixedHashSet<T>,
}

impl<'a, T: Fingerprint> SetElement<'a, T> {
    pub fn item(&self) -> &Arc<T> {
        &self.item
    }

    /// The next-older entry in insertion order, or `None` at the tail (or
    /// when this entry has since been evicted).
    pub fn next(&self) -> Option<SetElement<'a, T>> {
        let inner = self.set.inner.read().expect("set lock poisoned");
        let pos = inner.keys.iter().position(|&k| k == self.hash)?;
        let hash = *inner.keys.get(pos + 1)?;
        let item = Arc::clone(inner.items.get(&hash)?);
        Some(SetElement {
            item,
            hash,
            set: self.set,
        })
    }
}
