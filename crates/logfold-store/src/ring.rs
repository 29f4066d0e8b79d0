//! Bounded ring buffer with cursor readers and listener fan-out.
//!
//! The buffer is a fixed-capacity circular store shared behind an `Arc`.
//! A single read-write lock guards the cells, the write position, the
//! monotone write counter, the backfill pointer, and the listener registry.
//!
//! Readers walk backwards in time through [`Element`] cursors. A cursor owns
//! no storage: it is a `(buffer, position, counter)` tuple whose validity is
//! recomputed under the read lock on every observation. Once the buffer has
//! advanced `capacity` writes past a cursor, the cursor is *lapped* and every
//! subsequent step yields `None` — the end-of-history marker callers rely on
//! to fall back to persistent storage.
//!
//! Listeners receive every write after their attachment point through a
//! bounded channel. Fan-out never blocks on a slow consumer: a listener
//! whose channel is full at delivery time is detached and cancelled.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use logfold_core::defaults::LISTENER_BUFFER_SIZE;

/// Cleanup capability probed when a stored value is pushed out by a newer
/// write. Install it on a buffer with [`RingBuffer::with_cleanup`].
pub trait Displace: Send + Sync {
    fn displaced(&self);
}

type DisplaceHook<T> = Box<dyn Fn(&Arc<T>) + Send + Sync>;

struct ListenerEntry<T> {
    tx: mpsc::Sender<Arc<T>>,
    cancel: CancellationToken,
}

struct Shared<T> {
    /// Cells; a cell is empty until its first write and thereafter only
    /// overwritten, never cleared.
    data: Box<[Option<Arc<T>>]>,
    /// Next write position, in `[0, capacity)`.
    index: usize,
    /// Total writes ever performed. Never decreases.
    counter: u64,
    /// Next free backfill slot; poisoned to 0 when backfill meets live data.
    prepend_before: usize,
    listeners: HashMap<u64, ListenerEntry<T>>,
    next_listener_id: u64,
}

/// Fixed-capacity circular buffer with cursor readers and live listeners.
pub struct RingBuffer<T> {
    capacity: usize,
    shared: RwLock<Shared<T>>,
    on_displace: Option<DisplaceHook<T>>,
    /// Handle to the owning `Arc`, used to mint weak cursor back-references.
    self_ref: Weak<Self>,
}

impl<T> RingBuffer<T> {
    /// Create a buffer with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Arc<Self> {
        Self::build(capacity, None)
    }

    /// Create a buffer that invokes `hook` whenever a stored value is
    /// displaced by a newer write. The hook runs after the write completes,
    /// exactly once per displaced occupant.
    pub fn with_displace_hook(
        capacity: usize,
        hook: impl Fn(&Arc<T>) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(capacity, Some(Box::new(hook)))
    }

    fn build(capacity: usize, on_displace: Option<DisplaceHook<T>>) -> Arc<Self> {
        assert!(capacity > 0, "ring buffer capacity must be > 0");

        let data: Vec<Option<Arc<T>>> = (0..capacity).map(|_| None).collect();
        Arc::new_cyclic(|self_ref| Self {
            capacity,
            shared: RwLock::new(Shared {
                data: data.into_boxed_slice(),
                index: 0,
                counter: 0,
                prepend_before: capacity,
                listeners: HashMap::new(),
                next_listener_id: 0,
            }),
            on_displace,
            self_ref: self_ref.clone(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Next write position.
    pub fn index(&self) -> usize {
        self.shared.read().expect("ring lock poisoned").index
    }

    /// Total number of writes ever performed.
    pub fn counter(&self) -> u64 {
        self.shared.read().expect("ring lock poisoned").counter
    }

    /// Store `item` at the write position, displacing the previous occupant.
    ///
    /// Holds the exclusive lock across the store and the listener fan-out so
    /// readers observe an atomic transition. Fan-out uses non-blocking
    /// offers; a listener with a full channel is evicted and its
    /// cancellation fired. The displacement hook (if any) runs after the
    /// lock is released.
    pub fn write(&self, item: T) {
        self.write_arc(Arc::new(item));
    }

    /// [`write`](Self::write) for an already-shared item.
    pub fn write_arc(&self, item: Arc<T>) {
        let displaced;
        let mut evicted = Vec::new();
        {
            let mut shared = self.shared.write().expect("ring lock poisoned");

            let index = shared.index;
            displaced = shared.data[index].replace(Arc::clone(&item));
            shared.index = wrap_add(index as u64, 1, self.capacity as u64) as usize;
            shared.counter += 1;

            // Deferred removal: collect slow consumers during the sweep,
            // detach them after it.
            let mut dead = Vec::new();
            for (&id, entry) in &shared.listeners {
                if entry.tx.try_send(Arc::clone(&item)).is_err() {
                    dead.push(id);
                }
            }
            for id in dead {
                if let Some(entry) = shared.listeners.remove(&id) {
                    evicted.push(entry.cancel);
                }
            }
        }

        for cancel in evicted {
            cancel.cancel();
        }
        if let (Some(prev), Some(hook)) = (displaced.as_ref(), self.on_displace.as_ref()) {
            hook(prev);
        }
    }

    /// Newest live cursor, or `None` before the first write.
    pub fn element(&self) -> Option<Element<T>> {
        let shared = self.shared.read().expect("ring lock poisoned");
        newest_element(self, &shared)
    }

    /// Atomically snapshot the newest cursor and attach a live listener.
    ///
    /// The listener channel (capacity [`LISTENER_BUFFER_SIZE`]) receives
    /// every record written strictly after the snapshot, until `cancel`
    /// fires or the listener falls behind and is evicted. Either way the
    /// channel closes exactly once, after buffered items are drained.
    pub fn element_and_listener(
        &self,
        cancel: CancellationToken,
    ) -> (Option<Element<T>>, mpsc::Receiver<Arc<T>>)
    where
        T: Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER_SIZE);

        let (element, id) = {
            let mut shared = self.shared.write().expect("ring lock poisoned");
            let id = shared.next_listener_id;
            shared.next_listener_id += 1;
            shared.listeners.insert(
                id,
                ListenerEntry {
                    tx,
                    cancel: cancel.clone(),
                },
            );
            (newest_element(self, &shared), id)
        };

        // Detach on cancellation. Idempotent with slow-consumer eviction,
        // which cancels the same token.
        let weak = self.self_ref.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Some(buffer) = weak.upgrade() {
                buffer
                    .shared
                    .write()
                    .expect("ring lock poisoned")
                    .listeners
                    .remove(&id);
            }
        });

        (element, rx)
    }

    /// Backfill an older item into a previously empty slot without
    /// disturbing newer records.
    ///
    /// Walks the backfill pointer backwards from the end of the cell array.
    /// If the targeted cell already holds a record the pointer is poisoned
    /// and the call fails; backfill never overwrites a live cell. Returns
    /// `false` once backfill capacity is exhausted.
    pub fn write_last_empty(&self, item: T) -> bool {
        let mut shared = self.shared.write().expect("ring lock poisoned");
        if shared.prepend_before == 0 {
            return false;
        }

        shared.prepend_before -= 1;
        let pos = shared.prepend_before;
        if shared.data[pos].is_some() {
            shared.prepend_before = 0;
            return false;
        }

        shared.data[pos] = Some(Arc::new(item));
        true
    }

    fn with_read<R>(&self, f: impl FnOnce(&Shared<T>) -> R) -> R {
        let shared = self.shared.read().expect("ring lock poisoned");
        f(&shared)
    }
}

impl<T: Displace + 'static> RingBuffer<T> {
    /// Buffer whose displaced values have their [`Displace`] hook invoked.
    pub fn with_cleanup(capacity: usize) -> Arc<Self> {
        Self::with_displace_hook(capacity, |item: &Arc<T>| item.displaced())
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (counter, listeners) =
            self.with_read(|shared| (shared.counter, shared.listeners.len()));
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("counter", &counter)
            .field("listeners", &listeners)
            .finish()
    }
}

fn newest_element<T>(buffer: &RingBuffer<T>, shared: &Shared<T>) -> Option<Element<T>> {
    if shared.counter == 0 {
        return None;
    }

    let pos = wrap_sub(shared.index as u64, 1, buffer.capacity as u64) as usize;
    let value = shared.data[pos].clone()?;

    Some(Element {
        value,
        pos,
        counter: shared.counter,
        buffer: buffer.self_ref.clone(),
    })
}

/// A read cursor into a [`RingBuffer`].
///
/// An element records the position it points at and the buffer's write
/// counter when that cell was written. It holds the value it observed (so
/// the record stays alive for this reader) but only a weak handle to the
/// buffer itself.
pub struct Element<T> {
    value: Arc<T>,
    pos: usize,
    counter: u64,
    buffer: Weak<RingBuffer<T>>,
}

impl<T> Element<T> {
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    /// The element `offset + 1` positions older than this cursor, or `None`
    /// when that write never happened, was overwritten (this cursor has been
    /// lapped), or the buffer is gone.
    ///
    /// Lapping is monotone: once `buffer.counter - cursor.counter` reaches
    /// the capacity, every subsequent step yields `None`.
    pub fn next(&self, offset: u64) -> Option<Element<T>> {
        let steps = offset + 1;
        if steps > self.counter {
            // no older write exists
            return None;
        }

        let buffer = self.buffer.upgrade()?;
        let shared = buffer.shared.read().expect("ring lock poisoned");

        let next_counter = self.counter - steps;
        let pos = wrap_sub(self.pos as u64, steps, buffer.capacity as u64) as usize;

        if shared.counter - next_counter >= buffer.capacity as u64 {
            return None;
        }
        let value = shared.data[pos].clone()?;

        Some(Element {
            value,
            pos,
            counter: next_counter,
            buffer: self.buffer.clone(),
        })
    }

    /// Re-evaluate this cursor against the buffer's current state.
    pub fn is_valid(&self) -> bool {
        match self.buffer.upgrade() {
            Some(buffer) => buffer.with_read(|shared| {
                shared.counter - self.counter < buffer.capacity as u64
                    && shared.data[self.pos].is_some()
            }),
            None => false,
        }
    }
}

impl<T> Clone for Element<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            pos: self.pos,
            counter: self.counter,
            buffer: self.buffer.clone(),
        }
    }
}

/// `(a + b) mod size`, widened through `u128` so the raw sum cannot wrap
/// the native word range.
pub(crate) fn wrap_add(a: u64, b: u64, size: u64) -> u64 {
    ((a as u128 + b as u128) % size as u128) as u64
}

/// `(a - b) mod size` for `a < size`.
pub(crate) fn wrap_sub(a: u64, b: u64, size: u64) -> u64 {
    let b = b % size;
    if a < b {
        size - (b - a)
    } else {
        a - b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_write_overwrites_oldest() {
        let buffer = RingBuffer::new(3);
        for message in ["log 1", "log 2", "log 3", "log 4"] {
            buffer.write(message.to_string());
        }

        // capacity 3: the fourth write displaced the first
        let el = buffer.element().unwrap();
        assert_eq!(el.value().as_str(), "log 4");
        let el = el.next(0).unwrap();
        assert_eq!(el.value().as_str(), "log 3");
        let el = el.next(0).unwrap();
        assert_eq!(el.value().as_str(), "log 2");
        assert!(el.next(0).is_none());
    }

    #[test]
    #[should_panic(expected = "ring buffer capacity must be > 0")]
    fn test_zero_capacity_panics() {
        let _ = RingBuffer::<i32>::new(0);
    }

    #[test]
    fn test_element_empty_buffer() {
        let buffer = RingBuffer::<i32>::new(3);
        assert!(buffer.element().is_none());
    }

    #[test]
    fn test_walk_reverse_insertion_order() {
        let buffer = RingBuffer::new(3);
        for i in [1, 2, 3] {
            buffer.write(i);
        }

        let mut el = buffer.element();
        for expected in [3, 2, 1] {
            let current = el.expect("element in range");
            assert_eq!(**current.value(), expected);
            el = current.next(0);
        }
        assert!(el.is_none());
    }

    #[test]
    fn test_lapped_cursor_yields_none() {
        let buffer = RingBuffer::new(3);
        buffer.write(1);
        buffer.write(2);

        let el = buffer.element().unwrap();
        assert_eq!(**el.value(), 2);

        buffer.write(3);
        buffer.write(4);

        // write 1 has been displaced; the step back is out of range
        assert!(el.next(0).is_none());
    }

    #[test]
    fn test_lapping_is_monotone() {
        let buffer = RingBuffer::new(3);
        buffer.write(1);
        let el = buffer.element().unwrap();

        for i in 2..=5 {
            buffer.write(i);
        }
        // counter has advanced >= capacity past the cursor
        assert!(!el.is_valid());
        assert!(el.next(0).is_none());
        buffer.write(6);
        assert!(el.next(0).is_none());
    }

    #[test]
    fn test_next_with_offsets() {
        let buffer = RingBuffer::new(5);
        for v in [10, 20, 30, 40, 50] {
            buffer.write(v);
        }

        let el = buffer.element().unwrap();
        assert_eq!(**el.value(), 50);
        assert_eq!(**el.next(0).unwrap().value(), 40);
        assert_eq!(**el.next(1).unwrap().value(), 30);
        assert_eq!(**el.next(2).unwrap().value(), 20);
        assert_eq!(**el.next(3).unwrap().value(), 10);
        assert!(el.next(4).is_none());

        // offsets compose from an interior cursor
        let interior = el.next(0).unwrap();
        assert_eq!(**interior.next(1).unwrap().value(), 20);
    }

    #[test]
    fn test_capacity_one_buffer() {
        let buffer = RingBuffer::new(1);
        buffer.write("a");
        let el = buffer.element().unwrap();
        assert_eq!(*el.value().as_ref(), "a");

        buffer.write("b");
        // prior write is unreadable and the old cursor is lapped
        assert!(!el.is_valid());
        assert!(buffer.element().unwrap().next(0).is_none());
    }

    struct Tracked {
        id: usize,
        displaced: Arc<AtomicUsize>,
    }

    impl Displace for Tracked {
        fn displaced(&self) {
            self.displaced.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_displacement_hook_fires_once_per_overwrite() {
        let hits = Arc::new(AtomicUsize::new(0));
        let buffer = RingBuffer::<Tracked>::with_cleanup(2);

        for id in 1..=3 {
            buffer.write(Tracked {
                id,
                displaced: Arc::clone(&hits),
            });
        }
        // item 1 displaced by the third write, exactly once
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        buffer.write(Tracked {
            id: 4,
            displaced: Arc::clone(&hits),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(buffer.element().unwrap().value().id, 4);
    }

    #[test]
    fn test_displace_hook_closure() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let buffer = RingBuffer::<i32>::with_displace_hook(2, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        buffer.write(1);
        buffer.write(2);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        buffer.write(3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_write_last_empty_backfill() {
        let buffer = RingBuffer::new(4);
        buffer.write(100);

        // backfill walks from the tail of the cell array
        assert!(buffer.write_last_empty(3));
        assert!(buffer.write_last_empty(2));
        assert!(buffer.write_last_empty(1));
        // next slot is cell 0, which the live write occupies: poisoned
        assert!(!buffer.write_last_empty(0));
        // and stays poisoned
        assert!(!buffer.write_last_empty(0));
    }

    #[test]
    fn test_write_last_empty_exhausts_capacity() {
        let buffer = RingBuffer::new(2);
        assert!(buffer.write_last_empty(2));
        assert!(buffer.write_last_empty(1));
        assert!(!buffer.write_last_empty(0));
    }

    #[test]
    fn test_concurrent_cursor_walks() {
        let size = 1000u64;
        let buffer = RingBuffer::new(size as usize);
        for i in 0..size {
            buffer.write(i);
        }

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let mut el = buffer.element();
                thread::spawn(move || {
                    for expected in (0..size).rev() {
                        let current = el.expect("element in range");
                        assert_eq!(**current.value(), expected);
                        el = current.next(0);
                    }
                    assert!(el.is_none());
                })
            })
            .collect();

        for handle in readers {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_element_outliving_buffer_is_invalid() {
        let buffer = RingBuffer::new(2);
        buffer.write(7);
        let el = buffer.element().unwrap();
        drop(buffer);

        assert!(!el.is_valid());
        assert!(el.next(0).is_none());
        // the observed value itself stays alive
        assert_eq!(**el.value(), 7);
    }

    #[tokio::test]
    async fn test_listener_receives_subsequent_writes() {
        let buffer = RingBuffer::new(3);
        buffer.write(1);

        let cancel = CancellationToken::new();
        let (el, mut rx) = buffer.element_and_listener(cancel.clone());
        assert_eq!(**el.unwrap().value(), 1);

        buffer.write(2);
        buffer.write(3);
        assert_eq!(*rx.recv().await.unwrap(), 2);
        assert_eq!(*rx.recv().await.unwrap(), 3);

        cancel.cancel();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_listener_cancel_closes_channel() {
        let buffer = RingBuffer::<i32>::new(2);
        let cancel = CancellationToken::new();
        let (el, mut rx) = buffer.element_and_listener(cancel.clone());
        assert!(el.is_none());

        cancel.cancel();
        assert!(rx.recv().await.is_none());

        // the registry entry is gone, so writes no longer reach it
        tokio::task::yield_now().await;
        buffer.write(1);
    }

    #[tokio::test]
    async fn test_slow_listener_evicted() {
        let buffer = RingBuffer::new(3);
        let cancel = CancellationToken::new();
        let (_, mut rx) = buffer.element_and_listener(cancel.clone());

        // fill the delivery channel without draining
        for i in 0..LISTENER_BUFFER_SIZE as i32 {
            buffer.write(i);
        }
        // this write finds the channel full and evicts the listener
        buffer.write(-1);
        assert!(cancel.is_cancelled());

        // buffered deliveries drain, then the channel reports closed
        for i in 0..LISTENER_BUFFER_SIZE as i32 {
            assert_eq!(*rx.recv().await.unwrap(), i);
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_two_listeners_same_suffix() {
        let buffer = RingBuffer::new(4);
        buffer.write(0);

        let c1 = CancellationToken::new();
        let c2 = CancellationToken::new();
        let (e1, mut rx1) = buffer.element_and_listener(c1.clone());
        let (e2, mut rx2) = buffer.element_and_listener(c2.clone());
        assert_eq!(**e1.unwrap().value(), 0);
        assert_eq!(**e2.unwrap().value(), 0);

        buffer.write(1);
        buffer.write(2);
        assert_eq!(*rx1.recv().await.unwrap(), 1);
        assert_eq!(*rx1.recv().await.unwrap(), 2);
        assert_eq!(*rx2.recv().await.unwrap(), 1);
        assert_eq!(*rx2.recv().await.unwrap(), 2);
    }

    #[test]
    fn test_wrap_add_widens_past_u64() {
        assert_eq!(wrap_add(19, 2, 20), 1);
        assert_eq!(wrap_add(u64::MAX, 1, 20), 16);
    }

    #[test]
    fn test_wrap_sub() {
        assert_eq!(wrap_sub(5, 2, 10), 3);
        assert_eq!(wrap_sub(1, 3, 10), 8);
        assert_eq!(wrap_sub(0, 1, 10), 9);
        // steps beyond one revolution reduce modulo the size
        assert_eq!(wrap_sub(4, 12, 10), 2);
    }
}
