//! Dedup queue (§4.2): bounded, key-deduplicated FIFO of pending operations.
//!
//! Grounded directly on `original_source/apps/file-brain/services/crawler/queue.py`'s
//! `DedupQueue`: a side table of pending items keyed by `key`, plus a FIFO of
//! keys that only grows when a key transitions from absent to pending. A
//! second `put` for an already-pending key replaces the payload in place
//! without touching the FIFO — the queue position (and so processing order)
//! is governed by the *first* publish. Re-expressed in Rust as a
//! `crossbeam_channel` bounded channel of keys (the same channel idiom the
//! teacher uses for its path/entry pipeline,
//! `examples/thicclatka-nefaxer/src/pipeline/context.rs`) backed by a
//! `Mutex<HashMap<K, V>>` side table.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Condvar, Mutex};

use crossbeam_channel::{Receiver, Sender, bounded};

/// A bounded, key-deduplicated FIFO. `put` may block for backpressure when
/// the channel of pending keys is full; `get` blocks until an item is
/// available. `outstanding` tracks items that have been `get()` but not yet
/// `done()`, so the crawl manager can detect "queue empty and every
/// dequeued operation has finished" (spec §4.10 completion condition) via
/// [`DedupQueue::join`].
pub struct DedupQueue<K, V> {
    items: Mutex<HashMap<K, V>>,
    key_tx: Sender<K>,
    key_rx: Receiver<K>,
    outstanding: Mutex<usize>,
    idle: Condvar,
}

impl<K, V> DedupQueue<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        let (key_tx, key_rx) = bounded(capacity.max(1));
        Self {
            items: Mutex::new(HashMap::new()),
            key_tx,
            key_rx,
            outstanding: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    /// Insert or replace the pending item for `key`. Blocks for backpressure
    /// only when `key` is new and the underlying channel is full.
    pub fn put(&self, key: K, item: V) {
        let mut items = self.items.lock().unwrap();
        let is_new = !items.contains_key(&key);
        items.insert(key.clone(), item);
        if is_new {
            // Drop the lock before the potentially-blocking send so a
            // slow consumer can't deadlock a concurrent put() on a
            // different key.
            drop(items);
            let _ = self.key_tx.send(key);
        }
    }

    /// Block until the next item (in first-publish order) is available,
    /// returning it with its key. Returns `None` only if the queue itself
    /// has been dropped out from under a concurrent caller. Marks the item
    /// outstanding until [`DedupQueue::done`] is called.
    pub fn get(&self) -> Option<(K, V)> {
        let key = self.key_rx.recv().ok()?;
        let item = {
            let mut items = self.items.lock().unwrap();
            // The key is always present: we only ever push a key once, and
            // we only pop it here, removing it from `items` at the same time.
            items.remove(&key).expect("dedup queue invariant violated")
        };
        *self.outstanding.lock().unwrap() += 1;
        Some((key, item))
    }

    /// Like [`DedupQueue::get`], but gives up and returns `None` after
    /// `timeout` with nothing available. Used by worker loops that must
    /// also poll a cancellation flag while idle.
    pub fn get_timeout(&self, timeout: std::time::Duration) -> Option<(K, V)> {
        let key = self.key_rx.recv_timeout(timeout).ok()?;
        let item = {
            let mut items = self.items.lock().unwrap();
            items.remove(&key).expect("dedup queue invariant violated")
        };
        *self.outstanding.lock().unwrap() += 1;
        Some((key, item))
    }

    /// Mark one previously-`get()`'d item as finished (succeeded or failed).
    /// Wakes any thread blocked in [`DedupQueue::join`] once outstanding
    /// work reaches zero.
    pub fn done(&self) {
        let mut outstanding = self.outstanding.lock().unwrap();
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.idle.notify_all();
        }
    }

    /// True if there are no pending keys and nothing dequeued-but-unfinished.
    pub fn is_idle(&self) -> bool {
        *self.outstanding.lock().unwrap() == 0 && self.qsize() == 0
    }

    /// Block until the queue is empty (no pending keys) and every dequeued
    /// item has been marked `done()`.
    pub fn join(&self) {
        loop {
            let outstanding = self.outstanding.lock().unwrap();
            if *outstanding == 0 && self.qsize() == 0 {
                return;
            }
            let _unused = self
                .idle
                .wait_timeout(outstanding, std::time::Duration::from_millis(50))
                .unwrap();
        }
    }

    /// Number of distinct pending keys (not yet dequeued).
    pub fn qsize(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn replacing_a_pending_key_keeps_position_but_replaces_payload() {
        let q: DedupQueue<String, i32> = DedupQueue::new(10);
        q.put("a".into(), 1);
        q.put("b".into(), 2);
        q.put("a".into(), 3); // replace in place, position unchanged

        let (k1, v1) = q.get().unwrap();
        assert_eq!(k1, "a");
        assert_eq!(v1, 3);

        let (k2, v2) = q.get().unwrap();
        assert_eq!(k2, "b");
        assert_eq!(v2, 2);
    }

    #[test]
    fn at_most_one_pending_entry_per_key_under_concurrency() {
        let q: Arc<DedupQueue<String, i32>> = Arc::new(DedupQueue::new(1000));
        let mut handles = Vec::new();
        for i in 0..50 {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                q.put("burst".into(), i);
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // At most one pending entry for the key, regardless of how many
        // publishes raced to get there.
        assert_eq!(q.qsize(), 1);
        let (k, _) = q.get().unwrap();
        assert_eq!(k, "burst");
        assert_eq!(q.qsize(), 0);
    }

    #[test]
    fn distinct_keys_are_all_observed() {
        let q: DedupQueue<i32, ()> = DedupQueue::new(10);
        for i in 0..5 {
            q.put(i, ());
        }
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(q.get().unwrap().0);
        }
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn join_waits_for_outstanding_work_to_complete() {
        let q: Arc<DedupQueue<i32, ()>> = Arc::new(DedupQueue::new(10));
        q.put(1, ());
        let (_, _) = q.get().unwrap(); // now outstanding, not yet done

        let q2 = Arc::clone(&q);
        let worker = thread::spawn(move || {
            thread::sleep(std::time::Duration::from_millis(20));
            q2.done();
        });

        q.join(); // blocks until done() above runs
        worker.join().unwrap();
    }

    #[test]
    fn join_returns_immediately_on_empty_idle_queue() {
        let q: DedupQueue<i32, ()> = DedupQueue::new(10);
        q.join();
    }
}
