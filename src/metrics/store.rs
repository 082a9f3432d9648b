//! Multi-key fixed-length circular sample store.
//!
//! ## Layout
//!
//! ```text
//!   buffer: one flat Vec<Option<f64>>, split into blocks of `capacity`
//!   capacity = window + 1
//!
//!   key A -> block 0   [ a0 | a1 | a2 ]   cursor = 1   (a1 is newest)
//!   key B -> block 1   [ b0 | -- | -- ]   cursor = 0   (b0 is newest)
//!
//!   all() = { a0, a2 }   (each key's newest slot is left out)
//! ```
//!
//! Keys map to dense block indices handed out on `init` and recycled on
//! `delete`, so any hashable key type works. A recycled block is always
//! cleared first and never leaks a previous key's samples.
//!
//! Misuse is tolerated: `add`/`delete` on an unknown key are no-ops, and
//! `get`/`has` on an unknown key report nothing. The only error surfaced
//! is [`MonitorError::InsufficientSamples`] from `median`/`mad` when no
//! settled sample exists.

use std::cell::Cell;
use std::collections::HashMap;
use std::hash::Hash;

use super::stats;
use crate::error::{MonitorError, Result};

/// Write position of a tracked key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Registered, nothing written since; the next `add` goes to slot 0.
    Fresh,
    /// Slot holding the most recent write.
    At(usize),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    block: usize,
    cursor: Cursor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MedianCache {
    Stale,
    Fresh(f64),
}

#[derive(Debug)]
pub struct SampleStore<K> {
    window: usize,
    capacity: usize,
    entries: HashMap<K, Entry>,
    free_blocks: Vec<usize>,
    buffer: Vec<Option<f64>>,
    median: Cell<MedianCache>,
}

impl<K: Eq + Hash + Clone> SampleStore<K> {
    /// Creates a store retaining `window` settled samples per key.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            capacity: window + 1,
            entries: HashMap::new(),
            free_blocks: Vec::new(),
            buffer: Vec::new(),
            median: Cell::new(MedianCache::Stale),
        }
    }

    /// Starts tracking `key`. Re-initialising a tracked key only rewinds
    /// its cursor; stored values stay until overwritten.
    pub fn init(&mut self, key: K) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.cursor = Cursor::Fresh;
        } else {
            let block = self.allocate_block();
            self.entries.insert(
                key,
                Entry {
                    block,
                    cursor: Cursor::Fresh,
                },
            );
        }
        self.invalidate();
    }

    /// Writes `value` into the next slot of `key`'s window, overwriting
    /// the oldest sample once the window has wrapped.
    pub fn add(&mut self, key: &K, value: f64) {
        let capacity = self.capacity;
        let Some(entry) = self.entries.get_mut(key) else {
            return;
        };

        let slot = match entry.cursor {
            Cursor::Fresh => 0,
            Cursor::At(i) => (i + 1) % capacity,
        };
        entry.cursor = Cursor::At(slot);
        self.buffer[entry.block * capacity + slot] = Some(value);
        self.invalidate();
    }

    /// Stops tracking `key` and clears its window.
    pub fn delete(&mut self, key: &K) {
        let Some(entry) = self.entries.remove(key) else {
            return;
        };
        self.block_mut(entry.block).fill(None);
        self.free_blocks.push(entry.block);
        self.invalidate();
    }

    /// Every finite sample of `key` in slot order, newest included.
    pub fn get(&self, key: &K) -> Vec<f64> {
        match self.entries.get(key) {
            Some(entry) => finite(self.block(entry.block)).collect(),
            None => Vec::new(),
        }
    }

    pub fn has(&self, key: &K) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| finite(self.block(entry.block)).next().is_some())
    }

    /// Wipes every window. Tracked keys stay tracked.
    pub fn reset(&mut self) {
        self.buffer.fill(None);
        self.invalidate();
    }

    /// True once every tracked key has written its last slot with a
    /// positive value, i.e. has wrapped its window at least once.
    pub fn is_complete(&self) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        self.entries.values().all(|entry| {
            matches!(self.block(entry.block)[self.capacity - 1], Some(v) if v > 0.0)
        })
    }

    /// Settled samples of every tracked key: all finite values except the
    /// slot under each key's own cursor.
    pub fn all(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.entries.len() * self.window);
        for entry in self.entries.values() {
            let newest = match entry.cursor {
                Cursor::At(i) => Some(i),
                Cursor::Fresh => None,
            };
            out.extend(
                self.block(entry.block)
                    .iter()
                    .enumerate()
                    .filter(|(slot, _)| Some(*slot) != newest)
                    .filter_map(|(_, v)| v.filter(|v| v.is_finite())),
            );
        }
        out
    }

    /// Median of [`all`](Self::all), cached until the next mutation.
    pub fn median(&self) -> Result<f64> {
        if let MedianCache::Fresh(value) = self.median.get() {
            return Ok(value);
        }
        let value = stats::median(&self.all()).ok_or(MonitorError::InsufficientSamples)?;
        self.median.set(MedianCache::Fresh(value));
        Ok(value)
    }

    /// Median absolute deviation of [`all`](Self::all). Not cached.
    pub fn mad(&self) -> Result<f64> {
        stats::mad(&self.all()).ok_or(MonitorError::InsufficientSamples)
    }

    /// Most recently written value of `key`, if finite.
    pub fn latest(&self, key: &K) -> Option<f64> {
        let entry = self.entries.get(key)?;
        match entry.cursor {
            Cursor::At(i) => self.block(entry.block)[i].filter(|v| v.is_finite()),
            Cursor::Fresh => None,
        }
    }

    /// Up to `n` finite samples of `key` in write order, newest last.
    pub fn recent(&self, key: &K, n: usize) -> Vec<f64> {
        let Some(entry) = self.entries.get(key) else {
            return Vec::new();
        };
        let block = self.block(entry.block);
        let start = match entry.cursor {
            Cursor::At(i) => i + 1,
            Cursor::Fresh => 0,
        };
        let ordered: Vec<f64> = (0..self.capacity)
            .filter_map(|k| block[(start + k) % self.capacity])
            .filter(|v| v.is_finite())
            .collect();
        let skip = ordered.len().saturating_sub(n);
        ordered[skip..].to_vec()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // ── Internals ───────────────────────────────────────────────

    fn invalidate(&self) {
        self.median.set(MedianCache::Stale);
    }

    fn allocate_block(&mut self) -> usize {
        if let Some(block) = self.free_blocks.pop() {
            return block;
        }
        let block = self.buffer.len() / self.capacity;
        self.buffer.resize(self.buffer.len() + self.capacity, None);
        block
    }

    fn block(&self, block: usize) -> &[Option<f64>] {
        let start = block * self.capacity;
        &self.buffer[start..start + self.capacity]
    }

    fn block_mut(&mut self, block: usize) -> &mut [Option<f64>] {
        let start = block * self.capacity;
        &mut self.buffer[start..start + self.capacity]
    }
}

fn finite(block: &[Option<f64>]) -> impl Iterator<Item = f64> + '_ {
    block.iter().filter_map(|v| v.filter(|v| v.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut v: Vec<f64>) -> Vec<f64> {
        v.sort_by(f64::total_cmp);
        v
    }

    #[test]
    fn three_adds_with_window_two() {
        let mut store = SampleStore::new(2);
        store.init(0u32);
        store.add(&0, 10.0);
        store.add(&0, 12.0);
        store.add(&0, 11.0);

        assert_eq!(store.capacity(), 3);
        assert_eq!(store.get(&0), vec![10.0, 12.0, 11.0]);
        assert_eq!(sorted(store.all()), vec![10.0, 12.0]);
        assert_eq!(store.median().unwrap(), 11.0);
        assert_eq!(store.mad().unwrap(), 1.0);
    }

    #[test]
    fn newest_sample_is_in_get_but_not_in_all() {
        let mut store = SampleStore::new(4);
        store.init(1u32);
        store.add(&1, 5.0);
        store.add(&1, 7.0);

        assert!(store.get(&1).contains(&7.0));
        assert_eq!(store.all(), vec![5.0]);
    }

    #[test]
    fn exclusion_follows_each_keys_own_cursor() {
        let mut store = SampleStore::new(3);
        store.init(0u32);
        store.init(1u32);
        store.add(&0, 1.0);
        store.add(&0, 2.0);
        store.add(&0, 3.0);
        store.add(&1, 100.0);

        // key 0 keeps 1 and 2, key 1 has only its newest sample
        assert_eq!(sorted(store.all()), vec![1.0, 2.0]);
    }

    #[test]
    fn wrap_overwrites_oldest_slot() {
        let mut store = SampleStore::new(2);
        store.init(0u32);
        for v in [1.0, 2.0, 3.0, 4.0] {
            store.add(&0, v);
        }
        // slot 0 overwritten by the fourth write
        assert_eq!(store.get(&0), vec![4.0, 2.0, 3.0]);
        assert_eq!(sorted(store.all()), vec![2.0, 3.0]);
        assert_eq!(store.recent(&0, 5), vec![2.0, 3.0, 4.0]);
        assert_eq!(store.recent(&0, 2), vec![3.0, 4.0]);
        assert_eq!(store.latest(&0), Some(4.0));
    }

    #[test]
    fn completion_requires_every_tracked_key() {
        let mut store = SampleStore::new(2);
        assert!(!store.is_complete());

        store.init(0u32);
        store.init(1u32);
        for v in [1.0, 2.0, 3.0] {
            store.add(&0, v);
        }
        assert!(!store.is_complete());

        for v in [4.0, 5.0, 6.0] {
            store.add(&1, v);
        }
        assert!(store.is_complete());

        store.add(&0, 7.0);
        assert!(store.is_complete());
    }

    #[test]
    fn completion_needs_positive_last_slot() {
        let mut store = SampleStore::new(1);
        store.init(0u32);
        store.add(&0, 3.0);
        store.add(&0, 0.0);
        assert!(!store.is_complete());
        store.add(&0, 2.0);
        store.add(&0, f64::NAN);
        assert!(!store.is_complete());
    }

    #[test]
    fn delete_isolates_other_keys() {
        let mut store = SampleStore::new(3);
        store.init(1u32);
        store.init(2u32);
        store.add(&1, 10.0);
        store.add(&2, 20.0);
        store.add(&2, 21.0);
        let before = store.get(&2);

        store.delete(&1);

        assert_eq!(store.get(&2), before);
        assert!(!store.has(&1));
        assert!(store.get(&1).is_empty());
        assert!(!store.contains(&1));
        assert_eq!(store.keys().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn has_reports_finite_samples_only() {
        let mut store = SampleStore::new(3);
        store.init(0u32);
        assert!(!store.has(&0));

        store.add(&0, 5.0);
        assert!(store.has(&0));

        store.init(1u32);
        store.add(&1, f64::NAN);
        store.add(&1, f64::NEG_INFINITY);
        assert!(!store.has(&1));
        store.add(&1, 2.0);
        assert!(store.has(&1));

        store.reset();
        assert!(!store.has(&0) && !store.has(&1));
    }

    #[test]
    fn recycled_block_never_leaks_samples() {
        let mut store = SampleStore::new(2);
        store.init("old");
        store.add(&"old", 9.0);
        store.add(&"old", 8.0);
        store.delete(&"old");

        store.init("new");
        assert!(store.get(&"new").is_empty());
        assert!(store.all().is_empty());
        store.add(&"new", 1.0);
        assert_eq!(store.get(&"new"), vec![1.0]);
    }

    #[test]
    fn median_is_cached_until_mutation() {
        let mut store = SampleStore::new(4);
        store.init(0u32);
        for v in [10.0, 20.0, 30.0] {
            store.add(&0, v);
        }
        assert_eq!(store.median.get(), MedianCache::Stale);
        let first = store.median().unwrap();
        assert_eq!(store.median.get(), MedianCache::Fresh(15.0));
        assert_eq!(store.median().unwrap(), first);
        assert_eq!(first, 15.0);

        store.add(&0, 40.0);
        assert_eq!(store.median.get(), MedianCache::Stale);
        assert_eq!(store.median().unwrap(), 20.0);
        assert_eq!(store.median.get(), MedianCache::Fresh(20.0));

        store.delete(&0);
        assert!(matches!(store.median(), Err(MonitorError::InsufficientSamples)));
    }

    #[test]
    fn reset_invalidates_cached_median() {
        let mut store = SampleStore::new(2);
        store.init(0u32);
        store.add(&0, 1.0);
        store.add(&0, 2.0);
        assert!(store.median().is_ok());

        store.reset();
        assert!(matches!(store.median(), Err(MonitorError::InsufficientSamples)));
    }

    #[test]
    fn untracked_keys_are_silently_ignored() {
        let mut store = SampleStore::new(2);
        store.init(0u32);
        store.add(&0, 5.0);
        store.add(&0, 6.0);
        let all = store.all();

        store.add(&42, 1.0);
        store.delete(&42);

        assert_eq!(store.all(), all);
        assert_eq!(store.get(&0), vec![5.0, 6.0]);
        assert!(!store.has(&42));
        assert!(store.get(&42).is_empty());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn reset_twice_matches_reset_once() {
        let mut store = SampleStore::new(2);
        store.init(0u32);
        store.init(1u32);
        store.add(&0, 5.0);
        store.add(&1, 6.0);

        store.reset();
        store.reset();

        assert_eq!(store.len(), 2);
        assert!(store.contains(&0) && store.contains(&1));
        assert!(!store.has(&0) && !store.has(&1));
        assert!(store.all().is_empty());
    }

    #[test]
    fn non_finite_values_are_stored_but_hidden() {
        let mut store = SampleStore::new(3);
        store.init(0u32);
        store.add(&0, f64::NAN);
        store.add(&0, f64::INFINITY);
        assert!(!store.has(&0));

        store.add(&0, 4.0);
        store.add(&0, 5.0);
        assert_eq!(store.get(&0), vec![4.0, 5.0]);
        assert_eq!(store.all(), vec![4.0]);
    }

    #[test]
    fn reinit_rewinds_cursor_without_clearing() {
        let mut store = SampleStore::new(2);
        store.init(0u32);
        store.add(&0, 1.0);
        store.add(&0, 2.0);

        store.init(0);
        assert_eq!(store.get(&0), vec![1.0, 2.0]);
        assert_eq!(store.latest(&0), None);

        store.add(&0, 3.0);
        assert_eq!(store.get(&0), vec![3.0, 2.0]);
        assert_eq!(store.all(), vec![2.0]);
    }

    #[test]
    fn fresh_key_has_no_settled_samples() {
        let mut store = SampleStore::<u32>::new(5);
        store.init(0);
        assert!(store.all().is_empty());
        assert!(matches!(store.mad(), Err(MonitorError::InsufficientSamples)));
    }
}
