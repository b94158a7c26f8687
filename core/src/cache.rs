//! Capacity-bounded LRU cache with TTL expiry and an optional background sweep.
//!
//! Recency order is a doubly linked list threaded through an arena of slots; the key map
//! points into the arena. Every operation, `get` included, runs under one mutex because a
//! hit reorders the list.

use crate::config::CacheConfig;
use crate::error::{Result, SearchError};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpirationPolicy {
    /// Only `put` stamps an entry.
    AfterWrite,
    /// Every successful `get` restamps the entry as well.
    AfterAccess,
}

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    timestamp: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct CacheState<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Entry<K, V>>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used, next to be evicted.
    tail: Option<usize>,
    capacity: usize,
    ttl: Duration,
    policy: ExpirationPolicy,
    /// Bumped by every `clear`.
    epoch: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> CacheState<K, V> {
    fn entry(&self, idx: usize) -> &Entry<K, V> {
        self.slots[idx].as_ref().expect("linked slot is occupied")
    }

    fn entry_mut(&mut self, idx: usize) -> &mut Entry<K, V> {
        self.slots[idx].as_mut().expect("linked slot is occupied")
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let e = self.entry(idx);
            (e.prev, e.next)
        };
        match prev {
            Some(p) => self.entry_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entry_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let e = self.entry_mut(idx);
        e.prev = None;
        e.next = None;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let e = self.entry_mut(idx);
            e.prev = None;
            e.next = old_head;
        }
        match old_head {
            Some(h) => self.entry_mut(h).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn remove_slot(&mut self, idx: usize) -> Entry<K, V> {
        self.detach(idx);
        let entry = self.slots[idx].take().expect("linked slot is occupied");
        self.map.remove(&entry.key);
        self.free.push(idx);
        entry
    }

    fn is_expired(&self, idx: usize, now: Instant) -> bool {
        now.saturating_duration_since(self.entry(idx).timestamp) > self.ttl
    }

    fn get(&mut self, key: &K, now: Instant) -> Option<V> {
        let idx = *self.map.get(key)?;
        if self.is_expired(idx, now) {
            self.remove_slot(idx);
            return None;
        }
        if self.policy == ExpirationPolicy::AfterAccess {
            self.entry_mut(idx).timestamp = now;
        }
        self.detach(idx);
        self.push_front(idx);
        Some(self.entry(idx).value.clone())
    }

    fn put(&mut self, key: K, value: V, now: Instant) {
        if let Some(&idx) = self.map.get(&key) {
            let e = self.entry_mut(idx);
            e.value = value;
            e.timestamp = now;
            self.detach(idx);
            self.push_front(idx);
            return;
        }
        if self.map.len() >= self.capacity {
            if let Some(lru) = self.tail {
                self.remove_slot(lru);
            }
        }
        let entry = Entry { key: key.clone(), value, timestamp: now, prev: None, next: None };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.map.insert(key, idx);
        self.push_front(idx);
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let expired: Vec<usize> = self.map.values().copied().filter(|&idx| self.is_expired(idx, now)).collect();
        for &idx in &expired {
            self.remove_slot(idx);
        }
        expired.len()
    }

    /// Keys from most to least recently used.
    fn keys_by_recency(&self) -> Vec<K> {
        let mut out = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let e = self.entry(idx);
            out.push(e.key.clone());
            cursor = e.next;
        }
        out
    }

    fn clear(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }
}

struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct LruCache<K, V> {
    state: Arc<Mutex<CacheState<K, V>>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(capacity: usize, ttl: Duration, policy: ExpirationPolicy) -> Result<Self> {
        if capacity == 0 {
            return Err(SearchError::invalid_input("cache capacity must be positive"));
        }
        let state = CacheState {
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity,
            ttl,
            policy,
            epoch: 0,
        };
        Ok(Self { state: Arc::new(Mutex::new(state)), sweeper: Mutex::new(None) })
    }

    /// Build from config and start the sweep thread when an interval is configured.
    pub fn from_config(cfg: &CacheConfig) -> Result<Self> {
        let cache = Self::new(cfg.capacity, cfg.ttl(), cfg.policy)?;
        if let Some(interval) = cfg.sweep_interval() {
            cache.start_sweeper(interval)?;
        }
        Ok(cache)
    }

    /// Spawn the periodic expiry sweep. A second call while one is running is a no-op.
    pub fn start_sweeper(&self, interval: Duration) -> Result<()> {
        let mut slot = self.sweeper.lock();
        if slot.is_some() { return Ok(()); }
        let (stop, stopped) = bounded::<()>(1);
        let state = Arc::clone(&self.state);
        let handle = thread::Builder::new().name("cache-sweeper".into()).spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let evicted = state.lock().sweep(Instant::now());
                    if evicted > 0 {
                        tracing::debug!(evicted, "cache sweep");
                    }
                }
                _ => break,
            }
        })?;
        *slot = Some(Sweeper { stop, handle });
        Ok(())
    }

    /// Stop the sweep thread and wait for it to exit.
    pub fn shutdown(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            let _ = sweeper.stop.send(());
            if sweeper.handle.join().is_err() {
                tracing::error!("cache sweeper panicked");
            }
        }
    }

    pub fn is_sweeping(&self) -> bool { self.sweeper.lock().is_some() }

    /// Value for `key` unless absent or expired; a hit becomes most recently used.
    pub fn get(&self, key: &K) -> Option<V> { self.state.lock().get(key, Instant::now()) }

    pub fn put(&self, key: K, value: V) { self.state.lock().put(key, value, Instant::now()) }

    /// Current invalidation epoch. Read it before computing a value that `clear` must discard.
    pub fn epoch(&self) -> u64 { self.state.lock().epoch }

    /// Store `value` only if no `clear` happened since `epoch` was read. The check and the
    /// insert share one lock acquisition, so a concurrent `clear` either runs first and the
    /// value is refused, or runs after and removes it.
    pub fn put_if_current(&self, key: K, value: V, epoch: u64) -> bool {
        let mut state = self.state.lock();
        if state.epoch != epoch { return false; }
        state.put(key, value, Instant::now());
        true
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.state.lock();
        let idx = *state.map.get(key)?;
        Some(state.remove_slot(idx).value)
    }

    /// Evict every expired entry now. Returns how many were removed.
    pub fn sweep(&self) -> usize { self.state.lock().sweep(Instant::now()) }

    /// Every live entry, most recently used first. Each entry goes through `get`,
    /// so expired ones are evicted and, under `AfterAccess`, survivors are restamped.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let keys = state.keys_by_recency();
        let mut out = Vec::with_capacity(keys.len());
        // Least recent first, so the moves to front rebuild the same recency order.
        for key in keys.into_iter().rev() {
            if let Some(v) = state.get(&key, now) {
                out.push((key, v));
            }
        }
        out.reverse();
        out
    }

    pub fn keys(&self) -> Vec<K> { self.snapshot().into_iter().map(|(k, _)| k).collect() }

    /// Entries held, expired ones included until touched or swept.
    pub fn len(&self) -> usize { self.state.lock().map.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn capacity(&self) -> usize { self.state.lock().capacity }
    pub fn clear(&self) { self.state.lock().clear() }
}

impl<K, V> Drop for LruCache<K, V> {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            let _ = sweeper.stop.send(());
            let _ = sweeper.handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize, ttl_ms: u64, policy: ExpirationPolicy) -> LruCache<String, i32> {
        LruCache::new(capacity, Duration::from_millis(ttl_ms), policy).unwrap()
    }

    #[test]
    fn evicts_least_recently_used() {
        let c = cache(2, 60_000, ExpirationPolicy::AfterWrite);
        c.put("A".into(), 1);
        c.put("B".into(), 2);
        assert_eq!(c.get(&"A".into()), Some(1));
        c.put("C".into(), 3);
        assert_eq!(c.get(&"B".into()), None);
        assert_eq!(c.get(&"A".into()), Some(1));
        assert_eq!(c.get(&"C".into()), Some(3));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn put_existing_updates_and_refreshes_recency() {
        let c = cache(2, 60_000, ExpirationPolicy::AfterWrite);
        c.put("A".into(), 1);
        c.put("B".into(), 2);
        c.put("A".into(), 10);
        c.put("C".into(), 3);
        assert_eq!(c.get(&"A".into()), Some(10));
        assert_eq!(c.get(&"B".into()), None);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let c = cache(3, 60_000, ExpirationPolicy::AfterWrite);
        for i in 0..50 {
            c.put(format!("k{i}"), i);
            assert!(c.len() <= 3);
        }
        assert_eq!(c.keys(), vec!["k49".to_string(), "k48".into(), "k47".into()]);
    }

    #[test]
    fn after_write_expires_despite_reads() {
        let c = cache(4, 80, ExpirationPolicy::AfterWrite);
        c.put("A".into(), 1);
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(40));
            let _ = c.get(&"A".into());
        }
        assert_eq!(c.get(&"A".into()), None);
        assert!(c.is_empty());
    }

    #[test]
    fn after_access_refreshes_on_every_hit() {
        let c = cache(4, 150, ExpirationPolicy::AfterAccess);
        c.put("A".into(), 1);
        c.put("B".into(), 2);
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(60));
            assert_eq!(c.get(&"A".into()), Some(1));
        }
        assert_eq!(c.get(&"B".into()), None);
        thread::sleep(Duration::from_millis(250));
        assert_eq!(c.get(&"A".into()), None);
    }

    #[test]
    fn sweep_and_snapshot_evict_expired() {
        let c = cache(4, 50, ExpirationPolicy::AfterWrite);
        c.put("A".into(), 1);
        c.put("B".into(), 2);
        thread::sleep(Duration::from_millis(80));
        c.put("C".into(), 3);
        assert_eq!(c.len(), 3);
        assert_eq!(c.snapshot(), vec![("C".to_string(), 3)]);
        assert_eq!(c.len(), 1);

        thread::sleep(Duration::from_millis(80));
        assert_eq!(c.sweep(), 1);
        assert!(c.is_empty());
    }

    #[test]
    fn snapshot_preserves_recency_order() {
        let c = cache(3, 60_000, ExpirationPolicy::AfterAccess);
        c.put("A".into(), 1);
        c.put("B".into(), 2);
        c.put("C".into(), 3);
        let keys: Vec<String> = c.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["C", "B", "A"]);
        c.put("D".into(), 4);
        assert_eq!(c.get(&"A".into()), None);
    }

    #[test]
    fn background_sweeper_evicts_and_shuts_down() {
        let c = cache(4, 20, ExpirationPolicy::AfterWrite);
        c.start_sweeper(Duration::from_millis(10)).unwrap();
        assert!(c.is_sweeping());
        c.put("A".into(), 1);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(c.len(), 0);
        c.shutdown();
        assert!(!c.is_sweeping());
    }

    #[test]
    fn clear_between_epoch_read_and_put_refuses_the_value() {
        let c = cache(4, 60_000, ExpirationPolicy::AfterAccess);
        let epoch = c.epoch();
        assert!(c.put_if_current("A".into(), 1, epoch));
        let stale = c.epoch();
        c.clear();
        assert!(!c.put_if_current("B".into(), 2, stale));
        assert_eq!(c.get(&"B".into()), None);
        assert!(c.put_if_current("B".into(), 3, c.epoch()));
        assert_eq!(c.get(&"B".into()), Some(3));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(LruCache::<String, i32>::new(0, Duration::from_secs(1), ExpirationPolicy::AfterWrite).is_err());
    }

    #[test]
    fn concurrent_puts_respect_capacity() {
        let c = Arc::new(cache(16, 60_000, ExpirationPolicy::AfterAccess));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let c = Arc::clone(&c);
                thread::spawn(move || {
                    for i in 0..200 {
                        c.put(format!("{t}-{i}"), i);
                        let _ = c.get(&format!("{t}-{}", i / 2));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.len(), 16);
        assert_eq!(c.keys().len(), 16);
    }
}
