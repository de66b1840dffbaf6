//! Shared TLS session cache.
//!
//! One table for the whole process, keyed by session identifier. Every
//! worker's `ServerConfig` points at the same cache, so a client can resume
//! on a different thread than the one that negotiated the session.
//!
//! # Design Decisions
//! - One mutex; only the table lookup/insert runs under it
//! - Bounded: inserting at capacity evicts the oldest insertion
//! - Entries older than the timeout are misses and are dropped on sight
//! - Hit/miss/eviction counters are atomics outside the lock

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rustls::server::StoresServerSessions;

use crate::observability::metrics;

struct Entry {
    seq: u64,
    value: Vec<u8>,
    inserted: Instant,
}

#[derive(Default)]
struct Table {
    entries: HashMap<Vec<u8>, Entry>,
    /// Insertion order. Holds stale `(seq, key)` pairs for replaced or
    /// removed entries until they reach the front or the queue is compacted.
    order: VecDeque<(u64, Vec<u8>)>,
    next_seq: u64,
}

impl Table {
    fn evict_oldest(&mut self) -> bool {
        while let Some((seq, key)) = self.order.pop_front() {
            if self.entries.get(&key).is_some_and(|e| e.seq == seq) {
                self.entries.remove(&key);
                return true;
            }
        }
        false
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order
            .retain(|(seq, key)| entries.get(key).is_some_and(|e| e.seq == *seq));
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded, mutex-guarded session store shared by all worker threads.
pub struct SessionCache {
    table: Mutex<Table>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SessionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            capacity: capacity.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` under `key`, evicting the oldest entry when full.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool {
        let evicted = {
            let mut table = self.lock();
            let seq = table.next_seq;
            table.next_seq += 1;

            let mut evicted = false;
            if !table.entries.contains_key(&key) && table.entries.len() >= self.capacity {
                evicted = table.evict_oldest();
            }
            table.order.push_back((seq, key.clone()));
            table.entries.insert(
                key,
                Entry {
                    seq,
                    value,
                    inserted: Instant::now(),
                },
            );
            if table.order.len() > self.capacity * 2 {
                table.compact();
            }
            evicted
        };

        if evicted {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_eviction();
        }
        true
    }

    /// Look up a session without consuming it.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let found = {
            let mut table = self.lock();
            match table.entries.get(key) {
                Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.value.clone()),
                Some(_) => {
                    table.entries.remove(key);
                    None
                }
                None => None,
            }
        };
        self.count(found.is_some());
        found
    }

    /// Remove and return a session.
    pub fn take(&self, key: &[u8]) -> Option<Vec<u8>> {
        let found = {
            let mut table = self.lock();
            table
                .entries
                .remove(key)
                .filter(|entry| entry.inserted.elapsed() < self.ttl)
                .map(|entry| entry.value)
        };
        self.count(found.is_some());
        found
    }

    fn count(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        metrics::record_cache_lookup(hit);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

impl StoresServerSessions for SessionCache {
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> bool {
        SessionCache::put(self, key, value)
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        SessionCache::get(self, key)
    }

    fn take(&self, key: &[u8]) -> Option<Vec<u8>> {
        SessionCache::take(self, key)
    }

    fn can_cache(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn cache(capacity: usize) -> SessionCache {
        SessionCache::new(capacity, Duration::from_secs(60))
    }

    #[test]
    fn test_get_does_not_consume() {
        let cache = cache(4);
        cache.put(b"id".to_vec(), b"state".to_vec());
        assert_eq!(cache.get(b"id"), Some(b"state".to_vec()));
        assert_eq!(cache.get(b"id"), Some(b"state".to_vec()));
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_take_consumes() {
        let cache = cache(4);
        cache.put(b"id".to_vec(), b"state".to_vec());
        assert_eq!(cache.take(b"id"), Some(b"state".to_vec()));
        assert_eq!(cache.take(b"id"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, evictions: 0 });
    }

    #[test]
    fn test_evicts_oldest_insertion() {
        let cache = cache(2);
        cache.put(b"a".to_vec(), b"1".to_vec());
        cache.put(b"b".to_vec(), b"2".to_vec());
        cache.put(b"c".to_vec(), b"3".to_vec());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(b"a"), None);
        assert_eq!(cache.get(b"b"), Some(b"2".to_vec()));
        assert_eq!(cache.get(b"c"), Some(b"3".to_vec()));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replacing_key_does_not_evict() {
        let cache = cache(2);
        cache.put(b"a".to_vec(), b"1".to_vec());
        cache.put(b"b".to_vec(), b"2".to_vec());
        cache.put(b"a".to_vec(), b"1'".to_vec());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);

        // "b" is now the oldest live insertion.
        cache.put(b"c".to_vec(), b"3".to_vec());
        assert_eq!(cache.get(b"b"), None);
        assert_eq!(cache.get(b"a"), Some(b"1'".to_vec()));
    }

    #[test]
    fn test_order_queue_stays_bounded() {
        let cache = cache(3);
        for round in 0..100u8 {
            cache.put(vec![round % 3], vec![round]);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.lock().order.len() <= 6);
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = SessionCache::new(4, Duration::ZERO);
        cache.put(b"id".to_vec(), b"state".to_vec());
        assert_eq!(cache.get(b"id"), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_trait_delegates() {
        let cache = cache(4);
        let store: &dyn StoresServerSessions = &cache;
        assert!(store.can_cache());
        assert!(store.put(b"k".to_vec(), b"v".to_vec()));
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = std::sync::Arc::new(cache(64));
        let writer = {
            let cache = std::sync::Arc::clone(&cache);
            thread::spawn(move || cache.put(b"from-writer".to_vec(), b"x".to_vec()))
        };
        writer.join().unwrap();
        assert_eq!(cache.get(b"from-writer"), Some(b"x".to_vec()));
    }
}
