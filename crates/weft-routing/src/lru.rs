//! Bounded recency cache with time-based expiry.
//!
//! Backs both the duplicate filter (values are `()`) and the content
//! cache. Expiry is lazy: entries past their TTL are dropped when the
//! key is touched or when capacity pressure forces an eviction sweep.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted: Instant,
    last_access: u64,
}

/// An LRU map bounded by entry count and entry age.
pub struct TimedLru<K, V> {
    entries: HashMap<K, Entry<V>>,
    ttl: Duration,
    capacity: usize,
    access_counter: u64,
}

impl<K: Eq + Hash + Clone, V: Clone> TimedLru<K, V> {
    /// Creates a cache bounded to `capacity` entries of age < `ttl`.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        Self {
            entries: HashMap::new(),
            ttl,
            capacity,
            access_counter: 0,
        }
    }

    /// Inserts a key, evicting the oldest entry on overflow.
    pub fn add(&mut self, key: K, value: V) {
        self.purge_expired();
        while self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if !self.evict_one() {
                break;
            }
        }
        let access = self.next_access();
        self.entries.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
                last_access: access,
            },
        );
    }

    /// Returns true if `key` is present and unexpired, refreshing its
    /// recency.
    pub fn check(&mut self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Returns the unexpired value for `key`, refreshing its recency.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let ttl = self.ttl;
        let expired = match self.entries.get(key) {
            Some(entry) => entry.inserted.elapsed() >= ttl,
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        let access = self.next_access();
        let entry = self.entries.get_mut(key).expect("checked above");
        entry.last_access = access;
        Some(entry.value.clone())
    }

    /// Returns the number of live entries (expired ones included until
    /// next purge).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry past its TTL.
    pub fn purge_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.inserted.elapsed() < ttl);
    }

    fn next_access(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    fn evict_one(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone());
        match oldest {
            Some(key) => {
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }
}
