//! Production replay cache implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::verify::ReplayCache;

/// LRU + TTL replay cache.
///
/// - Prevents nonce reuse within the TTL window
/// - Memory-bounded via `max_entries`
/// - Lock-free concurrent access via `DashMap`
/// - Approximate eviction when at capacity
///
/// # Usage
///
/// ```
/// use wellknown_auth::authn::LruReplayCache;
/// use std::time::Duration;
///
/// // TTL should be at least 2 * max_skew_seconds.
/// let cache = LruReplayCache::new(Duration::from_secs(600), 100_000);
/// ```
pub struct LruReplayCache {
    /// Map of (username_hash, nonce) -> first_seen_time. The username is
    /// hashed to a compact key rather than stored as a string.
    cache: DashMap<([u8; 8], [u8; 16]), Instant>,
    ttl: Duration,
    max_entries: usize,
    /// Counter for periodic cleanup (avoids cleanup on every insert)
    insert_counter: AtomicU64,
}

impl LruReplayCache {
    /// Create a new replay cache with the given TTL and capacity.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            cache: DashMap::with_capacity(max_entries / 4),
            ttl,
            max_entries,
            insert_counter: AtomicU64::new(0),
        }
    }

    /// Remove expired entries.
    ///
    /// Not required for correctness; expired entries are ignored on lookup.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.cache.retain(|_, v| now.duration_since(*v) < self.ttl);
    }

    /// Current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Compact 8-byte key for a username. Collisions only make the cache
    /// stricter (a collision can reject, never admit, a replay).
    fn hash_username(username: &str) -> [u8; 8] {
        let digest = Sha256::digest(username.as_bytes());
        let mut result = [0u8; 8];
        result.copy_from_slice(&digest[0..8]);
        result
    }
}

impl ReplayCache for LruReplayCache {
    fn check_and_insert(&self, username: &str, nonce: &[u8; 16], _timestamp: i64) -> bool {
        let key = (Self::hash_username(username), *nonce);
        let now = Instant::now();

        // Entry API gives atomic check-and-insert (prevents TOCTOU race)
        let result = match self.cache.entry(key) {
            Entry::Occupied(entry) => {
                if now.duration_since(*entry.get()) < self.ttl {
                    false
                } else {
                    entry.replace_entry(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        };

        // Periodic cleanup and eviction, after releasing the entry lock
        if result {
            let count = self.insert_counter.fetch_add(1, Ordering::Relaxed);
            if count % 1000 == 0 {
                self.cleanup_expired();
            }

            if self.cache.len() >= self.max_entries {
                let key_to_remove = self.cache.iter().next().map(|entry| *entry.key());
                if let Some(k) = key_to_remove {
                    self.cache.remove(&k);
                }
            }
        }

        result
    }
}
