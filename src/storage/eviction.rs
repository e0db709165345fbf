//! Memory eviction module
//!
//! Implements Redis-compatible eviction policies using sampling-based algorithms.
//! Supports: noeviction, volatile-lru, allkeys-lru, volatile-lfu, allkeys-lfu,
//! volatile-random, allkeys-random, volatile-ttl
//!
//! The LRU, LFU and TTL policies keep an eviction pool: a small sorted array
//! of the best candidates seen across sampling rounds. Every candidate gets a
//! score where higher means "evict sooner" (idle seconds, inverted LFU
//! counter, inverted deadline), so one pool serves all three.

use bytes::Bytes;

use super::Store;
use crate::config::MaxMemoryPolicy;

/// One sampled eviction candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub key: Bytes,
    /// Higher is a better eviction candidate
    pub score: u64,
}

/// Bounded array of candidates sorted by ascending score.
///
/// It caches samples over the store and is not a source of truth: a pooled
/// key may have been deleted since it was sampled.
#[derive(Debug, Clone)]
pub struct EvictionPool {
    entries: Vec<PoolEntry>,
    capacity: usize,
}

impl EvictionPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a candidate at its sorted position. When the pool is full the
    /// candidate must beat the lowest score, which is dropped to make room.
    /// A key already pooled has its score refreshed. Returns true if inserted.
    pub fn insert(&mut self, key: Bytes, score: u64) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| e.key == key) {
            self.entries.remove(pos);
        }
        if self.entries.len() >= self.capacity {
            if score <= self.entries[0].score {
                return false;
            }
            self.entries.remove(0);
        }
        let pos = self.entries.partition_point(|e| e.score <= score);
        self.entries.insert(pos, PoolEntry { key, score });
        true
    }

    /// Remove and return the highest-scored candidate
    #[inline]
    pub fn pop_worst(&mut self) -> Option<PoolEntry> {
        self.entries.pop()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolEntry> {
        self.entries.iter()
    }
}

/// Result of an eviction attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionResult {
    /// Number of keys evicted
    pub evicted: usize,
    /// Bytes freed
    pub bytes_freed: usize,
    /// used_memory is at or below maxmemory afterwards
    pub under_limit: bool,
}

impl Store {
    /// Sample up to `maxmemory_samples` keys from the policy's universe into
    /// the eviction pool. Returns the number of keys sampled.
    pub fn eviction_pool_populate(&mut self) -> usize {
        let policy = self.config.maxmemory_policy;
        if policy == MaxMemoryPolicy::NoEviction || policy.is_random() {
            return 0;
        }

        let universe = if policy.is_volatile() {
            self.expires.len()
        } else {
            self.data.len()
        };
        if universe == 0 {
            return 0;
        }
        let lfu_decay_time = self.config.lfu_decay_time;

        // Sampling is with replacement; a repeat just refreshes its pool slot
        let mut sampled = 0;
        for _ in 0..self.config.maxmemory_samples.max(1) {
            let candidate = if policy.is_volatile() {
                self.expires.random_slot().map(|(k, &when)| (k.clone(), when))
            } else {
                self.data.random_slot().map(|(k, _)| (k.clone(), 0))
            };
            let Some((key, deadline)) = candidate else {
                break;
            };
            let Some(entry) = self.data.get(&key) else {
                continue;
            };

            let score = if policy.is_lru() {
                entry.idle_time()
            } else if policy.is_lfu() {
                255 - entry.lfu_decayed(lfu_decay_time) as u64
            } else {
                // volatile-ttl: the sooner the deadline, the higher the score
                u64::MAX - deadline.max(0) as u64
            };
            self.eviction_pool.insert(key, score);
            sampled += 1;
        }
        sampled
    }

    /// A uniformly random key from the policy's universe
    fn random_eviction_candidate(&self, volatile: bool) -> Option<Bytes> {
        if volatile {
            self.expires.random_slot().map(|(k, _)| k.clone())
        } else {
            self.data.random_slot().map(|(k, _)| k.clone())
        }
    }

    /// Evict keys until used_memory is back under maxmemory or nothing is
    /// left to evict. No-op when maxmemory is 0 or the policy is noeviction.
    pub fn evict(&mut self) -> EvictionResult {
        let mut result = EvictionResult::default();
        let policy = self.config.maxmemory_policy;
        if self.config.maxmemory == 0 || policy == MaxMemoryPolicy::NoEviction {
            result.under_limit = !self.over_maxmemory();
            return result;
        }

        while self.over_maxmemory() {
            let key = if policy.is_random() {
                match self.random_eviction_candidate(policy.is_volatile()) {
                    Some(key) => key,
                    None => break,
                }
            } else {
                match self.eviction_pool.pop_worst() {
                    Some(candidate) => candidate.key,
                    None => {
                        if self.eviction_pool_populate() == 0 {
                            break;
                        }
                        continue;
                    }
                }
            };

            // Pooled keys may be gone, or no longer volatile
            let still_eligible = if policy.is_volatile() {
                self.expires.contains_key(&key)
            } else {
                self.data.contains_key(&key)
            };
            if !still_eligible {
                continue;
            }

            if let Some(freed) = self.delete_entry(&key) {
                result.evicted += 1;
                result.bytes_freed += freed;
                self.stats.evicted_keys += 1;
                log::debug!(
                    "evicted key {:?} under {} ({} bytes)",
                    String::from_utf8_lossy(&key),
                    policy,
                    freed
                );
            }
        }

        result.under_limit = !self.over_maxmemory();
        if !result.under_limit {
            log::warn!(
                "eviction under {} left used_memory {} above maxmemory {}",
                policy,
                self.used_memory,
                self.config.maxmemory
            );
        }
        result
    }
}
