//! Generic storage operations
//!
//! Implements DEL, EXISTS, TYPE, OBJECT, MEMORY USAGE, the EXPIRE family,
//! TTL/PTTL, PERSIST and the keyspace counters.
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::storage::Store;
use crate::storage::store::AccessMode;
use crate::storage::types::{Encoding, Entry, ObjectKind};
use crate::storage::value::now_ms;

impl Store {
    /// Live entry for a key, after lazy expiry. A wildcard lookup never fails.
    fn lookup(&mut self, key: &[u8]) -> Option<&Entry> {
        match self.resolve(key, None, AccessMode::Read) {
            Ok((entry, _)) => entry.map(|e| &*e),
            Err(_) => None,
        }
    }

    // ==================== Keys ====================

    /// Delete keys. Returns how many existed.
    pub fn del(&mut self, keys: &[Bytes]) -> usize {
        let mut deleted = 0;
        for key in keys {
            // Expired keys count as missing
            self.expire_if_needed(key);
            if self.delete(key) {
                deleted += 1;
            }
        }
        deleted
    }

    #[inline]
    pub fn exists(&mut self, key: &[u8]) -> bool {
        self.lookup(key).is_some()
    }

    /// TYPE
    pub fn kind_of(&mut self, key: &[u8]) -> Option<ObjectKind> {
        self.lookup(key).map(|e| e.kind())
    }

    /// OBJECT ENCODING
    pub fn encoding_of(&mut self, key: &[u8]) -> Option<Encoding> {
        self.lookup(key).map(|e| e.data.encoding())
    }

    /// OBJECT IDLETIME in seconds. Not tracked under LFU policies.
    pub fn idle_time(&mut self, key: &[u8]) -> Result<Option<u64>> {
        if self.config.maxmemory_policy.is_lfu() {
            return Err(Error::InvalidParameter(
                "An LFU maxmemory policy is selected, idle time not tracked. Please note that when switching between policies at runtime LRU and LFU data will take some time to adjust.",
            ));
        }
        Ok(self.lookup(key).map(|e| e.idle_time()))
    }

    /// OBJECT FREQ. Only tracked under LFU policies.
    pub fn lfu_freq(&mut self, key: &[u8]) -> Result<Option<u8>> {
        if !self.config.maxmemory_policy.is_lfu() {
            return Err(Error::InvalidParameter(
                "An LFU maxmemory policy is not selected, access frequency not tracked. Please note that when switching between policies at runtime LRU and LFU data will take some time to adjust.",
            ));
        }
        let decay_time = self.config.lfu_decay_time;
        Ok(self.lookup(key).map(|e| e.lfu_decayed(decay_time)))
    }

    /// MEMORY USAGE: bytes charged to used_memory for this key
    pub fn memory_usage_of(&mut self, key: &[u8]) -> Option<usize> {
        self.lookup(key).map(|e| e.charge())
    }

    // ==================== Expiry ====================

    /// Set a relative expiry in seconds. Returns false if the key is missing.
    pub fn expire(&mut self, key: &[u8], seconds: i64) -> Result<bool> {
        let ms = seconds
            .checked_mul(1000)
            .ok_or(Error::InvalidParameter("invalid expire time in 'expire' command"))?;
        self.pexpire(key, ms)
    }

    /// Set a relative expiry in milliseconds
    pub fn pexpire(&mut self, key: &[u8], ms: i64) -> Result<bool> {
        let when = now_ms()
            .checked_add(ms)
            .ok_or(Error::InvalidParameter("invalid expire time in 'pexpire' command"))?;
        Ok(self.pexpireat(key, when))
    }

    /// Set an absolute deadline in unix milliseconds. A deadline already in
    /// the past deletes the key right away.
    pub fn pexpireat(&mut self, key: &[u8], when: i64) -> bool {
        if self.lookup(key).is_none() {
            return false;
        }
        if when <= now_ms() {
            self.delete(key);
        } else {
            self.expires.insert(Bytes::copy_from_slice(key), when);
        }
        true
    }

    /// Remaining time to live in milliseconds: -2 if missing, -1 if no expiry
    pub fn pttl(&mut self, key: &[u8]) -> i64 {
        if self.lookup(key).is_none() {
            return -2;
        }
        match self.deadline(key) {
            Some(when) => (when - now_ms()).max(0),
            None => -1,
        }
    }

    /// Remaining time to live in seconds, rounded like Redis
    pub fn ttl(&mut self, key: &[u8]) -> i64 {
        match self.pttl(key) {
            ms if ms < 0 => ms,
            ms => (ms + 500) / 1000,
        }
    }

    /// Remove the expiry. Returns true if there was one.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        if self.lookup(key).is_none() {
            return false;
        }
        self.expires.remove(key).is_some()
    }

    // ==================== Keyspace ====================

    /// Number of keys, including expired ones not yet reclaimed
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of keys with an expiry
    #[inline]
    pub fn volatile_len(&self) -> usize {
        self.expires.len()
    }

    /// Remove every key
    pub fn flush(&mut self) {
        self.data.clear();
        self.expires.clear();
        self.eviction_pool.clear();
        self.used_memory = 0;
    }
}
