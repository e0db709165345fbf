use bytes::Bytes;

use super::dict::Dict;
use super::eviction::EvictionPool;
use super::types::{DataType, ENTRY_OVERHEAD, Entry, ObjectKind};
use super::value::now_ms;
use crate::config::Config;
use crate::error::{Error, Result};

/// Whether an access reads or mutates the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Outcome of `Store::access`
#[derive(Debug)]
pub struct Access<'a> {
    /// The live value, None if the key does not exist
    pub value: Option<&'a DataType>,
    /// The key existed but its deadline had passed; it is now deleted
    pub expired: bool,
}

impl Access<'_> {
    #[inline]
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }
}

/// Counters exposed through `Store::stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Keys removed because their deadline passed (lazy and active)
    pub expired_keys: u64,
    pub evicted_keys: u64,
    pub expire_cycles: u64,
    /// Active expire cycles that stopped on the time budget
    pub expire_time_limit_hits: u64,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
}

/// Bytes charged for one key
#[inline]
pub(crate) fn charge_for(key: &[u8], data: &DataType) -> usize {
    key.len() + ENTRY_OVERHEAD + data.memory_usage()
}

/// Rejects a new structure whose own allocation could never fit under
/// `maxmemory`, before anything is allocated
pub(crate) fn ensure_fits(config: &Config, bytes: usize) -> Result<()> {
    if config.maxmemory > 0 && bytes as u64 > config.maxmemory {
        log::warn!(
            "refusing to allocate {} bytes with maxmemory {}",
            bytes,
            config.maxmemory
        );
        return Err(Error::OutOfMemory);
    }
    Ok(())
}

/// Single-threaded key-value store.
///
/// Values and expiry deadlines live in two parallel dictionaries. Every
/// lookup goes through the accessor, which enforces lazy expiry and type
/// checks and keeps `used_memory` exact.
///
/// Type-specific operations are implemented in separate modules under `ops/`
pub struct Store {
    /// key -> value
    pub(crate) data: Dict<Entry>,
    /// key -> absolute deadline in milliseconds
    pub(crate) expires: Dict<i64>,
    /// Sum of all entry charges
    pub(crate) used_memory: usize,
    pub(crate) config: Config,
    pub(crate) eviction_pool: EvictionPool,
    pub(crate) stats: StoreStats,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Store {
    pub fn new(config: Config) -> Self {
        Self {
            data: Dict::new(),
            expires: Dict::new(),
            used_memory: 0,
            eviction_pool: EvictionPool::new(config.maxmemory_eviction_pool_size),
            config,
            stats: StoreStats::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ==================== Accessor ====================

    /// Look a key up, enforcing lazy expiry and the expected kind.
    ///
    /// An elapsed deadline deletes the key and reports `expired`. A value of
    /// another kind than `expected` yields `WrongType`. Writes stamp the
    /// key's recency (LFU counter under LFU policies, LRU clock otherwise).
    pub fn access(
        &mut self,
        key: &[u8],
        expected: Option<ObjectKind>,
        mode: AccessMode,
    ) -> Result<Access<'_>> {
        let (entry, expired) = self.resolve(key, expected, mode)?;
        Ok(Access {
            value: entry.map(|e| &e.data),
            expired,
        })
    }

    pub(crate) fn resolve(
        &mut self,
        key: &[u8],
        expected: Option<ObjectKind>,
        mode: AccessMode,
    ) -> Result<(Option<&mut Entry>, bool)> {
        let expired = self.expire_if_needed(key);

        let policy = self.config.maxmemory_policy;
        let lfu_log_factor = self.config.lfu_log_factor;
        let lfu_decay_time = self.config.lfu_decay_time;

        let Some(entry) = self.data.get_mut(key) else {
            self.stats.keyspace_misses += 1;
            return Ok((None, expired));
        };
        if let Some(kind) = expected
            && entry.kind() != kind
        {
            return Err(Error::WrongType);
        }
        self.stats.keyspace_hits += 1;

        if mode == AccessMode::Write {
            if policy.is_lfu() {
                entry.touch_lfu(lfu_log_factor, lfu_decay_time);
            } else {
                entry.touch_lru();
            }
        }
        Ok((Some(entry), expired))
    }

    /// Typed read access
    pub(crate) fn read_value(&mut self, key: &[u8], kind: ObjectKind) -> Result<Option<&DataType>> {
        let (entry, _) = self.resolve(key, Some(kind), AccessMode::Read)?;
        Ok(entry.map(|e| &e.data))
    }

    /// Run `f` against an existing value of `kind` and re-charge its memory.
    /// Ok(None) if the key does not exist.
    pub(crate) fn modify<T>(
        &mut self,
        key: &[u8],
        kind: ObjectKind,
        f: impl FnOnce(&mut DataType) -> Result<T>,
    ) -> Result<Option<T>> {
        let (Some(entry), _) = self.resolve(key, Some(kind), AccessMode::Write)? else {
            return Ok(None);
        };
        let result = f(&mut entry.data);
        let new_charge = charge_for(key, &entry.data);
        let old_charge = std::mem::replace(&mut entry.charge, new_charge);
        self.used_memory = self.used_memory - old_charge + new_charge;
        result.map(Some)
    }

    /// Like `modify`, creating the value with `create` when the key is absent.
    /// `f` learns whether the value was just created. A key created here is
    /// removed again if `f` fails.
    pub(crate) fn modify_or_create<T>(
        &mut self,
        key: &[u8],
        kind: ObjectKind,
        create: impl FnOnce(&Config) -> Result<DataType>,
        f: impl FnOnce(&mut DataType, bool) -> Result<T>,
    ) -> Result<T> {
        let (entry, _) = self.resolve(key, Some(kind), AccessMode::Write)?;
        let created = entry.is_none();
        if created {
            let data = create(&self.config)?;
            self.insert_entry(Bytes::copy_from_slice(key), data);
        }

        match self.modify(key, kind, |data| f(data, created)) {
            Ok(Some(out)) => Ok(out),
            Ok(None) => Err(Error::KeyNotFound),
            Err(e) => {
                if created {
                    self.delete(key);
                }
                Err(e)
            }
        }
    }

    /// Fail with AlreadyExists if the key holds a live value of any kind
    pub(crate) fn ensure_absent(&mut self, key: &[u8]) -> Result<()> {
        match self.resolve(key, None, AccessMode::Read)? {
            (Some(_), _) => Err(Error::AlreadyExists),
            (None, _) => Ok(()),
        }
    }

    /// Store a value, replacing whatever the key held. The expiry is kept.
    pub(crate) fn insert_entry(&mut self, key: Bytes, data: DataType) {
        let mut entry = Entry::new(data);
        entry.charge = charge_for(&key, &entry.data);
        self.used_memory += entry.charge;
        if let Some(old) = self.data.insert(key, entry) {
            self.used_memory -= old.charge;
        }
    }

    // ==================== Deletion and expiry ====================

    /// Remove a key from both maps. Returns the bytes released.
    pub(crate) fn delete_entry(&mut self, key: &[u8]) -> Option<usize> {
        self.expires.remove(key);
        let entry = self.data.remove(key)?;
        self.used_memory -= entry.charge;
        Some(entry.charge)
    }

    /// Remove a key from both maps. Returns true if it existed.
    #[inline]
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.delete_entry(key).is_some()
    }

    /// Deadline of a key in milliseconds, ignoring whether it has passed
    #[inline]
    pub(crate) fn deadline(&self, key: &[u8]) -> Option<i64> {
        self.expires.get(key).copied()
    }

    /// Lazy expiry: delete the key if its deadline has passed.
    pub(crate) fn expire_if_needed(&mut self, key: &[u8]) -> bool {
        match self.deadline(key) {
            Some(when) if when <= now_ms() => {
                self.delete_entry(key);
                self.stats.expired_keys += 1;
                true
            }
            _ => false,
        }
    }

    // ==================== Memory ====================

    /// Exact sum of the charges of all live entries
    #[inline]
    pub fn used_memory(&self) -> usize {
        self.used_memory
    }

    #[inline]
    pub fn over_maxmemory(&self) -> bool {
        self.config.maxmemory > 0 && self.used_memory as u64 > self.config.maxmemory
    }

    /// Called before writes that can grow memory. Evicts under the configured
    /// policy; fails with OutOfMemory if the store is still over the ceiling.
    pub fn check_oom(&mut self) -> Result<()> {
        if !self.over_maxmemory() {
            return Ok(());
        }
        self.evict();
        if self.over_maxmemory() {
            return Err(Error::OutOfMemory);
        }
        Ok(())
    }

    #[inline]
    pub fn stats(&self) -> StoreStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaxMemoryPolicy;

    fn string(v: &'static [u8]) -> DataType {
        DataType::String(Bytes::from_static(v))
    }

    #[test]
    fn test_access_missing_and_present() {
        let mut store = Store::default();
        let access = store.access(b"k", None, AccessMode::Read).unwrap();
        assert!(!access.exists());
        assert!(!access.expired);

        store.insert_entry(Bytes::from_static(b"k"), string(b"v"));
        let access = store
            .access(b"k", Some(ObjectKind::String), AccessMode::Read)
            .unwrap();
        assert!(access.exists());
        assert_eq!(access.value.unwrap().as_string().unwrap().as_ref(), b"v");
    }

    #[test]
    fn test_access_wrong_type() {
        let mut store = Store::default();
        store.insert_entry(Bytes::from_static(b"k"), string(b"v"));
        let err = store
            .access(b"k", Some(ObjectKind::HyperLogLog), AccessMode::Write)
            .unwrap_err();
        assert!(matches!(err, Error::WrongType));
        // Wildcard never fails
        assert!(store.access(b"k", None, AccessMode::Read).is_ok());
    }

    #[test]
    fn test_lazy_expiry_removes_from_both_maps() {
        let mut store = Store::default();
        store.insert_entry(Bytes::from_static(b"k"), string(b"v"));
        store.expires.insert(Bytes::from_static(b"k"), now_ms() - 1);

        let access = store.access(b"k", None, AccessMode::Read).unwrap();
        assert!(!access.exists());
        assert!(access.expired);
        assert!(!store.data.contains_key(b"k"));
        assert!(!store.expires.contains_key(b"k"));
        assert_eq!(store.used_memory(), 0);
        assert_eq!(store.stats().expired_keys, 1);
    }

    #[test]
    fn test_memory_accounting_is_exact() {
        let mut store = Store::default();
        store.insert_entry(Bytes::from_static(b"a"), string(b"12345"));
        store.insert_entry(Bytes::from_static(b"b"), string(b"xy"));
        assert_eq!(store.used_memory(), 2 * (1 + ENTRY_OVERHEAD) + 7);

        // Replace with a bigger value
        store.insert_entry(Bytes::from_static(b"a"), string(b"1234567890"));
        assert_eq!(store.used_memory(), 2 * (1 + ENTRY_OVERHEAD) + 12);

        store
            .modify(b"b", ObjectKind::String, |data| {
                *data = string(b"");
                Ok(())
            })
            .unwrap();
        assert_eq!(store.used_memory(), 2 * (1 + ENTRY_OVERHEAD) + 10);

        assert!(store.delete(b"a"));
        assert!(store.delete(b"b"));
        assert!(!store.delete(b"b"));
        assert_eq!(store.used_memory(), 0);
    }

    #[test]
    fn test_modify_or_create_rolls_back_on_error() {
        let mut store = Store::default();
        let result: Result<()> = store.modify_or_create(
            b"k",
            ObjectKind::String,
            |_| Ok(string(b"new")),
            |_, created| {
                assert!(created);
                Err(Error::FilterFull)
            },
        );
        assert!(result.is_err());
        assert!(!store.data.contains_key(b"k"));
        assert_eq!(store.used_memory(), 0);
    }

    #[test]
    fn test_write_stamps_lfu_under_lfu_policy() {
        let config = Config {
            maxmemory_policy: MaxMemoryPolicy::AllKeysLfu,
            lfu_log_factor: 0,
            ..Config::default()
        };
        let mut store = Store::new(config);
        store.insert_entry(Bytes::from_static(b"k"), string(b"v"));
        let before = store.data.get(b"k").unwrap().lfu_counter();

        store.access(b"k", None, AccessMode::Read).unwrap();
        assert_eq!(store.data.get(b"k").unwrap().lfu_counter(), before);

        // log factor 0 makes every write increment
        store.access(b"k", None, AccessMode::Write).unwrap();
        assert_eq!(store.data.get(b"k").unwrap().lfu_counter(), before + 1);
    }

    #[test]
    fn test_check_oom_under_noeviction() {
        let config = Config {
            maxmemory: 100,
            ..Config::default()
        };
        let mut store = Store::new(config);
        assert!(store.check_oom().is_ok());
        store.insert_entry(Bytes::from_static(b"k"), DataType::String(Bytes::from(vec![0u8; 200])));
        assert!(matches!(store.check_oom(), Err(Error::OutOfMemory)));
        // Nothing was evicted
        assert!(store.data.contains_key(b"k"));
    }

    #[test]
    fn test_oversized_structures_rejected_before_allocation() {
        let mut store = Store::new(Config {
            maxmemory: 1 << 20,
            maxmemory_policy: MaxMemoryPolicy::AllKeysLru,
            ..Config::default()
        });

        // 2^24 counters is 128 MiB against a 1 MiB ceiling
        assert!(matches!(
            store.cms_initbydim(b"cms", 1 << 14, 1 << 10),
            Err(Error::OutOfMemory)
        ));
        assert!(matches!(
            store.bf_reserve(b"bf", 0.001, 1 << 24, None, false),
            Err(Error::OutOfMemory)
        ));
        assert!(matches!(
            store.cf_reserve(b"cf", 1 << 24, None, None, None),
            Err(Error::OutOfMemory)
        ));
        let options = crate::storage::BloomInsertOptions {
            capacity: Some(1 << 24),
            ..Default::default()
        };
        assert!(matches!(
            store.bf_insert(b"bf", &[Bytes::from_static(b"x")], &options),
            Err(Error::OutOfMemory)
        ));
        assert!(store.is_empty());
        assert_eq!(store.used_memory(), 0);

        store.cms_initbydim(b"cms", 100, 4).unwrap();
        store.bf_reserve(b"bf", 0.01, 1000, None, false).unwrap();
        store.cf_reserve(b"cf", 1000, None, None, None).unwrap();
        assert_eq!(store.len(), 3);
    }
}
