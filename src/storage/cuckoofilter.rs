//! Cuckoo Filter
//!
//! Features:
//! - Bucketized 16-bit fingerprints with partial-key cuckoo hashing
//! - Deletion and multiplicity (the same item may be added repeatedly)
//! - Random-victim kicking, undone when no slot is found
//! - Growth by appending sub-filters when kicking fails
//!
//! Based on "Cuckoo Filter: Practically Better Than Bloom" by Fan et al.,
//! with the hashing scheme and limits used by RedisBloom.

use super::bloomfilter::murmurhash64a;
use crate::error::{Error, Result};

pub const MAX_CAPACITY: u64 = 1 << 30;
/// Largest bucket count of any sub-filter. A power of two, so growth stays maskable.
pub const MAX_BUCKETS: u64 = 1 << 30;
pub const MAX_BUCKET_SIZE: u32 = 255;
pub const MAX_ITERATIONS: u32 = 65535;
pub const MAX_EXPANSION: u32 = 32768;

/// Multiplier used to derive the alternate bucket from a fingerprint
const ALT_HASH_MUL: u64 = 0x5bd1e995;

/// Empty slot marker; real fingerprints are never zero
const EMPTY: u16 = 0;

type Fingerprint = u16;

/// Item hash and non-zero fingerprint
#[derive(Debug, Clone, Copy)]
struct CuckooHash {
    h1: u64,
    fp: Fingerprint,
}

impl CuckooHash {
    #[inline]
    fn of(item: &[u8]) -> Self {
        let h1 = murmurhash64a(item, 0);
        let fp = ((h1 >> 32) % 0xffff) as u16 + 1;
        Self { h1, fp }
    }

    #[inline]
    fn h2(&self) -> u64 {
        alt_hash(self.h1, self.fp)
    }
}

/// XOR with a fingerprint-derived value, so alt(alt(i)) == i under any
/// power-of-two mask
#[inline(always)]
fn alt_hash(h: u64, fp: Fingerprint) -> u64 {
    h ^ (fp as u64).wrapping_mul(ALT_HASH_MUL)
}

// ============================================================================
// Parameters
// ============================================================================

/// CF.RESERVE parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuckooParams {
    pub capacity: u64,
    pub bucket_size: u32,
    pub max_iterations: u32,
    /// 0 disables growth
    pub expansion: u32,
}

impl CuckooParams {
    pub fn validate(&self) -> Result<()> {
        if self.bucket_size == 0 || self.bucket_size > MAX_BUCKET_SIZE {
            return Err(Error::InvalidParameter(
                "Bucket size must be between 1 and 255",
            ));
        }
        if self.capacity < 2 * self.bucket_size as u64 || self.capacity > MAX_CAPACITY {
            return Err(Error::InvalidParameter(
                "Capacity must be at least (BucketSize * 2) and at most 1073741824",
            ));
        }
        if self.max_iterations == 0 || self.max_iterations > MAX_ITERATIONS {
            return Err(Error::InvalidParameter(
                "MAXITERATIONS must be between 1 and 65535",
            ));
        }
        if self.expansion > MAX_EXPANSION {
            return Err(Error::InvalidParameter(
                "EXPANSION must be between 0 and 32768",
            ));
        }
        Ok(())
    }

    /// Power-of-two bucket count of the first sub-filter
    #[inline]
    pub fn base_buckets(&self) -> u64 {
        self.capacity
            .div_ceil(self.bucket_size.max(1) as u64)
            .max(1)
            .next_power_of_two()
    }

    /// Bytes the first sub-filter allocates
    #[inline]
    pub fn projected_size(&self) -> usize {
        let slots = self.base_buckets() * self.bucket_size as u64;
        slots as usize * std::mem::size_of::<Fingerprint>()
    }
}

/// Bucket count of sub-filter `n`: `base * expansion^n`, a power of two
/// no larger than `MAX_BUCKETS`
pub fn sub_filter_buckets(base_buckets: u64, expansion: u32, n: u32) -> u64 {
    let growth = (expansion as u64).saturating_pow(n);
    base_buckets
        .saturating_mul(growth)
        .min(MAX_BUCKETS)
        .next_power_of_two()
}

// ============================================================================
// Sub-filter
// ============================================================================

/// Fixed-size bucket table. Bucket `b` owns `slots[b*bs .. (b+1)*bs]`.
#[derive(Debug, Clone)]
struct SubFilter {
    slots: Vec<Fingerprint>,
    num_buckets: u64,
    bucket_size: usize,
}

impl SubFilter {
    fn new(num_buckets: u64, bucket_size: usize) -> Self {
        Self {
            slots: vec![EMPTY; num_buckets as usize * bucket_size],
            num_buckets,
            bucket_size,
        }
    }

    #[inline]
    fn index(&self, h: u64) -> usize {
        (h & (self.num_buckets - 1)) as usize
    }

    #[inline]
    fn bucket(&self, b: usize) -> &[Fingerprint] {
        &self.slots[b * self.bucket_size..(b + 1) * self.bucket_size]
    }

    #[inline]
    fn bucket_mut(&mut self, b: usize) -> &mut [Fingerprint] {
        &mut self.slots[b * self.bucket_size..(b + 1) * self.bucket_size]
    }

    #[inline]
    fn candidates(&self, hash: &CuckooHash) -> (usize, usize) {
        (self.index(hash.h1), self.index(hash.h2()))
    }

    fn try_place(&mut self, b: usize, fp: Fingerprint) -> bool {
        match self.bucket_mut(b).iter_mut().find(|s| **s == EMPTY) {
            Some(slot) => {
                *slot = fp;
                true
            }
            None => false,
        }
    }

    /// Place into either candidate bucket without displacing anything
    fn insert_free(&mut self, hash: &CuckooHash) -> bool {
        let (i1, i2) = self.candidates(hash);
        self.try_place(i1, hash.fp) || self.try_place(i2, hash.fp)
    }

    /// Kick random victims along alternate buckets. On failure every swap
    /// is undone so no stored fingerprint is lost.
    fn insert_kicking(&mut self, hash: &CuckooHash, max_iterations: u32) -> bool {
        let mut path: Vec<(usize, Fingerprint)> = Vec::with_capacity(max_iterations as usize);
        let mut b = self.index(hash.h1);
        let mut fp = hash.fp;

        for _ in 0..max_iterations {
            let slot = b * self.bucket_size + fastrand::usize(..self.bucket_size);
            let victim = std::mem::replace(&mut self.slots[slot], fp);
            path.push((slot, victim));
            fp = victim;

            b = self.index(alt_hash(b as u64, fp));
            if self.try_place(b, fp) {
                return true;
            }
        }

        for (slot, previous) in path.into_iter().rev() {
            self.slots[slot] = previous;
        }
        false
    }

    fn count(&self, hash: &CuckooHash) -> u64 {
        let (i1, i2) = self.candidates(hash);
        let in_bucket =
            |b: usize| self.bucket(b).iter().filter(|&&s| s == hash.fp).count() as u64;
        if i1 == i2 {
            in_bucket(i1)
        } else {
            in_bucket(i1) + in_bucket(i2)
        }
    }

    fn contains(&self, hash: &CuckooHash) -> bool {
        let (i1, i2) = self.candidates(hash);
        self.bucket(i1).contains(&hash.fp) || self.bucket(i2).contains(&hash.fp)
    }

    fn remove(&mut self, hash: &CuckooHash) -> bool {
        let (i1, i2) = self.candidates(hash);
        for b in [i1, i2] {
            if let Some(slot) = self.bucket_mut(b).iter_mut().find(|s| **s == hash.fp) {
                *slot = EMPTY;
                return true;
            }
        }
        false
    }

    #[inline]
    fn size_bytes(&self) -> usize {
        self.slots.len() * std::mem::size_of::<Fingerprint>()
    }
}

// ============================================================================
// Cuckoo Filter
// ============================================================================

/// CF.INFO output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuckooInfo {
    pub size: usize,
    pub buckets: u64,
    pub filters: usize,
    pub items_inserted: u64,
    pub items_deleted: u64,
    pub bucket_size: u32,
    pub expansion: u32,
    pub max_iterations: u32,
}

/// Cuckoo filter with a growable chain of sub-filters
#[derive(Debug, Clone)]
pub struct CuckooFilter {
    /// Sub-filters, oldest first. Never empty.
    filters: Vec<SubFilter>,
    params: CuckooParams,
    base_buckets: u64,
    num_items: u64,
    num_deletes: u64,
}

impl CuckooFilter {
    /// Build a filter from already validated parameters
    pub fn new(params: CuckooParams) -> Self {
        let base_buckets = params.base_buckets();
        Self {
            filters: vec![SubFilter::new(base_buckets, params.bucket_size as usize)],
            params,
            base_buckets,
            num_items: 0,
            num_deletes: 0,
        }
    }

    /// Insert one occurrence of an item
    pub fn add(&mut self, item: &[u8]) -> Result<()> {
        let hash = CuckooHash::of(item);

        if self.filters.iter_mut().rev().any(|f| f.insert_free(&hash)) {
            self.num_items += 1;
            return Ok(());
        }

        let max_iterations = self.params.max_iterations;
        let newest = self.filters.len() - 1;
        if self.filters[newest].insert_kicking(&hash, max_iterations) {
            self.num_items += 1;
            return Ok(());
        }

        if self.params.expansion == 0 {
            return Err(Error::FilterFull);
        }
        self.grow();
        let newest = self.filters.len() - 1;
        if self.filters[newest].insert_free(&hash) {
            self.num_items += 1;
            Ok(())
        } else {
            Err(Error::FilterFull)
        }
    }

    /// Insert unless the item may already be present. Ok(false) if present.
    pub fn add_nx(&mut self, item: &[u8]) -> Result<bool> {
        if self.exists(item) {
            return Ok(false);
        }
        self.add(item)?;
        Ok(true)
    }

    /// Append sub-filter `n` with `base_buckets * expansion^n` buckets
    fn grow(&mut self) {
        let n = self.filters.len() as u32;
        let buckets = sub_filter_buckets(self.base_buckets, self.params.expansion, n);
        log::debug!(
            "cuckoo filter grows to {} sub-filters ({} buckets)",
            n + 1,
            buckets
        );
        self.filters
            .push(SubFilter::new(buckets, self.params.bucket_size as usize));
    }

    pub fn exists(&self, item: &[u8]) -> bool {
        let hash = CuckooHash::of(item);
        self.filters.iter().any(|f| f.contains(&hash))
    }

    /// Matching fingerprints across all sub-filters
    pub fn count(&self, item: &[u8]) -> u64 {
        let hash = CuckooHash::of(item);
        self.filters.iter().map(|f| f.count(&hash)).sum()
    }

    /// Remove one occurrence, newest sub-filter first
    pub fn delete(&mut self, item: &[u8]) -> bool {
        let hash = CuckooHash::of(item);
        if self.filters.iter_mut().rev().any(|f| f.remove(&hash)) {
            self.num_items = self.num_items.saturating_sub(1);
            self.num_deletes += 1;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.num_items
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_items == 0
    }

    #[inline]
    pub fn num_filters(&self) -> usize {
        self.filters.len()
    }

    #[inline]
    pub fn params(&self) -> &CuckooParams {
        &self.params
    }

    pub fn info(&self) -> CuckooInfo {
        CuckooInfo {
            size: self.memory_usage(),
            buckets: self.base_buckets,
            filters: self.filters.len(),
            items_inserted: self.num_items,
            items_deleted: self.num_deletes,
            bucket_size: self.params.bucket_size,
            expansion: self.params.expansion,
            max_iterations: self.params.max_iterations,
        }
    }

    /// Bytes owned by this filter
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.filters.capacity() * std::mem::size_of::<SubFilter>()
            + self.filters.iter().map(|f| f.size_bytes()).sum::<usize>()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn params(capacity: u64, bucket_size: u32, expansion: u32) -> CuckooParams {
        CuckooParams {
            capacity,
            bucket_size,
            max_iterations: 20,
            expansion,
        }
    }

    #[test]
    fn test_sub_filter_buckets_bounded() {
        assert_eq!(sub_filter_buckets(512, 1, 0), 512);
        assert_eq!(sub_filter_buckets(512, 2, 3), 4096);
        // Non power-of-two growth rounds up
        assert_eq!(sub_filter_buckets(512, 3, 1), 2048);
        // Runaway growth stops at the bucket bound, not the item capacity
        assert_eq!(sub_filter_buckets(1 << 20, MAX_EXPANSION, 10), MAX_BUCKETS);
        assert!(MAX_BUCKETS.is_power_of_two());
    }

    #[test]
    fn test_projected_size_matches_first_sub_filter() {
        let p = params(1000, 4, 1);
        let cf = CuckooFilter::new(p);
        // 250 buckets round up to 256, 4 slots of 2 bytes each
        assert_eq!(p.projected_size(), 256 * 4 * 2);
        assert_eq!(cf.info().buckets, 256);
        assert!(cf.memory_usage() >= p.projected_size());
    }

    #[test]
    fn test_alt_index_symmetry() {
        let f = SubFilter::new(1024, 2);
        for i in 0..1000u64 {
            let hash = CuckooHash::of(format!("item{}", i).as_bytes());
            let (i1, i2) = f.candidates(&hash);
            assert_eq!(f.index(alt_hash(i1 as u64, hash.fp)), i2);
            assert_eq!(f.index(alt_hash(i2 as u64, hash.fp)), i1);
            assert_ne!(hash.fp, EMPTY);
        }
    }

    #[test]
    fn test_validate() {
        assert!(params(1024, 2, 1).validate().is_ok());
        assert!(params(3, 2, 1).validate().is_err());
        assert!(params(1024, 0, 1).validate().is_err());
        assert!(params(1024, 256, 1).validate().is_err());
        assert!(params(1024, 2, 32769).validate().is_err());
        assert!(params(1024, 2, 0).validate().is_ok());
        let mut p = params(1024, 2, 1);
        p.max_iterations = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_add_exists_delete() {
        let mut cf = CuckooFilter::new(params(1024, 2, 1));
        assert!(!cf.exists(b"a"));
        cf.add(b"a").unwrap();
        assert!(cf.exists(b"a"));
        assert!(cf.delete(b"a"));
        assert!(!cf.exists(b"a"));
        assert!(!cf.delete(b"a"));
        assert_eq!(cf.info().items_deleted, 1);
        assert_eq!(cf.len(), 0);
    }

    #[test]
    fn test_count_delete_duality() {
        let mut cf = CuckooFilter::new(params(1024, 2, 1));
        for _ in 0..3 {
            cf.add(b"item1").unwrap();
        }
        assert!(cf.delete(b"item1"));
        assert_eq!(cf.count(b"item1"), 2);

        assert!(cf.delete(b"item1"));
        assert!(cf.delete(b"item1"));
        assert_eq!(cf.count(b"item1"), 0);
        assert!(!cf.exists(b"item1"));
        assert!(!cf.delete(b"item1"));
    }

    #[test]
    fn test_add_nx() {
        let mut cf = CuckooFilter::new(params(1024, 2, 1));
        assert!(cf.add_nx(b"x").unwrap());
        assert!(!cf.add_nx(b"x").unwrap());
        assert_eq!(cf.count(b"x"), 1);
    }

    #[test]
    fn test_growth_keeps_items() {
        let mut cf = CuckooFilter::new(params(64, 2, 2));
        for i in 0..1000 {
            cf.add(format!("item{}", i).as_bytes()).unwrap();
        }
        assert!(cf.num_filters() > 1);
        assert_eq!(cf.len(), 1000);
        for i in 0..1000 {
            assert!(cf.exists(format!("item{}", i).as_bytes()), "lost item{}", i);
        }
    }

    #[test]
    fn test_no_expansion_fills_up() {
        let mut cf = CuckooFilter::new(params(8, 2, 0));
        let mut stored = Vec::new();
        let mut full = false;
        for i in 0..100 {
            let item = format!("item{}", i);
            match cf.add(item.as_bytes()) {
                Ok(()) => stored.push(item),
                Err(Error::FilterFull) => {
                    full = true;
                    break;
                }
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert!(full);
        assert_eq!(cf.num_filters(), 1);
        // A failed insert never drops existing fingerprints
        for item in &stored {
            assert!(cf.exists(item.as_bytes()));
        }
    }

    #[test]
    fn test_false_positive_rate() {
        let mut cf = CuckooFilter::new(params(10_000, 4, 1));
        for i in 0..8_000 {
            cf.add(format!("in{}", i).as_bytes()).unwrap();
        }
        let fp = (0..20_000)
            .filter(|i| cf.exists(format!("out{}", i).as_bytes()))
            .count();
        assert!((fp as f64 / 20_000.0) < 0.01, "fp count {}", fp);
    }

    #[test]
    fn test_info() {
        let cf = CuckooFilter::new(params(1000, 4, 1));
        let info = cf.info();
        assert_eq!(info.buckets, 256);
        assert_eq!(info.filters, 1);
        assert_eq!(info.bucket_size, 4);
        assert_eq!(info.max_iterations, 20);
        assert!(info.size >= 256 * 4 * 2);
    }
}
