//! Scalable Bloom Filter
//!
//! Features:
//! - MurmurHash64A with double hashing for k hash functions
//! - Sub-filter stacking: a new filter is appended once the newest one is
//!   saturated, with capacity multiplied by the expansion factor and the
//!   error rate halved so the compound false positive rate stays bounded
//! - 64-bit word bit arrays
//!
//! Hashing and sizing follow RedisBloom.

use std::f64::consts::LN_2;

use crate::error::{Error, Result};

/// Each new sub-filter tightens the error rate by this ratio
pub const ERROR_TIGHTENING_RATIO: f64 = 0.5;
pub const MAX_CAPACITY: u64 = 1 << 30;
pub const MAX_EXPANSION: u32 = 32768;

// ============================================================================
// MurmurHash64A
// ============================================================================

/// MurmurHash64A - 64-bit hash used by RedisBloom and the sketches
#[inline]
pub fn murmurhash64a(data: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4a7935bd1e995;
    const R: u32 = 47;

    let mut h: u64 = seed ^ (data.len() as u64).wrapping_mul(M);

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        let mut k = u64::from_le_bytes(buf);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        for (i, &byte) in tail.iter().enumerate() {
            h ^= (byte as u64) << (8 * i);
        }
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;
    h
}

/// Two independent 64-bit hashes for double hashing
#[derive(Debug, Clone, Copy)]
struct BloomHash {
    a: u64,
    b: u64,
}

impl BloomHash {
    #[inline]
    fn of(item: &[u8]) -> Self {
        let a = murmurhash64a(item, 0xc6a4a7935bd1e995);
        let b = murmurhash64a(item, a);
        Self { a, b }
    }

    /// Bit index for hash function `i`. `mask` is `num_bits - 1`.
    #[inline]
    fn bit(&self, i: u32, mask: u64) -> u64 {
        self.a.wrapping_add((i as u64).wrapping_mul(self.b)) & mask
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Check BF.RESERVE / BF.INSERT parameters
pub fn validate_params(error_rate: f64, capacity: u64, expansion: u32) -> Result<()> {
    if !(error_rate > 0.0 && error_rate < 1.0) {
        return Err(Error::InvalidParameter("(0 < error rate range < 1)"));
    }
    if capacity == 0 || capacity > MAX_CAPACITY {
        return Err(Error::InvalidParameter(
            "(capacity should be larger than 0 and at most 1073741824)",
        ));
    }
    if expansion == 0 || expansion > MAX_EXPANSION {
        return Err(Error::InvalidParameter(
            "expansion should be between 1 and 32768",
        ));
    }
    Ok(())
}

/// Bits per entry for a target error rate
#[inline]
fn bits_per_entry(error_rate: f64) -> f64 {
    -error_rate.ln() / (LN_2 * LN_2)
}

/// Bit-array length for one sub-filter, rounded up to a power of two
///
/// The rounding leaves headroom below the target error rate while the
/// filter fills, and lets bit positions be masked instead of divided.
pub fn sub_filter_bits(capacity: u64, error_rate: f64) -> u64 {
    let wanted = ((capacity as f64) * bits_per_entry(error_rate)).ceil() as u64;
    wanted
        .max(64)
        .checked_next_power_of_two()
        .unwrap_or(1 << 63)
}

/// Bytes a new filter would allocate for its first sub-filter
pub fn projected_size(error_rate: f64, capacity: u64) -> usize {
    (sub_filter_bits(capacity, error_rate * ERROR_TIGHTENING_RATIO) / 8) as usize
}

// ============================================================================
// Sub-filter
// ============================================================================

/// One fixed-capacity Bloom filter inside the scalable chain
#[derive(Debug, Clone)]
pub struct SubFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    capacity: u64,
    items: u64,
    error_rate: f64,
}

impl SubFilter {
    pub fn new(capacity: u64, error_rate: f64) -> Self {
        let bpe = bits_per_entry(error_rate);
        let num_bits = sub_filter_bits(capacity, error_rate);
        let num_hashes = ((LN_2 * bpe).ceil() as u32).max(1);

        Self {
            bits: vec![0u64; (num_bits / 64) as usize],
            num_bits,
            num_hashes,
            capacity,
            items: 0,
            error_rate,
        }
    }

    #[inline]
    fn contains(&self, hash: &BloomHash) -> bool {
        (0..self.num_hashes).all(|i| {
            let bit = hash.bit(i, self.num_bits - 1);
            self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0
        })
    }

    #[inline]
    fn insert(&mut self, hash: &BloomHash) {
        for i in 0..self.num_hashes {
            let bit = hash.bit(i, self.num_bits - 1);
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
        self.items += 1;
    }

    /// Saturated filters no longer accept items
    #[inline]
    pub fn is_full(&self) -> bool {
        self.items >= self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    #[inline]
    pub fn items(&self) -> u64 {
        self.items
    }

    #[inline]
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    #[inline]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    #[inline]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.bits.len() * 8
    }
}

// ============================================================================
// Scalable Bloom Filter
// ============================================================================

/// BF.INFO single-field selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomInfoField {
    Capacity,
    Size,
    Filters,
    Items,
    Expansion,
}

impl BloomInfoField {
    pub fn from_bytes(name: &[u8]) -> Option<Self> {
        match name.to_ascii_uppercase().as_slice() {
            b"CAPACITY" => Some(Self::Capacity),
            b"SIZE" => Some(Self::Size),
            b"FILTERS" => Some(Self::Filters),
            b"ITEMS" => Some(Self::Items),
            b"EXPANSION" => Some(Self::Expansion),
            _ => None,
        }
    }
}

/// BF.INFO output
#[derive(Debug, Clone, PartialEq)]
pub struct BloomInfo {
    /// Sum of sub-filter capacities
    pub capacity: u64,
    /// Allocated bytes
    pub size: usize,
    pub filters: usize,
    pub items: u64,
    /// None for non-scaling filters
    pub expansion: Option<u32>,
}

impl BloomInfo {
    pub fn field(&self, field: BloomInfoField) -> Option<u64> {
        match field {
            BloomInfoField::Capacity => Some(self.capacity),
            BloomInfoField::Size => Some(self.size as u64),
            BloomInfoField::Filters => Some(self.filters as u64),
            BloomInfoField::Items => Some(self.items),
            BloomInfoField::Expansion => self.expansion.map(u64::from),
        }
    }
}

/// A Bloom filter that grows by appending sub-filters
#[derive(Debug, Clone)]
pub struct ScalableBloomFilter {
    /// Sub-filters, newest last. Never empty.
    filters: Vec<SubFilter>,
    error_rate: f64,
    expansion: u32,
    nonscaling: bool,
    items: u64,
}

impl ScalableBloomFilter {
    /// Build a filter from already validated parameters
    pub fn new(error_rate: f64, capacity: u64, expansion: u32, nonscaling: bool) -> Self {
        let first = SubFilter::new(capacity, error_rate * ERROR_TIGHTENING_RATIO);
        Self {
            filters: vec![first],
            error_rate,
            expansion,
            nonscaling,
            items: 0,
        }
    }

    /// Check if an item might exist in any sub-filter
    pub fn exists(&self, item: &[u8]) -> bool {
        let hash = BloomHash::of(item);
        self.filters.iter().rev().any(|f| f.contains(&hash))
    }

    /// Add an item. Ok(false) if it already tests positive.
    pub fn add(&mut self, item: &[u8]) -> Result<bool> {
        let hash = BloomHash::of(item);
        if self.filters.iter().rev().any(|f| f.contains(&hash)) {
            return Ok(false);
        }

        if self.newest().is_full() {
            if self.nonscaling {
                return Err(Error::FilterFull);
            }
            self.grow();
        }

        let n = self.filters.len();
        self.filters[n - 1].insert(&hash);
        self.items += 1;
        Ok(true)
    }

    fn newest(&self) -> &SubFilter {
        &self.filters[self.filters.len() - 1]
    }

    /// Append a sub-filter sized `capacity * expansion` with a tighter error rate
    fn grow(&mut self) {
        let last = self.newest();
        let capacity = last
            .capacity()
            .saturating_mul(self.expansion as u64)
            .min(u64::MAX / 64);
        let error_rate = last.error_rate() * ERROR_TIGHTENING_RATIO;
        log::debug!(
            "bloom filter grows to {} sub-filters (capacity {}, error rate {})",
            self.filters.len() + 1,
            capacity,
            error_rate
        );
        self.filters.push(SubFilter::new(capacity, error_rate));
    }

    /// Number of items inserted (BF.CARD)
    #[inline]
    pub fn card(&self) -> u64 {
        self.items
    }

    #[inline]
    pub fn num_filters(&self) -> usize {
        self.filters.len()
    }

    #[inline]
    pub fn error_rate(&self) -> f64 {
        self.error_rate
    }

    #[inline]
    pub fn expansion(&self) -> u32 {
        self.expansion
    }

    #[inline]
    pub fn is_nonscaling(&self) -> bool {
        self.nonscaling
    }

    pub fn sub_filters(&self) -> &[SubFilter] {
        &self.filters
    }

    pub fn capacity(&self) -> u64 {
        self.filters.iter().map(|f| f.capacity()).sum()
    }

    pub fn info(&self) -> BloomInfo {
        BloomInfo {
            capacity: self.capacity(),
            size: self.memory_usage(),
            filters: self.filters.len(),
            items: self.items,
            expansion: (!self.nonscaling).then_some(self.expansion),
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
