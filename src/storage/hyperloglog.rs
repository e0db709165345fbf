//! HyperLogLog cardinality estimator
//!
//! Redis-compatible parameters: 16384 registers of 6 bits each (12 KiB),
//! MurmurHash64A with the Redis seed, register index from the low 14 hash
//! bits and rank from the trailing zeros of the rest.
//!
//! Features:
//! - Packed dense registers
//! - SIMD harmonic-sum estimation via `wide`
//! - Cached cardinality, invalidated whenever a register grows

use std::cell::Cell;

use wide::f64x4;

use super::bloomfilter::murmurhash64a;

/// Precision (number of index bits)
pub const HLL_P: usize = 14;
/// Number of registers (2^14 = 16384)
pub const HLL_REGISTERS: usize = 1 << HLL_P;
/// Bits per register
pub const HLL_BITS: usize = 6;
/// Maximum register value
pub const HLL_MAX_VALUE: u8 = 63;
/// Dense representation size in bytes
pub const HLL_DENSE_SIZE: usize = (HLL_REGISTERS * HLL_BITS).div_ceil(8);
/// Bias correction constant
const HLL_ALPHA: f64 = 0.7213 / (1.0 + 1.079 / HLL_REGISTERS as f64);
/// Hash seed used by Redis for PFADD
const HLL_HASH_SEED: u64 = 0xadc83b19;
const HLL_P_MASK: u64 = (HLL_REGISTERS - 1) as u64;
/// Bits left for the rank once the index is removed
const HLL_Q: usize = 64 - HLL_P;

/// Register index and rank for an element
#[inline]
fn index_and_rank(item: &[u8]) -> (usize, u8) {
    let hash = murmurhash64a(item, HLL_HASH_SEED);
    let index = (hash & HLL_P_MASK) as usize;
    // The sentinel bit caps the rank at HLL_Q + 1
    let rest = (hash >> HLL_P) | (1u64 << HLL_Q);
    let rank = (rest.trailing_zeros() as u8 + 1).min(HLL_MAX_VALUE);
    (index, rank)
}

/// HyperLogLog with dense 6-bit registers
#[derive(Debug, Clone)]
pub struct HyperLogLog {
    registers: Box<[u8; HLL_DENSE_SIZE]>,
    /// None when a register changed since the last count
    cached_card: Cell<Option<u64>>,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    pub fn new() -> Self {
        Self {
            registers: Box::new([0u8; HLL_DENSE_SIZE]),
            cached_card: Cell::new(Some(0)),
        }
    }

    /// Add an element. Returns true if a register was raised.
    #[inline]
    pub fn add(&mut self, item: &[u8]) -> bool {
        let (index, rank) = index_and_rank(item);
        self.raise(index, rank)
    }

    #[inline]
    fn raise(&mut self, index: usize, value: u8) -> bool {
        if value <= dense_get(&self.registers, index) {
            return false;
        }
        dense_set(&mut self.registers, index, value);
        self.cached_card.set(None);
        true
    }

    #[inline]
    pub fn register(&self, index: usize) -> u8 {
        dense_get(&self.registers, index)
    }

    /// All registers, unpacked
    pub fn registers(&self) -> Vec<u8> {
        (0..HLL_REGISTERS).map(|i| self.register(i)).collect()
    }

    /// Cardinality estimate, served from cache when nothing changed
    pub fn count(&self) -> u64 {
        if let Some(card) = self.cached_card.get() {
            return card;
        }
        let mut regs = [0u8; HLL_REGISTERS];
        self.max_into(&mut regs);
        let card = estimate(&regs);
        self.cached_card.set(Some(card));
        card
    }

    /// Fold another HLL in, register by register. Returns true if any register grew.
    pub fn merge(&mut self, other: &HyperLogLog) -> bool {
        let mut changed = false;
        for i in 0..HLL_REGISTERS {
            let val = dense_get(&other.registers, i);
            if val > 0 {
                changed |= self.raise(i, val);
            }
        }
        changed
    }

    /// Registerwise max of `self` into `regs`
    fn max_into(&self, regs: &mut [u8; HLL_REGISTERS]) {
        for (i, reg) in regs.iter_mut().enumerate() {
            let val = dense_get(&self.registers, i);
            if val > *reg {
                *reg = val;
            }
        }
    }

    /// Estimate the union of several HLLs without modifying any of them
    pub fn count_union<'a>(hlls: impl IntoIterator<Item = &'a HyperLogLog>) -> u64 {
        let mut regs = [0u8; HLL_REGISTERS];
        for hll in hlls {
            hll.max_into(&mut regs);
        }
        estimate(&regs)
    }

    /// Bytes owned by this HLL
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + HLL_DENSE_SIZE
    }
}

// ============================================================================
// Dense Encoding Operations
// ============================================================================

/// Set a register. 6-bit values may straddle a byte boundary.
#[inline]
fn dense_set(dense: &mut [u8; HLL_DENSE_SIZE], index: usize, value: u8) {
    let bit_pos = index * HLL_BITS;
    let byte_pos = bit_pos / 8;
    let bit_offset = bit_pos % 8;
    let value = (value & 0x3F) as u16;

    let mut word = dense[byte_pos] as u16;
    if byte_pos + 1 < HLL_DENSE_SIZE {
        word |= (dense[byte_pos + 1] as u16) << 8;
    }
    word = (word & !(0x3F << bit_offset)) | (value << bit_offset);

    dense[byte_pos] = word as u8;
    if byte_pos + 1 < HLL_DENSE_SIZE {
        dense[byte_pos + 1] = (word >> 8) as u8;
    }
}

/// Get a register
#[inline]
fn dense_get(dense: &[u8; HLL_DENSE_SIZE], index: usize) -> u8 {
    let bit_pos = index * HLL_BITS;
    let byte_pos = bit_pos / 8;
    let bit_offset = bit_pos % 8;

    let mut word = dense[byte_pos] as u16;
    if byte_pos + 1 < HLL_DENSE_SIZE {
        word |= (dense[byte_pos + 1] as u16) << 8;
    }
    ((word >> bit_offset) & 0x3F) as u8
}

// ============================================================================
// Estimation
// ============================================================================

/// 2^(-n) for n = 0..63
const POW_TABLE: [f64; 64] = {
    let mut table = [0.0; 64];
    let mut i = 0;
    while i < 64 {
        table[i] = 1.0 / ((1u64 << i) as f64);
        i += 1;
    }
    table
};

/// Harmonic-mean estimate over unpacked registers, four lanes at a time
fn estimate(registers: &[u8; HLL_REGISTERS]) -> u64 {
    let mut sum = f64x4::ZERO;
    let mut zeros = 0usize;

    for chunk in registers.chunks_exact(4) {
        let r = [
            chunk[0] as usize,
            chunk[1] as usize,
            chunk[2] as usize,
            chunk[3] as usize,
        ];
        sum += f64x4::new([POW_TABLE[r[0]], POW_TABLE[r[1]], POW_TABLE[r[2]], POW_TABLE[r[3]]]);
        zeros += r.iter().filter(|&&v| v == 0).count();
    }

    compute_cardinality(sum.reduce_add(), zeros)
}

/// Compute cardinality from harmonic sum and zero count
#[inline]
fn compute_cardinality(sum: f64, zeros: usize) -> u64 {
    let m = HLL_REGISTERS as f64;
    let estimate = HLL_ALPHA * m * m / sum;

    // Small range correction (linear counting)
    if estimate <= 2.5 * m && zeros > 0 {
        return (m * (m / zeros as f64).ln()).round() as u64;
    }

    // Large range correction
    let two_pow_32 = (1u64 << 32) as f64;
    if estimate > two_pow_32 / 30.0 {
        return (-two_pow_32 * (1.0 - estimate / two_pow_32).ln()) as u64;
    }

    estimate as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(prefix: &str, n: usize) -> HyperLogLog {
        let mut hll = HyperLogLog::new();
        for i in 0..n {
            hll.add(format!("{}{}", prefix, i).as_bytes());
        }
        hll
    }

    #[test]
    fn test_empty_hll() {
        let hll = HyperLogLog::new();
        assert_eq!(hll.count(), 0);
        assert!(hll.registers().iter().all(|&r| r == 0));
    }

    #[test]
    fn test_add_reports_change() {
        let mut hll = HyperLogLog::new();
        assert!(hll.add(b"hello"));
        assert!(!hll.add(b"hello"));
        assert_eq!(hll.count(), 1);
    }

    #[test]
    fn test_dense_bit_packing() {
        let mut dense = Box::new([0u8; HLL_DENSE_SIZE]);
        for i in 0..HLL_REGISTERS {
            dense_set(&mut dense, i, (i % 64) as u8);
        }
        for i in 0..HLL_REGISTERS {
            assert_eq!(dense_get(&dense, i), (i % 64) as u8, "register {}", i);
        }
        // Overwrite a straddling register without touching neighbours
        dense_set(&mut dense, 1, 0);
        assert_eq!(dense_get(&dense, 0), 0);
        assert_eq!(dense_get(&dense, 1), 0);
        assert_eq!(dense_get(&dense, 2), 2);
    }

    #[test]
    fn test_small_cardinality() {
        let mut hll = HyperLogLog::new();
        for c in b'a'..=b'z' {
            hll.add(&[c]);
        }
        let count = hll.count() as i64;
        assert!((count - 26).abs() <= 1, "count {}", count);
    }

    #[test]
    fn test_large_cardinality_accuracy() {
        let hll = filled("item", 100_000);
        let count = hll.count() as f64;
        let error = (count - 100_000.0).abs() / 100_000.0;
        assert!(error < 0.03, "error {} (count {})", error, count);
    }

    #[test]
    fn test_cache_invalidation() {
        let mut hll = filled("a", 100);
        let before = hll.count();
        assert_eq!(hll.count(), before);
        for i in 0..1000 {
            hll.add(format!("b{}", i).as_bytes());
        }
        assert!(hll.count() > before);
    }

    #[test]
    fn test_merge_and_union() {
        let a = filled("a", 5000);
        let b = filled("b", 5000);

        let union_ab = HyperLogLog::count_union([&a, &b]);
        let union_ba = HyperLogLog::count_union([&b, &a]);
        assert_eq!(union_ab, union_ba);

        let mut merged = a.clone();
        assert!(merged.merge(&b));
        assert_eq!(merged.count(), union_ab);
        assert!(!merged.merge(&b));

        // Union left its inputs alone
        assert_eq!(a.count(), filled("a", 5000).count());
    }

    #[test]
    fn test_rank_bounds() {
        for i in 0..10_000 {
            let (index, rank) = index_and_rank(format!("x{}", i).as_bytes());
            assert!(index < HLL_REGISTERS);
            assert!((1..=(HLL_Q as u8 + 1)).contains(&rank));
        }
    }
}
