use bytes::Bytes;

use super::bloomfilter::ScalableBloomFilter;
use super::cms::CountMinSketch;
use super::cuckoofilter::CuckooFilter;
use super::hyperloglog::HyperLogLog;
use super::value::now_ms;

/// Fixed per-key bookkeeping charged on top of key and value bytes
pub const ENTRY_OVERHEAD: usize = 64;

/// Longest string stored with the embstr encoding
const EMBSTR_SIZE_LIMIT: usize = 44;

/// Initial LFU counter of a new key, so it is not evicted right away
pub const LFU_INIT_VAL: u8 = 5;

/// Value kinds the store can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    String,
    BloomFilter,
    CuckooFilter,
    CountMinSketch,
    HyperLogLog,
}

impl ObjectKind {
    /// TYPE reply
    #[inline]
    pub fn type_name(self) -> &'static str {
        match self {
            ObjectKind::String => "string",
            ObjectKind::BloomFilter => "MBbloom--",
            ObjectKind::CuckooFilter => "MBbloomCF",
            ObjectKind::CountMinSketch => "CMSk-TYPE",
            // HLL is stored as string in Redis
            ObjectKind::HyperLogLog => "string",
        }
    }
}

/// Internal representation tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Int,
    Embstr,
    Raw,
    Sbf,
    Cuckoo,
    Cms,
    HllDense,
}

impl Encoding {
    /// OBJECT ENCODING reply
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Int => "int",
            Encoding::Embstr => "embstr",
            Encoding::Raw => "raw",
            Encoding::Sbf => "sbf",
            Encoding::Cuckoo => "cuckoo",
            Encoding::Cms => "cms",
            Encoding::HllDense => "dense",
        }
    }

    /// Encoding a plain string gets
    pub fn for_string(s: &[u8]) -> Self {
        if s.len() <= 20 && is_canonical_i64(s) {
            Encoding::Int
        } else if s.len() <= EMBSTR_SIZE_LIMIT {
            Encoding::Embstr
        } else {
            Encoding::Raw
        }
    }

    #[inline]
    pub fn is_valid_for(self, kind: ObjectKind) -> bool {
        match kind {
            ObjectKind::String => matches!(self, Encoding::Int | Encoding::Embstr | Encoding::Raw),
            ObjectKind::BloomFilter => self == Encoding::Sbf,
            ObjectKind::CuckooFilter => self == Encoding::Cuckoo,
            ObjectKind::CountMinSketch => self == Encoding::Cms,
            ObjectKind::HyperLogLog => self == Encoding::HllDense,
        }
    }
}

/// An i64 that formats back to exactly the same bytes
fn is_canonical_i64(s: &[u8]) -> bool {
    std::str::from_utf8(s)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .is_some_and(|n| n.to_string().as_bytes() == s)
}

/// Stored value, one variant per kind
#[derive(Debug, Clone)]
pub enum DataType {
    String(Bytes),
    BloomFilter(Box<ScalableBloomFilter>),
    CuckooFilter(Box<CuckooFilter>),
    CountMinSketch(Box<CountMinSketch>),
    HyperLogLog(Box<HyperLogLog>),
}

impl DataType {
    #[inline]
    pub fn kind(&self) -> ObjectKind {
        match self {
            DataType::String(_) => ObjectKind::String,
            DataType::BloomFilter(_) => ObjectKind::BloomFilter,
            DataType::CuckooFilter(_) => ObjectKind::CuckooFilter,
            DataType::CountMinSketch(_) => ObjectKind::CountMinSketch,
            DataType::HyperLogLog(_) => ObjectKind::HyperLogLog,
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            DataType::String(s) => Encoding::for_string(s),
            DataType::BloomFilter(_) => Encoding::Sbf,
            DataType::CuckooFilter(_) => Encoding::Cuckoo,
            DataType::CountMinSketch(_) => Encoding::Cms,
            DataType::HyperLogLog(_) => Encoding::HllDense,
        }
    }

    /// Bytes owned by the payload
    pub fn memory_usage(&self) -> usize {
        match self {
            DataType::String(s) => s.len(),
            DataType::BloomFilter(bf) => bf.memory_usage(),
            DataType::CuckooFilter(cf) => cf.memory_usage(),
            DataType::CountMinSketch(cms) => cms.memory_usage(),
            DataType::HyperLogLog(hll) => hll.memory_usage(),
        }
    }

    #[inline]
    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            DataType::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bloom(&self) -> Option<&ScalableBloomFilter> {
        match self {
            DataType::BloomFilter(bf) => Some(bf),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bloom_mut(&mut self) -> Option<&mut ScalableBloomFilter> {
        match self {
            DataType::BloomFilter(bf) => Some(bf),
            _ => None,
        }
    }

    #[inline]
    pub fn as_cuckoo(&self) -> Option<&CuckooFilter> {
        match self {
            DataType::CuckooFilter(cf) => Some(cf),
            _ => None,
        }
    }

    #[inline]
    pub fn as_cuckoo_mut(&mut self) -> Option<&mut CuckooFilter> {
        match self {
            DataType::CuckooFilter(cf) => Some(cf),
            _ => None,
        }
    }

    #[inline]
    pub fn as_cms(&self) -> Option<&CountMinSketch> {
        match self {
            DataType::CountMinSketch(cms) => Some(cms),
            _ => None,
        }
    }

    #[inline]
    pub fn as_cms_mut(&mut self) -> Option<&mut CountMinSketch> {
        match self {
            DataType::CountMinSketch(cms) => Some(cms),
            _ => None,
        }
    }

    #[inline]
    pub fn as_hyperloglog(&self) -> Option<&HyperLogLog> {
        match self {
            DataType::HyperLogLog(hll) => Some(hll),
            _ => None,
        }
    }

    #[inline]
    pub fn as_hyperloglog_mut(&mut self) -> Option<&mut HyperLogLog> {
        match self {
            DataType::HyperLogLog(hll) => Some(hll),
            _ => None,
        }
    }
}

/// Current time in minutes, wrapped to 16 bits like Redis's LFU clock
#[inline]
fn lfu_minutes(now_ms: i64) -> u16 {
    ((now_ms / 60_000) & 0xFFFF) as u16
}

/// One live key's value and its access metadata
#[derive(Debug)]
pub struct Entry {
    pub data: DataType,
    /// Last access time in seconds since UNIX epoch (for LRU eviction)
    lru_time: i64,
    /// Logarithmic access counter (0-255) for LFU eviction
    lfu_counter: u8,
    /// Minute clock of the last LFU decrement
    lfu_decrement_time: u16,
    /// Bytes charged to used_memory for this key
    pub(crate) charge: usize,
}

impl Entry {
    #[inline]
    pub fn new(data: DataType) -> Self {
        let now = now_ms();
        Self {
            data,
            lru_time: now / 1000,
            lfu_counter: LFU_INIT_VAL,
            lfu_decrement_time: lfu_minutes(now),
            charge: 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> ObjectKind {
        self.data.kind()
    }

    #[inline]
    pub fn charge(&self) -> usize {
        self.charge
    }

    // ==================== LRU/LFU Methods ====================

    /// Update LRU access time to now
    #[inline]
    pub fn touch_lru(&mut self) {
        self.lru_time = now_ms() / 1000;
    }

    #[inline]
    pub fn lru_time(&self) -> i64 {
        self.lru_time
    }

    /// Seconds since last access
    #[inline]
    pub fn idle_time(&self) -> u64 {
        (now_ms() / 1000 - self.lru_time).max(0) as u64
    }

    /// Counter after applying time decay, without storing it
    pub fn lfu_decayed(&self, lfu_decay_time: u32) -> u8 {
        if lfu_decay_time == 0 {
            return self.lfu_counter;
        }
        let now = lfu_minutes(now_ms());
        let elapsed = if now >= self.lfu_decrement_time {
            now - self.lfu_decrement_time
        } else {
            u16::MAX - self.lfu_decrement_time + now
        };
        let periods = elapsed as u32 / lfu_decay_time;
        self.lfu_counter.saturating_sub(periods.min(255) as u8)
    }

    /// Decay, then probabilistically increment the LFU counter.
    /// P(increment) = 1 / ((counter - LFU_INIT_VAL) * log_factor + 1)
    pub fn touch_lfu(&mut self, lfu_log_factor: u32, lfu_decay_time: u32) {
        let mut counter = self.lfu_decayed(lfu_decay_time);
        if counter < 255 {
            let base = counter.saturating_sub(LFU_INIT_VAL) as f64;
            let p = 1.0 / (base * lfu_log_factor as f64 + 1.0);
            if fastrand::f64() < p {
                counter += 1;
            }
        }
        self.lfu_counter = counter;
        self.lfu_decrement_time = lfu_minutes(now_ms());
    }

    #[inline]
    pub fn lfu_counter(&self) -> u8 {
        self.lfu_counter
    }

    #[cfg(test)]
    pub(crate) fn set_lru_time(&mut self, secs: i64) {
        self.lru_time = secs;
    }

    #[cfg(test)]
    pub(crate) fn set_lfu_counter(&mut self, counter: u8) {
        self.lfu_counter = counter;
    }
}
