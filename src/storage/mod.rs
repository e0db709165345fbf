//! Storage layer module
//!
//! This module provides the core Store implementation and all type-specific operations.
//! Operations are organized into separate modules by data type so each value
//! family stays in its own file.

pub mod dict;
pub use dict::{Dict, calculate_hash};
mod store;
mod types;
mod value;

// Probabilistic structures
pub mod bloomfilter;
pub mod cms;
pub mod cuckoofilter;
pub mod hyperloglog;

// Reclamation: lazy expiry lives in the accessor, these run from cron
pub mod eviction;
pub mod expire;

// Import all operation modules - each adds methods to Store via impl blocks
pub mod ops;

// Re-export the main Store struct
pub use store::{Access, AccessMode, Store, StoreStats};

// Re-export commonly used types
pub use types::{DataType, ENTRY_OVERHEAD, Encoding, Entry, LFU_INIT_VAL, ObjectKind};
pub use value::{now_ms, now_us};

pub use bloomfilter::{BloomInfo, BloomInfoField, ScalableBloomFilter};
pub use cms::{CMSInfo, CountMinSketch};
pub use cuckoofilter::{CuckooFilter, CuckooInfo, CuckooParams};
pub use eviction::{EvictionPool, EvictionResult, PoolEntry};
pub use expire::ExpireCycleReport;
pub use hyperloglog::HyperLogLog;
pub use ops::{BloomInsertOptions, CuckooInsertOptions};
