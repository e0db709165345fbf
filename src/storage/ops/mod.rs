//! Storage operations organized by data type
//!
//! This module splits the Store implementation into type-specific operation
//! modules. Each one adds an `impl Store` block for a single value family.

pub mod bloom_ops;
pub mod cms_ops;
pub mod cuckoo_ops;
pub mod generic_ops;
pub mod hyperloglog_ops;
pub mod string_ops;

pub use bloom_ops::BloomInsertOptions;
pub use cuckoo_ops::CuckooInsertOptions;
