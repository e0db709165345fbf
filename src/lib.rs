// Allow certain clippy lints that are intentional design decisions
#![allow(clippy::too_many_arguments)] // Redis-like APIs often need many parameters
#![allow(clippy::large_enum_variant)] // DataType enum variants have intentionally different sizes

pub mod config;
pub mod config_table;
pub mod cron;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::{Config, MaxMemoryPolicy};
pub use cron::{CronReport, SharedStore, cron_tick, start_cron};
pub use error::{Error, Result};
pub use logging::{KvLogger, init_logging};
pub use storage::Store;

#[cfg(test)]
use mimalloc::MiMalloc;

#[cfg(test)]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
