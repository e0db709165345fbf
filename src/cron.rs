//! Background cron tasks module
//!
//! Implements Redis-style background tasks running at the configured `hz` frequency.
//! Tasks include:
//! - Active key expiration (sampling and deleting expired keys)
//! - Eviction when used memory is over `maxmemory`
//!
//! Each tick takes the store lock for its whole body, so maintenance never
//! interleaves with a command against the same store.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::storage::Store;

/// A store shared between command handlers and the cron task
pub type SharedStore = Arc<Mutex<Store>>;

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CronReport {
    pub expired: usize,
    pub evicted: usize,
}

/// Start the background cron task
///
/// This spawns a Tokio task that ticks every `1000 / hz` milliseconds. The
/// interval is read once at start. Abort the returned handle to stop it.
///
/// The blocking `parking_lot` lock is fine inside the task: it is taken and
/// released within one synchronous tick and never held across an `.await`.
pub fn start_cron(store: SharedStore) -> JoinHandle<()> {
    let interval_ms = store.lock().config().cron_interval_ms();
    log::info!("cron started, ticking every {}ms", interval_ms);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            cron_tick(&mut store.lock());
        }
    })
}

/// Single cron tick - performs all background tasks
pub fn cron_tick(store: &mut Store) -> CronReport {
    // 1. Active expiration - sample and delete expired keys
    let expired = store.active_expire_cycle();

    // 2. Eviction - only when a ceiling is configured
    let evicted = if store.config().maxmemory > 0 && store.over_maxmemory() {
        store.evict().evicted
    } else {
        0
    };

    CronReport { expired, evicted }
}
