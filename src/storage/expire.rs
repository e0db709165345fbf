//! Active expiration
//!
//! Redis-style adaptive sampling: each pass samples a handful of random
//! keys that carry a deadline and deletes the expired ones. Passes repeat
//! while they keep finding enough stale keys, and the cycle never runs past
//! its time budget. Keys that are never sampled stay until lazily expired.

use std::time::{Duration, Instant};

use super::Store;
use super::value::now_ms;

/// Outcome of one active expire cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpireCycleReport {
    pub expired: usize,
    pub sampled: usize,
    /// The cycle stopped because its budget ran out
    pub time_limit_hit: bool,
}

impl Store {
    /// Run one cycle with the configured budget. Returns keys expired.
    pub fn active_expire_cycle(&mut self) -> usize {
        let budget = Duration::from_micros(self.config.expire_cycle_time_us());
        self.active_expire_cycle_with_budget(budget).expired
    }

    /// Run one cycle that stops once `budget` has elapsed
    pub fn active_expire_cycle_with_budget(&mut self, budget: Duration) -> ExpireCycleReport {
        let start = Instant::now();
        let keys_per_loop = self.config.expire_keys_per_loop();
        let acceptable_stale = self.config.expire_acceptable_stale() as usize;
        let mut report = ExpireCycleReport::default();

        loop {
            if self.expires.is_empty() {
                break;
            }

            let now = now_ms();
            let mut sampled = 0usize;
            let mut expired = 0usize;
            for _ in 0..keys_per_loop.min(self.expires.len()) {
                let Some((key, &when)) = self.expires.random_slot() else {
                    break;
                };
                sampled += 1;
                if when <= now {
                    let key = key.clone();
                    self.delete_entry(&key);
                    expired += 1;
                }
            }
            report.sampled += sampled;
            report.expired += expired;

            if start.elapsed() >= budget {
                report.time_limit_hit = true;
                break;
            }
            // Stop once a pass finds few enough stale keys
            if sampled == 0 || expired * 100 <= acceptable_stale * sampled {
                break;
            }
        }

        self.stats.expire_cycles += 1;
        self.stats.expired_keys += report.expired as u64;
        if report.time_limit_hit {
            self.stats.expire_time_limit_hits += 1;
            log::debug!(
                "active expire cycle hit its time limit after expiring {} keys",
                report.expired
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn volatile_store(live: usize, dead: usize) -> Store {
        let mut store = Store::default();
        for i in 0..live {
            store.psetex(Bytes::from(format!("live:{}", i)), Bytes::from_static(b"v"), 60_000).unwrap();
        }
        for i in 0..dead {
            let key = Bytes::from(format!("dead:{}", i));
            store.set(key.clone(), Bytes::from_static(b"v")).unwrap();
            store.expires.insert(key, now_ms() - 1000);
        }
        store
    }

    #[test]
    fn test_cycle_expires_stale_keys() {
        let mut store = volatile_store(0, 100);
        let mut total = 0;
        // Each pass runs until the sample turns up no more than 10% stale
        while !store.expires.is_empty() {
            total += store.active_expire_cycle();
        }
        assert_eq!(total, 100);
        assert_eq!(store.len(), 0);
        assert_eq!(store.used_memory(), 0);
        assert_eq!(store.stats().expired_keys, 100);
    }

    #[test]
    fn test_cycle_leaves_live_keys() {
        let mut store = volatile_store(50, 0);
        assert_eq!(store.active_expire_cycle(), 0);
        assert_eq!(store.len(), 50);
        assert_eq!(store.stats().expire_cycles, 1);
    }

    #[test]
    fn test_cycle_without_volatile_keys() {
        let mut store = Store::default();
        store.set(Bytes::from_static(b"k"), Bytes::from_static(b"v")).unwrap();
        let report = store.active_expire_cycle_with_budget(Duration::from_millis(10));
        assert_eq!(report, ExpireCycleReport::default());
    }

    #[test]
    fn test_cycle_is_time_bounded() {
        let mut store = volatile_store(0, 100_000);
        let start = Instant::now();
        let report = store.active_expire_cycle_with_budget(Duration::from_millis(1));
        let elapsed = start.elapsed();

        assert!(report.time_limit_hit);
        assert!(elapsed < Duration::from_millis(250), "took {:?}", elapsed);
        // Incomplete by design: plenty of expired keys are still there
        assert!(store.len() > 0);
        assert_eq!(store.stats().expire_time_limit_hits, 1);
    }

    #[test]
    fn test_mostly_live_keyspace_stops_early() {
        let mut store = volatile_store(1000, 5);
        let report = store.active_expire_cycle_with_budget(Duration::from_secs(5));
        assert!(!report.time_limit_hit);
        // 5 stale keys in 1005 never keep the sampler above 10%
        assert!(report.sampled < 1000);
    }
}
