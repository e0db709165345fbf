//! Store configuration
//!
//! Built once when the store is created and read-only afterwards. Defaults
//! follow Redis (expiry, eviction) and RedisBloom (filters).

use std::fmt;

/// Redis eviction policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaxMemoryPolicy {
    #[default]
    NoEviction,
    AllKeysLru,
    VolatileLru,
    AllKeysLfu,
    VolatileLfu,
    AllKeysRandom,
    VolatileRandom,
    VolatileTtl,
}

impl MaxMemoryPolicy {
    /// Policies that only consider keys with an expiry set
    #[inline]
    pub fn is_volatile(self) -> bool {
        matches!(
            self,
            Self::VolatileLru | Self::VolatileLfu | Self::VolatileRandom | Self::VolatileTtl
        )
    }

    #[inline]
    pub fn is_lru(self) -> bool {
        matches!(self, Self::AllKeysLru | Self::VolatileLru)
    }

    #[inline]
    pub fn is_lfu(self) -> bool {
        matches!(self, Self::AllKeysLfu | Self::VolatileLfu)
    }

    #[inline]
    pub fn is_random(self) -> bool {
        matches!(self, Self::AllKeysRandom | Self::VolatileRandom)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoEviction => "noeviction",
            Self::AllKeysLru => "allkeys-lru",
            Self::VolatileLru => "volatile-lru",
            Self::AllKeysLfu => "allkeys-lfu",
            Self::VolatileLfu => "volatile-lfu",
            Self::AllKeysRandom => "allkeys-random",
            Self::VolatileRandom => "volatile-random",
            Self::VolatileTtl => "volatile-ttl",
        }
    }
}

impl std::str::FromStr for MaxMemoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "noeviction" => Ok(Self::NoEviction),
            "allkeys-lru" => Ok(Self::AllKeysLru),
            "volatile-lru" => Ok(Self::VolatileLru),
            "allkeys-lfu" => Ok(Self::AllKeysLfu),
            "volatile-lfu" => Ok(Self::VolatileLfu),
            "allkeys-random" => Ok(Self::AllKeysRandom),
            "volatile-random" => Ok(Self::VolatileRandom),
            "volatile-ttl" => Ok(Self::VolatileTtl),
            _ => Err(format!("Unknown maxmemory-policy: {}", s)),
        }
    }
}

impl fmt::Display for MaxMemoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct Config {
    // --- Logging ---
    pub loglevel: String,
    /// Empty string logs to stderr
    pub logfile: String,

    // --- Cron ---
    /// Background task frequency (default: 10)
    pub hz: u32,

    // --- Active expiry ---
    /// 1..=10, scales the three knobs below
    pub active_expire_effort: u32,
    pub active_expire_keys_per_loop: usize,
    /// Time budget of one cycle in microseconds
    pub active_expire_cycle_time_us: u64,
    /// Stop sampling once at most this percentage of a pass was expired
    pub active_expire_acceptable_stale: u32,

    // --- Memory management ---
    /// Memory ceiling in bytes (0 = unlimited)
    pub maxmemory: u64,
    pub maxmemory_policy: MaxMemoryPolicy,
    pub maxmemory_samples: usize,
    pub maxmemory_eviction_pool_size: usize,
    pub lfu_log_factor: u32,
    /// Minutes of idleness per LFU counter decrement
    pub lfu_decay_time: u32,

    // --- Bloom filter defaults ---
    pub bf_error_rate: f64,
    pub bf_initial_size: u64,
    pub bf_expansion_factor: u32,

    // --- Cuckoo filter defaults ---
    pub cf_bucket_size: u32,
    pub cf_initial_size: u64,
    pub cf_max_iterations: u32,
    pub cf_expansion_factor: u32,

    // --- Count-Min Sketch defaults (lazy creation) ---
    pub cms_default_width: usize,
    pub cms_default_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loglevel: "notice".to_string(),
            logfile: String::new(),
            hz: 10,
            active_expire_effort: 1,
            active_expire_keys_per_loop: 20,
            active_expire_cycle_time_us: 25_000,
            active_expire_acceptable_stale: 10,
            maxmemory: 0,
            maxmemory_policy: MaxMemoryPolicy::NoEviction,
            maxmemory_samples: 5,
            maxmemory_eviction_pool_size: 16,
            lfu_log_factor: 10,
            lfu_decay_time: 1,
            bf_error_rate: 0.01,
            bf_initial_size: 100,
            bf_expansion_factor: 2,
            cf_bucket_size: 2,
            cf_initial_size: 1024,
            cf_max_iterations: 20,
            cf_expansion_factor: 1,
            cms_default_width: 2000,
            cms_default_depth: 7,
        }
    }
}

impl Config {
    /// Effort above 1 adds a quarter of the base per step, like Redis
    #[inline]
    fn effort_steps(&self) -> u64 {
        (self.active_expire_effort.clamp(1, 10) - 1) as u64
    }

    /// Keys sampled per active-expire pass after applying effort
    pub fn expire_keys_per_loop(&self) -> usize {
        let base = self.active_expire_keys_per_loop.max(1);
        base.saturating_add((base / 4).saturating_mul(self.effort_steps() as usize))
    }

    /// Time budget of one active-expire cycle after applying effort
    pub fn expire_cycle_time_us(&self) -> u64 {
        let base = self.active_expire_cycle_time_us;
        base.saturating_add((base / 4).saturating_mul(self.effort_steps()))
    }

    /// Productivity threshold (percent) after applying effort
    pub fn expire_acceptable_stale(&self) -> u32 {
        self.active_expire_acceptable_stale
            .saturating_sub(self.effort_steps() as u32)
    }

    /// Cron tick interval in milliseconds
    pub fn cron_interval_ms(&self) -> u64 {
        1000 / self.hz.clamp(1, 500) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_roundtrip_names() {
        for name in [
            "noeviction",
            "allkeys-lru",
            "allkeys-lfu",
            "allkeys-random",
            "volatile-lru",
            "volatile-lfu",
            "volatile-random",
            "volatile-ttl",
        ] {
            let policy: MaxMemoryPolicy = name.parse().unwrap();
            assert_eq!(policy.to_string(), name);
        }
        assert!("lru".parse::<MaxMemoryPolicy>().is_err());
    }

    #[test]
    fn test_policy_families() {
        assert!(MaxMemoryPolicy::VolatileTtl.is_volatile());
        assert!(!MaxMemoryPolicy::AllKeysLru.is_volatile());
        assert!(MaxMemoryPolicy::VolatileLru.is_lru());
        assert!(MaxMemoryPolicy::AllKeysLfu.is_lfu());
        assert!(MaxMemoryPolicy::VolatileRandom.is_random());
    }

    #[test]
    fn test_effort_scaling() {
        let mut config = Config::default();
        assert_eq!(config.expire_keys_per_loop(), 20);
        assert_eq!(config.expire_cycle_time_us(), 25_000);
        assert_eq!(config.expire_acceptable_stale(), 10);

        config.active_expire_effort = 10;
        assert_eq!(config.expire_keys_per_loop(), 20 + 5 * 9);
        assert_eq!(config.expire_cycle_time_us(), 25_000 + 6_250 * 9);
        assert_eq!(config.expire_acceptable_stale(), 1);
    }

    #[test]
    fn test_effort_scaling_saturates() {
        let mut config = Config::default();
        config
            .set("active-expire-keys-per-loop", &usize::MAX.to_string())
            .unwrap();
        config.set("active-expire-effort", "2").unwrap();
        assert_eq!(config.expire_keys_per_loop(), usize::MAX);

        config
            .set("active-expire-cycle-time", &u64::MAX.to_string())
            .unwrap();
        config.set("active-expire-effort", "10").unwrap();
        assert_eq!(config.expire_cycle_time_us(), u64::MAX);
        assert_eq!(config.expire_keys_per_loop(), usize::MAX);
    }

    #[test]
    fn test_cron_interval() {
        let mut config = Config::default();
        assert_eq!(config.cron_interval_ms(), 100);
        config.hz = 0;
        assert_eq!(config.cron_interval_ms(), 1000);
        config.hz = 1000;
        assert_eq!(config.cron_interval_ms(), 2);
    }
}
