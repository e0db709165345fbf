//! Redis-style configuration table
//!
//! Table-driven directive handling, similar to Redis's standardConfig in
//! config.c. Each entry knows how to render and parse one `Config` field.

use crate::config::{Config, MaxMemoryPolicy};
use crate::error::{Error, Result};

/// Getter function type
pub type ConfigGetter = fn(&Config) -> String;
/// Setter function type
pub type ConfigSetter = fn(&mut Config, &str) -> std::result::Result<(), String>;

/// A configuration entry in the table
pub struct ConfigEntry {
    pub name: &'static str,
    pub default_value: &'static str,
    pub getter: ConfigGetter,
    pub setter: ConfigSetter,
}

macro_rules! string_getter {
    ($field:ident) => {
        |c| c.$field.clone()
    };
}

macro_rules! string_setter {
    ($field:ident) => {
        |c, v| {
            c.$field = v.to_string();
            Ok(())
        }
    };
}

macro_rules! int_getter {
    ($field:ident) => {
        |c| c.$field.to_string()
    };
}

macro_rules! int_setter {
    ($field:ident, $ty:ty) => {
        |c, v| {
            c.$field = v.parse::<$ty>().map_err(|_| "Invalid integer")?;
            Ok(())
        }
    };
    ($field:ident, $ty:ty, $range:expr) => {
        |c, v| {
            let parsed = v.parse::<$ty>().map_err(|_| "Invalid integer")?;
            if !($range).contains(&parsed) {
                return Err("argument must be within the accepted range".into());
            }
            c.$field = parsed;
            Ok(())
        }
    };
}

/// The static configuration table
pub static CONFIG_TABLE: &[ConfigEntry] = &[
    // === Logging ===
    ConfigEntry {
        name: "loglevel",
        default_value: "notice",
        getter: string_getter!(loglevel),
        setter: |c, v| match v.to_lowercase().as_str() {
            "debug" | "verbose" | "notice" | "warning" | "nothing" => {
                c.loglevel = v.to_lowercase();
                Ok(())
            }
            _ => Err(format!("Invalid loglevel: {}", v)),
        },
    },
    ConfigEntry {
        name: "logfile",
        default_value: "",
        getter: string_getter!(logfile),
        setter: string_setter!(logfile),
    },
    // === Cron / active expiry ===
    ConfigEntry {
        name: "hz",
        default_value: "10",
        getter: int_getter!(hz),
        setter: |c, v| {
            let hz = v.parse::<u32>().map_err(|_| "Invalid integer")?;
            c.hz = hz.clamp(1, 500);
            Ok(())
        },
    },
    ConfigEntry {
        name: "active-expire-effort",
        default_value: "1",
        getter: int_getter!(active_expire_effort),
        setter: int_setter!(active_expire_effort, u32, 1..=10),
    },
    ConfigEntry {
        name: "active-expire-keys-per-loop",
        default_value: "20",
        getter: int_getter!(active_expire_keys_per_loop),
        setter: int_setter!(active_expire_keys_per_loop, usize, 1..=usize::MAX),
    },
    ConfigEntry {
        name: "active-expire-cycle-time",
        default_value: "25000",
        getter: int_getter!(active_expire_cycle_time_us),
        setter: int_setter!(active_expire_cycle_time_us, u64),
    },
    ConfigEntry {
        name: "active-expire-acceptable-stale",
        default_value: "10",
        getter: int_getter!(active_expire_acceptable_stale),
        setter: int_setter!(active_expire_acceptable_stale, u32, 0..=100),
    },
    // === Memory management ===
    ConfigEntry {
        name: "maxmemory",
        default_value: "0",
        getter: int_getter!(maxmemory),
        setter: |c, v| {
            c.maxmemory = parse_memory(v)?;
            Ok(())
        },
    },
    ConfigEntry {
        name: "maxmemory-policy",
        default_value: "noeviction",
        getter: |c| c.maxmemory_policy.to_string(),
        setter: |c, v| {
            c.maxmemory_policy = v.parse::<MaxMemoryPolicy>()?;
            Ok(())
        },
    },
    ConfigEntry {
        name: "maxmemory-samples",
        default_value: "5",
        getter: int_getter!(maxmemory_samples),
        setter: int_setter!(maxmemory_samples, usize, 1..=64),
    },
    ConfigEntry {
        name: "maxmemory-eviction-pool-size",
        default_value: "16",
        getter: int_getter!(maxmemory_eviction_pool_size),
        setter: int_setter!(maxmemory_eviction_pool_size, usize, 1..=1024),
    },
    ConfigEntry {
        name: "lfu-log-factor",
        default_value: "10",
        getter: int_getter!(lfu_log_factor),
        setter: int_setter!(lfu_log_factor, u32),
    },
    ConfigEntry {
        name: "lfu-decay-time",
        default_value: "1",
        getter: int_getter!(lfu_decay_time),
        setter: int_setter!(lfu_decay_time, u32),
    },
    // === Bloom filter ===
    ConfigEntry {
        name: "bf-error-rate",
        default_value: "0.01",
        getter: |c| c.bf_error_rate.to_string(),
        setter: |c, v| {
            let rate = v.parse::<f64>().map_err(|_| "Invalid float")?;
            if !(rate > 0.0 && rate < 1.0) {
                return Err("error rate must be in (0, 1)".into());
            }
            c.bf_error_rate = rate;
            Ok(())
        },
    },
    ConfigEntry {
        name: "bf-initial-size",
        default_value: "100",
        getter: int_getter!(bf_initial_size),
        setter: int_setter!(bf_initial_size, u64, 1..=(1u64 << 30)),
    },
    ConfigEntry {
        name: "bf-expansion-factor",
        default_value: "2",
        getter: int_getter!(bf_expansion_factor),
        setter: int_setter!(bf_expansion_factor, u32, 1..=32768),
    },
    // === Cuckoo filter ===
    ConfigEntry {
        name: "cf-bucket-size",
        default_value: "2",
        getter: int_getter!(cf_bucket_size),
        setter: int_setter!(cf_bucket_size, u32, 1..=255),
    },
    ConfigEntry {
        name: "cf-initial-size",
        default_value: "1024",
        getter: int_getter!(cf_initial_size),
        setter: int_setter!(cf_initial_size, u64, 2..=(1u64 << 30)),
    },
    ConfigEntry {
        name: "cf-max-iterations",
        default_value: "20",
        getter: int_getter!(cf_max_iterations),
        setter: int_setter!(cf_max_iterations, u32, 1..=65535),
    },
    ConfigEntry {
        name: "cf-expansion-factor",
        default_value: "1",
        getter: int_getter!(cf_expansion_factor),
        setter: int_setter!(cf_expansion_factor, u32, 0..=32768),
    },
    // === Count-Min Sketch ===
    ConfigEntry {
        name: "cms-default-width",
        default_value: "2000",
        getter: int_getter!(cms_default_width),
        setter: int_setter!(cms_default_width, usize, 1..=usize::MAX),
    },
    ConfigEntry {
        name: "cms-default-depth",
        default_value: "7",
        getter: int_getter!(cms_default_depth),
        setter: int_setter!(cms_default_depth, usize, 1..=usize::MAX),
    },
];

/// Find a config entry by name (case-insensitive)
pub fn find_config(name: &str) -> Option<&'static ConfigEntry> {
    CONFIG_TABLE
        .iter()
        .find(|e| e.name.eq_ignore_ascii_case(name))
}

/// Parse a memory amount with an optional unit suffix (kb, mb, gb, k, m, g, b)
pub fn parse_memory(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Ok(0);
    }

    let (num_str, unit) = if let Some(n) = s.strip_suffix("gb") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("mb") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("kb") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix('g') {
        (n, 1000 * 1000 * 1000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 1000 * 1000)
    } else if let Some(n) = s.strip_suffix('k') {
        (n, 1000)
    } else if let Some(n) = s.strip_suffix('b') {
        (n, 1)
    } else {
        (s.as_str(), 1)
    };

    let num = num_str
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("Invalid memory value: {}", s))?;

    num.checked_mul(unit)
        .ok_or_else(|| format!("Memory value out of range: {}", s))
}

impl Config {
    /// CONFIG SET semantics for one directive
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let entry = find_config(name)
            .ok_or_else(|| Error::Config(format!("Unknown option or number of arguments for CONFIG SET - '{}'", name)))?;
        (entry.setter)(self, value).map_err(|e| {
            Error::Config(format!("Invalid argument '{}' for CONFIG SET '{}' - {}", value, entry.name, e))
        })
    }

    /// CONFIG GET semantics for one directive
    pub fn get(&self, name: &str) -> Option<String> {
        find_config(name).map(|entry| (entry.getter)(self))
    }

    /// Parse a redis.conf style text: one `directive value` per line,
    /// `#` comments and blank lines ignored
    pub fn from_config_str(text: &str) -> Result<Self> {
        let mut config = Config::default();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = match line.split_once(char::is_whitespace) {
                Some((name, value)) => (name, value.trim().trim_matches('"')),
                None => {
                    return Err(Error::Config(format!(
                        "line {}: missing value for '{}'",
                        lineno + 1,
                        line
                    )));
                }
            };
            config
                .set(name, value)
                .map_err(|e| Error::Config(format!("line {}: {}", lineno + 1, e)))?;
        }
        Ok(config)
    }

    /// Load a config file from disk
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_config_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_table() {
        let config = Config::default();
        for entry in CONFIG_TABLE {
            assert_eq!(
                (entry.getter)(&config),
                entry.default_value,
                "default mismatch for {}",
                entry.name
            );
        }
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("maxmemory", "100mb").unwrap();
        assert_eq!(config.maxmemory, 100 * 1024 * 1024);
        config.set("MAXMEMORY-POLICY", "allkeys-lru").unwrap();
        assert_eq!(config.maxmemory_policy, MaxMemoryPolicy::AllKeysLru);
        assert_eq!(config.get("maxmemory-policy").unwrap(), "allkeys-lru");
        assert!(config.get("no-such-option").is_none());
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("active-expire-effort", "11").is_err());
        assert!(config.set("bf-error-rate", "1.5").is_err());
        assert!(config.set("maxmemory-policy", "most-recent").is_err());
        assert!(config.set("unknown", "1").is_err());
        // unchanged after failures
        assert_eq!(config.active_expire_effort, 1);
    }

    #[test]
    fn test_parse_memory_units() {
        assert_eq!(parse_memory("1kb").unwrap(), 1024);
        assert_eq!(parse_memory("2k").unwrap(), 2000);
        assert_eq!(parse_memory("1gb").unwrap(), 1 << 30);
        assert_eq!(parse_memory("512").unwrap(), 512);
        assert!(parse_memory("lots").is_err());
    }

    #[test]
    fn test_from_config_str() {
        let text = "\
# memory
maxmemory 1mb
maxmemory-policy volatile-ttl

hz 20
cf-bucket-size 4
";
        let config = Config::from_config_str(text).unwrap();
        assert_eq!(config.maxmemory, 1024 * 1024);
        assert_eq!(config.maxmemory_policy, MaxMemoryPolicy::VolatileTtl);
        assert_eq!(config.hz, 20);
        assert_eq!(config.cf_bucket_size, 4);

        assert!(Config::from_config_str("maxmemory").is_err());
        assert!(Config::from_config_str("hz ten").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"maxmemory-samples 10\n").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.maxmemory_samples, 10);
    }
}
