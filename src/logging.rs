//! Logging configuration module
//!
//! Redis-compatible logging behind the `log` facade:
//! - Log levels (debug, verbose, notice, warning, nothing)
//! - File-based logging, stderr otherwise
//! - Redis line format: `pid:role timestamp level-char message`

use crate::config::Config;
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;

/// Redis-style log levels mapped to Rust log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisLogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
    Nothing,
}

impl RedisLogLevel {
    /// Parse Redis-style log level string
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "verbose" => Self::Verbose,
            "notice" => Self::Notice,
            "warning" => Self::Warning,
            "nothing" => Self::Nothing,
            _ => Self::Notice,
        }
    }

    /// Convert to Rust log LevelFilter
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::Debug,
            Self::Verbose => LevelFilter::Info,
            Self::Notice => LevelFilter::Info,
            Self::Warning => LevelFilter::Warn,
            Self::Nothing => LevelFilter::Off,
        }
    }
}

/// Logger writing Redis-formatted lines to a file or stderr
pub struct KvLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl KvLogger {
    /// Create a new logger from config. An unopenable logfile falls back to stderr.
    pub fn new(config: &Config) -> Self {
        let level = RedisLogLevel::parse(&config.loglevel).to_level_filter();

        let file = if !config.logfile.is_empty() {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.logfile)
            {
                Ok(f) => Some(Mutex::new(f)),
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to open log file '{}': {}",
                        config.logfile, e
                    );
                    None
                }
            }
        } else {
            None
        };

        Self { level, file }
    }

    /// Format log record as Redis-style output
    fn format_record(&self, record: &Record) -> String {
        let level_char = match record.level() {
            log::Level::Error => '#',
            log::Level::Warn => '#',
            log::Level::Info => '*',
            log::Level::Debug => '.',
            log::Level::Trace => '.',
        };

        format!(
            "{}:M {} {} {}\n",
            std::process::id(),
            timestamp(),
            level_char,
            record.args()
        )
    }
}

impl Log for KvLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let formatted = self.format_record(record);

        if let Some(ref file) = self.file {
            let _ = file.lock().write_all(formatted.as_bytes());
        } else {
            eprint!("{}", formatted);
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Unix seconds with millisecond precision, e.g. `1700000000.123`
fn timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

/// Install the store logger as the global `log` backend.
/// Fails if another logger is already installed.
pub fn init_logging(config: &Config) -> Result<(), log::SetLoggerError> {
    let logger = Box::new(KvLogger::new(config));
    let level = RedisLogLevel::parse(&config.loglevel).to_level_filter();

    log::set_boxed_logger(logger)?;
    log::set_max_level(level);

    Ok(())
}
