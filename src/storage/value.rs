use std::time::{SystemTime, UNIX_EPOCH};

/// Get current time in milliseconds since UNIX epoch
#[inline(always)]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Get current time in microseconds since UNIX epoch
#[inline(always)]
pub fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}
