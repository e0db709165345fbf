use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR not found")]
    KeyNotFound,

    #[error("ERR item exists")]
    AlreadyExists,

    #[error("ERR {0}")]
    InvalidParameter(&'static str),

    #[error("ERR value is not an integer or out of range")]
    NotInteger,

    #[error("ERR value is not a valid float")]
    NotFloat,

    #[error("ERR filter is full")]
    FilterFull,

    #[error("OOM command not allowed when used memory > 'maxmemory'.")]
    OutOfMemory,

    #[error("ERR {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ==================== Argument Parsing ====================
//
// The command layer owns arity and syntax, but numeric arguments are classified
// here so every caller maps malformed input to the same error kind.

/// Parse a signed 64-bit integer argument
#[inline]
pub fn parse_i64(arg: &[u8]) -> Result<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(Error::NotInteger)
}

/// Parse an unsigned 64-bit integer argument
#[inline]
pub fn parse_u64(arg: &[u8]) -> Result<u64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or(Error::NotInteger)
}

/// Parse a float argument. NaN is rejected like Redis does.
#[inline]
pub fn parse_f64(arg: &[u8]) -> Result<f64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| !v.is_nan())
        .ok_or(Error::NotFloat)
}

/// Parse a CMS.INCRBY increment: an integer, and never negative.
pub fn parse_cms_increment(arg: &[u8]) -> Result<u64> {
    let value = parse_i64(arg)?;
    if value < 0 {
        return Err(Error::InvalidParameter("CMS: Cannot parse number"));
    }
    Ok(value as u64)
}
