use bytes::Bytes;

use crate::error::{Error, Result};
use crate::storage::Store;
use crate::storage::types::{DataType, ObjectKind};
use crate::storage::value::now_ms;

/// String operations for the Store
impl Store {
    // ==================== String operations ====================

    /// Get string value, WRONGTYPE if the key holds something else
    #[inline]
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Bytes>> {
        let value = self.read_value(key, ObjectKind::String)?;
        Ok(value.and_then(|v| v.as_string().cloned()))
    }

    /// Set string value, replacing a value of any kind. Clears the expiry.
    pub fn set(&mut self, key: Bytes, value: Bytes) -> Result<()> {
        self.check_oom()?;
        self.expires.remove(&key);
        self.insert_entry(key, DataType::String(value));
        Ok(())
    }

    /// Set string value with a relative expiry in milliseconds
    pub fn psetex(&mut self, key: Bytes, value: Bytes, ms: i64) -> Result<()> {
        if ms <= 0 {
            return Err(Error::InvalidParameter("invalid expire time in 'psetex' command"));
        }
        let expire_at = now_ms().saturating_add(ms);
        self.set(key.clone(), value)?;
        self.expires.insert(key, expire_at);
        Ok(())
    }

    /// Length of the string value, 0 if missing
    pub fn strlen(&mut self, key: &[u8]) -> Result<usize> {
        Ok(self.get(key)?.map_or(0, |v| v.len()))
    }
}
