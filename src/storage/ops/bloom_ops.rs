use bytes::Bytes;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::Store;
use crate::storage::bloomfilter::{
    BloomInfo, BloomInfoField, ScalableBloomFilter, projected_size, validate_params,
};
use crate::storage::store::ensure_fits;
use crate::storage::types::{DataType, ObjectKind};

/// BF.INSERT options. Unset fields fall back to the configured defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct BloomInsertOptions {
    pub capacity: Option<u64>,
    pub error_rate: Option<f64>,
    pub expansion: Option<u32>,
    /// Fail with KeyNotFound instead of creating the filter
    pub nocreate: bool,
    pub nonscaling: bool,
}

#[inline]
fn bloom_mut(data: &mut DataType) -> Result<&mut ScalableBloomFilter> {
    data.as_bloom_mut().ok_or(Error::WrongType)
}

fn default_bloom(config: &Config) -> DataType {
    DataType::BloomFilter(Box::new(ScalableBloomFilter::new(
        config.bf_error_rate,
        config.bf_initial_size,
        config.bf_expansion_factor,
        false,
    )))
}

/// Bloom Filter storage operations
impl Store {
    /// BF.RESERVE: create an empty filter. Fails if the key holds anything.
    pub fn bf_reserve(
        &mut self,
        key: &[u8],
        error_rate: f64,
        capacity: u64,
        expansion: Option<u32>,
        nonscaling: bool,
    ) -> Result<()> {
        let expansion = expansion.unwrap_or(self.config.bf_expansion_factor);
        validate_params(error_rate, capacity, expansion)?;
        self.ensure_absent(key)?;
        ensure_fits(&self.config, projected_size(error_rate, capacity))?;
        self.check_oom()?;

        let bf = ScalableBloomFilter::new(error_rate, capacity, expansion, nonscaling);
        self.insert_entry(Bytes::copy_from_slice(key), DataType::BloomFilter(Box::new(bf)));
        Ok(())
    }

    /// BF.ADD: true if the item was not present. Creates a default filter.
    pub fn bf_add(&mut self, key: &[u8], item: &[u8]) -> Result<bool> {
        self.check_oom()?;
        self.modify_or_create(
            key,
            ObjectKind::BloomFilter,
            |config| Ok(default_bloom(config)),
            |data, _| bloom_mut(data)?.add(item),
        )
    }

    /// BF.MADD: one result per item, a full non-scaling filter fails per item
    pub fn bf_madd(&mut self, key: &[u8], items: &[Bytes]) -> Result<Vec<Result<bool>>> {
        self.check_oom()?;
        self.modify_or_create(
            key,
            ObjectKind::BloomFilter,
            |config| Ok(default_bloom(config)),
            |data, _| {
                let bf = bloom_mut(data)?;
                Ok(items.iter().map(|item| bf.add(item)).collect())
            },
        )
    }

    /// BF.INSERT: like MADD, with creation parameters and NOCREATE
    pub fn bf_insert(
        &mut self,
        key: &[u8],
        items: &[Bytes],
        options: &BloomInsertOptions,
    ) -> Result<Vec<Result<bool>>> {
        if options.nocreate && (options.capacity.is_some() || options.error_rate.is_some()) {
            return Err(Error::InvalidParameter(
                "NOCREATE cannot be used together with CAPACITY or ERROR",
            ));
        }
        let error_rate = options.error_rate.unwrap_or(self.config.bf_error_rate);
        let capacity = options.capacity.unwrap_or(self.config.bf_initial_size);
        let expansion = options.expansion.unwrap_or(self.config.bf_expansion_factor);
        validate_params(error_rate, capacity, expansion)?;
        self.check_oom()?;

        let add_all = |data: &mut DataType| -> Result<Vec<Result<bool>>> {
            let bf = bloom_mut(data)?;
            Ok(items.iter().map(|item| bf.add(item)).collect())
        };

        if options.nocreate {
            return self
                .modify(key, ObjectKind::BloomFilter, add_all)?
                .ok_or(Error::KeyNotFound);
        }
        let nonscaling = options.nonscaling;
        self.modify_or_create(
            key,
            ObjectKind::BloomFilter,
            |config| {
                ensure_fits(config, projected_size(error_rate, capacity))?;
                Ok(DataType::BloomFilter(Box::new(ScalableBloomFilter::new(
                    error_rate, capacity, expansion, nonscaling,
                ))))
            },
            |data, _| add_all(data),
        )
    }

    /// BF.EXISTS: false for a missing key
    pub fn bf_exists(&mut self, key: &[u8], item: &[u8]) -> Result<bool> {
        let value = self.read_value(key, ObjectKind::BloomFilter)?;
        Ok(value
            .and_then(|v| v.as_bloom())
            .is_some_and(|bf| bf.exists(item)))
    }

    /// BF.MEXISTS
    pub fn bf_mexists(&mut self, key: &[u8], items: &[Bytes]) -> Result<Vec<bool>> {
        let value = self.read_value(key, ObjectKind::BloomFilter)?;
        Ok(match value.and_then(|v| v.as_bloom()) {
            Some(bf) => items.iter().map(|item| bf.exists(item)).collect(),
            None => vec![false; items.len()],
        })
    }

    /// BF.CARD: items added, 0 for a missing key
    pub fn bf_card(&mut self, key: &[u8]) -> Result<u64> {
        let value = self.read_value(key, ObjectKind::BloomFilter)?;
        Ok(value.and_then(|v| v.as_bloom()).map_or(0, |bf| bf.card()))
    }

    /// BF.INFO
    pub fn bf_info(&mut self, key: &[u8]) -> Result<BloomInfo> {
        let value = self.read_value(key, ObjectKind::BloomFilter)?;
        value
            .and_then(|v| v.as_bloom())
            .map(|bf| bf.info())
            .ok_or(Error::KeyNotFound)
    }

    /// BF.INFO with a single field. None for EXPANSION of a non-scaling filter.
    pub fn bf_info_field(&mut self, key: &[u8], field: BloomInfoField) -> Result<Option<u64>> {
        Ok(self.bf_info(key)?.field(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(prefix: &str, n: usize) -> Vec<Bytes> {
        (0..n).map(|i| Bytes::from(format!("{}{}", prefix, i))).collect()
    }

    #[test]
    fn test_reserve_and_add() {
        let mut store = Store::default();
        store.bf_reserve(b"bf", 0.01, 1000, Some(2), false).unwrap();
        assert!(store.bf_add(b"bf", b"item1").unwrap());
        assert!(!store.bf_add(b"bf", b"item1").unwrap());
        assert!(store.bf_exists(b"bf", b"item1").unwrap());
        assert!(!store.bf_exists(b"missing", b"item1").unwrap());
    }

    #[test]
    fn test_reserve_errors() {
        let mut store = Store::default();
        assert!(matches!(
            store.bf_reserve(b"bf", 1.5, 100, None, false),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            store.bf_reserve(b"bf", 0.01, 0, None, false),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            store.bf_reserve(b"bf", 0.01, 100, Some(0), false),
            Err(Error::InvalidParameter(_))
        ));

        store.set(Bytes::from_static(b"s"), Bytes::from_static(b"v")).unwrap();
        assert!(matches!(
            store.bf_reserve(b"s", 0.01, 100, None, false),
            Err(Error::AlreadyExists)
        ));
        store.bf_reserve(b"bf", 0.01, 100, None, false).unwrap();
        assert!(matches!(
            store.bf_reserve(b"bf", 0.01, 100, None, false),
            Err(Error::AlreadyExists)
        ));
        assert!(matches!(store.bf_add(b"s", b"x"), Err(Error::WrongType)));
    }

    #[test]
    fn test_card_and_growth() {
        let mut store = Store::default();
        store.bf_reserve(b"bf", 0.01, 1000, Some(2), false).unwrap();

        for item in items("unique", 1000) {
            assert!(store.bf_add(b"bf", &item).unwrap());
        }
        assert_eq!(store.bf_card(b"bf").unwrap(), 1000);
        assert_eq!(store.bf_info(b"bf").unwrap().filters, 1);

        for item in items("more", 500) {
            store.bf_add(b"bf", &item).unwrap();
        }
        let info = store.bf_info(b"bf").unwrap();
        assert!(info.filters >= 2);
        assert_eq!(info.capacity, 1000 + 2000);
        assert_eq!(info.expansion, Some(2));
        assert_eq!(store.bf_info_field(b"bf", BloomInfoField::Capacity).unwrap(), Some(3000));
    }

    #[test]
    fn test_no_false_negatives_across_growth() {
        let mut store = Store::default();
        store.bf_reserve(b"bf", 0.01, 100, Some(2), false).unwrap();
        let all = items("x", 2000);
        let results = store.bf_madd(b"bf", &all).unwrap();
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(store.bf_mexists(b"bf", &all).unwrap().into_iter().all(|e| e));
    }

    #[test]
    fn test_memory_tracks_growth() {
        let mut store = Store::default();
        store.bf_reserve(b"bf", 0.01, 100, Some(2), false).unwrap();
        let before = store.used_memory();
        store.bf_madd(b"bf", &items("g", 500)).unwrap();
        assert!(store.used_memory() > before);
        assert_eq!(Some(store.used_memory()), store.memory_usage_of(b"bf"));
    }

    #[test]
    fn test_nonscaling_full() {
        let mut store = Store::default();
        store.bf_reserve(b"bf", 0.01, 10, None, true).unwrap();
        let results = store.bf_madd(b"bf", &items("n", 50)).unwrap();
        assert!(results.iter().any(|r| matches!(r, Err(Error::FilterFull))));
        let info = store.bf_info(b"bf").unwrap();
        assert_eq!(info.filters, 1);
        assert_eq!(info.expansion, None);
        assert_eq!(store.bf_info_field(b"bf", BloomInfoField::Expansion).unwrap(), None);
    }

    #[test]
    fn test_insert_options() {
        let mut store = Store::default();
        let nocreate = BloomInsertOptions {
            nocreate: true,
            ..Default::default()
        };
        assert!(matches!(
            store.bf_insert(b"bf", &items("a", 3), &nocreate),
            Err(Error::KeyNotFound)
        ));
        assert!(!store.exists(b"bf"));

        let options = BloomInsertOptions {
            capacity: Some(500),
            error_rate: Some(0.001),
            ..Default::default()
        };
        let results = store.bf_insert(b"bf", &items("a", 3), &options).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(store.bf_info(b"bf").unwrap().capacity, 500);

        let results = store.bf_insert(b"bf", &items("a", 4), &nocreate).unwrap();
        let fresh: Vec<bool> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(fresh, vec![false, false, false, true]);

        let bad = BloomInsertOptions {
            nocreate: true,
            capacity: Some(10),
            ..Default::default()
        };
        assert!(store.bf_insert(b"bf", &items("a", 1), &bad).is_err());
    }

    #[test]
    fn test_add_creates_with_defaults() {
        let mut store = Store::default();
        assert!(store.bf_add(b"bf", b"x").unwrap());
        let info = store.bf_info(b"bf").unwrap();
        assert_eq!(info.capacity, store.config().bf_initial_size);
        assert_eq!(info.items, 1);
        assert!(matches!(store.bf_info(b"nope"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn test_false_positive_rate() {
        let mut store = Store::default();
        store.bf_reserve(b"bf", 0.01, 10_000, None, false).unwrap();
        store.bf_madd(b"bf", &items("in", 10_000)).unwrap();

        let probes = items("out", 10_000);
        let false_positives = store
            .bf_mexists(b"bf", &probes)
            .unwrap()
            .into_iter()
            .filter(|&e| e)
            .count();
        let rate = false_positives as f64 / probes.len() as f64;
        assert!(rate < 0.03, "false positive rate {}", rate);
    }
}
