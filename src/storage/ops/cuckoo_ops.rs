use bytes::Bytes;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::Store;
use crate::storage::cuckoofilter::{CuckooFilter, CuckooInfo, CuckooParams};
use crate::storage::store::ensure_fits;
use crate::storage::types::{DataType, ObjectKind};

/// CF.INSERT / CF.INSERTNX options
#[derive(Debug, Clone, Copy, Default)]
pub struct CuckooInsertOptions {
    /// Capacity of a newly created filter, the configured default if unset
    pub capacity: Option<u64>,
    /// Fail with KeyNotFound instead of creating the filter
    pub nocreate: bool,
}

#[inline]
fn cuckoo_mut(data: &mut DataType) -> Result<&mut CuckooFilter> {
    data.as_cuckoo_mut().ok_or(Error::WrongType)
}

fn params_with_capacity(config: &Config, capacity: u64) -> CuckooParams {
    CuckooParams {
        capacity,
        bucket_size: config.cf_bucket_size,
        max_iterations: config.cf_max_iterations,
        expansion: config.cf_expansion_factor,
    }
}

fn create_cuckoo(config: &Config, params: CuckooParams) -> Result<DataType> {
    params.validate()?;
    ensure_fits(config, params.projected_size())?;
    Ok(DataType::CuckooFilter(Box::new(CuckooFilter::new(params))))
}

/// Cuckoo Filter storage operations
impl Store {
    /// CF.RESERVE: create an empty filter. Fails if the key holds anything.
    pub fn cf_reserve(
        &mut self,
        key: &[u8],
        capacity: u64,
        bucket_size: Option<u32>,
        max_iterations: Option<u32>,
        expansion: Option<u32>,
    ) -> Result<()> {
        let defaults = params_with_capacity(&self.config, capacity);
        let params = CuckooParams {
            capacity,
            bucket_size: bucket_size.unwrap_or(defaults.bucket_size),
            max_iterations: max_iterations.unwrap_or(defaults.max_iterations),
            expansion: expansion.unwrap_or(defaults.expansion),
        };
        params.validate()?;
        self.ensure_absent(key)?;
        ensure_fits(&self.config, params.projected_size())?;
        self.check_oom()?;

        self.insert_entry(
            Bytes::copy_from_slice(key),
            DataType::CuckooFilter(Box::new(CuckooFilter::new(params))),
        );
        Ok(())
    }

    /// CF.ADD: insert one occurrence. Creates a default filter.
    pub fn cf_add(&mut self, key: &[u8], item: &[u8]) -> Result<()> {
        self.check_oom()?;
        self.modify_or_create(
            key,
            ObjectKind::CuckooFilter,
            |config| create_cuckoo(config, params_with_capacity(config, config.cf_initial_size)),
            |data, _| cuckoo_mut(data)?.add(item),
        )
    }

    /// CF.ADDNX: false if the item may already be present
    pub fn cf_addnx(&mut self, key: &[u8], item: &[u8]) -> Result<bool> {
        self.check_oom()?;
        self.modify_or_create(
            key,
            ObjectKind::CuckooFilter,
            |config| create_cuckoo(config, params_with_capacity(config, config.cf_initial_size)),
            |data, _| cuckoo_mut(data)?.add_nx(item),
        )
    }

    fn cf_insert_with<T>(
        &mut self,
        key: &[u8],
        options: &CuckooInsertOptions,
        insert: impl FnOnce(&mut CuckooFilter) -> Vec<Result<T>>,
    ) -> Result<Vec<Result<T>>> {
        if options.capacity == Some(0) {
            return Err(Error::InvalidParameter("Capacity must be larger than 0"));
        }
        self.check_oom()?;

        if options.nocreate {
            return self
                .modify(key, ObjectKind::CuckooFilter, |data| Ok(insert(cuckoo_mut(data)?)))?
                .ok_or(Error::KeyNotFound);
        }
        let capacity = options.capacity;
        self.modify_or_create(
            key,
            ObjectKind::CuckooFilter,
            |config| {
                create_cuckoo(
                    config,
                    params_with_capacity(config, capacity.unwrap_or(config.cf_initial_size)),
                )
            },
            |data, _| Ok(insert(cuckoo_mut(data)?)),
        )
    }

    /// CF.INSERT: one result per item, FilterFull when an item cannot be placed
    pub fn cf_insert(
        &mut self,
        key: &[u8],
        items: &[Bytes],
        options: &CuckooInsertOptions,
    ) -> Result<Vec<Result<()>>> {
        self.cf_insert_with(key, options, |cf| items.iter().map(|item| cf.add(item)).collect())
    }

    /// CF.INSERTNX: per item, Ok(false) if it may already be present
    pub fn cf_insertnx(
        &mut self,
        key: &[u8],
        items: &[Bytes],
        options: &CuckooInsertOptions,
    ) -> Result<Vec<Result<bool>>> {
        self.cf_insert_with(key, options, |cf| {
            items.iter().map(|item| cf.add_nx(item)).collect()
        })
    }

    /// CF.EXISTS: false for a missing key
    pub fn cf_exists(&mut self, key: &[u8], item: &[u8]) -> Result<bool> {
        let value = self.read_value(key, ObjectKind::CuckooFilter)?;
        Ok(value
            .and_then(|v| v.as_cuckoo())
            .is_some_and(|cf| cf.exists(item)))
    }

    /// CF.MEXISTS
    pub fn cf_mexists(&mut self, key: &[u8], items: &[Bytes]) -> Result<Vec<bool>> {
        let value = self.read_value(key, ObjectKind::CuckooFilter)?;
        Ok(match value.and_then(|v| v.as_cuckoo()) {
            Some(cf) => items.iter().map(|item| cf.exists(item)).collect(),
            None => vec![false; items.len()],
        })
    }

    /// CF.COUNT: 0 for a missing key
    pub fn cf_count(&mut self, key: &[u8], item: &[u8]) -> Result<u64> {
        let value = self.read_value(key, ObjectKind::CuckooFilter)?;
        Ok(value.and_then(|v| v.as_cuckoo()).map_or(0, |cf| cf.count(item)))
    }

    /// CF.DEL: remove one occurrence. KeyNotFound if there is no filter.
    pub fn cf_del(&mut self, key: &[u8], item: &[u8]) -> Result<bool> {
        self.modify(key, ObjectKind::CuckooFilter, |data| {
            Ok(cuckoo_mut(data)?.delete(item))
        })?
        .ok_or(Error::KeyNotFound)
    }

    /// CF.INFO
    pub fn cf_info(&mut self, key: &[u8]) -> Result<CuckooInfo> {
        let value = self.read_value(key, ObjectKind::CuckooFilter)?;
        value
            .and_then(|v| v.as_cuckoo())
            .map(|cf| cf.info())
            .ok_or(Error::KeyNotFound)
    }
}
