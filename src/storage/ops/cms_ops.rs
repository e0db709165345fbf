//! Count-Min Sketch operations
//!
//! CMS.INITBYDIM, CMS.INITBYPROB, CMS.INCRBY, CMS.QUERY, CMS.MERGE, CMS.INFO

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::storage::Store;
use crate::storage::cms::{CMSInfo, CountMinSketch, dims_from_error_prob, validate_dims};
use crate::storage::store::ensure_fits;
use crate::storage::types::{DataType, ObjectKind};

#[inline]
fn cms_mut(data: &mut DataType) -> Result<&mut CountMinSketch> {
    data.as_cms_mut().ok_or(Error::WrongType)
}

impl Store {
    fn cms_create(&mut self, key: &[u8], width: usize, depth: usize) -> Result<()> {
        self.ensure_absent(key)?;
        ensure_fits(&self.config, CountMinSketch::projected_size(width, depth))?;
        self.check_oom()?;
        self.insert_entry(
            Bytes::copy_from_slice(key),
            DataType::CountMinSketch(Box::new(CountMinSketch::new(width, depth))),
        );
        Ok(())
    }

    /// CMS.INITBYDIM
    pub fn cms_initbydim(&mut self, key: &[u8], width: u64, depth: u64) -> Result<()> {
        validate_dims(width, depth)?;
        self.cms_create(key, width as usize, depth as usize)
    }

    /// CMS.INITBYPROB: width = ceil(e / error), depth = ceil(ln(1 / probability))
    pub fn cms_initbyprob(&mut self, key: &[u8], error_rate: f64, probability: f64) -> Result<()> {
        let (width, depth) = dims_from_error_prob(error_rate, probability)?;
        self.cms_create(key, width, depth)
    }

    /// CMS.INCRBY: returns each item's estimate after its increment. An
    /// absent key gets a sketch of the configured default dimensions.
    pub fn cms_incrby(&mut self, key: &[u8], increments: &[(Bytes, u64)]) -> Result<Vec<u64>> {
        self.check_oom()?;
        self.modify_or_create(
            key,
            ObjectKind::CountMinSketch,
            |config| {
                let (width, depth) = (config.cms_default_width, config.cms_default_depth);
                validate_dims(width as u64, depth as u64)?;
                Ok(DataType::CountMinSketch(Box::new(CountMinSketch::new(width, depth))))
            },
            |data, _| {
                let cms = cms_mut(data)?;
                Ok(increments
                    .iter()
                    .map(|(item, incr)| cms.incrby(item, *incr))
                    .collect())
            },
        )
    }

    /// CMS.QUERY: KeyNotFound for a missing key
    pub fn cms_query(&mut self, key: &[u8], items: &[Bytes]) -> Result<Vec<u64>> {
        let value = self.read_value(key, ObjectKind::CountMinSketch)?;
        let cms = value.and_then(|v| v.as_cms()).ok_or(Error::KeyNotFound)?;
        Ok(items.iter().map(|item| cms.query(item)).collect())
    }

    /// CMS.INFO
    pub fn cms_info(&mut self, key: &[u8]) -> Result<CMSInfo> {
        let value = self.read_value(key, ObjectKind::CountMinSketch)?;
        value
            .and_then(|v| v.as_cms())
            .map(|cms| cms.info())
            .ok_or(Error::KeyNotFound)
    }

    /// CMS.MERGE: `dest` becomes the weighted sum of `sources` (weight 1 when
    /// `weights` is None). Sources must exist and share dimensions. A missing
    /// destination is created with those dimensions; an existing one must
    /// match them.
    pub fn cms_merge(&mut self, dest: &[u8], sources: &[Bytes], weights: Option<&[u64]>) -> Result<()> {
        if sources.is_empty() {
            return Err(Error::InvalidParameter("CMS: invalid numkeys"));
        }
        if let Some(weights) = weights
            && weights.len() != sources.len()
        {
            return Err(Error::InvalidParameter("CMS: wrong number of weights"));
        }

        let mut merged: Option<CountMinSketch> = None;
        for (i, src) in sources.iter().enumerate() {
            let weight = weights.map_or(1, |w| w[i]);
            let value = self.read_value(src, ObjectKind::CountMinSketch)?;
            let cms = value.and_then(|v| v.as_cms()).ok_or(Error::KeyNotFound)?;
            let acc = merged.get_or_insert_with(|| CountMinSketch::new(cms.width(), cms.depth()));
            acc.merge(cms, weight)?;
        }
        let Some(merged) = merged else {
            return Err(Error::KeyNotFound);
        };

        self.check_oom()?;
        let (width, depth) = (merged.width(), merged.depth());
        self.modify_or_create(
            dest,
            ObjectKind::CountMinSketch,
            |_| Ok(DataType::CountMinSketch(Box::new(CountMinSketch::new(width, depth)))),
            |data, _| {
                let cms = cms_mut(data)?;
                if !cms.same_dims(&merged) {
                    return Err(Error::InvalidParameter("CMS: width/depth is not equal"));
                }
                *cms = merged;
                Ok(())
            },
        )
    }
}
