//! Count-Min Sketch
//!
//! A probabilistic data structure for estimating the frequency of elements
//! in a data stream. Uses sub-linear space with bounded error guarantees:
//! estimates never undercount.
//!
//! Counters live in one flat `depth * width` array; row `d` hashes items with
//! MurmurHash64A seeded by `d`.

use super::bloomfilter::murmurhash64a;
use crate::error::{Error, Result};

/// Upper bound on `width * depth` counters (2 GiB of u64 counters)
pub const MAX_COUNTERS: u64 = 1 << 28;

/// Dimensions for CMS.INITBYPROB: width = ceil(e / error), depth = ceil(ln(1 / probability))
pub fn dims_from_error_prob(error_rate: f64, probability: f64) -> Result<(usize, usize)> {
    if !(error_rate > 0.0 && error_rate < 1.0) {
        return Err(Error::InvalidParameter("CMS: invalid overestimation value"));
    }
    if !(probability > 0.0 && probability < 1.0) {
        return Err(Error::InvalidParameter("CMS: invalid prob value"));
    }
    let width = (std::f64::consts::E / error_rate).ceil() as u64;
    let depth = (1.0 / probability).ln().ceil() as u64;
    validate_dims(width.max(1), depth.max(1))?;
    Ok((width.max(1) as usize, depth.max(1) as usize))
}

/// Check CMS.INITBYDIM dimensions
pub fn validate_dims(width: u64, depth: u64) -> Result<()> {
    if width == 0 {
        return Err(Error::InvalidParameter("CMS: invalid width"));
    }
    if depth == 0 {
        return Err(Error::InvalidParameter("CMS: invalid depth"));
    }
    match width.checked_mul(depth) {
        Some(n) if n <= MAX_COUNTERS => Ok(()),
        _ => Err(Error::InvalidParameter("CMS: width * depth is too large")),
    }
}

/// CMS.INFO output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CMSInfo {
    pub width: usize,
    pub depth: usize,
    pub count: u64,
}

/// Count-Min Sketch with fixed dimensions
#[derive(Debug, Clone)]
pub struct CountMinSketch {
    width: usize,
    depth: usize,
    /// Row-major `depth x width` counters
    counters: Vec<u64>,
    /// Sum of all increments, saturating
    total_count: u64,
}

impl CountMinSketch {
    /// Bytes the counter matrix of a `width x depth` sketch allocates
    #[inline]
    pub fn projected_size(width: usize, depth: usize) -> usize {
        width.max(1) * depth.max(1) * std::mem::size_of::<u64>()
    }

    /// Create a sketch from already validated dimensions
    pub fn new(width: usize, depth: usize) -> Self {
        let width = width.max(1);
        let depth = depth.max(1);
        Self {
            width,
            depth,
            counters: vec![0u64; width * depth],
            total_count: 0,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Counter position of `item` in row `d`
    #[inline]
    fn slot(&self, item: &[u8], d: usize) -> usize {
        let h = murmurhash64a(item, d as u64);
        d * self.width + (h % self.width as u64) as usize
    }

    /// Add `increment` to the item's counter in every row.
    /// Returns the new estimate.
    pub fn incrby(&mut self, item: &[u8], increment: u64) -> u64 {
        self.total_count = self.total_count.saturating_add(increment);

        let mut min_count = u64::MAX;
        for d in 0..self.depth {
            let idx = self.slot(item, d);
            let counter = &mut self.counters[idx];
            *counter = counter.saturating_add(increment);
            min_count = min_count.min(*counter);
        }
        min_count
    }

    /// Minimum across the item's counters
    pub fn query(&self, item: &[u8]) -> u64 {
        (0..self.depth)
            .map(|d| self.counters[self.slot(item, d)])
            .min()
            .unwrap_or(0)
    }

    #[inline]
    pub fn same_dims(&self, other: &CountMinSketch) -> bool {
        self.width == other.width && self.depth == other.depth
    }

    /// Fold `other * weight` into this sketch. Dimensions must match.
    pub fn merge(&mut self, other: &CountMinSketch, weight: u64) -> Result<()> {
        if !self.same_dims(other) {
            return Err(Error::InvalidParameter("CMS: width/depth is not equal"));
        }
        for (dst, &src) in self.counters.iter_mut().zip(&other.counters) {
            *dst = dst.saturating_add(src.saturating_mul(weight));
        }
        self.total_count = self
            .total_count
            .saturating_add(other.total_count.saturating_mul(weight));
        Ok(())
    }

    pub fn info(&self) -> CMSInfo {
        CMSInfo {
            width: self.width,
            depth: self.depth,
            count: self.total_count,
        }
    }

    /// Bytes owned by this sketch
    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>() + self.counters.len() * std::mem::size_of::<u64>()
    }
}
