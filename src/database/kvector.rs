//! K-vector range index over a sorted array of values.
//!
//! The value range `[min, max]` is split into `num_bins` equal-width bins.
//! `offsets[b]` holds the number of values that fall into bins below `b`, so
//! `offsets[0] == 0`, `offsets[num_bins] == len`, and the values of bin `b`
//! occupy `offsets[b]..offsets[b + 1]` of the sorted array.
//!
//! Range queries touch only two offsets and return a contiguous index range
//! that is a superset of the values inside the query window.

use std::ops::Range;

use crate::error::{Result, StarTrackerError};
use crate::serialize::{ByteReader, ByteWriter};

#[derive(Debug, Clone, PartialEq)]
pub struct KVectorIndex {
    min: f32,
    max: f32,
    num_bins: u32,
    offsets: Vec<u32>,
}

impl KVectorIndex {
    /// Build an index over `values`, which must be sorted ascending and lie in `[min, max]`.
    pub fn build(values: &[f64], min: f32, max: f32, num_bins: u32) -> Result<Self> {
        if num_bins == 0 {
            return Err(StarTrackerError::degenerate("k-vector needs at least one bin"));
        }
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(StarTrackerError::degenerate(format!(
                "invalid k-vector range [{}, {}]",
                min, max
            )));
        }
        if values.len() > u32::MAX as usize {
            return Err(StarTrackerError::degenerate("too many values for a k-vector"));
        }

        let mut index = Self {
            min,
            max,
            num_bins,
            offsets: Vec::with_capacity(num_bins as usize + 1),
        };

        // offsets[b] = first position whose bin is >= b
        let mut pos = 0usize;
        for b in 0..=num_bins as usize {
            while pos < values.len() && index.bin_for(values[pos]) < b {
                pos += 1;
            }
            index.offsets.push(pos as u32);
        }
        if let Some(last) = index.offsets.last_mut() {
            *last = values.len() as u32;
        }
        Ok(index)
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn num_bins(&self) -> u32 {
        self.num_bins
    }

    /// Number of indexed values.
    pub fn num_values(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0) as usize
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    fn bin_width(&self) -> f64 {
        (self.max as f64 - self.min as f64) / self.num_bins as f64
    }

    /// Bin containing `value`, clamped to `[0, num_bins - 1]`.
    fn bin_for(&self, value: f64) -> usize {
        let b = ((value - self.min as f64) / self.bin_width()).floor();
        if b <= 0.0 {
            0
        } else {
            (b as usize).min(self.num_bins as usize - 1)
        }
    }

    /// Index range covering every value in `[lo, hi]`, possibly with extra neighbours.
    ///
    /// One bin of slack is added on each side so that values computed with slightly
    /// different rounding than at build time are never missed.
    pub fn query_liberal(&self, lo: f64, hi: f64) -> Range<usize> {
        if !(lo <= hi) || hi < self.min as f64 || lo > self.max as f64 {
            return 0..0;
        }
        let lower_bin = self.bin_for(lo).saturating_sub(1);
        let upper_bin = (self.bin_for(hi) + 2).min(self.num_bins as usize);
        self.offsets[lower_bin] as usize..self.offsets[upper_bin] as usize
    }

    pub fn serialize(&self, w: &mut ByteWriter) {
        w.put_u32(self.num_values() as u32);
        w.put_f32(self.min);
        w.put_f32(self.max);
        w.put_u32(self.num_bins);
        for &o in &self.offsets {
            w.put_u32(o);
        }
    }

    /// Read an index written by [`KVectorIndex::serialize`], validating its invariants.
    pub fn deserialize(r: &mut ByteReader) -> Result<Self> {
        let num_values = r.u32()?;
        let min = r.f32()?;
        let max = r.f32()?;
        let num_bins = r.u32()?;
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(StarTrackerError::corrupt(format!(
                "k-vector range [{}, {}] is invalid",
                min, max
            )));
        }
        if num_bins == 0 {
            return Err(StarTrackerError::corrupt("k-vector has zero bins"));
        }
        let num_offsets = num_bins as usize + 1;
        r.ensure(num_offsets, 4)?;

        let mut offsets = Vec::with_capacity(num_offsets);
        for _ in 0..num_offsets {
            offsets.push(r.u32()?);
        }
        if offsets[0] != 0 {
            return Err(StarTrackerError::corrupt("k-vector does not start at zero"));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(StarTrackerError::corrupt("k-vector offsets decrease"));
        }
        if offsets[num_bins as usize] != num_values {
            return Err(StarTrackerError::corrupt(format!(
                "k-vector ends at {} but declares {} values",
                offsets[num_bins as usize], num_values
            )));
        }
        Ok(Self {
            min,
            max,
            num_bins,
            offsets,
        })
    }
}
