//! Pair-distance database: every catalog star pair whose angular separation lies
//! in a configured window, sorted by separation and indexed with a k-vector.
//!
//! # Binary format
//!
//! ```text
//! u32 num_pairs | f32 min_distance | f32 max_distance | u32 num_bins
//! (num_bins + 1) × u32 k-vector offsets
//! num_pairs × (u16 index_a, u16 index_b)
//! ```

use tracing::{debug, info};

use crate::database::kvector::KVectorIndex;
use crate::error::{Result, StarTrackerError};
use crate::serialize::{ByteReader, ByteWriter};
use crate::star::angle_between;
use crate::Catalog;

/// Two catalog stars, `a < b`, stored as 16-bit catalog indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogPair {
    pub a: u16,
    pub b: u16,
}

impl CatalogPair {
    /// Returns the catalog index paired with `target`, or None if the pair doesn't involve it.
    pub fn partner_of(&self, target: usize) -> Option<usize> {
        if self.a as usize == target {
            Some(self.b as usize)
        } else if self.b as usize == target {
            Some(self.a as usize)
        } else {
            None
        }
    }

    pub fn distance(&self, catalog: &Catalog) -> f64 {
        angle_between(&catalog.uvec(self.a as usize), &catalog.uvec(self.b as usize))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairDistanceDatabase {
    index: KVectorIndex,
    pairs: Vec<CatalogPair>,
}

impl PairDistanceDatabase {
    /// Collect every pair with separation in `[min_distance, max_distance]` (radians).
    pub fn build(
        catalog: &Catalog,
        min_distance: f32,
        max_distance: f32,
        num_bins: u32,
    ) -> Result<Self> {
        if catalog.len() > u16::MAX as usize + 1 {
            return Err(StarTrackerError::degenerate(format!(
                "catalog has {} stars, pair indices are limited to 16 bits",
                catalog.len()
            )));
        }
        if !(min_distance >= 0.0 && min_distance < max_distance) {
            return Err(StarTrackerError::degenerate(format!(
                "invalid distance window [{}, {}]",
                min_distance, max_distance
            )));
        }

        let (lo, hi) = (min_distance as f64, max_distance as f64);
        let mut entries: Vec<(f64, CatalogPair)> = Vec::new();
        for i in 0..catalog.len() {
            let vi = catalog.uvec(i);
            for k in catalog.query_indices_from_uvec(vi, hi + 1e-6) {
                if k <= i {
                    continue;
                }
                let d = angle_between(&vi, &catalog.uvec(k));
                if d >= lo && d <= hi {
                    entries.push((
                        d,
                        CatalogPair {
                            a: i as u16,
                            b: k as u16,
                        },
                    ));
                }
            }
        }
        if entries.is_empty() {
            return Err(StarTrackerError::degenerate(
                "no catalog pairs fall inside the distance window",
            ));
        }

        entries.sort_by(|x, y| {
            x.0.total_cmp(&y.0)
                .then((x.1.a, x.1.b).cmp(&(y.1.a, y.1.b)))
        });
        let distances: Vec<f64> = entries.iter().map(|e| e.0).collect();
        let index = KVectorIndex::build(&distances, min_distance, max_distance, num_bins)?;
        let pairs: Vec<CatalogPair> = entries.into_iter().map(|e| e.1).collect();

        info!(
            "Built pair-distance database: {} stars, {} pairs in [{:.4}, {:.4}] rad, {} bins",
            catalog.len(),
            pairs.len(),
            min_distance,
            max_distance,
            num_bins
        );
        Ok(Self { index, pairs })
    }

    pub fn num_pairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn min_distance(&self) -> f64 {
        self.index.min() as f64
    }

    pub fn max_distance(&self) -> f64 {
        self.index.max() as f64
    }

    pub fn num_bins(&self) -> u32 {
        self.index.num_bins()
    }

    pub fn pairs(&self) -> &[CatalogPair] {
        &self.pairs
    }

    pub fn kvector(&self) -> &KVectorIndex {
        &self.index
    }

    /// Pairs whose separation may lie within `tolerance` of `target`.
    ///
    /// Never misses a true match; may include neighbours outside the window.
    pub fn query_liberal(&self, target: f64, tolerance: f64) -> &[CatalogPair] {
        self.query_range_liberal(target - tolerance, target + tolerance)
    }

    pub fn query_range_liberal(&self, lo: f64, hi: f64) -> &[CatalogPair] {
        &self.pairs[self.index.query_liberal(lo, hi)]
    }

    /// Pairs whose separation, recomputed from `catalog`, lies in `[lo, hi]`.
    ///
    /// `catalog` must be the one the database was built from.
    pub fn query_exact(&self, catalog: &Catalog, lo: f64, hi: f64) -> &[CatalogPair] {
        let mut slice = self.query_range_liberal(lo, hi);
        while let Some(first) = slice.first() {
            if first.distance(catalog) >= lo {
                break;
            }
            slice = &slice[1..];
        }
        while let Some(last) = slice.last() {
            if last.distance(catalog) <= hi {
                break;
            }
            slice = &slice[..slice.len() - 1];
        }
        slice
    }

    /// Separations of every stored pair involving `star`. Debugging aid.
    pub fn star_distances(&self, star: usize, catalog: &Catalog) -> Vec<f64> {
        self.pairs
            .iter()
            .filter(|p| p.partner_of(star).is_some())
            .map(|p| p.distance(catalog))
            .collect()
    }

    /// Check that every pair refers to a star of `catalog`.
    pub fn validate_against(&self, catalog: &Catalog) -> Result<()> {
        let n = catalog.len();
        if let Some(p) = self
            .pairs
            .iter()
            .find(|p| p.a as usize >= n || p.b as usize >= n)
        {
            return Err(StarTrackerError::corrupt(format!(
                "pair ({}, {}) out of range for a {}-star catalog",
                p.a, p.b, n
            )));
        }
        Ok(())
    }

    pub fn serialize(&self, w: &mut ByteWriter) {
        self.index.serialize(w);
        for p in &self.pairs {
            w.put_u16(p.a);
            w.put_u16(p.b);
        }
    }

    pub fn deserialize(r: &mut ByteReader) -> Result<Self> {
        let index = KVectorIndex::deserialize(r)?;
        let n = index.num_values();
        r.ensure(n, 4)?;
        let mut pairs = Vec::with_capacity(n);
        for _ in 0..n {
            let a = r.u16()?;
            let b = r.u16()?;
            if a == b {
                return Err(StarTrackerError::corrupt(format!("pair joins star {} with itself", a)));
            }
            pairs.push(CatalogPair { a, b });
        }
        debug!("Loaded pair-distance database with {} pairs", n);
        Ok(Self { index, pairs })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(
            16 + 4 * (self.num_bins() as usize + 1) + 4 * self.num_pairs(),
        );
        self.serialize(&mut w);
        w.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::deserialize(&mut ByteReader::new(bytes))
    }
}

/// Forward cursor over a pair slice yielding the partner of every pair that involves one star.
///
/// Finite and restartable: [`InvolvingIter::restart`] rewinds to the start of the slice.
#[derive(Debug, Clone)]
pub struct InvolvingIter<'a> {
    pairs: &'a [CatalogPair],
    star: usize,
    pos: usize,
}

impl<'a> InvolvingIter<'a> {
    pub fn new(pairs: &'a [CatalogPair], star: usize) -> Self {
        Self {
            pairs,
            star,
            pos: 0,
        }
    }

    pub fn restart(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for InvolvingIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.pos < self.pairs.len() {
            let pair = self.pairs[self.pos];
            self.pos += 1;
            if let Some(partner) = pair.partner_of(self.star) {
                return Some(partner);
            }
        }
        None
    }
}

/// Partners of `star` among `pairs`.
pub fn involving(pairs: &[CatalogPair], star: usize) -> InvolvingIter<'_> {
    InvolvingIter::new(pairs, star)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CatalogStar, Vector3};

    fn orthogonal_catalog() -> Catalog {
        Catalog::new(vec![
            CatalogStar::new(Vector3::new(1.0, 0.0, 0.0), 100, 1),
            CatalogStar::new(Vector3::new(0.0, 1.0, 0.0), 200, 2),
            CatalogStar::new(Vector3::new(0.0, 0.0, 1.0), 300, 3),
        ])
    }

    fn three_star_catalog() -> Catalog {
        let d = |x: f64| x.to_radians();
        Catalog::new(vec![
            CatalogStar::from_radec(d(2.0), d(-3.0), 0, 1),
            CatalogStar::from_radec(d(4.0), d(7.0), 0, 2),
            CatalogStar::from_radec(d(2.0), d(6.0), 0, 3),
        ])
    }

    #[test]
    fn orthogonal_stars_query_returns_all_pairs() {
        let catalog = orthogonal_catalog();
        let db = PairDistanceDatabase::build(
            &catalog,
            80.0_f32.to_radians(),
            100.0_f32.to_radians(),
            4,
        )
        .unwrap();
        assert_eq!(db.num_pairs(), 3);
        let hits = db.query_liberal(90.0_f64.to_radians(), 1.0_f64.to_radians());
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn pairs_sorted_and_within_window() {
        let catalog = three_star_catalog();
        let db = PairDistanceDatabase::build(&catalog, 0.0, 0.2, 10).unwrap();
        assert_eq!(db.num_pairs(), 3);
        let dists: Vec<f64> = db.pairs().iter().map(|p| p.distance(&catalog)).collect();
        assert!(dists.windows(2).all(|w| w[0] <= w[1]));
        let expected = [0.038825754, 0.15707963, 0.177976474];
        for (got, want) in dists.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "distance {} != {}", got, want);
        }
        for p in db.pairs() {
            assert!(p.a < p.b);
        }
    }

    #[test]
    fn exact_query_trims_liberal_result() {
        let catalog = three_star_catalog();
        let db = PairDistanceDatabase::build(&catalog, 0.0, 0.2, 2).unwrap();
        // Coarse bins: the liberal query returns neighbours too.
        assert_eq!(db.query_liberal(0.15707963, 0.001).len(), 3);
        let exact = db.query_exact(&catalog, 0.15707963 - 0.001, 0.15707963 + 0.001);
        assert_eq!(exact.len(), 1);
        assert!((exact[0].distance(&catalog) - 0.15707963).abs() < 1e-6);

        assert!(db.query_exact(&catalog, 0.1, 0.12).is_empty());
        assert_eq!(db.query_exact(&catalog, 0.0, 0.2).len(), 3);
    }

    #[test]
    fn window_excludes_far_pairs() {
        let catalog = three_star_catalog();
        let db = PairDistanceDatabase::build(&catalog, 0.1, 0.2, 5).unwrap();
        assert_eq!(db.num_pairs(), 2);
        assert!(db.query_liberal(0.5, 0.01).is_empty());
        assert!(db.query_liberal(0.01, 0.01).is_empty());
    }

    #[test]
    fn empty_window_is_degenerate() {
        let catalog = orthogonal_catalog();
        let err = PairDistanceDatabase::build(&catalog, 0.0, 0.1, 4).unwrap_err();
        assert!(matches!(err, StarTrackerError::DegenerateInput(_)));
        assert!(PairDistanceDatabase::build(&catalog, 0.0, 2.0, 0).is_err());
        assert!(PairDistanceDatabase::build(&catalog, 1.0, 0.5, 4).is_err());
    }

    #[test]
    fn involving_iterator_yields_partners_and_restarts() {
        let catalog = orthogonal_catalog();
        let db = PairDistanceDatabase::build(&catalog, 1.0, 2.0, 3).unwrap();
        let mut it = involving(db.pairs(), 1);
        let mut first: Vec<usize> = it.by_ref().collect();
        first.sort_unstable();
        assert_eq!(first, vec![0, 2]);
        assert_eq!(it.next(), None);
        it.restart();
        assert_eq!(it.count(), 2);
        assert_eq!(involving(db.pairs(), 7).count(), 0);
    }

    #[test]
    fn star_distances_lists_involved_pairs() {
        let catalog = three_star_catalog();
        let db = PairDistanceDatabase::build(&catalog, 0.0, 0.2, 10).unwrap();
        let mut d = db.star_distances(2, &catalog);
        d.sort_by(f64::total_cmp);
        assert_eq!(d.len(), 2);
        assert!((d[0] - 0.038825754).abs() < 1e-6);
        assert!((d[1] - 0.15707963).abs() < 1e-6);
    }

    #[test]
    fn bytes_roundtrip_and_truncation() {
        let catalog = three_star_catalog();
        let db = PairDistanceDatabase::build(&catalog, 0.0, 0.2, 10).unwrap();
        let bytes = db.to_bytes();
        assert_eq!(bytes.len(), 16 + 11 * 4 + 3 * 4);
        let back = PairDistanceDatabase::from_bytes(&bytes).unwrap();
        assert_eq!(back, db);
        assert_eq!(back.to_bytes(), bytes);
        back.validate_against(&catalog).unwrap();

        for cut in [0, 10, 16, 40, bytes.len() - 1] {
            assert!(matches!(
                PairDistanceDatabase::from_bytes(&bytes[..cut]),
                Err(StarTrackerError::CorruptData(_))
            ));
        }

        let small = Catalog::new(catalog.stars()[..2].to_vec());
        assert!(back.validate_against(&small).is_err());
    }
}
