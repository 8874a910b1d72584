//! Star catalog with a spatial index for fast cone (angular-radius) searches.
//!
//! `Catalog` stores stars in a custom HEALPix-style spherical binning:
//! latitude is partitioned into `3 * nside` bins in `z = sin(dec)`, and
//! longitude into `4 * nside` bins in right ascension, for a total of
//! `12 * nside^2` cells. Each cell maps to a compact slice of star indices.
//!
//! Star order is significant: catalog indices are what the pair-distance
//! database and [`StarIdentifier`](crate::StarIdentifier) refer to.
//!
//! # Binary format
//!
//! ```text
//! u32 star count | u8 flags (bit0 magnitude, bit1 name)
//! per star: f32 x, f32 y, f32 z [, i32 magnitude] [, u32 name]
//! ```

use std::f64::consts::{PI, TAU};

use tracing::debug;

use crate::error::{Result, StarTrackerError};
use crate::serialize::{ByteReader, ByteWriter};
use crate::star::normalize_or_fallback;
use crate::{CatalogStar, Vector3};

const FLAG_MAGNITUDE: u8 = 0b01;
const FLAG_NAME: u8 = 0b10;

/// Default index resolution: 768 cells, a few degrees each.
pub const DEFAULT_NSIDE: u32 = 8;

#[derive(Debug, Clone)]
pub struct Catalog {
    nside: u32,
    n_lat: u32,
    n_lon: u32,
    stars: Vec<CatalogStar>,
    cell_offsets: Vec<u32>,
    star_indices: Vec<u32>,
}

impl Catalog {
    /// Build a catalog and spatial index with the default resolution.
    pub fn new(stars: Vec<CatalogStar>) -> Self {
        Self::with_nside(DEFAULT_NSIDE, stars)
    }

    /// Build a catalog and spatial index from owned stars.
    ///
    /// `nside` controls resolution; zero is treated as one.
    /// The number of sky cells is `12 * nside^2`.
    pub fn with_nside(nside: u32, stars: Vec<CatalogStar>) -> Self {
        let nside = nside.max(1);
        let n_lat = 3 * nside;
        let n_lon = 4 * nside;
        let n_cells = (n_lat * n_lon) as usize;

        let mut bins: Vec<Vec<u32>> = vec![Vec::new(); n_cells];
        for (star_idx, star) in stars.iter().enumerate() {
            let cell = Self::cell_for_uvec(n_lat, n_lon, &star.spatial);
            bins[cell as usize].push(star_idx as u32);
        }

        let mut cell_offsets = Vec::with_capacity(n_cells + 1);
        let mut star_indices = Vec::with_capacity(stars.len());
        cell_offsets.push(0);
        for cell_bin in bins {
            star_indices.extend(cell_bin);
            cell_offsets.push(star_indices.len() as u32);
        }

        Self {
            nside,
            n_lat,
            n_lon,
            stars,
            cell_offsets,
            star_indices,
        }
    }

    pub fn nside(&self) -> u32 {
        self.nside
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    pub fn stars(&self) -> &[CatalogStar] {
        &self.stars
    }

    pub fn get(&self, index: usize) -> Option<&CatalogStar> {
        self.stars.get(index)
    }

    /// Spatial unit vector of the star at `index`.
    ///
    /// Panics if `index` is out of range; indices handed out by the database
    /// built from this catalog are always valid.
    pub fn uvec(&self, index: usize) -> Vector3 {
        self.stars[index].spatial
    }

    /// Index of the first star with the given external name.
    pub fn find_by_name(&self, name: u32) -> Option<usize> {
        self.stars.iter().position(|s| s.name == name)
    }

    /// Query stars around a (possibly non-unit) direction vector.
    ///
    /// `dir` is normalized internally; `radius_rad` is clamped to `[0, π]`.
    /// Returns sorted indices into the catalog.
    pub fn query_indices_from_uvec(&self, dir: Vector3, radius_rad: f64) -> Vec<usize> {
        if self.is_empty() {
            return Vec::new();
        }
        let radius = radius_rad.clamp(0.0, PI);
        let dir = normalize_or_fallback(dir);
        let cos_radius = radius.cos();

        let z_step = 2.0 / self.n_lat as f64;
        let lon_step = TAU / self.n_lon as f64;

        let dec_center = dir.z.clamp(-1.0, 1.0).asin();
        let z_min = (dec_center - radius).max(-PI / 2.0).sin();
        let z_max = (dec_center + radius).min(PI / 2.0).sin();

        let mut out = Vec::new();
        for lat_bin in Self::z_bin_range(self.n_lat, z_min, z_max) {
            // Widest longitude reach occurs at the band edge closest to a pole.
            let z_lo = -1.0 + lat_bin as f64 * z_step;
            let z_hi = z_lo + z_step;
            let z_edge = z_lo.abs().max(z_hi.abs()).min(1.0);
            let cos_dec = (1.0 - z_edge * z_edge).sqrt();

            let mut lon_half_span = if radius.sin() < cos_dec && radius < PI / 2.0 {
                (radius.sin() / cos_dec).asin()
            } else {
                PI
            };
            lon_half_span += lon_step;

            let phi = dir.y.atan2(dir.x).rem_euclid(TAU);
            let lon_min = phi - lon_half_span;
            let lon_max = phi + lon_half_span;

            if lon_max - lon_min >= TAU {
                for lon_bin in 0..self.n_lon {
                    self.collect_cell_matches(lat_bin, lon_bin, &dir, cos_radius, &mut out);
                }
                continue;
            }

            self.for_each_wrapped_lon_bin(lon_min, lon_max, |lon_bin| {
                self.collect_cell_matches(lat_bin, lon_bin, &dir, cos_radius, &mut out);
            });
        }

        out.sort_unstable();
        out.dedup();
        out
    }

    /// Reduce the catalog to stars usable for identification.
    ///
    /// 1. Drop stars fainter than `max_magnitude` (hundredths of a magnitude).
    /// 2. Drop *both* members of any pair closer than `min_separation_rad`, since
    ///    such pairs blur into one centroid.
    /// 3. Sort brightest first and keep at most `max_stars`.
    pub fn narrow(
        &self,
        max_magnitude: Option<i32>,
        max_stars: Option<usize>,
        min_separation_rad: Option<f64>,
    ) -> Catalog {
        let bright: Vec<CatalogStar> = self
            .stars
            .iter()
            .filter(|s| max_magnitude.is_none_or(|m| s.magnitude <= m))
            .cloned()
            .collect();
        let bright = Catalog::with_nside(self.nside, bright);

        let mut keep = vec![true; bright.len()];
        if let Some(min_sep) = min_separation_rad {
            for (i, star) in bright.stars.iter().enumerate() {
                for j in bright.query_indices_from_uvec(star.spatial, min_sep) {
                    if j != i {
                        keep[i] = false;
                        keep[j] = false;
                    }
                }
            }
        }

        let mut stars: Vec<CatalogStar> = bright
            .stars
            .into_iter()
            .zip(keep)
            .filter_map(|(s, k)| k.then_some(s))
            .collect();
        stars.sort_by_key(|s| s.magnitude);
        if let Some(n) = max_stars {
            stars.truncate(n);
        }
        debug!("Narrowed catalog from {} to {} stars", self.len(), stars.len());
        Catalog::with_nside(self.nside, stars)
    }

    pub fn serialize(&self, w: &mut ByteWriter, include_magnitude: bool, include_name: bool) {
        w.put_u32(self.stars.len() as u32);
        let mut flags = 0u8;
        if include_magnitude {
            flags |= FLAG_MAGNITUDE;
        }
        if include_name {
            flags |= FLAG_NAME;
        }
        w.put_u8(flags);
        for star in &self.stars {
            w.put_f32(star.spatial.x as f32);
            w.put_f32(star.spatial.y as f32);
            w.put_f32(star.spatial.z as f32);
            if include_magnitude {
                w.put_i32(star.magnitude);
            }
            if include_name {
                w.put_u32(star.name);
            }
        }
    }

    /// Read a catalog written by [`Catalog::serialize`].
    ///
    /// Missing magnitude or name fields are filled with zero.
    pub fn deserialize(r: &mut ByteReader) -> Result<Self> {
        let count = r.u32()? as usize;
        let flags = r.u8()?;
        if flags & !(FLAG_MAGNITUDE | FLAG_NAME) != 0 {
            return Err(StarTrackerError::corrupt(format!(
                "unknown catalog flags {:#04x}",
                flags
            )));
        }
        let has_mag = flags & FLAG_MAGNITUDE != 0;
        let has_name = flags & FLAG_NAME != 0;
        let star_size = 12 + if has_mag { 4 } else { 0 } + if has_name { 4 } else { 0 };
        r.ensure(count, star_size)?;

        let mut stars = Vec::with_capacity(count);
        for i in 0..count {
            let x = r.f32()? as f64;
            let y = r.f32()? as f64;
            let z = r.f32()? as f64;
            let spatial = Vector3::new(x, y, z);
            if !spatial.iter().all(|c| c.is_finite()) || spatial.norm() == 0.0 {
                return Err(StarTrackerError::corrupt(format!(
                    "star {} has an invalid direction",
                    i
                )));
            }
            let magnitude = if has_mag { r.i32()? } else { 0 };
            let name = if has_name { r.u32()? } else { 0 };
            // Stored values are used as-is so that re-serializing is byte-identical.
            stars.push(CatalogStar {
                spatial,
                magnitude,
                name,
            });
        }
        Ok(Catalog::new(stars))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(5 + self.len() * 20);
        self.serialize(&mut w, true, true);
        w.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::deserialize(&mut ByteReader::new(bytes))
    }

    fn collect_cell_matches(
        &self,
        lat_bin: u32,
        lon_bin: u32,
        dir: &Vector3,
        cos_radius: f64,
        out: &mut Vec<usize>,
    ) {
        let cell = (lat_bin * self.n_lon + lon_bin) as usize;
        let start = self.cell_offsets[cell] as usize;
        let end = self.cell_offsets[cell + 1] as usize;

        for flat_idx in start..end {
            let star_idx = self.star_indices[flat_idx] as usize;
            if dir.dot(&self.stars[star_idx].spatial) >= cos_radius {
                out.push(star_idx);
            }
        }
    }

    fn for_each_wrapped_lon_bin<F>(&self, lon_min: f64, lon_max: f64, mut f: F)
    where
        F: FnMut(u32),
    {
        let start_bin = Self::phi_to_lon_bin(self.n_lon, lon_min.rem_euclid(TAU));
        let end_bin = Self::phi_to_lon_bin(self.n_lon, lon_max.rem_euclid(TAU));

        if start_bin <= end_bin {
            for lon_bin in start_bin..=end_bin {
                f(lon_bin);
            }
            return;
        }

        for lon_bin in start_bin..self.n_lon {
            f(lon_bin);
        }
        for lon_bin in 0..=end_bin {
            f(lon_bin);
        }
    }

    fn z_bin_range(n_lat: u32, z_min: f64, z_max: f64) -> std::ops::RangeInclusive<u32> {
        Self::z_to_lat_bin(n_lat, z_min)..=Self::z_to_lat_bin(n_lat, z_max)
    }

    fn cell_for_uvec(n_lat: u32, n_lon: u32, v: &Vector3) -> u32 {
        let phi = v.y.atan2(v.x).rem_euclid(TAU);
        let lat_bin = Self::z_to_lat_bin(n_lat, v.z / v.norm().max(f64::MIN_POSITIVE));
        let lon_bin = Self::phi_to_lon_bin(n_lon, phi);
        lat_bin * n_lon + lon_bin
    }

    fn z_to_lat_bin(n_lat: u32, z: f64) -> u32 {
        let u = ((z.clamp(-1.0, 1.0) + 1.0) * 0.5).clamp(0.0, 1.0);
        ((u * n_lat as f64).floor() as u32).min(n_lat - 1)
    }

    fn phi_to_lon_bin(n_lon: u32, phi: f64) -> u32 {
        let u = (phi / TAU).clamp(0.0, 1.0 - f64::EPSILON);
        ((u * n_lon as f64).floor() as u32).min(n_lon - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::star::radec_to_uvec;

    fn deg2rad(d: f64) -> f64 {
        d.to_radians()
    }

    fn star(name: u32, ra_deg: f64, dec_deg: f64, magnitude: i32) -> CatalogStar {
        CatalogStar::from_radec(deg2rad(ra_deg), deg2rad(dec_deg), magnitude, name)
    }

    fn names(catalog: &Catalog, indices: &[usize]) -> Vec<u32> {
        let mut out: Vec<u32> = indices.iter().map(|&i| catalog.stars()[i].name).collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn cone_query_finds_nearby_stars() {
        let catalog = Catalog::with_nside(
            8,
            vec![star(1, 0.0, 0.0, 200), star(2, 2.0, 1.0, 250), star(3, 40.0, -10.0, 500)],
        );
        let hits = catalog.query_indices_from_uvec(radec_to_uvec(deg2rad(0.5), deg2rad(0.25)), deg2rad(3.0));
        assert_eq!(names(&catalog, &hits), vec![1, 2]);
    }

    #[test]
    fn cone_query_handles_ra_wraparound() {
        let catalog = Catalog::with_nside(
            8,
            vec![star(10, 359.0, 0.0, 300), star(11, 1.0, 0.0, 300), star(12, 180.0, 0.0, 300)],
        );
        let hits = catalog.query_indices_from_uvec(Vector3::new(1.0, 0.0, 0.0), deg2rad(3.0));
        assert_eq!(names(&catalog, &hits), vec![10, 11]);
    }

    #[test]
    fn cone_query_matches_brute_force() {
        let mut stars = Vec::new();
        let mut name = 0;
        for ra in (0..360).step_by(7) {
            for dec in (-85..=85).step_by(9) {
                stars.push(star(name, ra as f64, dec as f64, 100));
                name += 1;
            }
        }
        let catalog = Catalog::new(stars);
        for &(ra, dec, radius) in &[(120.0, 30.0, 10.0), (0.0, 88.0, 5.0), (200.0, -60.0, 100.0)] {
            let dir = radec_to_uvec(deg2rad(ra), deg2rad(dec));
            let hits = catalog.query_indices_from_uvec(dir, deg2rad(radius));
            let expected: Vec<usize> = (0..catalog.len())
                .filter(|&i| dir.dot(&catalog.uvec(i)) >= deg2rad(radius).cos())
                .collect();
            assert_eq!(hits, expected, "cone ({}, {}, {})", ra, dec, radius);
        }
    }

    #[test]
    fn narrow_applies_magnitude_separation_and_limit() {
        let catalog = Catalog::new(vec![
            star(1, 10.0, 0.0, 300),
            star(2, 10.05, 0.0, 100), // too close to 1
            star(3, 50.0, 10.0, 200),
            star(4, 90.0, 20.0, 700), // too faint
            star(5, 130.0, -20.0, 150),
            star(6, 170.0, 40.0, 400),
        ]);
        let narrowed = catalog.narrow(Some(600), Some(2), Some(deg2rad(0.5)));
        let got: Vec<u32> = narrowed.stars().iter().map(|s| s.name).collect();
        assert_eq!(got, vec![5, 3]);

        let all = catalog.narrow(None, None, None);
        assert_eq!(all.len(), 6);
        assert_eq!(all.stars()[0].name, 2);
    }

    #[test]
    fn find_by_name_returns_index() {
        let catalog = Catalog::new(vec![star(42, 0.0, 0.0, 0), star(7, 1.0, 1.0, 0)]);
        assert_eq!(catalog.find_by_name(7), Some(1));
        assert_eq!(catalog.find_by_name(8), None);
    }

    #[test]
    fn bytes_roundtrip_exactly() {
        let catalog = Catalog::new(vec![star(42, 12.3, -4.5, 321), star(7, 200.0, 60.0, -50)]);
        let bytes = catalog.to_bytes();
        assert_eq!(bytes.len(), 5 + 2 * 20);
        let loaded = Catalog::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.stars()[0].name, 42);
        assert_eq!(loaded.stars()[1].magnitude, -50);
        assert_eq!(loaded.to_bytes(), bytes);
    }

    #[test]
    fn truncated_bytes_are_corrupt() {
        let catalog = Catalog::new(vec![star(1, 0.0, 0.0, 0), star(2, 5.0, 5.0, 0)]);
        let bytes = catalog.to_bytes();
        for cut in [0, 3, 5, bytes.len() - 1] {
            assert!(matches!(
                Catalog::from_bytes(&bytes[..cut]),
                Err(StarTrackerError::CorruptData(_))
            ));
        }
        let mut bad_flags = bytes.clone();
        bad_flags[4] = 0x80;
        assert!(matches!(
            Catalog::from_bytes(&bad_flags),
            Err(StarTrackerError::CorruptData(_))
        ));
    }

    #[test]
    fn optional_fields_can_be_omitted() {
        let catalog = Catalog::new(vec![star(9, 30.0, 30.0, 120)]);
        let mut w = ByteWriter::new();
        catalog.serialize(&mut w, false, false);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 5 + 12);
        let loaded = Catalog::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.stars()[0].magnitude, 0);
        assert_eq!(loaded.stars()[0].name, 0);
    }
}
