use std::f64::consts::TAU;

use crate::Vector3;

/// A catalog star: a fixed direction on the celestial sphere plus brightness and name.
///
/// The direction is expressed in the spatial (inertial) frame: x toward RA 0 on the
/// equator, z toward the north celestial pole.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogStar {
    /// Unit vector in the spatial frame.
    pub spatial: Vector3,
    /// Magnitude in hundredths (lower is brighter).
    pub magnitude: i32,
    /// External catalog identifier, e.g. a Hipparcos or BSC number.
    pub name: u32,
}

impl CatalogStar {
    /// Create a star; `spatial` is normalized.
    pub fn new(spatial: Vector3, magnitude: i32, name: u32) -> Self {
        Self {
            spatial: normalize_or_fallback(spatial),
            magnitude,
            name,
        }
    }

    pub fn from_radec(ra_rad: f64, dec_rad: f64, magnitude: i32, name: u32) -> Self {
        Self {
            spatial: radec_to_uvec(ra_rad, dec_rad),
            magnitude,
            name,
        }
    }

    /// Unit vector pointing to the star's position on the celestial sphere.
    pub fn uvec(&self) -> Vector3 {
        self.spatial
    }

    /// Right ascension and declination in radians, RA wrapped to `[0, 2π)`.
    pub fn radec(&self) -> (f64, f64) {
        uvec_to_radec(&self.spatial)
    }
}

/// Assignment of a detected star (by index into the centroid list) to a catalog star.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarIdentifier {
    pub star_index: usize,
    pub catalog_index: usize,
    /// Vote count or other confidence measure; larger is better.
    pub weight: i32,
}

impl StarIdentifier {
    pub fn new(star_index: usize, catalog_index: usize, weight: i32) -> Self {
        Self {
            star_index,
            catalog_index,
            weight,
        }
    }
}

pub fn radec_to_uvec(ra_rad: f64, dec_rad: f64) -> Vector3 {
    // fast cosine, sine at once:
    let (sin_ra, cos_ra) = ra_rad.sin_cos();
    let (sin_dec, cos_dec) = dec_rad.sin_cos();
    Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
}

pub fn uvec_to_radec(v: &Vector3) -> (f64, f64) {
    let ra = v.y.atan2(v.x).rem_euclid(TAU);
    let dec = v.z.clamp(-1.0, 1.0).asin();
    (ra, dec)
}

/// Angle in radians between two unit vectors.
pub fn angle_between(a: &Vector3, b: &Vector3) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos()
}

pub(crate) fn normalize_or_fallback(v: Vector3) -> Vector3 {
    let n = v.norm();
    if n > 0.0 {
        v / n
    } else {
        Vector3::new(1.0, 0.0, 0.0)
    }
}
