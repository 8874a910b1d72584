//! Attitude estimation: solve Wahba's problem for matched camera/catalog vectors.
//!
//! Every estimator returns the rotation that maps spatial (catalog) vectors into
//! the camera frame: `camera ≈ q * spatial`.
//!
//! The Davenport-Q and QUEST solvers share the attitude profile matrix
//! `B = Σ wᵢ bᵢ rᵢᵀ` (b = camera vector, r = spatial vector) and the derived
//! quantities `S = B + Bᵀ`, `σ = tr B` and `z = Σ wᵢ bᵢ × rᵢ`.

pub mod davenport;
pub mod quest;
pub mod triad;

use nalgebra::{Matrix3, Rotation3};
use tracing::debug;

use crate::error::{Result, StarTrackerError};
use crate::star::uvec_to_radec;
use crate::{Camera, Catalog, Centroid, Quaternion, StarIdentifier, Vector3};

pub use quest::QuestConfig;

/// Cross products shorter than this count as parallel vectors.
pub(crate) const COLLINEAR_EPSILON: f64 = 1e-10;

/// One observation: the same star seen in the camera frame and listed in the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorPair {
    pub camera: Vector3,
    pub spatial: Vector3,
    pub weight: f64,
}

impl VectorPair {
    pub fn new(camera: Vector3, spatial: Vector3) -> Self {
        Self {
            camera,
            spatial,
            weight: 1.0,
        }
    }

    pub fn weighted(camera: Vector3, spatial: Vector3, weight: f64) -> Self {
        Self {
            camera,
            spatial,
            weight,
        }
    }
}

/// Attitude estimation algorithm.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttitudeEstimator {
    /// Always returns the identity rotation.
    Dummy,
    Triad,
    #[default]
    DavenportQ,
    Quest(QuestConfig),
}

impl AttitudeEstimator {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dummy => "dummy",
            Self::Triad => "triad",
            Self::DavenportQ => "davenport-q",
            Self::Quest(_) => "quest",
        }
    }

    pub fn estimate(&self, pairs: &[VectorPair]) -> Result<Quaternion> {
        let q = match self {
            Self::Dummy => return Ok(Quaternion::identity()),
            Self::Triad => triad::estimate(pairs)?,
            Self::DavenportQ => davenport::estimate(pairs)?,
            Self::Quest(config) => quest::estimate(pairs, config)?,
        };
        debug!("{} attitude: {}", self.name(), q);
        Ok(q)
    }
}

/// Pair up identified centroids with their catalog directions, unit weight each.
///
/// Identifiers pointing outside `centroids` or `catalog` are skipped.
pub fn vector_pairs(
    centroids: &[Centroid],
    identifiers: &[StarIdentifier],
    camera: &Camera,
    catalog: &Catalog,
) -> Vec<VectorPair> {
    identifiers
        .iter()
        .filter_map(|id| {
            let centroid = centroids.get(id.star_index)?;
            let star = catalog.get(id.catalog_index)?;
            Some(VectorPair::new(camera.centroid_uvec(centroid), star.spatial))
        })
        .collect()
}

/// Reject inputs no estimator can use: too few pairs, bad numbers, or no baseline.
pub(crate) fn validate(pairs: &[VectorPair]) -> Result<()> {
    if pairs.len() < 2 {
        return Err(StarTrackerError::degenerate(format!(
            "attitude needs at least 2 vector pairs, got {}",
            pairs.len()
        )));
    }
    for (i, p) in pairs.iter().enumerate() {
        let finite = p.camera.iter().chain(p.spatial.iter()).all(|c| c.is_finite());
        if !finite || p.camera.norm() == 0.0 || p.spatial.norm() == 0.0 {
            return Err(StarTrackerError::degenerate(format!("vector pair {} is invalid", i)));
        }
        if !(p.weight > 0.0 && p.weight.is_finite()) {
            return Err(StarTrackerError::degenerate(format!(
                "vector pair {} has weight {}",
                i, p.weight
            )));
        }
    }
    let spans = |f: fn(&VectorPair) -> Vector3| {
        let first = f(&pairs[0]).normalize();
        pairs[1..]
            .iter()
            .any(|p| first.cross(&f(p).normalize()).norm() > COLLINEAR_EPSILON)
    };
    if !spans(|p| p.camera) || !spans(|p| p.spatial) {
        return Err(StarTrackerError::degenerate("all vectors are collinear"));
    }
    Ok(())
}

/// Attitude profile matrix `B = Σ w b rᵀ`.
pub(crate) fn attitude_profile(pairs: &[VectorPair]) -> Matrix3<f64> {
    pairs.iter().fold(Matrix3::zeros(), |acc, p| {
        acc + p.weight * p.camera.normalize() * p.spatial.normalize().transpose()
    })
}

/// `z` vector of the Davenport K matrix, `Σ w (b × r)`.
pub(crate) fn profile_z(b: &Matrix3<f64>) -> Vector3 {
    Vector3::new(b[(1, 2)] - b[(2, 1)], b[(2, 0)] - b[(0, 2)], b[(0, 1)] - b[(1, 0)])
}

/// Convert a scalar-last quaternion in the `A(q)` convention to a rotation quaternion.
///
/// `A(q) = (q₄² − |q⃗|²) I + 2 q⃗ q⃗ᵀ − 2 q₄ [q⃗×]`, which equals the Hamilton
/// rotation with the vector part negated.
pub(crate) fn from_scalar_last(qv: &Vector3, q4: f64) -> Quaternion {
    Quaternion::from_quaternion(nalgebra::Quaternion::new(q4, -qv.x, -qv.y, -qv.z))
}

/// Rotation angle in radians between two attitudes.
pub fn attitude_error(expected: &Quaternion, actual: &Quaternion) -> f64 {
    (expected.inverse() * actual).angle()
}

/// Boresight right ascension, declination and roll (radians) of an attitude.
///
/// Roll is zero when the camera +X axis points along `north × boresight`,
/// and grows as +X turns toward +Y.
pub fn to_spherical(q: &Quaternion) -> (f64, f64, f64) {
    let inv = q.inverse();
    let boresight = inv * Vector3::z();
    let x_axis = inv * Vector3::x();
    let (ra, dec) = uvec_to_radec(&boresight);
    let (base_x, base_y) = reference_axes(&boresight);
    let roll = x_axis.dot(&base_y).atan2(x_axis.dot(&base_x));
    (ra, dec, roll.rem_euclid(std::f64::consts::TAU))
}

/// Attitude pointing the boresight at `(ra, dec)` with the given roll (radians).
pub fn from_spherical(ra: f64, dec: f64, roll: f64) -> Quaternion {
    let boresight = crate::star::radec_to_uvec(ra, dec);
    let (base_x, base_y) = reference_axes(&boresight);
    let (s, c) = roll.sin_cos();
    let x = c * base_x + s * base_y;
    let y = boresight.cross(&x);
    // rows are the camera axes expressed in the spatial frame
    let rot = Matrix3::from_rows(&[x.transpose(), y.transpose(), boresight.transpose()]);
    Quaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot))
}

/// Zero-roll camera x and y axes for a boresight; x follows `north × boresight`.
fn reference_axes(boresight: &Vector3) -> (Vector3, Vector3) {
    let north = Vector3::z();
    let east = north.cross(boresight);
    let x = if east.norm() > COLLINEAR_EPSILON {
        east.normalize()
    } else {
        // boresight at a pole: any perpendicular will do
        Vector3::y()
    };
    (x, boresight.cross(&x))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nalgebra::Unit;

    /// A non-trivial rotation and a spread of spatial vectors observed through it.
    pub(crate) fn observed(noise_free_q: &Quaternion) -> Vec<VectorPair> {
        let spatial = [
            Vector3::new(1.0, 0.2, 0.1),
            Vector3::new(0.3, 1.0, -0.2),
            Vector3::new(-0.4, 0.1, 1.0),
            Vector3::new(0.5, -0.6, 0.4),
            Vector3::new(0.9, 0.9, 0.2),
        ];
        spatial
            .iter()
            .map(|s| {
                let s = s.normalize();
                VectorPair::new(noise_free_q * s, s)
            })
            .collect()
    }

    pub(crate) fn test_rotation() -> Quaternion {
        Quaternion::from_axis_angle(&Unit::new_normalize(Vector3::new(0.3, -0.5, 0.8)), 1.1)
    }

    pub(crate) fn assert_same_attitude(a: &Quaternion, b: &Quaternion) {
        let dot = a.coords.dot(&b.coords).abs();
        assert!(dot >= 1.0 - 1e-6, "attitudes differ: {} vs {} (|dot| = {})", a, b, dot);
    }

    #[test]
    fn all_estimators_recover_rotation() {
        let q = test_rotation();
        let pairs = observed(&q);
        for est in [
            AttitudeEstimator::Triad,
            AttitudeEstimator::DavenportQ,
            AttitudeEstimator::Quest(QuestConfig::default()),
        ] {
            let got = est.estimate(&pairs).unwrap();
            assert_same_attitude(&got, &q);
        }
    }

    #[test]
    fn dummy_is_identity() {
        let q = AttitudeEstimator::Dummy.estimate(&[]).unwrap();
        assert_eq!(q, Quaternion::identity());
    }

    #[test]
    fn quarter_turn_about_z() {
        // camera = Rz(90°) * spatial
        let pairs = vec![
            VectorPair::new(Vector3::new(0.0, 1.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
            VectorPair::new(Vector3::new(-1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0)),
            VectorPair::new(Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.0, 0.0, 1.0)),
        ];
        let expected = Quaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        for est in [
            AttitudeEstimator::Triad,
            AttitudeEstimator::DavenportQ,
            AttitudeEstimator::Quest(QuestConfig::default()),
        ] {
            assert_same_attitude(&est.estimate(&pairs).unwrap(), &expected);
        }
    }

    #[test]
    fn too_few_pairs_is_degenerate() {
        let one = vec![VectorPair::new(Vector3::x(), Vector3::y())];
        for est in [
            AttitudeEstimator::Triad,
            AttitudeEstimator::DavenportQ,
            AttitudeEstimator::Quest(QuestConfig::default()),
        ] {
            assert!(matches!(est.estimate(&one), Err(StarTrackerError::DegenerateInput(_))));
            assert!(matches!(est.estimate(&[]), Err(StarTrackerError::DegenerateInput(_))));
        }
    }

    #[test]
    fn collinear_vectors_are_degenerate() {
        let pairs = vec![
            VectorPair::new(Vector3::x(), Vector3::y()),
            VectorPair::new(-Vector3::x(), -Vector3::y()),
            VectorPair::new(Vector3::x() * 2.0, Vector3::y()),
        ];
        assert!(matches!(validate(&pairs), Err(StarTrackerError::DegenerateInput(_))));
    }

    #[test]
    fn invalid_weights_are_degenerate() {
        let mut pairs = observed(&test_rotation());
        pairs[1].weight = 0.0;
        assert!(validate(&pairs).is_err());
        pairs[1].weight = f64::NAN;
        assert!(validate(&pairs).is_err());
        pairs[1].weight = 2.0;
        assert!(validate(&pairs).is_ok());
    }

    #[test]
    fn spherical_roundtrip() {
        for &(ra, dec, roll) in &[(0.3, 0.2, 0.0), (4.0, -1.0, 2.5), (1.0, 0.0, 6.0)] {
            let q = from_spherical(ra, dec, roll);
            let (ra2, dec2, roll2) = to_spherical(&q);
            assert!(
                (ra - ra2).abs() < 1e-9 && (dec - dec2).abs() < 1e-9 && (roll - roll2).abs() < 1e-9,
                "spherical roundtrip ({}, {}, {}) -> ({}, {}, {})",
                ra,
                dec,
                roll,
                ra2,
                dec2,
                roll2
            );
            // boresight lands on +Z
            let b = q * crate::star::radec_to_uvec(ra, dec);
            assert!((b.z - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn attitude_error_measures_rotation_angle() {
        let a = test_rotation();
        let b = a * Quaternion::from_axis_angle(&Vector3::x_axis(), 0.01);
        assert!((attitude_error(&a, &b) - 0.01).abs() < 1e-12);
        assert!(attitude_error(&a, &a) < 1e-12);
    }

    #[test]
    fn vector_pairs_skip_bad_indices() {
        let camera = Camera::from_fov(20.0_f64.to_radians(), 100, 100);
        let catalog = Catalog::new(vec![crate::CatalogStar::new(Vector3::z(), 0, 1)]);
        let centroids = vec![Centroid::new(50.0, 50.0)];
        let ids = vec![
            StarIdentifier::new(0, 0, 1),
            StarIdentifier::new(1, 0, 1),
            StarIdentifier::new(0, 5, 1),
        ];
        let pairs = vector_pairs(&centroids, &ids, &camera, &catalog);
        assert_eq!(pairs.len(), 1);
        assert!((pairs[0].camera - Vector3::z()).norm() < 1e-12);
    }
}
