//! Davenport's q-method: the optimal quaternion is the eigenvector of the 4×4
//! Davenport matrix `K` belonging to its largest eigenvalue.

use nalgebra::{Matrix3, Matrix4};

use super::{attitude_profile, from_scalar_last, profile_z, validate, VectorPair};
use crate::error::{Result, StarTrackerError};
use crate::{Quaternion, Vector3};

/// `K = [[S − σI, z], [zᵀ, σ]]` for scalar-last quaternions.
pub(crate) fn davenport_matrix(pairs: &[VectorPair]) -> Matrix4<f64> {
    let b = attitude_profile(pairs);
    let s = b + b.transpose();
    let sigma = b.trace();
    let z = profile_z(&b);

    let mut k = Matrix4::zeros();
    k.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&(s - Matrix3::identity() * sigma));
    k.fixed_view_mut::<3, 1>(0, 3).copy_from(&z);
    k.fixed_view_mut::<1, 3>(3, 0).copy_from(&z.transpose());
    k[(3, 3)] = sigma;
    k
}

pub fn estimate(pairs: &[VectorPair]) -> Result<Quaternion> {
    validate(pairs)?;
    let eigen = davenport_matrix(pairs).symmetric_eigen();
    let (best, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .ok_or_else(|| StarTrackerError::degenerate("no eigenvalues"))?;
    let v = eigen.eigenvectors.column(best);
    if !v.iter().all(|c| c.is_finite()) || v.norm() == 0.0 {
        return Err(StarTrackerError::degenerate("Davenport eigenvector is not finite"));
    }
    Ok(from_scalar_last(&Vector3::new(v[0], v[1], v[2]), v[3]))
}
