//! TRIAD: exact attitude from two vector observations.
//!
//! Only the two highest-weight pairs are used (ties keep input order); the first
//! of them is trusted fully and the second only fixes the rotation about it.

use nalgebra::{Matrix3, Rotation3};

use super::{validate, VectorPair, COLLINEAR_EPSILON};
use crate::error::{Result, StarTrackerError};
use crate::{Quaternion, Vector3};

pub fn estimate(pairs: &[VectorPair]) -> Result<Quaternion> {
    validate(pairs)?;

    let mut order: Vec<usize> = (0..pairs.len()).collect();
    // stable sort: equal weights keep their input order
    order.sort_by(|&a, &b| pairs[b].weight.total_cmp(&pairs[a].weight));
    let first = &pairs[order[0]];
    let second = &pairs[order[1]];

    let m_camera = frame(&first.camera, &second.camera)?;
    let m_spatial = frame(&first.spatial, &second.spatial)?;
    let rot = m_camera * m_spatial.transpose();
    Ok(Quaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rot)))
}

/// Orthonormal triad `[v1, n, v1 × n]` with `n = normalize(v1 × v2)`, as columns.
fn frame(v1: &Vector3, v2: &Vector3) -> Result<Matrix3<f64>> {
    let v1 = v1.normalize();
    let cross = v1.cross(&v2.normalize());
    if cross.norm() < COLLINEAR_EPSILON {
        return Err(StarTrackerError::degenerate("TRIAD vectors are collinear"));
    }
    let n = cross.normalize();
    Ok(Matrix3::from_columns(&[v1, n, v1.cross(&n)]))
}
