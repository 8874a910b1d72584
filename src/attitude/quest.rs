//! QUEST: Newton-Raphson on the characteristic polynomial of the Davenport
//! matrix, followed by the closed-form optimal quaternion.
//!
//! With `Δ = det S`, `κ = tr adj S`, `a = σ² − κ`, `b = σ² + zᵀz`,
//! `c = Δ + zᵀSz` and `d = zᵀS²z`, the largest eigenvalue of `K` is the largest
//! root of
//!
//! ```text
//! f(λ) = (λ² − a)(λ² − b) − cλ + cσ − d
//! ```
//!
//! Newton iteration starts from `Σ wᵢ`, which is exact for noise-free data.

use nalgebra::Matrix3;
use tracing::debug;

use super::{attitude_profile, from_scalar_last, profile_z, validate, VectorPair};
use crate::error::{Result, StarTrackerError};
use crate::Quaternion;

#[derive(Debug, Clone, PartialEq)]
pub struct QuestConfig {
    /// Stop when the Newton step, relative to λ, is smaller than this. Default 1e-12.
    pub tolerance: f64,
    /// Give up with `NonConvergence` after this many steps. Default 20.
    pub max_iterations: usize,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 20,
        }
    }
}

pub fn estimate(pairs: &[VectorPair], config: &QuestConfig) -> Result<Quaternion> {
    validate(pairs)?;

    let b = attitude_profile(pairs);
    let s = b + b.transpose();
    let sigma = b.trace();
    let z = profile_z(&b);

    let delta = s.determinant();
    let kappa = adjugate_trace(&s);
    let a = sigma * sigma - kappa;
    let bb = sigma * sigma + z.dot(&z);
    let c = delta + z.dot(&(s * z));
    let d = z.dot(&(s * s * z));

    let lambda = newton(
        pairs.iter().map(|p| p.weight).sum(),
        |l| (l * l - a) * (l * l - bb) - c * l + c * sigma - d,
        |l| 4.0 * l * l * l - 2.0 * (a + bb) * l - c,
        config,
    )?;

    let alpha = lambda * lambda - sigma * sigma + kappa;
    let beta = lambda - sigma;
    let gamma = (lambda + sigma) * alpha - delta;
    let x = (Matrix3::identity() * alpha + s * beta + s * s) * z;

    let norm = (gamma * gamma + x.norm_squared()).sqrt();
    // (γ, x) scales like λ³; 180° rotations make it vanish
    if !(norm > 1e-9 * lambda.abs().powi(3).max(1.0)) {
        return Err(StarTrackerError::degenerate(
            "QUEST quaternion denominator is zero",
        ));
    }
    Ok(from_scalar_last(&(x / norm), gamma / norm))
}

fn newton(
    start: f64,
    f: impl Fn(f64) -> f64,
    df: impl Fn(f64) -> f64,
    config: &QuestConfig,
) -> Result<f64> {
    let mut lambda = start;
    for iteration in 1..=config.max_iterations {
        let slope = df(lambda);
        if slope == 0.0 || !slope.is_finite() {
            return Err(StarTrackerError::NonConvergence {
                iterations: iteration,
            });
        }
        let step = f(lambda) / slope;
        lambda -= step;
        if step.abs() < config.tolerance * lambda.abs().max(1.0) {
            debug!("QUEST converged after {} iterations, λ = {}", iteration, lambda);
            return Ok(lambda);
        }
    }
    Err(StarTrackerError::NonConvergence {
        iterations: config.max_iterations,
    })
}

/// Trace of the adjugate: sum of the principal 2×2 minors.
fn adjugate_trace(m: &Matrix3<f64>) -> f64 {
    m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)] + m[(0, 0)] * m[(2, 2)]
        - m[(0, 2)] * m[(2, 0)]
        + m[(0, 0)] * m[(1, 1)]
        - m[(0, 1)] * m[(1, 0)]
}
