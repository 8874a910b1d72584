//! Pyramid star identification.
//!
//! A triangle of centroids plus a fourth verifying centroid must match exactly
//! one catalog pyramid: all six pairwise distances within tolerance and the same
//! handedness. Triangles are tried from the best-spread (least collinear)
//! downward. Once a pyramid is accepted the remaining centroids are identified
//! by voting with the four confirmed stars as anchors.
//!
//! Before touching the database each triangle's expected number of chance
//! matches is estimated analytically:
//!
//! ```text
//! E = n⁴ ε⁵ / (2π²) · sin(d_ij) / (sin θ_k · max(sin θ_i, sin θ_j, sin θ_k))
//! ```
//!
//! with `n` the assumed number of false stars, `ε` the tolerance and `θ` the
//! inner angles of the triangle. Triangles with `E` above the configured limit
//! are skipped.

use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use tracing::debug;

use super::{
    centroid_vectors, distance_matches, drop_duplicate_assignments, spectrality, strict_winner,
};
use crate::centroid::brightness_order;
use crate::database::pair_distance::{involving, PairDistanceDatabase};
use crate::error::{Result, StarTrackerError};
use crate::star::angle_between;
use crate::{Camera, Catalog, Centroid, StarIdentifier, Vector3};

/// Spreads at or below this are treated as collinear.
const MIN_SPREAD: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct PyramidConfig {
    /// Angular matching tolerance in radians. Default 0.05°.
    pub tolerance_rad: f64,
    /// Assumed number of false stars on the sky for the mismatch estimate. Default 1000.
    pub num_false_stars: u32,
    /// Skip triangles whose expected chance matches exceed this. Default 0.001.
    pub max_mismatch_probability: f64,
    /// Give up after querying this many pyramids. Default 1000.
    pub cutoff: usize,
    /// Only the brightest this many centroids form pyramids. Default 24.
    pub max_stars: usize,
    /// Votes needed to identify a remaining centroid from the anchors. Default 2.
    pub min_votes: i32,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            tolerance_rad: 0.05_f64.to_radians(),
            num_false_stars: 1000,
            max_mismatch_probability: 0.001,
            cutoff: 1000,
            max_stars: 24,
            min_votes: 2,
        }
    }
}

/// Sines of the inner angles at `a`, `b` and `c` of the plane triangle spanned by
/// the chords between them, as used by the mismatch estimate.
fn inner_sines(a: &Vector3, b: &Vector3, c: &Vector3) -> [f64; 3] {
    let sin_between = |u: Vector3, v: Vector3| {
        let denom = u.norm() * v.norm();
        if denom > 0.0 {
            u.cross(&v).norm() / denom
        } else {
            0.0
        }
    };
    [
        sin_between(b - a, c - a),
        sin_between(a - b, c - b),
        sin_between(a - c, b - c),
    ]
}

/// Smallest sine of the spherical inner angles: 0 for stars on one great
/// circle, largest for equilateral triangles.
///
/// The inner angle at a vertex is the angle between the great circles through
/// it and the other two stars.
pub fn spread(a: &Vector3, b: &Vector3, c: &Vector3) -> f64 {
    let sin_at = |v: &Vector3, p: &Vector3, q: &Vector3| {
        let (n1, n2) = (v.cross(p), v.cross(q));
        let denom = n1.norm() * n2.norm();
        if denom > 0.0 {
            n1.cross(&n2).norm() / denom
        } else {
            0.0
        }
    };
    sin_at(a, b, c).min(sin_at(b, a, c)).min(sin_at(c, a, b))
}

pub fn identify(
    centroids: &[Centroid],
    camera: &Camera,
    database: &PairDistanceDatabase,
    catalog: &Catalog,
    config: &PyramidConfig,
) -> Result<Vec<StarIdentifier>> {
    if centroids.len() < 4 {
        return Err(StarTrackerError::degenerate(format!(
            "pyramid needs at least 4 centroids, got {}",
            centroids.len()
        )));
    }
    let vectors = centroid_vectors(centroids, camera);
    let tol = config.tolerance_rad;
    let (lo, hi) = (database.min_distance() + tol, database.max_distance() - tol);
    let in_window = |a: usize, b: usize| {
        let d = angle_between(&vectors[a], &vectors[b]);
        d >= lo && d <= hi
    };

    let mut pool = brightness_order(centroids);
    pool.truncate(config.max_stars.max(4));

    let mut triangles: Vec<([usize; 3], f64)> = Vec::new();
    for x in 0..pool.len() {
        for y in x + 1..pool.len() {
            for z in y + 1..pool.len() {
                let (i, j, k) = (pool[x], pool[y], pool[z]);
                let s = spread(&vectors[i], &vectors[j], &vectors[k]);
                if s > MIN_SPREAD {
                    triangles.push(([i, j, k], s));
                }
            }
        }
    }
    triangles.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mismatch_constant = (config.num_false_stars as f64).powi(4) * tol.powi(5) / 2.0 / (PI * PI);
    let mut tried = 0usize;
    for &([i, j, k], tri_spread) in &triangles {
        if !(in_window(i, j) && in_window(i, k) && in_window(j, k)) {
            continue;
        }
        let [sin_i, sin_j, sin_k] = inner_sines(&vectors[i], &vectors[j], &vectors[k]);
        let expected_mismatches = mismatch_constant * angle_between(&vectors[i], &vectors[j]).sin()
            / sin_k
            / sin_i.max(sin_j).max(sin_k);
        if expected_mismatches > config.max_mismatch_probability {
            continue;
        }

        let mut fourths: Vec<(usize, f64)> = pool
            .iter()
            .copied()
            .filter(|&r| r != i && r != j && r != k)
            .filter(|&r| in_window(i, r) && in_window(j, r) && in_window(k, r))
            .map(|r| {
                let s = tri_spread
                    .min(spread(&vectors[i], &vectors[j], &vectors[r]))
                    .min(spread(&vectors[i], &vectors[k], &vectors[r]))
                    .min(spread(&vectors[j], &vectors[k], &vectors[r]));
                (r, s)
            })
            .collect();
        fourths.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (r, _) in fourths {
            tried += 1;
            if tried > config.cutoff {
                debug!("pyramid cutoff reached after {} pyramids", config.cutoff);
                return Err(StarTrackerError::NoMatch);
            }
            let quad = [i, j, k, r];
            let observed = quad.map(|n| vectors[n]);
            match match_pyramid(&observed, database, catalog, tol) {
                Ok(Some(matched)) => {
                    debug!(
                        "unique pyramid {:?} -> {:?}, expected mismatches {:.3e}",
                        quad, matched, expected_mismatches
                    );
                    let seeds = quad
                        .iter()
                        .zip(matched)
                        .map(|(&star, cat)| StarIdentifier::new(star, cat, 3))
                        .collect();
                    return Ok(extend(seeds, &vectors, database, catalog, config));
                }
                Ok(None) => {}
                Err(e) => debug!("pyramid {:?} skipped: {}", quad, e),
            }
        }
    }
    Err(StarTrackerError::NoMatch)
}

/// Catalog indices matching the observed pyramid `[i, j, k, r]`.
///
/// `Ok(None)` when nothing matches and `AmbiguousMatch` when more than one catalog
/// pyramid fits.
fn match_pyramid(
    observed: &[Vector3; 4],
    database: &PairDistanceDatabase,
    catalog: &Catalog,
    tol: f64,
) -> Result<Option<[usize; 4]>> {
    let [vi, vj, vk, vr] = observed;
    let ij = angle_between(vi, vj);
    let ik = angle_between(vi, vk);
    let ir = angle_between(vi, vr);
    let jk = angle_between(vj, vk);
    let jr = angle_between(vj, vr);
    let kr = angle_between(vk, vr);
    let handedness = spectrality(vi, vj, vk);

    let ij_pairs = database.query_exact(catalog, ij - tol, ij + tol);
    let ik_pairs = database.query_exact(catalog, ik - tol, ik + tol);
    let ir_pairs = database.query_exact(catalog, ir - tol, ir + tol);
    if ij_pairs.is_empty() || ik_pairs.is_empty() || ir_pairs.is_empty() {
        return Ok(None);
    }

    // partners of a candidate i star at the i-k and i-r distances
    let mut k_partners: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut r_partners: HashMap<usize, Vec<usize>> = HashMap::new();

    let mut found: Option<[usize; 4]> = None;
    for pair in ij_pairs {
        for (ic, jc) in [(pair.a as usize, pair.b as usize), (pair.b as usize, pair.a as usize)] {
            let ks = k_partners
                .entry(ic)
                .or_insert_with(|| involving(ik_pairs, ic).collect());
            if ks.is_empty() {
                continue;
            }
            let rs = r_partners
                .entry(ic)
                .or_insert_with(|| involving(ir_pairs, ic).collect());
            let (ci, cj) = (catalog.uvec(ic), catalog.uvec(jc));
            for &kc in ks.iter() {
                if kc == jc || spectrality(&ci, &cj, &catalog.uvec(kc)) != handedness {
                    continue;
                }
                if !distance_matches(catalog, jc, kc, jk, tol) {
                    continue;
                }
                for &rc in rs.iter() {
                    if rc == jc || rc == kc {
                        continue;
                    }
                    if !distance_matches(catalog, jc, rc, jr, tol)
                        || !distance_matches(catalog, kc, rc, kr, tol)
                    {
                        continue;
                    }
                    if found.is_some() {
                        return Err(StarTrackerError::AmbiguousMatch);
                    }
                    found = Some([ic, jc, kc, rc]);
                }
            }
        }
    }
    Ok(found)
}

/// Identify the remaining centroids by voting with identified stars as anchors.
///
/// Each anchor votes for every catalog star at the measured distance from its
/// own catalog star. Winners must be strict, reach `min_votes`, and have the
/// same handedness as the observation relative to their first two voters.
/// Winners of one round become anchors for the next until no more progress is
/// made. A catalog star won by several centroids, or by a centroid and an
/// anchor, leaves every claimant unidentified.
fn extend(
    seeds: Vec<StarIdentifier>,
    vectors: &[Vector3],
    database: &PairDistanceDatabase,
    catalog: &Catalog,
    config: &PyramidConfig,
) -> Vec<StarIdentifier> {
    let tol = config.tolerance_rad;
    let num_seeds = seeds.len();
    let mut ids = seeds;
    let mut contested: Vec<StarIdentifier> = Vec::new();
    let mut resolved: Vec<bool> = vec![false; vectors.len()];
    for id in &ids {
        resolved[id.star_index] = true;
    }

    loop {
        let mut winners: Vec<StarIdentifier> = Vec::new();
        for u in 0..vectors.len() {
            if resolved[u] {
                continue;
            }
            if let Some(id) = vote_for(u, &ids, vectors, database, catalog, tol, config.min_votes) {
                winners.push(id);
            }
        }
        if winners.is_empty() {
            break;
        }

        let mut claims: HashMap<usize, usize> = HashMap::new();
        for id in ids.iter().chain(&contested).chain(&winners) {
            *claims.entry(id.catalog_index).or_default() += 1;
        }
        for id in winners {
            resolved[id.star_index] = true;
            if claims[&id.catalog_index] > 1 {
                debug!(
                    "centroid {} unidentified: catalog star {} claimed more than once",
                    id.star_index, id.catalog_index
                );
                contested.push(id);
            } else {
                ids.push(id);
            }
        }
    }

    // anchors whose catalog star was also won by another centroid are dropped too
    ids.extend(contested);
    let ids = drop_duplicate_assignments(ids);
    debug!(
        "pyramid extension kept {} stars from {} seeds",
        ids.len(),
        num_seeds
    );
    ids
}

/// Strict-winner vote for centroid `u` from the identified `anchors`.
fn vote_for(
    u: usize,
    anchors: &[StarIdentifier],
    vectors: &[Vector3],
    database: &PairDistanceDatabase,
    catalog: &Catalog,
    tol: f64,
    min_votes: i32,
) -> Option<StarIdentifier> {
    let mut votes: HashMap<usize, i32> = HashMap::new();
    let mut voters: HashMap<usize, Vec<usize>> = HashMap::new();
    for (n, anchor) in anchors.iter().enumerate() {
        let d = angle_between(&vectors[u], &vectors[anchor.star_index]);
        let pairs = database.query_exact(catalog, d - tol, d + tol);
        let candidates: HashSet<usize> = involving(pairs, anchor.catalog_index).collect();
        for c in candidates {
            *votes.entry(c).or_default() += 1;
            voters.entry(c).or_default().push(n);
        }
    }
    let (c, count) = strict_winner(&votes, min_votes)?;
    if let [a, b, ..] = voters[&c].as_slice() {
        let (a, b) = (&anchors[*a], &anchors[*b]);
        let observed = vectors[a.star_index]
            .cross(&vectors[b.star_index])
            .dot(&vectors[u]);
        let expected = catalog
            .uvec(a.catalog_index)
            .cross(&catalog.uvec(b.catalog_index))
            .dot(&catalog.uvec(c));
        // near-coplanar anchors say nothing about handedness
        if observed.abs() > 1e-9 && expected.abs() > 1e-9 && (observed > 0.0) != (expected > 0.0) {
            debug!("centroid {} rejected: mirrored match to catalog star {}", u, c);
            return None;
        }
    }
    Some(StarIdentifier::new(u, c, count))
}
