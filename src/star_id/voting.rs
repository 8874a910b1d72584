//! Geometric voting.
//!
//! Every pair of centroids votes for the catalog stars of every catalog pair at
//! the same angular separation. A centroid is assigned the candidate with the
//! strictly highest vote count; a verification pass then keeps only the
//! assignments that agree with most of the others.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{centroid_vectors, distance_matches, drop_duplicate_assignments, strict_winner};
use crate::database::pair_distance::PairDistanceDatabase;
use crate::error::{Result, StarTrackerError};
use crate::star::angle_between;
use crate::{Camera, Catalog, Centroid, StarIdentifier};

#[derive(Debug, Clone, PartialEq)]
pub struct VotingConfig {
    /// Angular matching tolerance in radians. Default 0.05°.
    pub tolerance_rad: f64,
    /// Fewest votes a winning candidate needs. Default 2.
    pub min_votes: i32,
    /// Run the pairwise-consistency pass after voting. Default true.
    pub verify: bool,
    /// An assignment survives verification when its agreement count exceeds
    /// this fraction of the best agreement count. Default 0.75.
    pub verification_fraction: f64,
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            tolerance_rad: 0.05_f64.to_radians(),
            min_votes: 2,
            verify: true,
            verification_fraction: 0.75,
        }
    }
}

pub fn identify(
    centroids: &[Centroid],
    camera: &Camera,
    database: &PairDistanceDatabase,
    catalog: &Catalog,
    config: &VotingConfig,
) -> Result<Vec<StarIdentifier>> {
    if centroids.len() < 2 {
        return Err(StarTrackerError::degenerate(format!(
            "geometric voting needs at least 2 centroids, got {}",
            centroids.len()
        )));
    }
    let vectors = centroid_vectors(centroids, camera);
    let tol = config.tolerance_rad;

    let mut votes: Vec<HashMap<usize, i32>> = vec![HashMap::new(); centroids.len()];
    let mut candidates: HashSet<usize> = HashSet::new();
    for i in 0..vectors.len() {
        for j in i + 1..vectors.len() {
            let d = angle_between(&vectors[i], &vectors[j]);
            let pairs = database.query_exact(catalog, d - tol, d + tol);
            if pairs.is_empty() {
                continue;
            }
            // each catalog star counts once per centroid pair
            candidates.clear();
            for p in pairs {
                candidates.insert(p.a as usize);
                candidates.insert(p.b as usize);
            }
            for &c in &candidates {
                *votes[i].entry(c).or_default() += 1;
                *votes[j].entry(c).or_default() += 1;
            }
        }
    }

    let ids: Vec<StarIdentifier> = votes
        .iter()
        .enumerate()
        .filter_map(|(i, tally)| {
            let winner = strict_winner(tally, config.min_votes);
            if winner.is_none() && !tally.is_empty() {
                debug!("centroid {} unidentified: tie or too few votes", i);
            }
            winner.map(|(c, n)| StarIdentifier::new(i, c, n))
        })
        .collect();
    let ids = drop_duplicate_assignments(ids);

    if !config.verify {
        return Ok(ids);
    }
    Ok(verify(ids, &vectors, catalog, tol, config.verification_fraction))
}

/// Keep identifiers whose catalog distances agree with enough of the other identifiers.
pub(crate) fn verify(
    ids: Vec<StarIdentifier>,
    vectors: &[crate::Vector3],
    catalog: &Catalog,
    tolerance: f64,
    fraction: f64,
) -> Vec<StarIdentifier> {
    let agreement: Vec<usize> = ids
        .iter()
        .map(|a| {
            ids.iter()
                .filter(|b| b.star_index != a.star_index)
                .filter(|b| {
                    let measured = angle_between(&vectors[a.star_index], &vectors[b.star_index]);
                    distance_matches(catalog, a.catalog_index, b.catalog_index, measured, tolerance)
                })
                .count()
        })
        .collect();
    let best = agreement.iter().copied().max().unwrap_or(0);
    let threshold = best as f64 * fraction;
    ids.into_iter()
        .zip(agreement)
        .filter_map(|(id, n)| {
            if n as f64 > threshold {
                Some(id)
            } else {
                debug!(
                    "centroid {} failed verification ({} of {} agreements)",
                    id.star_index, n, best
                );
                None
            }
        })
        .collect()
}
