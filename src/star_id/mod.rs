//! Star identification: assign detected centroids to catalog stars using the
//! pair-distance database.
//!
//! Two real algorithms are provided, geometric voting and pyramid, plus a
//! seeded random assignment for exercising the rest of the pipeline.

pub mod pyramid;
pub mod voting;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::database::pair_distance::PairDistanceDatabase;
use crate::error::Result;
use crate::{Camera, Catalog, Centroid, StarIdentifier, Vector3};

pub use pyramid::PyramidConfig;
pub use voting::VotingConfig;

/// Star identification algorithm.
#[derive(Debug, Clone, PartialEq)]
pub enum StarIdAlgorithm {
    /// Random catalog index for every centroid, reproducible from `seed`.
    Dummy { seed: u64 },
    GeometricVoting(VotingConfig),
    Pyramid(PyramidConfig),
}

impl Default for StarIdAlgorithm {
    fn default() -> Self {
        Self::Pyramid(PyramidConfig::default())
    }
}

impl StarIdAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dummy { .. } => "dummy",
            Self::GeometricVoting(_) => "geometric-voting",
            Self::Pyramid(_) => "pyramid",
        }
    }

    /// Identify `centroids` against `catalog`; `database` must have been built from `catalog`.
    ///
    /// The result is sorted by centroid index and holds at most one identifier
    /// per centroid. Voting and pyramid also never assign a catalog star to more
    /// than one centroid; `Dummy` draws catalog indices independently and may repeat them.
    pub fn identify(
        &self,
        centroids: &[Centroid],
        camera: &Camera,
        database: &PairDistanceDatabase,
        catalog: &Catalog,
    ) -> Result<Vec<StarIdentifier>> {
        let mut ids = match self {
            Self::Dummy { seed } => dummy(centroids, catalog, *seed),
            Self::GeometricVoting(config) => voting::identify(centroids, camera, database, catalog, config)?,
            Self::Pyramid(config) => pyramid::identify(centroids, camera, database, catalog, config)?,
        };
        ids.sort_by_key(|id| id.star_index);
        debug!(
            "{} identified {} of {} centroids",
            self.name(),
            ids.len(),
            centroids.len()
        );
        Ok(ids)
    }
}

fn dummy(centroids: &[Centroid], catalog: &Catalog, seed: u64) -> Vec<StarIdentifier> {
    if catalog.is_empty() {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..centroids.len())
        .map(|i| StarIdentifier::new(i, rng.random_range(0..catalog.len()), 0))
        .collect()
}

// ── Shared helpers ──────────────────────────────────────────────────────────

pub(crate) fn centroid_vectors(centroids: &[Centroid], camera: &Camera) -> Vec<Vector3> {
    centroids.iter().map(|c| camera.centroid_uvec(c)).collect()
}

/// `true` when `(a × b) · c > 0`, i.e. a, b, c wind counter-clockwise seen from outside.
pub(crate) fn spectrality(a: &Vector3, b: &Vector3, c: &Vector3) -> bool {
    a.cross(b).dot(c) > 0.0
}

/// Pick the candidate with the strictly highest count, if it reaches `min_votes`.
///
/// Ties for first place yield `None`.
pub(crate) fn strict_winner(votes: &HashMap<usize, i32>, min_votes: i32) -> Option<(usize, i32)> {
    let mut best: Option<(usize, i32)> = None;
    let mut runner_up = i32::MIN;
    for (&candidate, &count) in votes {
        match best {
            Some((_, top)) if count > top => {
                runner_up = top;
                best = Some((candidate, count));
            }
            Some((_, top)) => runner_up = runner_up.max(count),
            None => best = Some((candidate, count)),
        }
    }
    let (candidate, count) = best?;
    (count >= min_votes && count > runner_up).then_some((candidate, count))
}

/// Remove every identifier whose catalog star is also claimed by another centroid.
pub(crate) fn drop_duplicate_assignments(ids: Vec<StarIdentifier>) -> Vec<StarIdentifier> {
    let mut claims: HashMap<usize, usize> = HashMap::new();
    for id in &ids {
        *claims.entry(id.catalog_index).or_default() += 1;
    }
    ids.into_iter()
        .filter(|id| {
            let unique = claims[&id.catalog_index] == 1;
            if !unique {
                debug!(
                    "centroid {} dropped: catalog star {} claimed more than once",
                    id.star_index, id.catalog_index
                );
            }
            unique
        })
        .collect()
}

/// Whether the catalog distance between two stars is within `tolerance` of `measured`.
pub(crate) fn distance_matches(
    catalog: &Catalog,
    a: usize,
    b: usize,
    measured: f64,
    tolerance: f64,
) -> bool {
    let d = crate::star::angle_between(&catalog.uvec(a), &catalog.uvec(b));
    (d - measured).abs() <= tolerance
}
