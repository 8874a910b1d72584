//! Per-image pipeline: centroids → star identifiers → attitude.
//!
//! Identification and attitude failures are recorded in the output instead of
//! being returned as errors, so a batch of images always yields one output per
//! image.

use std::collections::HashMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::attitude::{self, AttitudeEstimator};
use crate::database::StarDatabase;
use crate::error::StarTrackerError;
use crate::star_id::StarIdAlgorithm;
use crate::{Camera, Catalog, Centroid, Quaternion, StarIdentifier};

// ── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Default: pyramid with default parameters.
    pub star_id: StarIdAlgorithm,
    /// Default: Davenport-Q.
    pub attitude: AttitudeEstimator,
    /// Retry with Davenport-Q when QUEST fails to converge. Default false.
    pub fallback_to_davenport: bool,
}

// ── Output ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Stars were identified and an attitude estimated.
    AttitudeFound,
    /// Identification returned an error (too few centroids, no unique match, ...).
    IdentificationFailed,
    /// Fewer than two stars were identified, so no attitude could be estimated.
    TooFewIdentified,
    /// The attitude estimator returned an error.
    AttitudeFailed,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Identified centroids, sorted by centroid index. Empty when identification failed.
    pub identifiers: Vec<StarIdentifier>,
    /// Rotation from the catalog frame to the camera frame: `camera = q * spatial`.
    pub attitude: Option<Quaternion>,
    pub status: PipelineStatus,
    /// Why no attitude was produced; `None` on success.
    pub failure: Option<String>,
    /// Wall-clock time spent on this image, in milliseconds.
    pub solve_time_ms: f32,
}

impl PipelineOutput {
    /// Boresight right ascension, declination and roll of the attitude, in radians.
    pub fn spherical(&self) -> Option<(f64, f64, f64)> {
        self.attitude.as_ref().map(attitude::to_spherical)
    }
}

// ── Pipeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run identification and attitude estimation on one image's centroids.
    pub fn run(&self, centroids: &[Centroid], camera: &Camera, db: &StarDatabase) -> PipelineOutput {
        let t0 = Instant::now();
        let catalog = &db.catalog;
        let identifiers = match self
            .config
            .star_id
            .identify(centroids, camera, &db.pair_distance, catalog)
        {
            Ok(ids) => ids,
            Err(e) => {
                debug!("{} failed: {}", self.config.star_id.name(), e);
                return Self::failed(Vec::new(), PipelineStatus::IdentificationFailed, e, t0);
            }
        };
        if identifiers.len() < 2 {
            let reason = format!(
                "only {} of {} centroids identified, attitude needs 2",
                identifiers.len(),
                centroids.len()
            );
            debug!("{}", reason);
            return PipelineOutput {
                identifiers,
                attitude: None,
                status: PipelineStatus::TooFewIdentified,
                failure: Some(reason),
                solve_time_ms: elapsed_ms(t0),
            };
        }

        let pairs = attitude::vector_pairs(centroids, &identifiers, camera, catalog);
        let estimate = match self.config.attitude.estimate(&pairs) {
            Err(StarTrackerError::NonConvergence { iterations })
                if self.config.fallback_to_davenport =>
            {
                debug!(
                    "{} did not converge after {} iterations, falling back to Davenport-Q",
                    self.config.attitude.name(),
                    iterations
                );
                AttitudeEstimator::DavenportQ.estimate(&pairs)
            }
            other => other,
        };
        match estimate {
            Ok(q) => PipelineOutput {
                identifiers,
                attitude: Some(q),
                status: PipelineStatus::AttitudeFound,
                failure: None,
                solve_time_ms: elapsed_ms(t0),
            },
            Err(e) => {
                debug!("{} failed: {}", self.config.attitude.name(), e);
                Self::failed(identifiers, PipelineStatus::AttitudeFailed, e, t0)
            }
        }
    }

    /// Run every image independently and in parallel; outputs keep the input order.
    pub fn run_batch(
        &self,
        images: &[Vec<Centroid>],
        camera: &Camera,
        db: &StarDatabase,
    ) -> Vec<PipelineOutput> {
        let t0 = Instant::now();
        let outputs: Vec<PipelineOutput> = images
            .par_iter()
            .map(|centroids| self.run(centroids, camera, db))
            .collect();
        let found = outputs
            .iter()
            .filter(|o| o.status == PipelineStatus::AttitudeFound)
            .count();
        info!(
            "Processed {} images in {:.1} ms: {} with attitude",
            images.len(),
            elapsed_ms(t0),
            found
        );
        outputs
    }

    fn failed(
        identifiers: Vec<StarIdentifier>,
        status: PipelineStatus,
        error: StarTrackerError,
        t0: Instant,
    ) -> PipelineOutput {
        PipelineOutput {
            identifiers,
            attitude: None,
            status,
            failure: Some(error.to_string()),
            solve_time_ms: elapsed_ms(t0),
        }
    }
}

fn elapsed_ms(t0: Instant) -> f32 {
    t0.elapsed().as_secs_f32() * 1000.0
}

// ── Identification scoring ──────────────────────────────────────────────────

/// How many identifiers of a run agree with the known truth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarIdComparison {
    pub num_correct: usize,
    /// Identifiers naming the wrong star, or naming any star for a centroid
    /// with no true identity.
    pub num_incorrect: usize,
    /// Number of expected identifiers.
    pub num_total: usize,
}

impl StarIdComparison {
    /// Compare identifiers by star name, so the two lists may index different catalogs.
    pub fn compare(
        expected: &[StarIdentifier],
        expected_catalog: &Catalog,
        actual: &[StarIdentifier],
        actual_catalog: &Catalog,
    ) -> Self {
        let truth: HashMap<usize, Option<u32>> = expected
            .iter()
            .map(|id| {
                let name = expected_catalog.get(id.catalog_index).map(|s| s.name);
                (id.star_index, name)
            })
            .collect();
        let mut num_correct = 0;
        let mut num_incorrect = 0;
        for id in actual {
            let name = actual_catalog.get(id.catalog_index).map(|s| s.name);
            match truth.get(&id.star_index) {
                Some(&expected_name) if expected_name.is_some() && expected_name == name => {
                    num_correct += 1
                }
                _ => num_incorrect += 1,
            }
        }
        Self {
            num_correct,
            num_incorrect,
            num_total: expected.len(),
        }
    }

    pub fn fraction_correct(&self) -> f64 {
        if self.num_total == 0 {
            return 0.0;
        }
        self.num_correct as f64 / self.num_total as f64
    }

    pub fn fraction_incorrect(&self) -> f64 {
        if self.num_total == 0 {
            return 0.0;
        }
        self.num_incorrect as f64 / self.num_total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseConfig;
    use crate::star_id::VotingConfig;
    use crate::{CatalogStar, Vector3};

    fn scene() -> (StarDatabase, Camera, Vec<Centroid>) {
        let d = |x: f64| x.to_radians();
        let offsets = [(0.0, 0.0), (2.0, 1.0), (-1.5, 3.0), (3.5, -2.5), (-3.5, -1.0), (0.5, -5.0)];
        let stars: Vec<CatalogStar> = offsets
            .iter()
            .enumerate()
            .map(|(n, &(x, y))| CatalogStar::new(Vector3::new(d(x).tan(), d(y).tan(), 1.0), 100, n as u32))
            .collect();
        let config = DatabaseConfig {
            min_distance_rad: 0.0,
            max_distance_rad: 0.3,
            num_bins: 100,
            ..Default::default()
        };
        let db = StarDatabase::build(&Catalog::new(stars), &config).unwrap();
        let camera = Camera::from_fov(d(20.0), 1000, 1000);
        let centroids = db
            .catalog
            .stars()
            .iter()
            .map(|s| {
                let (x, y) = camera.spatial_to_camera(&s.spatial).unwrap();
                Centroid::new(x, y)
            })
            .collect();
        (db, camera, centroids)
    }

    #[test]
    fn run_finds_identity_attitude() {
        let (db, camera, centroids) = scene();
        let out = Pipeline::default().run(&centroids, &camera, &db);
        assert_eq!(out.status, PipelineStatus::AttitudeFound);
        assert_eq!(out.identifiers.len(), centroids.len());
        let q = out.attitude.unwrap();
        assert!(q.angle() < 1e-6, "angle {}", q.angle());
        assert!(out.failure.is_none());
    }

    #[test]
    fn too_few_centroids_is_recorded_not_raised() {
        let (db, camera, centroids) = scene();
        let out = Pipeline::default().run(&centroids[..2], &camera, &db);
        assert_eq!(out.status, PipelineStatus::IdentificationFailed);
        assert!(out.identifiers.is_empty());
        assert!(out.attitude.is_none());
        assert!(out.failure.unwrap().contains("Degenerate"));
    }

    #[test]
    fn single_identification_records_reason() {
        let (db, camera, centroids) = scene();
        let pipeline = Pipeline::new(PipelineConfig {
            star_id: StarIdAlgorithm::Dummy { seed: 1 },
            ..Default::default()
        });
        let out = pipeline.run(&centroids[..1], &camera, &db);
        assert_eq!(out.status, PipelineStatus::TooFewIdentified);
        assert_eq!(out.identifiers.len(), 1);
        assert!(out.attitude.is_none());
        let reason = out.failure.expect("missing failure reason");
        assert!(reason.contains("only 1 of 1"), "{}", reason);
    }

    #[test]
    fn quest_falls_back_to_davenport() {
        let (db, camera, centroids) = scene();
        let config = PipelineConfig {
            star_id: StarIdAlgorithm::GeometricVoting(VotingConfig::default()),
            attitude: AttitudeEstimator::Quest(crate::attitude::QuestConfig {
                max_iterations: 0,
                ..Default::default()
            }),
            fallback_to_davenport: false,
        };
        let out = Pipeline::new(config.clone()).run(&centroids, &camera, &db);
        assert_eq!(out.status, PipelineStatus::AttitudeFailed);
        assert_eq!(out.identifiers.len(), centroids.len());

        let out = Pipeline::new(PipelineConfig {
            fallback_to_davenport: true,
            ..config
        })
        .run(&centroids, &camera, &db);
        assert_eq!(out.status, PipelineStatus::AttitudeFound);
    }

    #[test]
    fn batch_keeps_input_order() {
        let (db, camera, centroids) = scene();
        let images = vec![centroids.clone(), centroids[..1].to_vec(), centroids];
        let outputs = Pipeline::default().run_batch(&images, &camera, &db);
        let status: Vec<PipelineStatus> = outputs.iter().map(|o| o.status).collect();
        assert_eq!(
            status,
            vec![
                PipelineStatus::AttitudeFound,
                PipelineStatus::IdentificationFailed,
                PipelineStatus::AttitudeFound
            ]
        );
    }

    #[test]
    fn comparison_counts_by_name() {
        let expected_catalog = Catalog::new(
            (0..4).map(|i| CatalogStar::from_radec(i as f64 * 0.1, 0.0, 0, 100 + i)).collect(),
        );
        // same stars in reverse order
        let actual_catalog = Catalog::new(
            (0..4).rev().map(|i| CatalogStar::from_radec(i as f64 * 0.1, 0.0, 0, 100 + i)).collect(),
        );
        let expected: Vec<StarIdentifier> = (0..4).map(|i| StarIdentifier::new(i, i, 1)).collect();
        let actual = vec![
            StarIdentifier::new(0, 3, 1), // name 100: correct
            StarIdentifier::new(1, 2, 1), // name 101: correct
            StarIdentifier::new(2, 0, 1), // name 103: wrong
            StarIdentifier::new(7, 1, 1), // no such centroid in truth
        ];
        let cmp = StarIdComparison::compare(&expected, &expected_catalog, &actual, &actual_catalog);
        assert_eq!(cmp.num_correct, 2);
        assert_eq!(cmp.num_incorrect, 2);
        assert_eq!(cmp.num_total, 4);
        assert!((cmp.fraction_correct() - 0.5).abs() < 1e-12);
        assert!((cmp.fraction_incorrect() - 0.5).abs() < 1e-12);
    }
}
