//! # startracker
//!
//! The core of a **lost-in-space star tracker**: identify the stars seen by a
//! camera against a catalog, then estimate the camera's attitude, with no prior
//! attitude estimate.
//!
//! ## Features
//!
//! - **Pair-distance database**: every catalog pair within a distance window, sorted
//!   by angular distance and indexed with a k-vector for constant-time range lookup
//! - **Star identification**: geometric voting and pyramid (four-star) matching with
//!   a mismatch-probability filter and chirality checks
//! - **Attitude estimation**: TRIAD, Davenport's q-method and QUEST
//! - **Compact binary format**: little-endian catalog and database blobs in a tagged
//!   container, loadable with full validation
//!
//! ## Example
//!
//! ```no_run
//! use startracker::{Camera, Catalog, Centroid, DatabaseConfig, Pipeline, StarDatabase};
//!
//! // Build the database once from a catalog and save it
//! # let catalog = Catalog::new(Vec::new());
//! let db = StarDatabase::build(&catalog, &DatabaseConfig::default()).unwrap();
//! db.save_to_file("stars.db").unwrap();
//! let db = StarDatabase::load_from_file("stars.db").unwrap();
//!
//! // Centroids in pixel coordinates, origin at the top-left corner
//! let camera = Camera::from_fov(15.0_f64.to_radians(), 1024, 1024);
//! let centroids = vec![
//!     Centroid::with_mass(612.0, 700.0, 50.0),
//!     Centroid::with_mass(462.0, 490.0, 45.0),
//!     // ... more centroids ...
//! ];
//!
//! let output = Pipeline::default().run(&centroids, &camera, &db);
//! if let Some(q) = output.attitude {
//!     println!("Attitude: {q}");
//!     println!("Identified {} stars in {:.1} ms", output.identifiers.len(), output.solve_time_ms);
//! }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Database**: narrow the catalog, enumerate pairs closer than the maximum
//!    distance, sort them and build the k-vector over their distances
//! 2. **Identification**: measure angular distances between centroids and look up
//!    catalog pairs at the same distance, then either vote per centroid or search for
//!    a unique four-star pyramid
//! 3. **Attitude**: solve Wahba's problem for the identified camera/catalog vector
//!    pairs; the result rotates catalog vectors into the camera frame
//!

pub mod attitude;
pub mod camera_model;
pub mod catalog;
mod centroid;
pub mod database;
pub mod error;
pub mod pipeline;
pub mod serialize;
pub mod star;
pub mod star_id;

pub use attitude::{AttitudeEstimator, QuestConfig, VectorPair};
pub use camera_model::Camera;
pub use catalog::Catalog;
pub use centroid::*;
pub use database::{DatabaseConfig, StarDatabase};
pub use error::{Result, StarTrackerError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, PipelineStatus, StarIdComparison};
pub use star::{CatalogStar, StarIdentifier};
pub use star_id::{PyramidConfig, StarIdAlgorithm, VotingConfig};

// Commonly used types
// In-memory math is 64-bit; the serialized formats store 32-bit floats.
pub type Quaternion = nalgebra::UnitQuaternion<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;
