//! Offline databases: the narrowed star catalog and its pair-distance k-vector index.
//!
//! A [`StarDatabase`] bundles both and persists them in the tagged container
//! format from [`multi`].

pub mod kvector;
pub mod multi;
pub mod pair_distance;

use tracing::info;

use crate::error::{Result, StarTrackerError};
use crate::Catalog;

use multi::{MultiDatabase, MultiDatabaseBuilder, CATALOG_MAGIC, PAIR_DISTANCE_MAGIC};
use pair_distance::PairDistanceDatabase;

// ── Configuration for database generation ───────────────────────────────────

/// Parameters controlling database generation.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Smallest pair separation stored, in radians.
    /// Default 0.5°: closer pairs tend to merge into one centroid.
    pub min_distance_rad: f32,
    /// Largest pair separation stored, in radians. Should be at least the
    /// diagonal field of view. Default 20°.
    pub max_distance_rad: f32,
    /// Number of k-vector bins. Default 10000.
    pub num_bins: u32,
    /// Faintest star kept, in hundredths of a magnitude. Default None (keep all).
    pub max_magnitude: Option<i32>,
    /// Keep at most this many of the brightest stars. Default None.
    pub max_stars: Option<usize>,
    /// Drop both stars of any pair closer than this, in radians. Default None.
    pub min_separation_rad: Option<f64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            min_distance_rad: 0.5_f32.to_radians(),
            max_distance_rad: 20.0_f32.to_radians(),
            num_bins: 10_000,
            max_magnitude: None,
            max_stars: None,
            min_separation_rad: None,
        }
    }
}

// ── The bundled database ────────────────────────────────────────────────────

/// Catalog plus pair-distance index built from it. Immutable once built.
#[derive(Debug, Clone)]
pub struct StarDatabase {
    pub catalog: Catalog,
    pub pair_distance: PairDistanceDatabase,
}

impl StarDatabase {
    /// Narrow `catalog` according to `config` and index its pair distances.
    pub fn build(catalog: &Catalog, config: &DatabaseConfig) -> Result<Self> {
        let catalog = catalog.narrow(
            config.max_magnitude,
            config.max_stars,
            config.min_separation_rad,
        );
        let pair_distance = PairDistanceDatabase::build(
            &catalog,
            config.min_distance_rad,
            config.max_distance_rad,
            config.num_bins,
        )?;
        Ok(Self {
            catalog,
            pair_distance,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut builder = MultiDatabaseBuilder::new();
        builder.add(CATALOG_MAGIC, &self.catalog.to_bytes())?;
        builder.add(PAIR_DISTANCE_MAGIC, &self.pair_distance.to_bytes())?;
        Ok(builder.finish())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let multi = MultiDatabase::parse(bytes)?;
        let catalog_bytes = multi
            .sub_database(CATALOG_MAGIC)
            .ok_or_else(|| StarTrackerError::corrupt("missing catalog sub-database"))?;
        let pair_bytes = multi
            .sub_database(PAIR_DISTANCE_MAGIC)
            .ok_or_else(|| StarTrackerError::corrupt("missing pair-distance sub-database"))?;
        let catalog = Catalog::from_bytes(catalog_bytes)?;
        let pair_distance = PairDistanceDatabase::from_bytes(pair_bytes)?;
        pair_distance.validate_against(&catalog)?;
        Ok(Self {
            catalog,
            pair_distance,
        })
    }

    /// Save the database to a file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, &bytes)?;
        info!("Saved database to {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    /// Load a database from a file.
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        let db = Self::from_bytes(&bytes)?;
        info!(
            "Loaded database: {} stars, {} pairs",
            db.catalog.len(),
            db.pair_distance.num_pairs()
        );
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CatalogStar;

    fn catalog() -> Catalog {
        let d = |x: f64| x.to_radians();
        Catalog::new(vec![
            CatalogStar::from_radec(d(2.0), d(-3.0), 350, 11),
            CatalogStar::from_radec(d(4.0), d(7.0), 120, 12),
            CatalogStar::from_radec(d(2.0), d(6.0), 480, 13),
            CatalogStar::from_radec(d(150.0), d(40.0), 200, 14),
        ])
    }

    #[test]
    fn build_narrows_then_indexes() {
        let config = DatabaseConfig {
            min_distance_rad: 0.0,
            max_distance_rad: 0.2,
            num_bins: 16,
            max_magnitude: Some(400),
            ..Default::default()
        };
        let db = StarDatabase::build(&catalog(), &config).unwrap();
        assert_eq!(db.catalog.len(), 3);
        // brightest first after narrowing
        assert_eq!(db.catalog.stars()[0].name, 12);
        // only star 11 and 12 remain within 0.2 rad of each other
        assert_eq!(db.pair_distance.num_pairs(), 1);
    }

    #[test]
    fn bytes_roundtrip() {
        let config = DatabaseConfig {
            min_distance_rad: 0.0,
            max_distance_rad: 0.2,
            num_bins: 16,
            ..Default::default()
        };
        let db = StarDatabase::build(&catalog(), &config).unwrap();
        let bytes = db.to_bytes().unwrap();
        let back = StarDatabase::from_bytes(&bytes).unwrap();
        assert_eq!(back.catalog.len(), db.catalog.len());
        assert_eq!(back.pair_distance, db.pair_distance);
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn missing_sub_database_is_corrupt() {
        let mut builder = MultiDatabaseBuilder::new();
        builder.add(CATALOG_MAGIC, &catalog().to_bytes()).unwrap();
        let bytes = builder.finish();
        assert!(matches!(
            StarDatabase::from_bytes(&bytes),
            Err(StarTrackerError::CorruptData(_))
        ));
    }

    #[test]
    fn file_roundtrip() {
        let config = DatabaseConfig {
            min_distance_rad: 0.0,
            max_distance_rad: 0.2,
            num_bins: 8,
            ..Default::default()
        };
        let db = StarDatabase::build(&catalog(), &config).unwrap();
        let path = std::env::temp_dir().join(format!("startracker_db_{}.bin", std::process::id()));
        let path = path.to_string_lossy().to_string();
        db.save_to_file(&path).unwrap();
        let back = StarDatabase::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back.pair_distance.num_pairs(), 3);
        assert!(StarDatabase::load_from_file("/nonexistent/startracker.bin").is_err());
    }
}
