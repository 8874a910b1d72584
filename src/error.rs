//! Error kinds shared by the database, identification and attitude layers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StarTrackerError {
    /// Input is geometrically or numerically unusable (too few stars, collinear
    /// vectors, empty database window, ...).
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),
    #[error("No catalog match found")]
    NoMatch,
    #[error("More than one catalog match found")]
    AmbiguousMatch,
    /// A serialized buffer is truncated or violates the index invariants.
    #[error("Corrupt data: {0}")]
    CorruptData(String),
    #[error("Failed to converge after {iterations} iterations")]
    NonConvergence { iterations: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StarTrackerError>;

impl StarTrackerError {
    pub(crate) fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateInput(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptData(msg.into())
    }
}
