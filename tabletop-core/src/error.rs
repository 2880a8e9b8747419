//! Error types for tabletop perception

use thiserror::Error;

/// Main error type for tabletop perception operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    /// A stage produced or received a cloud without points.
    #[error("Empty input at stage '{stage}'")]
    EmptyInput { stage: String },

    /// No support surface satisfied the fitting or size constraints.
    #[error("Degenerate support surface: {0}")]
    DegenerateSurface(String),

    /// A footprint cluster recovered no 3D points.
    #[error("Degenerate object: footprint cluster {cluster} yielded no points")]
    DegenerateObject { cluster: usize },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// A pipeline run is already in flight on this instance.
    #[error("A perception run is already in progress")]
    Busy,
}

impl Error {
    pub fn empty_input(stage: impl Into<String>) -> Self {
        Error::EmptyInput { stage: stage.into() }
    }
}

/// Result type alias for tabletop operations
pub type Result<T> = std::result::Result<T, Error>;
