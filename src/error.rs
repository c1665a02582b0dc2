//! Error types for the location engine.

use thiserror::Error;

/// Result type for locator operations
pub type Result<T> = std::result::Result<T, LocatorError>;

/// Errors that can occur while preparing or running a location.
///
/// Numerical anomalies inside the iteration (singular matrices, failed
/// ellipsoids, non-convergence) are not errors: the engine records them in
/// the exit code and returns a partial result. The variants here are for
/// conditions that prevent a result entirely or that the collaborating
/// services raise.
#[derive(Error, Debug)]
pub enum LocatorError {
    /// Malformed request, unparseable pick, missing required field
    #[error("bad input: {0}")]
    BadInput(String),

    /// Fewer than three stations remained used after triage
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Source depth outside the travel-time tables
    #[error("illegal source depth {0:.2} km")]
    BadDepth(f64),

    /// Step length bisection exceeded its iteration cap
    #[error("step length bisection did not converge")]
    BisectionFailed,

    /// Reference data or travel-time model could not be read
    #[error("model data error: {0}")]
    ModelData(String),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
