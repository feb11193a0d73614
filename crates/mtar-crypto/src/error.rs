//! Error types for digest operations

use thiserror::Error;

/// Errors that can occur when selecting or using a digest algorithm
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Algorithm name not recognised
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Hex digest has the wrong length for its algorithm
    #[error("Invalid digest length: expected {expected} hex characters, got {actual}")]
    InvalidDigestLength {
        /// Expected number of hex characters
        expected: usize,
        /// Actual number of hex characters
        actual: usize,
    },
}
