//! Error types for zero suppression.

use thiserror::Error;

/// Result type for zero-suppression operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the zero-suppression engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecognized option key, malformed value, or out-of-range setting.
    /// Fatal at initialization; no event is processed.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Raw decoding or encoding error (including the output-capacity
    /// contract violation).
    #[error("raw data error: {0}")]
    Raw(#[from] tpcaltro_raw::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] tpcaltro_core::Error),
}
