//! Error types for tpcaltro-io.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O layer errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Operating-system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed run description or record.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raw data error.
    #[error("raw data error: {0}")]
    Raw(#[from] tpcaltro_raw::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] tpcaltro_core::Error),
}
