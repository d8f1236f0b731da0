//! Error types for tpcaltro-core.

use thiserror::Error;

/// Result type alias for tpcaltro operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for tpcaltro operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Readout partition index outside the six TPC partitions.
    #[error("invalid readout partition: {0}")]
    InvalidPartition(u8),

    /// Pad row outside the partition's row range.
    #[error("invalid pad row {row} for partition {partition}")]
    InvalidRow { partition: u8, row: u16 },

    /// Slice index outside the detector.
    #[error("invalid slice: {0}")]
    InvalidSlice(u8),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}
