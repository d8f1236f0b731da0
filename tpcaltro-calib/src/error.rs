//! Error types for TCF calibration.

use thiserror::Error;

/// Result type for calibration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while fitting pulses and deriving filter coefficients.
///
/// The fit errors are scoped to one pad or sector: the batch loop logs
/// them and continues with the next unit of work.
#[derive(Error, Debug)]
pub enum Error {
    /// The minimizer hit its iteration budget without converging. No
    /// coefficients are produced.
    #[error("fit did not converge after {iterations} iterations (chi2 {chi2:.3e})")]
    FitNotConverged { iterations: usize, chi2: f64 },

    /// The fitted time constants do not yield a realizable filter.
    #[error("non-physical fit result: {0}")]
    NonPhysicalFit(String),

    /// A histogram with no accumulated pulses.
    #[error("empty pulse histogram for sector {sector} row {row} pad {pad}")]
    EmptyHistogram { sector: u8, row: u16, pad: u16 },

    /// Configuration error, fatal at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
