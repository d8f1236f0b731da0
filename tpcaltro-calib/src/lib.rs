//! tpcaltro-calib: Tail-cancellation-filter calibration for the TPC.
//!
//! Offline calibration path: reference pulses accumulated per pad are
//! fitted with a three-exponential shaper model; the fitted time constants
//! yield the pole/zero pairs of the three-stage tail-cancellation filter,
//! which are then validated against the same pulses.
//!
//! # Key Components
//!
//! - [`PulseAccumulator`] / [`PulseHistogram`] - reference-pulse collection
//! - [`fit_pulse`] - bounded Levenberg-Marquardt pulse fit
//! - [`derive_coefficients`] / [`calibrate_batch`] - filter derivation
//! - [`evaluate`] - quality metrics for a derived filter

pub mod error;
pub mod fit;
pub mod pulse;
pub mod quality;
pub mod shaper;
pub mod tcf;

pub use error::{Error, Result};
pub use fit::{fit_pulse, FitResult, MAX_ITERATIONS};
pub use pulse::{AccumulatorConfig, PulseAccumulator, PulseHistogram};
pub use quality::{
    apply_filter, apply_filter_fixed, evaluate, evaluate_record, QualityRecord, QualityReport,
    ANALYSIS_WINDOW,
};
pub use shaper::{pulse_model, sample_model, shaper_response, N_PARAMS, TTP};
pub use tcf::{
    apply_stage, calibrate_batch, calibrate_pad, derive_coefficients, TcfCoefficients, TcfRecord,
};
