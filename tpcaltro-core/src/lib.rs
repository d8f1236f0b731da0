//! tpcaltro-core: Core types for TPC ALTRO raw data processing.
//!
//! This crate provides the shared vocabulary of the tpcaltro workspace:
//! pad coordinates, decoded digits and bunches, raw-block provenance, the
//! bit-exact data-specification word, and decode statistics.

pub mod block;
pub mod coord;
pub mod error;
pub mod stats;

pub use block::{DataSpecification, RawBlockDescriptor, N_PARTITIONS, N_SLICES};
pub use coord::{Bunch, Digit, PadCoord, INVALID_COORD};
pub use error::{Error, Result};
pub use stats::DecodeStats;
