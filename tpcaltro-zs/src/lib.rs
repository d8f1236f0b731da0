//! tpcaltro-zs: Online zero suppression for TPC ALTRO raw blocks.
//!
//! Decodes a raw block, keeps pad/time ranges above a configurable noise
//! threshold, and re-encodes the survivors in the identical ALTRO bunch
//! format plus a hardware-address side channel.

pub mod config;
pub mod engine;
pub mod error;

pub use config::ZsConfig;
pub use engine::{SegmentType, ZeroSuppressionEngine, ZsOutput, ZsStats};
pub use error::{Error, Result};

// Re-export core types for convenience
pub use tpcaltro_core::{DataSpecification, RawBlockDescriptor};
