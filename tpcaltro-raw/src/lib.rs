//! tpcaltro-raw: ALTRO raw data decoding and encoding for the TPC.
//!
//! This crate implements the bit-level ALTRO wire format: backward 10-bit
//! word extraction, the per-partition hardware-address tables, RCU trailer
//! handling, the bunch decoder, and the matching encoder used by the
//! zero-suppression output path.
//!
//! # Key Components
//!
//! - [`AltroBunchDecoder`] - channel/bunch state machine over one raw block
//! - [`DigitDecoder`] - block-level driver with sorted/unsorted delivery
//! - [`AltroEncoder`] - forward writer producing decoder-compatible blocks
//! - [`PadPlaneMapping`] - shared read-only hardware-address tables

pub mod bitword;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod mapping;
pub mod trailer;

pub use bitword::{get_10bit_word, get_40bit_word, BitCursor};
pub use decoder::{
    decode_blocks, AltroBunchDecoder, Channel, DecodedBlock, DecoderConfig, DigitDecoder,
    CHANNEL_MARKER,
};
pub use encoder::{channel_wire_bytes, samples_word_count, AltroEncoder};
pub use error::{Error, Result};
pub use mapping::PadPlaneMapping;
pub use trailer::{RcuFormat, RcuTrailer, CDH_BYTES};

// Re-export core types for convenience
pub use tpcaltro_core::{Bunch, DecodeStats, Digit, PadCoord, RawBlockDescriptor};
