//! Error types for ALTRO raw data handling.

use thiserror::Error;

/// Result type for raw data operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while decoding or encoding ALTRO raw blocks.
#[derive(Error, Debug)]
pub enum Error {
    /// A bit-field read fell outside the buffer.
    #[error("bit range [{bit_start}, {bit_start}+{bit_len}) outside buffer of {buffer_bits} bits")]
    WordOutOfRange {
        bit_start: i64,
        bit_len: u32,
        buffer_bits: usize,
    },

    /// The block is too short to hold the common data header and RCU trailer.
    #[error("truncated block: {size} bytes, need at least {required}")]
    TruncatedBlock { size: usize, required: usize },

    /// The payload is not an integer number of 40-bit word groups.
    #[error("misaligned payload: {payload_bits} bits is not a multiple of 40")]
    MisalignedBlock { payload_bits: usize },

    /// A channel's bunch structure is inconsistent with its word budget.
    /// The channel is abandoned; the block continues where framing allows.
    #[error(
        "malformed channel 0x{hw_address:03x} at word {word_index} from payload end: {reason}"
    )]
    MalformedChannel {
        hw_address: u16,
        word_index: usize,
        reason: String,
    },

    /// A hardware address outside the partition's wired range.
    #[error("unmapped hardware address 0x{hw_address:03x} in partition {partition}")]
    UnmappedHardwareAddress { partition: u8, hw_address: u16 },

    /// A channel holds more data words than the trailer word-count field
    /// can express.
    #[error("channel 0x{hw_address:03x}: {words} data words exceed the 10-bit word count")]
    ChannelOverflow { hw_address: u16, words: usize },

    /// The caller-provided output buffer cannot hold the encoded block.
    #[error("output buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] tpcaltro_core::Error),
}
