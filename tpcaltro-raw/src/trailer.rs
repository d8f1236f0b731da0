//! RCU trailer parsing and writing.
//!
//! Two formats are in circulation: the legacy single-word trailer (one
//! reserved 32-bit word) and the current three-word trailer
//! `[timebins|reserved][charge word][reserved]`. The format is selected by
//! run configuration, not discovered from the data.

use crate::error::{Error, Result};

/// Size of the common data header prefixed to every event block.
pub const CDH_BYTES: usize = 32;

/// RCU trailer format selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcuFormat {
    /// One reserved 32-bit word.
    Legacy,
    /// Three 32-bit words carrying the time-bin count and charge sum.
    Current,
}

impl RcuFormat {
    /// Creates the format from the `oldrcuformat` configuration flag.
    #[inline]
    pub fn from_old_flag(old: bool) -> Self {
        if old {
            RcuFormat::Legacy
        } else {
            RcuFormat::Current
        }
    }

    /// Trailer size in bytes.
    #[inline]
    pub fn trailer_bytes(self) -> usize {
        match self {
            RcuFormat::Legacy => 4,
            RcuFormat::Current => 12,
        }
    }
}

/// Decoded RCU trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcuTrailer {
    /// Format the trailer was read with.
    pub format: RcuFormat,
    /// Number of time bins per channel, when the format carries it.
    pub n_time_bins: Option<u16>,
}

impl RcuTrailer {
    /// Parses the trailer at the end of `block`.
    ///
    /// Fails with [`Error::TruncatedBlock`] if the block cannot hold the
    /// common data header plus the trailer.
    pub fn parse(block: &[u8], format: RcuFormat) -> Result<RcuTrailer> {
        let required = CDH_BYTES + format.trailer_bytes();
        if block.len() < required {
            return Err(Error::TruncatedBlock {
                size: block.len(),
                required,
            });
        }
        let n_time_bins = match format {
            RcuFormat::Legacy => None,
            RcuFormat::Current => {
                let start = block.len() - format.trailer_bytes();
                let word = u32::from_le_bytes(block[start..start + 4].try_into().unwrap());
                Some((word & 0x3FF) as u16)
            }
        };
        Ok(RcuTrailer {
            format,
            n_time_bins,
        })
    }

    /// Bit offset of the payload end (start of the trailer) in `block`.
    pub fn payload_end_bit(block_len: usize, format: RcuFormat) -> usize {
        (block_len - format.trailer_bytes()) * 8
    }

    /// Serializes a trailer into `out`, which must be exactly
    /// `format.trailer_bytes()` long.
    pub fn write(out: &mut [u8], format: RcuFormat, n_time_bins: u16) {
        debug_assert_eq!(out.len(), format.trailer_bytes());
        match format {
            RcuFormat::Legacy => out.copy_from_slice(&0u32.to_le_bytes()),
            RcuFormat::Current => {
                out[0..4].copy_from_slice(&u32::from(n_time_bins & 0x3FF).to_le_bytes());
                out[4..8].copy_from_slice(&0u32.to_le_bytes());
                out[8..12].copy_from_slice(&0u32.to_le_bytes());
            }
        }
    }
}
