//! Forward ALTRO block encoding.
//!
//! Produces blocks in the exact wire layout the decoder consumes: common
//! data header, per-channel bunches padded to 40-bit groups with 0x2AA fill
//! words and closed by the 40-bit channel trailer, then the RCU trailer.
//! Capacity of the caller-provided buffer is checked before every write;
//! nothing is ever written past it.

use crate::bitword::{set_bits, GROUP_BITS, WORD_BITS};
use crate::decoder::CHANNEL_MARKER;
use crate::error::{Error, Result};
use crate::trailer::{RcuFormat, RcuTrailer, CDH_BYTES};

/// Streaming encoder over a fixed-capacity output buffer.
pub struct AltroEncoder<'a> {
    buf: &'a mut [u8],
    bit_pos: usize,
    /// Bytes zeroed so far; bit writes OR into place.
    zeroed_until: usize,
}

impl<'a> AltroEncoder<'a> {
    /// Wraps an output buffer. The buffer does not need to be zeroed.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            bit_pos: 0,
            zeroed_until: 0,
        }
    }

    /// Bytes the encoder has produced so far (rounded up to whole bytes).
    pub fn bytes_written(&self) -> usize {
        self.bit_pos.div_ceil(8)
    }

    fn ensure(&mut self, bits: usize) -> Result<()> {
        let needed = (self.bit_pos + bits).div_ceil(8);
        if needed > self.buf.len() {
            return Err(Error::BufferTooSmall {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    fn write_bits(&mut self, len: u32, value: u64) -> Result<()> {
        self.ensure(len as usize)?;
        let last_byte = (self.bit_pos + len as usize - 1) / 8;
        while self.zeroed_until <= last_byte {
            self.buf[self.zeroed_until] = 0;
            self.zeroed_until += 1;
        }
        set_bits(self.buf, self.bit_pos, len, value);
        self.bit_pos += len as usize;
        Ok(())
    }

    fn write_word(&mut self, word: u16) -> Result<()> {
        self.write_bits(WORD_BITS as u32, u64::from(word & 0x3FF))
    }

    /// Copies the 32-byte common data header. Must be the first write.
    pub fn write_cdh(&mut self, cdh: &[u8; CDH_BYTES]) -> Result<()> {
        debug_assert_eq!(self.bit_pos, 0);
        self.ensure(CDH_BYTES * 8)?;
        self.buf[..CDH_BYTES].copy_from_slice(cdh);
        self.bit_pos = CDH_BYTES * 8;
        self.zeroed_until = CDH_BYTES;
        Ok(())
    }

    /// Encodes one channel from `(time, adc)` samples in increasing time
    /// order.
    ///
    /// Bunches split at time gaps and at zero samples, so only nonzero ADC
    /// values reach the wire. A channel needing more than 1023 data words
    /// cannot be represented in the trailer's word-count field.
    pub fn add_channel(&mut self, hw_address: u16, samples: &[(u16, u16)]) -> Result<()> {
        let word_count = samples_word_count(samples);
        if word_count > 0x3FF {
            return Err(Error::ChannelOverflow {
                hw_address,
                words: word_count,
            });
        }

        let mut words: usize = 0;
        let mut bunch: Vec<u16> = Vec::new();
        let mut bunch_end: u16 = 0;

        let mut flush =
            |enc: &mut Self, bunch: &mut Vec<u16>, bunch_end: u16, words: &mut usize| -> Result<()> {
                if bunch.is_empty() {
                    return Ok(());
                }
                for &adc in bunch.iter() {
                    enc.write_word(adc)?;
                }
                enc.write_word(bunch_end)?;
                enc.write_word(bunch.len() as u16 + 2)?;
                *words += bunch.len() + 2;
                bunch.clear();
                Ok(())
            };

        for &(time, adc) in samples {
            let contiguous = !bunch.is_empty() && time == bunch_end + 1;
            if !contiguous {
                flush(self, &mut bunch, bunch_end, &mut words)?;
            }
            if adc == 0 {
                flush(self, &mut bunch, bunch_end, &mut words)?;
                continue;
            }
            bunch.push(adc);
            bunch_end = time;
        }
        flush(self, &mut bunch, bunch_end, &mut words)?;
        debug_assert_eq!(words, word_count);

        // Pad to the 40-bit boundary, then close with the channel trailer.
        while words % 4 != 0 {
            self.write_word(CHANNEL_MARKER)?;
            words += 1;
        }
        let trailer = (u64::from(CHANNEL_MARKER) << 30)
            | ((word_count as u64) << 16)
            | u64::from(hw_address & 0xFFF);
        self.write_bits(GROUP_BITS as u32, trailer)
    }

    /// Closes the block with an RCU trailer and returns the total length in
    /// bytes.
    pub fn finish(&mut self, format: RcuFormat, n_time_bins: u16) -> Result<usize> {
        debug_assert_eq!(self.bit_pos % 8, 0);
        let trailer_bytes = format.trailer_bytes();
        self.ensure(trailer_bytes * 8)?;
        let start = self.bit_pos / 8;
        RcuTrailer::write(
            &mut self.buf[start..start + trailer_bytes],
            format,
            n_time_bins,
        );
        self.bit_pos += trailer_bytes * 8;
        self.zeroed_until = self.zeroed_until.max(start + trailer_bytes);
        Ok(self.bit_pos / 8)
    }
}

/// Number of 10-bit data words `add_channel` emits for `samples`.
///
/// Exposed so callers with a strict output-capacity budget can size their
/// buffers before encoding.
pub fn samples_word_count(samples: &[(u16, u16)]) -> usize {
    let mut words = 0;
    let mut run = 0usize;
    let mut prev_time: Option<u16> = None;
    for &(time, adc) in samples {
        let contiguous = prev_time.is_some_and(|p| time == p + 1);
        if (!contiguous || adc == 0) && run > 0 {
            words += run + 2;
            run = 0;
        }
        if adc != 0 {
            run += 1;
            prev_time = Some(time);
        } else {
            prev_time = None;
        }
    }
    if run > 0 {
        words += run + 2;
    }
    words
}

/// Bytes one channel occupies on the wire, fill words and trailer included.
pub fn channel_wire_bytes(samples: &[(u16, u16)]) -> usize {
    let words = samples_word_count(samples);
    let padded = words.div_ceil(4) * 4;
    (padded + 4) * WORD_BITS / 8
}
