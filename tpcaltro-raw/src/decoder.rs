//! Backward ALTRO bunch decoding.
//!
//! The hardware writes each channel back-to-front: walking from the payload
//! end, a decoder meets the 40-bit channel trailer first, then fill words,
//! then the channel's bunches with the most recent time bins first. Bunch
//! boundaries are only discoverable sequentially, so a single block is
//! always decoded on one thread; independent blocks fan out via
//! [`decode_blocks`].

use log::warn;
use rayon::prelude::*;

use tpcaltro_core::{Bunch, DecodeStats, Digit, PadCoord, RawBlockDescriptor};

use crate::bitword::{get_10bit_word, get_40bit_word, GROUP_BITS, WORD_BITS};
use crate::error::{Error, Result};
use crate::mapping::{self, PadPlaneMapping};
use crate::trailer::{RcuFormat, RcuTrailer, CDH_BYTES};

/// Marker value in the top ten bits of every channel trailer (also the fill
/// word padding channels to 40-bit boundaries).
pub const CHANNEL_MARKER: u16 = 0x2AA;

/// Decoder configuration.
#[derive(Debug, Clone, Copy)]
pub struct DecoderConfig {
    /// Read the legacy single-word RCU trailer instead of the three-word one.
    pub old_rcu_format: bool,
    /// Deliver digits in raw decode order instead of `(row, pad, time)`
    /// order. Unsorted delivery needs no reorder buffer and is the default.
    pub unsorted: bool,
    /// Time bins per channel; used for cross-checks and to size the reorder
    /// buffer. Overridden by the RCU trailer when the format carries it.
    pub n_time_bins: u16,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            old_rcu_format: false,
            unsorted: true,
            n_time_bins: 1024,
        }
    }
}

impl DecoderConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the legacy single-word RCU trailer.
    pub fn with_old_rcu_format(mut self, old: bool) -> Self {
        self.old_rcu_format = old;
        self
    }

    /// Selects raw-order (true) or row/pad/time-sorted (false) delivery.
    pub fn with_unsorted(mut self, unsorted: bool) -> Self {
        self.unsorted = unsorted;
        self
    }

    /// Sets the number of time bins per channel.
    pub fn with_n_time_bins(mut self, n: u16) -> Self {
        self.n_time_bins = n;
        self
    }
}

/// The channel currently being decoded.
#[derive(Debug, Clone, Copy)]
pub struct Channel {
    /// Hardware address from the channel trailer.
    pub hw_address: u16,
    /// Resolved pad coordinate.
    pub coord: PadCoord,
}

struct ChannelCursor {
    hw_address: u16,
    coord: PadCoord,
    /// Index (from the payload end) of the next word to read.
    data_index: usize,
    words_left: usize,
}

/// Walks one raw block channel by channel, bunch by bunch.
pub struct AltroBunchDecoder<'a> {
    data: &'a [u8],
    descriptor: RawBlockDescriptor,
    mapping: &'static PadPlaneMapping,
    n_time_bins: u16,
    payload_end_bit: usize,
    total_words: usize,
    consumed: usize,
    channel: Option<ChannelCursor>,
    stats: DecodeStats,
}

impl<'a> AltroBunchDecoder<'a> {
    /// Positions a decoder at the end of `data`'s payload.
    ///
    /// Validates that the block holds the common data header and the RCU
    /// trailer and that the payload is 40-bit aligned.
    pub fn init_block(
        data: &'a [u8],
        descriptor: RawBlockDescriptor,
        config: &DecoderConfig,
    ) -> Result<Self> {
        let format = RcuFormat::from_old_flag(config.old_rcu_format);
        let trailer = RcuTrailer::parse(data, format)?;
        let payload_end_bit = RcuTrailer::payload_end_bit(data.len(), format);
        let payload_bits = payload_end_bit - CDH_BYTES * 8;
        if payload_bits % GROUP_BITS != 0 {
            return Err(Error::MisalignedBlock {
                payload_bits,
            });
        }
        Ok(Self {
            data,
            descriptor,
            mapping: PadPlaneMapping::global(),
            n_time_bins: trailer.n_time_bins.unwrap_or(config.n_time_bins),
            payload_end_bit,
            total_words: payload_bits / WORD_BITS,
            consumed: 0,
            channel: None,
            stats: DecodeStats::default(),
        })
    }

    /// Block provenance.
    pub fn descriptor(&self) -> RawBlockDescriptor {
        self.descriptor
    }

    /// Time bins per channel in effect for this block.
    pub fn n_time_bins(&self) -> u16 {
        self.n_time_bins
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Advances to the next channel with a wired pad.
    ///
    /// Channels whose hardware address does not resolve are dropped and
    /// counted (recoverable). Returns `Ok(None)` when the payload is
    /// exhausted. A corrupt channel trailer loses the framing and is fatal
    /// for the block.
    pub fn next_channel(&mut self) -> Result<Option<Channel>> {
        loop {
            if self.consumed >= self.total_words {
                self.channel = None;
                return Ok(None);
            }
            let group_index = self.consumed / 4;
            let trailer = get_40bit_word(self.data, self.payload_end_bit, group_index)?;
            let marker = ((trailer >> 30) & 0x3FF) as u16;
            let word_count = ((trailer >> 16) & 0x3FF) as usize;
            let hw_address = (trailer & 0xFFF) as u16;
            if marker != CHANNEL_MARKER {
                return Err(Error::MalformedChannel {
                    hw_address,
                    word_index: self.consumed,
                    reason: format!("channel trailer marker 0x{marker:03x}, expected 0x2aa"),
                });
            }
            let padded = word_count.div_ceil(4) * 4;
            if self.consumed + 4 + padded > self.total_words {
                return Err(Error::MalformedChannel {
                    hw_address,
                    word_index: self.consumed,
                    reason: format!(
                        "word count {} exceeds the {} words left in the payload",
                        word_count,
                        self.total_words - self.consumed - 4
                    ),
                });
            }
            let data_index = self.consumed + 4 + (padded - word_count);
            self.consumed += 4 + padded;

            let coord = self.mapping.coord(self.descriptor.partition, hw_address);
            if !coord.is_valid() {
                self.stats.unmapped_channels += 1;
                warn!(
                    "slice {} partition {}: dropping unmapped hardware address 0x{:03x}",
                    self.descriptor.slice, self.descriptor.partition, hw_address
                );
                continue;
            }
            self.stats.channels += 1;
            self.channel = Some(ChannelCursor {
                hw_address,
                coord,
                data_index,
                words_left: word_count,
            });
            return Ok(Some(Channel {
                hw_address,
                coord,
            }));
        }
    }

    /// Pops the next bunch of the current channel, samples in increasing
    /// time order.
    ///
    /// Returns `Ok(None)` when the channel's word budget is exhausted. An
    /// inconsistent bunch length abandons the channel (the error is scoped
    /// to it; the caller proceeds with [`next_channel`](Self::next_channel)).
    pub fn next_bunch(&mut self) -> Result<Option<Bunch>> {
        let data = self.data;
        let payload_end_bit = self.payload_end_bit;
        let n_time_bins = self.n_time_bins;
        let Some(channel) = self.channel.as_mut() else {
            return Ok(None);
        };
        if channel.words_left == 0 {
            self.channel = None;
            return Ok(None);
        }
        let hw_address = channel.hw_address;
        let word_index = channel.data_index;

        let result = Self::read_bunch(data, payload_end_bit, n_time_bins, channel);
        match result {
            Ok(bunch) => {
                self.stats.bunches += 1;
                self.stats.samples += bunch.len() as u64;
                Ok(Some(bunch))
            }
            Err(reason) => {
                self.channel = None;
                self.stats.malformed_channels += 1;
                Err(Error::MalformedChannel {
                    hw_address,
                    word_index,
                    reason,
                })
            }
        }
    }

    fn read_bunch(
        data: &[u8],
        payload_end_bit: usize,
        n_time_bins: u16,
        channel: &mut ChannelCursor,
    ) -> std::result::Result<Bunch, String> {
        let word = |index: usize| get_10bit_word(data, payload_end_bit, index);

        let length = word(channel.data_index).map_err(|e| e.to_string())? as usize;
        if length < 3 || length > channel.words_left {
            return Err(format!(
                "bunch length {} with {} words left in the channel",
                length, channel.words_left
            ));
        }
        let time = word(channel.data_index + 1).map_err(|e| e.to_string())?;
        let n_samples = length - 2;
        if usize::from(time) + 1 < n_samples || time >= n_time_bins {
            return Err(format!(
                "bunch of {n_samples} samples ending at time bin {time} outside 0..{n_time_bins}"
            ));
        }
        // Walking backward meets the samples highest-time-first.
        let mut samples = Vec::with_capacity(n_samples);
        for k in 0..n_samples {
            samples.push(word(channel.data_index + 2 + k).map_err(|e| e.to_string())?);
        }
        samples.reverse();

        channel.data_index += length;
        channel.words_left -= length;
        Ok(Bunch::new(time, samples))
    }
}

/// A fully decoded block: digits plus decode counters.
#[derive(Debug, Clone)]
pub struct DecodedBlock {
    /// Decoded samples, in raw or sorted order depending on configuration.
    pub digits: Vec<Digit>,
    /// Counters for this block.
    pub stats: DecodeStats,
}

/// Reusable digit-level decode driver.
///
/// Owns the sorted-mode reorder buffer (preallocated for the widest
/// partition, never grown) so repeated blocks allocate nothing.
pub struct DigitDecoder {
    config: DecoderConfig,
    reorder: Vec<u16>,
}

impl DigitDecoder {
    /// Creates a driver; sorted mode preallocates the reorder buffer.
    pub fn new(config: DecoderConfig) -> Self {
        let reorder = if config.unsorted {
            Vec::new()
        } else {
            let rows = (0u8..6).map(mapping::row_count).max().unwrap() as usize;
            let pads = (0u8..6).map(mapping::max_pad_count).max().unwrap() as usize;
            vec![0u16; rows * pads * config.n_time_bins as usize]
        };
        Self { config, reorder }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes a whole block into digits.
    ///
    /// Malformed channels are logged and skipped; only framing-level
    /// corruption or a truncated block fails the call.
    pub fn decode_block(
        &mut self,
        data: &[u8],
        descriptor: RawBlockDescriptor,
    ) -> Result<DecodedBlock> {
        let mut decoder = AltroBunchDecoder::init_block(data, descriptor, &self.config)?;
        if !self.config.unsorted && decoder.n_time_bins() > self.config.n_time_bins {
            return Err(tpcaltro_core::Error::ConfigError(format!(
                "reorder buffer sized for {} time bins, block declares {}",
                self.config.n_time_bins,
                decoder.n_time_bins()
            ))
            .into());
        }
        let mut digits = Vec::new();

        'channels: while let Some(channel) = decoder.next_channel()? {
            let coord = channel.coord;
            loop {
                match decoder.next_bunch() {
                    Ok(Some(bunch)) => {
                        for (time, adc) in bunch.iter_timed() {
                            digits.push(Digit::new(coord.row, coord.pad, time, adc));
                        }
                    }
                    Ok(None) => break,
                    Err(err @ Error::MalformedChannel { .. }) => {
                        warn!(
                            "slice {} partition {}: {err}",
                            descriptor.slice, descriptor.partition
                        );
                        continue 'channels;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        if !self.config.unsorted {
            digits = self.sort_digits(&digits, descriptor, decoder.n_time_bins());
        }
        Ok(DecodedBlock {
            digits,
            stats: decoder.stats(),
        })
    }

    /// Re-sorts digits by `(row, pad, time)` through the reorder buffer.
    ///
    /// Values are stored offset by one so bin zero can mean "empty"; the
    /// buffer is cleared again during the drain scan.
    fn sort_digits(
        &mut self,
        digits: &[Digit],
        descriptor: RawBlockDescriptor,
        n_time_bins: u16,
    ) -> Vec<Digit> {
        let pads = mapping::max_pad_count(descriptor.partition) as usize;
        let times = n_time_bins as usize;
        let index = |row: u16, pad: u16, time: u16| {
            ((row - descriptor.first_row) as usize * pads + pad as usize) * times + time as usize
        };

        for d in digits {
            self.reorder[index(d.row, d.pad, d.time)] = d.adc + 1;
        }
        let mut sorted = Vec::with_capacity(digits.len());
        let rows = descriptor.row_count() as usize;
        for slot in 0..rows * pads * times {
            let stored = self.reorder[slot];
            if stored != 0 {
                self.reorder[slot] = 0;
                let time = (slot % times) as u16;
                let pad = ((slot / times) % pads) as u16;
                let row = (slot / times / pads) as u16 + descriptor.first_row;
                sorted.push(Digit::new(row, pad, time, stored - 1));
            }
        }
        sorted
    }
}

/// Decodes independent blocks in parallel, one decoder per block.
///
/// The address tables are shared read-only; everything else is per-call.
pub fn decode_blocks(
    blocks: &[(&[u8], RawBlockDescriptor)],
    config: &DecoderConfig,
) -> Vec<Result<DecodedBlock>> {
    blocks
        .par_iter()
        .map(|&(data, descriptor)| DigitDecoder::new(*config).decode_block(data, descriptor))
        .collect()
}
