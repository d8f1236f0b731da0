//! The zero-suppression engine.
//!
//! Consumes one raw block, keeps only the pad/time ranges exceeding the
//! configured threshold, and re-encodes the survivors through the same
//! ALTRO bunch format so the output stays decodable by the same decoder.
//!
//! Emitted samples carry their original ADC values; the window average and
//! the below-average slack gate only the keep decision. Together with the
//! monotonicity of the window average this makes a second pass over the
//! engine's own output an exact no-op.

use log::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use tpcaltro_core::{DataSpecification, RawBlockDescriptor};
use tpcaltro_raw::{
    channel_wire_bytes, AltroBunchDecoder, AltroEncoder, DecoderConfig, RcuFormat, CDH_BYTES,
};

use crate::config::ZsConfig;
use crate::error::{Error, Result};

/// Output segment kinds published per suppressed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SegmentType {
    /// Re-encoded ALTRO payload (CDH + bunches + placeholder RCU trailer).
    ZeroSuppressedAltro,
    /// Flat list of 16-bit hardware addresses of surviving pads.
    HardwareAddressList,
}

/// Counters for one suppressed block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZsStats {
    /// Pads decoded from the input block.
    pub pads_seen: u64,
    /// Pads surviving the occupancy limit.
    pub pads_kept: u64,
    /// Samples decoded inside the analysis window.
    pub samples_seen: u64,
    /// Samples written to the output block.
    pub samples_kept: u64,
}

/// Result of suppressing one block.
///
/// The ALTRO payload has been written into the caller's output buffer
/// (`payload_len` bytes); the hardware-address side channel is returned by
/// value. Both segments carry the same data specification as the input.
#[derive(Debug, Clone)]
pub struct ZsOutput {
    /// Bytes of segment one written into the output buffer.
    pub payload_len: usize,
    /// Hardware addresses of surviving pads, in suppression order: the
    /// input's decode order, or `(row, pad)` order when `sort-pads` is set.
    pub hw_addresses: Vec<u16>,
    /// Slice/partition specification word shared by both segments.
    pub specification: DataSpecification,
    /// Counters for this block.
    pub stats: ZsStats,
}

impl ZsOutput {
    /// Segment two as a flat little-endian byte array.
    pub fn hw_address_bytes(&self) -> Vec<u8> {
        self.hw_addresses
            .iter()
            .flat_map(|hw| hw.to_le_bytes())
            .collect()
    }

    /// Metadata for the two published segments.
    pub fn segments(&self) -> [(SegmentType, DataSpecification, usize); 2] {
        [
            (
                SegmentType::ZeroSuppressedAltro,
                self.specification,
                self.payload_len,
            ),
            (
                SegmentType::HardwareAddressList,
                self.specification,
                self.hw_addresses.len() * 2,
            ),
        ]
    }
}

/// One surviving pad: hardware address paired with its kept samples, so the
/// channel list and the payload cannot drift out of order.
struct PadSurvivor {
    hw_address: u16,
    row: u16,
    pad: u16,
    samples: Vec<(u16, u16)>,
}

/// Zero-suppression engine with preallocated per-pad working buffers.
pub struct ZeroSuppressionEngine {
    config: ZsConfig,
    dense: Vec<u16>,
    keep: Vec<bool>,
}

impl ZeroSuppressionEngine {
    /// Creates an engine, validating the configuration up front.
    pub fn new(config: ZsConfig) -> Result<Self> {
        config.validate()?;
        let n = config.n_time_bins as usize;
        Ok(Self {
            config,
            dense: vec![0; n],
            keep: vec![false; n],
        })
    }

    /// The configuration in effect.
    pub fn config(&self) -> &ZsConfig {
        &self.config
    }

    /// Suppresses one raw block into `output`.
    ///
    /// The output buffer is caller-provided and fixed; if the encoded
    /// survivors would not fit, the call fails with the byte counts and
    /// no usable output (`payload_len` would have been the `needed` value).
    pub fn suppress_block(
        &mut self,
        input: &[u8],
        descriptor: RawBlockDescriptor,
        output: &mut [u8],
    ) -> Result<ZsOutput> {
        let decoder_config = DecoderConfig::default()
            .with_old_rcu_format(self.config.old_rcu_format)
            .with_n_time_bins(self.config.n_time_bins);
        let mut decoder = AltroBunchDecoder::init_block(input, descriptor, &decoder_config)?;

        let mut survivors: Vec<PadSurvivor> = Vec::new();
        let mut stats = ZsStats::default();
        let window_start = self.config.start_time_bin;
        let window_end = self
            .config
            .end_time_bin
            .min(self.config.n_time_bins - 1);

        'channels: while let Some(channel) = decoder.next_channel()? {
            self.dense.fill(0);
            let mut in_window = 0u64;
            loop {
                match decoder.next_bunch() {
                    Ok(Some(bunch)) => {
                        for (time, adc) in bunch.iter_timed() {
                            if time >= window_start && time <= window_end {
                                self.dense[time as usize] = adc;
                                in_window += 1;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err @ tpcaltro_raw::Error::MalformedChannel { .. }) => {
                        warn!(
                            "slice {} partition {}: {err}",
                            descriptor.slice, descriptor.partition
                        );
                        continue 'channels;
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            stats.pads_seen += 1;
            stats.samples_seen += in_window;

            if let Some(samples) = self.suppress_pad(window_start, window_end) {
                stats.pads_kept += 1;
                stats.samples_kept += samples.len() as u64;
                survivors.push(PadSurvivor {
                    hw_address: channel.hw_address,
                    row: channel.coord.row,
                    pad: channel.coord.pad,
                    samples,
                });
            }
        }

        if self.config.sort_pads {
            survivors.sort_by_key(|s| (s.row, s.pad));
        }

        // Full capacity check before the first write: on failure nothing of
        // the output is usable, and the caller learns the required size.
        let needed = CDH_BYTES
            + survivors
                .iter()
                .map(|s| channel_wire_bytes(&s.samples))
                .sum::<usize>()
            + RcuFormat::Legacy.trailer_bytes();
        if needed > output.len() {
            return Err(Error::Raw(tpcaltro_raw::Error::BufferTooSmall {
                needed,
                available: output.len(),
            }));
        }

        let mut encoder = AltroEncoder::new(output);
        let cdh: &[u8; CDH_BYTES] = input[..CDH_BYTES].try_into().expect("validated length");
        encoder.write_cdh(cdh)?;
        if self.config.sort_pads {
            for survivor in &survivors {
                encoder.add_channel(survivor.hw_address, &survivor.samples)?;
            }
        } else {
            // Writing in reverse decode order makes the backward walk over
            // the output reproduce the input's channel order.
            for survivor in survivors.iter().rev() {
                encoder.add_channel(survivor.hw_address, &survivor.samples)?;
            }
        }
        let payload_len = encoder.finish(RcuFormat::Legacy, self.config.n_time_bins)?;

        Ok(ZsOutput {
            payload_len,
            hw_addresses: survivors.iter().map(|s| s.hw_address).collect(),
            specification: descriptor.specification(),
            stats,
        })
    }

    /// Applies the keep logic to the accumulated pad in `self.dense`.
    ///
    /// Returns the kept `(time, adc)` samples in increasing time order, or
    /// `None` when the pad falls below the occupancy limit.
    fn suppress_pad(&mut self, window_start: u16, window_end: u16) -> Option<Vec<(u16, u16)>> {
        let w0 = window_start as usize;
        let w1 = window_end as usize;
        let window_len = (w1 - w0 + 1) as u64;

        let mut sum = 0u64;
        let mut sum_sq = 0u64;
        for &adc in &self.dense[w0..=w1] {
            sum += u64::from(adc);
            sum_sq += u64::from(adc) * u64::from(adc);
        }
        let average = (sum / window_len) as u32;
        let rms = (sum_sq as f64 / window_len as f64).sqrt();

        let signal_cut = self.config.signal_threshold;
        let rms_cut = self.config.rms_threshold;
        let passes = |adc: u16| -> bool {
            if adc == 0 {
                return false;
            }
            if signal_cut > 0 && u32::from(adc) > average + signal_cut {
                return true;
            }
            if rms_cut > 0 && f64::from(adc) > f64::from(rms_cut) * rms {
                return true;
            }
            signal_cut == 0 && rms_cut == 0
        };

        for flag in &mut self.keep[w0..=w1] {
            *flag = false;
        }
        for t in w0..=w1 {
            if passes(self.dense[t]) {
                let lo = t.saturating_sub(self.config.left_margin as usize).max(w0);
                let hi = (t + self.config.right_margin as usize).min(w1);
                for flag in &mut self.keep[lo..=hi] {
                    *flag = true;
                }
            }
        }

        let floor = average.saturating_sub(self.config.value_below_average);
        let mut kept = Vec::new();
        for t in w0..=w1 {
            let adc = self.dense[t];
            if self.keep[t] && adc != 0 && u32::from(adc) >= floor {
                kept.push((t as u16, adc));
            }
        }

        if kept.len() < self.config.occupancy_limit as usize {
            return None;
        }
        Some(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpcaltro_raw::PadPlaneMapping;

    fn encode_input(channels: &[(u16, Vec<(u16, u16)>)]) -> Vec<u8> {
        let mut buf = vec![0u8; 8192];
        let mut encoder = AltroEncoder::new(&mut buf);
        encoder.write_cdh(&[0u8; CDH_BYTES]).unwrap();
        for (hw, samples) in channels {
            encoder.add_channel(*hw, samples).unwrap();
        }
        let len = encoder.finish(RcuFormat::Legacy, 446).unwrap();
        buf.truncate(len);
        buf
    }

    fn descriptor() -> RawBlockDescriptor {
        RawBlockDescriptor::new(0, 29, 0, 0).unwrap()
    }

    #[test]
    fn test_pad_below_occupancy_limit_is_dropped() {
        // Three strong samples on a quiet pad, occupancy limit five: the
        // pad must vanish even though every sample clears the threshold.
        let hw = PadPlaneMapping::global().hw_address(0, 3, 7).unwrap();
        let input = encode_input(&[(hw, vec![(100, 200), (101, 220), (102, 180)])]);

        let config = ZsConfig::from_options("occupancy-limit 5 oldrcuformat 1").unwrap();
        let mut engine = ZeroSuppressionEngine::new(config).unwrap();
        let mut output = vec![0u8; 4096];
        let result = engine
            .suppress_block(&input, descriptor(), &mut output)
            .unwrap();

        assert!(result.hw_addresses.is_empty());
        assert_eq!(result.stats.pads_seen, 1);
        assert_eq!(result.stats.pads_kept, 0);
        // An empty block is still a decodable block: CDH plus trailer.
        assert_eq!(result.payload_len, CDH_BYTES + 4);
    }

    #[test]
    fn test_margins_keep_neighbours() {
        let hw = PadPlaneMapping::global().hw_address(0, 0, 0).unwrap();
        // A peak at 100 with small shoulders; threshold keeps only the
        // peak, margins pull in one bin each side.
        let input = encode_input(&[(
            hw,
            vec![(98, 1), (99, 4), (100, 120), (101, 4), (102, 1)],
        )]);
        let config = ZsConfig::default()
            .with_signal_threshold(50)
            .with_occupancy_limit(1)
            .with_old_rcu_format(true)
            .with_value_below_average(1024);
        let mut engine = ZeroSuppressionEngine::new(config).unwrap();
        let mut output = vec![0u8; 4096];
        let result = engine
            .suppress_block(&input, descriptor(), &mut output)
            .unwrap();

        assert_eq!(result.hw_addresses, vec![hw]);
        assert_eq!(result.stats.samples_kept, 3);

        // Decode the output and check exactly 99..=101 survived.
        let mut driver = tpcaltro_raw::DigitDecoder::new(
            DecoderConfig::default().with_old_rcu_format(true).with_n_time_bins(446),
        );
        let decoded = driver
            .decode_block(&output[..result.payload_len], descriptor())
            .unwrap();
        let times: Vec<u16> = decoded.digits.iter().map(|d| d.time).collect();
        assert_eq!(times, vec![99, 100, 101]);
    }

    #[test]
    fn test_output_capacity_contract() {
        let hw = PadPlaneMapping::global().hw_address(0, 3, 7).unwrap();
        let input = encode_input(&[(hw, vec![(100, 200), (101, 220), (102, 180)])]);
        let config = ZsConfig::default()
            .with_occupancy_limit(1)
            .with_old_rcu_format(true);
        let mut engine = ZeroSuppressionEngine::new(config).unwrap();
        let mut output = vec![0u8; 40];
        let err = engine.suppress_block(&input, descriptor(), &mut output);
        match err {
            Err(Error::Raw(tpcaltro_raw::Error::BufferTooSmall { needed, available })) => {
                assert_eq!(available, 40);
                assert!(needed > available);
            }
            other => panic!("expected BufferTooSmall, got {other:?}"),
        }
    }
}
