//! Reference-pulse accumulation.
//!
//! Calibration pulses are collected over many events: each qualifying pulse
//! is pedestal-subtracted, aligned on its peak, and summed into a per-pad
//! histogram. The histogram only ever accumulates; the mean pulse is the
//! running sum divided by the pulse count.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use tpcaltro_core::Digit;

use crate::error::{Error, Result};

/// Running sum of aligned pulses for one pad.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulseHistogram {
    /// TPC sector the pad belongs to.
    pub sector: u8,
    /// Global pad row.
    pub row: u16,
    /// Pad within the row.
    pub pad: u16,
    /// Number of accumulated pulses.
    pub n_pulses: u32,
    /// Per-bin sum of pedestal-subtracted samples.
    pub sample_sum: Vec<f64>,
}

impl PulseHistogram {
    /// Creates an empty histogram of `length` bins.
    pub fn new(sector: u8, row: u16, pad: u16, length: usize) -> Self {
        Self {
            sector,
            row,
            pad,
            n_pulses: 0,
            sample_sum: vec![0.0; length],
        }
    }

    /// Adds one aligned, pedestal-subtracted pulse.
    pub fn add(&mut self, pulse: &[f64]) {
        debug_assert_eq!(pulse.len(), self.sample_sum.len());
        for (sum, &value) in self.sample_sum.iter_mut().zip(pulse) {
            *sum += value;
        }
        self.n_pulses += 1;
    }

    /// Merges another pad's statistics into this one (sector-level fits).
    pub fn merge(&mut self, other: &PulseHistogram) {
        debug_assert_eq!(other.sample_sum.len(), self.sample_sum.len());
        for (sum, &value) in self.sample_sum.iter_mut().zip(&other.sample_sum) {
            *sum += value;
        }
        self.n_pulses += other.n_pulses;
    }

    /// The mean pulse, `sample_sum / n_pulses`.
    pub fn mean_pulse(&self) -> Result<Vec<f64>> {
        if self.n_pulses == 0 {
            return Err(Error::EmptyHistogram {
                sector: self.sector,
                row: self.row,
                pad: self.pad,
            });
        }
        let n = f64::from(self.n_pulses);
        Ok(self.sample_sum.iter().map(|&s| s / n).collect())
    }
}

/// Pulse-qualification settings for the accumulator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccumulatorConfig {
    /// Bins per accumulated pulse window.
    pub pulse_length: usize,
    /// Peak slot inside the window; pulses are aligned so their maximum
    /// lands here.
    pub peak_position: usize,
    /// Minimum peak ADC value for a pulse to qualify.
    pub qualification_threshold: u16,
    /// Leading window bins averaged for the pedestal estimate.
    pub pedestal_bins: usize,
    /// Time bins per channel in the incoming digits.
    pub n_time_bins: u16,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            pulse_length: 446,
            peak_position: 11,
            qualification_threshold: 50,
            pedestal_bins: 5,
            n_time_bins: 1024,
        }
    }
}

impl AccumulatorConfig {
    fn validate(&self) -> Result<()> {
        if self.pulse_length == 0 || self.peak_position >= self.pulse_length {
            return Err(Error::InvalidConfiguration(format!(
                "peak position {} outside pulse window of {} bins",
                self.peak_position, self.pulse_length
            )));
        }
        if self.pedestal_bins == 0 || self.pedestal_bins > self.peak_position {
            return Err(Error::InvalidConfiguration(format!(
                "{} pedestal bins do not fit before the peak slot {}",
                self.pedestal_bins, self.peak_position
            )));
        }
        Ok(())
    }
}

/// Collects qualifying pulses from decoded digits into per-pad histograms.
pub struct PulseAccumulator {
    config: AccumulatorConfig,
    histograms: HashMap<(u8, u16, u16), PulseHistogram>,
    dense: Vec<u16>,
}

impl PulseAccumulator {
    /// Creates an accumulator, validating the configuration.
    pub fn new(config: AccumulatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            histograms: HashMap::new(),
            dense: vec![0; config.n_time_bins as usize],
        })
    }

    /// Feeds one pad's digits from one event.
    ///
    /// The digits must all belong to `(row, pad)`. Pads whose peak fails
    /// the qualification threshold, or whose aligned window does not fit
    /// inside the time range, are skipped silently — a calibration run
    /// sees plenty of pulses.
    pub fn add_pad_event(&mut self, sector: u8, row: u16, pad: u16, digits: &[Digit]) {
        self.dense.fill(0);
        let mut peak_time = 0usize;
        let mut peak_adc = 0u16;
        for digit in digits {
            debug_assert_eq!((digit.row, digit.pad), (row, pad));
            let t = digit.time as usize;
            if t < self.dense.len() {
                self.dense[t] = digit.adc;
                if digit.adc > peak_adc {
                    peak_adc = digit.adc;
                    peak_time = t;
                }
            }
        }
        if peak_adc < self.config.qualification_threshold {
            return;
        }
        let Some(window_start) = peak_time.checked_sub(self.config.peak_position) else {
            return;
        };
        if window_start + self.config.pulse_length > self.dense.len() {
            return;
        }

        let window = &self.dense[window_start..window_start + self.config.pulse_length];
        let pedestal: f64 = window[..self.config.pedestal_bins]
            .iter()
            .map(|&v| f64::from(v))
            .sum::<f64>()
            / self.config.pedestal_bins as f64;

        let pulse: Vec<f64> = window.iter().map(|&v| f64::from(v) - pedestal).collect();
        let length = self.config.pulse_length;
        self.histograms
            .entry((sector, row, pad))
            .or_insert_with(|| PulseHistogram::new(sector, row, pad, length))
            .add(&pulse);
    }

    /// Number of pads with at least one accumulated pulse.
    pub fn pad_count(&self) -> usize {
        self.histograms.len()
    }

    /// Consumes the accumulator, returning histograms ordered by pad.
    pub fn into_histograms(self) -> Vec<PulseHistogram> {
        let mut histograms: Vec<PulseHistogram> = self.histograms.into_values().collect();
        histograms.sort_by_key(|h| (h.sector, h.row, h.pad));
        histograms
    }

    /// Merges all pads of one sector into a single histogram for better
    /// fit statistics on low-occupancy pads.
    pub fn merge_by_sector(self) -> Vec<PulseHistogram> {
        let mut merged: HashMap<u8, PulseHistogram> = HashMap::new();
        for histogram in self.histograms.into_values() {
            merged
                .entry(histogram.sector)
                .and_modify(|m| m.merge(&histogram))
                .or_insert(histogram);
        }
        let mut histograms: Vec<PulseHistogram> = merged.into_values().collect();
        histograms.sort_by_key(|h| h.sector);
        histograms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn digits_for_pulse(row: u16, pad: u16, peak_time: u16, peak_adc: u16) -> Vec<Digit> {
        vec![
            Digit::new(row, pad, peak_time - 1, peak_adc / 2),
            Digit::new(row, pad, peak_time, peak_adc),
            Digit::new(row, pad, peak_time + 1, peak_adc / 3),
        ]
    }

    #[test]
    fn test_qualification_threshold() {
        let config = AccumulatorConfig {
            pulse_length: 50,
            peak_position: 11,
            qualification_threshold: 50,
            pedestal_bins: 5,
            n_time_bins: 446,
        };
        let mut acc = PulseAccumulator::new(config).unwrap();
        acc.add_pad_event(0, 3, 7, &digits_for_pulse(3, 7, 100, 40));
        assert_eq!(acc.pad_count(), 0);
        acc.add_pad_event(0, 3, 7, &digits_for_pulse(3, 7, 100, 200));
        assert_eq!(acc.pad_count(), 1);
    }

    #[test]
    fn test_peak_alignment_and_pedestal() {
        let config = AccumulatorConfig {
            pulse_length: 30,
            peak_position: 10,
            qualification_threshold: 50,
            pedestal_bins: 5,
            n_time_bins: 446,
        };
        let mut acc = PulseAccumulator::new(config).unwrap();
        // Same pulse shape at two different absolute times, on a pedestal.
        for peak_time in [60u16, 200u16] {
            let digits: Vec<Digit> = (0..30)
                .map(|i| {
                    let t = peak_time - 10 + i;
                    let adc = if i == 10 { 110 } else { 8 };
                    Digit::new(3, 7, t, adc)
                })
                .collect();
            acc.add_pad_event(0, 3, 7, &digits);
        }
        let histograms = acc.into_histograms();
        assert_eq!(histograms.len(), 1);
        let mean = histograms[0].mean_pulse().unwrap();
        assert_eq!(histograms[0].n_pulses, 2);
        // Alignment puts both peaks in the same slot; pedestal 8 removed.
        assert_relative_eq!(mean[10], 102.0, epsilon = 1e-9);
        assert_relative_eq!(mean[5], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mean_pulse_of_empty_histogram_fails() {
        let histogram = PulseHistogram::new(0, 1, 2, 10);
        assert!(histogram.mean_pulse().is_err());
    }

    #[test]
    fn test_window_must_fit() {
        let config = AccumulatorConfig {
            pulse_length: 100,
            peak_position: 11,
            qualification_threshold: 50,
            pedestal_bins: 5,
            n_time_bins: 446,
        };
        let mut acc = PulseAccumulator::new(config).unwrap();
        // Peak too close to the start for the leading pedestal bins.
        acc.add_pad_event(0, 3, 7, &digits_for_pulse(3, 7, 5, 200));
        // Peak so late the window runs off the end.
        acc.add_pad_event(0, 3, 7, &digits_for_pulse(3, 7, 440, 200));
        assert_eq!(acc.pad_count(), 0);
    }
}
