//! Zero-suppression configuration.
//!
//! The engine is configured either programmatically through the builder
//! methods or from the framework-style `key value` option string, e.g.
//! `"signal-threshold 5 occupancy-limit 2 oldrcuformat 1"`. Unknown keys
//! are a hard configuration error, never silently ignored.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for [`ZeroSuppressionEngine`](crate::ZeroSuppressionEngine).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZsConfig {
    /// Absolute ADC threshold above the window average. Zero disables the
    /// absolute cut.
    pub signal_threshold: u32,
    /// N-sigma-above-noise threshold. Zero disables the RMS cut. With both
    /// cuts disabled every nonzero sample is kept.
    pub rms_threshold: u32,
    /// Total time bins per channel (at most 1024, the 10-bit time word).
    pub n_time_bins: u16,
    /// First time bin of the analysis window.
    pub start_time_bin: u16,
    /// Last time bin of the analysis window (inclusive).
    pub end_time_bin: u16,
    /// Extra bins kept to the left of every passing sample.
    pub left_margin: u16,
    /// Extra bins kept to the right of every passing sample.
    pub right_margin: u16,
    /// Samples more than this far below the window average are dropped even
    /// inside a keep range.
    pub value_below_average: u32,
    /// Pads with fewer surviving samples than this are dropped entirely.
    pub occupancy_limit: u16,
    /// Input blocks carry the legacy single-word RCU trailer.
    pub old_rcu_format: bool,
    /// Order surviving pads by `(row, pad)` in the output instead of
    /// preserving decode order.
    pub sort_pads: bool,
}

impl Default for ZsConfig {
    fn default() -> Self {
        Self {
            signal_threshold: 3,
            rms_threshold: 0,
            n_time_bins: 446,
            start_time_bin: 0,
            end_time_bin: 445,
            left_margin: 1,
            right_margin: 1,
            value_below_average: 5,
            occupancy_limit: 2,
            old_rcu_format: false,
            sort_pads: false,
        }
    }
}

impl ZsConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the absolute signal threshold.
    pub fn with_signal_threshold(mut self, threshold: u32) -> Self {
        self.signal_threshold = threshold;
        self
    }

    /// Sets the N-sigma RMS threshold.
    pub fn with_rms_threshold(mut self, threshold: u32) -> Self {
        self.rms_threshold = threshold;
        self
    }

    /// Sets the total number of time bins and resets the window to cover
    /// them all; call [`with_window`](Self::with_window) after this to
    /// narrow it again.
    pub fn with_n_time_bins(mut self, n: u16) -> Self {
        self.n_time_bins = n;
        self.end_time_bin = n.saturating_sub(1);
        self
    }

    /// Sets the analysis window.
    pub fn with_window(mut self, start: u16, end: u16) -> Self {
        self.start_time_bin = start;
        self.end_time_bin = end;
        self
    }

    /// Sets the keep margins around passing samples.
    pub fn with_margins(mut self, left: u16, right: u16) -> Self {
        self.left_margin = left;
        self.right_margin = right;
        self
    }

    /// Sets the below-average drop slack.
    pub fn with_value_below_average(mut self, value: u32) -> Self {
        self.value_below_average = value;
        self
    }

    /// Sets the minimum surviving-sample count per pad.
    pub fn with_occupancy_limit(mut self, limit: u16) -> Self {
        self.occupancy_limit = limit;
        self
    }

    /// Selects the legacy single-word RCU trailer for the input.
    pub fn with_old_rcu_format(mut self, old: bool) -> Self {
        self.old_rcu_format = old;
        self
    }

    /// Orders output pads by `(row, pad)`.
    pub fn with_sort_pads(mut self, sort: bool) -> Self {
        self.sort_pads = sort;
        self
    }

    /// Parses a `key value` option string on top of the defaults.
    pub fn from_options(options: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut end_time_bin_set = false;
        let mut tokens = options.split_whitespace();
        while let Some(key) = tokens.next() {
            let value = tokens.next().ok_or_else(|| {
                Error::InvalidConfiguration(format!("missing value for option '{key}'"))
            })?;
            match key {
                "signal-threshold" => config.signal_threshold = parse(key, value)?,
                "rms-threshold" => config.rms_threshold = parse(key, value)?,
                "ntimebins" => {
                    config.n_time_bins = parse(key, value)?;
                    if !end_time_bin_set {
                        config.end_time_bin = config.n_time_bins.saturating_sub(1);
                    }
                }
                "start-timebin" => config.start_time_bin = parse(key, value)?,
                "end-timebin" => {
                    config.end_time_bin = parse(key, value)?;
                    end_time_bin_set = true;
                }
                "timebin-left" => config.left_margin = parse(key, value)?,
                "timebin-right" => config.right_margin = parse(key, value)?,
                "value-below-average" => config.value_below_average = parse(key, value)?,
                "occupancy-limit" => config.occupancy_limit = parse(key, value)?,
                "oldrcuformat" => config.old_rcu_format = parse_flag(key, value)?,
                "sort-pads" => config.sort_pads = parse_flag(key, value)?,
                _ => {
                    return Err(Error::InvalidConfiguration(format!(
                        "unknown option '{key}'"
                    )))
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks the internal consistency of the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.n_time_bins == 0 || self.n_time_bins > 1024 {
            return Err(Error::InvalidConfiguration(format!(
                "ntimebins {} outside 1..=1024",
                self.n_time_bins
            )));
        }
        if self.end_time_bin > self.n_time_bins {
            return Err(Error::InvalidConfiguration(format!(
                "end-timebin {} exceeds ntimebins {}",
                self.end_time_bin, self.n_time_bins
            )));
        }
        if self.start_time_bin > self.end_time_bin {
            return Err(Error::InvalidConfiguration(format!(
                "start-timebin {} past end-timebin {}",
                self.start_time_bin, self.end_time_bin
            )));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        Error::InvalidConfiguration(format!("option '{key}': cannot parse '{value}'"))
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(Error::InvalidConfiguration(format!(
            "option '{key}': expected 0 or 1, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_string_roundtrip() {
        let config = ZsConfig::from_options(
            "signal-threshold 5 rms-threshold 4 ntimebins 1024 start-timebin 10 \
             end-timebin 900 timebin-left 2 timebin-right 3 value-below-average 7 \
             occupancy-limit 5 oldrcuformat 1 sort-pads 1",
        )
        .unwrap();
        assert_eq!(config.signal_threshold, 5);
        assert_eq!(config.rms_threshold, 4);
        assert_eq!(config.n_time_bins, 1024);
        assert_eq!(config.start_time_bin, 10);
        assert_eq!(config.end_time_bin, 900);
        assert_eq!(config.left_margin, 2);
        assert_eq!(config.right_margin, 3);
        assert_eq!(config.value_below_average, 7);
        assert_eq!(config.occupancy_limit, 5);
        assert!(config.old_rcu_format);
        assert!(config.sort_pads);
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let err = ZsConfig::from_options("signal-treshold 5");
        assert!(matches!(err, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_missing_value_is_rejected() {
        assert!(ZsConfig::from_options("signal-threshold").is_err());
    }

    #[test]
    fn test_window_consistency_checked() {
        assert!(ZsConfig::from_options("end-timebin 500").is_err());
        assert!(ZsConfig::from_options("ntimebins 2000").is_err());
        assert!(ZsConfig::from_options("start-timebin 400 end-timebin 300").is_err());
    }

    #[test]
    fn test_flag_values_restricted() {
        assert!(ZsConfig::from_options("oldrcuformat 2").is_err());
        assert!(ZsConfig::from_options("sort-pads yes").is_err());
    }
}
