//! Counters reported by the decode and zero-suppression drivers.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-block decode statistics.
///
/// Recoverable conditions (skipped channels, unmapped addresses) are counted
/// here rather than propagated, so a commissioning shift can see how much of
/// a block was lost without the event aborting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecodeStats {
    /// Channels successfully decoded.
    pub channels: u64,
    /// Bunches successfully decoded.
    pub bunches: u64,
    /// ADC samples delivered.
    pub samples: u64,
    /// Channels abandoned due to malformed bunch structure.
    pub malformed_channels: u64,
    /// Channels dropped because the hardware address did not map to a pad.
    pub unmapped_channels: u64,
}

impl DecodeStats {
    /// Merges counters from another block.
    pub fn merge(&mut self, other: &DecodeStats) {
        self.channels += other.channels;
        self.bunches += other.bunches;
        self.samples += other.samples;
        self.malformed_channels += other.malformed_channels;
        self.unmapped_channels += other.unmapped_channels;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge() {
        let mut a = DecodeStats {
            channels: 2,
            bunches: 5,
            samples: 40,
            malformed_channels: 1,
            unmapped_channels: 0,
        };
        let b = DecodeStats {
            channels: 3,
            bunches: 1,
            samples: 7,
            malformed_channels: 0,
            unmapped_channels: 2,
        };
        a.merge(&b);
        assert_eq!(a.channels, 5);
        assert_eq!(a.bunches, 6);
        assert_eq!(a.samples, 47);
        assert_eq!(a.malformed_channels, 1);
        assert_eq!(a.unmapped_channels, 2);
    }
}
