//! Pad coordinates and decoded digit types.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sentinel value returned for hardware addresses that do not resolve
/// to a wired pad.
pub const INVALID_COORD: u16 = 1000;

/// Pad coordinate on a readout chamber: global pad row and pad within row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PadCoord {
    /// Global pad row (0..159 across all partitions).
    pub row: u16,
    /// Pad index within the row.
    pub pad: u16,
}

impl PadCoord {
    /// Creates a new pad coordinate.
    #[inline]
    pub fn new(row: u16, pad: u16) -> Self {
        Self { row, pad }
    }

    /// The sentinel coordinate for unmapped hardware addresses.
    #[inline]
    pub fn invalid() -> Self {
        Self {
            row: INVALID_COORD,
            pad: INVALID_COORD,
        }
    }

    /// Returns true unless this is the unmapped-address sentinel.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.row != INVALID_COORD && self.pad != INVALID_COORD
    }
}

/// A single decoded ADC sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Digit {
    /// Global pad row.
    pub row: u16,
    /// Pad within the row.
    pub pad: u16,
    /// Time bin.
    pub time: u16,
    /// ADC value (10-bit on the wire).
    pub adc: u16,
}

impl Digit {
    /// Creates a new digit.
    #[inline]
    pub fn new(row: u16, pad: u16, time: u16, adc: u16) -> Self {
        Self {
            row,
            pad,
            time,
            adc,
        }
    }

    /// The pad coordinate of this digit.
    #[inline]
    pub fn coord(&self) -> PadCoord {
        PadCoord::new(self.row, self.pad)
    }
}

/// A decoded bunch: a contiguous run of nonzero ADC samples on one pad.
///
/// `start_time` is the time bin of the *last* sample (the ALTRO time word);
/// the samples cover `start_time - len + 1 ..= start_time` in increasing
/// time order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bunch {
    /// Time bin of the last sample in the bunch.
    pub start_time: u16,
    /// Samples in increasing time order.
    pub samples: Vec<u16>,
}

impl Bunch {
    /// Creates a bunch from its end time bin and samples.
    pub fn new(start_time: u16, samples: Vec<u16>) -> Self {
        Self {
            start_time,
            samples,
        }
    }

    /// Time bin of the first (earliest) sample.
    #[inline]
    pub fn first_time(&self) -> u16 {
        self.start_time + 1 - self.samples.len() as u16
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the bunch holds no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterates `(time, adc)` pairs in increasing time order.
    pub fn iter_timed(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        let first = self.first_time();
        self.samples
            .iter()
            .enumerate()
            .map(move |(i, &adc)| (first + i as u16, adc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_coord_sentinel() {
        let good = PadCoord::new(3, 7);
        assert!(good.is_valid());
        assert!(!PadCoord::invalid().is_valid());
    }

    #[test]
    fn test_bunch_times() {
        let bunch = Bunch::new(50, vec![10, 20, 30, 20, 10]);
        assert_eq!(bunch.first_time(), 46);
        let timed: Vec<(u16, u16)> = bunch.iter_timed().collect();
        assert_eq!(
            timed,
            vec![(46, 10), (47, 20), (48, 30), (49, 20), (50, 10)]
        );
    }

    #[test]
    fn test_digit_coord() {
        let d = Digit::new(3, 7, 46, 10);
        assert_eq!(d.coord(), PadCoord::new(3, 7));
    }
}
