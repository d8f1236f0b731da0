//! Raw block provenance and the slice/partition specification word.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of readout partitions per TPC slice.
pub const N_PARTITIONS: u8 = 6;

/// Number of TPC slices (sectors counted over both ends).
pub const N_SLICES: u8 = 36;

/// Provenance of one raw DDL block: which slice and readout partition it
/// came from and which global pad rows it covers.
///
/// The block bytes themselves are borrowed by the decoder; this descriptor
/// travels alongside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawBlockDescriptor {
    /// First global pad row covered by the partition.
    pub first_row: u16,
    /// Last global pad row covered by the partition.
    pub last_row: u16,
    /// Readout partition (0..6).
    pub partition: u8,
    /// TPC slice (0..36).
    pub slice: u8,
}

impl RawBlockDescriptor {
    /// Creates a descriptor, validating the partition and slice indices.
    pub fn new(first_row: u16, last_row: u16, partition: u8, slice: u8) -> Result<Self> {
        if partition >= N_PARTITIONS {
            return Err(Error::InvalidPartition(partition));
        }
        if slice >= N_SLICES {
            return Err(Error::InvalidSlice(slice));
        }
        Ok(Self {
            first_row,
            last_row,
            partition,
            slice,
        })
    }

    /// Number of pad rows covered by the block.
    #[inline]
    pub fn row_count(&self) -> u16 {
        self.last_row - self.first_row + 1
    }

    /// The specification word for a block covering exactly this
    /// slice/partition pair.
    pub fn specification(&self) -> DataSpecification {
        DataSpecification::new(self.slice, self.slice, self.partition, self.partition)
    }
}

/// The 32-bit data-specification word attached to every published block.
///
/// Bit layout (fixed by downstream consumers keyed on this value):
/// `min_slice << 16 | max_slice << 24 | min_partition | max_partition << 8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataSpecification(pub u32);

impl DataSpecification {
    /// Packs a slice/partition range.
    pub fn new(min_slice: u8, max_slice: u8, min_partition: u8, max_partition: u8) -> Self {
        Self(
            (u32::from(min_slice) << 16)
                | (u32::from(max_slice) << 24)
                | u32::from(min_partition)
                | (u32::from(max_partition) << 8),
        )
    }

    /// First slice of the range.
    #[inline]
    pub fn min_slice(&self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Last slice of the range.
    #[inline]
    pub fn max_slice(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// First partition of the range.
    #[inline]
    pub fn min_partition(&self) -> u8 {
        self.0 as u8
    }

    /// Last partition of the range.
    #[inline]
    pub fn max_partition(&self) -> u8 {
        (self.0 >> 8) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specification_packing() {
        let spec = DataSpecification::new(3, 3, 1, 1);
        assert_eq!(spec.0, (3 << 16) | (3 << 24) | 1 | (1 << 8));
        assert_eq!(spec.min_slice(), 3);
        assert_eq!(spec.max_slice(), 3);
        assert_eq!(spec.min_partition(), 1);
        assert_eq!(spec.max_partition(), 1);
    }

    #[test]
    fn test_descriptor_validation() {
        assert!(RawBlockDescriptor::new(0, 29, 0, 0).is_ok());
        assert!(RawBlockDescriptor::new(0, 29, 6, 0).is_err());
        assert!(RawBlockDescriptor::new(0, 29, 0, 36).is_err());
    }

    #[test]
    fn test_descriptor_specification() {
        let desc = RawBlockDescriptor::new(30, 62, 1, 17).unwrap();
        let spec = desc.specification();
        assert_eq!(spec.min_slice(), 17);
        assert_eq!(spec.max_slice(), 17);
        assert_eq!(spec.min_partition(), 1);
        assert_eq!(spec.max_partition(), 1);
        assert_eq!(desc.row_count(), 33);
    }
}
