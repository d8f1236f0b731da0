//! Hardware-address to pad-plane mapping.
//!
//! Each of the six readout partitions carries its own address table, sized
//! by the partition's front-end-card count (128 channels per FEC). Channels
//! are wired row-major across the partition's pad rows starting at address
//! zero; addresses past the wired range are reserved and resolve to the
//! `INVALID_COORD` sentinel.
//!
//! Tables are built once and shared read-only across all decoders; there is
//! no runtime mutation.

use std::sync::OnceLock;

use tpcaltro_core::{PadCoord, N_PARTITIONS};

use crate::error::{Error, Result};

/// Address-table size per partition (wired FECs × 128 channels).
pub const TABLE_SIZES: [usize; 6] = [3200, 3584, 3200, 3328, 3328, 3328];

/// Global pad-row range `(first, last)` covered by each partition.
pub const ROW_RANGES: [(u16, u16); 6] = [
    (0, 29),
    (30, 62),
    (63, 90),
    (91, 116),
    (117, 139),
    (140, 158),
];

/// Innermost-row pad count per partition; rows widen outward.
const BASE_PADS: [u16; 6] = [11, 12, 14, 15, 16, 18];

/// Number of pads in `local_row` of `partition`.
///
/// The pad plane is trapezoidal: one extra pad every second row.
#[inline]
pub fn pad_count(partition: u8, local_row: u16) -> u16 {
    BASE_PADS[partition as usize] + (local_row + 1) / 2
}

/// Number of pad rows in a partition.
#[inline]
pub fn row_count(partition: u8) -> u16 {
    let (first, last) = ROW_RANGES[partition as usize];
    last - first + 1
}

/// Widest row of a partition (the outermost one).
#[inline]
pub fn max_pad_count(partition: u8) -> u16 {
    pad_count(partition, row_count(partition) - 1)
}

/// The static per-partition hardware-address tables.
pub struct PadPlaneMapping {
    tables: [Vec<PadCoord>; 6],
}

static MAPPING: OnceLock<PadPlaneMapping> = OnceLock::new();

impl PadPlaneMapping {
    /// Builds the tables from the embedded pad-plane description.
    pub fn load() -> Self {
        let tables = std::array::from_fn(|p| Self::build_partition(p as u8));
        Self { tables }
    }

    /// The process-wide shared mapping, built on first use.
    pub fn global() -> &'static PadPlaneMapping {
        MAPPING.get_or_init(PadPlaneMapping::load)
    }

    fn build_partition(partition: u8) -> Vec<PadCoord> {
        let mut table = vec![PadCoord::invalid(); TABLE_SIZES[partition as usize]];
        let (first_row, _) = ROW_RANGES[partition as usize];
        let mut addr = 0usize;
        for local_row in 0..row_count(partition) {
            for pad in 0..pad_count(partition, local_row) {
                table[addr] = PadCoord::new(first_row + local_row, pad);
                addr += 1;
            }
        }
        table
    }

    /// Upper bound of the partition's address table.
    #[inline]
    pub fn max_hw_address(&self, partition: u8) -> u16 {
        TABLE_SIZES[partition as usize] as u16
    }

    /// Global pad row for a hardware address, or [`INVALID_COORD`].
    #[inline]
    pub fn row(&self, partition: u8, hw_address: u16) -> u16 {
        self.coord(partition, hw_address).row
    }

    /// Pad within the row for a hardware address, or [`INVALID_COORD`].
    #[inline]
    pub fn pad(&self, partition: u8, hw_address: u16) -> u16 {
        self.coord(partition, hw_address).pad
    }

    /// Full coordinate lookup; the sentinel coordinate when the address is
    /// outside the table or reserved.
    pub fn coord(&self, partition: u8, hw_address: u16) -> PadCoord {
        if partition >= N_PARTITIONS {
            return PadCoord::invalid();
        }
        self.tables[partition as usize]
            .get(hw_address as usize)
            .copied()
            .unwrap_or_else(PadCoord::invalid)
    }

    /// Reverse lookup: the hardware address wired to `(row, pad)`.
    ///
    /// `row` is the global pad row; it must fall inside the partition.
    pub fn hw_address(&self, partition: u8, row: u16, pad: u16) -> Result<u16> {
        if partition >= N_PARTITIONS {
            return Err(tpcaltro_core::Error::InvalidPartition(partition).into());
        }
        let (first_row, last_row) = ROW_RANGES[partition as usize];
        if row < first_row || row > last_row {
            return Err(tpcaltro_core::Error::InvalidRow { partition, row }.into());
        }
        let local_row = row - first_row;
        if pad >= pad_count(partition, local_row) {
            return Err(Error::UnmappedHardwareAddress {
                partition,
                hw_address: u16::MAX,
            });
        }
        let mut addr: u16 = 0;
        for r in 0..local_row {
            addr += pad_count(partition, r);
        }
        Ok(addr + pad)
    }

    /// Number of wired (populated) addresses in a partition.
    pub fn wired_count(&self, partition: u8) -> usize {
        (0..row_count(partition))
            .map(|r| pad_count(partition, r) as usize)
            .sum()
    }
}
