//! Memory-mapped raw file readers.
//!

use memmap2::Mmap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tpcaltro_core::RawBlockDescriptor;
use tpcaltro_raw::mapping::ROW_RANGES;
use tpcaltro_raw::{DecodedBlock, DecoderConfig, DigitDecoder};

use crate::{Error, Result};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without loading the entire file
/// into memory.
pub struct MappedFileReader {
    mmap: Arc<Mmap>,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not
        // modified concurrently. This is the standard safety contract for
        // memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap: Arc::new(mmap),
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// The path the reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One raw DDL file of a run: the block bytes plus their provenance.
pub struct RawEventFile {
    reader: MappedFileReader,
    descriptor: RawBlockDescriptor,
}

impl RawEventFile {
    /// Opens a raw file for the given slice and partition.
    pub fn open<P: AsRef<Path>>(path: P, slice: u8, partition: u8) -> Result<Self> {
        let descriptor = descriptor_for(slice, partition)?;
        Ok(Self {
            reader: MappedFileReader::open(path)?,
            descriptor,
        })
    }

    /// The block bytes.
    pub fn bytes(&self) -> &[u8] {
        self.reader.as_bytes()
    }

    /// The block provenance.
    pub fn descriptor(&self) -> RawBlockDescriptor {
        self.descriptor
    }

    /// Decodes the whole file into digits.
    pub fn decode(&self, config: &DecoderConfig) -> Result<DecodedBlock> {
        let mut driver = DigitDecoder::new(*config);
        Ok(driver.decode_block(self.bytes(), self.descriptor)?)
    }
}

/// Builds the descriptor for a slice/partition pair from the pad-plane
/// row ranges.
pub fn descriptor_for(slice: u8, partition: u8) -> Result<RawBlockDescriptor> {
    if usize::from(partition) >= ROW_RANGES.len() {
        return Err(Error::Core(tpcaltro_core::Error::InvalidPartition(
            partition,
        )));
    }
    let (first_row, last_row) = ROW_RANGES[partition as usize];
    Ok(RawBlockDescriptor::new(
        first_row, last_row, partition, slice,
    )?)
}

/// One entry of a run description: a raw file and where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFileEntry {
    /// Path to the raw DDL payload file.
    pub path: PathBuf,
    /// TPC slice.
    pub slice: u8,
    /// Readout partition.
    pub partition: u8,
}

/// A run description: the list of raw files of one event or run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDescription {
    /// Raw files to process.
    pub files: Vec<RunFileEntry>,
}

impl RunDescription {
    /// Loads a run description from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// Opens every listed file.
    pub fn open_all(&self) -> Result<Vec<RawEventFile>> {
        self.files
            .iter()
            .map(|entry| RawEventFile::open(&entry.path, entry.slice, entry.partition))
            .collect()
    }
}

/// Decodes independent raw files in parallel.
///
/// Blocks are independent units (spec ordering holds only within a block),
/// so this is a plain data-parallel fan-out over the shared read-only
/// address tables.
pub fn decode_files(
    files: &[RawEventFile],
    config: &DecoderConfig,
) -> Vec<Result<DecodedBlock>> {
    files
        .par_iter()
        .map(|file| file.decode(config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tpcaltro_raw::{AltroEncoder, PadPlaneMapping, RcuFormat, CDH_BYTES};

    fn write_block(path: &Path) {
        let mapping = PadPlaneMapping::global();
        let hw = mapping.hw_address(0, 3, 7).unwrap();
        let mut buf = vec![0u8; 1024];
        let mut encoder = AltroEncoder::new(&mut buf);
        encoder.write_cdh(&[0u8; CDH_BYTES]).unwrap();
        encoder
            .add_channel(hw, &[(46, 10), (47, 20), (48, 30)])
            .unwrap();
        let len = encoder.finish(RcuFormat::Current, 446).unwrap();
        std::fs::File::create(path)
            .unwrap()
            .write_all(&buf[..len])
            .unwrap();
    }

    #[test]
    fn test_mapped_raw_file_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice00_partition0.raw");
        write_block(&path);

        let file = RawEventFile::open(&path, 0, 0).unwrap();
        assert_eq!(file.descriptor().first_row, 0);
        assert_eq!(file.descriptor().last_row, 29);

        let decoded = file.decode(&DecoderConfig::default()).unwrap();
        assert_eq!(decoded.digits.len(), 3);
        assert_eq!(decoded.digits[0].row, 3);
        assert_eq!(decoded.digits[0].pad, 7);
    }

    #[test]
    fn test_run_description_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("p1.raw");
        write_block(&raw_path);

        let description = RunDescription {
            files: vec![RunFileEntry {
                path: raw_path,
                slice: 0,
                partition: 0,
            }],
        };
        let json_path = dir.path().join("run.json");
        std::fs::write(&json_path, serde_json::to_string(&description).unwrap()).unwrap();

        let loaded = RunDescription::from_file(&json_path).unwrap();
        let files = loaded.open_all().unwrap();
        assert_eq!(files.len(), 1);
        let results = decode_files(&files, &DecoderConfig::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().digits.len(), 3);
    }

    #[test]
    fn test_invalid_partition_rejected() {
        assert!(descriptor_for(0, 6).is_err());
    }
}
