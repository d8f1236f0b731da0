//! Calibration record output.
//!
//! Records are written as JSON lines, one serialized record per line, so
//! partial runs remain readable and files concatenate trivially.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::Result;

/// Line-oriented JSON writer for calibration and quality records.
pub struct JsonLinesWriter {
    writer: BufWriter<File>,
    records: usize,
}

impl JsonLinesWriter {
    /// Creates (or truncates) the output file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            records: 0,
        })
    }

    /// Appends one record.
    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn count(&self) -> usize {
        self.records
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Record {
        pad: u16,
        value: f64,
    }

    #[test]
    fn test_json_lines_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        let mut writer = JsonLinesWriter::create(&path).unwrap();
        writer.write(&Record { pad: 1, value: 0.5 }).unwrap();
        writer.write(&Record { pad: 2, value: 1.5 }).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let records: Vec<Record> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(
            records,
            vec![
                Record { pad: 1, value: 0.5 },
                Record { pad: 2, value: 1.5 }
            ]
        );
    }
}
