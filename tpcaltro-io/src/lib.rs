//! tpcaltro-io: Memory-mapped raw file access and record output.

pub mod error;
pub mod reader;
pub mod writer;

pub use error::{Error, Result};
pub use reader::{
    decode_files, descriptor_for, MappedFileReader, RawEventFile, RunDescription, RunFileEntry,
};
pub use writer::JsonLinesWriter;
