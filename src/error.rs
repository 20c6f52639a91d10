//! gmon-profile error module.

use std::io;
use std::path::PathBuf;

/// Represents errors of the decoder and aggregator.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A file cannot be opened.
    #[error("Cannot open file '{1}': {0}")]
    OpenFile(#[source] io::Error, PathBuf),
    /// A line of a text file cannot be read.
    #[error("Cannot read line '{1}': {0}")]
    ReadLine(#[source] io::Error, String),
    /// Any other I/O failure.
    #[error("Input/output error: {0}")]
    Io(#[from] io::Error),

    /// The gmon file contradicts its format.
    #[error("Malformed gmon file at offset {offset}: expected {expected}, found {actual}")]
    MalformedGmonFile {
        /// Byte offset of the offending field or record.
        offset: usize,
        /// What the format allows there.
        expected: String,
        /// What the file holds.
        actual: String,
    },
    /// The gmon file ends in the middle of a record.
    #[error("Truncated record at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedRecord {
        /// Byte offset of the incomplete field.
        offset: usize,
        /// Bytes the field needs.
        needed: usize,
        /// Bytes left in the input.
        available: usize,
    },
    /// No symbol contains an address of a call arc.
    #[error("Unresolved address 0x{address:x} ({context})")]
    UnresolvedAddress {
        /// The address without a symbol.
        address: u64,
        /// Arc the address was read from.
        context: String,
    },
    /// The decoding layout has widths the decoder cannot read.
    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),
    /// A defect of the call graph builder.
    #[error("Internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// A line of a symbol listing has an unknown shape.
    #[error("Cannot parse symbol line '{0}' at line {1}")]
    SymbolParsing(String, usize),
    /// Every file of a batch failed.
    #[error("None of the {0} input files could be decoded")]
    NoInput(usize),
}

impl Error {
    /// Checks if the error is a defect of the crate rather than of its input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::InternalInconsistency(_))
    }
}

/// Represents results.
pub type Result<T> = std::result::Result<T, Error>;
