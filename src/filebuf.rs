//! gmon-profile file buffered utilities module.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Opens a file for buffered reading.
pub fn open(filepath: &Path) -> Result<BufReader<File>> {
    let file = File::open(filepath).map_err(|e| Error::OpenFile(e, filepath.into()))?;
    Ok(BufReader::new(file))
}

/// Reads a whole binary file (a gmon dump) into memory.
pub fn read_bytes(filepath: &Path) -> Result<Vec<u8>> {
    let mut reader = open(filepath)?;
    let mut bytes = Vec::with_capacity(reader.get_ref().metadata().map_or(0, |m| m.len() as usize));
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| Error::OpenFile(e, filepath.into()))?;
    Ok(bytes)
}

/// Opens a file for buffered writing; truncates existing.
pub fn open_w(filepath: &Path) -> Result<impl Write> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(filepath)
        .map_err(|e| Error::OpenFile(e, filepath.into()))?;
    Ok(BufWriter::new(file))
}

/// Reads one line of a text listing into the buffer, replacing its contents.
/// Returns the number of bytes read, zero at end of input.
pub fn read_line(reader: &mut impl BufRead, line: &mut String) -> Result<usize> {
    line.clear();
    reader
        .read_line(line)
        .map_err(|e| Error::ReadLine(e, line.clone()))
}
