//! gmon-profile decoder of gmon files.
//!
//! A gmon file starts with a 20 bytes header (magic `gmon`, version word,
//! spare bytes) followed by tagged records:
//!
//! * `0` time histogram: `low_pc`, `high_pc`, bucket count, sample rate,
//!   dimension and its abbreviation, then the bucket counters;
//! * `1` call graph arc: `from_pc`, `self_pc`, call count;
//! * `2` basic block counts: number of blocks, then (address, count) pairs.
//!
//! Multi-byte fields use the byte order of the profiled target, and addresses
//! have the width of its pointers, so both come from a [`Layout`] supplied by
//! the caller. Decoding performs no symbol resolution.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::config::{
    Address, GMON_ADDRESS_SIZES, GMON_COUNTER_SIZES, GMON_DIMENSION_LEN, GMON_HEADER_SPARE,
    GMON_MAGIC, GMON_VERSIONS, TAG_BB_COUNT, TAG_CG_ARC, TAG_TIME_HIST,
};
use crate::error::{Error, Result};
use crate::filebuf;

/// Byte order of the multi-byte fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl FromStr for ByteOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "little" | "le" => Ok(ByteOrder::Little),
            "big" | "be" => Ok(ByteOrder::Big),
            _ => Err(format!("Unknown byte order '{}'", s)),
        }
    }
}

/// Describes the widths and order of fields in a gmon file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Byte order of the profiled target.
    pub byte_order: ByteOrder,
    /// Width of an address (4 or 8 bytes).
    pub address_size: usize,
    /// Width of a histogram counter (2 bytes in GNU gmon version 1).
    pub counter_size: usize,
    /// Accepted values of the header version word.
    pub versions: &'static [u32],
}

impl Default for Layout {
    fn default() -> Self {
        Self::gnu_v1(ByteOrder::Little, 8)
    }
}

impl Layout {
    /// Creates the layout of GNU gmon version 1 for a target.
    pub const fn gnu_v1(byte_order: ByteOrder, address_size: usize) -> Self {
        Self {
            byte_order,
            address_size,
            counter_size: 2,
            versions: GMON_VERSIONS,
        }
    }

    /// Returns the layout with another histogram counter width.
    pub fn with_counter_size(mut self, counter_size: usize) -> Self {
        self.counter_size = counter_size;
        self
    }

    /// Checks that the widths of the layout can be decoded.
    pub fn validate(&self) -> Result<()> {
        if !GMON_ADDRESS_SIZES.contains(&self.address_size) {
            return Err(Error::UnsupportedLayout(format!(
                "address size {} (expected one of {:?})",
                self.address_size, GMON_ADDRESS_SIZES
            )));
        }
        if !GMON_COUNTER_SIZES.contains(&self.counter_size) {
            return Err(Error::UnsupportedLayout(format!(
                "counter size {} (expected one of {:?})",
                self.counter_size, GMON_COUNTER_SIZES
            )));
        }
        if self.versions.is_empty() {
            return Err(Error::UnsupportedLayout("no gmon version accepted".into()));
        }
        Ok(())
    }
}

/// Header of a gmon file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version word.
    pub version: u32,
}

/// Time histogram description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramRecord {
    /// First address covered by the histogram.
    pub low_pc: Address,
    /// Address right after the covered range.
    pub high_pc: Address,
    /// Number of counters splitting the range.
    pub bucket_count: u32,
    /// Samples per second.
    pub sample_rate: u32,
    /// Unit of the samples, usually "seconds".
    pub dimension: String,
    /// One letter abbreviation of the dimension.
    pub dimension_abbrev: char,
}

impl HistogramRecord {
    /// Returns the (possibly fractional) number of bytes covered by one bucket.
    pub fn bucket_width(&self) -> f64 {
        if self.bucket_count == 0 {
            return 0.0;
        }
        (self.high_pc - self.low_pc) as f64 / f64::from(self.bucket_count)
    }

    /// Returns the start address of a bucket.
    pub fn bucket_address(&self, index: u32) -> Address {
        if self.bucket_count == 0 {
            return self.low_pc;
        }
        let span = u128::from(self.high_pc - self.low_pc);
        let offset = span * u128::from(index) / u128::from(self.bucket_count);
        self.low_pc + offset as Address
    }

    /// Checks if both records describe the same address range and bucket grid.
    pub fn same_range(&self, other: &HistogramRecord) -> bool {
        self.low_pc == other.low_pc
            && self.high_pc == other.high_pc
            && self.bucket_count == other.bucket_count
    }
}

/// One histogram slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Position of the slot in the histogram.
    pub index: u32,
    /// Samples taken while the program counter was in the slot.
    pub sample_count: u32,
}

/// Call graph arc as stored in the file: call site address in the caller,
/// entry address of the callee, number of calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawArc {
    /// Return address inside the caller.
    pub from_pc: Address,
    /// Entry address of the callee.
    pub self_pc: Address,
    /// Number of calls.
    pub count: u64,
}

/// Execution count of a basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicBlockCount {
    /// Start address of the block.
    pub address: Address,
    /// Number of times the block ran.
    pub count: u64,
}

/// All records of one gmon file.
#[derive(Debug, Clone, PartialEq)]
pub struct GmonData {
    /// Header of the file.
    pub header: Header,
    /// Histogram description; repeated records are summed into one.
    pub histogram: Option<HistogramRecord>,
    /// Histogram counters in address order.
    pub buckets: Vec<Bucket>,
    /// Arcs in file order.
    pub arcs: Vec<RawArc>,
    /// Basic block counts of all records.
    pub basic_blocks: Vec<BasicBlockCount>,
}

impl GmonData {
    /// Returns the sum of all bucket counters.
    pub fn total_samples(&self) -> u64 {
        self.buckets.iter().map(|b| u64::from(b.sample_count)).sum()
    }
}

impl fmt::Display for GmonData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "version: {}", self.header.version)?;
        if let Some(h) = &self.histogram {
            writeln!(
                f,
                "histogram: 0x{:x}-0x{:x} buckets={} rate={} dimension={} ({})",
                h.low_pc, h.high_pc, h.bucket_count, h.sample_rate, h.dimension, h.dimension_abbrev
            )?;
            for b in self.buckets.iter().filter(|b| b.sample_count != 0) {
                writeln!(
                    f,
                    "bucket {} 0x{:x}: {}",
                    b.index,
                    h.bucket_address(b.index),
                    b.sample_count
                )?;
            }
        }
        for a in &self.arcs {
            writeln!(f, "arc 0x{:x} -> 0x{:x}: {}", a.from_pc, a.self_pc, a.count)?;
        }
        for bb in &self.basic_blocks {
            writeln!(f, "block 0x{:x}: {}", bb.address, bb.count)?;
        }
        Ok(())
    }
}

/// Reads and decodes a gmon file.
pub fn read(filepath: &Path, layout: &Layout) -> Result<GmonData> {
    tracing::debug!("gmon::read {:?}", filepath);
    let bytes = filebuf::read_bytes(filepath)?;
    decode(&bytes, layout)
}

/// Decodes the bytes of a gmon file.
pub fn decode(bytes: &[u8], layout: &Layout) -> Result<GmonData> {
    layout.validate()?;
    let mut input = Input::new(bytes, layout);
    let header = input.header()?;

    let mut data = GmonData {
        header,
        histogram: None,
        buckets: Vec::new(),
        arcs: Vec::new(),
        basic_blocks: Vec::new(),
    };

    while !input.is_empty() {
        let offset = input.pos;
        match input.u8()? {
            TAG_TIME_HIST => input.histogram(&mut data, offset)?,
            TAG_CG_ARC => data.arcs.push(input.arc()?),
            TAG_BB_COUNT => input.basic_blocks(&mut data.basic_blocks)?,
            tag => {
                return Err(Error::MalformedGmonFile {
                    offset,
                    expected: format!(
                        "record tag {}, {} or {}",
                        TAG_TIME_HIST, TAG_CG_ARC, TAG_BB_COUNT
                    ),
                    actual: format!("tag {}", tag),
                })
            }
        }
    }

    tracing::debug!(
        "Decoded {} buckets, {} arcs, {} basic blocks",
        data.buckets.len(),
        data.arcs.len(),
        data.basic_blocks.len()
    );
    Ok(data)
}

/// Cursor over the input bytes.
struct Input<'a> {
    bytes: &'a [u8],
    pos: usize,
    layout: &'a Layout,
}

impl<'a> Input<'a> {
    fn new(bytes: &'a [u8], layout: &'a Layout) -> Self {
        Self {
            bytes,
            pos: 0,
            layout,
        }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn available(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    /// Fails unless `needed` more bytes can be read from the current position.
    fn ensure(&self, needed: usize) -> Result<()> {
        if needed > self.available() {
            return Err(Error::TruncatedRecord {
                offset: self.pos,
                needed,
                available: self.available(),
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads an unsigned integer of `size` bytes in the layout byte order.
    fn uint(&mut self, size: usize) -> Result<u64> {
        let raw = self.take(size)?;
        let mut buf = [0_u8; 8];
        let value = match self.layout.byte_order {
            ByteOrder::Little => {
                buf[..size].copy_from_slice(raw);
                u64::from_le_bytes(buf)
            }
            ByteOrder::Big => {
                buf[8 - size..].copy_from_slice(raw);
                u64::from_be_bytes(buf)
            }
        };
        Ok(value)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(self.uint(4)? as u32)
    }

    fn address(&mut self) -> Result<Address> {
        self.uint(self.layout.address_size)
    }

    fn header(&mut self) -> Result<Header> {
        let magic = self.take(GMON_MAGIC.len()).map_err(|_| Error::MalformedGmonFile {
            offset: 0,
            expected: format!("magic {:?}", String::from_utf8_lossy(GMON_MAGIC)),
            actual: format!("{} bytes of input", self.bytes.len()),
        })?;
        if magic != GMON_MAGIC {
            return Err(Error::MalformedGmonFile {
                offset: 0,
                expected: format!("magic {:?}", String::from_utf8_lossy(GMON_MAGIC)),
                actual: format!("{:?}", String::from_utf8_lossy(magic)),
            });
        }

        let offset = self.pos;
        let version = self.u32()?;
        if !self.layout.versions.contains(&version) {
            return Err(Error::MalformedGmonFile {
                offset,
                expected: format!("version {:?}", self.layout.versions),
                actual: format!("version {}", version),
            });
        }
        self.take(GMON_HEADER_SPARE)?;
        Ok(Header { version })
    }

    /// Reads a histogram record; a repeated record over the same range adds
    /// its counters to the first one.
    fn histogram(&mut self, data: &mut GmonData, offset: usize) -> Result<()> {
        let low_pc = self.address()?;
        let high_pc = self.address()?;
        let bucket_count = self.u32()?;
        let sample_rate = self.u32()?;
        let dimension = self.take(GMON_DIMENSION_LEN)?;
        let dimension = String::from_utf8_lossy(dimension)
            .trim_end_matches('\0')
            .trim()
            .to_string();
        let dimension_abbrev = char::from(self.u8()?);

        if high_pc < low_pc || (bucket_count == 0 && high_pc != low_pc) {
            return Err(Error::MalformedGmonFile {
                offset,
                expected: "histogram with low_pc <= high_pc and at least one bucket".into(),
                actual: format!(
                    "low_pc=0x{:x} high_pc=0x{:x} buckets={}",
                    low_pc, high_pc, bucket_count
                ),
            });
        }

        let record = HistogramRecord {
            low_pc,
            high_pc,
            bucket_count,
            sample_rate,
            dimension,
            dimension_abbrev,
        };

        let counter_size = self.layout.counter_size;
        self.ensure((bucket_count as usize).saturating_mul(counter_size))?;
        let counts = (0..bucket_count)
            .map(|_| self.uint(counter_size).map(|c| c as u32))
            .collect::<Result<Vec<_>>>()?;

        let first = match data.histogram.take() {
            Some(first) => first,
            None => {
                data.buckets = counts
                    .into_iter()
                    .enumerate()
                    .map(|(index, sample_count)| Bucket {
                        index: index as u32,
                        sample_count,
                    })
                    .collect();
                data.histogram = Some(record);
                return Ok(());
            }
        };

        if !first.same_range(&record) {
            return Err(Error::MalformedGmonFile {
                offset,
                expected: format!(
                    "histogram over 0x{:x}-0x{:x} with {} buckets",
                    first.low_pc, first.high_pc, first.bucket_count
                ),
                actual: format!(
                    "0x{:x}-0x{:x} with {} buckets",
                    record.low_pc, record.high_pc, record.bucket_count
                ),
            });
        }
        tracing::debug!("Merging repeated histogram record at offset {}", offset);
        for (bucket, count) in data.buckets.iter_mut().zip(counts) {
            bucket.sample_count = bucket.sample_count.saturating_add(count);
        }
        data.histogram = Some(first);
        Ok(())
    }

    fn arc(&mut self) -> Result<RawArc> {
        let from_pc = self.address()?;
        let self_pc = self.address()?;
        let count = u64::from(self.u32()?);
        Ok(RawArc {
            from_pc,
            self_pc,
            count,
        })
    }

    fn basic_blocks(&mut self, blocks: &mut Vec<BasicBlockCount>) -> Result<()> {
        let n = self.u32()? as usize;
        self.ensure(n.saturating_mul(2 * self.layout.address_size))?;
        blocks.reserve(n);
        for _ in 0..n {
            let address = self.address()?;
            let count = self.address()?;
            blocks.push(BasicBlockCount { address, count });
        }
        Ok(())
    }
}
