//! gmon-profile config module.

/// Exit code of a failed run.
pub const FAILURE: i32 = 1;

/// Report formats.
pub const FORMATS: &[&str] = &["tree", "callgraph", "callgrind"];
/// Report format used unless another is asked for.
pub const DEFAULT_FORMAT: &str = "tree";

/// Byte orders accepted on the command line.
pub const BYTE_ORDERS: &[&str] = &["little", "big"];
/// Byte order of the most common targets.
pub const DEFAULT_BYTE_ORDER: &str = "little";

/// Address widths accepted on the command line.
pub const ADDRESS_SIZES: &[&str] = &["4", "8"];
/// Address width of 64-bit targets.
pub const DEFAULT_ADDRESS_SIZE: &str = "8";

/// Histogram counter widths accepted on the command line.
pub const COUNTER_SIZES: &[&str] = &["2", "4"];
/// Histogram counter width of GNU gmon version 1.
pub const DEFAULT_COUNTER_SIZE: &str = "2";

/// Magic bytes opening every gmon file.
pub const GMON_MAGIC: &[u8; 4] = b"gmon";
/// Address widths the decoder understands, in bytes.
pub const GMON_ADDRESS_SIZES: &[usize] = &[4, 8];
/// Histogram counter widths the decoder understands, in bytes.
pub const GMON_COUNTER_SIZES: &[usize] = &[2, 4];
/// Gmon versions the decoder understands.
pub const GMON_VERSIONS: &[u32] = &[1];
/// Spare bytes after the version word.
pub const GMON_HEADER_SPARE: usize = 12;
/// Length of the NUL-padded histogram dimension field.
pub const GMON_DIMENSION_LEN: usize = 15;

/// Tag of a time histogram record.
pub const TAG_TIME_HIST: u8 = 0;
/// Tag of a call graph arc record.
pub const TAG_CG_ARC: u8 = 1;
/// Tag of a basic block counts record.
pub const TAG_BB_COUNT: u8 = 2;

/// Address in the profiled program.
pub type Address = u64;
/// Position in an arena.
pub type Index = usize;

/// Map with no ordering guarantees.
#[cfg(not(test))]
pub type Map<K, V> = std::collections::HashMap<K, V>;

/// Map with deterministic iteration order.
// Use less performant BTree in tests for deterministic sequences
#[cfg(test)]
pub type Map<K, V> = std::collections::BTreeMap<K, V>;

/// Indentation of nested report lines.
pub const PADDING: &str = "    ";
