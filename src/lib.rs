//! gmon-profile library.
//!
//! Decodes gprof gmon files and aggregates them, with the symbols of the
//! profiled program, into a read-only tree of files and symbols carrying self
//! time, cumulative time and the call graph:
//!
//! ```no_run
//! use gmon_profile::{gmon, samples::Samples, symbols, tree::Profile};
//! # fn main() -> gmon_profile::error::Result<()> {
//! let table = symbols::nm::read("symbols.txt".as_ref())?;
//! let data = gmon::read("gmon.out".as_ref(), &gmon::Layout::default())?;
//! let profile = Profile::build(&table, Samples::from_gmon(&data, &table))?;
//! for file in profile.files() {
//!     for symbol in file.symbols() {
//!         println!("{} {:.2}%", symbol.name(), symbol.percentage());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(warnings)]
#![warn(missing_docs)]

pub mod batch;
pub mod callgraph;
pub mod config;
pub mod error;
pub mod filebuf;
pub mod global;
pub mod gmon;
pub mod histogram;
pub mod report;
pub mod samples;
pub mod symbols;
pub mod tree;

#[cfg(test)]
mod tests;
