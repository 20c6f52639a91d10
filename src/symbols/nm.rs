//! gmon-profile reader of `nm` symbol listings.
//!
//! Expects the output of
//!     `nm --defined-only --print-size --line-numbers <ELF file>`
//! where every symbol line reads `<address> [<size>] <type> <name>[\t<file>:<line>]`.
//! Only text symbols are kept. A symbol without a size extends up to the
//! next text symbol.

use std::io::BufRead;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use super::{Symbol, SymbolTable};
use crate::config::Address;
use crate::error::{Error, Result};
use crate::{filebuf, global};

const TEXT_TYPES: &[&str] = &["T", "t", "W", "w"];

/// Reads the listing file and returns the symbol table.
pub fn read(filepath: &Path) -> Result<SymbolTable> {
    if global::verbose() {
        tracing::info!("Reading symbol listing {:?}...", filepath);
    }
    let table = parse(filebuf::open(filepath)?)?;
    if global::verbose() {
        tracing::info!("Loaded {} symbols", table.len());
    }
    Ok(table)
}

/// A symbol line before its end address is known.
struct Entry {
    name: String,
    start: Address,
    size: Option<u64>,
    file: Option<String>,
}

/// Parses the listing line by line building the table.
pub fn parse(mut reader: impl BufRead) -> Result<SymbolTable> {
    lazy_static! {
        static ref SYMBOL: Regex = Regex::new(
            r"^([[:xdigit:]]+)\s+(?:([[:xdigit:]]+)\s+)?([[:alpha:]?])\s+([^\t]+?)(?:\t(.+?)(?::\d+)?)?\s*$"
        )
        .expect("Invalid regex");
        static ref UNDEFINED: Regex = Regex::new(r"^\s+[Uvw]\s+").expect("Invalid regex");
    }

    let mut line = String::with_capacity(256);
    let mut lc = 0_usize;
    let mut entries = Vec::new();

    while filebuf::read_line(&mut reader, &mut line)? != 0 {
        lc += 1;
        let text = line.trim_end_matches(['\r', '\n']);
        // Blank lines and object headers ("foo.o:") of archive listings
        if text.trim().is_empty() || text.ends_with(':') || UNDEFINED.is_match(text) {
            continue;
        }

        let caps = SYMBOL
            .captures(text)
            .ok_or_else(|| Error::SymbolParsing(text.to_string(), lc))?;
        if !TEXT_TYPES.contains(&&caps[3]) {
            continue;
        }
        let start = parse_hex(&caps[1], text, lc)?;
        let size = caps
            .get(2)
            .map(|m| parse_hex(m.as_str(), text, lc))
            .transpose()?;
        entries.push(Entry {
            name: caps[4].to_string(),
            start,
            size,
            file: caps.get(5).map(|m| m.as_str().to_string()),
        });
    }

    entries.sort_by_key(|e| e.start);
    let symbols = entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let end = match e.size {
                Some(size) => e.start.saturating_add(size),
                None => entries[i + 1..]
                    .iter()
                    .map(|next| next.start)
                    .find(|&next| next > e.start)
                    .unwrap_or_else(|| e.start.saturating_add(1)),
            };
            Symbol::new(e.name.clone(), e.start, end, e.file.clone())
        })
        .collect();

    Ok(SymbolTable::new(symbols))
}

fn parse_hex(s: &str, line: &str, lc: usize) -> Result<Address> {
    Address::from_str_radix(s, 16).map_err(|_| Error::SymbolParsing(line.to_string(), lc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock::PROGRAM_NM;
    use std::io::Cursor;

    #[test]
    fn listing_with_sizes() {
        let table = parse(Cursor::new(PROGRAM_NM)).unwrap();
        assert_eq!(table.len(), 4);
        let main = table.resolve_symbol(0x1050).unwrap();
        assert_eq!(main.name(), "main");
        assert_eq!(main.source_file(), Some("/src/main.c"));
        let b = table.resolve_symbol(0x12ff).unwrap();
        assert_eq!(b.name(), "b");
        assert_eq!(b.source_file(), Some("/src/rec.c"));
        let leaf = table.resolve_symbol(0x1300).unwrap();
        assert_eq!(leaf.source_file(), None);
        assert!(table.resolve(0x4000).is_none());
    }

    #[test]
    fn listing_without_sizes() {
        let listing = "\
main.o:
0000000000002000 T second
0000000000001000 T first
                 U printf

0000000000003000 T last
";
        let table = parse(Cursor::new(listing)).unwrap();
        let first = table.resolve_symbol(0x1fff).unwrap();
        assert_eq!(first.name(), "first");
        assert_eq!(first.end_address(), 0x2000);
        assert_eq!(table.resolve_symbol(0x2fff).unwrap().name(), "second");
        assert_eq!(table.resolve_symbol(0x3000).unwrap().name(), "last");
        assert!(table.resolve(0x3001).is_none());
    }

    #[test]
    fn symbols_at_the_top_of_the_address_space() {
        let listing = "\
ffffffffffff0000 T below
ffffffffffffff00 0000000000000200 T sized
ffffffffffffffff T top
";
        let table = parse(Cursor::new(listing)).unwrap();
        let below = table.resolve_symbol(0xffff_ffff_ffff_0000).unwrap();
        assert_eq!(below.end_address(), 0xffff_ffff_ffff_ff00);
        let sized = table.resolve_symbol(0xffff_ffff_ffff_fffe).unwrap();
        assert_eq!(sized.name(), "sized");
        assert_eq!(sized.end_address(), u64::MAX);
        // "top" cannot end past the last address and is left out as empty
        assert_eq!(table.len(), 2);
        assert_eq!(table.find("top"), None);
    }

    #[test]
    fn garbage_line() {
        let listing = "0000000000001000 T main\nnot a symbol line\n";
        match parse(Cursor::new(listing)) {
            Err(Error::SymbolParsing(line, lc)) => {
                assert_eq!(line, "not a symbol line");
                assert_eq!(lc, 2);
            }
            other => panic!("Unexpected result {:?}", other.map(|t| t.len())),
        }
    }
}
