//! gmon-profile symbol table.
//!
//! The table is the only view of the profiled binary the aggregation needs:
//! it resolves an address to the symbol whose range contains it. Symbols are
//! loaded once by an external reader (see [`nm`] for the text listing reader)
//! and afterwards referenced by [`SymbolId`].

pub mod nm;

use std::collections::BTreeSet;
use std::fmt;

use crate::config::{Address, Index};

/// A function of the profiled program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    name: String,
    start_address: Address,
    end_address: Address,
    source_file: Option<String>,
}

impl Symbol {
    /// Creates new symbol covering `[start_address, end_address)`.
    pub fn new(
        name: impl Into<String>,
        start_address: Address,
        end_address: Address,
        source_file: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            start_address,
            end_address,
            source_file,
        }
    }

    /// Returns the name of the symbol.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the first address of the symbol.
    pub fn start_address(&self) -> Address {
        self.start_address
    }

    /// Returns the address right after the symbol.
    pub fn end_address(&self) -> Address {
        self.end_address
    }

    /// Returns the source file the symbol is defined in, if known.
    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    /// Returns the number of bytes covered by the symbol.
    pub fn size(&self) -> u64 {
        self.end_address - self.start_address
    }

    /// Checks if the address belongs to the symbol.
    pub fn contains(&self, address: Address) -> bool {
        self.start_address <= address && address < self.end_address
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} [0x{:x}-0x{:x}]",
            self.name, self.start_address, self.end_address
        )
    }
}

/// Index of a symbol in its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(usize);

impl SymbolId {
    /// Returns the position of the symbol in its table.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Symbols sorted ascending by start address.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    /// Disjoint address ranges, each given by its start, with the narrowest
    /// symbol covering the whole range.
    segments: Vec<(Address, Option<Index>)>,
}

impl SymbolTable {
    /// Creates the table; symbols with an empty range are dropped.
    pub fn new(mut symbols: Vec<Symbol>) -> Self {
        let before = symbols.len();
        symbols.retain(|s| s.start_address < s.end_address);
        if symbols.len() != before {
            tracing::debug!("Dropped {} empty symbols", before - symbols.len());
        }
        symbols.sort_by(|x, y| {
            x.start_address
                .cmp(&y.start_address)
                .then(y.end_address.cmp(&x.end_address))
                .then_with(|| x.name.cmp(&y.name))
        });
        let segments = segments(&symbols);
        Self { symbols, segments }
    }

    /// Returns the number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Checks if the table has no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Returns the symbol by its id.
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    /// Iterates symbols in address order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter().enumerate().map(|(i, s)| (SymbolId(i), s))
    }

    /// Returns the first symbol with the name.
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.symbols.iter().position(|s| s.name == name).map(SymbolId)
    }

    /// Takes an address and returns the narrowest symbol containing it.
    /// Among equally narrow symbols the one starting first wins.
    pub fn resolve(&self, address: Address) -> Option<SymbolId> {
        let end = self
            .segments
            .partition_point(|(start, _)| *start <= address);
        end.checked_sub(1)
            .and_then(|i| self.segments[i].1)
            .map(SymbolId)
    }

    /// Same as `resolve` but returns the symbol itself.
    pub fn resolve_symbol(&self, address: Address) -> Option<&Symbol> {
        self.resolve(address).map(|id| self.symbol(id))
    }
}

/// Splits the address space at every symbol boundary and picks the narrowest
/// symbol of each piece. Symbols must be sorted as in the table.
fn segments(symbols: &[Symbol]) -> Vec<(Address, Option<Index>)> {
    let mut ends: Vec<Index> = (0..symbols.len()).collect();
    ends.sort_by_key(|&i| symbols[i].end_address);

    let mut bounds: Vec<Address> = symbols
        .iter()
        .flat_map(|s| [s.start_address, s.end_address])
        .collect();
    bounds.sort_unstable();
    bounds.dedup();

    // Covering symbols ordered by (size, position in the table)
    let mut active: BTreeSet<(u64, Index)> = BTreeSet::new();
    let mut segments: Vec<(Address, Option<Index>)> = Vec::with_capacity(bounds.len());
    let (mut next_start, mut next_end) = (0, 0);
    for bound in bounds {
        while next_end < ends.len() && symbols[ends[next_end]].end_address == bound {
            let i = ends[next_end];
            active.remove(&(symbols[i].size(), i));
            next_end += 1;
        }
        while next_start < symbols.len() && symbols[next_start].start_address == bound {
            active.insert((symbols[next_start].size(), next_start));
            next_start += 1;
        }
        let owner = active.iter().next().map(|&(_, i)| i);
        if segments.last().map_or(true, |&(_, last)| last != owner) {
            segments.push((bound, owner));
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock::symbol;

    fn name(table: &SymbolTable, address: Address) -> Option<&str> {
        table.resolve_symbol(address).map(Symbol::name)
    }

    #[test]
    fn resolve_ranges() {
        let table = SymbolTable::new(vec![
            symbol("bar", 0x1020, 0x1040, None),
            symbol("foo", 0x1000, 0x1020, None),
            symbol("baz", 0x1080, 0x1090, None),
        ]);
        assert_eq!(name(&table, 0xfff), None);
        assert_eq!(name(&table, 0x1000), Some("foo"));
        assert_eq!(name(&table, 0x101f), Some("foo"));
        assert_eq!(name(&table, 0x1020), Some("bar"));
        assert_eq!(name(&table, 0x1040), None);
        assert_eq!(name(&table, 0x1085), Some("baz"));
        assert_eq!(name(&table, 0x1090), None);
    }

    #[test]
    fn narrowest_wins() {
        let table = SymbolTable::new(vec![
            symbol("outer", 0x1000, 0x2000, None),
            symbol("inner", 0x1400, 0x1500, None),
            symbol("alias_b", 0x3000, 0x3010, None),
            symbol("alias_a", 0x3000, 0x3010, None),
        ]);
        assert_eq!(name(&table, 0x1100), Some("outer"));
        assert_eq!(name(&table, 0x1400), Some("inner"));
        assert_eq!(name(&table, 0x1600), Some("outer"));
        assert_eq!(name(&table, 0x3008), Some("alias_a"));
    }

    #[test]
    fn section_alias_does_not_hide_functions() {
        let mut symbols: Vec<Symbol> = (0..1000_u64)
            .map(|i| {
                let start = 0x1000 + i * 0x10;
                symbol(&format!("f{}", i), start, start + 0x8, None)
            })
            .collect();
        symbols.push(symbol("_text", 0x1000, 0x1000 + 1000 * 0x10, None));
        let table = SymbolTable::new(symbols);

        assert_eq!(name(&table, 0x1000), Some("f0"));
        assert_eq!(name(&table, 0x1008), Some("_text"));
        assert_eq!(name(&table, 0x1000 + 999 * 0x10 + 7), Some("f999"));
        assert_eq!(name(&table, 0x1000 + 999 * 0x10 + 8), Some("_text"));
        assert_eq!(name(&table, 0x1000 + 1000 * 0x10), None);
    }

    #[test]
    fn overlapping_symbols() {
        let table = SymbolTable::new(vec![
            symbol("left", 0x1000, 0x1100, None),
            symbol("right", 0x1080, 0x1140, None),
        ]);
        assert_eq!(name(&table, 0x107f), Some("left"));
        // both cover it, the narrower one wins
        assert_eq!(name(&table, 0x1080), Some("right"));
        assert_eq!(name(&table, 0x10ff), Some("right"));
        assert_eq!(name(&table, 0x1100), Some("right"));
        assert_eq!(name(&table, 0x113f), Some("right"));
        assert_eq!(name(&table, 0x1140), None);
    }

    #[test]
    fn empty_symbols_dropped() {
        let table = SymbolTable::new(vec![
            symbol("empty", 0x1000, 0x1000, None),
            symbol("foo", 0x1000, 0x1010, None),
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(name(&table, 0x1000), Some("foo"));
        assert_eq!(table.find("empty"), None);
    }
}
