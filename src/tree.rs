//! gmon-profile result tree.
//!
//! The tree has three levels: the [`Profile`] root, one [`FileRef`] per source
//! file (symbols without a known file share a file with no path) and one
//! [`SymbolRef`] per symbol with samples or calls. Nodes live in two arenas
//! and point to their parents by index; the public API is read-only.

use std::cmp::Ordering;
use std::ops::Range;

use crate::callgraph::{CallGraph, CallGraphNode, Cycle, Edge};
use crate::config::{Index, Map};
use crate::error::{Error, Result};
use crate::gmon::HistogramRecord;
use crate::samples::Samples;
use crate::symbols::{Symbol, SymbolId, SymbolTable};

/// Root of the result tree.
#[derive(Debug)]
pub struct Profile<'t> {
    table: &'t SymbolTable,
    histogram: Option<HistogramRecord>,
    total_samples: u64,
    unattributed_samples: u64,
    basic_block_total: u64,
    sources: usize,
    files: Vec<FileNode>,
    entries: Vec<SymbolNode>,
    by_symbol: Map<SymbolId, Index>,
    graph: CallGraph,
    diagnostics: Vec<Error>,
}

#[derive(Debug)]
struct FileNode {
    path: Option<String>,
    self_samples: u64,
    symbols: Range<Index>,
}

#[derive(Debug)]
struct SymbolNode {
    symbol: SymbolId,
    file: Index,
    self_samples: u64,
}

impl<'t> Profile<'t> {
    /// Builds the tree of merged samples.
    pub fn build(table: &'t SymbolTable, samples: Samples) -> Result<Self> {
        let graph = CallGraph::build(&samples)?;

        let mut participants: Vec<SymbolId> = samples
            .self_samples
            .iter()
            .filter(|(_, count)| **count != 0)
            .map(|(id, _)| *id)
            .chain(graph.nodes().iter().map(CallGraphNode::symbol))
            .collect();
        participants.sort_unstable();
        participants.dedup();

        // Group by file, first encounter creates the group
        let mut groups: Vec<(Option<&str>, Vec<SymbolId>)> = Vec::new();
        let mut lookup: Map<Option<&str>, Index> = Map::new();
        for id in participants {
            let path = table.symbol(id).source_file();
            let group = *lookup.entry(path).or_insert_with(|| {
                groups.push((path, Vec::new()));
                groups.len() - 1
            });
            groups[group].1.push(id);
        }
        groups.sort_by(|x, y| compare_paths(x.0, y.0));

        let mut files = Vec::with_capacity(groups.len());
        let mut entries = Vec::new();
        for (file, (path, mut ids)) in groups.into_iter().enumerate() {
            ids.sort_by(|x, y| {
                samples
                    .self_samples(*y)
                    .cmp(&samples.self_samples(*x))
                    .then_with(|| table.symbol(*x).name().cmp(table.symbol(*y).name()))
                    .then(x.cmp(y))
            });
            let first = entries.len();
            entries.extend(ids.into_iter().map(|id| SymbolNode {
                symbol: id,
                file,
                self_samples: samples.self_samples(id),
            }));
            files.push(FileNode {
                path: path.map(String::from),
                self_samples: entries[first..].iter().map(|e| e.self_samples).sum(),
                symbols: first..entries.len(),
            });
        }

        let by_symbol = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.symbol, i))
            .collect();

        tracing::debug!(
            "Profile: {} files, {} symbols, {} cycles",
            files.len(),
            entries.len(),
            graph.cycles().len()
        );

        Ok(Profile {
            table,
            histogram: samples.histogram,
            total_samples: samples.total_samples,
            unattributed_samples: samples.unattributed_samples,
            basic_block_total: samples.basic_block_total,
            sources: samples.sources,
            files,
            entries,
            by_symbol,
            graph,
            diagnostics: samples.diagnostics,
        })
    }

    /// Files ordered by path, the file without a path last.
    pub fn files(&self) -> impl Iterator<Item = FileRef<'_>> {
        (0..self.files.len()).map(move |index| FileRef {
            profile: self,
            index,
        })
    }

    /// Returns the file by its path (`None` for symbols without a file).
    pub fn file(&self, path: Option<&str>) -> Option<FileRef<'_>> {
        self.files().find(|f| f.path() == path)
    }

    /// Returns the tree node of a symbol.
    pub fn symbol(&self, id: SymbolId) -> Option<SymbolRef<'_>> {
        self.by_symbol.get(&id).map(|index| SymbolRef {
            profile: self,
            index: *index,
        })
    }

    /// Returns the tree node of the first symbol with the name.
    pub fn find(&self, name: &str) -> Option<SymbolRef<'_>> {
        (0..self.entries.len())
            .map(|index| SymbolRef {
                profile: self,
                index,
            })
            .find(|s| s.name() == name)
    }

    /// Symbol table the profile refers to.
    pub fn table(&self) -> &'t SymbolTable {
        self.table
    }

    /// Description of the first histogram merged, if any.
    pub fn histogram(&self) -> Option<&HistogramRecord> {
        self.histogram.as_ref()
    }

    /// Samples per second, zero without a histogram.
    pub fn sample_rate(&self) -> u32 {
        self.histogram.as_ref().map_or(0, |h| h.sample_rate)
    }

    /// Number of histogram samples in all merged files.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Samples attributed to a symbol.
    pub fn attributed_samples(&self) -> u64 {
        self.total_samples - self.unattributed_samples
    }

    /// Samples falling outside every symbol.
    pub fn unattributed_samples(&self) -> u64 {
        self.unattributed_samples
    }

    /// Sum of the execution counts of all basic blocks.
    pub fn basic_block_total(&self) -> u64 {
        self.basic_block_total
    }

    /// Number of gmon files merged into the profile.
    pub fn sources(&self) -> usize {
        self.sources
    }

    /// Call graph the cumulative times come from.
    pub fn call_graph(&self) -> &CallGraph {
        &self.graph
    }

    /// Recursion cycles ordered by their number.
    pub fn cycles(&self) -> &[Cycle] {
        self.graph.cycles()
    }

    /// Problems that did not prevent the aggregation (unresolved arcs).
    pub fn diagnostics(&self) -> &[Error] {
        &self.diagnostics
    }

    /// Converts samples to seconds; samples stay as-is without a sample rate.
    pub fn seconds(&self, samples: f64) -> f64 {
        match self.sample_rate() {
            0 => samples,
            rate => samples / f64::from(rate),
        }
    }

    /// Share of the attributed samples, in percent.
    pub fn percentage(&self, samples: f64) -> f64 {
        match self.attributed_samples() {
            0 => 0.0,
            total => samples / total as f64 * 100.0,
        }
    }
}

/// Orders paths ascending, the missing path last.
fn compare_paths(x: Option<&str>, y: Option<&str>) -> Ordering {
    match (x, y) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A source file of the profile.
#[derive(Debug, Clone, Copy)]
pub struct FileRef<'a> {
    profile: &'a Profile<'a>,
    index: Index,
}

impl<'a> FileRef<'a> {
    fn node(&self) -> &'a FileNode {
        &self.profile.files[self.index]
    }

    /// Path of the file, `None` for symbols without a known file.
    pub fn path(&self) -> Option<&'a str> {
        self.node().path.as_deref()
    }

    /// Sum of the self samples of the file's symbols.
    pub fn self_samples(&self) -> u64 {
        self.node().self_samples
    }

    /// Self time of the file in seconds.
    pub fn self_seconds(&self) -> f64 {
        self.profile.seconds(self.self_samples() as f64)
    }

    /// Share of the file in the attributed samples, in percent.
    pub fn percentage(&self) -> f64 {
        self.profile.percentage(self.self_samples() as f64)
    }

    /// Symbols ordered by descending self time.
    pub fn symbols(&self) -> impl Iterator<Item = SymbolRef<'a>> {
        let profile = self.profile;
        self.node()
            .symbols
            .clone()
            .map(move |index| SymbolRef { profile, index })
    }

    /// Returns the root of the tree.
    pub fn profile(&self) -> &'a Profile<'a> {
        self.profile
    }
}

/// A symbol of the profile.
#[derive(Debug, Clone, Copy)]
pub struct SymbolRef<'a> {
    profile: &'a Profile<'a>,
    index: Index,
}

impl<'a> SymbolRef<'a> {
    fn entry(&self) -> &'a SymbolNode {
        &self.profile.entries[self.index]
    }

    /// Returns the id of the symbol in its table.
    pub fn id(&self) -> SymbolId {
        self.entry().symbol
    }

    /// Returns the symbol in the table.
    pub fn symbol(&self) -> &'a Symbol {
        self.profile.table.symbol(self.id())
    }

    /// Returns the name of the symbol.
    pub fn name(&self) -> &'a str {
        self.symbol().name()
    }

    /// Returns the parent file.
    pub fn file(&self) -> FileRef<'a> {
        FileRef {
            profile: self.profile,
            index: self.entry().file,
        }
    }

    /// Call graph node of the symbol, if it makes or receives calls.
    pub fn node(&self) -> Option<&'a CallGraphNode> {
        self.profile.graph.node(self.id())
    }

    /// Samples of the histogram attributed to the symbol.
    pub fn self_samples(&self) -> u64 {
        self.entry().self_samples
    }

    /// Self time in seconds.
    pub fn self_seconds(&self) -> f64 {
        self.profile.seconds(self.self_samples() as f64)
    }

    /// Self samples plus the samples accounted from callees.
    pub fn cumulative_samples(&self) -> f64 {
        self.node()
            .map_or(self.self_samples() as f64, CallGraphNode::cumulative_samples)
    }

    /// Cumulative time in seconds.
    pub fn cumulative_seconds(&self) -> f64 {
        self.profile.seconds(self.cumulative_samples())
    }

    /// Share of self samples in the attributed samples, in percent.
    pub fn percentage(&self) -> f64 {
        self.profile.percentage(self.self_samples() as f64)
    }

    /// Share of cumulative samples in the attributed samples, in percent.
    pub fn cumulative_percentage(&self) -> f64 {
        self.profile.percentage(self.cumulative_samples())
    }

    /// Number of calls received from other symbols.
    pub fn calls_in(&self) -> u64 {
        self.node().map_or(0, CallGraphNode::calls_in)
    }

    /// Number of calls made to other symbols.
    pub fn calls_out(&self) -> u64 {
        self.node().map_or(0, CallGraphNode::calls_out)
    }

    /// Number of direct recursive calls.
    pub fn self_calls(&self) -> u64 {
        self.node().map_or(0, CallGraphNode::self_calls)
    }

    /// Edges from the symbols calling this one.
    pub fn callers(&self) -> impl Iterator<Item = EdgeRef<'a>> {
        self.edges(CallGraphNode::callers)
    }

    /// Edges to the symbols called by this one.
    pub fn callees(&self) -> impl Iterator<Item = EdgeRef<'a>> {
        self.edges(CallGraphNode::callees)
    }

    fn edges(
        &self,
        select: fn(&'a CallGraphNode) -> &'a [Edge],
    ) -> impl Iterator<Item = EdgeRef<'a>> {
        let profile = self.profile;
        self.node()
            .map(select)
            .unwrap_or_default()
            .iter()
            .map(move |edge| EdgeRef { profile, edge })
    }

    /// Returns the cycle the symbol belongs to.
    pub fn cycle(&self) -> Option<&'a Cycle> {
        self.node()
            .and_then(CallGraphNode::cycle)
            .and_then(|number| self.profile.graph.cycle(number))
    }

    /// Checks if the symbol represents its cycle.
    pub fn is_cycle_head(&self) -> bool {
        self.cycle().map_or(false, |c| c.head() == self.id())
    }
}

/// A call graph edge seen from one of its ends.
#[derive(Debug, Clone, Copy)]
pub struct EdgeRef<'a> {
    profile: &'a Profile<'a>,
    edge: &'a Edge,
}

impl<'a> EdgeRef<'a> {
    /// Symbol at the other end of the edge.
    pub fn peer(&self) -> SymbolRef<'a> {
        let index = self.profile.by_symbol[&self.edge.peer];
        SymbolRef {
            profile: self.profile,
            index,
        }
    }

    /// Number of calls along the edge.
    pub fn count(&self) -> u64 {
        self.edge.count
    }

    /// Samples of the callee accounted to the caller along this edge.
    pub fn propagated_samples(&self) -> f64 {
        self.edge.propagated
    }

    /// Same as `propagated_samples` in seconds.
    pub fn propagated_seconds(&self) -> f64 {
        self.profile.seconds(self.edge.propagated)
    }
}
