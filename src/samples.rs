//! gmon-profile partial aggregation results.
//!
//! `Samples` holds what one or more gmon files contribute once their addresses
//! are resolved: self samples per symbol, merged call arcs and diagnostics.
//! Partial results of independent files are combined with [`Samples::merge`],
//! which only sums, so the order of merging never matters.

use crate::callgraph;
use crate::config::Map;
use crate::error::Error;
use crate::gmon::{GmonData, HistogramRecord};
use crate::histogram;
use crate::symbols::{SymbolId, SymbolTable};

/// Self samples and call arcs keyed by symbol.
#[derive(Debug, Default)]
pub struct Samples {
    pub(crate) histogram: Option<HistogramRecord>,
    pub(crate) self_samples: Map<SymbolId, u64>,
    pub(crate) total_samples: u64,
    pub(crate) unattributed_samples: u64,
    pub(crate) arcs: Map<(SymbolId, SymbolId), u64>,
    pub(crate) basic_block_total: u64,
    pub(crate) diagnostics: Vec<Error>,
    pub(crate) sources: usize,
}

impl Samples {
    /// Resolves the decoded records of one gmon file.
    pub fn from_gmon(data: &GmonData, table: &SymbolTable) -> Self {
        let mut samples = match &data.histogram {
            Some(record) => histogram::aggregate(record, &data.buckets, table),
            None => Samples::default(),
        };
        samples.merge(callgraph::resolve_arcs(&data.arcs, table));
        samples.basic_block_total = data.basic_blocks.iter().map(|bb| bb.count).sum();
        samples.sources = 1;
        samples
    }

    /// Adds another partial result to this one.
    pub fn merge(&mut self, other: Samples) {
        if let Some(theirs) = other.histogram {
            match self.histogram.as_ref().map(|h| h.sample_rate) {
                None => self.histogram = Some(theirs),
                Some(rate) if rate != theirs.sample_rate => {
                    tracing::warn!(
                        "Sample rate {} differs from {} of the first histogram, keeping the first",
                        theirs.sample_rate,
                        rate
                    );
                }
                Some(_) => {}
            }
        }
        for (id, count) in other.self_samples {
            *self.self_samples.entry(id).or_insert(0) += count;
        }
        for (pair, count) in other.arcs {
            *self.arcs.entry(pair).or_insert(0) += count;
        }
        self.total_samples += other.total_samples;
        self.unattributed_samples += other.unattributed_samples;
        self.basic_block_total += other.basic_block_total;
        self.diagnostics.extend(other.diagnostics);
        self.sources += other.sources;
    }

    /// Returns the histogram description of the first merged file.
    pub fn histogram(&self) -> Option<&HistogramRecord> {
        self.histogram.as_ref()
    }

    /// Returns all samples of all buckets.
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Returns samples of the buckets that resolved to a symbol.
    pub fn attributed_samples(&self) -> u64 {
        self.total_samples - self.unattributed_samples
    }

    /// Returns samples of the buckets outside of any symbol.
    pub fn unattributed_samples(&self) -> u64 {
        self.unattributed_samples
    }

    /// Returns the self samples of a symbol.
    pub fn self_samples(&self, id: SymbolId) -> u64 {
        self.self_samples.get(&id).copied().unwrap_or(0)
    }

    /// Returns the merged number of calls from one symbol to another.
    pub fn arc_count(&self, from: SymbolId, to: SymbolId) -> u64 {
        self.arcs.get(&(from, to)).copied().unwrap_or(0)
    }

    /// Returns the number of merged gmon files.
    pub fn sources(&self) -> usize {
        self.sources
    }

    /// Returns the recoverable problems met while resolving addresses.
    pub fn diagnostics(&self) -> &[Error] {
        &self.diagnostics
    }
}
