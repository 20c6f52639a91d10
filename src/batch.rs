//! gmon-profile batch of gmon files.
//!
//! Every file is decoded and resolved on its own (in parallel), then the
//! partial results are merged on the calling thread. A file that fails to
//! decode is reported and skipped.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::global;
use crate::gmon::{self, Layout};
use crate::samples::Samples;
use crate::symbols::SymbolTable;
use crate::tree::Profile;

/// Merged result of several gmon files.
#[derive(Debug, Default)]
pub struct Batch {
    /// Merged samples of the decoded files.
    pub samples: Samples,
    /// Files merged into `samples`.
    pub decoded: Vec<PathBuf>,
    /// Files that could not be decoded.
    pub failures: Vec<(PathBuf, Error)>,
}

impl Batch {
    /// Builds the result tree of the decoded files.
    /// Fails if there were files but none of them could be decoded.
    pub fn into_profile(self, table: &SymbolTable) -> Result<(Profile<'_>, Vec<(PathBuf, Error)>)> {
        if self.decoded.is_empty() && !self.failures.is_empty() {
            for (path, err) in &self.failures {
                tracing::error!("{:?}: {}", path, err);
            }
            return Err(Error::NoInput(self.failures.len()));
        }
        let profile = Profile::build(table, self.samples)?;
        Ok((profile, self.failures))
    }
}

/// Decodes one file into its partial result.
pub fn process(path: &Path, layout: &Layout, table: &SymbolTable) -> Result<Samples> {
    let data = gmon::read(path, layout)?;
    Ok(Samples::from_gmon(&data, table))
}

/// Decodes all files in parallel and merges what could be decoded.
pub fn run(paths: &[PathBuf], layout: &Layout, table: &SymbolTable) -> Batch {
    if global::verbose() {
        tracing::info!("Decoding {} gmon files...", paths.len());
    }

    let results: Vec<(&PathBuf, Result<Samples>)> = paths
        .par_iter()
        .map(|path| (path, process(path, layout, table)))
        .collect();

    let mut batch = Batch::default();
    for (path, result) in results {
        match result {
            Ok(samples) => {
                batch.samples.merge(samples);
                batch.decoded.push(path.clone());
            }
            Err(err) => {
                tracing::warn!("Skipping {:?}: {}", path, err);
                batch.failures.push((path.clone(), err));
            }
        }
    }

    if global::verbose() {
        tracing::info!(
            "Decoded {} of {} gmon files",
            batch.decoded.len(),
            paths.len()
        );
    }
    batch
}
