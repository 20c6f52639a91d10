//! gmon-profile histogram aggregation.

use crate::gmon::{Bucket, HistogramRecord};
use crate::samples::Samples;
use crate::symbols::SymbolTable;

/// Attributes every bucket to the symbol containing the bucket start address
/// and sums the self samples per symbol. Buckets outside of any symbol are
/// counted as unattributed.
pub fn aggregate(record: &HistogramRecord, buckets: &[Bucket], table: &SymbolTable) -> Samples {
    let mut samples = Samples {
        histogram: Some(record.clone()),
        ..Samples::default()
    };
    let mut lost_buckets = 0_usize;

    for bucket in buckets.iter().filter(|b| b.sample_count != 0) {
        let count = u64::from(bucket.sample_count);
        samples.total_samples += count;

        let address = record.bucket_address(bucket.index);
        match table.resolve(address) {
            Some(id) => *samples.self_samples.entry(id).or_insert(0) += count,
            None => {
                tracing::debug!(
                    "Bucket {} at 0x{:x} ({} samples) is outside of any symbol",
                    bucket.index,
                    address,
                    count
                );
                samples.unattributed_samples += count;
                lost_buckets += 1;
            }
        }
    }

    if lost_buckets != 0 {
        tracing::warn!(
            "{} samples in {} buckets are not attributed to any symbol",
            samples.unattributed_samples,
            lost_buckets
        );
    }
    samples
}
