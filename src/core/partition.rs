// logfacts - core/partition.rs
//
// Splitting a file's line range into contiguous partitions, one per worker.

use crate::util::constants::PARTITION_ALIGNMENT;
use std::ops::Range;

/// Split `0..total` into contiguous, non-overlapping ranges.
///
/// Below `sequential_threshold` lines, or with `workers <= 1`, the whole
/// range is one partition. Otherwise each partition holds
/// `ceil(total / workers)` lines rounded up to a multiple of
/// `PARTITION_ALIGNMENT`, and the last partition takes what remains. The
/// rounding can leave fewer partitions than workers.
pub fn partition(total: usize, workers: usize, sequential_threshold: usize) -> Vec<Range<usize>> {
    if total == 0 || total < sequential_threshold || workers <= 1 {
        return vec![0..total];
    }

    let per_worker = total.div_ceil(workers);
    let size = per_worker.div_ceil(PARTITION_ALIGNMENT) * PARTITION_ALIGNMENT;

    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    while start < total {
        let end = (start + size).min(total);
        ranges.push(start..end);
        start = end;
    }
    ranges
}
