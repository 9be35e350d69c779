//! Batch Partitioner
//!
//! Splits the input dataset into contiguous, non-overlapping sub-batches.
//! Concatenating the parts always gives back the original sequence.

use crate::error::PartitionError;

/// Split `input` into `count` contiguous parts
///
/// Earlier parts absorb the remainder: 5 elements into 2 parts gives sizes
/// `[3, 2]`, 7 into 3 gives `[3, 2, 2]`. A `count` larger than the input is
/// clamped so that no part is empty.
///
/// # Errors
/// `PartitionError::InvalidPartition` if `count` is 0 or `input` is empty
pub fn partition<T: Clone>(input: &[T], count: usize) -> Result<Vec<Vec<T>>, PartitionError> {
    if count == 0 {
        return Err(PartitionError::InvalidPartition("part count must be at least 1"));
    }
    if input.is_empty() {
        return Err(PartitionError::InvalidPartition("input is empty"));
    }

    let count = count.min(input.len());
    let base = input.len() / count;
    let remainder = input.len() % count;

    let mut parts = Vec::with_capacity(count);
    let mut start = 0;
    for part in 0..count {
        let len = if part < remainder { base + 1 } else { base };
        parts.push(input[start..start + len].to_vec());
        start += len;
    }

    Ok(parts)
}

/// Split `input` into parts of `size` elements; the last part may be shorter
///
/// # Errors
/// `PartitionError::InvalidPartition` if `size` is 0 or `input` is empty
pub fn partition_by_size<T: Clone>(input: &[T], size: usize) -> Result<Vec<Vec<T>>, PartitionError> {
    if size == 0 {
        return Err(PartitionError::InvalidPartition("part size must be at least 1"));
    }
    if input.is_empty() {
        return Err(PartitionError::InvalidPartition("input is empty"));
    }

    Ok(input.chunks(size).map(<[T]>::to_vec).collect())
}
