//! Parallel block compression.
//!
//! [`compress_batch`] compresses a run of consecutive raw blocks
//! concurrently using Rayon. Only the codec call runs on the pool; the
//! caller keeps ownership of the raw buffer and assembles the container
//! from the returned payloads in block order, so the output does not depend
//! on how the pool schedules work.
//!
//! Without the `parallel` feature the same function compresses the batch
//! on the calling thread.

use crate::codec::{BlockCodec, CodecError};
use crate::policy::Effort;

/// Blocks handed to the pool per batch.
pub const BATCH_BLOCKS: usize = 16 * 1024;

/// A failed block inside a batch.
#[derive(Debug)]
pub struct BatchError {
    /// Absolute block number.
    pub block:  u64,
    pub source: CodecError,
}

/// Compress `raw` (a whole number of `block_size` blocks starting at block
/// `first_block`). Returns one payload per block, in block order.
pub fn compress_batch(
    codec:       &dyn BlockCodec,
    raw:         &[u8],
    block_size:  usize,
    first_block: u64,
    effort:      &Effort,
) -> Result<Vec<Vec<u8>>, BatchError> {
    let compress_one = |(i, block): (usize, &[u8])| {
        let n = first_block + i as u64;
        codec
            .compress(block, effort.level(n))
            .map_err(|source| BatchError { block: n, source })
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        // collect() into a Result keeps input order and stops at the first error.
        raw.par_chunks(block_size)
            .enumerate()
            .map(compress_one)
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        raw.chunks(block_size).enumerate().map(compress_one).collect()
    }
}
