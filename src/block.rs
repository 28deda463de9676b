use crate::codec::{decompress_unsized, BlockCodec, CodecError};

/// Whether a compressed payload saves enough to be kept.
///
/// Equivalent to `100 * compressed / raw < threshold`, in integers.
#[inline]
pub fn meets_threshold(compressed_len: usize, raw_len: usize, threshold: u8) -> bool {
    (compressed_len as u64) * 100 < (threshold as u64) * (raw_len as u64)
}

/// Pick the bytes to store for a block: the compressed payload when it meets
/// the threshold, otherwise the raw block. The flag is true for raw.
pub fn select_payload<'a>(raw: &'a [u8], compressed: &'a [u8], threshold: u8) -> (&'a [u8], bool) {
    if meets_threshold(compressed.len(), raw.len(), threshold) {
        (compressed, false)
    } else {
        (raw, true)
    }
}

pub fn encode_block(codec: &dyn BlockCodec, raw: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
    codec.compress(raw, level)
}

/// Recover a block from its stored window.
pub fn decode_block(
    codec:      &dyn BlockCodec,
    window:     &[u8],
    plain:      bool,
    block_size: usize,
) -> Result<Vec<u8>, CodecError> {
    let data = if plain {
        if window.len() < block_size {
            return Err(CodecError::Corrupt(format!(
                "plain block holds {} of {} bytes",
                window.len(),
                block_size
            )));
        }
        window[..block_size].to_vec()
    } else {
        decompress_unsized(codec, window)?
    };
    if data.len() != block_size {
        return Err(CodecError::Corrupt(format!(
            "block decompressed to {} bytes, expected {}",
            data.len(),
            block_size
        )));
    }
    Ok(data)
}
