//! Block codecs and the unsized decompression search.
//!
//! # Contract
//! A codec compresses one logical block at a time and must not embed the
//! input size in its output: the container stores no per-block size, only
//! offsets. To decompress, the caller supplies a size guess and the codec
//! must produce exactly that many bytes or fail. [`decompress_unsized`]
//! walks the guesses produced by [`guess_sizes`]: 2048 bytes, doubling up to
//! [`MAX_DECOMPRESSED_SIZE`].
//!
//! Payload slices handed to `decompress` may carry trailing bytes (alignment
//! padding and the head of the next payload); codecs ignore anything after
//! the end of their own stream.

use std::io::Write;
use thiserror::Error;

use crate::header::ContainerKind;

/// First size tried when decompressing.
pub const FIRST_GUESS: usize = 2048;
/// Largest decompressed size a payload is allowed to expand to.
pub const MAX_DECOMPRESSED_SIZE: usize = 4_177_920;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("compression error: {0}")]
    Compression(String),
    /// The payload is well-formed so far but does not expand to the guess.
    #[error("payload does not decompress to {expected} bytes")]
    SizeMismatch { expected: usize },
    #[error("corrupt payload: {0}")]
    Corrupt(String),
    #[error("no size guess up to {max} bytes fits the payload (last attempt: {last})")]
    Exhausted { max: usize, last: Box<CodecError> },
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait BlockCodec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compress one block. `level` is the effort (1-9); codecs without
    /// tunable effort ignore it.
    fn compress(&self, block: &[u8], level: u32) -> Result<Vec<u8>, CodecError>;

    /// Decompress into exactly `size` bytes.
    fn decompress(&self, payload: &[u8], size: usize) -> Result<Vec<u8>, CodecError>;
}

/// Size guesses tried in order: 2048, 4096, ... while `<= MAX_DECOMPRESSED_SIZE`.
pub fn guess_sizes() -> impl Iterator<Item = usize> {
    std::iter::successors(Some(FIRST_GUESS), |&s| s.checked_mul(2))
        .take_while(|&s| s <= MAX_DECOMPRESSED_SIZE)
}

/// Decompress a payload whose original size is not recorded anywhere.
pub fn decompress_unsized(codec: &dyn BlockCodec, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut last = CodecError::SizeMismatch { expected: FIRST_GUESS };
    for size in guess_sizes() {
        match codec.decompress(payload, size) {
            Ok(data) => return Ok(data),
            Err(e)   => {
                log::trace!("{}: {} byte guess failed: {}", codec.name(), size, e);
                last = e;
            }
        }
    }
    Err(CodecError::Exhausted { max: MAX_DECOMPRESSED_SIZE, last: Box::new(last) })
}

// ── LZ4 ──────────────────────────────────────────────────────────────────────

/// Minimum literal run closing an LZ4 block that contains a match.
const LAST_LITERALS: usize = 5;

/// LZ4 block format without a size prefix (ZSO payloads).
pub struct Lz4Codec;

impl BlockCodec for Lz4Codec {
    fn name(&self) -> &'static str { "lz4" }

    fn compress(&self, block: &[u8], _: u32) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::block::compress(block))
    }

    fn decompress(&self, payload: &[u8], size: usize) -> Result<Vec<u8>, CodecError> {
        let end = lz4_block_len(payload, size)?;
        let out = lz4_flex::block::decompress(&payload[..end], size)
            .map_err(|e| CodecError::Corrupt(e.to_string()))?;
        if out.len() != size {
            return Err(CodecError::SizeMismatch { expected: size });
        }
        Ok(out)
    }
}

/// Length of the LZ4 block at the start of `input` that expands to exactly
/// `size` bytes.
///
/// Only sequence headers are parsed; lz4_flex does the actual decoding once
/// the trailing bytes have been cut off. A block always ends with a
/// literal-only sequence, so the end is the first point after a literal run
/// where the output length reaches `size`.
///
/// Compressors keep at least [`LAST_LITERALS`] bytes as literals at the end
/// of any block that contains a match. A shorter run landing on `size` is the
/// middle of a larger block and counts as a failed guess.
fn lz4_block_len(input: &[u8], size: usize) -> Result<usize, CodecError> {
    fn corrupt(msg: &str) -> CodecError {
        CodecError::Corrupt(format!("lz4: {msg}"))
    }
    fn read_ext(input: &[u8], pos: &mut usize) -> Result<usize, CodecError> {
        let mut len = 0usize;
        loop {
            let b = *input.get(*pos).ok_or_else(|| corrupt("length runs past end of payload"))?;
            *pos += 1;
            len += b as usize;
            if b != 0xFF {
                return Ok(len);
            }
        }
    }

    let mut pos = 0usize;
    let mut out = 0usize;
    loop {
        let token = *input.get(pos).ok_or_else(|| corrupt("payload ends before block end"))?;
        pos += 1;

        let mut literals = (token >> 4) as usize;
        if literals == 15 {
            literals += read_ext(input, &mut pos)?;
        }
        if literals > input.len() - pos {
            return Err(corrupt("literals run past end of payload"));
        }
        pos += literals;
        out += literals;
        if out == size {
            if literals < LAST_LITERALS && out != literals {
                return Err(corrupt("block ends without its final literals"));
            }
            return Ok(pos);
        }
        if out > size {
            return Err(CodecError::SizeMismatch { expected: size });
        }

        if input.len() - pos < 2 {
            return Err(corrupt("payload ends inside a match offset"));
        }
        let offset = u16::from_le_bytes([input[pos], input[pos + 1]]) as usize;
        pos += 2;
        if offset == 0 || offset > out {
            return Err(corrupt("match offset out of range"));
        }
        let mut match_len = (token & 0x0F) as usize;
        if match_len == 15 {
            match_len += read_ext(input, &mut pos)?;
        }
        out += match_len + 4;
        if out >= size {
            return Err(CodecError::SizeMismatch { expected: size });
        }
    }
}

// ── Deflate ──────────────────────────────────────────────────────────────────

/// Raw deflate without zlib framing (CSO payloads).
pub struct DeflateCodec;

impl BlockCodec for DeflateCodec {
    fn name(&self) -> &'static str { "deflate" }

    fn compress(&self, block: &[u8], level: u32) -> Result<Vec<u8>, CodecError> {
        let mut w = flate2::write::DeflateEncoder::new(
            Vec::with_capacity(block.len()),
            flate2::Compression::new(level.clamp(1, 9)),
        );
        w.write_all(block).map_err(|e| CodecError::Compression(e.to_string()))?;
        w.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress(&self, payload: &[u8], size: usize) -> Result<Vec<u8>, CodecError> {
        use flate2::{Decompress, FlushDecompress, Status};

        // One spare byte so an oversized stream shows up as overflow.
        let mut out = Vec::with_capacity(size + 1);
        let mut inflater = Decompress::new(false);
        let status = inflater
            .decompress_vec(payload, &mut out, FlushDecompress::Finish)
            .map_err(|e| CodecError::Corrupt(format!("deflate: {e}")))?;
        match status {
            Status::StreamEnd if out.len() == size => Ok(out),
            Status::StreamEnd                      => Err(CodecError::SizeMismatch { expected: size }),
            _ if out.len() > size                  => Err(CodecError::SizeMismatch { expected: size }),
            _ => Err(CodecError::Corrupt("deflate: stream ends before final block".into())),
        }
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Resolve the payload codec for a container kind.
pub fn get_codec(kind: ContainerKind) -> Box<dyn BlockCodec> {
    match kind {
        ContainerKind::Zso => Box::new(Lz4Codec),
        ContainerKind::Cso => Box::new(DeflateCodec),
    }
}
