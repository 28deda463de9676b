//! Whole-image conversions: the primary embedding surface.
//!
//! ```no_run
//! use ziso::convert::{decode, encode, EncodeOptions};
//!
//! let stats = encode("game.iso", "game.zso", &EncodeOptions::default(), None)?;
//! println!("{} -> {} bytes ({}%)", stats.image_bytes, stats.container_bytes, stats.rate());
//! decode("game.zso", "game.iso", None)?;
//! # Ok::<(), ziso::Error>(())
//! ```
//!
//! Encoding either compresses block by block on the calling thread, or
//! compresses batches of [`BATCH_BLOCKS`] blocks on a worker pool and then
//! assembles them in order on the calling thread. Both produce the same
//! bytes for the same input and options.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use crate::block::encode_block;
use crate::codec::{get_codec, BlockCodec};
use crate::error::{Error, Result};
use crate::header::{ContainerKind, Header, BLOCK_SIZE};
pub use crate::header::MAX_ALIGN;
use crate::io_stream::{ContainerReader, ContainerWriter};
use crate::perf::{compress_batch, BATCH_BLOCKS};
use crate::policy::{Effort, SectorTable, MAX_LEVEL, MIN_LEVEL};

// ── EncodeOptions ────────────────────────────────────────────────────────────

/// Configuration for [`encode`].
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub format:       ContainerKind,
    /// Codec effort, 1-9. LZ4 ignores it.
    pub level:        u32,
    /// log2 of the payload alignment.
    pub align:        u8,
    /// Keep a compressed payload only when it is below this percentage of
    /// the raw block.
    pub threshold:    u8,
    pub padding:      u8,
    pub parallel:     bool,
    /// Per-block effort overrides.
    pub sector_table: Option<SectorTable>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            format:       ContainerKind::Zso,
            level:        9,
            align:        6,
            threshold:    100,
            padding:      b'X',
            parallel:     true,
            sector_table: None,
        }
    }
}

impl EncodeOptions {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&self.level) {
            return Err(Error::Config(format!("level {} is outside 1-9", self.level)));
        }
        if self.align > MAX_ALIGN {
            return Err(Error::Config(format!("align {} is above {}", self.align, MAX_ALIGN)));
        }
        if self.threshold > 100 {
            return Err(Error::Config(format!("threshold {}% is above 100%", self.threshold)));
        }
        Ok(())
    }

    /// Reject images this configuration cannot index.
    ///
    /// At align 0 an image of 2 GiB or more would put payload offsets on the
    /// plain-flag bit, so it is refused before anything is written.
    pub fn check_image(&self, total_bytes: u64) -> Result<()> {
        if total_bytes == 0 || total_bytes % BLOCK_SIZE as u64 != 0 {
            return Err(Error::Config(format!(
                "image size {} is not a non-zero multiple of {} bytes",
                total_bytes, BLOCK_SIZE
            )));
        }
        if self.align == 0 && total_bytes >= 1 << 31 {
            return Err(Error::AlignmentOverflow { offset: total_bytes, align: 0 });
        }
        Ok(())
    }

    fn effort(&self, total_blocks: u64) -> Result<Effort> {
        match &self.sector_table {
            Some(table) => Ok(table.resolve(total_blocks, self.level)?),
            None        => Ok(Effort::Uniform(self.level)),
        }
    }
}

// ── Stats and progress ───────────────────────────────────────────────────────

/// Outcome of one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Size of the uncompressed image.
    pub image_bytes:     u64,
    /// Size of the compressed container.
    pub container_bytes: u64,
    pub blocks:          u64,
    pub plain_blocks:    u64,
}

impl Stats {
    /// Container size as a percentage of the image size.
    pub fn rate(&self) -> u64 {
        if self.image_bytes == 0 {
            return 0;
        }
        self.container_bytes * 100 / self.image_bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub blocks_done:   u64,
    pub total_blocks:  u64,
    /// Bytes written to the destination so far.
    pub bytes_written: u64,
}

pub type ProgressFn<'a> = dyn FnMut(Progress) + 'a;

// ── Encode ───────────────────────────────────────────────────────────────────

/// Compress the image at `src` into a container at `dst`.
pub fn encode(
    src:      impl AsRef<Path>,
    dst:      impl AsRef<Path>,
    opts:     &EncodeOptions,
    progress: Option<&mut ProgressFn<'_>>,
) -> Result<Stats> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    opts.validate()?;

    let fin = File::open(src).map_err(|source| Error::OpenInput { path: src.to_path_buf(), source })?;
    let total_bytes = fin.metadata().map_err(Error::Read)?.len();
    opts.check_image(total_bytes)?;

    let fout = File::create(dst).map_err(|source| Error::CreateOutput { path: dst.to_path_buf(), source })?;

    log::info!("compress '{}' to '{}'", src.display(), dst.display());
    let stats = encode_stream(BufReader::new(fin), total_bytes, BufWriter::new(fout), opts, progress)?;
    log::info!(
        "compress completed, total size = {} bytes, rate {}%",
        stats.container_bytes,
        stats.rate()
    );
    Ok(stats)
}

/// Compress `total_bytes` of image data read from `reader` into `writer`.
pub fn encode_stream<R: Read, W: Write + Seek>(
    mut reader:  R,
    total_bytes: u64,
    writer:      W,
    opts:        &EncodeOptions,
    mut progress: Option<&mut ProgressFn<'_>>,
) -> Result<Stats> {
    opts.validate()?;
    opts.check_image(total_bytes)?;

    let header = Header::new(opts.format, total_bytes, opts.align);
    let effort = opts.effort(header.total_blocks())?;
    let codec = get_codec(opts.format);

    log::debug!(
        "total {} bytes, block size {}, {} blocks, index align {}, level {}, threshold {}%, {}",
        total_bytes,
        header.block_size,
        header.total_blocks(),
        1u64 << opts.align,
        opts.level,
        opts.threshold,
        if opts.parallel { "parallel" } else { "sequential" }
    );

    let mut out = ContainerWriter::new(writer, header, opts.padding, opts.threshold)?;
    if opts.parallel {
        encode_parallel(&mut reader, &mut out, &*codec, &effort, BATCH_BLOCKS, &mut progress)?;
    } else {
        encode_sequential(&mut reader, &mut out, &*codec, &effort, &mut progress)?;
    }

    let (_, summary) = out.finish()?;
    Ok(Stats {
        image_bytes:     total_bytes,
        container_bytes: summary.output_size,
        blocks:          summary.blocks,
        plain_blocks:    summary.plain_blocks,
    })
}

fn encode_sequential<R: Read, W: Write + Seek>(
    reader:   &mut R,
    out:      &mut ContainerWriter<W>,
    codec:    &dyn BlockCodec,
    effort:   &Effort,
    progress: &mut Option<&mut ProgressFn<'_>>,
) -> Result<()> {
    let total = out.header().total_blocks();
    let mut raw = vec![0u8; out.header().block_size as usize];
    for block in 0..total {
        reader.read_exact(&mut raw).map_err(Error::Read)?;
        let compressed = encode_block(codec, &raw, effort.level(block))
            .map_err(|source| Error::Compress { block, source })?;
        out.push_block(&raw, &compressed)?;
        report(progress, out, total);
    }
    Ok(())
}

/// Batches are compressed on the pool, then applied strictly in block order
/// by this thread; alignment and offsets depend on everything before them.
fn encode_parallel<R: Read, W: Write + Seek>(
    reader:   &mut R,
    out:      &mut ContainerWriter<W>,
    codec:    &dyn BlockCodec,
    effort:   &Effort,
    batch:    usize,
    progress: &mut Option<&mut ProgressFn<'_>>,
) -> Result<()> {
    let total = out.header().total_blocks();
    let block_size = out.header().block_size as usize;
    let mut raw = Vec::new();

    let mut first = 0u64;
    while first < total {
        let count = (total - first).min(batch as u64) as usize;
        raw.resize(count * block_size, 0);
        reader.read_exact(&mut raw).map_err(Error::Read)?;

        log::debug!("compressing blocks {}..{}", first, first + count as u64);
        let payloads = compress_batch(codec, &raw, block_size, first, effort)
            .map_err(|e| Error::Compress { block: e.block, source: e.source })?;

        for (block_raw, payload) in raw.chunks(block_size).zip(&payloads) {
            out.push_block(block_raw, payload)?;
        }
        first += count as u64;
        report(progress, out, total);
    }
    Ok(())
}

fn report<W: Write + Seek>(
    progress: &mut Option<&mut ProgressFn<'_>>,
    out:      &ContainerWriter<W>,
    total:    u64,
) {
    if let Some(cb) = progress.as_deref_mut() {
        cb(Progress {
            blocks_done:   out.blocks_written(),
            total_blocks:  total,
            bytes_written: out.position(),
        });
    }
}

// ── Decode ───────────────────────────────────────────────────────────────────

/// Restore the image stored in the container at `src` to `dst`.
pub fn decode(
    src:      impl AsRef<Path>,
    dst:      impl AsRef<Path>,
    progress: Option<&mut ProgressFn<'_>>,
) -> Result<Stats> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    let fin = File::open(src).map_err(|source| Error::OpenInput { path: src.to_path_buf(), source })?;
    let reader = ContainerReader::open(BufReader::new(fin))?;

    let fout = File::create(dst).map_err(|source| Error::CreateOutput { path: dst.to_path_buf(), source })?;

    log::info!("decompress '{}' to '{}'", src.display(), dst.display());
    let stats = decode_stream(reader, BufWriter::new(fout), progress)?;
    log::info!("decompress completed, {} bytes", stats.image_bytes);
    Ok(stats)
}

/// Write every block of `reader` to `writer`, in order.
pub fn decode_stream<R: Read + Seek, W: Write>(
    mut reader:  ContainerReader<R>,
    mut writer:  W,
    mut progress: Option<&mut ProgressFn<'_>>,
) -> Result<Stats> {
    let total = reader.block_count();
    let block_size = reader.header().block_size as u64;

    for block in 0..total {
        let data = reader.read_block(block)?;
        writer.write_all(&data).map_err(Error::Write)?;
        if let Some(cb) = progress.as_deref_mut() {
            cb(Progress {
                blocks_done:   block + 1,
                total_blocks:  total,
                bytes_written: (block + 1) * block_size,
            });
        }
    }
    writer.flush().map_err(Error::Write)?;

    Ok(Stats {
        image_bytes:     total * block_size,
        container_bytes: reader.container_len(),
        blocks:          total,
        plain_blocks:    reader.index().plain_count(),
    })
}

// ── Inspect ──────────────────────────────────────────────────────────────────

/// Header fields and index summary of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub kind:            ContainerKind,
    pub header:          Header,
    pub blocks:          u64,
    pub plain_blocks:    u64,
    pub container_bytes: u64,
}

pub fn inspect(path: impl AsRef<Path>) -> Result<ContainerInfo> {
    let path = path.as_ref();
    let fin = File::open(path).map_err(|source| Error::OpenInput { path: path.to_path_buf(), source })?;
    let reader = ContainerReader::open(BufReader::new(fin))?;
    Ok(ContainerInfo {
        kind:            reader.kind(),
        header:          reader.header().clone(),
        blocks:          reader.block_count(),
        plain_blocks:    reader.index().plain_count(),
        container_bytes: reader.container_len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn image(blocks: usize) -> Vec<u8> {
        let text = b"BOOT2 = cdrom0:\\SLES_123.45;1\r\nVER = 1.10\r\nVMODE = PAL\r\n";
        (0..blocks * 2048)
            .map(|i| if (i / 2048) % 3 == 2 { (i * 7919 % 251) as u8 } else { text[i % text.len()] })
            .collect()
    }

    fn encode_vec(data: &[u8], opts: &EncodeOptions) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        encode_stream(data, data.len() as u64, &mut out, opts, None).unwrap();
        out.into_inner()
    }

    #[test]
    fn default_options() {
        let opts = EncodeOptions::default();
        assert_eq!(opts.align, 6);
        assert_eq!(opts.threshold, 100);
        assert_eq!(opts.padding, b'X');
        assert_eq!(opts.level, 9);
        assert!(opts.parallel);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let bad = [
            EncodeOptions { level: 0, ..Default::default() },
            EncodeOptions { level: 10, ..Default::default() },
            EncodeOptions { align: 32, ..Default::default() },
            EncodeOptions { threshold: 101, ..Default::default() },
        ];
        for opts in bad {
            assert!(matches!(opts.validate(), Err(Error::Config(_))), "{opts:?}");
        }
    }

    #[test]
    fn align_zero_refuses_two_gib_images() {
        let opts = EncodeOptions { align: 0, ..Default::default() };
        assert!(opts.check_image(1 << 30).is_ok());
        let err = opts.check_image((1 << 31) + 2048).unwrap_err();
        assert!(matches!(err, Error::AlignmentOverflow { align: 0, .. }));
        let opts = EncodeOptions { align: 1, ..Default::default() };
        assert!(opts.check_image((1 << 31) + 2048).is_ok());
    }

    #[test]
    fn partial_blocks_are_refused() {
        let opts = EncodeOptions::default();
        assert!(matches!(opts.check_image(0), Err(Error::Config(_))));
        assert!(matches!(opts.check_image(4095), Err(Error::Config(_))));
    }

    #[test]
    fn sequential_and_parallel_are_identical() {
        let data = image(40);
        for format in [ContainerKind::Zso, ContainerKind::Cso] {
            let seq = EncodeOptions { format, parallel: false, ..Default::default() };
            let par = EncodeOptions { format, parallel: true, ..Default::default() };
            assert_eq!(encode_vec(&data, &seq), encode_vec(&data, &par));
        }
    }

    #[test]
    fn parallel_carries_position_across_batches() {
        let data = image(11);
        let header = Header::new(ContainerKind::Zso, data.len() as u64, 4);
        let codec = get_codec(ContainerKind::Zso);
        let effort = Effort::Uniform(9);

        let mut out = ContainerWriter::new(Cursor::new(Vec::new()), header, b'X', 100).unwrap();
        encode_parallel(&mut &data[..], &mut out, &*codec, &effort, 4, &mut None).unwrap();
        let (batched, summary) = out.finish().unwrap();
        assert_eq!(summary.blocks, 11);

        let opts = EncodeOptions { align: 4, parallel: false, ..Default::default() };
        assert_eq!(batched.into_inner(), encode_vec(&data, &opts));
    }

    #[test]
    fn stream_roundtrip_reports_stats() {
        let data = image(9);
        let opts = EncodeOptions { align: 3, threshold: 90, ..Default::default() };
        let mut out = Cursor::new(Vec::new());
        let stats = encode_stream(&data[..], data.len() as u64, &mut out, &opts, None).unwrap();
        assert_eq!(stats.image_bytes, data.len() as u64);
        assert_eq!(stats.blocks, 9);
        assert_eq!(stats.container_bytes, out.get_ref().len() as u64);
        assert!(stats.rate() < 100);

        let reader = ContainerReader::open(Cursor::new(out.into_inner())).unwrap();
        let mut restored = Vec::new();
        let back = decode_stream(reader, &mut restored, None).unwrap();
        assert_eq!(restored, data);
        assert_eq!(back.plain_blocks, stats.plain_blocks);
        assert_eq!(back.container_bytes, stats.container_bytes);
    }

    #[test]
    fn progress_reaches_total() {
        let data = image(5);
        let mut seen = Vec::new();
        let mut cb = |p: Progress| seen.push(p);
        let opts = EncodeOptions { parallel: false, ..Default::default() };
        encode_stream(&data[..], data.len() as u64, Cursor::new(Vec::new()), &opts, Some(&mut cb))
            .unwrap();
        assert_eq!(seen.len(), 5);
        assert_eq!(seen.last().unwrap().blocks_done, 5);
        assert!(seen.windows(2).all(|w| w[1].bytes_written > w[0].bytes_written));
    }

    #[test]
    fn short_source_is_a_read_error() {
        let data = image(2);
        let err = encode_stream(&data[..2048], 4096, Cursor::new(Vec::new()), &EncodeOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Read(_)));
    }
}
