//! Container writer and reader.
//!
//! # Writer
//! [`ContainerWriter`] writes the header and a zero-filled index table up
//! front, then appends one payload per block in block order. Each payload
//! starts on a `1 << align` boundary; the gap is filled with the padding
//! byte. [`ContainerWriter::finish`] records the end-of-data entry and
//! patches the real index table over the placeholder.
//!
//! # Reader
//! [`ContainerReader`] loads the header and the whole index table on open
//! and then serves any block by seeking straight to its payload.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::block::{decode_block, select_payload};
use crate::codec::{get_codec, BlockCodec};
use crate::error::{Error, Result};
use crate::header::{ContainerKind, FormatError, Header, HEADER_SIZE};
use crate::index::{self, BlockLocation, IndexTable};

// ── Writer ───────────────────────────────────────────────────────────────────

/// What a finished container looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub blocks:       u64,
    pub plain_blocks: u64,
    /// Container size in bytes (also the end-of-data offset).
    pub output_size:  u64,
}

pub struct ContainerWriter<W: Write + Seek> {
    writer:       W,
    header:       Header,
    index:        IndexTable,
    next_block:   u64,
    write_pos:    u64,
    padding:      u8,
    threshold:    u8,
    plain_blocks: u64,
}

impl<W: Write + Seek> ContainerWriter<W> {
    pub fn new(mut writer: W, header: Header, padding: u8, threshold: u8) -> Result<Self> {
        let index = IndexTable::zeroed(header.total_blocks());
        writer.seek(SeekFrom::Start(0)).map_err(Error::Write)?;
        header.write(&mut writer).map_err(Error::Write)?;
        index.write(&mut writer).map_err(Error::Write)?; // placeholder, patched in finish()
        let write_pos = header.data_start();
        Ok(Self {
            writer,
            header,
            index,
            next_block: 0,
            write_pos,
            padding,
            threshold,
            plain_blocks: 0,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Blocks appended so far.
    pub fn blocks_written(&self) -> u64 {
        self.next_block
    }

    /// Current end of the written data.
    pub fn position(&self) -> u64 {
        self.write_pos
    }

    /// Append the next block. `compressed` is the codec output for `raw`;
    /// the raw bytes are stored instead when compression does not meet the
    /// threshold. Returns whether the block was stored plain.
    pub fn push_block(&mut self, raw: &[u8], compressed: &[u8]) -> Result<bool> {
        let block = self.next_block;
        if block >= self.header.total_blocks() {
            return Err(Error::Config(format!(
                "block {} exceeds the {} blocks declared in the header",
                block,
                self.header.total_blocks()
            )));
        }

        let (payload, plain) = select_payload(raw, compressed, self.threshold);
        self.pad()?;

        let align = self.header.align;
        if index::shift(self.write_pos, align).is_none() {
            return Err(Error::AlignmentOverflow { offset: self.write_pos, align });
        }
        self.index.set(block as usize, index::pack(self.write_pos, plain, align));

        log::trace!(
            "block {} at 0x{:X}: {} bytes{}",
            block,
            self.write_pos,
            payload.len(),
            if plain { " (plain)" } else { "" }
        );
        self.writer.write_all(payload).map_err(Error::Write)?;
        self.write_pos += payload.len() as u64;
        self.next_block += 1;
        if plain {
            self.plain_blocks += 1;
        }
        Ok(plain)
    }

    fn pad(&mut self) -> Result<()> {
        let len = index::padding_len(self.write_pos, self.header.align);
        if len > 0 {
            let fill = vec![self.padding; len as usize];
            self.writer.write_all(&fill).map_err(Error::Write)?;
            self.write_pos += len;
        }
        Ok(())
    }

    /// Record the end-of-data entry and patch the index table in place.
    pub fn finish(mut self) -> Result<(W, WriteSummary)> {
        let total = self.header.total_blocks();
        if self.next_block != total {
            return Err(Error::Config(format!(
                "container closed after {} of {} blocks",
                self.next_block, total
            )));
        }

        let align = self.header.align;
        // The end entry is not padded; readers add one unit to cover it.
        if index::shift(self.write_pos, align).is_none() {
            return Err(Error::AlignmentOverflow { offset: self.write_pos, align });
        }
        self.index.set(total as usize, index::pack(self.write_pos, false, align));

        self.writer
            .seek(SeekFrom::Start(HEADER_SIZE as u64))
            .map_err(Error::Write)?;
        self.index.write(&mut self.writer).map_err(Error::Write)?;
        self.writer.flush().map_err(Error::Write)?;

        let summary = WriteSummary {
            blocks:       total,
            plain_blocks: self.plain_blocks,
            output_size:  self.write_pos,
        };
        Ok((self.writer, summary))
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ContainerReader<R: Read + Seek> {
    reader:        R,
    header:        Header,
    kind:          ContainerKind,
    index:         IndexTable,
    codec:         Box<dyn BlockCodec>,
    container_len: u64,
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Read and validate the header, then load the full index table.
    pub fn open(mut reader: R) -> Result<Self> {
        let container_len = reader.seek(SeekFrom::End(0)).map_err(Error::Read)?;
        reader.seek(SeekFrom::Start(0)).map_err(Error::Read)?;

        let header = Header::read(&mut reader).map_err(|e| truncated(e, "header"))?;
        let kind = header.validate()?;
        match header.index_end() {
            Some(end) if end <= container_len => {}
            _ => return Err(FormatError::Truncated("index table").into()),
        }
        let index = IndexTable::read(&mut reader, header.total_blocks())
            .map_err(|e| truncated(e, "index table"))?;

        log::debug!(
            "{:?} container: {} bytes, {} blocks of {}, align {}",
            kind,
            header.total_bytes,
            header.total_blocks(),
            header.block_size,
            header.align
        );

        Ok(Self {
            reader,
            codec: get_codec(kind),
            header,
            kind,
            index,
            container_len,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn index(&self) -> &IndexTable {
        &self.index
    }

    pub fn block_count(&self) -> u64 {
        self.header.total_blocks()
    }

    /// Size of the container stream in bytes.
    pub fn container_len(&self) -> u64 {
        self.container_len
    }

    pub fn block_location(&self, block: u64) -> Result<BlockLocation> {
        self.index
            .locate(block, self.header.align, self.header.block_size)
            .ok_or(Error::BlockOutOfRange { block, total: self.block_count() })
    }

    /// Read and decode a single block without touching any other payload.
    pub fn read_block(&mut self, block: u64) -> Result<Vec<u8>> {
        let loc = self.block_location(block)?;
        self.reader.seek(SeekFrom::Start(loc.offset)).map_err(Error::Read)?;

        // The window may run past the end of the container; take what is there.
        let mut window = Vec::with_capacity(loc.size.min(1 << 22) as usize);
        (&mut self.reader)
            .take(loc.size)
            .read_to_end(&mut window)
            .map_err(Error::Read)?;

        decode_block(&*self.codec, &window, loc.plain, self.header.block_size as usize).map_err(
            |reason| Error::CorruptBlock {
                block,
                offset: loc.offset,
                size: loc.size,
                reason,
            },
        )
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

fn truncated(e: io::Error, what: &'static str) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Format(FormatError::Truncated(what))
    } else {
        Error::Read(e)
    }
}
