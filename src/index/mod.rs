//! Index table: `total_blocks + 1` little-endian u32 entries that follow the
//! header.
//!
//! Entry `i` holds the payload offset of block `i` shifted right by `align`,
//! with bit 31 set when the payload is stored plain. The last entry holds
//! only the shifted end-of-data offset.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const PLAIN_FLAG:  u32 = 0x8000_0000;
pub const OFFSET_MASK: u32 = 0x7FFF_FFFF;

// ── Entry packing ─────────────────────────────────────────────────────────────

/// `(offset >> align) | plain_flag`.
///
/// The shifted offset must fit in 31 bits; check with [`shift`] first.
#[inline]
pub fn pack(offset: u64, plain: bool, align: u8) -> u32 {
    let shifted = (offset >> align) as u32;
    if plain { shifted | PLAIN_FLAG } else { shifted }
}

/// Split an entry into its shifted offset and plain flag.
#[inline]
pub fn unpack(entry: u32) -> (u32, bool) {
    (entry & OFFSET_MASK, entry & PLAIN_FLAG != 0)
}

/// The shifted offset, or `None` when it would collide with the plain flag.
#[inline]
pub fn shift(offset: u64, align: u8) -> Option<u32> {
    let shifted = offset >> align;
    if shifted <= OFFSET_MASK as u64 {
        Some(shifted as u32)
    } else {
        None
    }
}

// ── Alignment ─────────────────────────────────────────────────────────────────

/// Bytes of padding needed to bring `pos` to the next `1 << align` boundary.
#[inline]
pub fn padding_len(pos: u64, align: u8) -> u64 {
    let unit = 1u64 << align;
    (unit - pos % unit) % unit
}

#[inline]
pub fn align_up(pos: u64, align: u8) -> u64 {
    pos + padding_len(pos, align)
}

// ── Table ─────────────────────────────────────────────────────────────────────

/// Where a block's payload lives and how many bytes to read for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLocation {
    pub offset: u64,
    pub size:   u64,
    pub plain:  bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexTable {
    entries: Vec<u32>,
}

impl IndexTable {
    /// All-zero table for `total_blocks` blocks plus the end entry.
    pub fn zeroed(total_blocks: u64) -> Self {
        Self { entries: vec![0u32; total_blocks as usize + 1] }
    }

    pub fn from_entries(entries: Vec<u32>) -> Self {
        Self { entries }
    }

    /// Number of blocks described (one less than the entry count).
    pub fn block_count(&self) -> u64 {
        self.entries.len().saturating_sub(1) as u64
    }

    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    pub fn get(&self, i: usize) -> Option<u32> {
        self.entries.get(i).copied()
    }

    pub fn set(&mut self, i: usize, entry: u32) {
        self.entries[i] = entry;
    }

    pub fn plain_count(&self) -> u64 {
        let blocks = self.block_count() as usize;
        self.entries[..blocks].iter().filter(|&&e| e & PLAIN_FLAG != 0).count() as u64
    }

    /// True when unpacked offsets never decrease.
    pub fn is_monotonic(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| unpack(w[1]).0 >= unpack(w[0]).0)
    }

    /// Read window for `block`.
    ///
    /// Compressed blocks span up to the next entry's offset. With a non-zero
    /// align one extra unit is added: the end entry is rounded down, so the
    /// last payload would otherwise be cut short.
    pub fn locate(&self, block: u64, align: u8, block_size: u32) -> Option<BlockLocation> {
        let i = block as usize;
        if block >= self.block_count() {
            return None;
        }
        let (index, plain) = unpack(self.entries[i]);
        let offset = (index as u64) << align;
        let size = if plain {
            block_size as u64
        } else {
            let (next, _) = unpack(self.entries[i + 1]);
            let units = (next as u64).saturating_sub(index as u64) + u64::from(align > 0);
            units << align
        };
        Some(BlockLocation { offset, size, plain })
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        for &entry in &self.entries {
            writer.write_u32::<LittleEndian>(entry)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R, total_blocks: u64) -> io::Result<Self> {
        let count = usize::try_from(total_blocks)
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "index table exceeds the address space"))?;
        // Headers are untrusted; let a bogus count fail on EOF, not on allocation.
        let mut entries = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            entries.push(reader.read_u32::<LittleEndian>()?);
        }
        Ok(Self { entries })
    }
}
