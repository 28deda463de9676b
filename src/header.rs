//! Fixed 0x18-byte container header.
//!
//! ```text
//! 0x00  magic        u32  "ZISO" or "CISO"
//! 0x04  header_size  u32  always 0x18
//! 0x08  total_bytes  u64  size of the uncompressed image
//! 0x10  block_size   u32  logical block size (0x800)
//! 0x14  version      u8   1
//! 0x15  align        u8   log2 shift applied to index offsets
//! 0x16  reserved     [u8; 2], zero
//! ```
//! All fields are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

pub const HEADER_SIZE: u32 = 0x18;
pub const BLOCK_SIZE:  u32 = 0x800;
pub const VERSION:     u8  = 1;
/// Largest supported index shift.
pub const MAX_ALIGN:   u8  = 31;

/// LZ4-compressed container.
pub const ZISO_MAGIC: u32 = 0x4F53_495A;
/// Deflate-compressed container.
pub const CISO_MAGIC: u32 = 0x4F53_4943;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("bad magic 0x{0:08X}, not a ZSO or CSO container")]
    BadMagic(u32),
    #[error("block size is zero")]
    ZeroBlockSize,
    #[error("total image size is zero")]
    ZeroTotalBytes,
    #[error("index align {0} is above {}", MAX_ALIGN)]
    BadAlign(u8),
    #[error("truncated {0}")]
    Truncated(&'static str),
}

// ── Container kind ────────────────────────────────────────────────────────────

/// The two containers that share this layout; they differ only in magic and
/// in the block codec used for payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Zso,
    Cso,
}

impl ContainerKind {
    pub fn magic(self) -> u32 {
        match self {
            ContainerKind::Zso => ZISO_MAGIC,
            ContainerKind::Cso => CISO_MAGIC,
        }
    }

    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            ZISO_MAGIC => Some(ContainerKind::Zso),
            CISO_MAGIC => Some(ContainerKind::Cso),
            _          => None,
        }
    }

    /// File extension, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ContainerKind::Zso => "zso",
            ContainerKind::Cso => "cso",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "zso" | "ziso" => Some(ContainerKind::Zso),
            "cso" | "ciso" => Some(ContainerKind::Cso),
            _              => None,
        }
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic:       u32,
    pub header_size: u32,
    pub total_bytes: u64,
    pub block_size:  u32,
    pub version:     u8,
    pub align:       u8,
}

impl Header {
    pub fn new(kind: ContainerKind, total_bytes: u64, align: u8) -> Self {
        Self {
            magic:       kind.magic(),
            header_size: HEADER_SIZE,
            total_bytes,
            block_size:  BLOCK_SIZE,
            version:     VERSION,
            align,
        }
    }

    /// Number of logical blocks. Trailing bytes past the last whole block are
    /// not addressable.
    #[inline]
    pub fn total_blocks(&self) -> u64 {
        if self.block_size == 0 {
            return 0;
        }
        self.total_bytes / self.block_size as u64
    }

    /// Byte offset of the first payload slot, before alignment padding.
    #[inline]
    pub fn data_start(&self) -> u64 {
        self.index_end().unwrap_or(u64::MAX)
    }

    /// End of the index table, or `None` when a bogus block count puts it
    /// beyond any addressable offset.
    pub fn index_end(&self) -> Option<u64> {
        self.total_blocks()
            .checked_add(1)?
            .checked_mul(4)?
            .checked_add(HEADER_SIZE as u64)
    }

    /// Check the fields a decoder depends on and resolve the container kind.
    pub fn validate(&self) -> Result<ContainerKind, FormatError> {
        let kind = ContainerKind::from_magic(self.magic)
            .ok_or(FormatError::BadMagic(self.magic))?;
        if self.block_size == 0 {
            return Err(FormatError::ZeroBlockSize);
        }
        if self.total_bytes == 0 {
            return Err(FormatError::ZeroTotalBytes);
        }
        if self.align > MAX_ALIGN {
            return Err(FormatError::BadAlign(self.align));
        }
        Ok(kind)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.header_size)?;
        writer.write_u64::<LittleEndian>(self.total_bytes)?;
        writer.write_u32::<LittleEndian>(self.block_size)?;
        writer.write_u8(self.version)?;
        writer.write_u8(self.align)?;
        writer.write_all(&[0u8; 2])?;
        Ok(())
    }

    /// Parse the raw fields. No validation beyond I/O; see [`Header::validate`].
    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let header = Self {
            magic:       reader.read_u32::<LittleEndian>()?,
            header_size: reader.read_u32::<LittleEndian>()?,
            total_bytes: reader.read_u64::<LittleEndian>()?,
            block_size:  reader.read_u32::<LittleEndian>()?,
            version:     reader.read_u8()?,
            align:       reader.read_u8()?,
        };
        let mut reserved = [0u8; 2];
        reader.read_exact(&mut reserved)?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_0x18_bytes_little_endian() {
        let header = Header::new(ContainerKind::Zso, 0x1_0000_0800, 6);
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE as usize);
        assert_eq!(&buf[0..4], b"ZISO");
        assert_eq!(&buf[4..8], &[0x18, 0, 0, 0]);
        assert_eq!(&buf[8..16], &[0x00, 0x08, 0, 0, 0x01, 0, 0, 0]);
        assert_eq!(&buf[16..20], &[0x00, 0x08, 0, 0]);
        assert_eq!(buf[20], VERSION);
        assert_eq!(buf[21], 6);
        assert_eq!(&buf[22..24], &[0, 0]);

        assert_eq!(Header::read(&buf[..]).unwrap(), header);
    }

    #[test]
    fn cso_magic_spells_ciso() {
        assert_eq!(&CISO_MAGIC.to_le_bytes(), b"CISO");
        assert_eq!(ContainerKind::from_magic(CISO_MAGIC), Some(ContainerKind::Cso));
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let mut header = Header::new(ContainerKind::Zso, 4096, 0);
        assert_eq!(header.validate().unwrap(), ContainerKind::Zso);

        header.magic = 0xDEAD_BEEF;
        assert!(matches!(header.validate(), Err(FormatError::BadMagic(0xDEAD_BEEF))));

        header.magic = ZISO_MAGIC;
        header.block_size = 0;
        assert!(matches!(header.validate(), Err(FormatError::ZeroBlockSize)));

        header.block_size = BLOCK_SIZE;
        header.total_bytes = 0;
        assert!(matches!(header.validate(), Err(FormatError::ZeroTotalBytes)));

        header.total_bytes = 4096;
        header.align = 31;
        assert!(header.validate().is_ok());
        header.align = 200;
        assert!(matches!(header.validate(), Err(FormatError::BadAlign(200))));
    }

    #[test]
    fn index_end_does_not_overflow() {
        let mut header = Header::new(ContainerKind::Zso, u64::MAX, 0);
        header.block_size = 1;
        assert!(header.validate().is_ok());
        assert_eq!(header.index_end(), None);
        assert_eq!(header.data_start(), u64::MAX);

        let header = Header::new(ContainerKind::Zso, 4096, 0);
        assert_eq!(header.index_end(), Some(0x18 + 12));
    }

    #[test]
    fn total_blocks_ignores_remainder() {
        let header = Header::new(ContainerKind::Cso, 3 * 2048 + 100, 0);
        assert_eq!(header.total_blocks(), 3);
        assert_eq!(header.data_start(), 0x18 + 4 * 4);
    }

    #[test]
    fn truncated_header_is_an_io_error() {
        let err = Header::read(&b"ZISO\x18\x00"[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
