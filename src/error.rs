//! Crate-level error type.
//!
//! Every failure is fatal for the conversion that raised it: a container
//! whose index table disagrees with its payloads cannot be partially
//! trusted, so nothing here is retried.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;
use crate::header::FormatError;
use crate::policy::PolicyError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("can't open {}: {source}", path.display())]
    OpenInput { path: PathBuf, source: io::Error },

    #[error("can't create {}: {source}", path.display())]
    CreateOutput { path: PathBuf, source: io::Error },

    #[error("error reading input: {0}")]
    Read(#[source] io::Error),

    #[error("error writing output: {0}")]
    Write(#[source] io::Error),

    #[error("container format error: {0}")]
    Format(#[from] FormatError),

    /// Every size guess failed for this block's payload.
    #[error("block {block}: corrupt payload at 0x{offset:08X} ({size} bytes): {reason}")]
    CorruptBlock {
        block:  u64,
        offset: u64,
        size:   u64,
        #[source]
        reason: CodecError,
    },

    #[error("block {block}: compression failed: {source}")]
    Compress {
        block:  u64,
        #[source]
        source: CodecError,
    },

    #[error(
        "align error: offset 0x{offset:X} does not fit the index at align {align}, \
         increase align by 1 (to {})", .align + 1
    )]
    AlignmentOverflow { offset: u64, align: u8 },

    #[error("block {block} out of range (container has {total} blocks)")]
    BlockOutOfRange { block: u64, total: u64 },

    #[error("sector table: {0}")]
    Policy(#[from] PolicyError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
