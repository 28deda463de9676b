//! Per-block compression effort.
//!
//! A sector table is a UTF-8 text file with one directive per line:
//!
//! ```text
//! 16:1          block 16 at level 1
//! 100-200:9     blocks 100..200 (200 excluded) at level 9
//! ```
//!
//! Both forms describe half-open block ranges, a single block `n` being
//! `n..n+1`. Later lines win where ranges overlap. Blank lines are skipped.
//! Effort only changes how hard the codec searches; the container layout is
//! the same whatever the table says.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const MIN_LEVEL: u32 = 1;
pub const MAX_LEVEL: u32 = 9;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("can't read {}: {source}", path.display())]
    Io { path: PathBuf, source: std::io::Error },
    #[error("line {line}: {reason}: {text:?}")]
    Invalid { line: usize, text: String, reason: &'static str },
}

/// Effort level for each block of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effort {
    Uniform(u32),
    PerBlock(Vec<u8>),
}

impl Effort {
    #[inline]
    pub fn level(&self, block: u64) -> u32 {
        match self {
            Effort::Uniform(level)    => *level,
            Effort::PerBlock(levels)  => levels[block as usize] as u32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub start: u64,
    pub end:   u64,
    pub level: u8,
    line:      usize,
    text:      String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorTable {
    directives: Vec<Directive>,
}

impl SectorTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    /// Expand the table over an image of `total_blocks` blocks. Blocks not
    /// named by any directive get `default_level`.
    pub fn resolve(&self, total_blocks: u64, default_level: u32) -> Result<Effort, PolicyError> {
        // 0 marks "not set yet"; valid levels start at 1.
        let mut levels = vec![0u8; total_blocks as usize];
        for d in &self.directives {
            if d.end > total_blocks {
                return Err(PolicyError::Invalid {
                    line:   d.line,
                    text:   d.text.clone(),
                    reason: "block beyond the end of the image",
                });
            }
            let range = &mut levels[d.start as usize..d.end as usize];
            let overridden = range.iter().filter(|&&l| l != 0).count();
            if overridden > 0 {
                log::warn!(
                    "sector table line {}: overrides {} block(s) set by earlier lines",
                    d.line,
                    overridden
                );
            }
            range.fill(d.level);
        }
        for l in levels.iter_mut().filter(|l| **l == 0) {
            *l = default_level as u8;
        }
        Ok(Effort::PerBlock(levels))
    }
}

impl FromStr for SectorTable {
    type Err = PolicyError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut directives = Vec::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            directives.push(parse_line(line, i + 1)?);
        }
        Ok(Self { directives })
    }
}

fn parse_line(text: &str, line: usize) -> Result<Directive, PolicyError> {
    let invalid = |reason| PolicyError::Invalid { line, text: text.to_string(), reason };

    let fields: Vec<&str> = text.split(':').collect();
    if fields.len() != 2 {
        return Err(invalid("expected <block>:<level> or <start>-<end>:<level>"));
    }
    let level: u32 = fields[1].trim().parse().map_err(|_| invalid("level is not a number"))?;
    if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        return Err(invalid("level must be between 1 and 9"));
    }

    let number = |s: &str| s.trim().parse::<u64>().map_err(|_| invalid("block is not a number"));
    let (start, end) = match fields[0].split_once('-') {
        Some((start, end)) => (number(start)?, number(end)?),
        None => {
            let block = number(fields[0])?;
            (block, block.saturating_add(1))
        }
    };
    if start > end {
        return Err(invalid("range start is past its end"));
    }

    Ok(Directive { start, end, level: level as u8, line, text: text.to_string() })
}
