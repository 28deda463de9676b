//! Directory conversion.

use std::fs;
use std::path::{Path, PathBuf};

use crate::convert::{decode, encode, EncodeOptions, ProgressFn, Stats};
use crate::error::{Error, Result};
use crate::header::ContainerKind;

/// Extension of uncompressed images.
pub const IMAGE_EXTENSION: &str = "iso";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Compress,
    Decompress,
}

/// Regular files in `dir` whose extension matches one of `extensions`,
/// ignoring case, sorted by path.
pub fn discover(dir: impl AsRef<Path>, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let open_err = |source| Error::OpenInput { path: dir.to_path_buf(), source };

    let mut found = Vec::new();
    for entry in fs::read_dir(dir).map_err(open_err)? {
        let path = entry.map_err(open_err)?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)));
        if matches && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// `path` with its extension replaced by `extension`.
pub fn output_path(path: &Path, extension: &str) -> PathBuf {
    path.with_extension(extension)
}

/// Convert every matching file in `dir`, next to its source. Stops at the
/// first failure.
///
/// `progress` is called with each source path before the conversion starts
/// and may hand back a callback for that file.
pub fn convert_dir<'a>(
    dir:       impl AsRef<Path>,
    direction: Direction,
    opts:      &EncodeOptions,
    mut progress: impl FnMut(&Path) -> Option<Box<ProgressFn<'a>>>,
) -> Result<Vec<(PathBuf, Stats)>> {
    let (sources, target_ext): (Vec<PathBuf>, &str) = match direction {
        Direction::Compress => (discover(&dir, &[IMAGE_EXTENSION])?, opts.format.extension()),
        Direction::Decompress => {
            let exts = [ContainerKind::Zso.extension(), ContainerKind::Cso.extension()];
            (discover(&dir, &exts)?, IMAGE_EXTENSION)
        }
    };
    log::info!("{} file(s) to convert in {}", sources.len(), dir.as_ref().display());

    let mut done = Vec::with_capacity(sources.len());
    for src in sources {
        let dst = output_path(&src, target_ext);
        let mut cb = progress(&src);
        let stats = match direction {
            Direction::Compress   => encode(&src, &dst, opts, cb.as_deref_mut())?,
            Direction::Decompress => decode(&src, &dst, cb.as_deref_mut())?,
        };
        done.push((src, stats));
    }
    Ok(done)
}
