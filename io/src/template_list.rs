//! Template list files: one point-cloud path per line.
//!
//! Blank lines and lines starting with `#` are skipped. Relative paths are
//! returned as written; resolving them is left to the caller.

use cv_core::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Parse template paths from a reader, in file order.
pub fn parse_template_list<R: BufRead>(reader: R) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let entry = line.trim_end_matches('\r').trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        paths.push(PathBuf::from(entry));
    }
    Ok(paths)
}

/// Read a template list file. Failures are reported as [`Error::Load`].
pub fn read_template_list(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::load(path, e))?;
    let paths = parse_template_list(BufReader::new(file)).map_err(|e| Error::load(path, e))?;
    tracing::debug!("{} templates listed in {}", paths.len(), path.display());
    Ok(paths)
}
