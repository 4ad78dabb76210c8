//! Modification-time staleness check for a single mirror file.
//!
//! A linked mirror file shares its inode with the source, so its mtime is
//! always equal and it is never regenerated. A transcoded file is stamped
//! when it is written, so touching the source afterwards makes it stale.

use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use crate::{error::io_err, SyncError};

/// Staleness classification of one mirror path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Nothing exists at the mirror path.
    Missing,
    /// The source is newer than the mirror file, or the mirror path holds a
    /// directory where a file belongs.
    Outdated,
    Fresh,
}

impl Staleness {
    pub fn needs_work(self) -> bool {
        self != Staleness::Fresh
    }
}

/// Compare `source_path` against `mirror_path`.
///
/// Both sides are read with `symlink_metadata` so a linked symlink compares
/// against itself rather than its target. Regenerate iff
/// `mtime(source) > mtime(mirror)`.
pub fn check(source_path: &Path, mirror_path: &Path) -> Result<Staleness, SyncError> {
    let mirror_meta = match std::fs::symlink_metadata(mirror_path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound || parent_not_a_dir(&err) => {
            return Ok(Staleness::Missing)
        }
        Err(err) => return Err(io_err(mirror_path, err)),
    };
    if mirror_meta.is_dir() {
        return Ok(Staleness::Outdated);
    }
    let source_meta =
        std::fs::symlink_metadata(source_path).map_err(|e| io_err(source_path, e))?;

    let source_mtime = modified(&source_meta, source_path)?;
    let mirror_mtime = modified(&mirror_meta, mirror_path)?;
    if source_mtime > mirror_mtime {
        Ok(Staleness::Outdated)
    } else {
        Ok(Staleness::Fresh)
    }
}

/// `true` when the mirror file must be (re)generated.
pub fn is_stale(source_path: &Path, mirror_path: &Path) -> Result<bool, SyncError> {
    check(source_path, mirror_path).map(Staleness::needs_work)
}

// Dry runs leave files in place where a mirror directory will go.
#[cfg(unix)]
fn parent_not_a_dir(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOTDIR)
}

#[cfg(not(unix))]
fn parent_not_a_dir(_err: &std::io::Error) -> bool {
    false
}

fn modified(meta: &std::fs::Metadata, path: &Path) -> Result<SystemTime, SyncError> {
    meta.modified().map_err(|e| io_err(path, e))
}
