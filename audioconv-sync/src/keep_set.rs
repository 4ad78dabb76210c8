//! The set of mirror paths that must survive reconciliation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Absolute mirror-tree paths produced by a sync pass.
///
/// Only the syncer can grow a `KeepSet`; once handed out it is read-only.
///
/// ```compile_fail
/// use std::path::PathBuf;
/// let forged: audioconv_sync::KeepSet = vec![PathBuf::from("/mirror/x.opus")]
///     .into_iter()
///     .collect();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeepSet {
    paths: HashSet<PathBuf>,
}

impl KeepSet {
    /// Returns `false` when `path` was already present.
    pub(crate) fn insert(&mut self, path: PathBuf) -> bool {
        self.paths.insert(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

// Lets unit tests hand the reconciler an arbitrary set.
#[cfg(test)]
impl FromIterator<PathBuf> for KeepSet {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}
