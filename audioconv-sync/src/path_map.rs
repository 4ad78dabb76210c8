//! Source-tree path → mirror-tree path translation. Pure; no filesystem access.

use std::path::{Path, PathBuf};

use audioconv_core::{MirrorConfig, TranscodeRule};

use crate::SyncError;

/// Maps paths under `source_root` to their counterparts under `mirror_root`.
#[derive(Debug, Clone, Copy)]
pub struct PathMapper<'a> {
    source_root: &'a Path,
    mirror_root: &'a Path,
    rule: &'a TranscodeRule,
}

impl<'a> PathMapper<'a> {
    pub fn new(source_root: &'a Path, mirror_root: &'a Path, rule: &'a TranscodeRule) -> Self {
        Self {
            source_root,
            mirror_root,
            rule,
        }
    }

    pub fn from_config(config: &'a MirrorConfig) -> Self {
        Self::new(&config.source, &config.mirror, &config.rule)
    }

    /// Mirror path for a source file, with the output extension swapped in
    /// when the file is transcodable.
    pub fn map(&self, source_path: &Path) -> Result<PathBuf, SyncError> {
        map(source_path, self.source_root, self.mirror_root, self.rule)
    }

    /// Mirror path for a source directory. Extensions are never rewritten.
    pub fn map_dir(&self, source_dir: &Path) -> Result<PathBuf, SyncError> {
        let relative = relative_to(source_dir, self.source_root)?;
        if relative.as_os_str().is_empty() {
            return Ok(self.mirror_root.to_path_buf());
        }
        Ok(self.mirror_root.join(relative))
    }

    pub fn wants_transcode(&self, source_path: &Path) -> bool {
        self.rule.wants_transcode(source_path)
    }
}

/// Re-root `source_path` from `source_root` under `mirror_root`, rewriting
/// the final extension to `rule.output` when it is one of `rule.triggers`.
///
/// Fails with [`SyncError::OutsideSourceRoot`] when `source_path` is not a
/// descendant of `source_root`.
pub fn map(
    source_path: &Path,
    source_root: &Path,
    mirror_root: &Path,
    rule: &TranscodeRule,
) -> Result<PathBuf, SyncError> {
    let relative = relative_to(source_path, source_root)?;
    if relative.as_os_str().is_empty() {
        return Err(SyncError::OutsideSourceRoot {
            path: source_path.to_path_buf(),
            root: source_root.to_path_buf(),
        });
    }
    let mut mirror_path = mirror_root.join(relative);
    if rule.wants_transcode(source_path) {
        mirror_path.set_extension(rule.output.without_dot());
    }
    Ok(mirror_path)
}

fn relative_to<'p>(path: &'p Path, root: &Path) -> Result<&'p Path, SyncError> {
    path.strip_prefix(root)
        .map_err(|_| SyncError::OutsideSourceRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })
}
