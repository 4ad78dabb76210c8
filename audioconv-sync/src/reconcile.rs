//! Reconciliation pass: delete mirror entries nothing in the source maps to.
//!
//! The mirror tree is listed contents-first (children before their parent)
//! and the listing is materialized before anything is deleted. A directory
//! is judged only after everything beneath it has been handled, so a chain
//! of directories emptied by nested deletions collapses in one pass. The
//! mirror root itself is never removed.
//!
//! Deletion is best-effort per entry: a failure is logged and recorded and
//! the pass moves on. A directory whose child could not be removed is simply
//! not empty.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::{DirEntry, WalkDir};

use crate::keep_set::KeepSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RemovalOutcome {
    RemovedFile { path: PathBuf },
    RemovedDir { path: PathBuf },
    WouldRemoveFile { path: PathBuf },
    WouldRemoveDir { path: PathBuf },
}

impl RemovalOutcome {
    pub fn path(&self) -> &Path {
        match self {
            RemovalOutcome::RemovedFile { path }
            | RemovalOutcome::RemovedDir { path }
            | RemovalOutcome::WouldRemoveFile { path }
            | RemovalOutcome::WouldRemoveDir { path } => path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(
            self,
            RemovalOutcome::RemovedDir { .. } | RemovalOutcome::WouldRemoveDir { .. }
        )
    }
}

/// An entry that could not be listed or removed.
#[derive(Debug)]
pub struct RemovalFailure {
    pub path: PathBuf,
    pub error: std::io::Error,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub removals: Vec<RemovalOutcome>,
    pub failures: Vec<RemovalFailure>,
}

impl ReconcileReport {
    pub fn removed_files(&self) -> usize {
        self.removals.iter().filter(|r| !r.is_dir()).count()
    }

    pub fn removed_dirs(&self) -> usize {
        self.removals.iter().filter(|r| r.is_dir()).count()
    }
}

/// Deletes orphaned files and emptied directories under the mirror root.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler<'a> {
    mirror_root: &'a Path,
    keep_set: &'a KeepSet,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(mirror_root: &'a Path, keep_set: &'a KeepSet) -> Self {
        Self {
            mirror_root,
            keep_set,
            dry_run: false,
        }
    }

    /// Report what would be removed without removing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let entries = self.list(&mut report);
        let pending = if self.dry_run {
            self.pending_dirs()
        } else {
            HashSet::new()
        };

        // Paths gone (or, in dry-run, as good as gone) so far.
        let mut removed: HashSet<PathBuf> = HashSet::new();
        for entry in entries {
            let path = entry.path();
            if entry.file_type().is_dir() {
                if pending.contains(path) {
                    continue;
                }
                if self.is_empty_dir(path, &removed, &mut report) {
                    self.remove(path, true, &mut removed, &mut report);
                }
            } else if !self.keep_set.contains(path) {
                self.remove(path, false, &mut removed, &mut report);
            }
        }
        report
    }

    /// Directories a real sync would leave non-empty: every ancestor of a
    /// keep-set path below the mirror root, plus keep-set paths that a
    /// directory currently occupies. A dry run has not written those files
    /// yet, so the disk alone cannot tell.
    fn pending_dirs(&self) -> HashSet<&Path> {
        let mut dirs = HashSet::new();
        for path in self.keep_set.iter() {
            dirs.insert(path);
            for ancestor in path.ancestors().skip(1) {
                if ancestor == self.mirror_root || !dirs.insert(ancestor) {
                    break;
                }
            }
        }
        dirs
    }

    fn list(&self, report: &mut ReconcileReport) -> Vec<DirEntry> {
        let walker = WalkDir::new(self.mirror_root)
            .min_depth(1)
            .follow_links(false)
            .contents_first(true)
            .sort_by_file_name();

        let mut entries = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.mirror_root.to_path_buf());
                    tracing::warn!("cannot list {}: {}", path.display(), err);
                    report.failures.push(RemovalFailure {
                        path,
                        error: err.into(),
                    });
                }
            }
        }
        entries
    }

    fn is_empty_dir(
        &self,
        dir: &Path,
        removed: &HashSet<PathBuf>,
        report: &mut ReconcileReport,
    ) -> bool {
        match std::fs::read_dir(dir) {
            Ok(children) => children
                .filter_map(Result::ok)
                .all(|child| removed.contains(&child.path())),
            Err(error) => {
                tracing::warn!("cannot read {}: {}", dir.display(), error);
                report.failures.push(RemovalFailure {
                    path: dir.to_path_buf(),
                    error,
                });
                false
            }
        }
    }

    fn remove(
        &self,
        path: &Path,
        is_dir: bool,
        removed: &mut HashSet<PathBuf>,
        report: &mut ReconcileReport,
    ) {
        let path_buf = path.to_path_buf();
        if self.dry_run {
            tracing::info!("[dry-run] would remove {}", path.display());
            report.removals.push(if is_dir {
                RemovalOutcome::WouldRemoveDir { path: path_buf.clone() }
            } else {
                RemovalOutcome::WouldRemoveFile { path: path_buf.clone() }
            });
            removed.insert(path_buf);
            return;
        }

        tracing::info!("Removing {}", path.display());
        let result = if is_dir {
            std::fs::remove_dir(path)
        } else {
            std::fs::remove_file(path)
        };
        match result {
            Ok(()) => {
                report.removals.push(if is_dir {
                    RemovalOutcome::RemovedDir { path: path_buf.clone() }
                } else {
                    RemovalOutcome::RemovedFile { path: path_buf.clone() }
                });
                removed.insert(path_buf);
            }
            Err(error) => {
                tracing::warn!("failed to remove {}: {}", path.display(), error);
                report.failures.push(RemovalFailure {
                    path: path_buf,
                    error,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn keep(paths: &[PathBuf]) -> KeepSet {
        paths.iter().cloned().collect()
    }

    #[test]
    fn orphan_file_is_removed_and_kept_file_survives() {
        let root = TempDir::new().unwrap();
        let kept = root.path().join("kept.opus");
        let orphan = root.path().join("orphan.opus");
        fs::write(&kept, "k").unwrap();
        fs::write(&orphan, "o").unwrap();

        let keep_set = keep(&[kept.clone()]);
        let report = Reconciler::new(root.path(), &keep_set).reconcile();
        assert!(kept.exists());
        assert!(!orphan.exists());
        assert_eq!(report.removed_files(), 1);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn emptied_directories_cascade_but_root_survives() {
        let root = TempDir::new().unwrap();
        let deep = root.path().join("a/b/c");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("old.opus"), "x").unwrap();

        let report = Reconciler::new(root.path(), &KeepSet::default()).reconcile();
        assert!(!root.path().join("a").exists());
        assert!(root.path().exists(), "mirror root is never removed");
        assert_eq!(report.removed_files(), 1);
        assert_eq!(report.removed_dirs(), 3);
    }

    #[test]
    fn cascade_stops_at_first_non_empty_ancestor() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("a/b")).unwrap();
        fs::write(root.path().join("a/b/old.opus"), "x").unwrap();
        let kept = root.path().join("a/cover.jpg");
        fs::write(&kept, "x").unwrap();

        Reconciler::new(root.path(), &keep(&[kept.clone()])).reconcile();
        assert!(!root.path().join("a/b").exists());
        assert!(kept.exists());
    }

    #[test]
    fn pre_existing_empty_directory_is_removed() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("empty")).unwrap();
        Reconciler::new(root.path(), &KeepSet::default()).reconcile();
        assert!(!root.path().join("empty").exists());
    }

    #[test]
    fn dry_run_simulates_cascade_without_touching_disk() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("a/b")).unwrap();
        fs::write(root.path().join("a/b/old.opus"), "x").unwrap();

        let report = Reconciler::new(root.path(), &KeepSet::default())
            .dry_run(true)
            .reconcile();
        assert!(root.path().join("a/b/old.opus").exists());
        let paths: Vec<_> = report.removals.iter().map(|r| r.path().to_path_buf()).collect();
        assert_eq!(
            paths,
            vec![
                root.path().join("a/b/old.opus"),
                root.path().join("a/b"),
                root.path().join("a"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn failed_deletion_is_recorded_and_pass_continues() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let locked = root.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("stuck.opus"), "x").unwrap();
        fs::write(root.path().join("zz-orphan.opus"), "x").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        // Root bypasses directory permissions; nothing to observe then.
        let canary = locked.join("canary");
        if fs::write(&canary, "x").is_ok() {
            let _ = fs::remove_file(&canary);
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let report = Reconciler::new(root.path(), &KeepSet::default()).reconcile();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(locked.join("stuck.opus").exists());
        assert!(locked.exists(), "non-empty directory must survive");
        assert!(!root.path().join("zz-orphan.opus").exists());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, locked.join("stuck.opus"));
    }

    #[test]
    fn dry_run_keeps_directory_that_sync_will_fill() {
        let root = TempDir::new().unwrap();
        let album = root.path().join("a");
        fs::create_dir_all(&album).unwrap();
        let old = album.join("old.opus");
        fs::write(&old, "x").unwrap();
        let keep_set = keep(&[album.join("new.opus")]);

        let report = Reconciler::new(root.path(), &keep_set)
            .dry_run(true)
            .reconcile();
        assert_eq!(
            report.removals,
            vec![RemovalOutcome::WouldRemoveFile { path: old }]
        );
    }
}
