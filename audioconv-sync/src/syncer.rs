//! Sync pass: mirror the source tree into the mirror tree.
//!
//! The pass runs in two steps:
//!
//! 1. **Plan** — a single-threaded, top-down walk of the source tree. Every
//!    mirror directory is created here, every mapped file path enters the
//!    [`KeepSet`], and each file gets an [`Action`] from the staleness check.
//! 2. **Execute** — `Link` and `Transcode` records run on a rayon pool.
//!    All directories already exist, so workers only ever write files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use audioconv_core::MirrorConfig;

use crate::error::{io_err, walk_err, SyncError};
use crate::keep_set::KeepSet;
use crate::path_map::PathMapper;
use crate::staleness;
use crate::transcoder::{transcode_atomically, TranscodeError, Transcoder};

// ---------------------------------------------------------------------------
// Records and outcomes
// ---------------------------------------------------------------------------

/// What the sync pass decided to do with one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Link,
    Transcode,
    Skip,
}

/// One planned file: where it comes from, where it goes, and what to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub source: PathBuf,
    pub mirror: PathBuf,
    pub action: Action,
}

/// Outcome of an individual file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Transcoded { source: PathBuf, mirror: PathBuf },
    Linked { source: PathBuf, mirror: PathBuf },
    /// Mirror file is at least as new as its source.
    Unchanged { source: PathBuf, mirror: PathBuf },
    /// `--dry-run` mode: the file *would* have been transcoded.
    WouldTranscode { source: PathBuf, mirror: PathBuf },
    /// `--dry-run` mode: the file *would* have been linked.
    WouldLink { source: PathBuf, mirror: PathBuf },
}

impl FileOutcome {
    pub fn mirror(&self) -> &Path {
        match self {
            FileOutcome::Transcoded { mirror, .. }
            | FileOutcome::Linked { mirror, .. }
            | FileOutcome::Unchanged { mirror, .. }
            | FileOutcome::WouldTranscode { mirror, .. }
            | FileOutcome::WouldLink { mirror, .. } => mirror,
        }
    }
}

/// A transcode that failed without aborting the run.
#[derive(Debug)]
pub struct TranscodeFailure {
    pub source: PathBuf,
    pub mirror: PathBuf,
    pub error: TranscodeError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Decide everything, touch nothing.
    pub dry_run: bool,
    /// Abort on the first transcode failure instead of collecting failures.
    pub fail_fast: bool,
}

/// Result of the planning walk.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub keep_set: KeepSet,
    pub records: Vec<FileRecord>,
    /// Mirror directories created (or, in dry-run, that would be created).
    pub created_dirs: Vec<PathBuf>,
}

/// Summary of a finished sync pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub keep_set: KeepSet,
    pub outcomes: Vec<FileOutcome>,
    pub created_dirs: Vec<PathBuf>,
    pub failures: Vec<TranscodeFailure>,
}

impl SyncReport {
    pub fn transcoded(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                FileOutcome::Transcoded { .. } | FileOutcome::WouldTranscode { .. }
            )
        })
    }

    pub fn linked(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Linked { .. } | FileOutcome::WouldLink { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Unchanged { .. }))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(*o)).count()
    }
}

// ---------------------------------------------------------------------------
// MirrorSyncer
// ---------------------------------------------------------------------------

/// Walks the source tree and brings the mirror tree up to date.
pub struct MirrorSyncer<'a, T: Transcoder + ?Sized> {
    config: &'a MirrorConfig,
    transcoder: &'a T,
    options: SyncOptions,
    cancel: CancellationToken,
}

enum FileError {
    Fatal(SyncError),
    Transcode(TranscodeFailure),
}

impl<'a, T: Transcoder + ?Sized> MirrorSyncer<'a, T> {
    pub fn new(config: &'a MirrorConfig, transcoder: &'a T) -> Self {
        Self {
            config,
            transcoder,
            options: SyncOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Plan and execute. Returns the frozen [`KeepSet`] inside the report.
    pub fn sync(&self) -> Result<SyncReport, SyncError> {
        let plan = self.plan()?;
        let (outcomes, failures) = self.execute(&plan.records)?;
        Ok(SyncReport {
            keep_set: plan.keep_set,
            outcomes,
            created_dirs: plan.created_dirs,
            failures,
        })
    }

    /// Top-down walk of the source tree.
    ///
    /// Creates mirror directories (unless dry-run) before any file beneath
    /// them is considered.
    pub fn plan(&self) -> Result<SyncPlan, SyncError> {
        let mapper = PathMapper::from_config(self.config);
        let mut plan = SyncPlan::default();

        let walker = WalkDir::new(&self.config.source)
            .follow_links(false)
            .sort_by_file_name();
        for entry in walker {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let entry = entry.map_err(|e| walk_err(&self.config.source, e))?;
            let source = entry.path();

            if entry.file_type().is_dir() {
                let mirror_dir = mapper.map_dir(source)?;
                if self.ensure_dir(&mirror_dir)? {
                    plan.created_dirs.push(mirror_dir);
                }
                continue;
            }
            if entry.file_type().is_symlink() && source.is_dir() {
                tracing::warn!("skipping symlinked directory {}", source.display());
                continue;
            }

            let mirror = mapper.map(source)?;
            if !plan.keep_set.insert(mirror.clone()) {
                tracing::warn!(
                    "skipping {}: {} is already produced by another source file",
                    source.display(),
                    mirror.display()
                );
                continue;
            }

            let action = if !staleness::is_stale(source, &mirror)? {
                tracing::debug!("unchanged: {}", mirror.display());
                Action::Skip
            } else if mapper.wants_transcode(source) {
                Action::Transcode
            } else {
                Action::Link
            };
            plan.records.push(FileRecord {
                source: source.to_path_buf(),
                mirror,
                action,
            });
        }

        Ok(plan)
    }

    /// Returns `true` when the directory did not exist yet.
    ///
    /// Parents are always handled first by the top-down walk, so only the
    /// last component can be missing (or, in dry-run, sit under a parent
    /// that is not there yet).
    fn ensure_dir(&self, dir: &Path) -> Result<bool, SyncError> {
        match std::fs::symlink_metadata(dir) {
            Ok(meta) if meta.is_dir() => return Ok(false),
            Ok(_) => {
                if self.options.dry_run {
                    return Ok(true);
                }
                // A file from an older source layout sits where the directory goes.
                tracing::info!("Removing {}", dir.display());
                std::fs::remove_file(dir).map_err(|e| io_err(dir, e))?;
            }
            Err(_) if self.options.dry_run => return Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(dir, err)),
        }
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        Ok(true)
    }

    fn execute(
        &self,
        records: &[FileRecord],
    ) -> Result<(Vec<FileOutcome>, Vec<TranscodeFailure>), SyncError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .thread_name(|i| format!("audioconv-worker-{i}"))
            .build()
            .map_err(|e| SyncError::WorkerPool(e.to_string()))?;

        // Fatal errors cancel this run's token only, never the caller's.
        let abort = self.cancel.child_token();
        let results: Vec<Result<FileOutcome, FileError>> = pool.install(|| {
            records
                .par_iter()
                .map(|record| self.process(record, &abort))
                .collect()
        });

        let mut outcomes = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        let mut fatal: Option<SyncError> = None;
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(FileError::Transcode(failure)) => failures.push(failure),
                Err(FileError::Fatal(err)) => {
                    // Report the root cause rather than the cancellations it triggered.
                    let replace = match &fatal {
                        None => true,
                        Some(SyncError::Cancelled) => !matches!(err, SyncError::Cancelled),
                        Some(_) => false,
                    };
                    if replace {
                        fatal = Some(err);
                    }
                }
            }
        }
        if let Some(err) = fatal {
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok((outcomes, failures))
    }

    fn process(&self, record: &FileRecord, abort: &CancellationToken) -> Result<FileOutcome, FileError> {
        let source = record.source.clone();
        let mirror = record.mirror.clone();
        if record.action == Action::Skip {
            return Ok(FileOutcome::Unchanged { source, mirror });
        }
        if abort.is_cancelled() {
            return Err(FileError::Fatal(SyncError::Cancelled));
        }

        match (record.action, self.options.dry_run) {
            (Action::Transcode, true) => {
                tracing::info!("[dry-run] would transcode {}", source.display());
                Ok(FileOutcome::WouldTranscode { source, mirror })
            }
            (Action::Link, true) => {
                tracing::info!("[dry-run] would link {}", source.display());
                Ok(FileOutcome::WouldLink { source, mirror })
            }
            (Action::Transcode, false) => {
                tracing::info!("Transcoding {}", source.display());
                self.transcode(&source, &mirror, abort)?;
                Ok(FileOutcome::Transcoded { source, mirror })
            }
            (Action::Link, false) => {
                tracing::info!("Linking {}", source.display());
                link_into_place(&source, &mirror).map_err(|err| {
                    abort.cancel();
                    FileError::Fatal(err)
                })?;
                Ok(FileOutcome::Linked { source, mirror })
            }
            (Action::Skip, _) => Ok(FileOutcome::Unchanged { source, mirror }),
        }
    }

    fn transcode(&self, source: &Path, mirror: &Path, abort: &CancellationToken) -> Result<(), FileError> {
        if mirror.is_dir() {
            remove_existing(mirror).map_err(|err| {
                abort.cancel();
                FileError::Fatal(err)
            })?;
        }
        match transcode_atomically(self.transcoder, source, self.config.bitrate, mirror, abort) {
            Ok(()) => Ok(()),
            Err(TranscodeError::Cancelled) => Err(FileError::Fatal(SyncError::Cancelled)),
            Err(error) => {
                tracing::error!("failed to transcode {}: {}", source.display(), error);
                if self.options.fail_fast {
                    abort.cancel();
                    return Err(FileError::Fatal(SyncError::Transcode {
                        source_path: source.to_path_buf(),
                        source: error,
                    }));
                }
                Err(FileError::Transcode(TranscodeFailure {
                    source: source.to_path_buf(),
                    mirror: mirror.to_path_buf(),
                    error,
                }))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Link helpers
// ---------------------------------------------------------------------------

/// Replace whatever sits at `mirror` with a hard link to `source`.
pub(crate) fn link_into_place(source: &Path, mirror: &Path) -> Result<(), SyncError> {
    remove_existing(mirror)?;
    std::fs::hard_link(source, mirror).map_err(|err| link_err(source, mirror, err))
}

fn remove_existing(path: &Path) -> Result<(), SyncError> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => Err(err),
    };
    result.map_err(|e| io_err(path, e))
}

fn link_err(source: &Path, mirror: &Path, err: std::io::Error) -> SyncError {
    if is_cross_device(&err) {
        return SyncError::CrossDevice {
            source_path: source.to_path_buf(),
            mirror_path: mirror.to_path_buf(),
        };
    }
    SyncError::Link {
        source_path: source.to_path_buf(),
        mirror_path: mirror.to_path_buf(),
        source: err,
    }
}

#[cfg(unix)]
fn is_cross_device(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_err: &std::io::Error) -> bool {
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
