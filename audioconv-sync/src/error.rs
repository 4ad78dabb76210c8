//! Error types for audioconv-sync.

use std::path::PathBuf;

use thiserror::Error;

use audioconv_core::ConfigError;

use crate::transcoder::TranscodeError;

/// All errors that can abort a sync or reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration was rejected before any tree walk began.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory walk itself failed (unreadable directory, vanished entry).
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// A path handed to the mapper does not live under the source root.
    #[error("{path} is not inside source root {root}")]
    OutsideSourceRoot { path: PathBuf, root: PathBuf },

    #[error("failed to link {source_path} -> {mirror_path}: {source}")]
    Link {
        source_path: PathBuf,
        mirror_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Hard links cannot span the two roots; there is no copy fallback.
    #[error(
        "cannot hard-link {source_path} -> {mirror_path}: source and mirror roots are on different filesystems"
    )]
    CrossDevice {
        source_path: PathBuf,
        mirror_path: PathBuf,
    },

    /// A transcode failed while running in fail-fast mode.
    #[error("failed to transcode {source_path}: {source}")]
    Transcode {
        source_path: PathBuf,
        #[source]
        source: TranscodeError,
    },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("run cancelled")]
    Cancelled,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Walk`].
pub(crate) fn walk_err(root: &std::path::Path, source: walkdir::Error) -> SyncError {
    let path = source
        .path()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| root.to_path_buf());
    SyncError::Walk { path, source }
}
