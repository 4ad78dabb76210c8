//! # audioconv-sync
//!
//! Mirror synchronization engine: transcode trigger-extension files, hard-link
//! everything else, skip what is already up to date, then prune the mirror.
//!
//! Call [`pipeline::run`] for a full sync + reconcile run, or drive
//! [`MirrorSyncer`] and [`Reconciler`] separately.

pub mod error;
pub mod keep_set;
pub mod path_map;
pub mod pipeline;
pub mod reconcile;
pub mod staleness;
pub mod syncer;
pub mod transcoder;

pub use error::SyncError;
pub use keep_set::KeepSet;
pub use path_map::PathMapper;
pub use pipeline::{run, RunReport};
pub use reconcile::{ReconcileReport, Reconciler, RemovalFailure, RemovalOutcome};
pub use staleness::Staleness;
pub use syncer::{
    Action, FileOutcome, FileRecord, MirrorSyncer, SyncOptions, SyncPlan, SyncReport,
    TranscodeFailure,
};
pub use transcoder::{FfmpegTranscoder, TranscodeError, Transcoder};

/// Run-level cancellation, shared by the walker, the worker pool and
/// in-flight encoder processes.
pub use tokio_util::sync::CancellationToken;
