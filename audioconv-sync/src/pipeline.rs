//! Shared sync pipeline entrypoint used by CLI and daemon.

use tokio_util::sync::CancellationToken;

use audioconv_core::MirrorConfig;

use crate::reconcile::{ReconcileReport, Reconciler};
use crate::syncer::{MirrorSyncer, SyncOptions, SyncReport};
use crate::transcoder::Transcoder;
use crate::SyncError;

/// Everything one sync + reconcile run did.
#[derive(Debug, Default)]
pub struct RunReport {
    pub sync: SyncReport,
    pub reconcile: ReconcileReport,
}

impl RunReport {
    /// `true` when no transcode and no removal failed.
    pub fn is_success(&self) -> bool {
        self.sync.failures.is_empty() && self.reconcile.failures.is_empty()
    }

    /// Total number of link, transcode and removal actions (real or simulated).
    pub fn actions(&self) -> usize {
        self.sync.transcoded() + self.sync.linked() + self.reconcile.removals.len()
    }
}

/// Run the sync pass to completion, then reconcile the mirror tree.
///
/// This is the canonical entrypoint for both `audioconv sync` and the watch
/// daemon. Any sync-phase error returns before reconciliation starts, so
/// nothing is deleted on the strength of an incomplete keep-set.
pub fn run<T: Transcoder + ?Sized>(
    config: &MirrorConfig,
    transcoder: &T,
    options: SyncOptions,
    cancel: &CancellationToken,
) -> Result<RunReport, SyncError> {
    let sync = MirrorSyncer::new(config, transcoder)
        .with_options(options)
        .with_cancel(cancel.clone())
        .sync()?;
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    let reconcile = Reconciler::new(&config.mirror, &sync.keep_set)
        .dry_run(options.dry_run)
        .reconcile();
    Ok(RunReport { sync, reconcile })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use audioconv_core::{Bitrate, TranscodeRule};
    use tempfile::TempDir;

    use super::*;
    use crate::transcoder::TranscodeError;

    struct Touch;

    impl Transcoder for Touch {
        fn transcode(
            &self,
            _input: &Path,
            _bitrate: Bitrate,
            output: &Path,
            _cancel: &CancellationToken,
        ) -> Result<(), TranscodeError> {
            fs::write(output, "encoded").map_err(|source| TranscodeError::Io {
                path: output.to_path_buf(),
                source,
            })
        }
    }

    /// Encodes like [`Touch`] but cancels `root` during the first call.
    struct CancelsRoot {
        root: CancellationToken,
        calls: AtomicUsize,
    }

    impl Transcoder for CancelsRoot {
        fn transcode(
            &self,
            input: &Path,
            bitrate: Bitrate,
            output: &Path,
            cancel: &CancellationToken,
        ) -> Result<(), TranscodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.root.cancel();
            Touch.transcode(input, bitrate, output, cancel)
        }
    }

    fn config(tmp: &TempDir) -> MirrorConfig {
        let source = tmp.path().join("src");
        let mirror = tmp.path().join("mirror");
        fs::create_dir_all(&source).expect("source");
        fs::create_dir_all(&mirror).expect("mirror");
        MirrorConfig {
            source,
            mirror,
            rule: TranscodeRule::default(),
            bitrate: Bitrate::default(),
            ffmpeg: PathBuf::from("ffmpeg"),
            jobs: 1,
        }
    }

    #[test]
    fn run_on_empty_trees_does_nothing() {
        let tmp = TempDir::new().expect("tmp");
        let config = config(&tmp);
        let report = run(&config, &Touch, SyncOptions::default(), &CancellationToken::new())
            .expect("run");
        assert!(report.is_success());
        assert_eq!(report.actions(), 0);
    }

    #[test]
    fn cancelled_run_never_reconciles() {
        let tmp = TempDir::new().expect("tmp");
        let config = config(&tmp);
        let orphan = config.mirror.join("orphan.opus");
        fs::write(&orphan, "x").expect("orphan");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run(&config, &Touch, SyncOptions::default(), &cancel).unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert!(orphan.exists());
    }

    #[test]
    fn nested_token_observes_root_cancellation() {
        let root = CancellationToken::new();
        let grandchild = root.child_token().child_token();
        root.cancel();
        assert!(grandchild.is_cancelled());
        assert!(grandchild.child_token().is_cancelled());
    }

    #[test]
    fn cancelling_outer_token_stops_workers_of_a_nested_run() {
        let tmp = TempDir::new().expect("tmp");
        let config = config(&tmp);
        for name in ["a.flac", "b.flac", "c.flac"] {
            fs::write(config.source.join(name), "lossless").expect("source");
        }
        let orphan = config.mirror.join("orphan.opus");
        fs::write(&orphan, "x").expect("orphan");

        let root = CancellationToken::new();
        let transcoder = CancelsRoot {
            root: root.clone(),
            calls: AtomicUsize::new(0),
        };
        let run_token = root.child_token().child_token();
        let err = run(&config, &transcoder, SyncOptions::default(), &run_token).unwrap_err();

        assert!(matches!(err, SyncError::Cancelled), "got: {err}");
        assert_eq!(transcoder.calls.load(Ordering::SeqCst), 1);
        assert!(orphan.exists());
    }
}
