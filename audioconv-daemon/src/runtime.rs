use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use audioconv_core::MirrorConfig;
use audioconv_sync::{
    pipeline, CancellationToken, FfmpegTranscoder, RunReport, SyncError, SyncOptions, Transcoder,
};

use crate::error::{io_err, DaemonError};

/// Quiet period after the last relevant source event before a re-run.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

/// Run one sync + reconcile pass and block until it finishes.
///
/// Ctrl-C cancels the run: in-flight encoders are killed and the pass stops
/// before reconciliation.
pub fn run_once_blocking(
    config: &MirrorConfig,
    options: SyncOptions,
) -> Result<RunReport, DaemonError> {
    let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new(&config.ffmpeg));
    build_runtime()?.block_on(run_once(Arc::new(config.clone()), transcoder, options))
}

/// Run once, then keep the mirror in sync with the source until Ctrl-C.
pub fn watch_blocking(config: &MirrorConfig, options: SyncOptions) -> Result<(), DaemonError> {
    let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new(&config.ffmpeg));
    build_runtime()?.block_on(watch(Arc::new(config.clone()), transcoder, options))
}

pub async fn run_once(
    config: Arc<MirrorConfig>,
    transcoder: Arc<dyn Transcoder>,
    options: SyncOptions,
) -> Result<RunReport, DaemonError> {
    let cancel = CancellationToken::new();
    let mut handle = spawn_run(config, transcoder, options, cancel.clone());

    tokio::select! {
        joined = &mut handle => return finish(joined),
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                cancel.cancel();
                let _ = handle.await;
                return Err(DaemonError::Signal(err.to_string()));
            }
            tracing::info!("received ctrl-c, cancelling run");
            cancel.cancel();
        }
    }
    finish(handle.await)
}

pub async fn watch(
    config: Arc<MirrorConfig>,
    transcoder: Arc<dyn Transcoder>,
    options: SyncOptions,
) -> Result<(), DaemonError> {
    let (shutdown_tx, _) = broadcast::channel::<()>(4);
    let cancel = CancellationToken::new();

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let cancel = cancel.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = watcher_task(config, transcoder, options, cancel, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    let _ = shutdown.send(());
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, stopping watcher");
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Signal(err.to_string())),
                    }
                }
            }
        })
    };

    let (watcher_result, signal_result) = tokio::join!(watcher_handle, signal_handle);
    handle_join("watcher", watcher_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn watcher_task(
    config: Arc<MirrorConfig>,
    transcoder: Arc<dyn Transcoder>,
    options: SyncOptions,
    cancel: CancellationToken,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&config.source, RecursiveMode::Recursive)?;
    tracing::info!(source = %config.source.display(), "watching source tree");

    run_logged(&config, &transcoder, options, &cancel, "startup").await?;

    let mut debounce = Debouncer::new(DEBOUNCE_WINDOW);
    loop {
        let deadline = debounce.deadline();
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                match event {
                    Ok(event) if is_relevant_event(&event, &config.mirror) => {
                        tracing::debug!(paths = ?event.paths, "source changed");
                        debounce.note(Instant::now());
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(error = %err, "watcher event error"),
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if debounce.take_due(Instant::now()) {
                    run_logged(&config, &transcoder, options, &cancel, "watcher").await?;
                }
            }
        }
        if cancel.is_cancelled() {
            break;
        }
    }
    Ok(())
}

/// Run the pipeline on the blocking pool; a failed run is logged, not fatal.
async fn run_logged(
    config: &Arc<MirrorConfig>,
    transcoder: &Arc<dyn Transcoder>,
    options: SyncOptions,
    cancel: &CancellationToken,
    trigger: &'static str,
) -> Result<(), DaemonError> {
    let started = Instant::now();
    let handle = spawn_run(config.clone(), transcoder.clone(), options, cancel.clone());
    match finish(handle.await) {
        Ok(report) => {
            tracing::info!(
                trigger,
                transcoded = report.sync.transcoded(),
                linked = report.sync.linked(),
                unchanged = report.sync.unchanged(),
                removed = report.reconcile.removals.len(),
                failed = report.sync.failures.len() + report.reconcile.failures.len(),
                duration_ms = started.elapsed().as_millis(),
                "sync run completed",
            );
            Ok(())
        }
        Err(DaemonError::Sync(SyncError::Cancelled)) => {
            tracing::info!(trigger, "sync run cancelled");
            Ok(())
        }
        Err(err @ DaemonError::Join { .. }) => Err(err),
        Err(err) => {
            tracing::error!(trigger, error = %err, "sync run failed");
            Ok(())
        }
    }
}

fn spawn_run(
    config: Arc<MirrorConfig>,
    transcoder: Arc<dyn Transcoder>,
    options: SyncOptions,
    cancel: CancellationToken,
) -> JoinHandle<Result<RunReport, SyncError>> {
    tokio::task::spawn_blocking(move || pipeline::run(&config, &*transcoder, options, &cancel))
}

fn finish(
    joined: Result<Result<RunReport, SyncError>, JoinError>,
) -> Result<RunReport, DaemonError> {
    let result = joined.map_err(|err| DaemonError::Join {
        task: "sync",
        message: err.to_string(),
    })?;
    Ok(result?)
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            message: err.to_string(),
        }),
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))
}

/// Source changes worth a re-run: anything created, modified or removed
/// outside the mirror tree.
fn is_relevant_event(event: &Event, mirror_root: &Path) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|path| !path.starts_with(mirror_root))
}

/// Trailing-edge debounce: fires once the source has been quiet for `window`.
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    last_event: Option<Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last_event: None,
        }
    }

    fn note(&mut self, now: Instant) {
        self.last_event = Some(now);
    }

    fn deadline(&self) -> Option<Instant> {
        self.last_event.map(|seen| seen + self.window)
    }

    /// `true` (and reset) when the window has elapsed since the last event.
    fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.last_event = None;
                true
            }
            _ => false,
        }
    }
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    use audioconv_core::{config, Bitrate, ConfigOverrides};
    use audioconv_sync::TranscodeError;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind};
    use tempfile::TempDir;
    use tokio::time::advance;

    struct Stamp;

    impl Transcoder for Stamp {
        fn transcode(
            &self,
            _input: &Path,
            bitrate: Bitrate,
            output: &Path,
            _cancel: &CancellationToken,
        ) -> Result<(), TranscodeError> {
            fs::write(output, bitrate.to_string()).map_err(|source| TranscodeError::Io {
                path: output.to_path_buf(),
                source,
            })
        }
    }

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn debounce_coalesces_rapid_events() {
        let mut debounce = Debouncer::new(Duration::from_millis(100));
        assert!(debounce.deadline().is_none());

        for _ in 0..5 {
            debounce.note(Instant::now());
            advance(Duration::from_millis(30)).await;
            assert!(!debounce.take_due(Instant::now()), "burst still in progress");
        }

        advance(Duration::from_millis(100)).await;
        assert!(debounce.take_due(Instant::now()));
        assert!(!debounce.take_due(Instant::now()), "fires once per burst");
        assert!(debounce.deadline().is_none());
    }

    #[test]
    fn mirror_events_and_reads_are_ignored() {
        let mirror = Path::new("/music/portable");
        assert!(is_relevant_event(
            &event(EventKind::Create(CreateKind::File), "/music/library/a.flac"),
            mirror
        ));
        assert!(is_relevant_event(
            &event(EventKind::Remove(RemoveKind::File), "/music/library/a.flac"),
            mirror
        ));
        assert!(!is_relevant_event(
            &event(EventKind::Modify(ModifyKind::Any), "/music/portable/a.opus"),
            mirror
        ));
        assert!(!is_relevant_event(
            &event(EventKind::Access(AccessKind::Any), "/music/library/a.flac"),
            mirror
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_once_syncs_on_the_blocking_pool() {
        let tmp = TempDir::new().expect("tmp");
        let source = tmp.path().join("src");
        let mirror = tmp.path().join("mirror");
        fs::create_dir_all(source.join("a")).expect("source");
        fs::create_dir_all(&mirror).expect("mirror");
        fs::write(source.join("a/song.flac"), "lossless").expect("song");
        let config = config::resolve(
            None,
            ConfigOverrides {
                source: Some(source),
                dest: Some(mirror),
                ..Default::default()
            },
        )
        .expect("resolve");

        let report = run_once(Arc::new(config.clone()), Arc::new(Stamp), SyncOptions::default())
            .await
            .expect("run");
        assert_eq!(report.sync.transcoded(), 1);
        assert_eq!(
            fs::read_to_string(config.mirror.join("a/song.opus")).expect("encoded"),
            "128000"
        );
    }
}
