//! Transcoder boundary and the atomic output protocol around it.
//!
//! ## `transcode_atomically`
//!
//! 1. Encode into a hidden sibling `.<stem>.audioconv-tmp<ext>` (the output
//!    extension is kept so the encoder can pick the container).
//! 2. On success, rename over the mirror path (atomic on POSIX).
//! 3. On failure, remove the temporary file; the previous mirror file is
//!    left as it was.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use audioconv_core::Bitrate;

/// Marker inserted into temporary output names.
pub const TEMP_MARKER: &str = ".audioconv-tmp";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoder-specific failure that is not a process exit.
    #[error("{0}")]
    Other(String),

    #[error("transcode cancelled")]
    Cancelled,
}

/// Produces an encoded file at `output` from the audio file at `input`.
///
/// Implementations must overwrite `output` if it exists and should return
/// [`TranscodeError::Cancelled`] promptly once `cancel` fires.
pub trait Transcoder: Send + Sync {
    fn transcode(
        &self,
        input: &Path,
        bitrate: Bitrate,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError>;
}

/// Runs `ffmpeg` as a child process.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, input: &Path, bitrate: Bitrate, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-nostdin", "-y", "-hide_banner", "-loglevel", "warning", "-i"])
            .arg(input)
            .arg("-b:a")
            .arg(bitrate.to_string())
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new(audioconv_core::types::DEFAULT_FFMPEG)
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(
        &self,
        input: &Path,
        bitrate: Bitrate,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError> {
        let mut child = self
            .command(input, bitrate, output)
            .spawn()
            .map_err(|source| TranscodeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Drain stderr on its own thread so a chatty encoder cannot fill the pipe.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let status = loop {
            if cancel.is_cancelled() {
                stop(&mut child);
                return Err(TranscodeError::Cancelled);
            }
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    stop(&mut child);
                    return Err(TranscodeError::Io {
                        path: output.to_path_buf(),
                        source,
                    });
                }
            }
        };

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(TranscodeError::Failed {
                program: self.program.clone(),
                status,
                stderr: stderr.trim().to_owned(),
            });
        }
        if !stderr.trim().is_empty() {
            tracing::warn!("{}: {}", input.display(), stderr.trim());
        }
        Ok(())
    }
}

/// Temporary sibling used while encoding `dest`:
/// `<dir>/song.opus` → `<dir>/.song.audioconv-tmp.opus`.
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(dest.file_stem().unwrap_or_default());
    name.push(TEMP_MARKER);
    if let Some(ext) = dest.extension() {
        name.push(".");
        name.push(ext);
    }
    dest.with_file_name(name)
}

/// Kill the encoder and reap it so no zombie outlives the run.
fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `transcoder` into a temporary sibling of `dest` and rename it into
/// place only when encoding succeeded.
pub fn transcode_atomically<T: Transcoder + ?Sized>(
    transcoder: &T,
    input: &Path,
    bitrate: Bitrate,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<(), TranscodeError> {
    let tmp = temp_path_for(dest);
    transcode_atomically_with_tmp(transcoder, input, bitrate, dest, &tmp, cancel)
}

fn transcode_atomically_with_tmp<T: Transcoder + ?Sized>(
    transcoder: &T,
    input: &Path,
    bitrate: Bitrate,
    dest: &Path,
    tmp: &Path,
    cancel: &CancellationToken,
) -> Result<(), TranscodeError> {
    if let Err(err) = transcoder.transcode(input, bitrate, tmp, cancel) {
        let _ = std::fs::remove_file(tmp);
        return Err(err);
    }
    if let Err(source) = std::fs::rename(tmp, dest) {
        let _ = std::fs::remove_file(tmp);
        return Err(TranscodeError::Io {
            path: dest.to_path_buf(),
            source,
        });
    }
    Ok(())
}
