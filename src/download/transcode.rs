//! `ffmpeg` transcoding engine.
//!
//! Remuxes the remote stream into an `.mp4` container with stream copy.
//! Progress comes from `-progress pipe:1` (`out_time_us`) measured against
//! the `Duration:` line ffmpeg prints for the input on stderr; streams with
//! no known duration report no progress.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::DownloadError;
use super::constants::{FFMPEG_OUTPUT_ARGS, STDERR_TAIL_LINES, TRANSCODE_EXTENSION};
use super::engine::{DownloadEngine, ProgressSink};
use crate::settings::EngineKind;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Runs an external `ffmpeg` per item.
#[derive(Debug, Clone)]
pub struct TranscodeEngine {
    program: PathBuf,
}

impl Default for TranscodeEngine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl TranscodeEngine {
    /// Creates an engine invoking `program`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the program this engine invokes.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The transcoder picks its own container: `name.ts` becomes `name.mp4`.
    #[must_use]
    pub fn output_path(local_path: &Path) -> PathBuf {
        local_path.with_extension(TRANSCODE_EXTENSION)
    }

    fn program_label(&self) -> String {
        self.program.display().to_string()
    }
}

/// Full argument list for one transcode.
pub(crate) fn transcode_args(remote_url: &str, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostats", "-y", "-progress", "pipe:1", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(remote_url.into());
    args.extend(FFMPEG_OUTPUT_ARGS.iter().map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

/// Creates a `tokio::process::Command` that opens no console window on Windows.
fn transcoder_command(program: impl AsRef<OsStr>) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

#[async_trait]
impl DownloadEngine for TranscodeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Ffmpeg
    }

    #[instrument(level = "debug", skip(self), fields(program = %self.program.display()))]
    async fn is_available(&self) -> bool {
        let status = transcoder_command(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) if status.success() => true,
            Ok(status) => {
                debug!(%status, "transcoder version check exited unsuccessfully");
                false
            }
            Err(error) => {
                debug!(error = %error, "transcoder version check failed to start");
                false
            }
        }
    }

    #[instrument(skip(self, progress), fields(url = %remote_url, path = %local_path.display()))]
    async fn download(
        &self,
        remote_url: &str,
        local_path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf, DownloadError> {
        let output = Self::output_path(local_path);
        let mut child = transcoder_command(&self.program)
            .args(transcode_args(remote_url, &output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::spawn(self.program_label(), e))?;

        progress.started();
        debug!(pid = child.id(), "transcoder started");

        let (duration_tx, duration_rx) = watch::channel(None);
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(read_stderr(stderr, duration_tx)));

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).split(b'\n');
            while let Ok(Some(raw)) = lines.next_segment().await {
                let line = decode_line(&raw);
                let Some(position) = parse_out_time(&line) else {
                    continue;
                };
                let duration = *duration_rx.borrow();
                if let Some(duration) = duration {
                    progress.progress(time_percent(position, duration));
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::io(&output, e))?;
        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if status.success() {
            info!(path = %output.display(), "transcode finished");
            return Ok(output);
        }

        if let Err(cleanup) = tokio::fs::remove_file(&output).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(error = %cleanup, "failed to remove partial transcode output");
        }
        Err(DownloadError::process_failed(
            self.program_label(),
            status.to_string(),
            stderr_tail.join("\n"),
        ))
    }
}

/// Drains stderr, publishing the input duration and keeping the last lines.
async fn read_stderr<R>(stderr: R, duration_tx: watch::Sender<Option<f64>>) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stderr).split(b'\n');
    while let Ok(Some(raw)) = lines.next_segment().await {
        let line = decode_line(&raw);
        if let Some(duration) = parse_duration_line(&line) {
            // The first Duration line belongs to the input.
            duration_tx.send_if_modified(|known| {
                if known.is_some() {
                    return false;
                }
                *known = Some(duration);
                true
            });
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect()
}

/// Decodes one pipe line. ffmpeg echoes container metadata verbatim, so
/// lines are not guaranteed to be UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Parses `out_time_us=` (or the legacy, also-microsecond `out_time_ms=`)
/// into seconds.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn parse_out_time(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    if key != "out_time_us" && key != "out_time_ms" {
        return None;
    }
    let micros: i64 = value.trim().parse().ok()?;
    (micros >= 0).then(|| micros as f64 / 1_000_000.0)
}

/// Parses the input duration from a `  Duration: 00:01:02.50, start: ...` line.
pub(crate) fn parse_duration_line(line: &str) -> Option<f64> {
    let rest = line.trim().strip_prefix("Duration:")?;
    let stamp = rest.split(',').next()?.trim();
    let seconds = parse_timestamp(stamp)?;
    (seconds > 0.0).then_some(seconds)
}

/// Parses `HH:MM:SS(.frac)` into seconds.
pub(crate) fn parse_timestamp(stamp: &str) -> Option<f64> {
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn time_percent(position: f64, duration: f64) -> f64 {
    (position / duration * 100.0).clamp(0.0, 100.0)
}
