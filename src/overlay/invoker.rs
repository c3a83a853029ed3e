//! ffmpeg subprocess invocation
//!
//! The command line is a fixed argument vector. The filter expression travels
//! as one argv entry and never passes through a shell, so its escaping only
//! has to satisfy the filter parser.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::filter::FilterExpression;
use crate::error::{OverlayError, Result};

/// Default number of stderr characters kept for diagnostics.
pub const DEFAULT_STDERR_LIMIT: usize = 4000;

/// How long stderr may stay open after ffmpeg itself has exited.
///
/// A background child can inherit the pipe and hold it open indefinitely.
const STDERR_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Outcome of one ffmpeg run that started and exited on its own.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    /// Leading part of stderr, at most the configured limit in characters
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessResult {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs ffmpeg with a drawtext filter.
#[derive(Debug, Clone)]
pub struct FfmpegInvoker {
    ffmpeg_path: PathBuf,
    timeout: Option<Duration>,
    stderr_limit: usize,
}

impl FfmpegInvoker {
    /// Create an invoker for the given binary with no timeout.
    #[must_use]
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout: None,
            stderr_limit: DEFAULT_STDERR_LIMIT,
        }
    }

    /// Kill ffmpeg when it runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_stderr_limit(mut self, limit: usize) -> Self {
        self.stderr_limit = limit;
        self
    }

    /// Build the ffmpeg argument vector.
    pub(crate) fn build_args(
        input: &Path,
        output: &Path,
        filter: &FilterExpression,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-y", "-i"]
            .iter()
            .map(OsString::from)
            .collect();

        args.push(input.into());
        args.push("-vf".into());
        args.push(filter.as_str().into());
        args.push("-c:a".into());
        args.push("copy".into());
        args.push(output.into());

        args
    }

    /// Run ffmpeg once.
    ///
    /// Returns [`OverlayError::ProcessStart`] when the binary cannot be
    /// launched and [`OverlayError::ProcessTimeout`] when it was killed for
    /// running too long. A nonzero exit is reported through
    /// [`ProcessResult::exit_code`], not as an error.
    pub async fn invoke(
        &self,
        input: &Path,
        output: &Path,
        filter: &FilterExpression,
    ) -> Result<ProcessResult> {
        let args = Self::build_args(input, output, filter);
        debug!("ffmpeg args: {:?}", args);

        let start = Instant::now();
        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| OverlayError::ProcessStart {
                program: self.ffmpeg_path.display().to_string(),
                source,
            })?;

        let pipe = child.stderr.take();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        let byte_cap = stderr_byte_cap(self.stderr_limit);
        let mut drain = tokio::spawn(async move {
            if let Some(pipe) = pipe {
                read_bounded(pipe, &sink, byte_cap).await;
            }
        });

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(timeout = ?limit, "ffmpeg timed out, killing");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill ffmpeg");
                    }
                    drain.abort();
                    return Err(OverlayError::ProcessTimeout(limit));
                }
            },
            None => child.wait().await?,
        };

        // The remaining time budget also bounds the stderr drain.
        let grace = self.timeout.map_or(STDERR_DRAIN_GRACE, |limit| {
            limit
                .saturating_sub(start.elapsed())
                .min(STDERR_DRAIN_GRACE)
        });
        if tokio::time::timeout(grace, &mut drain).await.is_err() {
            warn!(grace = ?grace, "stderr still open after ffmpeg exited, keeping partial output");
            drain.abort();
        }

        let stderr = decode_bounded(&captured, self.stderr_limit);

        Ok(ProcessResult {
            exit_code: status.code(),
            stderr,
            elapsed: start.elapsed(),
        })
    }

    /// Check if ffmpeg can be started at all.
    pub async fn check_available(&self) -> bool {
        Command::new(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Locate ffmpeg on `PATH`, falling back to the bare name.
#[must_use]
pub fn find_ffmpeg() -> PathBuf {
    which::which("ffmpeg").unwrap_or_else(|_| PathBuf::from("ffmpeg"))
}

/// UTF-8 is at most 4 bytes per char.
fn stderr_byte_cap(limit: usize) -> usize {
    limit.saturating_mul(4)
}

/// Drain `reader` to EOF into `sink`, keeping at most `byte_cap` bytes.
///
/// Reading continues past the cap so ffmpeg never blocks on a full pipe.
/// The sink is shared so whatever arrived survives if the drain is aborted.
async fn read_bounded<R: AsyncRead + Unpin>(
    mut reader: R,
    sink: &Mutex<Vec<u8>>,
    byte_cap: usize,
) {
    let mut buffer = [0u8; 8 * 1024];

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut kept = sink.lock().unwrap_or_else(PoisonError::into_inner);
                let room = byte_cap.saturating_sub(kept.len());
                kept.extend_from_slice(&buffer[..n.min(room)]);
            }
        }
    }
}

/// First `limit` characters of the captured bytes.
fn decode_bounded(captured: &Mutex<Vec<u8>>, limit: usize) -> String {
    let kept = captured.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&kept).chars().take(limit).collect()
}
