//! Error taxonomy for overlay requests.
//!
//! Every failure a request can hit is an [`OverlayError`]. Each variant knows
//! whether the client or the server is at fault and carries a stable `kind`
//! identifier that is safe to hand back to callers. Diagnostic payloads
//! (ffmpeg stderr, filesystem paths) stay inside the error for logging and are
//! never part of [`OverlayError::public_message`].
//!
//! Cleanup problems are a separate type, [`WorkspaceError`], because they must
//! never change the outcome of a request that has already been decided.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Who caused a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The request itself was unacceptable (4xx).
    Client,
    /// The request was fine but the service could not complete it (5xx).
    Server,
}

/// Failure of a single overlay request.
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("upload exceeds {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to stage files: {0}")]
    Staging(#[from] std::io::Error),

    #[error("failed to fetch source video: {0}")]
    Fetch(String),

    #[error("failed to start {program}: {source}")]
    ProcessStart {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ffmpeg exited with {}", describe_exit(.exit_code))]
    ProcessRun {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg did not finish within {0:?}")]
    ProcessTimeout(Duration),

    #[error("ffmpeg reported success but {} is missing or empty", .0.display())]
    OutputMissing(PathBuf),
}

impl OverlayError {
    /// Fault classification used to pick the response status class.
    #[must_use]
    pub fn fault(&self) -> Fault {
        match self {
            Self::Validation(_) | Self::PayloadTooLarge { .. } => Fault::Client,
            _ => Fault::Server,
        }
    }

    /// Stable identifier exposed to clients.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Configuration(_) => "configuration_error",
            Self::Staging(_) => "staging_error",
            Self::Fetch(_) => "fetch_error",
            Self::ProcessStart { .. } => "process_start_error",
            Self::ProcessRun { .. } => "process_run_error",
            Self::ProcessTimeout(_) => "process_timeout",
            Self::OutputMissing(_) => "output_missing_error",
        }
    }

    /// Message safe to show to the caller.
    ///
    /// Client faults describe what was wrong with the request. Server faults
    /// get a generic sentence; the details live in the logs under the
    /// correlation id.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(_) | Self::PayloadTooLarge { .. } => self.to_string(),
            Self::Fetch(_) => "the source video could not be downloaded".to_string(),
            Self::ProcessTimeout(_) => "video processing timed out".to_string(),
            _ => "video processing failed".to_string(),
        }
    }

    pub(crate) fn validation(detail: impl Into<String>) -> Self {
        Self::Validation(detail.into())
    }
}

#[allow(clippy::ref_option)]
fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| format!("code {c}"))
}

pub type Result<T> = std::result::Result<T, OverlayError>;

/// Workspace cleanup failure. Logged, never returned to clients.
#[derive(Error, Debug)]
#[error("failed to remove workspace {}: {source}", .path.display())]
pub struct WorkspaceError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
