//! Request orchestration: validate -> stage -> filter -> ffmpeg -> verify
//!
//! One [`OverlayPipeline`] is built at startup and shared by every request.
//! It holds no per-request state; each run owns its own [`Workspace`] and
//! [`RequestTrace`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::filter::{DrawtextBuilder, LayoutPreset};
use super::invoker::FfmpegInvoker;
use super::text::sanitize;
use super::workspace::{Workspace, WorkspaceManager};
use crate::config::ServiceConfig;
use crate::error::{Fault, OverlayError, Result};

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    WorkspaceReady,
    InputStaged,
    FilterBuilt,
    Processed,
    OutputVerified,
    Responded,
    Failed,
}

impl Stage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::WorkspaceReady => "workspace_ready",
            Self::InputStaged => "input_staged",
            Self::FilterBuilt => "filter_built",
            Self::Processed => "processed",
            Self::OutputVerified => "output_verified",
            Self::Responded => "responded",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Responded | Self::Failed)
    }
}

/// Correlation id plus the current [`Stage`] of one request.
#[derive(Debug)]
pub struct RequestTrace {
    correlation_id: String,
    stage: Stage,
}

impl RequestTrace {
    #[must_use]
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            stage: Stage::Received,
        }
    }

    /// Trace with a freshly generated correlation id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to `next`. Terminal stages are sticky.
    pub fn advance(&mut self, next: Stage) {
        if self.stage.is_terminal() {
            return;
        }
        debug!(
            correlation_id = %self.correlation_id,
            from = self.stage.as_str(),
            to = next.as_str(),
            "request stage"
        );
        self.stage = next;
    }

    /// Record a failure with its full diagnostics and move to [`Stage::Failed`].
    pub fn fail(&mut self, err: &OverlayError) {
        let at = self.stage.as_str();
        self.stage = Stage::Failed;

        match err {
            OverlayError::ProcessRun { exit_code, stderr } => error!(
                correlation_id = %self.correlation_id,
                stage = at,
                exit_code = ?exit_code,
                stderr = %stderr,
                "ffmpeg failed"
            ),
            e if e.fault() == Fault::Client => info!(
                correlation_id = %self.correlation_id,
                stage = at,
                kind = e.kind(),
                error = %e,
                "request rejected"
            ),
            e => error!(
                correlation_id = %self.correlation_id,
                stage = at,
                kind = e.kind(),
                error = %e,
                "request failed"
            ),
        }
    }
}

/// Overlay text that passed the length check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedText(String);

impl ValidatedText {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Result of a successful ffmpeg pass inside a workspace.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub output_bytes: u64,
    pub ffmpeg_elapsed: Duration,
}

/// Summary of [`OverlayPipeline::process_file`].
#[derive(Debug, Clone)]
pub struct RenderReport {
    pub correlation_id: String,
    pub layout: LayoutPreset,
    pub input_bytes: u64,
    pub output_bytes: u64,
    /// Time spent inside ffmpeg
    pub ffmpeg_secs: f64,
    /// Wall-clock time for the whole run
    pub processing_time_secs: f64,
}

/// Shared, stateless orchestrator.
#[derive(Debug, Clone)]
pub struct OverlayPipeline {
    config: Arc<ServiceConfig>,
    workspaces: WorkspaceManager,
    invoker: FfmpegInvoker,
}

impl OverlayPipeline {
    #[must_use]
    pub fn new(config: Arc<ServiceConfig>) -> Self {
        let workspaces = WorkspaceManager::new(config.temp_root.clone());
        let invoker = FfmpegInvoker::new(config.ffmpeg_path.clone())
            .with_timeout(config.process_timeout())
            .with_stderr_limit(config.stderr_limit);

        Self {
            config,
            workspaces,
            invoker,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Enforce the overlay text cap, counted in code points.
    pub fn validate_text(&self, raw: &str) -> Result<ValidatedText> {
        let len = raw.chars().count();
        let max = self.config.max_text_chars;
        if len > max {
            return Err(OverlayError::validation(format!(
                "overlay text is {len} characters, maximum is {max}"
            )));
        }
        Ok(ValidatedText(raw.to_string()))
    }

    /// Parse a requested layout name, falling back to the configured default.
    pub fn resolve_layout(&self, requested: Option<&str>) -> Result<LayoutPreset> {
        match requested.map(str::trim) {
            None | Some("") => Ok(self.config.default_layout),
            Some(name) => name.parse(),
        }
    }

    /// Allocate the workspace for a validated request.
    pub async fn begin(&self, trace: &mut RequestTrace) -> Result<Workspace> {
        let workspace = self.workspaces.acquire().await?;
        debug!(
            correlation_id = %trace.correlation_id(),
            workspace = %workspace.id(),
            "workspace ready"
        );
        trace.advance(Stage::WorkspaceReady);
        Ok(workspace)
    }

    /// Run ffmpeg over a staged workspace and verify its output.
    pub async fn render(
        &self,
        workspace: &Workspace,
        text: &ValidatedText,
        layout: LayoutPreset,
        trace: &mut RequestTrace,
    ) -> Result<RenderOutcome> {
        let sanitized = sanitize(text.as_str(), self.config.max_line_chars);
        let filter = DrawtextBuilder::new(&self.config.font_path)?.build(&sanitized, layout);
        trace.advance(Stage::FilterBuilt);

        let result = self
            .invoker
            .invoke(workspace.input_path(), workspace.output_path(), &filter)
            .await?;

        if !result.success() {
            return Err(OverlayError::ProcessRun {
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }
        trace.advance(Stage::Processed);

        let output_bytes = workspace.verify_output().await?;
        trace.advance(Stage::OutputVerified);

        info!(
            correlation_id = %trace.correlation_id(),
            layout = %layout,
            output_bytes,
            elapsed_ms = u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
            "overlay rendered"
        );

        Ok(RenderOutcome {
            output_bytes,
            ffmpeg_elapsed: result.elapsed,
        })
    }

    /// Burn `text` into a local video file, writing the result to `output`.
    pub async fn process_file(
        &self,
        input: &Path,
        output: &Path,
        text: &str,
        layout: Option<&str>,
    ) -> Result<RenderReport> {
        let started = std::time::Instant::now();
        let mut trace = RequestTrace::generate();

        let result = self.process_file_traced(input, output, text, layout, &mut trace).await;

        match result {
            Ok((layout, input_bytes, outcome)) => {
                trace.advance(Stage::Responded);
                Ok(RenderReport {
                    correlation_id: trace.correlation_id().to_string(),
                    layout,
                    input_bytes,
                    output_bytes: outcome.output_bytes,
                    ffmpeg_secs: outcome.ffmpeg_elapsed.as_secs_f64(),
                    processing_time_secs: started.elapsed().as_secs_f64(),
                })
            }
            Err(e) => {
                trace.fail(&e);
                Err(e)
            }
        }
    }

    async fn process_file_traced(
        &self,
        input: &Path,
        output: &Path,
        text: &str,
        layout: Option<&str>,
        trace: &mut RequestTrace,
    ) -> Result<(LayoutPreset, u64, RenderOutcome)> {
        let text = self.validate_text(text)?;
        let layout = self.resolve_layout(layout)?;
        trace.advance(Stage::Validated);

        let workspace = self.begin(trace).await?;

        let result: Result<(u64, RenderOutcome)> = async {
            let input_bytes = workspace.stage_file(input).await?;
            trace.advance(Stage::InputStaged);

            let outcome = self.render(&workspace, &text, layout, trace).await?;
            fs::copy(workspace.output_path(), output).await?;
            Ok((input_bytes, outcome))
        }
        .await;

        workspace.release().await;

        let (input_bytes, outcome) = result?;
        Ok((layout, input_bytes, outcome))
    }
}
