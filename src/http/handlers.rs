//! Route handlers.
//!
//! Every handler follows the same shape: validate everything that needs no
//! disk, acquire a workspace, stage the input, render, then hand the
//! workspace to the response body. Failures after the workspace exists
//! release it before the error response is built.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

use super::errors::ApiError;
use super::fetch::parse_source_url;
use super::{AppState, CORRELATION_HEADER, REQUEST_ID_HEADER};
use crate::error::{OverlayError, Result};
use crate::overlay::filter::LayoutPreset;
use crate::overlay::pipeline::{RenderOutcome, RequestTrace, Stage, ValidatedText};
use crate::overlay::workspace::Workspace;

pub(crate) async fn health() -> &'static str {
    "OK"
}

/// `POST /overlay/url` body.
#[derive(Debug, Deserialize)]
pub(crate) struct UrlOverlayRequest {
    video_url: String,
    overlay_text: String,
    #[serde(default)]
    layout: Option<String>,
}

/// `POST /overlay`: multipart upload.
pub(crate) async fn overlay_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let mut trace = RequestTrace::new(correlation_id(&headers));
    let result = upload_flow(&state, multipart, &mut trace).await;
    respond(result, &mut trace)
}

/// `POST /overlay/url`: JSON body naming a remote video.
pub(crate) async fn overlay_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<UrlOverlayRequest>, JsonRejection>,
) -> Response {
    let mut trace = RequestTrace::new(correlation_id(&headers));
    let result = url_flow(&state, payload, &mut trace).await;
    respond(result, &mut trace)
}

fn respond(result: Result<Response>, trace: &mut RequestTrace) -> Response {
    match result {
        Ok(response) => {
            trace.advance(Stage::Responded);
            response
        }
        Err(err) => {
            trace.fail(&err);
            ApiError::from_overlay(&err, trace.correlation_id()).into_response()
        }
    }
}

/// Request id set by the request-id layer, or a fresh one.
fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string)
}

async fn url_flow(
    state: &AppState,
    payload: std::result::Result<Json<UrlOverlayRequest>, JsonRejection>,
    trace: &mut RequestTrace,
) -> Result<Response> {
    let Json(request) = payload.map_err(|e| OverlayError::validation(e.body_text()))?;
    let pipeline = &state.pipeline;

    let url = parse_source_url(&request.video_url)?;
    let text = pipeline.validate_text(&request.overlay_text)?;
    let layout = pipeline.resolve_layout(request.layout.as_deref())?;
    trace.advance(Stage::Validated);

    let workspace = pipeline.begin(trace).await?;
    let limit = pipeline.config().max_upload_bytes;
    if let Err(err) = state.fetcher.fetch_into(&url, &workspace, limit).await {
        workspace.release().await;
        return Err(err);
    }
    trace.advance(Stage::InputStaged);

    finish(state, workspace, &text, layout, trace).await
}

/// Video received so far in a multipart form.
enum StagedVideo {
    /// Arrived before the text, held in memory until the text validates
    Buffered(Bytes),
    OnDisk(Workspace),
}

#[derive(Default)]
struct UploadForm {
    text: Option<ValidatedText>,
    layout: Option<LayoutPreset>,
    video: Option<StagedVideo>,
}

impl UploadForm {
    async fn discard(self) {
        if let Some(StagedVideo::OnDisk(workspace)) = self.video {
            workspace.release().await;
        }
    }
}

async fn upload_flow(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
    trace: &mut RequestTrace,
) -> Result<Response> {
    let mut multipart = multipart.map_err(|e| OverlayError::validation(e.body_text()))?;

    let mut form = UploadForm::default();
    if let Err(err) = read_form(state, &mut multipart, &mut form, trace).await {
        form.discard().await;
        return Err(err);
    }

    let Some(text) = form.text.take() else {
        form.discard().await;
        return Err(OverlayError::validation("missing form field 'text'"));
    };
    let layout = form.layout.unwrap_or(state.pipeline.config().default_layout);

    let workspace = match form.video.take() {
        Some(StagedVideo::OnDisk(workspace)) => workspace,
        Some(StagedVideo::Buffered(data)) => {
            if data.is_empty() {
                return Err(OverlayError::validation("uploaded video is empty"));
            }
            trace.advance(Stage::Validated);
            let workspace = state.pipeline.begin(trace).await?;
            if let Err(err) = workspace.stage_bytes(&data).await {
                workspace.release().await;
                return Err(err);
            }
            trace.advance(Stage::InputStaged);
            workspace
        }
        None => return Err(OverlayError::validation("missing form field 'video'")),
    };

    finish(state, workspace, &text, layout, trace).await
}

async fn read_form(
    state: &AppState,
    multipart: &mut Multipart,
    form: &mut UploadForm,
    trace: &mut RequestTrace,
) -> Result<()> {
    let pipeline = &state.pipeline;
    let limit = pipeline.config().max_upload_bytes;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "text" | "overlay_text" => {
                let raw = field.text().await.map_err(|e| multipart_error(&e, limit))?;
                form.text = Some(pipeline.validate_text(&raw)?);
            }
            "layout" => {
                let raw = field.text().await.map_err(|e| multipart_error(&e, limit))?;
                form.layout = Some(pipeline.resolve_layout(Some(&raw))?);
            }
            "video" | "file" => {
                if form.video.is_some() {
                    return Err(OverlayError::validation("more than one video part"));
                }

                if form.text.is_some() {
                    trace.advance(Stage::Validated);
                    let workspace = pipeline.begin(trace).await?;
                    let chunks =
                        field.map(|chunk| chunk.map_err(|e| multipart_error(&e, limit)));
                    let staged = workspace.stage_input(chunks, limit).await;
                    form.video = Some(StagedVideo::OnDisk(workspace));
                    staged?;
                    trace.advance(Stage::InputStaged);
                } else {
                    let data = field.bytes().await.map_err(|e| multipart_error(&e, limit))?;
                    if data.len() as u64 > limit {
                        return Err(OverlayError::PayloadTooLarge { limit });
                    }
                    form.video = Some(StagedVideo::Buffered(data));
                }
            }
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(())
}

fn multipart_error(err: &MultipartError, limit: u64) -> OverlayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        OverlayError::PayloadTooLarge { limit }
    } else {
        OverlayError::validation(err.body_text())
    }
}

async fn finish(
    state: &AppState,
    workspace: Workspace,
    text: &ValidatedText,
    layout: LayoutPreset,
    trace: &mut RequestTrace,
) -> Result<Response> {
    let outcome = match state.pipeline.render(&workspace, text, layout, trace).await {
        Ok(outcome) => outcome,
        Err(err) => {
            workspace.release().await;
            return Err(err);
        }
    };

    let file = match File::open(workspace.output_path()).await {
        Ok(file) => file,
        Err(err) => {
            workspace.release().await;
            return Err(err.into());
        }
    };

    Ok(artifact_response(file, workspace, &outcome, trace.correlation_id()))
}

fn artifact_response(
    file: File,
    workspace: Workspace,
    outcome: &RenderOutcome,
    correlation_id: &str,
) -> Response {
    let body = ArtifactBody {
        stream: ReaderStream::new(file),
        _workspace: workspace,
    };

    let mut response = Body::from_stream(body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(outcome.output_bytes));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"output.mp4\""),
    );
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        headers.insert(CORRELATION_HEADER, value);
    }
    response
}

/// Output file stream that owns its workspace.
///
/// The directory is removed when the body is dropped, which happens once it
/// has been fully sent or the client went away.
struct ArtifactBody {
    stream: ReaderStream<File>,
    _workspace: Workspace,
}

impl Stream for ArtifactBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stream).poll_next(cx)
    }
}
