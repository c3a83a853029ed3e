//! HTTP surface: router, shared state and the listener loop.

mod errors;
pub mod fetch;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Request,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{Span, info};

use crate::config::ServiceConfig;
use crate::overlay::pipeline::OverlayPipeline;
use fetch::SourceFetcher;

pub(crate) const REQUEST_ID_HEADER: &str = "x-request-id";
pub(crate) const CORRELATION_HEADER: &str = "x-correlation-id";

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<OverlayPipeline>,
    pub fetcher: SourceFetcher,
}

impl AppState {
    pub fn new(config: Arc<ServiceConfig>) -> crate::error::Result<Self> {
        let fetcher = SourceFetcher::new(config.fetch_timeout())?;
        Ok(Self {
            pipeline: Arc::new(OverlayPipeline::new(config)),
            fetcher,
        })
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit =
        usize::try_from(state.pipeline.config().max_upload_bytes).unwrap_or(usize::MAX);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("")
                .to_string();

            tracing::info_span!(
                "http.request",
                method = %request.method(),
                route = %request.uri().path(),
                request_id = %request_id,
                status_code = tracing::field::Empty,
                latency_ms = tracing::field::Empty
            )
        })
        .on_response(
            |response: &axum::response::Response, latency: Duration, span: &Span| {
                span.record("status_code", response.status().as_u16());
                span.record(
                    "latency_ms",
                    u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                );
            },
        );

    let layered = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(trace_layer);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/overlay", post(handlers::overlay_upload))
        .route("/overlay/url", post(handlers::overlay_url))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(layered)
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: Arc<ServiceConfig>) -> Result<()> {
    let state = AppState::new(Arc::clone(&config)).context("failed to build service state")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(
        addr = %listener.local_addr()?,
        ffmpeg = %config.ffmpeg_path.display(),
        font = %config.font_path.display(),
        temp_root = %config.temp_root.display(),
        "textburn listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("textburn stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::pipeline::tests::{Fixture, COPY_SCRIPT};
    use axum::body::Body;
    use axum::http::{StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const BOUNDARY: &str = "textburn-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a [u8]),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; \
                             filename=\"in.mp4\"\r\nContent-Type: video/mp4\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/overlay")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header("x-request-id", "test-request-1")
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn app(fixture: &Fixture) -> Router {
        router(AppState::new(Arc::new(fixture.config.clone())).unwrap())
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let fixture = Fixture::new("exit 0");
        let response = app(&fixture)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_client_request_id_is_echoed() {
        let fixture = Fixture::new("exit 0");
        let request = Request::get("/health")
            .header("x-request-id", "caller-chosen-id")
            .body(Body::empty())
            .unwrap();

        let response = app(&fixture).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "caller-chosen-id");
    }

    #[tokio::test]
    async fn test_text_too_long_is_400_without_workspace() {
        let fixture = Fixture::new("exit 0");
        let text = "x".repeat(301);

        let response = app(&fixture)
            .oneshot(upload(&[Part::Text("text", &text), Part::File("video", b"video")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "validation_error");
        assert_eq!(body["correlation_id"], "test-request-1");
        assert_eq!(fixture.leftover_workspaces(), 0);
        assert!(!fixture.config.temp_root.exists());
    }

    #[tokio::test]
    async fn test_missing_text_is_400() {
        let fixture = Fixture::new("exit 0");

        let response = app(&fixture)
            .oneshot(upload(&[Part::File("video", b"video")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(fixture.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_unknown_layout_is_400() {
        let fixture = Fixture::new("exit 0");

        let response = app(&fixture)
            .oneshot(upload(&[
                Part::Text("layout", "diagonal"),
                Part::Text("text", "hi"),
                Part::File("video", b"video"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["message"].as_str().unwrap().contains("diagonal"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_upload_streamed_when_text_first() {
        let fixture = Fixture::new(COPY_SCRIPT);

        let response = app(&fixture)
            .oneshot(upload(&[
                Part::Text("text", "Hello: World's [best] day\nEver"),
                Part::File("video", b"video"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()["x-correlation-id"], "test-request-1");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"video rendered");
        assert_eq!(fixture.settled_workspaces().await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_upload_buffered_when_video_first() {
        let fixture = Fixture::new(COPY_SCRIPT);

        let response = app(&fixture)
            .oneshot(upload(&[
                Part::File("file", b"clip"),
                Part::Text("overlay_text", "late text"),
                Part::Text("layout", "top-banner"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"clip rendered");
        assert_eq!(fixture.settled_workspaces().await, 0);
    }

    #[tokio::test]
    async fn test_empty_video_first_is_400_without_workspace() {
        let fixture = Fixture::new("exit 0");

        let response = app(&fixture)
            .oneshot(upload(&[Part::File("video", b""), Part::Text("text", "hi")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"].as_str().unwrap().contains("empty"));
        assert!(!fixture.config.temp_root.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ffmpeg_failure_hides_stderr() {
        let fixture = Fixture::new("echo '/srv/private/config leaked' >&2\nexit 1");

        let response = app(&fixture)
            .oneshot(upload(&[Part::Text("text", "hi"), Part::File("video", b"video")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "process_run_error");
        assert_eq!(body["message"], "video processing failed");
        assert!(!body.to_string().contains("private"));
        assert_eq!(fixture.leftover_workspaces(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_output_is_500() {
        let fixture = Fixture::new("exit 0");

        let response = app(&fixture)
            .oneshot(upload(&[Part::Text("text", "hi"), Part::File("video", b"video")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "output_missing_error");
        assert_eq!(fixture.leftover_workspaces(), 0);
    }

    #[tokio::test]
    async fn test_url_scheme_rejected() {
        let fixture = Fixture::new("exit 0");
        let request = Request::post("/overlay/url")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"video_url": "ftp://example.com/a.mp4", "overlay_text": "hi"}"#,
            ))
            .unwrap();

        let response = app(&fixture).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "validation_error");
        assert!(!fixture.config.temp_root.exists());
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let fixture = Fixture::new("exit 0");
        let request = Request::post("/overlay/url")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"video_url": 7}"#))
            .unwrap();

        let response = app(&fixture).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_source_is_502() {
        let fixture = Fixture::new("exit 0");
        let request = Request::post("/overlay/url")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"video_url": "http://127.0.0.1:9/a.mp4", "overlay_text": "hi"}"#,
            ))
            .unwrap();

        let response = app(&fixture).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["error"], "fetch_error");
        assert_eq!(fixture.leftover_workspaces(), 0);
    }
}
