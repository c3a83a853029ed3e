//! JSON error bodies.

use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::CORRELATION_HEADER;
use crate::error::OverlayError;

/// Client-facing failure with the correlation id of its request.
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) kind: &'static str,
    message: String,
    correlation_id: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    correlation_id: &'a str,
}

impl ApiError {
    pub(crate) fn from_overlay(err: &OverlayError, correlation_id: &str) -> Self {
        Self {
            status: status_for(err),
            kind: err.kind(),
            message: err.public_message(),
            correlation_id: correlation_id.to_string(),
        }
    }
}

/// Status code for an [`OverlayError`].
pub(crate) fn status_for(err: &OverlayError) -> StatusCode {
    match err {
        OverlayError::Validation(_) => StatusCode::BAD_REQUEST,
        OverlayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        OverlayError::Fetch(_) => StatusCode::BAD_GATEWAY,
        OverlayError::ProcessTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        OverlayError::Configuration(_)
        | OverlayError::Staging(_)
        | OverlayError::ProcessStart { .. }
        | OverlayError::ProcessRun { .. }
        | OverlayError::OutputMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            message: &self.message,
            correlation_id: &self.correlation_id,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.correlation_id) {
            response.headers_mut().insert(CORRELATION_HEADER, value);
        }
        response
    }
}
