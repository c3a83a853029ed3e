//! Source video download for URL requests.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::{OverlayError, Result};
use crate::overlay::workspace::Workspace;

/// Only `http` and `https` sources are fetched.
pub fn parse_source_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| OverlayError::validation(format!("invalid video_url: {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(OverlayError::validation(format!(
            "video_url must be http(s), got {other}"
        ))),
    }
}

/// Streams remote videos into workspaces.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
}

impl SourceFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("textburn/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OverlayError::Configuration(format!("http client: {e}")))?;

        Ok(Self { client })
    }

    /// Download `url` into the workspace input file, enforcing `limit` bytes.
    pub async fn fetch_into(&self, url: &Url, workspace: &Workspace, limit: u64) -> Result<u64> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(OverlayError::Fetch(format!("{url} returned {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > limit {
                return Err(OverlayError::PayloadTooLarge { limit });
            }
        }

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(fetch_error));
        let written = workspace.stage_input(chunks, limit).await?;

        debug!(url = %url, bytes = written, "source video downloaded");
        Ok(written)
    }
}

fn fetch_error(err: reqwest::Error) -> OverlayError {
    if err.is_timeout() {
        OverlayError::Fetch(format!("timed out: {err}"))
    } else {
        OverlayError::Fetch(err.to_string())
    }
}
