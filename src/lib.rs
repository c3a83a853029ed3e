//! `textburn` - burn overlay text onto videos with ffmpeg `drawtext`
//!
//! # Features
//!
//! - **Safe filter construction**: untrusted text is wrapped and escaped so it
//!   always stays a single literal inside the `drawtext` expression
//! - **Isolated workspaces**: one scratch directory per request, removed on
//!   every exit path
//! - **Bounded subprocesses**: argv-only ffmpeg invocation with a timeout and
//!   capped stderr capture
//! - **HTTP service**: multipart upload and URL download endpoints (axum)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use textburn::{OverlayPipeline, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(ServiceConfig::load(None)?);
//!     let pipeline = OverlayPipeline::new(config);
//!     let report = pipeline
//!         .process_file(Path::new("in.mp4"), Path::new("out.mp4"), "Hello", None)
//!         .await?;
//!     println!("Rendered {} bytes", report.output_bytes);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod overlay;

pub use config::ServiceConfig;
pub use error::{Fault, OverlayError, WorkspaceError};
pub use overlay::{
    sanitize, DrawtextBuilder, FfmpegInvoker, LayoutPreset, OverlayPipeline, RenderReport,
    SanitizedText, Workspace, WorkspaceManager,
};
