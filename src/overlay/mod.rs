//! Text overlay core
//!
//! Turns an untrusted string and a staged video into an ffmpeg `drawtext`
//! run:
//!
//! ```text
//! text ──► sanitize ──► DrawtextBuilder ──► FfmpegInvoker ──► output.mp4
//!                                               ▲
//!                              Workspace (input.mp4, output.mp4)
//! ```
//!
//! [`OverlayPipeline`] ties the pieces together for one request.

pub mod filter;
pub mod invoker;
pub mod pipeline;
pub mod text;
pub mod workspace;

pub use filter::{DrawtextBuilder, FilterExpression, LayoutPreset};
pub use invoker::{find_ffmpeg, FfmpegInvoker, ProcessResult};
pub use pipeline::{OverlayPipeline, RenderReport, RequestTrace, Stage, ValidatedText};
pub use text::{sanitize, SanitizedText};
pub use workspace::{Workspace, WorkspaceManager};
