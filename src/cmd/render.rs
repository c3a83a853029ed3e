use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use textburn::{OverlayPipeline, ServiceConfig};

pub async fn cmd_render(
    input: &Path,
    output: &Path,
    text: &str,
    layout: Option<&str>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Arc::new(ServiceConfig::load(config_path)?);

    eprintln!("🎬 Rendering: {}", input.display());
    eprintln!("   Output: {}", output.display());
    eprintln!("   Layout: {}", layout.unwrap_or(config.default_layout.name()));

    let pipeline = OverlayPipeline::new(config);
    let report = pipeline
        .process_file(input, output, text, layout)
        .await
        .with_context(|| format!("failed to render {}", input.display()))?;

    eprintln!("\n✅ Rendered in {:.1}s", report.processing_time_secs);
    eprintln!("   ffmpeg: {:.1}s", report.ffmpeg_secs);
    eprintln!("   Input: {} bytes", report.input_bytes);
    eprintln!("   Output: {} bytes", report.output_bytes);
    eprintln!("   Correlation id: {}", report.correlation_id);

    Ok(())
}
