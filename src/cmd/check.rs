use std::path::Path;

use anyhow::{bail, Result};

use textburn::{DrawtextBuilder, FfmpegInvoker, ServiceConfig, WorkspaceManager};

/// Verify that a request could be served with the current configuration.
pub async fn cmd_check(config_path: Option<&Path>) -> Result<()> {
    let config = ServiceConfig::load(config_path)?;
    let mut failures = 0usize;

    let invoker = FfmpegInvoker::new(&config.ffmpeg_path);
    if invoker.check_available().await {
        println!("✅ ffmpeg: {}", config.ffmpeg_path.display());
    } else {
        println!("❌ ffmpeg: {} cannot be started", config.ffmpeg_path.display());
        failures += 1;
    }

    match DrawtextBuilder::new(&config.font_path) {
        Ok(_) => println!("✅ font: {}", config.font_path.display()),
        Err(e) => {
            println!("❌ font: {e}");
            failures += 1;
        }
    }

    match WorkspaceManager::new(&config.temp_root).acquire().await {
        Ok(workspace) => {
            println!("✅ temp root: {}", config.temp_root.display());
            workspace.release().await;
        }
        Err(e) => {
            println!("❌ temp root: {}: {e}", config.temp_root.display());
            failures += 1;
        }
    }

    println!("   bind: {}", config.bind_addr);
    println!("   default layout: {}", config.default_layout);
    println!("   max text: {} chars", config.max_text_chars);

    if failures > 0 {
        bail!("{failures} check(s) failed");
    }
    Ok(())
}
