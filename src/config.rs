//! Service configuration.
//!
//! Built once at startup from an optional TOML file, then overridden by
//! environment variables, then frozen behind an `Arc`. Nothing reads the
//! environment after that.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::overlay::filter::LayoutPreset;
use crate::overlay::invoker::{find_ffmpeg, DEFAULT_STDERR_LIMIT};

/// Font shipped by the `fonts-dejavu-core` package on Debian and Ubuntu.
pub const DEFAULT_FONT_FILE: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";

/// Immutable settings shared by every request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub ffmpeg_path: PathBuf,
    pub font_path: PathBuf,
    /// Parent directory of all request workspaces
    pub temp_root: PathBuf,
    /// Overlay text cap in code points
    pub max_text_chars: usize,
    /// Wrap width in characters, 0 disables wrapping
    pub max_line_chars: usize,
    pub default_layout: LayoutPreset,
    pub bind_addr: SocketAddr,
    /// ffmpeg wall-clock limit, 0 disables
    pub process_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub max_upload_bytes: u64,
    pub stderr_limit: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: find_ffmpeg(),
            font_path: PathBuf::from(DEFAULT_FONT_FILE),
            temp_root: std::env::temp_dir().join("textburn"),
            max_text_chars: 300,
            max_line_chars: 32,
            default_layout: LayoutPreset::BottomBanner,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            process_timeout_secs: 300,
            fetch_timeout_secs: 60,
            max_upload_bytes: 512 * 1024 * 1024,
            stderr_limit: DEFAULT_STDERR_LIMIT,
        }
    }
}

impl ServiceConfig {
    /// Load configuration for the process.
    ///
    /// An explicit `path` must exist. Without one, the per-user config file
    /// is read when present. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `FFMPEG_BIN` / `OVERLAY_*` overrides from `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FFMPEG_BIN") {
            self.ffmpeg_path = PathBuf::from(v);
        }
        if let Some(v) = get("OVERLAY_FONT_FILE") {
            self.font_path = PathBuf::from(v);
        }
        if let Some(v) = get("OVERLAY_TMP_DIR") {
            self.temp_root = PathBuf::from(v);
        }
        if let Some(v) = get("OVERLAY_MAX_TEXT_CHARS") {
            self.max_text_chars = parse_var("OVERLAY_MAX_TEXT_CHARS", &v)?;
        }
        if let Some(v) = get("OVERLAY_MAX_LINE_CHARS") {
            self.max_line_chars = parse_var("OVERLAY_MAX_LINE_CHARS", &v)?;
        }
        if let Some(v) = get("OVERLAY_DEFAULT_LAYOUT") {
            self.default_layout = v.parse().context("invalid OVERLAY_DEFAULT_LAYOUT")?;
        }
        if let Some(v) = get("OVERLAY_BIND_ADDR") {
            self.bind_addr = parse_var("OVERLAY_BIND_ADDR", &v)?;
        }
        if let Some(v) = get("OVERLAY_PROCESS_TIMEOUT_SECS") {
            self.process_timeout_secs = parse_var("OVERLAY_PROCESS_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("OVERLAY_FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = parse_var("OVERLAY_FETCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("OVERLAY_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_var("OVERLAY_MAX_UPLOAD_BYTES", &v)?;
        }
        if let Some(v) = get("OVERLAY_STDERR_LIMIT") {
            self.stderr_limit = parse_var("OVERLAY_STDERR_LIMIT", &v)?;
        }

        Ok(())
    }

    /// Reject settings no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.max_text_chars == 0 {
            bail!("max_text_chars must be greater than 0");
        }
        if self.max_upload_bytes == 0 {
            bail!("max_upload_bytes must be greater than 0");
        }
        if self.fetch_timeout_secs == 0 {
            bail!("fetch_timeout_secs must be greater than 0");
        }
        if self.temp_root.as_os_str().is_empty() {
            bail!("temp_root must not be empty");
        }
        Ok(())
    }

    #[must_use]
    pub fn process_timeout(&self) -> Option<Duration> {
        (self.process_timeout_secs > 0).then(|| Duration::from_secs(self.process_timeout_secs))
    }

    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: {value:?}"))
}

/// `<config_dir>/textburn/config.toml`, if the platform has a config dir.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("textburn").join("config.toml"))
}
