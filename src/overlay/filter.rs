//! drawtext filter expression builder
//!
//! Layout presets fix the font size, colours, box styling and position of the
//! overlay. The builder trusts its text argument: it must come from
//! [`sanitize`](super::text::sanitize), which the [`SanitizedText`] type
//! enforces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::text::{escape, SanitizedText};
use crate::error::{OverlayError, Result};

/// Horizontal position shared by every preset.
const CENTER_X: &str = "(w-text_w)/2";

/// Closed set of overlay layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutPreset {
    /// Large white text with an outline, anchored above the bottom edge
    #[default]
    BottomBanner,
    /// Text in a translucent box, centred on the frame
    CenteredBoxed,
    /// Smaller boxed caption below the top edge
    TopBanner,
}

impl LayoutPreset {
    pub const ALL: [Self; 3] = [Self::BottomBanner, Self::CenteredBoxed, Self::TopBanner];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::BottomBanner => "bottom-banner",
            Self::CenteredBoxed => "centered-boxed",
            Self::TopBanner => "top-banner",
        }
    }

    /// Styling fixed by this preset.
    #[must_use]
    pub fn style(self) -> LayoutStyle {
        match self {
            Self::BottomBanner => LayoutStyle {
                font_size: 48,
                font_color: "white",
                border_width: 2,
                border_color: "black",
                line_spacing: 8,
                text_box: None,
                anchor: VerticalAnchor::Bottom(120),
            },
            Self::CenteredBoxed => LayoutStyle {
                font_size: 44,
                font_color: "white",
                border_width: 0,
                border_color: "black",
                line_spacing: 10,
                text_box: Some(TextBox {
                    color: "black@0.55",
                    border: 24,
                }),
                anchor: VerticalAnchor::Center,
            },
            Self::TopBanner => LayoutStyle {
                font_size: 36,
                font_color: "white",
                border_width: 1,
                border_color: "black",
                line_spacing: 6,
                text_box: Some(TextBox {
                    color: "black@0.4",
                    border: 12,
                }),
                anchor: VerticalAnchor::Top(80),
            },
        }
    }
}

impl fmt::Display for LayoutPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayoutPreset {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|preset| preset.name() == wanted)
            .ok_or_else(|| {
                let expected = "bottom-banner, centered-boxed, top-banner";
                OverlayError::validation(format!(
                    "unknown layout '{s}' (expected one of: {expected})"
                ))
            })
    }
}

/// Vertical placement of the text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAnchor {
    /// Margin in pixels from the top edge
    Top(u32),
    /// Vertical centre of the frame
    Center,
    /// Margin in pixels from the bottom edge
    Bottom(u32),
}

impl VerticalAnchor {
    /// drawtext `y` expression
    #[must_use]
    pub fn to_drawtext_y(self) -> String {
        match self {
            Self::Top(m) => m.to_string(),
            Self::Center => "(h-text_h)/2".to_string(),
            Self::Bottom(m) => format!("h-text_h-{m}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBox {
    /// ffmpeg colour, optionally with `@alpha`
    pub color: &'static str,
    pub border: u32,
}

/// Concrete styling of a preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutStyle {
    pub font_size: u32,
    pub font_color: &'static str,
    /// Outline width, 0 for none
    pub border_width: u32,
    pub border_color: &'static str,
    pub line_spacing: u32,
    pub text_box: Option<TextBox>,
    pub anchor: VerticalAnchor,
}

/// A complete `-vf` argument. Only [`DrawtextBuilder::build`] produces one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression(String);

impl FilterExpression {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds drawtext expressions against a verified font file.
#[derive(Debug, Clone)]
pub struct DrawtextBuilder {
    font_value: String,
}

impl DrawtextBuilder {
    /// Create a builder for `font_path`.
    ///
    /// Fails with [`OverlayError::Configuration`] when the font file does not
    /// exist, so a broken deployment is reported before ffmpeg is started.
    pub fn new(font_path: impl AsRef<Path>) -> Result<Self> {
        let font_path = font_path.as_ref();
        if !font_path.is_file() {
            return Err(OverlayError::Configuration(format!(
                "font file not found at {}",
                font_path.display()
            )));
        }

        Ok(Self {
            font_value: escape(&font_path.to_string_lossy()),
        })
    }

    /// Compose the drawtext filter for `text` in `layout`.
    #[must_use]
    pub fn build(&self, text: &SanitizedText, layout: LayoutPreset) -> FilterExpression {
        let style = layout.style();

        // expansion=none keeps %{...} in user text from being evaluated
        let mut params = vec![
            format!("fontfile='{}'", self.font_value),
            format!("text='{text}'"),
            "expansion=none".to_string(),
            format!("fontcolor={}", style.font_color),
            format!("fontsize={}", style.font_size),
            format!("line_spacing={}", style.line_spacing),
        ];

        if style.border_width > 0 {
            params.push(format!("borderw={}", style.border_width));
            params.push(format!("bordercolor={}", style.border_color));
        }

        if let Some(text_box) = style.text_box {
            params.push("box=1".to_string());
            params.push(format!("boxcolor={}", text_box.color));
            params.push(format!("boxborderw={}", text_box.border));
        }

        params.push(format!("x={CENTER_X}"));
        params.push(format!("y={}", style.anchor.to_drawtext_y()));

        FilterExpression(format!("drawtext={}", params.join(":")))
    }
}
