//! Editor configuration
//!
//! Every field has a default, so hosts only pass the values they want to
//! change. Configuration arrives as JSON from the embedding page.

use crate::annotations::Color;
use crate::error::EditorError;
use serde::{Deserialize, Serialize};

/// Main editor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Maximum number of undoable actions (default: 100)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Extra margin around a replaced run's cover rectangle, in points (default: 1.5)
    #[serde(default = "default_cover_padding")]
    pub cover_padding_pt: f64,
    /// Font size for new text annotations (default: 14)
    #[serde(default = "default_font_size")]
    pub default_font_size_pt: f64,
    #[serde(default = "default_min_font_size")]
    pub min_font_size_pt: f64,
    #[serde(default = "default_max_font_size")]
    pub max_font_size_pt: f64,
    #[serde(default = "default_text_color")]
    pub default_text_color: Color,
    /// Pen color for freehand drawing (default: #1E3A8A)
    #[serde(default = "default_stroke_color")]
    pub stroke_color: Color,
    #[serde(default = "default_stroke_width")]
    pub stroke_width_pt: f64,
    /// Initial width of a placed signature (default: 200)
    #[serde(default = "default_placement_width")]
    pub signature_width_pt: f64,
    /// Initial width of a placed image (default: 200)
    #[serde(default = "default_placement_width")]
    pub image_width_pt: f64,
    /// Resolution of stroke overlays and fallback page images (default: 150)
    #[serde(default = "default_output_dpi")]
    pub output_dpi: f64,
    #[serde(default)]
    pub overlay: OverlayStyle,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            cover_padding_pt: default_cover_padding(),
            default_font_size_pt: default_font_size(),
            min_font_size_pt: default_min_font_size(),
            max_font_size_pt: default_max_font_size(),
            default_text_color: default_text_color(),
            stroke_color: default_stroke_color(),
            stroke_width_pt: default_stroke_width(),
            signature_width_pt: default_placement_width(),
            image_width_pt: default_placement_width(),
            output_dpi: default_output_dpi(),
            overlay: OverlayStyle::default(),
        }
    }
}

fn default_history_capacity() -> usize {
    100
}

fn default_cover_padding() -> f64 {
    1.5
}

fn default_font_size() -> f64 {
    14.0
}

fn default_min_font_size() -> f64 {
    4.0
}

fn default_max_font_size() -> f64 {
    144.0
}

fn default_text_color() -> Color {
    Color::BLACK
}

fn default_stroke_color() -> Color {
    Color::rgb(0x1E, 0x3A, 0x8A)
}

fn default_stroke_width() -> f64 {
    2.0
}

fn default_placement_width() -> f64 {
    200.0
}

fn default_output_dpi() -> f64 {
    150.0
}

impl EditorConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let config: EditorConfig = serde_json::from_str(json)
            .map_err(|e| EditorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, EditorError> {
        serde_json::to_string(self).map_err(|e| EditorError::SerializationError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), EditorError> {
        let positive = [
            ("cover_padding_pt", self.cover_padding_pt, true),
            ("default_font_size_pt", self.default_font_size_pt, false),
            ("min_font_size_pt", self.min_font_size_pt, false),
            ("max_font_size_pt", self.max_font_size_pt, false),
            ("stroke_width_pt", self.stroke_width_pt, false),
            ("signature_width_pt", self.signature_width_pt, false),
            ("image_width_pt", self.image_width_pt, false),
            ("output_dpi", self.output_dpi, false),
        ];
        for (name, value, zero_ok) in positive {
            if !value.is_finite() || value < 0.0 || (value == 0.0 && !zero_ok) {
                return Err(EditorError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.min_font_size_pt > self.max_font_size_pt {
            return Err(EditorError::InvalidConfig(format!(
                "min_font_size_pt {} exceeds max_font_size_pt {}",
                self.min_font_size_pt, self.max_font_size_pt
            )));
        }
        if !(self.min_font_size_pt..=self.max_font_size_pt).contains(&self.default_font_size_pt) {
            return Err(EditorError::InvalidConfig(format!(
                "default_font_size_pt {} is outside {}..={}",
                self.default_font_size_pt, self.min_font_size_pt, self.max_font_size_pt
            )));
        }
        Ok(())
    }

    pub fn clamp_font_size(&self, size_pt: f64) -> f64 {
        size_pt.clamp(self.min_font_size_pt, self.max_font_size_pt)
    }

    /// Raster scale (pixels per point) for output images
    pub fn output_scale(&self) -> f64 {
        self.output_dpi / crate::coords::POINTS_PER_INCH
    }
}

/// Color with opacity, used for overlay tints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tint {
    pub color: Color,
    pub alpha: f32,
}

impl Tint {
    pub const fn new(color: Color, alpha: f32) -> Self {
        Self { color, alpha }
    }

    pub fn to_css(&self) -> String {
        format!(
            "rgba({}, {}, {}, {:.2})",
            self.color.r, self.color.g, self.color.b, self.alpha
        )
    }
}

/// Overlay look in select mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    #[serde(default = "default_hover_tint")]
    pub hover_tint: Tint,
    #[serde(default = "default_selected_tint")]
    pub selected_tint: Tint,
    /// Tint shown on every editable run
    #[serde(default = "default_plain_tint")]
    pub plain_tint: Tint,
    #[serde(default = "default_outline_color")]
    pub outline_color: Color,
    /// Side of a square resize handle, in pixels
    #[serde(default = "default_handle_size")]
    pub handle_size_px: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            hover_tint: default_hover_tint(),
            selected_tint: default_selected_tint(),
            plain_tint: default_plain_tint(),
            outline_color: default_outline_color(),
            handle_size_px: default_handle_size(),
        }
    }
}

fn default_hover_tint() -> Tint {
    Tint::new(Color::rgb(0x3B, 0x82, 0xF6), 0.18)
}

fn default_selected_tint() -> Tint {
    Tint::new(Color::rgb(0x3B, 0x82, 0xF6), 0.32)
}

fn default_plain_tint() -> Tint {
    Tint::new(Color::rgb(0xFA, 0xCC, 0x15), 0.10)
}

fn default_outline_color() -> Color {
    Color::rgb(0x25, 0x63, 0xEB)
}

fn default_handle_size() -> f64 {
    8.0
}
