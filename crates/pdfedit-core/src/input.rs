//! Signature and image input adapters
//!
//! These turn whatever the host hands over (uploaded files, canvas data
//! URLs, freehand pad strokes) into a `RasterImage` plus aspect ratio.

use std::io::Cursor;
use std::sync::Arc;

use crate::annotations::{Color, DocPoint};
use crate::bitmap::RasterImage;
use crate::error::EditorError;
use crate::raster::{draw_polyline, new_pixmap, pixmap_to_image};
use base64::Engine;
use tiny_skia::Transform;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Channel value above which a pixel counts as paper white when cropping
const WHITE_THRESHOLD: u8 = 245;

/// Decode PNG or JPEG bytes into straight RGBA
pub fn decode_image(bytes: &[u8]) -> Result<RasterImage, EditorError> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        return decode_png(bytes);
    }
    let decoded =
        ::image::load_from_memory(bytes).map_err(|e| EditorError::ImageError(e.to_string()))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    RasterImage::from_rgba(width, height, rgba.into_raw())
}

fn decode_png(bytes: &[u8]) -> Result<RasterImage, EditorError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| EditorError::ImageError(e.to_string()))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| EditorError::ImageError(e.to_string()))?;
    buf.truncate(info.buffer_size());

    let rgba = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::Rgb => buf
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => buf
            .chunks_exact(2)
            .flat_map(|px| [px[0], px[0], px[0], px[1]])
            .collect(),
        png::ColorType::Grayscale => buf.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        png::ColorType::Indexed => {
            return Err(EditorError::ImageError(
                "indexed PNG was not expanded".to_string(),
            ))
        }
    };
    RasterImage::from_rgba(info.width, info.height, rgba)
}

/// Decode a `data:image/...;base64,` URL as produced by `canvas.toDataURL()`
pub fn decode_data_url(url: &str) -> Result<RasterImage, EditorError> {
    let (header, payload) = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| EditorError::ImageError("not a data URL".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(EditorError::ImageError(format!(
            "unsupported data URL encoding: {}",
            header
        )));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| EditorError::ImageError(e.to_string()))?;
    decode_image(&bytes)
}

fn is_blank(px: [u8; 4]) -> bool {
    px[3] == 0 || (px[0] >= WHITE_THRESHOLD && px[1] >= WHITE_THRESHOLD && px[2] >= WHITE_THRESHOLD)
}

/// Trim transparent or white margins. Blank images come back unchanged.
pub fn autocrop(image: &RasterImage) -> Result<RasterImage, EditorError> {
    let (w, h) = (image.width(), image.height());
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0, 0);
    for y in 0..h {
        for x in 0..w {
            if !is_blank(image.pixel(x, y)) {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
    }
    if min_x > max_x || min_y > max_y {
        return Ok(image.clone());
    }
    image.crop(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
}

/// A finished signature ready for placement. The aspect ratio is always
/// that of the pixels.
#[derive(Debug, Clone)]
pub struct SignatureCapture {
    pixels: Arc<RasterImage>,
}

impl SignatureCapture {
    /// Use `pixels` as-is, without cropping
    pub fn new(pixels: Arc<RasterImage>) -> Self {
        Self { pixels }
    }

    pub fn from_image(image: RasterImage) -> Result<Self, EditorError> {
        Ok(Self::new(Arc::new(autocrop(&image)?)))
    }

    pub fn pixels(&self) -> &Arc<RasterImage> {
        &self.pixels
    }

    /// width / height
    pub fn aspect_ratio(&self) -> f64 {
        self.pixels.aspect_ratio()
    }

    /// From an uploaded PNG/JPEG
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EditorError> {
        Self::from_image(decode_image(bytes)?)
    }

    pub fn from_data_url(url: &str) -> Result<Self, EditorError> {
        Self::from_image(decode_data_url(url)?)
    }
}

/// Freehand signature pad. Points are in pad pixels, origin top-left.
#[derive(Debug, Clone)]
pub struct SignaturePad {
    width: u32,
    height: u32,
    pen_color: Color,
    pen_width: f32,
    strokes: Vec<Vec<DocPoint>>,
}

impl SignaturePad {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pen_color: Color::BLACK,
            pen_width: 2.5,
            strokes: Vec::new(),
        }
    }

    pub fn with_pen(mut self, color: Color, width: f32) -> Self {
        self.pen_color = color;
        self.pen_width = width;
        self
    }

    pub fn begin_stroke(&mut self, x: f64, y: f64) {
        self.strokes.push(vec![DocPoint::new(x, y)]);
    }

    pub fn extend_stroke(&mut self, x: f64, y: f64) {
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.push(DocPoint::new(x, y));
        }
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.iter().all(|s| s.len() < 2)
    }

    /// Render the strokes and crop to the inked area
    pub fn finish(&self) -> Result<SignatureCapture, EditorError> {
        if self.is_empty() {
            return Err(EditorError::ImageError("signature pad is empty".to_string()));
        }
        let mut pixmap = new_pixmap(self.width, self.height)?;
        for stroke in self.strokes.iter().filter(|s| s.len() >= 2) {
            draw_polyline(
                &mut pixmap,
                stroke,
                self.pen_color,
                self.pen_width,
                Transform::identity(),
            );
        }
        SignatureCapture::from_image(pixmap_to_image(&pixmap)?)
    }
}
