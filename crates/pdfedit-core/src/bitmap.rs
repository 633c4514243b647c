//! Owned RGBA raster buffers
//!
//! Every bitmap the engine touches (page previews, stroke overlays, placed
//! images, signatures) is a `RasterImage`. Buffers are plain owned memory:
//! they are released when the owning scope ends.

use crate::error::EditorError;

/// Straight (non-premultiplied) 8-bit RGBA pixels, row-major, top row first
#[derive(Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl std::fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl RasterImage {
    /// Fully transparent image
    pub fn new(width: u32, height: u32) -> Result<Self, EditorError> {
        if width == 0 || height == 0 {
            return Err(EditorError::ImageError(format!(
                "invalid image size {}x{}",
                width, height
            )));
        }
        Ok(Self {
            width,
            height,
            rgba: vec![0; width as usize * height as usize * 4],
        })
    }

    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, EditorError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(EditorError::ImageError(format!(
                "RGBA buffer of {} bytes does not match {}x{}",
                rgba.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.rgba
    }

    /// width / height
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// RGBA at `(x, y)`; transparent black outside the image
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.rgba[i],
            self.rgba[i + 1],
            self.rgba[i + 2],
            self.rgba[i + 3],
        ]
    }

    pub fn is_opaque(&self) -> bool {
        self.rgba.chunks_exact(4).all(|px| px[3] == 255)
    }

    /// Split into packed RGB samples and, unless fully opaque, an alpha plane
    pub fn split_alpha(&self) -> (Vec<u8>, Option<Vec<u8>>) {
        let pixels = self.width as usize * self.height as usize;
        let mut rgb = Vec::with_capacity(pixels * 3);
        let mut alpha = Vec::with_capacity(pixels);
        for px in self.rgba.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
            alpha.push(px[3]);
        }
        if alpha.iter().all(|a| *a == 255) {
            (rgb, None)
        } else {
            (rgb, Some(alpha))
        }
    }

    /// Copy out the sub-rectangle `[x, x + w) × [y, y + h)`
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Result<RasterImage, EditorError> {
        let fits = |start: u32, len: u32, limit: u32| {
            start.checked_add(len).is_some_and(|end| end <= limit)
        };
        if w == 0 || h == 0 || !fits(x, w, self.width) || !fits(y, h, self.height) {
            return Err(EditorError::ImageError(format!(
                "crop {}x{}+{}+{} outside {}x{} image",
                w, h, x, y, self.width, self.height
            )));
        }
        let mut rgba = Vec::with_capacity(w as usize * h as usize * 4);
        for row in y..y + h {
            let start = (row as usize * self.width as usize + x as usize) * 4;
            rgba.extend_from_slice(&self.rgba[start..start + w as usize * 4]);
        }
        RasterImage::from_rgba(w, h, rgba)
    }
}
