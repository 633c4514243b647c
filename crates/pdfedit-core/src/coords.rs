//! Coordinate transformation between document space and raster space
//!
//! Document space is the PDF user space of a page shifted so the MediaBox
//! lower-left corner is the origin: y grows upward, units in points. The
//! document service adds the MediaBox origin back when it writes content.
//! Raster space is the preview surface at the current zoom: origin
//! top-left, units in pixels.

use serde::{Deserialize, Serialize};

pub const POINTS_PER_INCH: f64 = 72.0;

/// Convert document coordinates to raster coordinates
pub fn to_raster(doc_x: f64, doc_y: f64, scale: f64, page_height_pt: f64) -> (f64, f64) {
    (doc_x * scale, (page_height_pt - doc_y) * scale)
}

/// Convert raster coordinates to document coordinates (inverse of [`to_raster`])
pub fn to_doc(px: f64, py: f64, scale: f64, page_height_pt: f64) -> (f64, f64) {
    (px / scale, page_height_pt - py / scale)
}

/// Convert DOM coordinates (top-left origin, pixels) to PDF coordinates
/// (bottom-left origin, points)
pub fn dom_to_pdf(
    dom_x: f64,
    dom_y: f64,
    container_width: f64,
    container_height: f64,
    media_box: [f64; 4],
) -> (f64, f64) {
    let [mb_x, mb_y, mb_width, mb_height] = media_box;

    let x_pct = dom_x / container_width;
    let y_pct = dom_y / container_height;

    let pdf_x = mb_x + (x_pct * mb_width);
    let pdf_y = mb_y + (mb_height - (y_pct * mb_height));

    (pdf_x, pdf_y)
}

/// Convert PDF coordinates to DOM coordinates
pub fn pdf_to_dom(
    pdf_x: f64,
    pdf_y: f64,
    container_width: f64,
    container_height: f64,
    media_box: [f64; 4],
) -> (f64, f64) {
    let [mb_x, mb_y, mb_width, mb_height] = media_box;

    let x_pct = (pdf_x - mb_x) / mb_width;
    let y_pct = 1.0 - ((pdf_y - mb_y) / mb_height);

    (x_pct * container_width, y_pct * container_height)
}

/// Immutable snapshot of the preview geometry for one page at one zoom.
///
/// Recomputed (never mutated) whenever the viewport width, the zoom factor or
/// the page changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub scale: f64,
    pub page_width_pt: f64,
    pub page_height_pt: f64,
}

impl ViewportState {
    pub fn new(scale: f64, page_width_pt: f64, page_height_pt: f64) -> Self {
        Self {
            scale,
            page_width_pt,
            page_height_pt,
        }
    }

    /// Fit the page width into `viewport_width_px`, then apply `zoom`.
    pub fn fit_to_width(
        viewport_width_px: f64,
        zoom: f64,
        page_width_pt: f64,
        page_height_pt: f64,
    ) -> Self {
        let base = if page_width_pt > 0.0 {
            viewport_width_px / page_width_pt
        } else {
            1.0
        };
        Self::new(base * zoom, page_width_pt, page_height_pt)
    }

    pub fn to_raster(&self, doc_x: f64, doc_y: f64) -> (f64, f64) {
        to_raster(doc_x, doc_y, self.scale, self.page_height_pt)
    }

    pub fn to_doc(&self, px: f64, py: f64) -> (f64, f64) {
        to_doc(px, py, self.scale, self.page_height_pt)
    }

    pub fn len_to_raster(&self, len_pt: f64) -> f64 {
        len_pt * self.scale
    }

    pub fn len_to_doc(&self, len_px: f64) -> f64 {
        len_px / self.scale
    }

    /// Pixel size of the preview surface for this page
    pub fn raster_size(&self) -> (u32, u32) {
        (
            (self.page_width_pt * self.scale).ceil().max(1.0) as u32,
            (self.page_height_pt * self.scale).ceil().max(1.0) as u32,
        )
    }

    /// Document point to page-fraction coordinates (0..1, origin top-left)
    pub fn to_page_ratio(&self, doc_x: f64, doc_y: f64) -> (f64, f64) {
        (
            doc_x / self.page_width_pt,
            (self.page_height_pt - doc_y) / self.page_height_pt,
        )
    }

    /// Page-fraction coordinates (0..1, origin top-left) to a document point
    pub fn from_page_ratio(&self, x_ratio: f64, y_ratio: f64) -> (f64, f64) {
        page_ratio_to_doc(x_ratio, y_ratio, self.page_width_pt, self.page_height_pt)
    }

    pub fn media_box(&self) -> [f64; 4] {
        [0.0, 0.0, self.page_width_pt, self.page_height_pt]
    }
}

/// Page-fraction coordinates to document space for a page of the given size.
/// The result is relative to the MediaBox origin like every document-space point.
///
/// Zoom independent, so it is also used by the commit path where no viewport exists.
pub fn page_ratio_to_doc(
    x_ratio: f64,
    y_ratio: f64,
    page_width_pt: f64,
    page_height_pt: f64,
) -> (f64, f64) {
    (
        x_ratio * page_width_pt,
        page_height_pt - y_ratio * page_height_pt,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_to_pdf_center() {
        let media_box = [0.0, 0.0, 612.0, 792.0];
        let (pdf_x, pdf_y) = dom_to_pdf(300.0, 396.0, 600.0, 792.0, media_box);
        assert!((pdf_x - 306.0).abs() < 0.1);
        assert!((pdf_y - 396.0).abs() < 0.1);
    }

    #[test]
    fn test_y_axis_flip() {
        let (_, py) = to_raster(0.0, 100.0, 1.0, 792.0);
        assert_eq!(py, 692.0);
    }

    #[test]
    fn test_to_raster_applies_scale() {
        let (px, py) = to_raster(72.0, 700.0, 2.0, 792.0);
        assert_eq!(px, 144.0);
        assert_eq!(py, 184.0);
    }

    #[test]
    fn test_viewport_matches_dom_mapping() {
        // With a container sized exactly page * scale both mappings agree.
        let viewport = ViewportState::new(1.5, 612.0, 792.0);
        let (w, h) = (612.0 * 1.5, 792.0 * 1.5);
        let a = viewport.to_raster(100.0, 200.0);
        let b = pdf_to_dom(100.0, 200.0, w, h, viewport.media_box());
        assert!((a.0 - b.0).abs() < 1e-9);
        assert!((a.1 - b.1).abs() < 1e-9);
    }

    #[test]
    fn test_fit_to_width() {
        let viewport = ViewportState::fit_to_width(918.0, 1.0, 612.0, 792.0);
        assert!((viewport.scale - 1.5).abs() < 1e-12);
        let zoomed = ViewportState::fit_to_width(918.0, 2.0, 612.0, 792.0);
        assert!((zoomed.scale - 3.0).abs() < 1e-12);
        assert_eq!(viewport.raster_size(), (918, 1188));
    }

    #[test]
    fn test_page_ratio_is_zoom_independent() {
        let small = ViewportState::new(0.5, 612.0, 792.0);
        let large = ViewportState::new(3.0, 612.0, 792.0);
        let ratio = small.to_page_ratio(306.0, 594.0);
        assert_eq!(ratio, (0.5, 0.25));
        assert_eq!(large.from_page_ratio(ratio.0, ratio.1), (306.0, 594.0));
    }
}
