//! Rasterization of freehand strokes with tiny-skia
//!
//! At commit time all strokes of a page become one transparent image that
//! covers just their combined bounds. The pixmap lives only for the duration
//! of [`rasterize_strokes`].

use crate::annotations::{Color, DocPoint, DrawStroke, PdfRect};
use crate::bitmap::RasterImage;
use crate::error::EditorError;
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};
use tracing::debug;

/// Largest overlay edge in pixels; higher resolutions are scaled down to fit
const MAX_OVERLAY_EDGE_PX: f64 = 8192.0;

/// A transparent image plus where it goes in document space
#[derive(Debug, Clone)]
pub struct StrokeOverlay {
    pub image: RasterImage,
    pub rect: PdfRect,
}

/// Draw `strokes` into a single overlay at `scale` pixels per point.
///
/// Returns `None` when there is nothing to draw.
pub fn rasterize_strokes(
    strokes: &[&DrawStroke],
    scale: f64,
) -> Result<Option<StrokeOverlay>, EditorError> {
    let Some(rect) = strokes
        .iter()
        .filter_map(|s| s.bounds())
        .reduce(|a, b| a.union(&b))
    else {
        return Ok(None);
    };

    let longest = rect.width.max(rect.height) * scale;
    let scale = if longest > MAX_OVERLAY_EDGE_PX {
        scale * MAX_OVERLAY_EDGE_PX / longest
    } else {
        scale
    };
    let width_px = (rect.width * scale).ceil().clamp(1.0, MAX_OVERLAY_EDGE_PX) as u32;
    let height_px = (rect.height * scale).ceil().clamp(1.0, MAX_OVERLAY_EDGE_PX) as u32;
    let mut pixmap = new_pixmap(width_px, height_px)?;

    // document space -> overlay pixels: flip y around the overlay's top edge
    let transform = Transform::from_row(
        scale as f32,
        0.0,
        0.0,
        -scale as f32,
        (-rect.x * scale) as f32,
        (rect.top() * scale) as f32,
    );
    for stroke in strokes {
        draw_polyline(
            &mut pixmap,
            &stroke.points,
            stroke.color,
            stroke.width_pt as f32,
            transform,
        );
    }
    debug!(
        strokes = strokes.len(),
        width_px, height_px, "rasterized stroke overlay"
    );

    Ok(Some(StrokeOverlay {
        image: pixmap_to_image(&pixmap)?,
        rect,
    }))
}

/// Draw a polyline with round caps and joins. Fewer than two points draw nothing.
pub(crate) fn draw_polyline(
    pixmap: &mut Pixmap,
    points: &[DocPoint],
    color: Color,
    width: f32,
    transform: Transform,
) {
    let mut builder = PathBuilder::new();
    let mut iter = points.iter();
    let Some(first) = iter.next() else {
        return;
    };
    builder.move_to(first.x as f32, first.y as f32);
    for point in iter {
        builder.line_to(point.x as f32, point.y as f32);
    }
    let Some(path) = builder.finish() else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, 255);
    paint.anti_alias = true;

    let stroke = Stroke {
        width: width.max(0.1),
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &paint, &stroke, transform, None);
}

pub(crate) fn new_pixmap(width: u32, height: u32) -> Result<Pixmap, EditorError> {
    Pixmap::new(width, height).ok_or_else(|| {
        EditorError::ImageError(format!("invalid raster size {}x{}", width, height))
    })
}

/// Copy a premultiplied pixmap into a straight-alpha image
pub(crate) fn pixmap_to_image(pixmap: &Pixmap) -> Result<RasterImage, EditorError> {
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    RasterImage::from_rgba(pixmap.width(), pixmap.height(), rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stroke(points: &[(f64, f64)], width_pt: f64) -> DrawStroke {
        DrawStroke {
            id: 0,
            page_index: 0,
            color: Color::rgb(0x1E, 0x3A, 0x8A),
            width_pt,
            points: points.iter().map(|&(x, y)| DocPoint::new(x, y)).collect(),
        }
    }

    #[test]
    fn test_empty_input_draws_nothing() {
        assert!(rasterize_strokes(&[], 2.0).unwrap().is_none());
    }

    #[test]
    fn test_overlay_is_cropped_to_bounds() {
        let a = stroke(&[(100.0, 100.0), (200.0, 100.0)], 2.0);
        let b = stroke(&[(150.0, 150.0), (150.0, 300.0)], 4.0);
        let overlay = rasterize_strokes(&[&a, &b], 2.0).unwrap().unwrap();
        assert_eq!(overlay.rect, PdfRect::new(99.0, 99.0, 102.0, 203.0));
        assert_eq!(overlay.image.width(), 204);
        assert_eq!(overlay.image.height(), 406);
    }

    #[test]
    fn test_overlay_pixels_are_transparent_outside_strokes() {
        let s = stroke(&[(0.0, 50.0), (100.0, 50.0), (100.0, 0.0)], 4.0);
        let overlay = rasterize_strokes(&[&s], 1.0).unwrap().unwrap();
        let image = &overlay.image;
        assert!(!image.is_opaque());
        // bottom-left corner of the L is empty
        assert_eq!(image.pixel(0, image.height() - 1)[3], 0);
        // the horizontal segment sits near the top of the overlay
        let [r, g, b, a] = image.pixel(50, 2);
        assert_eq!(a, 255);
        assert_eq!((r, g, b), (0x1E, 0x3A, 0x8A));
    }

    #[test]
    fn test_huge_overlay_is_scaled_down() {
        let s = stroke(&[(0.0, 0.0), (10_000.0, 0.0)], 2.0);
        let overlay = rasterize_strokes(&[&s], 4.0).unwrap().unwrap();
        assert!(overlay.image.width() <= 8192);
    }
}
