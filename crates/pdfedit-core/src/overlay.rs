//! The editable layer drawn over the page preview
//!
//! [`OverlayRenderer::render`] is a pure function of the current state: it
//! clears the surface and repaints everything, back to front. Hosts either
//! implement [`OverlaySurface`] directly or replay a [`DisplayList`].

use crate::annotations::{AnnotationId, Color, DocPoint, Focus, PdfRect};
use crate::annotations::{AnnotationStore, ImageAnnotation, SignaturePlacement, TextAnnotation};
use crate::bitmap::RasterImage;
use crate::config::{OverlayStyle, Tint};
use crate::coords::ViewportState;
use crate::fonts::{measure_text_width, StandardFont};
use crate::session::EditorMode;
use crate::text_layer::{RasterRect, RunKey, TextLayer, DEFAULT_ASCENT_RATIO, DEFAULT_DESCENT_RATIO};
use serde::{Deserialize, Serialize};

const OUTLINE_WIDTH_PX: f64 = 1.5;

/// Names an image so hosts can cache the decoded bitmap between redraws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id")]
pub enum ImageRef {
    Annotation(AnnotationId),
    Signature,
}

/// Drawing primitives in raster space (pixels, origin top-left)
pub trait OverlaySurface {
    fn clear(&mut self, width: f64, height: f64);
    fn fill_rect(&mut self, rect: RasterRect, tint: Tint);
    fn stroke_rect(&mut self, rect: RasterRect, color: Color, line_width: f64, dashed: bool);
    /// `x, y` is the left end of the baseline
    fn fill_text(
        &mut self,
        text: &str,
        x: f64,
        y: f64,
        font: StandardFont,
        size_px: f64,
        color: Color,
    );
    fn stroke_polyline(&mut self, points: &[(f64, f64)], color: Color, width: f64);
    fn draw_image(&mut self, image: ImageRef, pixels: &RasterImage, rect: RasterRect);

    fn measure_text(&self, text: &str, font: StandardFont, size_px: f64) -> f64 {
        measure_text_width(text, font, size_px)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum OverlayCommand {
    Clear {
        width: f64,
        height: f64,
    },
    FillRect {
        rect: RasterRect,
        color: Color,
        alpha: f32,
    },
    StrokeRect {
        rect: RasterRect,
        color: Color,
        line_width: f64,
        dashed: bool,
    },
    FillText {
        text: String,
        x: f64,
        y: f64,
        /// CSS font shorthand
        font: String,
        color: Color,
    },
    StrokePolyline {
        points: Vec<(f64, f64)>,
        color: Color,
        width: f64,
    },
    DrawImage {
        image: ImageRef,
        rect: RasterRect,
    },
}

/// Records drawing calls for replay on a host canvas
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayList {
    pub commands: Vec<OverlayCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl OverlaySurface for DisplayList {
    fn clear(&mut self, width: f64, height: f64) {
        self.commands.clear();
        self.commands.push(OverlayCommand::Clear { width, height });
    }

    fn fill_rect(&mut self, rect: RasterRect, tint: Tint) {
        self.commands.push(OverlayCommand::FillRect {
            rect,
            color: tint.color,
            alpha: tint.alpha,
        });
    }

    fn stroke_rect(&mut self, rect: RasterRect, color: Color, line_width: f64, dashed: bool) {
        self.commands.push(OverlayCommand::StrokeRect {
            rect,
            color,
            line_width,
            dashed,
        });
    }

    fn fill_text(
        &mut self,
        text: &str,
        x: f64,
        y: f64,
        font: StandardFont,
        size_px: f64,
        color: Color,
    ) {
        self.commands.push(OverlayCommand::FillText {
            text: text.to_string(),
            x,
            y,
            font: font.css_font(size_px),
            color,
        });
    }

    fn stroke_polyline(&mut self, points: &[(f64, f64)], color: Color, width: f64) {
        self.commands.push(OverlayCommand::StrokePolyline {
            points: points.to_vec(),
            color,
            width,
        });
    }

    fn draw_image(&mut self, image: ImageRef, _pixels: &RasterImage, rect: RasterRect) {
        self.commands.push(OverlayCommand::DrawImage { image, rect });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DragTarget {
    Annotation(AnnotationId),
    Image(AnnotationId),
    Signature,
}

/// Uncommitted geometry of an entity being dragged or resized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DragPreview {
    Move {
        target: DragTarget,
        dx_pt: f64,
        dy_pt: f64,
    },
    /// Signatures take only the width; their height follows the aspect ratio
    Resize {
        target: DragTarget,
        width_pt: f64,
        height_pt: f64,
    },
}

impl DragPreview {
    pub fn target(&self) -> DragTarget {
        match self {
            DragPreview::Move { target, .. } | DragPreview::Resize { target, .. } => *target,
        }
    }

    fn offset_for(&self, target: DragTarget) -> (f64, f64) {
        match self {
            DragPreview::Move { target: t, dx_pt, dy_pt } if *t == target => (*dx_pt, *dy_pt),
            _ => (0.0, 0.0),
        }
    }
}

/// Stroke being drawn; points are appended while the pointer is down
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveStroke {
    pub page_index: u32,
    pub color: Color,
    pub width_pt: f64,
    pub points: Vec<DocPoint>,
}

/// Something about to be placed at the pointer position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PendingPlacement {
    /// New text annotation caret at a baseline point
    TextCaret { doc_x: f64, doc_y: f64, font_size_pt: f64 },
    /// Outline of an image or signature that has not been dropped yet
    ImageBox { rect: PdfRect },
}

/// Everything a redraw reads
pub struct OverlayState<'a> {
    pub viewport: ViewportState,
    pub page_index: u32,
    pub text_layer: Option<&'a TextLayer>,
    pub store: &'a AnnotationStore,
    pub mode: EditorMode,
    pub hover: Option<RunKey>,
    /// Annotation whose text is open in the host's inline editor
    pub inline_editing: Option<AnnotationId>,
    pub drag: Option<DragPreview>,
    pub active_stroke: Option<&'a ActiveStroke>,
    pub pending: Option<PendingPlacement>,
}

/// Doc-space rectangle to raster space
pub fn rect_to_raster(viewport: &ViewportState, rect: &PdfRect) -> RasterRect {
    let (x, y) = viewport.to_raster(rect.x, rect.top());
    RasterRect::new(
        x,
        y,
        viewport.len_to_raster(rect.width),
        viewport.len_to_raster(rect.height),
    )
}

/// Box around an annotation's text, in document space
pub fn annotation_rect(annotation: &TextAnnotation, origin: DocPoint) -> PdfRect {
    let width = measure_text_width(
        &annotation.text,
        StandardFont::Helvetica,
        annotation.font_size_pt,
    );
    PdfRect::new(
        origin.x,
        origin.y - DEFAULT_DESCENT_RATIO * annotation.font_size_pt,
        width,
        (DEFAULT_ASCENT_RATIO + DEFAULT_DESCENT_RATIO) * annotation.font_size_pt,
    )
}

/// Image rectangle with any drag preview applied
pub fn preview_image_rect(image: &ImageAnnotation, drag: Option<DragPreview>) -> PdfRect {
    let rect = image.rect();
    match drag {
        Some(DragPreview::Move {
            target,
            dx_pt,
            dy_pt,
        }) if target == DragTarget::Image(image.id) => {
            PdfRect::new(rect.x + dx_pt, rect.y + dy_pt, rect.width, rect.height)
        }
        Some(DragPreview::Resize {
            target,
            width_pt,
            height_pt,
        }) if target == DragTarget::Image(image.id) => {
            PdfRect::new(rect.x, rect.top() - height_pt, width_pt, height_pt)
        }
        _ => rect,
    }
}

/// Signature rectangle on its page with any drag preview applied
pub fn preview_signature_rect(
    signature: &SignaturePlacement,
    viewport: &ViewportState,
    drag: Option<DragPreview>,
) -> PdfRect {
    let rect = signature.doc_rect(viewport.page_width_pt, viewport.page_height_pt);
    match drag {
        Some(DragPreview::Move { target: DragTarget::Signature, dx_pt, dy_pt }) => {
            PdfRect::new(rect.x + dx_pt, rect.y + dy_pt, rect.width, rect.height)
        }
        Some(DragPreview::Resize { target: DragTarget::Signature, width_pt, .. }) => {
            let height = width_pt / signature.aspect_ratio;
            PdfRect::new(rect.x, rect.top() - height, width_pt, height)
        }
        _ => rect,
    }
}

pub struct OverlayRenderer {
    style: OverlayStyle,
    cover_padding_pt: f64,
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle, cover_padding_pt: f64) -> Self {
        Self {
            style,
            cover_padding_pt,
        }
    }

    pub fn render(&self, state: &OverlayState<'_>, surface: &mut dyn OverlaySurface) {
        let (width, height) = state.viewport.raster_size();
        surface.clear(width as f64, height as f64);

        self.draw_replacements(state, surface);
        if state.mode == EditorMode::Select {
            self.draw_run_highlights(state, surface);
        }
        self.draw_annotations(state, surface);
        self.draw_strokes(state, surface);
        self.draw_signature(state, surface);
        self.draw_pending(state, surface);
    }

    fn draw_replacements(&self, state: &OverlayState<'_>, surface: &mut dyn OverlaySurface) {
        let viewport = &state.viewport;
        let white = Tint::new(Color::WHITE, 1.0);
        for edit in state.store.text_edits_on(state.page_index) {
            let cover = edit.cover_rect(self.cover_padding_pt);
            surface.fill_rect(rect_to_raster(viewport, &cover), white);

            let (x, y) = viewport.to_raster(edit.original.doc_x, edit.original.doc_y);
            surface.fill_text(
                &edit.new_text,
                x,
                y,
                edit.original.standard_font(),
                viewport.len_to_raster(edit.font_size_pt()),
                edit.color(),
            );
        }
    }

    fn draw_run_highlights(&self, state: &OverlayState<'_>, surface: &mut dyn OverlaySurface) {
        let Some(layer) = state.text_layer else {
            return;
        };
        let focus = state.store.focus();
        for run in layer.runs() {
            let selected = focus == Focus::TextRun(run.key);
            if let Some(edit) = state.store.text_edit_for(run) {
                if selected {
                    let outline = rect_to_raster(&state.viewport, &edit.cover_rect(0.0));
                    surface.stroke_rect(outline, self.style.outline_color, OUTLINE_WIDTH_PX, false);
                }
                continue;
            }
            let tint = if selected {
                self.style.selected_tint
            } else if state.hover == Some(run.key) {
                self.style.hover_tint
            } else {
                self.style.plain_tint
            };
            surface.fill_rect(run.raster_box, tint);
        }
    }

    fn draw_annotations(&self, state: &OverlayState<'_>, surface: &mut dyn OverlaySurface) {
        let viewport = &state.viewport;
        let focus = state.store.focus();

        for annotation in state.store.annotations_on(state.page_index) {
            if state.inline_editing == Some(annotation.id) {
                continue;
            }
            let (dx, dy) = state
                .drag
                .map(|d| d.offset_for(DragTarget::Annotation(annotation.id)))
                .unwrap_or((0.0, 0.0));
            let origin = DocPoint::new(annotation.doc_x + dx, annotation.doc_y + dy);
            let (x, y) = viewport.to_raster(origin.x, origin.y);
            surface.fill_text(
                &annotation.text,
                x,
                y,
                StandardFont::Helvetica,
                viewport.len_to_raster(annotation.font_size_pt),
                annotation.color,
            );
            if focus == Focus::Annotation(annotation.id) {
                let rect = rect_to_raster(viewport, &annotation_rect(annotation, origin));
                self.draw_selection(rect, false, surface);
            }
        }

        for image in state.store.images_on(state.page_index) {
            let rect = rect_to_raster(viewport, &preview_image_rect(image, state.drag));
            surface.draw_image(ImageRef::Annotation(image.id), &image.pixels, rect);
            if focus == Focus::Image(image.id) {
                self.draw_selection(rect, true, surface);
            }
        }
    }

    fn draw_strokes(&self, state: &OverlayState<'_>, surface: &mut dyn OverlaySurface) {
        let viewport = &state.viewport;
        let focus = state.store.focus();
        let to_raster = |points: &[DocPoint]| -> Vec<(f64, f64)> {
            points.iter().map(|p| viewport.to_raster(p.x, p.y)).collect()
        };

        for stroke in state.store.strokes_on(state.page_index) {
            surface.stroke_polyline(
                &to_raster(&stroke.points),
                stroke.color,
                viewport.len_to_raster(stroke.width_pt),
            );
            if focus == Focus::Stroke(stroke.id) {
                if let Some(bounds) = stroke.bounds() {
                    let rect = rect_to_raster(viewport, &bounds);
                    surface.stroke_rect(rect, self.style.outline_color, OUTLINE_WIDTH_PX, true);
                }
            }
        }

        if let Some(active) = state.active_stroke {
            if active.page_index == state.page_index && !active.points.is_empty() {
                surface.stroke_polyline(
                    &to_raster(&active.points),
                    active.color,
                    viewport.len_to_raster(active.width_pt),
                );
            }
        }
    }

    fn draw_signature(&self, state: &OverlayState<'_>, surface: &mut dyn OverlaySurface) {
        let Some(signature) = state.store.signature() else {
            return;
        };
        if signature.page_index != state.page_index {
            return;
        }
        let doc_rect = preview_signature_rect(signature, &state.viewport, state.drag);
        let rect = rect_to_raster(&state.viewport, &doc_rect);
        surface.draw_image(ImageRef::Signature, &signature.pixels, rect);
        if state.store.focus() == Focus::Signature {
            self.draw_selection(rect, true, surface);
        }
    }

    fn draw_pending(&self, state: &OverlayState<'_>, surface: &mut dyn OverlaySurface) {
        let viewport = &state.viewport;
        match state.pending {
            Some(PendingPlacement::TextCaret {
                doc_x,
                doc_y,
                font_size_pt,
            }) => {
                let (x, bottom) =
                    viewport.to_raster(doc_x, doc_y - DEFAULT_DESCENT_RATIO * font_size_pt);
                let (_, top) =
                    viewport.to_raster(doc_x, doc_y + DEFAULT_ASCENT_RATIO * font_size_pt);
                surface.stroke_polyline(
                    &[(x, top), (x, bottom)],
                    self.style.outline_color,
                    OUTLINE_WIDTH_PX,
                );
            }
            Some(PendingPlacement::ImageBox { rect }) => {
                surface.stroke_rect(
                    rect_to_raster(viewport, &rect),
                    self.style.outline_color,
                    OUTLINE_WIDTH_PX,
                    true,
                );
            }
            None => {}
        }
    }

    /// Outline plus, for resizable targets, a handle on each corner
    fn draw_selection(&self, rect: RasterRect, handles: bool, surface: &mut dyn OverlaySurface) {
        surface.stroke_rect(rect, self.style.outline_color, OUTLINE_WIDTH_PX, false);
        if !handles {
            return;
        }
        let size = self.style.handle_size_px;
        let fill = Tint::new(self.style.outline_color, 1.0);
        for (cx, cy) in [
            (rect.x, rect.y),
            (rect.x + rect.w, rect.y),
            (rect.x, rect.y + rect.h),
            (rect.x + rect.w, rect.y + rect.h),
        ] {
            surface.fill_rect(RasterRect::new(cx - size / 2.0, cy - size / 2.0, size, size), fill);
        }
    }
}
