//! The host-facing editing engine
//!
//! An [`EditorSession`] owns the edit model for one document and turns host
//! events (viewport changes, pointer input, explicit operations) into store
//! mutations recorded in history. Rendering and document I/O are delegated to
//! the services passed into [`EditorSession::render_current_page`] and
//! [`EditorSession::commit`].

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::annotations::{AnnotationId, AnnotationStore, Color, DocPoint, Focus, PdfRect};
use crate::bitmap::RasterImage;
use crate::commit::{CommitOptions, CommitOutput, CommitPipeline};
use crate::config::EditorConfig;
use crate::coords::ViewportState;
use crate::error::EditorError;
use crate::history::HistoryManager;
use crate::input::SignatureCapture;
use crate::operations::EditAction;
use crate::overlay::{
    annotation_rect, preview_image_rect, preview_signature_rect, rect_to_raster, ActiveStroke,
    DragPreview, DragTarget, OverlayRenderer, OverlayState, OverlaySurface, PendingPlacement,
};
use crate::render_queue::{RenderCoordinator, RenderTicket};
use crate::services::{DocumentService, PageRasterizer, TextContent};
use crate::text_layer::{RasterRect, RunKey, TextLayer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const MIN_ZOOM: f64 = 0.25;
pub const MAX_ZOOM: f64 = 4.0;
/// Smallest width a drag-resize can shrink an image or signature to
const MIN_RESIZE_PT: f64 = 8.0;
/// Extra pick radius around resize handles, in pixels
const HANDLE_SLOP_PX: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditorMode {
    #[default]
    Select,
    AddText,
    Draw,
    PlaceImage,
    PlaceSignature,
}

impl EditorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditorMode::Select => "select",
            EditorMode::AddText => "addText",
            EditorMode::Draw => "draw",
            EditorMode::PlaceImage => "placeImage",
            EditorMode::PlaceSignature => "placeSignature",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "select" => Some(EditorMode::Select),
            "addText" => Some(EditorMode::AddText),
            "draw" => Some(EditorMode::Draw),
            "placeImage" => Some(EditorMode::PlaceImage),
            "placeSignature" => Some(EditorMode::PlaceSignature),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    target: DragTarget,
    resize: bool,
    origin: PdfRect,
    start: DocPoint,
    current: DocPoint,
}

impl DragState {
    fn delta(&self) -> (f64, f64) {
        (self.current.x - self.start.x, self.current.y - self.start.y)
    }

    fn preview(&self) -> DragPreview {
        let (dx, dy) = self.delta();
        if self.resize {
            let width_pt = (self.origin.width + dx).max(MIN_RESIZE_PT);
            DragPreview::Resize {
                target: self.target,
                width_pt,
                height_pt: width_pt * self.origin.height / self.origin.width,
            }
        } else {
            DragPreview::Move {
                target: self.target,
                dx_pt: dx,
                dy_pt: dy,
            }
        }
    }
}

pub struct EditorSession {
    config: EditorConfig,
    source: Vec<u8>,
    page_sizes: Vec<(f64, f64)>,
    viewport_width_px: f64,
    zoom: f64,
    page_index: u32,
    viewport: ViewportState,
    renders: RenderCoordinator,
    text_layer: Option<TextLayer>,
    extraction_error: Option<String>,
    store: AnnotationStore,
    history: HistoryManager,
    renderer: OverlayRenderer,
    mode: EditorMode,
    hover: Option<RunKey>,
    inline_editing: Option<AnnotationId>,
    drag: Option<DragState>,
    active_stroke: Option<ActiveStroke>,
    pending: Option<PendingPlacement>,
    text_entry: Option<DocPoint>,
    staged_image: Option<Arc<RasterImage>>,
    signature_capture: Option<SignatureCapture>,
    field_values: BTreeMap<String, String>,
}

impl EditorSession {
    /// Start a session over `source` whose pages have the given sizes in points
    pub fn new(
        source: Vec<u8>,
        page_sizes: Vec<(f64, f64)>,
        viewport_width_px: f64,
        config: EditorConfig,
    ) -> Result<Self, EditorError> {
        config.validate()?;
        let Some(&(width, height)) = page_sizes.first() else {
            return Err(EditorError::ParseError("document has no pages".to_string()));
        };
        if page_sizes.iter().any(|(w, h)| !(*w > 0.0 && *h > 0.0)) {
            return Err(EditorError::ParseError("page with empty size".to_string()));
        }
        if !(viewport_width_px > 0.0) {
            return Err(EditorError::InvalidConfig(format!(
                "viewport width must be positive, got {}",
                viewport_width_px
            )));
        }

        info!(pages = page_sizes.len(), bytes = source.len(), "opened editor session");
        Ok(Self {
            viewport: ViewportState::fit_to_width(viewport_width_px, 1.0, width, height),
            history: HistoryManager::new(config.history_capacity),
            renderer: OverlayRenderer::new(config.overlay.clone(), config.cover_padding_pt),
            config,
            source,
            page_sizes,
            viewport_width_px,
            zoom: 1.0,
            page_index: 0,
            renders: RenderCoordinator::new(),
            text_layer: None,
            extraction_error: None,
            store: AnnotationStore::new(),
            mode: EditorMode::Select,
            hover: None,
            inline_editing: None,
            drag: None,
            active_stroke: None,
            pending: None,
            text_entry: None,
            staged_image: None,
            signature_capture: None,
            field_values: BTreeMap::new(),
        })
    }

    /// Start a session taking page sizes from `rasterizer`
    pub fn open<R: PageRasterizer>(
        source: Vec<u8>,
        rasterizer: &R,
        viewport_width_px: f64,
        config: EditorConfig,
    ) -> Result<Self, EditorError> {
        let page_sizes = (0..rasterizer.page_count())
            .map(|page| rasterizer.page_size_pt(page))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(source, page_sizes, viewport_width_px, config)
    }

    // ============ Accessors ============

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn text_layer(&self) -> Option<&TextLayer> {
        self.text_layer.as_ref()
    }

    /// Why the current page has no text layer, if extraction failed
    pub fn extraction_error(&self) -> Option<&str> {
        self.extraction_error.as_deref()
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn hover(&self) -> Option<RunKey> {
        self.hover
    }

    pub fn is_stroke_active(&self) -> bool {
        self.active_stroke.is_some()
    }

    /// Number of recorded actions that can be undone
    pub fn action_count(&self) -> usize {
        self.history.undo_len()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn has_changes(&self) -> bool {
        !self.store.is_empty() || !self.field_values.is_empty()
    }

    // ============ Viewport and rendering ============

    fn refresh_viewport(&mut self) -> RenderTicket {
        let (width, height) = self.page_sizes[self.page_index as usize];
        self.viewport =
            ViewportState::fit_to_width(self.viewport_width_px, self.zoom, width, height);
        self.text_layer = None;
        self.extraction_error = None;
        self.hover = None;
        self.drag = None;
        self.pending = None;
        self.renders.begin(self.page_index, self.viewport.scale)
    }

    /// Ticket for rendering the current view, e.g. after opening the session
    pub fn request_render(&mut self) -> RenderTicket {
        self.refresh_viewport()
    }

    pub fn set_viewport_width(&mut self, viewport_width_px: f64) -> Option<RenderTicket> {
        if !(viewport_width_px > 0.0) {
            return None;
        }
        self.viewport_width_px = viewport_width_px;
        Some(self.refresh_viewport())
    }

    pub fn set_zoom(&mut self, zoom: f64) -> Option<RenderTicket> {
        if !zoom.is_finite() {
            return None;
        }
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        Some(self.refresh_viewport())
    }

    /// Switch pages. An in-progress stroke is dropped.
    pub fn go_to_page(&mut self, page_index: u32) -> Option<RenderTicket> {
        if page_index >= self.page_count() {
            return None;
        }
        if self.active_stroke.take().is_some() {
            debug!("dropping unfinished stroke on page change");
        }
        self.page_index = page_index;
        self.inline_editing = None;
        self.text_entry = None;
        Some(self.refresh_viewport())
    }

    /// Install the text content of a finished render.
    ///
    /// Returns `false` for stale tickets; their content is discarded.
    pub fn complete_render(&mut self, ticket: RenderTicket, text: TextContent) -> bool {
        if !self.renders.complete(&ticket) {
            return false;
        }
        match text {
            TextContent::Runs(raw) => {
                let layer = TextLayer::extract(ticket.page_index, self.viewport, &raw);
                debug!(page_index = ticket.page_index, runs = layer.len(), "text layer ready");
                self.text_layer = Some(layer);
                self.extraction_error = None;
            }
            TextContent::Unavailable(reason) => {
                let err = EditorError::ExtractionError {
                    page_index: ticket.page_index,
                    reason,
                };
                warn!(error = %err, "page has no editable text");
                self.text_layer = None;
                self.extraction_error = Some(err.to_string());
            }
        }
        true
    }

    /// Render the current page synchronously and install its text layer
    pub fn render_current_page<R: PageRasterizer>(
        &mut self,
        rasterizer: &R,
    ) -> Result<Option<RasterImage>, EditorError> {
        let ticket = self.renders.current().unwrap_or_else(|| self.refresh_viewport());
        let rendered = rasterizer.render(ticket.page_index, ticket.scale)?;
        if self.complete_render(ticket, rendered.text) {
            Ok(Some(rendered.bitmap))
        } else {
            Ok(None)
        }
    }

    /// Clear and repaint the overlay for the current page
    pub fn redraw(&self, surface: &mut dyn OverlaySurface) {
        let state = OverlayState {
            viewport: self.viewport,
            page_index: self.page_index,
            text_layer: self.text_layer.as_ref(),
            store: &self.store,
            mode: self.mode,
            hover: self.hover,
            inline_editing: self.inline_editing,
            drag: self.drag.map(|d| d.preview()),
            active_stroke: self.active_stroke.as_ref(),
            pending: self.pending,
        };
        self.renderer.render(&state, surface);
    }

    // ============ Modes and staged input ============

    pub fn set_mode(&mut self, mode: EditorMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        self.hover = None;
        self.drag = None;
        self.pending = None;
        self.text_entry = None;
        self.active_stroke = None;
        if mode != EditorMode::Select {
            self.store.clear_focus();
        }
    }

    /// Image to drop in `PlaceImage` mode
    pub fn stage_image(&mut self, image: RasterImage) {
        self.staged_image = Some(Arc::new(image));
    }

    /// Signature to drop in `PlaceSignature` mode
    pub fn set_signature_capture(&mut self, capture: SignatureCapture) {
        self.signature_capture = Some(capture);
    }

    pub fn signature_capture(&self) -> Option<&SignatureCapture> {
        self.signature_capture.as_ref()
    }

    // ============ Pointer protocol ============

    fn to_doc(&self, px: f64, py: f64) -> DocPoint {
        let (x, y) = self.viewport.to_doc(px, py);
        DocPoint::new(x, y)
    }

    fn placement_rect(&self, at: DocPoint) -> Option<PdfRect> {
        let (width, aspect) = match self.mode {
            EditorMode::PlaceImage => {
                let image = self.staged_image.as_ref()?;
                (self.config.image_width_pt, image.aspect_ratio())
            }
            EditorMode::PlaceSignature => {
                let capture = self.signature_capture.as_ref()?;
                (self.config.signature_width_pt, capture.aspect_ratio())
            }
            _ => return None,
        };
        let height = width / aspect;
        Some(PdfRect::new(at.x, at.y - height, width, height))
    }

    pub fn pointer_down(&mut self, px: f64, py: f64) {
        let point = self.to_doc(px, py);
        match self.mode {
            EditorMode::Select => self.begin_selection(px, py, point),
            EditorMode::AddText => {
                self.text_entry = Some(point);
                self.pending = Some(PendingPlacement::TextCaret {
                    doc_x: point.x,
                    doc_y: point.y,
                    font_size_pt: self.config.default_font_size_pt,
                });
            }
            EditorMode::Draw => {
                self.active_stroke = Some(ActiveStroke {
                    page_index: self.page_index,
                    color: self.config.stroke_color,
                    width_pt: self.config.stroke_width_pt,
                    points: vec![point],
                });
            }
            EditorMode::PlaceImage => {
                let staged = (self.placement_rect(point), self.staged_image.clone());
                let (Some(rect), Some(pixels)) = staged else {
                    return;
                };
                let action = self.store.add_image(self.page_index, rect, pixels);
                if let Some(EditAction::AddImage { image }) = &action {
                    let id = image.id;
                    self.record(action);
                    self.store.select(Focus::Image(id));
                    self.set_mode(EditorMode::Select);
                }
            }
            EditorMode::PlaceSignature => {
                let Some(capture) = self.signature_capture.clone() else {
                    return;
                };
                let (x_ratio, y_ratio) = self.viewport.to_page_ratio(point.x, point.y);
                let action = self.store.place_signature(
                    self.page_index,
                    x_ratio,
                    y_ratio,
                    self.config.signature_width_pt,
                    capture.pixels().clone(),
                );
                if self.record(action) {
                    self.set_mode(EditorMode::Select);
                    self.store.select(Focus::Signature);
                }
            }
        }
    }

    pub fn pointer_move(&mut self, px: f64, py: f64) {
        let point = self.to_doc(px, py);
        match self.mode {
            EditorMode::Select => {
                if let Some(drag) = &mut self.drag {
                    drag.current = point;
                } else {
                    self.hover = self
                        .text_layer
                        .as_ref()
                        .and_then(|layer| layer.hit_test(px, py))
                        .map(|run| run.key);
                }
            }
            EditorMode::AddText => {
                if self.text_entry.is_none() {
                    self.pending = Some(PendingPlacement::TextCaret {
                        doc_x: point.x,
                        doc_y: point.y,
                        font_size_pt: self.config.default_font_size_pt,
                    });
                }
            }
            EditorMode::Draw => {
                if let Some(stroke) = &mut self.active_stroke {
                    if stroke.points.last() != Some(&point) {
                        stroke.points.push(point);
                    }
                }
            }
            EditorMode::PlaceImage | EditorMode::PlaceSignature => {
                self.pending = self
                    .placement_rect(point)
                    .map(|rect| PendingPlacement::ImageBox { rect });
            }
        }
    }

    /// Finish a drag or stroke. Returns whether an action was recorded.
    pub fn pointer_up(&mut self, px: f64, py: f64) -> bool {
        let point = self.to_doc(px, py);
        match self.mode {
            EditorMode::Select => {
                let Some(mut drag) = self.drag.take() else {
                    return false;
                };
                drag.current = point;
                let action = self.finish_drag(&drag);
                self.record(action)
            }
            EditorMode::Draw => {
                let Some(mut stroke) = self.active_stroke.take() else {
                    return false;
                };
                if stroke.points.last() != Some(&point) {
                    stroke.points.push(point);
                }
                let points = stroke.points.len();
                let action = self.store.add_stroke(
                    stroke.page_index,
                    stroke.color,
                    stroke.width_pt,
                    stroke.points,
                );
                let recorded = self.record(action);
                if !recorded {
                    debug!(points, "discarding stroke with too few points");
                }
                recorded
            }
            _ => false,
        }
    }

    pub fn pointer_leave(&mut self) {
        self.hover = None;
        if self.text_entry.is_none() {
            self.pending = None;
        }
    }

    fn handle_hit(&self, rect: RasterRect, px: f64, py: f64) -> bool {
        let reach = self.config.overlay.handle_size_px / 2.0 + HANDLE_SLOP_PX;
        (px - (rect.x + rect.w)).abs() <= reach && (py - (rect.y + rect.h)).abs() <= reach
    }

    fn begin_selection(&mut self, px: f64, py: f64, point: DocPoint) {
        let viewport = self.viewport;
        let mut hit: Option<(DragTarget, PdfRect, bool)> = None;

        if let Some(signature) = self
            .store
            .signature()
            .filter(|s| s.page_index == self.page_index)
        {
            let rect = preview_signature_rect(signature, &viewport, None);
            let raster = rect_to_raster(&viewport, &rect);
            let focused = self.store.focus() == Focus::Signature;
            if focused && self.handle_hit(raster, px, py) {
                hit = Some((DragTarget::Signature, rect, true));
            } else if raster.contains(px, py) {
                hit = Some((DragTarget::Signature, rect, false));
            }
        }
        if hit.is_none() {
            let images: Vec<_> = self.store.images_on(self.page_index).collect();
            for image in images.into_iter().rev() {
                let rect = preview_image_rect(image, None);
                let raster = rect_to_raster(&viewport, &rect);
                let focused = self.store.focus() == Focus::Image(image.id);
                if focused && self.handle_hit(raster, px, py) {
                    hit = Some((DragTarget::Image(image.id), rect, true));
                    break;
                }
                if raster.contains(px, py) {
                    hit = Some((DragTarget::Image(image.id), rect, false));
                    break;
                }
            }
        }
        if hit.is_none() {
            hit = self
                .store
                .annotations_on(self.page_index)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .map(|a| (a.id, annotation_rect(a, DocPoint::new(a.doc_x, a.doc_y))))
                .find(|(_, rect)| rect_to_raster(&viewport, rect).contains(px, py))
                .map(|(id, rect)| (DragTarget::Annotation(id), rect, false));
        }

        if let Some((target, origin, resize)) = hit {
            self.store.select(match target {
                DragTarget::Annotation(id) => Focus::Annotation(id),
                DragTarget::Image(id) => Focus::Image(id),
                DragTarget::Signature => Focus::Signature,
            });
            self.drag = Some(DragState {
                target,
                resize,
                origin,
                start: point,
                current: point,
            });
            return;
        }

        let stroke = self
            .store
            .strokes_on(self.page_index)
            .filter(|s| {
                s.bounds()
                    .map_or(false, |b| rect_to_raster(&viewport, &b).contains(px, py))
            })
            .last()
            .map(|s| s.id);
        if let Some(id) = stroke {
            self.store.select(Focus::Stroke(id));
            return;
        }

        match self.text_layer.as_ref().and_then(|layer| layer.hit_test(px, py)) {
            Some(run) => self.store.select(Focus::TextRun(run.key)),
            None => self.store.clear_focus(),
        }
    }

    fn finish_drag(&mut self, drag: &DragState) -> Option<EditAction> {
        match drag.preview() {
            DragPreview::Move { target, dx_pt, dy_pt } => match target {
                DragTarget::Annotation(id) => {
                    let annotation = self.store.annotation(id)?;
                    let (x, y) = (annotation.doc_x + dx_pt, annotation.doc_y + dy_pt);
                    self.store.move_annotation(id, x, y)
                }
                DragTarget::Image(id) => {
                    let image = self.store.image(id)?;
                    let (x, y) = (image.doc_x + dx_pt, image.doc_y + dy_pt);
                    self.store.move_image(id, x, y)
                }
                DragTarget::Signature => {
                    let signature = self.store.signature()?;
                    let page_index = signature.page_index;
                    let (x_ratio, y_ratio) = self
                        .viewport
                        .to_page_ratio(drag.origin.x + dx_pt, drag.origin.top() + dy_pt);
                    self.store.move_signature(page_index, x_ratio, y_ratio)
                }
            },
            DragPreview::Resize {
                target,
                width_pt,
                height_pt,
            } => match target {
                DragTarget::Image(id) => self.store.resize_image(id, width_pt, height_pt, true),
                DragTarget::Signature => self.store.resize_signature(width_pt),
                DragTarget::Annotation(_) => None,
            },
        }
    }

    // ============ Host operations ============

    fn record(&mut self, action: Option<EditAction>) -> bool {
        let Some(action) = action else {
            return false;
        };
        debug!(kind = action.kind(), page_index = ?action.page_index(), "recorded action");
        self.history.push(action);
        true
    }

    pub fn select(&mut self, focus: Focus) {
        self.store.select(focus);
    }

    pub fn clear_focus(&mut self) {
        self.store.clear_focus();
    }

    pub fn edit_run_text(&mut self, key: RunKey, text: &str) -> bool {
        let Some(run) = self.text_layer.as_ref().and_then(|l| l.run(key)).cloned() else {
            return false;
        };
        let action = self.store.edit_run_text(&run, text);
        self.record(action)
    }

    pub fn resize_run_font(&mut self, key: RunKey, font_size_pt: f64) -> bool {
        let Some(run) = self.text_layer.as_ref().and_then(|l| l.run(key)).cloned() else {
            return false;
        };
        let size = self.config.clamp_font_size(font_size_pt);
        let action = self.store.resize_run_font(&run, size);
        self.record(action)
    }

    pub fn recolor_run(&mut self, key: RunKey, color: Color) -> bool {
        let Some(run) = self.text_layer.as_ref().and_then(|l| l.run(key)).cloned() else {
            return false;
        };
        let action = self.store.recolor_run(&run, color);
        self.record(action)
    }

    /// Add a text annotation at a baseline point on the current page
    pub fn add_text_annotation(
        &mut self,
        doc_x: f64,
        doc_y: f64,
        text: &str,
        font_size_pt: Option<f64>,
        color: Option<Color>,
    ) -> Option<AnnotationId> {
        let size = self
            .config
            .clamp_font_size(font_size_pt.unwrap_or(self.config.default_font_size_pt));
        let color = color.unwrap_or(self.config.default_text_color);
        let action = self
            .store
            .add_text_annotation(self.page_index, doc_x, doc_y, text, size, color);
        let id = action.as_ref().and_then(EditAction::annotation_id);
        if let Some(id) = id {
            self.record(action);
            self.store.select(Focus::Annotation(id));
        }
        id
    }

    /// Add the text typed at the caret placed by the last `AddText` click
    pub fn commit_text_entry(&mut self, text: &str) -> Option<AnnotationId> {
        let at = self.text_entry.take()?;
        self.pending = None;
        let id = self.add_text_annotation(at.x, at.y, text, None, None);
        self.set_mode(EditorMode::Select);
        if let Some(id) = id {
            self.store.select(Focus::Annotation(id));
        }
        id
    }

    pub fn cancel_text_entry(&mut self) {
        self.text_entry = None;
        self.pending = None;
    }

    /// Hide an annotation from the overlay while the host edits it in place
    pub fn begin_inline_edit(&mut self, id: AnnotationId) -> bool {
        if self.store.annotation(id).is_none() {
            return false;
        }
        self.inline_editing = Some(id);
        self.store.select(Focus::Annotation(id));
        true
    }

    /// Apply the inline editor's text. Blank text removes the annotation.
    pub fn finish_inline_edit(&mut self, text: &str) -> bool {
        let Some(id) = self.inline_editing.take() else {
            return false;
        };
        if text.trim().is_empty() {
            self.remove_annotation(id)
        } else {
            self.edit_annotation_text(id, text)
        }
    }

    pub fn edit_annotation_text(&mut self, id: AnnotationId, text: &str) -> bool {
        let action = self.store.edit_annotation_text(id, text);
        self.record(action)
    }

    pub fn move_annotation(&mut self, id: AnnotationId, doc_x: f64, doc_y: f64) -> bool {
        let action = self.store.move_annotation(id, doc_x, doc_y);
        self.record(action)
    }

    pub fn resize_annotation_font(&mut self, id: AnnotationId, font_size_pt: f64) -> bool {
        let size = self.config.clamp_font_size(font_size_pt);
        let action = self.store.resize_annotation_font(id, size);
        self.record(action)
    }

    pub fn remove_annotation(&mut self, id: AnnotationId) -> bool {
        let action = self.store.remove_annotation(id);
        self.record(action)
    }

    pub fn remove_stroke(&mut self, id: AnnotationId) -> bool {
        let action = self.store.remove_stroke(id);
        self.record(action)
    }

    /// Add an image on the current page; height follows the image's aspect ratio
    pub fn add_image(
        &mut self,
        doc_x: f64,
        doc_y: f64,
        width_pt: Option<f64>,
        pixels: Arc<RasterImage>,
    ) -> Option<AnnotationId> {
        let width = width_pt.unwrap_or(self.config.image_width_pt);
        let height = width / pixels.aspect_ratio();
        let action = self
            .store
            .add_image(self.page_index, PdfRect::new(doc_x, doc_y, width, height), pixels);
        let id = action.as_ref().and_then(EditAction::annotation_id);
        if let Some(id) = id {
            self.record(action);
            self.store.select(Focus::Image(id));
        }
        id
    }

    pub fn move_image(&mut self, id: AnnotationId, doc_x: f64, doc_y: f64) -> bool {
        let action = self.store.move_image(id, doc_x, doc_y);
        self.record(action)
    }

    pub fn resize_image(
        &mut self,
        id: AnnotationId,
        width_pt: f64,
        height_pt: f64,
        keep_aspect: bool,
    ) -> bool {
        let action = self.store.resize_image(id, width_pt, height_pt, keep_aspect);
        self.record(action)
    }

    pub fn remove_image(&mut self, id: AnnotationId) -> bool {
        let action = self.store.remove_image(id);
        self.record(action)
    }

    /// Place the captured signature with its top-left corner at page-fraction coordinates
    pub fn place_signature(
        &mut self,
        page_index: u32,
        anchor_x_ratio: f64,
        anchor_y_ratio: f64,
    ) -> bool {
        if page_index >= self.page_count() {
            return false;
        }
        let Some(capture) = self.signature_capture.clone() else {
            return false;
        };
        let action = self.store.place_signature(
            page_index,
            anchor_x_ratio,
            anchor_y_ratio,
            self.config.signature_width_pt,
            capture.pixels().clone(),
        );
        self.record(action)
    }

    pub fn move_signature(
        &mut self,
        page_index: u32,
        anchor_x_ratio: f64,
        anchor_y_ratio: f64,
    ) -> bool {
        if page_index >= self.page_count() {
            return false;
        }
        let action = self.store.move_signature(page_index, anchor_x_ratio, anchor_y_ratio);
        self.record(action)
    }

    pub fn resize_signature(&mut self, width_pt: f64) -> bool {
        let action = self.store.resize_signature(width_pt);
        self.record(action)
    }

    pub fn clear_signature(&mut self) -> bool {
        let action = self.store.clear_signature();
        self.record(action)
    }

    /// Remove whatever is focused. Text runs are not removable.
    pub fn delete_selection(&mut self) -> bool {
        match self.store.focus() {
            Focus::Annotation(id) => self.remove_annotation(id),
            Focus::Image(id) => self.remove_image(id),
            Focus::Stroke(id) => self.remove_stroke(id),
            Focus::Signature => self.clear_signature(),
            Focus::TextRun(_) | Focus::None => false,
        }
    }

    pub fn undo(&mut self) -> bool {
        self.drag = None;
        self.active_stroke = None;
        self.inline_editing = None;
        self.history.undo(&mut self.store).is_some()
    }

    pub fn redo(&mut self) -> bool {
        self.drag = None;
        self.active_stroke = None;
        self.inline_editing = None;
        self.history.redo(&mut self.store).is_some()
    }

    // ============ Forms ============

    /// Queue a form field value, applied at commit
    pub fn set_field_value(&mut self, name: &str, value: &str) {
        self.field_values.insert(name.to_string(), value.to_string());
    }

    pub fn field_values(&self) -> &BTreeMap<String, String> {
        &self.field_values
    }

    // ============ Commit ============

    /// Build the output document. The session is unchanged either way.
    pub fn commit<S, R>(
        &self,
        service: &S,
        rasterizer: &R,
        flatten_form: bool,
    ) -> Result<CommitOutput, EditorError>
    where
        S: DocumentService,
        R: PageRasterizer,
    {
        let options = CommitOptions {
            flatten_form,
            field_values: self.field_values.clone(),
        };
        CommitPipeline::new(service, rasterizer, &self.config).commit(
            &self.source,
            &self.store,
            &options,
        )
    }

    /// Discard every edit and all history
    pub fn reset(&mut self) {
        self.store.clear();
        self.history.clear();
        self.field_values.clear();
        self.mode = EditorMode::Select;
        self.hover = None;
        self.inline_editing = None;
        self.drag = None;
        self.active_stroke = None;
        self.pending = None;
        self.text_entry = None;
        info!("editor session reset");
    }
}
