//! The mutable edit model layered over the source document
//!
//! `AnnotationStore` exclusively owns every edit: text replacements, free text
//! annotations, freehand strokes, placed images and the single signature.
//! Every mutating method validates its target, snapshots the old state,
//! applies the change and hands back the [`EditAction`] describing it. A
//! request that names a missing entity or changes nothing returns `None`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::bitmap::RasterImage;
use crate::coords::page_ratio_to_doc;
use crate::fonts::measure_text_width;
use crate::operations::EditAction;
use crate::text_layer::{RunKey, RunSnapshot, TextRun};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub type AnnotationId = u64;

/// 8-bit sRGB color, serialized as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional)
    pub fn from_hex(color: &str) -> Option<Self> {
        let hex = color.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Components in 0..=1 for PDF color operators
    pub fn to_pdf_rgb(&self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::from_hex(&value).ok_or_else(|| format!("invalid color: {}", value))
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

/// Rectangle in document space, anchored bottom-left
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn inflate(&self, by: f64) -> PdfRect {
        PdfRect::new(
            self.x - by,
            self.y - by,
            self.width + 2.0 * by,
            self.height + 2.0 * by,
        )
    }

    pub fn union(&self, other: &PdfRect) -> PdfRect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        PdfRect::new(
            x,
            y,
            self.right().max(other.right()) - x,
            self.top().max(other.top()) - y,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f64,
    pub y: f64,
}

impl DocPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Replacement of one extracted run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEdit {
    pub key: RunKey,
    /// The run as it was when the edit was made
    pub original: RunSnapshot,
    pub new_text: String,
    #[serde(default)]
    pub new_font_size_pt: Option<f64>,
    #[serde(default)]
    pub new_color: Option<Color>,
}

impl TextEdit {
    fn unchanged(key: RunKey, original: RunSnapshot) -> Self {
        Self {
            key,
            new_text: original.text.clone(),
            original,
            new_font_size_pt: None,
            new_color: None,
        }
    }

    /// Same text, no overrides
    pub fn is_noop(&self) -> bool {
        self.new_text == self.original.text
            && self.new_font_size_pt.is_none()
            && self.new_color.is_none()
    }

    pub fn font_size_pt(&self) -> f64 {
        self.new_font_size_pt.unwrap_or(self.original.font_size_pt)
    }

    pub fn color(&self) -> Color {
        self.new_color.unwrap_or(self.original.color)
    }

    /// Width of `new_text` in the run's fallback font at the effective size
    pub fn replacement_width(&self) -> f64 {
        measure_text_width(
            &self.new_text,
            self.original.standard_font(),
            self.font_size_pt(),
        )
    }

    /// Opaque area hiding the original glyphs, wide enough for the new text
    pub fn cover_rect(&self, padding_pt: f64) -> PdfRect {
        let run = &self.original;
        let size = run.font_size_pt.max(self.font_size_pt());
        PdfRect::new(
            run.doc_x,
            run.doc_y - run.descent_ratio * size,
            run.doc_width.max(self.replacement_width()),
            (run.ascent_ratio + run.descent_ratio) * size,
        )
        .inflate(padding_pt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextAnnotation {
    pub id: AnnotationId,
    pub page_index: u32,
    /// Baseline origin
    pub doc_x: f64,
    pub doc_y: f64,
    pub font_size_pt: f64,
    pub color: Color,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawStroke {
    pub id: AnnotationId,
    pub page_index: u32,
    pub color: Color,
    pub width_pt: f64,
    pub points: Vec<DocPoint>,
}

impl DrawStroke {
    /// Bounds of the polyline including half the line width
    pub fn bounds(&self) -> Option<PdfRect> {
        let first = self.points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let pad = self.width_pt / 2.0;
        Some(PdfRect::new(
            min_x - pad,
            min_y - pad,
            max_x - min_x + 2.0 * pad,
            max_y - min_y + 2.0 * pad,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAnnotation {
    pub id: AnnotationId,
    pub page_index: u32,
    /// Bottom-left corner
    pub doc_x: f64,
    pub doc_y: f64,
    pub width_pt: f64,
    pub height_pt: f64,
    pub pixels: Arc<RasterImage>,
}

impl ImageAnnotation {
    pub fn rect(&self) -> PdfRect {
        PdfRect::new(self.doc_x, self.doc_y, self.width_pt, self.height_pt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignaturePlacement {
    pub page_index: u32,
    /// Top-left corner as a fraction of the page (origin top-left)
    pub anchor_x_ratio: f64,
    pub anchor_y_ratio: f64,
    pub width_pt: f64,
    /// width / height
    pub aspect_ratio: f64,
    pub pixels: Arc<RasterImage>,
}

impl SignaturePlacement {
    pub fn height_pt(&self) -> f64 {
        self.width_pt / self.aspect_ratio
    }

    /// Placement rectangle on a page of the given size
    pub fn doc_rect(&self, page_width_pt: f64, page_height_pt: f64) -> PdfRect {
        let (left, top) = page_ratio_to_doc(
            self.anchor_x_ratio,
            self.anchor_y_ratio,
            page_width_pt,
            page_height_pt,
        );
        let height = self.height_pt();
        PdfRect::new(left, top - height, self.width_pt, height)
    }
}

/// The single active selection target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target")]
pub enum Focus {
    #[default]
    None,
    TextRun(RunKey),
    Annotation(AnnotationId),
    Image(AnnotationId),
    Stroke(AnnotationId),
    Signature,
}

#[derive(Debug, Default)]
pub struct AnnotationStore {
    next_id: AnnotationId,
    text_edits: BTreeMap<RunKey, TextEdit>,
    annotations: Vec<TextAnnotation>,
    strokes: Vec<DrawStroke>,
    images: Vec<ImageAnnotation>,
    signature: Option<SignaturePlacement>,
    focus: Focus,
}

fn valid_length(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> AnnotationId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ============ Text runs ============

    /// Edit currently stored for `run`, if it was made against this same run
    pub fn text_edit_for(&self, run: &TextRun) -> Option<&TextEdit> {
        self.text_edits
            .get(&run.key)
            .filter(|edit| edit.original.matches(run))
    }

    fn update_text_edit(
        &mut self,
        run: &TextRun,
        change: impl FnOnce(&mut TextEdit),
    ) -> Option<(Option<TextEdit>, Option<TextEdit>)> {
        let old = self.text_edits.get(&run.key).cloned();
        if let Some(existing) = &old {
            if !existing.original.matches(run) {
                warn!(
                    page_index = run.key.page_index,
                    run_index = run.key.run_index,
                    "run key no longer refers to the edited run, ignoring edit"
                );
                return None;
            }
        }

        let mut edit = old
            .clone()
            .unwrap_or_else(|| TextEdit::unchanged(run.key, run.snapshot()));
        change(&mut edit);
        let new = if edit.is_noop() { None } else { Some(edit) };
        if new == old {
            return None;
        }
        self.set_text_edit(run.key, new.clone());
        Some((old, new))
    }

    pub fn edit_run_text(&mut self, run: &TextRun, new_text: &str) -> Option<EditAction> {
        let (old, new) = self.update_text_edit(run, |edit| {
            edit.new_text = new_text.to_string();
        })?;
        Some(EditAction::EditText {
            key: run.key,
            old,
            new,
        })
    }

    pub fn resize_run_font(&mut self, run: &TextRun, font_size_pt: f64) -> Option<EditAction> {
        if !valid_length(font_size_pt) {
            return None;
        }
        let (old, new) = self.update_text_edit(run, |edit| {
            edit.new_font_size_pt = if font_size_pt == edit.original.font_size_pt {
                None
            } else {
                Some(font_size_pt)
            };
        })?;
        Some(EditAction::ResizeText {
            key: run.key,
            old,
            new,
        })
    }

    pub fn recolor_run(&mut self, run: &TextRun, color: Color) -> Option<EditAction> {
        let (old, new) = self.update_text_edit(run, |edit| {
            edit.new_color = if color == edit.original.color {
                None
            } else {
                Some(color)
            };
        })?;
        Some(EditAction::EditText {
            key: run.key,
            old,
            new,
        })
    }

    pub(crate) fn set_text_edit(&mut self, key: RunKey, edit: Option<TextEdit>) {
        match edit {
            Some(edit) if !edit.is_noop() => {
                self.text_edits.insert(key, edit);
            }
            _ => {
                self.text_edits.remove(&key);
            }
        }
    }

    /// Every stored edit that changes something, in key order
    pub fn effective_text_edits(&self) -> impl Iterator<Item = &TextEdit> {
        self.text_edits.values().filter(|edit| !edit.is_noop())
    }

    pub fn text_edits_on(&self, page_index: u32) -> impl Iterator<Item = &TextEdit> {
        self.effective_text_edits()
            .filter(move |edit| edit.key.page_index == page_index)
    }

    // ============ Text annotations ============

    pub fn add_text_annotation(
        &mut self,
        page_index: u32,
        doc_x: f64,
        doc_y: f64,
        text: &str,
        font_size_pt: f64,
        color: Color,
    ) -> Option<EditAction> {
        if text.trim().is_empty() || !valid_length(font_size_pt) {
            return None;
        }
        let annotation = TextAnnotation {
            id: self.allocate_id(),
            page_index,
            doc_x,
            doc_y,
            font_size_pt,
            color,
            text: text.to_string(),
        };
        self.annotations.push(annotation.clone());
        Some(EditAction::AddAnnotation { annotation })
    }

    pub fn edit_annotation_text(&mut self, id: AnnotationId, text: &str) -> Option<EditAction> {
        let annotation = self.annotation_mut(id)?;
        if annotation.text == text {
            return None;
        }
        let old_text = std::mem::replace(&mut annotation.text, text.to_string());
        Some(EditAction::EditAnnotationText {
            id,
            old_text,
            new_text: text.to_string(),
        })
    }

    pub fn move_annotation(
        &mut self,
        id: AnnotationId,
        doc_x: f64,
        doc_y: f64,
    ) -> Option<EditAction> {
        let annotation = self.annotation_mut(id)?;
        let from = DocPoint::new(annotation.doc_x, annotation.doc_y);
        let to = DocPoint::new(doc_x, doc_y);
        if from == to {
            return None;
        }
        annotation.doc_x = doc_x;
        annotation.doc_y = doc_y;
        Some(EditAction::MoveAnnotation { id, from, to })
    }

    pub fn resize_annotation_font(
        &mut self,
        id: AnnotationId,
        font_size_pt: f64,
    ) -> Option<EditAction> {
        if !valid_length(font_size_pt) {
            return None;
        }
        let annotation = self.annotation_mut(id)?;
        if annotation.font_size_pt == font_size_pt {
            return None;
        }
        let old_size = std::mem::replace(&mut annotation.font_size_pt, font_size_pt);
        Some(EditAction::ResizeAnnotationFont {
            id,
            old_size,
            new_size: font_size_pt,
        })
    }

    pub fn remove_annotation(&mut self, id: AnnotationId) -> Option<EditAction> {
        let (index, annotation) = self.take_annotation(id)?;
        Some(EditAction::RemoveAnnotation { annotation, index })
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&TextAnnotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub(crate) fn annotation_mut(&mut self, id: AnnotationId) -> Option<&mut TextAnnotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    pub(crate) fn insert_annotation(&mut self, index: usize, annotation: TextAnnotation) {
        let index = index.min(self.annotations.len());
        self.annotations.insert(index, annotation);
    }

    pub(crate) fn take_annotation(&mut self, id: AnnotationId) -> Option<(usize, TextAnnotation)> {
        let index = self.annotations.iter().position(|a| a.id == id)?;
        if self.focus == Focus::Annotation(id) {
            self.focus = Focus::None;
        }
        Some((index, self.annotations.remove(index)))
    }

    pub fn annotations(&self) -> &[TextAnnotation] {
        &self.annotations
    }

    pub fn annotations_on(&self, page_index: u32) -> impl Iterator<Item = &TextAnnotation> {
        self.annotations
            .iter()
            .filter(move |a| a.page_index == page_index)
    }

    // ============ Strokes ============

    /// Record a finished stroke. Strokes need at least two points.
    pub fn add_stroke(
        &mut self,
        page_index: u32,
        color: Color,
        width_pt: f64,
        points: Vec<DocPoint>,
    ) -> Option<EditAction> {
        if points.len() < 2 || !valid_length(width_pt) {
            return None;
        }
        let stroke = DrawStroke {
            id: self.allocate_id(),
            page_index,
            color,
            width_pt,
            points,
        };
        self.strokes.push(stroke.clone());
        Some(EditAction::AddStroke { stroke })
    }

    pub fn remove_stroke(&mut self, id: AnnotationId) -> Option<EditAction> {
        let (index, stroke) = self.take_stroke(id)?;
        Some(EditAction::RemoveStroke { stroke, index })
    }

    pub(crate) fn insert_stroke(&mut self, index: usize, stroke: DrawStroke) {
        let index = index.min(self.strokes.len());
        self.strokes.insert(index, stroke);
    }

    pub(crate) fn take_stroke(&mut self, id: AnnotationId) -> Option<(usize, DrawStroke)> {
        let index = self.strokes.iter().position(|s| s.id == id)?;
        if self.focus == Focus::Stroke(id) {
            self.focus = Focus::None;
        }
        Some((index, self.strokes.remove(index)))
    }

    pub fn strokes(&self) -> &[DrawStroke] {
        &self.strokes
    }

    pub fn strokes_on(&self, page_index: u32) -> impl Iterator<Item = &DrawStroke> {
        self.strokes
            .iter()
            .filter(move |s| s.page_index == page_index)
    }

    // ============ Images ============

    pub fn add_image(
        &mut self,
        page_index: u32,
        rect: PdfRect,
        pixels: Arc<RasterImage>,
    ) -> Option<EditAction> {
        if !valid_length(rect.width) || !valid_length(rect.height) {
            return None;
        }
        let image = ImageAnnotation {
            id: self.allocate_id(),
            page_index,
            doc_x: rect.x,
            doc_y: rect.y,
            width_pt: rect.width,
            height_pt: rect.height,
            pixels,
        };
        self.images.push(image.clone());
        Some(EditAction::AddImage { image })
    }

    pub fn move_image(&mut self, id: AnnotationId, doc_x: f64, doc_y: f64) -> Option<EditAction> {
        let image = self.image_mut(id)?;
        let from = DocPoint::new(image.doc_x, image.doc_y);
        let to = DocPoint::new(doc_x, doc_y);
        if from == to {
            return None;
        }
        image.doc_x = doc_x;
        image.doc_y = doc_y;
        Some(EditAction::MoveImage { id, from, to })
    }

    /// Resize keeping the top-left corner fixed.
    ///
    /// With `keep_aspect` the height follows the width and `height_pt` is ignored.
    pub fn resize_image(
        &mut self,
        id: AnnotationId,
        width_pt: f64,
        height_pt: f64,
        keep_aspect: bool,
    ) -> Option<EditAction> {
        let image = self.image_mut(id)?;
        let from = image.rect();
        let height_pt = if keep_aspect {
            width_pt * from.height / from.width
        } else {
            height_pt
        };
        if !valid_length(width_pt) || !valid_length(height_pt) {
            return None;
        }
        let to = PdfRect::new(from.x, from.top() - height_pt, width_pt, height_pt);
        if to == from {
            return None;
        }
        image.set_rect(to);
        Some(EditAction::ResizeImage { id, from, to })
    }

    pub fn remove_image(&mut self, id: AnnotationId) -> Option<EditAction> {
        let (index, image) = self.take_image(id)?;
        Some(EditAction::RemoveImage { image, index })
    }

    pub fn image(&self, id: AnnotationId) -> Option<&ImageAnnotation> {
        self.images.iter().find(|i| i.id == id)
    }

    pub(crate) fn image_mut(&mut self, id: AnnotationId) -> Option<&mut ImageAnnotation> {
        self.images.iter_mut().find(|i| i.id == id)
    }

    pub(crate) fn insert_image(&mut self, index: usize, image: ImageAnnotation) {
        let index = index.min(self.images.len());
        self.images.insert(index, image);
    }

    pub(crate) fn take_image(&mut self, id: AnnotationId) -> Option<(usize, ImageAnnotation)> {
        let index = self.images.iter().position(|i| i.id == id)?;
        if self.focus == Focus::Image(id) {
            self.focus = Focus::None;
        }
        Some((index, self.images.remove(index)))
    }

    pub fn images(&self) -> &[ImageAnnotation] {
        &self.images
    }

    pub fn images_on(&self, page_index: u32) -> impl Iterator<Item = &ImageAnnotation> {
        self.images
            .iter()
            .filter(move |i| i.page_index == page_index)
    }

    // ============ Signature ============

    pub fn place_signature(
        &mut self,
        page_index: u32,
        anchor_x_ratio: f64,
        anchor_y_ratio: f64,
        width_pt: f64,
        pixels: Arc<RasterImage>,
    ) -> Option<EditAction> {
        if !valid_length(width_pt) {
            return None;
        }
        let placement = SignaturePlacement {
            page_index,
            anchor_x_ratio: anchor_x_ratio.clamp(0.0, 1.0),
            anchor_y_ratio: anchor_y_ratio.clamp(0.0, 1.0),
            width_pt,
            aspect_ratio: pixels.aspect_ratio(),
            pixels,
        };
        self.replace_signature(Some(placement))
    }

    pub fn move_signature(
        &mut self,
        page_index: u32,
        anchor_x_ratio: f64,
        anchor_y_ratio: f64,
    ) -> Option<EditAction> {
        let mut placement = self.signature.clone()?;
        placement.page_index = page_index;
        placement.anchor_x_ratio = anchor_x_ratio.clamp(0.0, 1.0);
        placement.anchor_y_ratio = anchor_y_ratio.clamp(0.0, 1.0);
        self.replace_signature(Some(placement))
    }

    /// Change the width. Height follows from the stored aspect ratio.
    pub fn resize_signature(&mut self, width_pt: f64) -> Option<EditAction> {
        if !valid_length(width_pt) {
            return None;
        }
        let mut placement = self.signature.clone()?;
        placement.width_pt = width_pt;
        self.replace_signature(Some(placement))
    }

    pub fn clear_signature(&mut self) -> Option<EditAction> {
        self.signature.as_ref()?;
        self.replace_signature(None)
    }

    fn replace_signature(&mut self, new: Option<SignaturePlacement>) -> Option<EditAction> {
        if new == self.signature {
            return None;
        }
        let old = self.signature.clone();
        self.set_signature(new.clone());
        Some(EditAction::SetSignature { old, new })
    }

    pub(crate) fn set_signature(&mut self, placement: Option<SignaturePlacement>) {
        if placement.is_none() && self.focus == Focus::Signature {
            self.focus = Focus::None;
        }
        self.signature = placement;
    }

    pub fn signature(&self) -> Option<&SignaturePlacement> {
        self.signature.as_ref()
    }

    // ============ Focus ============

    pub fn focus(&self) -> Focus {
        self.focus
    }

    /// Select `focus`, replacing whatever was selected before.
    ///
    /// Targets that do not exist leave the store with no focus.
    pub fn select(&mut self, focus: Focus) {
        let exists = match focus {
            Focus::None | Focus::TextRun(_) => true,
            Focus::Annotation(id) => self.annotation(id).is_some(),
            Focus::Image(id) => self.image(id).is_some(),
            Focus::Stroke(id) => self.strokes.iter().any(|s| s.id == id),
            Focus::Signature => self.signature.is_some(),
        };
        self.focus = if exists { focus } else { Focus::None };
    }

    pub fn clear_focus(&mut self) {
        self.focus = Focus::None;
    }

    // ============ Whole store ============

    /// Pages carrying any effective edit, in ascending order
    pub fn touched_pages(&self) -> BTreeSet<u32> {
        let mut pages: BTreeSet<u32> = self
            .effective_text_edits()
            .map(|edit| edit.key.page_index)
            .collect();
        pages.extend(self.annotations.iter().map(|a| a.page_index));
        pages.extend(self.strokes.iter().map(|s| s.page_index));
        pages.extend(self.images.iter().map(|i| i.page_index));
        pages.extend(self.signature.iter().map(|s| s.page_index));
        pages
    }

    pub fn is_empty(&self) -> bool {
        self.effective_text_edits().next().is_none()
            && self.annotations.is_empty()
            && self.strokes.is_empty()
            && self.images.is_empty()
            && self.signature.is_none()
    }

    /// Drop every edit and the focus
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl ImageAnnotation {
    pub(crate) fn set_rect(&mut self, rect: PdfRect) {
        self.doc_x = rect.x;
        self.doc_y = rect.y;
        self.width_pt = rect.width;
        self.height_pt = rect.height;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::coords::ViewportState;
    use crate::text_layer::{RawTextRun, TextLayer};
    use pretty_assertions::assert_eq;

    pub(crate) fn sample_layer(page_index: u32) -> TextLayer {
        let raw = |text: &str, y: f64| RawTextRun {
            text: text.to_string(),
            doc_x: 72.0,
            doc_y: y,
            font_size_pt: 12.0,
            font_name: "Helvetica".to_string(),
            font_family_hint: None,
            ascent_ratio: None,
            descent_ratio: None,
            doc_width: 45.0,
            color: None,
        };
        TextLayer::extract(
            page_index,
            ViewportState::new(1.0, 612.0, 792.0),
            &[raw("Invoice", 700.0), raw("Total", 650.0)],
        )
    }

    pub(crate) fn pixels(width: u32, height: u32) -> Arc<RasterImage> {
        let rgba = vec![255; (width * height * 4) as usize];
        Arc::new(RasterImage::from_rgba(width, height, rgba).unwrap())
    }

    #[test]
    fn test_color_hex_roundtrip() {
        let color = Color::from_hex("#1e3a8a").unwrap();
        assert_eq!(color, Color::rgb(0x1E, 0x3A, 0x8A));
        assert_eq!(color.to_hex(), "#1E3A8A");
        assert!(Color::from_hex("#12345").is_none());
        assert!(Color::from_hex("zzzzzz").is_none());
        assert_eq!(serde_json::to_string(&color).unwrap(), "\"#1E3A8A\"");
    }

    #[test]
    fn test_edit_back_to_original_text_removes_edit() {
        let layer = sample_layer(1);
        let run = &layer.runs()[0];
        let mut store = AnnotationStore::new();

        assert!(store.edit_run_text(run, "Receipt").is_some());
        assert_eq!(store.effective_text_edits().count(), 1);

        let action = store.edit_run_text(run, "Invoice").unwrap();
        match action {
            EditAction::EditText { old, new, .. } => {
                assert_eq!(old.unwrap().new_text, "Receipt");
                assert!(new.is_none());
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(store.effective_text_edits().count(), 0);
        assert!(store.touched_pages().is_empty());
    }

    #[test]
    fn test_cover_rect_grows_with_longer_text() {
        let layer = sample_layer(0);
        let run = &layer.runs()[0];
        let mut store = AnnotationStore::new();
        store.edit_run_text(run, "Inv");
        let short = store.text_edit_for(run).unwrap().cover_rect(1.5);
        // never narrower than the original run plus padding
        assert_eq!(short.width, 45.0 + 3.0);
        assert_eq!(short.x, 72.0 - 1.5);

        store.edit_run_text(run, "A considerably longer replacement");
        let long = store.text_edit_for(run).unwrap();
        assert!(long.cover_rect(1.5).width > 48.0);
        assert!((long.cover_rect(0.0).width - long.replacement_width()).abs() < 1e-9);
    }

    #[test]
    fn test_unchanged_edit_is_noop() {
        let layer = sample_layer(0);
        let mut store = AnnotationStore::new();
        assert!(store.edit_run_text(&layer.runs()[0], "Invoice").is_none());
        assert!(store.resize_run_font(&layer.runs()[0], 12.0).is_none());
        assert!(store.recolor_run(&layer.runs()[0], Color::BLACK).is_none());
    }

    #[test]
    fn test_resize_keeps_text_override() {
        let layer = sample_layer(0);
        let run = &layer.runs()[1];
        let mut store = AnnotationStore::new();
        store.edit_run_text(run, "Sum");
        store.resize_run_font(run, 18.0).unwrap();
        let edit = store.text_edit_for(run).unwrap();
        assert_eq!(edit.new_text, "Sum");
        assert_eq!(edit.font_size_pt(), 18.0);
    }

    #[test]
    fn test_edit_ignored_when_key_points_at_other_run() {
        let layer = sample_layer(0);
        let mut store = AnnotationStore::new();
        store.edit_run_text(&layer.runs()[0], "Receipt");

        // Same key, different run after a re-extraction
        let reordered = TextLayer::extract(
            0,
            ViewportState::new(1.0, 612.0, 792.0),
            &[RawTextRun {
                text: "Other".to_string(),
                doc_x: 300.0,
                doc_y: 100.0,
                font_size_pt: 12.0,
                font_name: String::new(),
                font_family_hint: None,
                ascent_ratio: None,
                descent_ratio: None,
                doc_width: 30.0,
                color: None,
            }],
        );
        assert!(store.edit_run_text(&reordered.runs()[0], "Oops").is_none());
        assert!(store.text_edit_for(&reordered.runs()[0]).is_none());
        assert_eq!(store.effective_text_edits().next().unwrap().new_text, "Receipt");
    }

    #[test]
    fn test_missing_ids_are_noops() {
        let mut store = AnnotationStore::new();
        assert!(store.move_annotation(42, 1.0, 1.0).is_none());
        assert!(store.edit_annotation_text(42, "x").is_none());
        assert!(store.resize_annotation_font(42, 10.0).is_none());
        assert!(store.remove_annotation(42).is_none());
        assert!(store.remove_stroke(42).is_none());
        assert!(store.move_image(42, 0.0, 0.0).is_none());
        assert!(store.resize_image(42, 10.0, 10.0, true).is_none());
        assert!(store.remove_image(42).is_none());
        assert!(store.resize_signature(300.0).is_none());
        assert!(store.clear_signature().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_annotation_crud() {
        let mut store = AnnotationStore::new();
        let action = store
            .add_text_annotation(0, 72.0, 700.0, "Draft", 14.0, Color::BLACK)
            .unwrap();
        let id = action.annotation_id().unwrap();

        assert!(store.move_annotation(id, 72.0, 700.0).is_none());
        assert!(store.move_annotation(id, 100.0, 650.0).is_some());
        assert!(store.edit_annotation_text(id, "Final").is_some());
        assert!(store.resize_annotation_font(id, 20.0).is_some());

        let annotation = store.annotation(id).unwrap();
        assert_eq!((annotation.doc_x, annotation.doc_y), (100.0, 650.0));
        assert_eq!(annotation.text, "Final");
        assert_eq!(annotation.font_size_pt, 20.0);

        store.select(Focus::Annotation(id));
        assert!(store.remove_annotation(id).is_some());
        assert_eq!(store.focus(), Focus::None);
        assert_eq!(store.annotations_on(0).count(), 0);
    }

    #[test]
    fn test_blank_annotation_is_rejected() {
        let mut store = AnnotationStore::new();
        assert!(store
            .add_text_annotation(0, 0.0, 0.0, "   ", 14.0, Color::BLACK)
            .is_none());
    }

    #[test]
    fn test_short_stroke_is_discarded() {
        let mut store = AnnotationStore::new();
        assert!(store
            .add_stroke(0, Color::BLACK, 2.0, vec![DocPoint::new(1.0, 1.0)])
            .is_none());
        let action = store
            .add_stroke(
                0,
                Color::BLACK,
                2.0,
                vec![DocPoint::new(1.0, 1.0), DocPoint::new(5.0, 9.0)],
            )
            .unwrap();
        assert_eq!(action.kind(), "AddStroke");
        let bounds = store.strokes()[0].bounds().unwrap();
        assert_eq!(bounds, PdfRect::new(0.0, 0.0, 6.0, 10.0));
    }

    #[test]
    fn test_image_resize_keeps_aspect_and_top_left() {
        let mut store = AnnotationStore::new();
        let id = store
            .add_image(0, PdfRect::new(100.0, 500.0, 200.0, 100.0), pixels(4, 2))
            .unwrap()
            .annotation_id()
            .unwrap();

        store.resize_image(id, 300.0, 0.0, true).unwrap();
        let rect = store.image(id).unwrap().rect();
        assert_eq!(rect, PdfRect::new(100.0, 450.0, 300.0, 150.0));

        store.resize_image(id, 300.0, 60.0, false).unwrap();
        let rect = store.image(id).unwrap().rect();
        assert_eq!(rect.top(), 600.0);
        assert_eq!(rect.height, 60.0);
    }

    #[test]
    fn test_signature_height_follows_width() {
        let mut store = AnnotationStore::new();
        // 250 x 100 pixels -> aspect 2.5
        store
            .place_signature(0, 0.1, 0.8, 200.0, pixels(250, 100))
            .unwrap();
        assert_eq!(store.signature().unwrap().height_pt(), 80.0);

        store.resize_signature(300.0).unwrap();
        let signature = store.signature().unwrap();
        assert_eq!(signature.width_pt, 300.0);
        assert_eq!(signature.height_pt(), 120.0);

        let rect = signature.doc_rect(612.0, 792.0);
        assert!((rect.top() - 792.0 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_focus_is_exclusive() {
        let layer = sample_layer(0);
        let mut store = AnnotationStore::new();
        let id = store
            .add_text_annotation(0, 72.0, 700.0, "Note", 14.0, Color::BLACK)
            .unwrap()
            .annotation_id()
            .unwrap();

        store.select(Focus::TextRun(layer.runs()[0].key));
        store.select(Focus::Annotation(id));
        assert_eq!(store.focus(), Focus::Annotation(id));

        store.select(Focus::Image(99));
        assert_eq!(store.focus(), Focus::None);
    }

    #[test]
    fn test_touched_pages() {
        let layer = sample_layer(1);
        let mut store = AnnotationStore::new();
        store.edit_run_text(&layer.runs()[0], "Receipt");
        store.add_text_annotation(4, 10.0, 10.0, "x", 12.0, Color::BLACK);
        store.place_signature(2, 0.5, 0.5, 100.0, pixels(2, 1));
        assert_eq!(
            store.touched_pages().into_iter().collect::<Vec<_>>(),
            vec![1, 2, 4]
        );
        store.clear();
        assert!(store.is_empty());
    }
}
