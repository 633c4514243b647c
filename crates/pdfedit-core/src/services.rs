//! Collaborators the engine consumes
//!
//! Both services are constructed once per session and passed in by
//! reference. Tests substitute fakes.

use crate::annotations::{Color, PdfRect};
use crate::bitmap::RasterImage;
use crate::error::EditorError;
use crate::fonts::StandardFont;
use crate::text_layer::RawTextRun;
use serde::{Deserialize, Serialize};

/// Text content delivered alongside a page bitmap
#[derive(Debug, Clone, PartialEq)]
pub enum TextContent {
    Runs(Vec<RawTextRun>),
    /// The page rendered but its text could not be extracted
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub bitmap: RasterImage,
    pub text: TextContent,
}

/// Turns pages into bitmaps and text runs
pub trait PageRasterizer {
    fn page_count(&self) -> u32;

    /// Page size in points, `(width, height)`
    fn page_size_pt(&self, page_index: u32) -> Result<(f64, f64), EditorError>;

    /// Render at `scale` pixels per point
    fn render(&self, page_index: u32, scale: f64) -> Result<RenderedPage, EditorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Checkbox,
    Radio,
    Choice,
    Signature,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Fully qualified name, parts joined with `.`
    pub name: String,
    pub kind: FieldKind,
    pub value: Option<String>,
    #[serde(default)]
    pub page_index: Option<u32>,
}

/// Low-level document mutation primitives
///
/// Coordinates are in document space. Drawing is buffered per page and
/// written out by [`DocumentService::save`].
pub trait DocumentService {
    type Doc;
    type Page: Copy;
    type Font: Copy;

    /// Open bytes for incremental editing. Unsupported input is a `ParseError`.
    fn load_document(&self, bytes: &[u8]) -> Result<Self::Doc, EditorError>;
    fn new_document(&self) -> Self::Doc;
    fn page_count(&self, doc: &Self::Doc) -> u32;
    fn page_size_pt(&self, doc: &Self::Doc, page: Self::Page) -> Result<(f64, f64), EditorError>;
    fn get_page(&self, doc: &Self::Doc, page_index: u32) -> Result<Self::Page, EditorError>;
    /// Append a page whose only content is `image` stretched over `width_pt` x `height_pt`
    fn add_image_page(
        &self,
        doc: &mut Self::Doc,
        image: &RasterImage,
        width_pt: f64,
        height_pt: f64,
    ) -> Result<Self::Page, EditorError>;
    fn embed_font(&self, doc: &mut Self::Doc, font: StandardFont)
        -> Result<Self::Font, EditorError>;
    fn draw_rect(
        &self,
        doc: &mut Self::Doc,
        page: Self::Page,
        rect: PdfRect,
        color: Color,
    ) -> Result<(), EditorError>;
    /// Draw `text` with its baseline starting at `(x, y)`
    #[allow(clippy::too_many_arguments)]
    fn draw_text(
        &self,
        doc: &mut Self::Doc,
        page: Self::Page,
        text: &str,
        x: f64,
        y: f64,
        font: Self::Font,
        size_pt: f64,
        color: Color,
    ) -> Result<(), EditorError>;
    fn draw_image(
        &self,
        doc: &mut Self::Doc,
        page: Self::Page,
        image: &RasterImage,
        rect: PdfRect,
    ) -> Result<(), EditorError>;
    fn list_fields(&self, doc: &Self::Doc) -> Result<Vec<FormField>, EditorError>;
    /// Returns `false` when no field has that name
    fn set_field_value(
        &self,
        doc: &mut Self::Doc,
        name: &str,
        value: &str,
    ) -> Result<bool, EditorError>;
    /// Bake widget appearances into page content and drop the form
    fn flatten_form(&self, doc: &mut Self::Doc) -> Result<(), EditorError>;
    fn save(&self, doc: Self::Doc) -> Result<Vec<u8>, EditorError>;
}
