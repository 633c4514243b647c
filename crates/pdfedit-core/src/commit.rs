//! Compile accumulated edits into a new document
//!
//! The pipeline walks touched pages in ascending order and draws, per page:
//! cover rectangles with replacement text, text annotations, one stroke
//! overlay, image annotations and finally the signature. Pages without edits
//! are never rewritten.

use std::collections::{BTreeMap, BTreeSet};

use crate::annotations::{
    AnnotationStore, Color, DrawStroke, ImageAnnotation, SignaturePlacement, TextAnnotation,
    TextEdit,
};
use crate::config::EditorConfig;
use crate::error::EditorError;
use crate::fonts::StandardFont;
use crate::raster::rasterize_strokes;
use crate::services::{DocumentService, PageRasterizer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Everything drawn onto one page
#[derive(Debug, Default)]
pub struct PageChanges<'a> {
    pub text_edits: Vec<&'a TextEdit>,
    pub annotations: Vec<&'a TextAnnotation>,
    pub strokes: Vec<&'a DrawStroke>,
    pub images: Vec<&'a ImageAnnotation>,
    pub signature: Option<&'a SignaturePlacement>,
}

/// Effective edits grouped by page
#[derive(Debug, Default)]
pub struct ChangeSet<'a> {
    pages: BTreeMap<u32, PageChanges<'a>>,
}

impl<'a> ChangeSet<'a> {
    /// Gather every effective edit in `store`. No-op text edits are left out.
    pub fn collect(store: &'a AnnotationStore) -> Self {
        let mut pages: BTreeMap<u32, PageChanges<'a>> = BTreeMap::new();
        for edit in store.effective_text_edits() {
            pages.entry(edit.key.page_index).or_default().text_edits.push(edit);
        }
        for annotation in store.annotations() {
            pages.entry(annotation.page_index).or_default().annotations.push(annotation);
        }
        for stroke in store.strokes() {
            pages.entry(stroke.page_index).or_default().strokes.push(stroke);
        }
        for image in store.images() {
            pages.entry(image.page_index).or_default().images.push(image);
        }
        if let Some(signature) = store.signature() {
            pages.entry(signature.page_index).or_default().signature = Some(signature);
        }
        Self { pages }
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page_indices(&self) -> BTreeSet<u32> {
        self.pages.keys().copied().collect()
    }

    pub fn page(&self, page_index: u32) -> Option<&PageChanges<'a>> {
        self.pages.get(&page_index)
    }

    pub fn pages(&self) -> impl Iterator<Item = (u32, &PageChanges<'a>)> {
        self.pages.iter().map(|(index, changes)| (*index, changes))
    }

    pub fn text_edit_count(&self) -> usize {
        self.pages.values().map(|p| p.text_edits.len()).sum()
    }
}

/// Form work requested alongside the visual edits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOptions {
    #[serde(default)]
    pub flatten_form: bool,
    #[serde(default)]
    pub field_values: BTreeMap<String, String>,
}

impl CommitOptions {
    fn has_form_work(&self) -> bool {
        self.flatten_form || !self.field_values.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CommitOutput {
    pub bytes: Vec<u8>,
    /// The source could not be edited in place and was rebuilt from page images
    pub used_fallback: bool,
    /// Pages that received new content, 0-based
    pub pages_written: Vec<u32>,
}

pub struct CommitPipeline<'s, S, R> {
    service: &'s S,
    rasterizer: &'s R,
    config: &'s EditorConfig,
}

impl<'s, S, R> CommitPipeline<'s, S, R>
where
    S: DocumentService,
    R: PageRasterizer,
{
    pub fn new(service: &'s S, rasterizer: &'s R, config: &'s EditorConfig) -> Self {
        Self {
            service,
            rasterizer,
            config,
        }
    }

    /// Produce the final bytes. On failure nothing is returned and `store` is untouched.
    pub fn commit(
        &self,
        source: &[u8],
        store: &AnnotationStore,
        options: &CommitOptions,
    ) -> Result<CommitOutput, EditorError> {
        let changes = ChangeSet::collect(store);
        if changes.is_empty() && !options.has_form_work() {
            info!("no changes to commit, returning source bytes");
            return Ok(CommitOutput {
                bytes: source.to_vec(),
                used_fallback: false,
                pages_written: Vec::new(),
            });
        }

        self.build(source, &changes, options)
            .map_err(EditorError::into_commit_error)
    }

    fn build(
        &self,
        source: &[u8],
        changes: &ChangeSet<'_>,
        options: &CommitOptions,
    ) -> Result<CommitOutput, EditorError> {
        let (mut doc, used_fallback) = match self.service.load_document(source) {
            Ok(doc) => (doc, false),
            Err(e) if e.is_parse_error() => {
                warn!(error = %e, "source not editable in place, rebuilding from page images");
                (self.rebuild_from_raster()?, true)
            }
            Err(e) => return Err(e),
        };

        let mut pages_written = Vec::new();
        for (page_index, page_changes) in changes.pages() {
            self.write_page(&mut doc, page_index, page_changes)?;
            pages_written.push(page_index);
        }

        for (name, value) in &options.field_values {
            if !self.service.set_field_value(&mut doc, name, value)? {
                warn!(field = %name, "skipping value for unknown form field");
            }
        }
        if options.flatten_form {
            self.service.flatten_form(&mut doc)?;
        }

        let bytes = self.service.save(doc)?;
        info!(
            pages = pages_written.len(),
            text_edits = changes.text_edit_count(),
            used_fallback,
            bytes = bytes.len(),
            "commit finished"
        );
        Ok(CommitOutput {
            bytes,
            used_fallback,
            pages_written,
        })
    }

    /// One image page per source page, rendered at the output resolution.
    /// Each page bitmap is released before the next is rendered.
    fn rebuild_from_raster(&self) -> Result<S::Doc, EditorError> {
        let scale = self.config.output_scale();
        let mut doc = self.service.new_document();
        for page_index in 0..self.rasterizer.page_count() {
            let (width_pt, height_pt) = self.rasterizer.page_size_pt(page_index)?;
            let rendered = self.rasterizer.render(page_index, scale)?;
            self.service
                .add_image_page(&mut doc, &rendered.bitmap, width_pt, height_pt)?;
            debug!(page_index, "rasterized page for fallback");
        }
        Ok(doc)
    }

    fn write_page(
        &self,
        doc: &mut S::Doc,
        page_index: u32,
        changes: &PageChanges<'_>,
    ) -> Result<(), EditorError> {
        let page = self.service.get_page(doc, page_index)?;
        let (page_width_pt, page_height_pt) = self.service.page_size_pt(doc, page)?;

        for edit in &changes.text_edits {
            self.service.draw_rect(
                doc,
                page,
                edit.cover_rect(self.config.cover_padding_pt),
                Color::WHITE,
            )?;
            if edit.new_text.is_empty() {
                continue;
            }
            let font = self.service.embed_font(doc, edit.original.standard_font())?;
            self.service.draw_text(
                doc,
                page,
                &edit.new_text,
                edit.original.doc_x,
                edit.original.doc_y,
                font,
                edit.font_size_pt(),
                edit.color(),
            )?;
        }

        if !changes.annotations.is_empty() {
            let font = self.service.embed_font(doc, StandardFont::Helvetica)?;
            for annotation in &changes.annotations {
                self.service.draw_text(
                    doc,
                    page,
                    &annotation.text,
                    annotation.doc_x,
                    annotation.doc_y,
                    font,
                    annotation.font_size_pt,
                    annotation.color,
                )?;
            }
        }

        if let Some(overlay) = rasterize_strokes(&changes.strokes, self.config.output_scale())? {
            self.service.draw_image(doc, page, &overlay.image, overlay.rect)?;
        }

        for image in &changes.images {
            self.service.draw_image(doc, page, &image.pixels, image.rect())?;
        }

        if let Some(signature) = changes.signature {
            let rect = signature.doc_rect(page_width_pt, page_height_pt);
            self.service.draw_image(doc, page, &signature.pixels, rect)?;
        }

        debug!(
            page_index,
            text_edits = changes.text_edits.len(),
            annotations = changes.annotations.len(),
            strokes = changes.strokes.len(),
            images = changes.images.len(),
            signature = changes.signature.is_some(),
            "wrote page"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::tests::{pixels, sample_layer};
    use crate::annotations::{DocPoint, PdfRect};
    use crate::bitmap::RasterImage;
    use crate::lopdf_backend::tests::create_test_pdf;
    use crate::lopdf_backend::LopdfService;
    use crate::services::{RenderedPage, TextContent};
    use lopdf::Document;
    use pretty_assertions::assert_eq;

    struct BlankRasterizer {
        pages: u32,
    }

    impl PageRasterizer for BlankRasterizer {
        fn page_count(&self) -> u32 {
            self.pages
        }

        fn page_size_pt(&self, _page_index: u32) -> Result<(f64, f64), EditorError> {
            Ok((612.0, 792.0))
        }

        fn render(&self, _page_index: u32, scale: f64) -> Result<RenderedPage, EditorError> {
            let (w, h) = ((612.0 * scale) as u32, (792.0 * scale) as u32);
            Ok(RenderedPage {
                bitmap: RasterImage::new(w.max(1), h.max(1))?,
                text: TextContent::Runs(Vec::new()),
            })
        }
    }

    fn small_config() -> EditorConfig {
        EditorConfig {
            output_dpi: 18.0,
            ..EditorConfig::default()
        }
    }

    #[test]
    fn test_change_set_groups_by_page() {
        let mut store = AnnotationStore::new();
        let layer = sample_layer(1);
        store.edit_run_text(&layer.runs()[0], "Receipt").unwrap();
        assert!(store.edit_run_text(&layer.runs()[1], "Total").is_none());
        store
            .add_text_annotation(2, 100.0, 100.0, "Draft", 14.0, Color::BLACK)
            .unwrap();
        store
            .add_stroke(
                2,
                Color::BLACK,
                2.0,
                vec![DocPoint::new(0.0, 0.0), DocPoint::new(10.0, 10.0)],
            )
            .unwrap();

        let changes = ChangeSet::collect(&store);
        assert_eq!(changes.page_indices(), BTreeSet::from([1, 2]));
        assert_eq!(changes.text_edit_count(), 1);
        assert_eq!(changes.page(2).unwrap().strokes.len(), 1);
    }

    #[test]
    fn test_empty_store_returns_source_verbatim() {
        let source = create_test_pdf(2);
        let config = EditorConfig::default();
        let rasterizer = BlankRasterizer { pages: 2 };
        let pipeline = CommitPipeline::new(&LopdfService, &rasterizer, &config);
        let out = pipeline
            .commit(&source, &AnnotationStore::new(), &CommitOptions::default())
            .unwrap();
        assert_eq!(out.bytes, source);
        assert!(out.pages_written.is_empty());
    }

    #[test]
    fn test_only_touched_pages_are_written() {
        let source = create_test_pdf(3);
        let mut store = AnnotationStore::new();
        store
            .add_image(1, PdfRect::new(100.0, 100.0, 50.0, 50.0), pixels(4, 4))
            .unwrap();

        let config = small_config();
        let rasterizer = BlankRasterizer { pages: 3 };
        let out = CommitPipeline::new(&LopdfService, &rasterizer, &config)
            .commit(&source, &store, &CommitOptions::default())
            .unwrap();
        assert_eq!(out.pages_written, vec![1]);
        assert!(!out.used_fallback);

        let doc = Document::load_mem(&out.bytes).unwrap();
        let pages = doc.get_pages();
        let content = |n: u32| {
            String::from_utf8_lossy(&doc.get_page_content(pages[&n]).unwrap()).into_owned()
        };
        assert_eq!(content(1), "BT /F1 12 Tf 72 700 Td (Page-1) Tj ET");
        assert!(content(2).contains(" Do"));
        assert_eq!(content(3), "BT /F1 12 Tf 72 700 Td (Page-3) Tj ET");
    }

    #[test]
    fn test_unparseable_source_falls_back_to_images() {
        let mut store = AnnotationStore::new();
        store
            .add_text_annotation(0, 72.0, 72.0, "Approved", 18.0, Color::BLACK)
            .unwrap();

        let config = small_config();
        let rasterizer = BlankRasterizer { pages: 2 };
        let out = CommitPipeline::new(&LopdfService, &rasterizer, &config)
            .commit(b"not a pdf", &store, &CommitOptions::default())
            .unwrap();
        assert!(out.used_fallback);
        let doc = Document::load_mem(&out.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_missing_page_is_commit_error() {
        let source = create_test_pdf(1);
        let mut store = AnnotationStore::new();
        store
            .add_text_annotation(5, 72.0, 72.0, "Late", 12.0, Color::BLACK)
            .unwrap();

        let config = EditorConfig::default();
        let rasterizer = BlankRasterizer { pages: 1 };
        let err = CommitPipeline::new(&LopdfService, &rasterizer, &config)
            .commit(&source, &store, &CommitOptions::default())
            .unwrap_err();
        assert!(matches!(err, EditorError::CommitError(_)));
        assert_eq!(store.annotations().len(), 1);
    }
}
