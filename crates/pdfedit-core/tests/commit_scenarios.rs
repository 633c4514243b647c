//! End-to-end commit scenarios driven through `EditorSession`

mod common;

use common::{build_form_pdf, build_pdf, init_tracing, page_content, run, FakeRasterizer};
use pdfedit_core::services::{DocumentService, FieldKind, FormField};
use pdfedit_core::{
    Color, EditorConfig, EditorError, EditorMode, EditorSession, LopdfService, RasterImage,
    RunKey, SignatureCapture,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn open(source: Vec<u8>, rasterizer: &FakeRasterizer) -> EditorSession {
    let mut session =
        EditorSession::open(source, rasterizer, 612.0, EditorConfig::default()).unwrap();
    session.request_render();
    session.render_current_page(rasterizer).unwrap();
    session
}

#[test]
fn invoice_becomes_receipt_on_page_two_only() {
    init_tracing();
    let source = build_pdf(&["Page one", "Invoice", "Page three"]);
    let rasterizer = FakeRasterizer::new(3).with_runs(1, vec![run("Invoice", 72.0, 700.0)]);
    let mut session = open(source.clone(), &rasterizer);

    session.go_to_page(1).unwrap();
    session.render_current_page(&rasterizer).unwrap().unwrap();
    let key = RunKey::new(1, 0);
    assert_eq!(session.text_layer().unwrap().run(key).unwrap().text, "Invoice");
    assert!(session.edit_run_text(key, "Receipt"));

    let out = session.commit(&LopdfService, &rasterizer, false).unwrap();
    assert!(!out.used_fallback);
    assert_eq!(out.pages_written, vec![1]);

    assert_eq!(page_content(&out.bytes, 1), page_content(&source, 1));
    assert_eq!(page_content(&out.bytes, 3), page_content(&source, 3));

    let page_two = page_content(&out.bytes, 2);
    assert!(page_two.contains("(Invoice) Tj"));
    assert!(page_two.contains("1 1 1 rg"));
    assert!(page_two.contains("1 0 0 1 72 700 Tm"));
    assert!(page_two.contains("<52656365697074> Tj"));
    // cover comes before the replacement text
    assert!(page_two.find(" re\nf").unwrap() < page_two.find("<52656365697074>").unwrap());
}

#[test]
fn zero_edits_return_original_bytes() {
    init_tracing();
    let source = build_pdf(&["Only page"]);
    let rasterizer = FakeRasterizer::new(1);
    let session = open(source.clone(), &rasterizer);
    let out = session.commit(&LopdfService, &rasterizer, false).unwrap();
    assert_eq!(out.bytes, source);
}

#[test]
fn reverting_text_drops_the_edit() {
    init_tracing();
    let source = build_pdf(&["Invoice"]);
    let rasterizer = FakeRasterizer::new(1).with_runs(0, vec![run("Invoice", 72.0, 700.0)]);
    let mut session = open(source.clone(), &rasterizer);

    let key = RunKey::new(0, 0);
    assert!(session.edit_run_text(key, "Receipt"));
    assert!(session.edit_run_text(key, "Invoice"));
    assert_eq!(session.action_count(), 2);
    assert!(session.store().effective_text_edits().next().is_none());

    let out = session.commit(&LopdfService, &rasterizer, false).unwrap();
    assert_eq!(out.bytes, source);
}

#[test]
fn signature_resize_keeps_aspect_and_lands_in_output() {
    init_tracing();
    let source = build_pdf(&["Sign here"]);
    let rasterizer = FakeRasterizer::new(1);
    let mut session = open(source, &rasterizer);

    let ink = RasterImage::from_rgba(5, 2, [0, 0, 0, 255].repeat(10)).unwrap();
    session.set_signature_capture(SignatureCapture::new(Arc::new(ink)));
    assert!(session.place_signature(0, 0.25, 0.25));
    let signature = session.store().signature().unwrap();
    assert_eq!((signature.width_pt, signature.height_pt()), (200.0, 80.0));

    assert!(session.resize_signature(300.0));
    assert_eq!(session.store().signature().unwrap().height_pt(), 120.0);

    let out = session.commit(&LopdfService, &rasterizer, false).unwrap();
    assert!(page_content(&out.bytes, 1).contains("300 0 0 120 153 474 cm"));
}

#[test]
fn drawn_stroke_is_one_action_and_one_image() {
    init_tracing();
    let source = build_pdf(&["Sketch"]);
    let rasterizer = FakeRasterizer::new(1);
    let mut session = open(source, &rasterizer);

    session.set_mode(EditorMode::Draw);
    session.pointer_down(100.0, 100.0);
    for i in 1..=30 {
        session.pointer_move(100.0 + i as f64 * 2.0, 100.0 + (i % 5) as f64);
    }
    assert!(session.pointer_up(160.0, 100.0));
    assert_eq!(session.action_count(), 1);

    let out = session.commit(&LopdfService, &rasterizer, false).unwrap();
    let doc = lopdf::Document::load_mem(&out.bytes).unwrap();
    let masked_images = doc
        .objects
        .values()
        .filter_map(|o| o.as_stream().ok())
        .filter(|s| s.dict.has(b"SMask"))
        .count();
    assert_eq!(masked_images, 1);
}

#[test]
fn unparseable_source_rebuilds_from_page_images() {
    init_tracing();
    let rasterizer = FakeRasterizer::new(2);
    let mut session = open(b"%PDF-1.4 truncated".to_vec(), &rasterizer);
    session
        .add_text_annotation(72.0, 720.0, "Reviewed", Some(18.0), Some(Color::rgb(200, 0, 0)))
        .unwrap();

    let out = session.commit(&LopdfService, &rasterizer, false).unwrap();
    assert!(out.used_fallback);
    let doc = lopdf::Document::load_mem(&out.bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
    assert!(page_content(&out.bytes, 1).contains("/PageImage Do"));
}

/// Delegates to lopdf but fails when writing the output
struct FailingSave(LopdfService);

impl DocumentService for FailingSave {
    type Doc = <LopdfService as DocumentService>::Doc;
    type Page = <LopdfService as DocumentService>::Page;
    type Font = <LopdfService as DocumentService>::Font;

    fn load_document(&self, bytes: &[u8]) -> Result<Self::Doc, EditorError> {
        self.0.load_document(bytes)
    }
    fn new_document(&self) -> Self::Doc {
        self.0.new_document()
    }
    fn page_count(&self, doc: &Self::Doc) -> u32 {
        self.0.page_count(doc)
    }
    fn page_size_pt(&self, doc: &Self::Doc, page: Self::Page) -> Result<(f64, f64), EditorError> {
        self.0.page_size_pt(doc, page)
    }
    fn get_page(&self, doc: &Self::Doc, page_index: u32) -> Result<Self::Page, EditorError> {
        self.0.get_page(doc, page_index)
    }
    fn add_image_page(
        &self,
        doc: &mut Self::Doc,
        image: &RasterImage,
        width_pt: f64,
        height_pt: f64,
    ) -> Result<Self::Page, EditorError> {
        self.0.add_image_page(doc, image, width_pt, height_pt)
    }
    fn embed_font(
        &self,
        doc: &mut Self::Doc,
        font: pdfedit_core::fonts::StandardFont,
    ) -> Result<Self::Font, EditorError> {
        self.0.embed_font(doc, font)
    }
    fn draw_rect(
        &self,
        doc: &mut Self::Doc,
        page: Self::Page,
        rect: pdfedit_core::PdfRect,
        color: Color,
    ) -> Result<(), EditorError> {
        self.0.draw_rect(doc, page, rect, color)
    }
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
    ) -> Result<(), EditorError> {
        self.0.draw_text(doc, page, text, x, y, font, size_pt, color)
    }
    fn draw_image(
        &self,
        doc: &mut Self::Doc,
        page: Self::Page,
        image: &RasterImage,
        rect: pdfedit_core::PdfRect,
    ) -> Result<(), EditorError> {
        self.0.draw_image(doc, page, image, rect)
    }
    fn list_fields(&self, doc: &Self::Doc) -> Result<Vec<FormField>, EditorError> {
        self.0.list_fields(doc)
    }
    fn set_field_value(
        &self,
        doc: &mut Self::Doc,
        name: &str,
        value: &str,
    ) -> Result<bool, EditorError> {
        self.0.set_field_value(doc, name, value)
    }
    fn flatten_form(&self, doc: &mut Self::Doc) -> Result<(), EditorError> {
        self.0.flatten_form(doc)
    }
    fn save(&self, _doc: Self::Doc) -> Result<Vec<u8>, EditorError> {
        Err(EditorError::OperationError("out of memory".to_string()))
    }
}

#[test]
fn failed_commit_keeps_edits_for_retry() {
    init_tracing();
    let source = build_pdf(&["Draft"]);
    let rasterizer = FakeRasterizer::new(1);
    let mut session = open(source, &rasterizer);
    session
        .add_text_annotation(72.0, 600.0, "Approved", None, None)
        .unwrap();

    let err = session
        .commit(&FailingSave(LopdfService), &rasterizer, false)
        .unwrap_err();
    assert!(matches!(err, EditorError::CommitError(ref msg) if msg.contains("out of memory")));
    assert_eq!(session.action_count(), 1);

    let out = session.commit(&LopdfService, &rasterizer, false).unwrap();
    assert_eq!(out.pages_written, vec![0]);
}

#[test]
fn form_values_are_applied_and_optionally_flattened() {
    init_tracing();
    let source = build_form_pdf();
    let rasterizer = FakeRasterizer::new(1);
    let mut session = open(source, &rasterizer);
    session.set_field_value("name", "Grace Hopper");
    assert!(session.has_changes());

    let service = LopdfService::new();
    let out = session.commit(&service, &rasterizer, false).unwrap();
    let fields = service
        .list_fields(&service.load_document(&out.bytes).unwrap())
        .unwrap();
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].kind, FieldKind::Text);
    assert_eq!(fields[0].value.as_deref(), Some("Grace Hopper"));

    let flattened = session.commit(&service, &rasterizer, true).unwrap();
    let fields = service
        .list_fields(&service.load_document(&flattened.bytes).unwrap())
        .unwrap();
    assert!(fields.is_empty());
    assert!(page_content(&flattened.bytes, 1).contains(" Do"));
}
