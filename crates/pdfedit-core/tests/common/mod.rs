//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Once;

use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use pdfedit_core::services::{PageRasterizer, RenderedPage, TextContent};
use pdfedit_core::{EditorError, RasterImage, RawTextRun};

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pdfedit_core=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Letter-size PDF whose page N shows `texts[N]` at (72, 700) in Helvetica 12
pub fn build_pdf(texts: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for text in texts {
        let content = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", text);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => texts.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// One-page PDF with a single text field called `name`
pub fn build_form_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();
    let field_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => Object::string_literal("name"),
        "Rect" => vec![100.into(), 600.into(), 300.into(), 620.into()],
        "P" => Object::Reference(page_id),
    });
    let content_id = doc.add_object(Stream::new(Dictionary::new(), b"BT ET".to_vec()));
    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => Object::Reference(content_id),
            "Annots" => vec![Object::Reference(field_id)],
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let form_id = doc.add_object(dictionary! {
        "Fields" => vec![Object::Reference(field_id)],
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
        "AcroForm" => Object::Reference(form_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Decoded content of page `page_num` (1-based)
pub fn page_content(bytes: &[u8], page_num: u32) -> String {
    let doc = Document::load_mem(bytes).unwrap();
    let page_id = doc.get_pages()[&page_num];
    String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
}

pub fn run(text: &str, x: f64, y: f64) -> RawTextRun {
    RawTextRun {
        text: text.to_string(),
        doc_x: x,
        doc_y: y,
        font_size_pt: 12.0,
        font_name: "ABCDEF+Helvetica".to_string(),
        font_family_hint: None,
        ascent_ratio: None,
        descent_ratio: None,
        doc_width: text.len() as f64 * 6.5,
        color: None,
    }
}

/// Rasterizer stand-in: blank letter pages with canned text runs
pub struct FakeRasterizer {
    pub pages: u32,
    pub runs: HashMap<u32, Vec<RawTextRun>>,
}

impl FakeRasterizer {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            runs: HashMap::new(),
        }
    }

    pub fn with_runs(mut self, page_index: u32, runs: Vec<RawTextRun>) -> Self {
        self.runs.insert(page_index, runs);
        self
    }
}

impl PageRasterizer for FakeRasterizer {
    fn page_count(&self) -> u32 {
        self.pages
    }

    fn page_size_pt(&self, page_index: u32) -> Result<(f64, f64), EditorError> {
        if page_index >= self.pages {
            return Err(EditorError::OperationError(format!("no page {}", page_index)));
        }
        Ok((612.0, 792.0))
    }

    fn render(&self, page_index: u32, scale: f64) -> Result<RenderedPage, EditorError> {
        let (width, height) = self.page_size_pt(page_index)?;
        let bitmap = RasterImage::from_rgba(
            (width * scale).ceil() as u32,
            (height * scale).ceil() as u32,
            vec![255; ((width * scale).ceil() * (height * scale).ceil()) as usize * 4],
        )?;
        Ok(RenderedPage {
            bitmap,
            text: TextContent::Runs(self.runs.get(&page_index).cloned().unwrap_or_default()),
        })
    }
}
