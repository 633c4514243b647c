//! Interactive PDF annotation and editing engine
//!
//! Keeps a mutable edit model (text replacements, text annotations, freehand
//! strokes, images and one signature) layered over an immutable source
//! document, previews it over a rasterized page at any zoom, and compiles the
//! accumulated edits into new document bytes on commit.
//!
//! The host supplies a [`PageRasterizer`] for page bitmaps and text runs; the
//! bundled [`LopdfService`] is the [`DocumentService`] used for output.

pub mod annotations;
pub mod bitmap;
pub mod commit;
pub mod config;
pub mod coords;
pub mod error;
pub mod fonts;
pub mod history;
pub mod input;
pub mod lopdf_backend;
pub mod operations;
pub mod overlay;
pub mod raster;
pub mod render_queue;
pub mod services;
pub mod session;
pub mod text_layer;

pub use annotations::{AnnotationId, AnnotationStore, Color, DocPoint, Focus, PdfRect};
pub use bitmap::RasterImage;
pub use commit::{ChangeSet, CommitOptions, CommitOutput, CommitPipeline};
pub use config::EditorConfig;
pub use coords::ViewportState;
pub use error::EditorError;
pub use history::HistoryManager;
pub use input::{SignatureCapture, SignaturePad};
pub use lopdf_backend::LopdfService;
pub use operations::EditAction;
pub use overlay::{DisplayList, OverlayCommand, OverlaySurface};
pub use render_queue::RenderTicket;
pub use services::{DocumentService, PageRasterizer, RenderedPage, TextContent};
pub use session::{EditorMode, EditorSession};
pub use text_layer::{RawTextRun, RunKey, TextLayer};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, EditorError> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| EditorError::ParseError(e.to_string()))?;
    Ok(doc.get_pages().len() as u32)
}

/// Page sizes in points, `(width, height)` per page in order
pub fn get_page_sizes(bytes: &[u8]) -> Result<Vec<(f64, f64)>, EditorError> {
    let service = LopdfService::new();
    let doc = service.load_document(bytes)?;
    (0..service.page_count(&doc))
        .map(|index| {
            let page = service.get_page(&doc, index)?;
            service.page_size_pt(&doc, page)
        })
        .collect()
}
