//! Document checks and summary info shown before a session starts

use lopdf::Document;
use pdfedit_core::services::DocumentService;
use pdfedit_core::LopdfService;
use serde::Serialize;

/// Summary of a PDF as the editor sees it
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub page_count: u32,
    /// `[width, height]` in points per page; empty when the document is not editable
    pub page_sizes: Vec<[f64; 2]>,
    /// PDF version string (e.g., "1.7")
    pub version: String,
    pub encrypted: bool,
    pub size_bytes: usize,
    /// Whether edits can be written into the original structure. When false,
    /// commit rebuilds the document from page images.
    pub editable: bool,
    pub form_field_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Parse `bytes` and summarize the document
pub fn describe_document(bytes: &[u8]) -> Result<DocumentInfo, String> {
    quick_header_check(bytes)?;
    let version = extract_version(bytes);

    let document = Document::load_mem(bytes).map_err(|e| format!("Failed to parse PDF: {}", e))?;
    let page_count = document.get_pages().len() as u32;
    if page_count == 0 {
        return Err("PDF has no pages".to_string());
    }
    let (title, author) = extract_metadata(&document);

    let mut info = DocumentInfo {
        page_count,
        version,
        encrypted: document.is_encrypted(),
        size_bytes: bytes.len(),
        title,
        author,
        ..DocumentInfo::default()
    };

    let service = LopdfService::new();
    if let Ok(doc) = service.load_document(bytes) {
        info.editable = true;
        info.page_sizes = (0..service.page_count(&doc))
            .filter_map(|index| {
                let page = service.get_page(&doc, index).ok()?;
                service.page_size_pt(&doc, page).ok()
            })
            .map(|(width, height)| [width, height])
            .collect();
        info.form_field_count = service.list_fields(&doc).map(|f| f.len()).unwrap_or(0);
    }
    Ok(info)
}

fn quick_header_check(bytes: &[u8]) -> Result<(), String> {
    if bytes.len() < 8 {
        return Err("File too small to be a valid PDF".to_string());
    }
    if !bytes.starts_with(b"%PDF-") {
        return Err("Not a valid PDF file (missing %PDF- header)".to_string());
    }
    Ok(())
}

/// Header format: %PDF-1.7
fn extract_version(bytes: &[u8]) -> String {
    std::str::from_utf8(&bytes[5..8])
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|_| "1.4".to_string())
}

fn extract_metadata(document: &Document) -> (Option<String>, Option<String>) {
    let info = document
        .trailer
        .get(b"Info")
        .and_then(|o| o.as_reference())
        .and_then(|id| document.get_dictionary(id));
    let Ok(info) = info else {
        return (None, None);
    };
    let read = |key: &[u8]| {
        info.get(key)
            .and_then(|o| o.as_str())
            .ok()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .filter(|s| !s.is_empty())
    };
    (read(b"Title"), read(b"Author"))
}

/// Cheap structural check without parsing
pub fn quick_validate(bytes: &[u8]) -> Result<(), String> {
    quick_header_check(bytes)?;

    let tail = if bytes.len() > 1024 {
        &bytes[bytes.len() - 1024..]
    } else {
        bytes
    };
    if !tail.windows(5).any(|w| w == b"%%EOF") {
        return Err("PDF appears truncated (missing %%EOF marker)".to_string());
    }
    Ok(())
}
