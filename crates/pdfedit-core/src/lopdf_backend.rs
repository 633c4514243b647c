//! [`DocumentService`] implemented over lopdf
//!
//! Drawing calls append to a per-page buffer. On save each touched page gets
//! its original content wrapped in `q … Q` followed by one new stream, and
//! the resources it needs are merged into a page-local copy of its resource
//! dictionary. Untouched pages are left exactly as loaded.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::io::Write as _;

use crate::annotations::{Color, PdfRect};
use crate::bitmap::RasterImage;
use crate::error::EditorError;
use crate::fonts::StandardFont;
use crate::services::{DocumentService, FieldKind, FormField};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lazy_static::lazy_static;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use regex::Regex;
use tracing::{debug, warn};

lazy_static! {
    /// Font size in a default appearance string, e.g. `/Helv 12 Tf 0 g`
    static ref DA_FONT_SIZE_RE: Regex = Regex::new(r"/\S+\s+([\d.]+)\s+Tf").unwrap();
}

/// Radio flag in a button field's `Ff`
const FF_RADIO: i64 = 1 << 15;
/// Hidden flag in an annotation's `F`
const ANNOT_HIDDEN: i64 = 1 << 1;
const FIELD_NAME_SEPARATOR: char = '.';

/// Engine coordinates are relative to the MediaBox lower-left corner;
/// `origin` is that corner in the page's user space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LopdfPage {
    pub index: u32,
    pub id: ObjectId,
    pub origin: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LopdfFont {
    pub font: StandardFont,
    pub id: ObjectId,
}

#[derive(Debug, Default)]
struct PageBuffer {
    ops: String,
    fonts: BTreeMap<String, ObjectId>,
    xobjects: BTreeMap<String, ObjectId>,
}

/// A loaded document plus drawing that has not been written yet
pub struct LopdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
    pending: BTreeMap<ObjectId, PageBuffer>,
    fonts: HashMap<StandardFont, ObjectId>,
    next_xobject: u32,
}

impl LopdfDocument {
    fn new(doc: Document) -> Self {
        let pages = doc.get_pages().into_values().collect();
        Self {
            doc,
            pages,
            pending: BTreeMap::new(),
            fonts: HashMap::new(),
            next_xobject: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn buffer(&mut self, page: LopdfPage) -> &mut PageBuffer {
        self.pending.entry(page.id).or_default()
    }

    fn next_xobject_name(&mut self, prefix: &str) -> String {
        self.next_xobject += 1;
        format!("PE{}{}", prefix, self.next_xobject)
    }

    fn pages_root(&self) -> Result<ObjectId, EditorError> {
        self.doc
            .catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .and_then(|pages| pages.as_reference())
            .map_err(|e| EditorError::OperationError(format!("missing page tree: {}", e)))
    }
}

/// lopdf-backed document service. Stateless; all state lives in [`LopdfDocument`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfService;

impl LopdfService {
    pub fn new() -> Self {
        Self
    }
}

fn op_err(e: impl std::fmt::Display) -> EditorError {
    EditorError::OperationError(e.to_string())
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    resolve(doc, obj).as_dict().ok()
}

/// Look up `key` on a page, following `Parent` links for inheritable entries
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..64 {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Lower-left corner of the page's MediaBox, `(0, 0)` when missing
fn media_origin(doc: &Document, page_id: ObjectId) -> (f64, f64) {
    inherited(doc, page_id, b"MediaBox")
        .and_then(|mb| rect_from(doc, mb))
        .map(|mb| (mb[0], mb[1]))
        .unwrap_or((0.0, 0.0))
}

fn rect_from(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let arr = resolve(doc, obj).as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(arr) {
        *slot = number(resolve(doc, item))?;
    }
    Some([
        out[0].min(out[2]),
        out[1].min(out[3]),
        out[0].max(out[2]),
        out[1].max(out[3]),
    ])
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

fn deflate(bytes: &[u8]) -> Result<Vec<u8>, EditorError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(op_err)?;
    encoder.finish().map_err(op_err)
}

fn flate_stream(mut dict: Dictionary, content: &[u8]) -> Result<Stream, EditorError> {
    let compressed = deflate(content)?;
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    Ok(Stream::new(dict, compressed))
}

/// Encode text for a simple font with WinAnsiEncoding. Unmappable characters become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => match c {
                '€' => 0x80,
                '‚' => 0x82,
                '„' => 0x84,
                '…' => 0x85,
                '‘' => 0x91,
                '’' => 0x92,
                '“' => 0x93,
                '”' => 0x94,
                '•' => 0x95,
                '–' => 0x96,
                '—' => 0x97,
                '™' => 0x99,
                _ => b'?',
            },
        })
        .collect()
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 2);
    out.push('<');
    for b in bytes {
        let _ = write!(out, "{:02X}", b);
    }
    out.push('>');
    out
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise single-byte)
fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

fn encode_text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn color_op(color: Color, fill: bool) -> String {
    let (r, g, b) = color.to_pdf_rgb();
    format!("{} {} {} {}", r, g, b, if fill { "rg" } else { "RG" })
}

/// Add an image XObject (Flate RGB, plus a soft mask when it has transparency)
fn add_image_xobject(doc: &mut Document, image: &RasterImage) -> Result<ObjectId, EditorError> {
    let (rgb, alpha) = image.split_alpha();
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => image.width() as i64,
        "Height" => image.height() as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
    };
    if let Some(alpha) = alpha {
        let mask = flate_stream(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width() as i64,
                "Height" => image.height() as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            &alpha,
        )?;
        let mask_id = doc.add_object(mask);
        dict.set("SMask", Object::Reference(mask_id));
    }
    let stream = flate_stream(dict, &rgb)?;
    Ok(doc.add_object(stream))
}

/// Effective resources of a page as an owned dictionary with sub-dictionaries resolved
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut resources = inherited(doc, page_id, b"Resources")
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    for key in [b"Font".as_slice(), b"XObject".as_slice()] {
        if let Ok(obj) = resources.get(key) {
            let resolved = resolve_dict(doc, obj).cloned();
            if let Some(dict) = resolved {
                resources.set(key.to_vec(), Object::Dictionary(dict));
            }
        }
    }
    resources
}

fn merge_resource(
    resources: &mut Dictionary,
    category: &[u8],
    entries: &BTreeMap<String, ObjectId>,
) {
    if entries.is_empty() {
        return;
    }
    let mut dict = resources
        .get(category)
        .ok()
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    for (name, id) in entries {
        dict.set(name.as_bytes().to_vec(), Object::Reference(*id));
    }
    resources.set(category.to_vec(), Object::Dictionary(dict));
}

/// Write one page's buffered drawing into the document
fn flush_page(
    doc: &mut Document,
    page_id: ObjectId,
    buffer: PageBuffer,
) -> Result<(), EditorError> {
    let mut resources = effective_resources(doc, page_id);
    merge_resource(&mut resources, b"Font", &buffer.fonts);
    merge_resource(&mut resources, b"XObject", &buffer.xobjects);

    let page = doc.get_dictionary(page_id).map_err(op_err)?;
    let existing: Vec<Object> = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let prefix_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let body = format!("\nQ\n{}", buffer.ops);
    let body_id = doc.add_object(flate_stream(Dictionary::new(), body.as_bytes())?);

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(prefix_id));
    contents.extend(existing);
    contents.push(Object::Reference(body_id));

    let page = doc.get_dictionary_mut(page_id).map_err(op_err)?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Array(contents));
    Ok(())
}

// ============ Form fields ============

#[derive(Debug, Clone)]
struct FieldNode {
    id: ObjectId,
    name: String,
    field_type: Option<Vec<u8>>,
    flags: i64,
    widgets: Vec<ObjectId>,
}

fn acroform_fields(doc: &Document) -> Vec<ObjectId> {
    let Ok(catalog) = doc.catalog() else {
        return Vec::new();
    };
    let Some(form) = catalog.get(b"AcroForm").ok().and_then(|f| resolve_dict(doc, f)) else {
        return Vec::new();
    };
    form.get(b"Fields")
        .ok()
        .and_then(|f| resolve(doc, f).as_array().ok())
        .map(|fields| fields.iter().filter_map(|f| f.as_reference().ok()).collect())
        .unwrap_or_default()
}

fn collect_fields(
    doc: &Document,
    id: ObjectId,
    parent_name: &str,
    inherited_type: Option<Vec<u8>>,
    inherited_flags: i64,
    depth: usize,
    out: &mut Vec<FieldNode>,
) {
    if depth > 32 {
        return;
    }
    let Ok(dict) = doc.get_dictionary(id) else {
        return;
    };
    let partial = dict
        .get(b"T")
        .ok()
        .and_then(|t| t.as_str().ok())
        .map(decode_text_string);
    let name = match (&partial, parent_name.is_empty()) {
        (Some(p), true) => p.clone(),
        (Some(p), false) => format!("{}{}{}", parent_name, FIELD_NAME_SEPARATOR, p),
        (None, _) => parent_name.to_string(),
    };
    let field_type = dict
        .get(b"FT")
        .ok()
        .and_then(|ft| ft.as_name().ok())
        .map(|ft| ft.to_vec())
        .or(inherited_type);
    let flags = dict
        .get(b"Ff")
        .ok()
        .and_then(|ff| ff.as_i64().ok())
        .unwrap_or(inherited_flags);

    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|k| resolve(doc, k).as_array().ok())
        .map(|kids| kids.iter().filter_map(|k| k.as_reference().ok()).collect())
        .unwrap_or_default();
    let kids_are_fields = kids.iter().any(|kid| {
        doc.get_dictionary(*kid)
            .map(|d| d.has(b"T"))
            .unwrap_or(false)
    });

    if kids_are_fields {
        for kid in kids {
            collect_fields(doc, kid, &name, field_type.clone(), flags, depth + 1, out);
        }
        return;
    }

    let widgets = if kids.is_empty() { vec![id] } else { kids };
    out.push(FieldNode {
        id,
        name,
        field_type,
        flags,
        widgets,
    });
}

fn all_fields(doc: &Document) -> Vec<FieldNode> {
    let mut out = Vec::new();
    for id in acroform_fields(doc) {
        collect_fields(doc, id, "", None, 0, 0, &mut out);
    }
    out
}

fn field_kind(node: &FieldNode) -> FieldKind {
    match node.field_type.as_deref() {
        Some(b"Tx") => FieldKind::Text,
        Some(b"Btn") if node.flags & FF_RADIO != 0 => FieldKind::Radio,
        Some(b"Btn") => FieldKind::Checkbox,
        Some(b"Ch") => FieldKind::Choice,
        Some(b"Sig") => FieldKind::Signature,
        _ => FieldKind::Other,
    }
}

fn field_value(doc: &Document, id: ObjectId) -> Option<String> {
    let value = doc.get_dictionary(id).ok()?.get(b"V").ok()?;
    match resolve(doc, value) {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

fn widget_rect(doc: &Document, widget: ObjectId) -> Option<[f64; 4]> {
    rect_from(doc, doc.get_dictionary(widget).ok()?.get(b"Rect").ok()?)
}

/// Normal appearance stream of a widget, honoring its appearance state
fn widget_appearance(doc: &Document, widget: ObjectId) -> Option<ObjectId> {
    let dict = doc.get_dictionary(widget).ok()?;
    let normal = resolve_dict(doc, dict.get(b"AP").ok()?)?.get(b"N").ok()?;
    match normal {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Stream(_) => Some(*id),
            Object::Dictionary(states) => {
                let state = dict.get(b"AS").ok()?.as_name().ok()?;
                states.get(state).ok()?.as_reference().ok()
            }
            _ => None,
        },
        Object::Dictionary(states) => {
            let state = dict.get(b"AS").ok()?.as_name().ok()?;
            states.get(state).ok()?.as_reference().ok()
        }
        _ => None,
    }
}

fn page_index_of(pages: &[ObjectId], doc: &Document, widget: ObjectId) -> Option<u32> {
    if let Some(page) = doc
        .get_dictionary(widget)
        .ok()
        .and_then(|d| d.get(b"P").ok())
        .and_then(|p| p.as_reference().ok())
    {
        if let Some(index) = pages.iter().position(|id| *id == page) {
            return Some(index as u32);
        }
    }
    pages.iter().position(|page_id| {
        doc.get_dictionary(*page_id)
            .ok()
            .and_then(|page| page.get(b"Annots").ok())
            .and_then(|annots| resolve(doc, annots).as_array().ok())
            .map(|annots| annots.iter().any(|a| a.as_reference().ok() == Some(widget)))
            .unwrap_or(false)
    })
    .map(|i| i as u32)
}

fn text_appearance(
    doc: &mut Document,
    helvetica: ObjectId,
    rect: [f64; 4],
    value: &str,
    da_size: Option<f64>,
) -> Result<ObjectId, EditorError> {
    let width = rect[2] - rect[0];
    let height = rect[3] - rect[1];
    let font_size = match da_size {
        Some(size) if size > 0.0 => size,
        _ => (height * 0.6).clamp(6.0, 14.0),
    };
    let baseline = ((height - font_size) / 2.0).max(1.0) + font_size * 0.2;
    let content = format!(
        "/Tx BMC\nq\n1 1 {w} {h} re W n\nBT\n/Helv {fs} Tf\n0 g\n\
         2 {ty} Td\n{text} Tj\nET\nQ\nEMC\n",
        w = (width - 2.0).max(0.0),
        h = (height - 2.0).max(0.0),
        fs = font_size,
        ty = baseline,
        text = hex_string(&encode_win_ansi(value)),
    );
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), real(width), real(height)],
            "Resources" => dictionary! {
                "Font" => dictionary! { "Helv" => Object::Reference(helvetica) },
            },
        },
        content.into_bytes(),
    );
    Ok(doc.add_object(stream))
}

fn da_font_size(doc: &Document, field: ObjectId) -> Option<f64> {
    let da = doc.get_dictionary(field).ok()?.get(b"DA").ok()?.as_str().ok()?;
    let da = String::from_utf8_lossy(da);
    DA_FONT_SIZE_RE.captures(&da)?.get(1)?.as_str().parse().ok()
}

impl DocumentService for LopdfService {
    type Doc = LopdfDocument;
    type Page = LopdfPage;
    type Font = LopdfFont;

    fn load_document(&self, bytes: &[u8]) -> Result<LopdfDocument, EditorError> {
        let doc = Document::load_mem(bytes).map_err(|e| EditorError::ParseError(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(EditorError::ParseError("document is encrypted".to_string()));
        }
        let doc = LopdfDocument::new(doc);
        if doc.pages.is_empty() {
            return Err(EditorError::ParseError("document has no pages".to_string()));
        }
        debug!(pages = doc.pages.len(), "loaded document");
        Ok(doc)
    }

    fn new_document(&self) -> LopdfDocument {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        LopdfDocument::new(doc)
    }

    fn page_count(&self, doc: &LopdfDocument) -> u32 {
        doc.pages.len() as u32
    }

    fn page_size_pt(
        &self,
        doc: &LopdfDocument,
        page: LopdfPage,
    ) -> Result<(f64, f64), EditorError> {
        let media_box = inherited(&doc.doc, page.id, b"MediaBox")
            .and_then(|mb| rect_from(&doc.doc, mb))
            .ok_or_else(|| {
                EditorError::OperationError(format!("page {} has no MediaBox", page.index))
            })?;
        Ok((media_box[2] - media_box[0], media_box[3] - media_box[1]))
    }

    fn get_page(&self, doc: &LopdfDocument, page_index: u32) -> Result<LopdfPage, EditorError> {
        doc.pages
            .get(page_index as usize)
            .map(|id| LopdfPage {
                index: page_index,
                id: *id,
                origin: media_origin(&doc.doc, *id),
            })
            .ok_or_else(|| {
                EditorError::OperationError(format!(
                    "page {} out of range (document has {})",
                    page_index,
                    doc.pages.len()
                ))
            })
    }

    fn add_image_page(
        &self,
        doc: &mut LopdfDocument,
        image: &RasterImage,
        width_pt: f64,
        height_pt: f64,
    ) -> Result<LopdfPage, EditorError> {
        let pages_id = doc.pages_root()?;
        let image_id = add_image_xobject(&mut doc.doc, image)?;
        let content = format!("q\n{} 0 0 {} 0 0 cm\n/PageImage Do\nQ\n", width_pt, height_pt);
        let content_id = doc.doc.add_object(flate_stream(Dictionary::new(), content.as_bytes())?);
        let page_id = doc.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![0.into(), 0.into(), real(width_pt), real(height_pt)],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "PageImage" => Object::Reference(image_id) },
            },
            "Contents" => Object::Reference(content_id),
        });

        let pages = doc.doc.get_dictionary_mut(pages_id).map_err(op_err)?;
        let mut kids = pages
            .get(b"Kids")
            .and_then(|k| k.as_array())
            .cloned()
            .unwrap_or_default();
        kids.push(Object::Reference(page_id));
        let count = kids.len() as i64;
        pages.set("Kids", Object::Array(kids));
        pages.set("Count", count);

        doc.pages.push(page_id);
        Ok(LopdfPage {
            index: doc.pages.len() as u32 - 1,
            id: page_id,
            origin: (0.0, 0.0),
        })
    }

    fn embed_font(
        &self,
        doc: &mut LopdfDocument,
        font: StandardFont,
    ) -> Result<LopdfFont, EditorError> {
        if let Some(id) = doc.fonts.get(&font) {
            return Ok(LopdfFont { font, id: *id });
        }
        let id = doc.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => font.base_font_name(),
            "Encoding" => "WinAnsiEncoding",
        });
        doc.fonts.insert(font, id);
        Ok(LopdfFont { font, id })
    }

    fn draw_rect(
        &self,
        doc: &mut LopdfDocument,
        page: LopdfPage,
        rect: PdfRect,
        color: Color,
    ) -> Result<(), EditorError> {
        let buffer = doc.buffer(page);
        let _ = writeln!(
            buffer.ops,
            "q\n{}\n{} {} {} {} re\nf\nQ",
            color_op(color, true),
            rect.x + page.origin.0,
            rect.y + page.origin.1,
            rect.width,
            rect.height
        );
        Ok(())
    }

    fn draw_text(
        &self,
        doc: &mut LopdfDocument,
        page: LopdfPage,
        text: &str,
        x: f64,
        y: f64,
        font: LopdfFont,
        size_pt: f64,
        color: Color,
    ) -> Result<(), EditorError> {
        let resource = format!("PEF{}", font.font as u8);
        let buffer = doc.buffer(page);
        buffer.fonts.insert(resource.clone(), font.id);
        let _ = writeln!(
            buffer.ops,
            "BT\n/{} {} Tf\n{}\n1 0 0 1 {} {} Tm\n{} Tj\nET",
            resource,
            size_pt,
            color_op(color, true),
            x + page.origin.0,
            y + page.origin.1,
            hex_string(&encode_win_ansi(text))
        );
        Ok(())
    }

    fn draw_image(
        &self,
        doc: &mut LopdfDocument,
        page: LopdfPage,
        image: &RasterImage,
        rect: PdfRect,
    ) -> Result<(), EditorError> {
        let image_id = add_image_xobject(&mut doc.doc, image)?;
        let name = doc.next_xobject_name("Im");
        let buffer = doc.buffer(page);
        buffer.xobjects.insert(name.clone(), image_id);
        let _ = writeln!(
            buffer.ops,
            "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ",
            rect.width,
            rect.height,
            rect.x + page.origin.0,
            rect.y + page.origin.1,
            name
        );
        Ok(())
    }

    fn list_fields(&self, doc: &LopdfDocument) -> Result<Vec<FormField>, EditorError> {
        Ok(all_fields(&doc.doc)
            .iter()
            .map(|node| FormField {
                name: node.name.clone(),
                kind: field_kind(node),
                value: field_value(&doc.doc, node.id),
                page_index: node
                    .widgets
                    .first()
                    .and_then(|w| page_index_of(&doc.pages, &doc.doc, *w)),
            })
            .collect())
    }

    fn set_field_value(
        &self,
        doc: &mut LopdfDocument,
        name: &str,
        value: &str,
    ) -> Result<bool, EditorError> {
        let Some(node) = all_fields(&doc.doc).into_iter().find(|f| f.name == name) else {
            warn!(field = name, "no such form field");
            return Ok(false);
        };

        match field_kind(&node) {
            FieldKind::Checkbox | FieldKind::Radio => {
                let state = if value.is_empty() { "Off" } else { value };
                doc.doc
                    .get_dictionary_mut(node.id)
                    .map_err(op_err)?
                    .set("V", Object::Name(state.as_bytes().to_vec()));
                for widget in &node.widgets {
                    let has_state = widget_has_state(&doc.doc, *widget, state.as_bytes());
                    let appearance = if has_state { state } else { "Off" };
                    doc.doc
                        .get_dictionary_mut(*widget)
                        .map_err(op_err)?
                        .set("AS", Object::Name(appearance.as_bytes().to_vec()));
                }
            }
            FieldKind::Signature | FieldKind::Other => {
                return Err(EditorError::OperationError(format!(
                    "field {} cannot be filled with text",
                    name
                )));
            }
            FieldKind::Text | FieldKind::Choice => {
                doc.doc
                    .get_dictionary_mut(node.id)
                    .map_err(op_err)?
                    .set("V", encode_text_string(value));
                let helvetica = self.embed_font(doc, StandardFont::Helvetica)?.id;
                let da_size = da_font_size(&doc.doc, node.id);
                for widget in &node.widgets {
                    let Some(rect) = widget_rect(&doc.doc, *widget) else {
                        continue;
                    };
                    let ap_id = text_appearance(&mut doc.doc, helvetica, rect, value, da_size)?;
                    doc.doc
                        .get_dictionary_mut(*widget)
                        .map_err(op_err)?
                        .set("AP", dictionary! { "N" => Object::Reference(ap_id) });
                }
            }
        }

        if let Some(form_id) = acroform_id(&doc.doc) {
            if let Ok(form) = doc.doc.get_dictionary_mut(form_id) {
                form.set("NeedAppearances", true);
            }
        }
        debug!(field = name, "set form field value");
        Ok(true)
    }

    fn flatten_form(&self, doc: &mut LopdfDocument) -> Result<(), EditorError> {
        let fields = all_fields(&doc.doc);
        if fields.is_empty() {
            return Ok(());
        }
        let widgets: Vec<ObjectId> = fields
            .iter()
            .flat_map(|f| f.widgets.iter().copied())
            .collect();

        for page_index in 0..doc.pages.len() {
            let page_id = doc.pages[page_index];
            let annots: Vec<Object> = doc
                .doc
                .get_dictionary(page_id)
                .ok()
                .and_then(|p| p.get(b"Annots").ok())
                .and_then(|a| resolve(&doc.doc, a).as_array().ok())
                .cloned()
                .unwrap_or_default();
            if annots.is_empty() {
                continue;
            }

            let mut kept = Vec::with_capacity(annots.len());
            for annot in annots {
                let widget = annot.as_reference().ok().filter(|id| widgets.contains(id));
                let Some(widget) = widget else {
                    kept.push(annot);
                    continue;
                };
                let hidden = doc
                    .doc
                    .get_dictionary(widget)
                    .ok()
                    .and_then(|w| w.get(b"F").ok())
                    .and_then(|f| f.as_i64().ok())
                    .map_or(false, |f| f & ANNOT_HIDDEN != 0);
                if !hidden {
                    stamp_widget(doc, page_index as u32, widget)?;
                }
            }
            doc.doc
                .get_dictionary_mut(page_id)
                .map_err(op_err)?
                .set("Annots", Object::Array(kept));
        }

        doc.doc.catalog_mut().map_err(op_err)?.remove(b"AcroForm");
        debug!(fields = fields.len(), "flattened form");
        Ok(())
    }

    fn save(&self, mut doc: LopdfDocument) -> Result<Vec<u8>, EditorError> {
        let pending = std::mem::take(&mut doc.pending);
        for (page_id, buffer) in pending {
            flush_page(&mut doc.doc, page_id, buffer)?;
        }
        let mut output = Vec::new();
        doc.doc
            .save_to(&mut output)
            .map_err(|e| EditorError::OperationError(e.to_string()))?;
        Ok(output)
    }
}

fn acroform_id(doc: &Document) -> Option<ObjectId> {
    doc.catalog().ok()?.get(b"AcroForm").ok()?.as_reference().ok()
}

fn widget_has_state(doc: &Document, widget: ObjectId, state: &[u8]) -> bool {
    doc.get_dictionary(widget)
        .ok()
        .and_then(|w| w.get(b"AP").ok())
        .and_then(|ap| resolve_dict(doc, ap))
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|n| resolve_dict(doc, n))
        .map_or(false, |states| states.has(state))
}

/// Draw a widget's normal appearance as a form XObject mapped onto its rectangle
fn stamp_widget(
    doc: &mut LopdfDocument,
    page_index: u32,
    widget: ObjectId,
) -> Result<(), EditorError> {
    let (Some(ap_id), Some(rect)) = (
        widget_appearance(&doc.doc, widget),
        widget_rect(&doc.doc, widget),
    ) else {
        return Ok(());
    };
    let bbox = match doc.doc.get_object_mut(ap_id).map_err(op_err)? {
        Object::Stream(stream) => {
            // appearance streams are form XObjects, some writers omit the subtype
            stream.dict.set("Type", Object::Name(b"XObject".to_vec()));
            stream.dict.set("Subtype", Object::Name(b"Form".to_vec()));
            stream.dict.get(b"BBox").ok().cloned()
        }
        _ => return Ok(()),
    };
    let bbox = bbox
        .and_then(|b| rect_from(&doc.doc, &b))
        .unwrap_or([0.0, 0.0, rect[2] - rect[0], rect[3] - rect[1]]);
    let bbox_w = (bbox[2] - bbox[0]).max(f64::EPSILON);
    let bbox_h = (bbox[3] - bbox[1]).max(f64::EPSILON);
    let sx = (rect[2] - rect[0]) / bbox_w;
    let sy = (rect[3] - rect[1]) / bbox_h;

    let name = doc.next_xobject_name("Fm");
    let page_id = doc.pages[page_index as usize];
    let page = LopdfPage {
        index: page_index,
        id: page_id,
        origin: media_origin(&doc.doc, page_id),
    };
    let buffer = doc.buffer(page);
    buffer.xobjects.insert(name.clone(), ap_id);
    let _ = writeln!(
        buffer.ops,
        "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ",
        sx,
        sy,
        rect[0] - bbox[0] * sx,
        rect[1] - bbox[1] * sy,
        name
    );
    Ok(())
}
