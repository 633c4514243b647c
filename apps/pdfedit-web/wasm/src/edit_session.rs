//! Edit session for the browser
//!
//! Wraps `EditorSession` for JavaScript. The page itself is drawn by the
//! host's PDF renderer; this session owns every edit, answers pointer input,
//! produces overlay draw commands and writes the final document.

use std::sync::Arc;

use pdfedit_core::overlay::ImageRef;
use pdfedit_core::services::{DocumentService, TextContent};
use pdfedit_core::{
    input, Color, DisplayList, EditorConfig, EditorMode, EditorSession, Focus, LopdfService,
    RasterImage, RawTextRun, RenderTicket, RunKey, SignatureCapture, SignaturePad,
};
use wasm_bindgen::prelude::*;

use crate::host_raster::HostRasterizer;

fn js_error(context: &str, err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{}: {}", context, err))
}

fn parse_color(hex: &str) -> Result<Color, JsValue> {
    Color::from_hex(hex).ok_or_else(|| JsValue::from_str(&format!("Invalid color: {}", hex)))
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| js_error("Serialization error", e))
}

fn bytes_to_js(bytes: &[u8]) -> js_sys::Uint8Array {
    let array = js_sys::Uint8Array::new_with_length(bytes.len() as u32);
    array.copy_from(bytes);
    array
}

/// Session for editing a single PDF document
#[wasm_bindgen]
pub struct EditSession {
    session: EditorSession,
    raster: HostRasterizer,
    document_name: String,
    pad: Option<SignaturePad>,
    last_commit_used_fallback: bool,
}

#[wasm_bindgen]
impl EditSession {
    /// Open `bytes` for editing.
    ///
    /// `page_sizes` is a flat `[w0, h0, w1, h1, ...]` list in points and is
    /// only consulted when the document cannot be parsed here. `config_json`
    /// overrides the default editor settings.
    #[wasm_bindgen(constructor)]
    pub fn new(
        name: &str,
        bytes: &[u8],
        viewport_width: f64,
        page_sizes: Option<Vec<f64>>,
        config_json: Option<String>,
    ) -> Result<EditSession, JsValue> {
        let config = match config_json {
            Some(json) => EditorConfig::from_json(&json).map_err(|e| js_error("Config error", e))?,
            None => EditorConfig::default(),
        };
        let sizes = match pdfedit_core::get_page_sizes(bytes) {
            Ok(sizes) => sizes,
            Err(parse_err) => {
                let flat = page_sizes.ok_or_else(|| js_error("Parse error", &parse_err))?;
                flat.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
            }
        };
        let raster = HostRasterizer::new(sizes);
        let session = EditorSession::open(bytes.to_vec(), &raster, viewport_width, config)
            .map_err(|e| js_error("Open error", e))?;
        Ok(EditSession {
            session,
            raster,
            document_name: name.to_string(),
            pad: None,
            last_commit_used_fallback: false,
        })
    }

    #[wasm_bindgen(getter, js_name = documentName)]
    pub fn document_name(&self) -> String {
        self.document_name.clone()
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.session.page_count()
    }

    #[wasm_bindgen(getter, js_name = pageIndex)]
    pub fn page_index(&self) -> u32 {
        self.session.page_index()
    }

    #[wasm_bindgen(getter)]
    pub fn zoom(&self) -> f64 {
        self.session.zoom()
    }

    #[wasm_bindgen(getter)]
    pub fn mode(&self) -> String {
        self.session.mode().as_str().to_string()
    }

    /// Get document bytes for the host renderer
    #[wasm_bindgen(js_name = getDocumentBytes)]
    pub fn get_document_bytes(&self) -> js_sys::Uint8Array {
        bytes_to_js(self.session.source())
    }

    /// Current scale and page size in points
    #[wasm_bindgen(js_name = getViewport)]
    pub fn get_viewport(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.viewport())
    }

    // ============ Rendering ============

    /// Ask for a render of the current page. The host renders at
    /// `ticket.scale` and reports back with `completeRender`.
    #[wasm_bindgen(js_name = requestRender)]
    pub fn request_render(&mut self) -> Result<JsValue, JsValue> {
        to_js(&self.session.request_render())
    }

    /// Returns a render ticket, or `undefined` when nothing changed
    #[wasm_bindgen(js_name = setViewportWidth)]
    pub fn set_viewport_width(&mut self, width: f64) -> Result<JsValue, JsValue> {
        to_js(&self.session.set_viewport_width(width))
    }

    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&mut self, zoom: f64) -> Result<JsValue, JsValue> {
        to_js(&self.session.set_zoom(zoom))
    }

    #[wasm_bindgen(js_name = goToPage)]
    pub fn go_to_page(&mut self, page_index: u32) -> Result<JsValue, JsValue> {
        to_js(&self.session.go_to_page(page_index))
    }

    /// Deliver the text runs of a finished render. Returns false when the
    /// ticket has been superseded.
    #[wasm_bindgen(js_name = completeRender)]
    pub fn complete_render(&mut self, ticket: JsValue, runs: JsValue) -> Result<bool, JsValue> {
        let ticket: RenderTicket = serde_wasm_bindgen::from_value(ticket)
            .map_err(|e| js_error("Invalid ticket", e))?;
        let runs: Vec<RawTextRun> = serde_wasm_bindgen::from_value(runs)
            .map_err(|e| js_error("Invalid text runs", e))?;
        Ok(self.session.complete_render(ticket, TextContent::Runs(runs)))
    }

    /// The page rendered but its text could not be read
    #[wasm_bindgen(js_name = failTextExtraction)]
    pub fn fail_text_extraction(&mut self, ticket: JsValue, reason: &str) -> Result<bool, JsValue> {
        let ticket: RenderTicket = serde_wasm_bindgen::from_value(ticket)
            .map_err(|e| js_error("Invalid ticket", e))?;
        Ok(self
            .session
            .complete_render(ticket, TextContent::Unavailable(reason.to_string())))
    }

    #[wasm_bindgen(getter, js_name = extractionError)]
    pub fn extraction_error(&self) -> Option<String> {
        self.session.extraction_error().map(str::to_string)
    }

    /// Overlay draw commands for the current state
    pub fn redraw(&self) -> Result<JsValue, JsValue> {
        let mut list = DisplayList::new();
        self.session.redraw(&mut list);
        to_js(&list.commands)
    }

    /// Pixels for a `drawImage` command's `image` reference, as
    /// `{ width, height, rgba }`
    #[wasm_bindgen(js_name = imagePixels)]
    pub fn image_pixels(&self, image_ref: JsValue) -> Result<js_sys::Object, JsValue> {
        let image_ref: ImageRef = serde_wasm_bindgen::from_value(image_ref)
            .map_err(|e| js_error("Invalid image reference", e))?;
        let store = self.session.store();
        let pixels: &RasterImage = match image_ref {
            ImageRef::Annotation(id) => store.image(id).map(|image| image.pixels.as_ref()),
            ImageRef::Signature => store.signature().map(|sig| sig.pixels.as_ref()),
        }
        .ok_or_else(|| JsValue::from_str("Image not found"))?;

        let out = js_sys::Object::new();
        js_sys::Reflect::set(&out, &"width".into(), &pixels.width().into())?;
        js_sys::Reflect::set(&out, &"height".into(), &pixels.height().into())?;
        let rgba = js_sys::Uint8ClampedArray::new_with_length(pixels.rgba().len() as u32);
        rgba.copy_from(pixels.rgba());
        js_sys::Reflect::set(&out, &"rgba".into(), &rgba)?;
        Ok(out)
    }

    // ============ Pointer input ============

    #[wasm_bindgen(js_name = setMode)]
    pub fn set_mode(&mut self, name: &str) -> Result<(), JsValue> {
        let mode = EditorMode::from_name(name)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown mode: {}", name)))?;
        self.session.set_mode(mode);
        Ok(())
    }

    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&mut self, x: f64, y: f64) {
        self.session.pointer_down(x, y);
    }

    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&mut self, x: f64, y: f64) {
        self.session.pointer_move(x, y);
    }

    /// Returns true when the gesture recorded an edit
    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&mut self, x: f64, y: f64) -> bool {
        self.session.pointer_up(x, y)
    }

    #[wasm_bindgen(js_name = pointerLeave)]
    pub fn pointer_leave(&mut self) {
        self.session.pointer_leave();
    }

    // ============ Selection ============

    /// Current focus as `{ kind, target }`
    #[wasm_bindgen(js_name = getFocus)]
    pub fn get_focus(&self) -> Result<JsValue, JsValue> {
        to_js(&self.session.store().focus())
    }

    pub fn select(&mut self, focus: JsValue) -> Result<(), JsValue> {
        let focus: Focus =
            serde_wasm_bindgen::from_value(focus).map_err(|e| js_error("Invalid focus", e))?;
        self.session.select(focus);
        Ok(())
    }

    #[wasm_bindgen(js_name = clearFocus)]
    pub fn clear_focus(&mut self) {
        self.session.clear_focus();
    }

    #[wasm_bindgen(js_name = deleteSelection)]
    pub fn delete_selection(&mut self) -> bool {
        self.session.delete_selection()
    }

    // ============ Existing text ============

    #[wasm_bindgen(js_name = editRunText)]
    pub fn edit_run_text(&mut self, page_index: u32, run_index: u32, text: &str) -> bool {
        self.session.edit_run_text(RunKey::new(page_index, run_index), text)
    }

    #[wasm_bindgen(js_name = resizeRunFont)]
    pub fn resize_run_font(&mut self, page_index: u32, run_index: u32, font_size: f64) -> bool {
        self.session
            .resize_run_font(RunKey::new(page_index, run_index), font_size)
    }

    #[wasm_bindgen(js_name = recolorRun)]
    pub fn recolor_run(
        &mut self,
        page_index: u32,
        run_index: u32,
        color: &str,
    ) -> Result<bool, JsValue> {
        let color = parse_color(color)?;
        Ok(self
            .session
            .recolor_run(RunKey::new(page_index, run_index), color))
    }

    // ============ Text annotations ============

    /// Add a text annotation on the current page at document coordinates
    #[wasm_bindgen(js_name = addTextAnnotation)]
    pub fn add_text_annotation(
        &mut self,
        x: f64,
        y: f64,
        text: &str,
        font_size: Option<f64>,
        color: Option<String>,
    ) -> Result<Option<u64>, JsValue> {
        let color = color.as_deref().map(parse_color).transpose()?;
        Ok(self.session.add_text_annotation(x, y, text, font_size, color))
    }

    /// Finish the text entry opened by a click in add-text mode
    #[wasm_bindgen(js_name = commitTextEntry)]
    pub fn commit_text_entry(&mut self, text: &str) -> Option<u64> {
        self.session.commit_text_entry(text)
    }

    #[wasm_bindgen(js_name = cancelTextEntry)]
    pub fn cancel_text_entry(&mut self) {
        self.session.cancel_text_entry();
    }

    #[wasm_bindgen(js_name = beginInlineEdit)]
    pub fn begin_inline_edit(&mut self, id: u64) -> bool {
        self.session.begin_inline_edit(id)
    }

    #[wasm_bindgen(js_name = finishInlineEdit)]
    pub fn finish_inline_edit(&mut self, text: &str) -> bool {
        self.session.finish_inline_edit(text)
    }

    #[wasm_bindgen(js_name = editAnnotationText)]
    pub fn edit_annotation_text(&mut self, id: u64, text: &str) -> bool {
        self.session.edit_annotation_text(id, text)
    }

    #[wasm_bindgen(js_name = moveAnnotation)]
    pub fn move_annotation(&mut self, id: u64, x: f64, y: f64) -> bool {
        self.session.move_annotation(id, x, y)
    }

    #[wasm_bindgen(js_name = resizeAnnotationFont)]
    pub fn resize_annotation_font(&mut self, id: u64, font_size: f64) -> bool {
        self.session.resize_annotation_font(id, font_size)
    }

    #[wasm_bindgen(js_name = removeAnnotation)]
    pub fn remove_annotation(&mut self, id: u64) -> bool {
        self.session.remove_annotation(id)
    }

    #[wasm_bindgen(js_name = removeStroke)]
    pub fn remove_stroke(&mut self, id: u64) -> bool {
        self.session.remove_stroke(id)
    }

    // ============ Images ============

    /// Decode a PNG/JPEG and hold it for the next click in place-image mode
    #[wasm_bindgen(js_name = stageImage)]
    pub fn stage_image(&mut self, bytes: &[u8]) -> Result<(), JsValue> {
        let image = input::decode_image(bytes).map_err(|e| js_error("Image error", e))?;
        self.session.stage_image(image);
        Ok(())
    }

    #[wasm_bindgen(js_name = addImage)]
    pub fn add_image(
        &mut self,
        bytes: &[u8],
        x: f64,
        y: f64,
        width: Option<f64>,
    ) -> Result<Option<u64>, JsValue> {
        let image = input::decode_image(bytes).map_err(|e| js_error("Image error", e))?;
        Ok(self.session.add_image(x, y, width, Arc::new(image)))
    }

    #[wasm_bindgen(js_name = moveImage)]
    pub fn move_image(&mut self, id: u64, x: f64, y: f64) -> bool {
        self.session.move_image(id, x, y)
    }

    #[wasm_bindgen(js_name = resizeImage)]
    pub fn resize_image(&mut self, id: u64, width: f64, height: f64, keep_aspect: bool) -> bool {
        self.session.resize_image(id, width, height, keep_aspect)
    }

    #[wasm_bindgen(js_name = removeImage)]
    pub fn remove_image(&mut self, id: u64) -> bool {
        self.session.remove_image(id)
    }

    // ============ Signature ============

    /// Use an uploaded image as the signature. Returns its aspect ratio.
    #[wasm_bindgen(js_name = setSignatureImage)]
    pub fn set_signature_image(&mut self, bytes: &[u8]) -> Result<f64, JsValue> {
        let capture =
            SignatureCapture::from_bytes(bytes).map_err(|e| js_error("Signature error", e))?;
        Ok(self.install_signature(capture))
    }

    /// Use a `data:image/png;base64,...` URL (e.g. from a canvas) as the signature
    #[wasm_bindgen(js_name = setSignatureDataUrl)]
    pub fn set_signature_data_url(&mut self, url: &str) -> Result<f64, JsValue> {
        let capture =
            SignatureCapture::from_data_url(url).map_err(|e| js_error("Signature error", e))?;
        Ok(self.install_signature(capture))
    }

    #[wasm_bindgen(js_name = beginSignaturePad)]
    pub fn begin_signature_pad(&mut self, width: u32, height: u32) {
        self.pad = Some(SignaturePad::new(width, height));
    }

    #[wasm_bindgen(js_name = padStrokeStart)]
    pub fn pad_stroke_start(&mut self, x: f64, y: f64) {
        if let Some(pad) = self.pad.as_mut() {
            pad.begin_stroke(x, y);
        }
    }

    #[wasm_bindgen(js_name = padStrokeExtend)]
    pub fn pad_stroke_extend(&mut self, x: f64, y: f64) {
        if let Some(pad) = self.pad.as_mut() {
            pad.extend_stroke(x, y);
        }
    }

    #[wasm_bindgen(js_name = clearSignaturePad)]
    pub fn clear_signature_pad(&mut self) {
        if let Some(pad) = self.pad.as_mut() {
            pad.clear();
        }
    }

    /// Rasterize the pad into the signature. Returns its aspect ratio.
    #[wasm_bindgen(js_name = finishSignaturePad)]
    pub fn finish_signature_pad(&mut self) -> Result<f64, JsValue> {
        let pad = self
            .pad
            .take()
            .ok_or_else(|| JsValue::from_str("Signature pad is not open"))?;
        let capture = pad.finish().map_err(|e| js_error("Signature error", e))?;
        Ok(self.install_signature(capture))
    }

    #[wasm_bindgen(js_name = placeSignature)]
    pub fn place_signature(&mut self, page_index: u32, x_ratio: f64, y_ratio: f64) -> bool {
        self.session.place_signature(page_index, x_ratio, y_ratio)
    }

    #[wasm_bindgen(js_name = moveSignature)]
    pub fn move_signature(&mut self, page_index: u32, x_ratio: f64, y_ratio: f64) -> bool {
        self.session.move_signature(page_index, x_ratio, y_ratio)
    }

    #[wasm_bindgen(js_name = resizeSignature)]
    pub fn resize_signature(&mut self, width: f64) -> bool {
        self.session.resize_signature(width)
    }

    #[wasm_bindgen(js_name = clearSignature)]
    pub fn clear_signature(&mut self) -> bool {
        self.session.clear_signature()
    }

    // ============ Form fields ============

    /// Fields of the source document as `[{ name, kind, value, page_index }]`
    #[wasm_bindgen(js_name = listFields)]
    pub fn list_fields(&self) -> Result<JsValue, JsValue> {
        let service = LopdfService::new();
        let fields = service
            .load_document(self.session.source())
            .and_then(|doc| service.list_fields(&doc))
            .unwrap_or_default();
        to_js(&fields)
    }

    #[wasm_bindgen(js_name = setFieldValue)]
    pub fn set_field_value(&mut self, name: &str, value: &str) {
        self.session.set_field_value(name, value);
    }

    #[wasm_bindgen(js_name = getFieldValues)]
    pub fn get_field_values(&self) -> Result<JsValue, JsValue> {
        to_js(self.session.field_values())
    }

    // ============ History ============

    pub fn undo(&mut self) -> bool {
        self.session.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.session.redo()
    }

    #[wasm_bindgen(getter, js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.session.can_undo()
    }

    #[wasm_bindgen(getter, js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.session.can_redo()
    }

    #[wasm_bindgen(getter, js_name = actionCount)]
    pub fn action_count(&self) -> usize {
        self.session.action_count()
    }

    #[wasm_bindgen(js_name = hasChanges)]
    pub fn has_changes(&self) -> bool {
        self.session.has_changes()
    }

    /// Discard all edits
    pub fn reset(&mut self) {
        self.session.reset();
        self.pad = None;
        self.raster.clear();
    }

    // ============ Output ============

    /// Hand over the rendered bitmap of a page. Only needed when the
    /// document cannot be parsed for output; see `missingPageImages`.
    #[wasm_bindgen(js_name = supplyPageImage)]
    pub fn supply_page_image(
        &mut self,
        page_index: u32,
        width: u32,
        height: u32,
        rgba: Vec<u8>,
    ) -> Result<(), JsValue> {
        let image =
            RasterImage::from_rgba(width, height, rgba).map_err(|e| js_error("Image error", e))?;
        self.raster
            .supply(page_index, image)
            .map_err(|e| js_error("Page error", e))
    }

    /// Pages whose bitmap is still needed before a fallback commit
    #[wasm_bindgen(js_name = missingPageImages)]
    pub fn missing_page_images(&self) -> Vec<u32> {
        if LopdfService::new().load_document(self.session.source()).is_ok() {
            return Vec::new();
        }
        self.raster.missing_pages()
    }

    /// Write every edit into a new document. Edits are kept, so a failed
    /// commit can be retried.
    pub fn commit(&mut self, flatten_form: bool) -> Result<js_sys::Uint8Array, JsValue> {
        let output = self
            .session
            .commit(&LopdfService::new(), &self.raster, flatten_form)
            .map_err(|e| js_error("Commit error", e))?;
        self.last_commit_used_fallback = output.used_fallback;
        Ok(bytes_to_js(&output.bytes))
    }

    /// Whether the last commit had to rebuild pages from bitmaps
    #[wasm_bindgen(getter, js_name = lastCommitUsedFallback)]
    pub fn last_commit_used_fallback(&self) -> bool {
        self.last_commit_used_fallback
    }
}

impl EditSession {
    fn install_signature(&mut self, capture: SignatureCapture) -> f64 {
        let aspect = capture.aspect_ratio();
        self.session.set_signature_capture(capture);
        aspect
    }
}
