//! WASM bindings for the PDF editor
//!
//! All edit state lives in Rust inside an `EditSession`. JavaScript renders
//! pages with its PDF renderer, forwards pointer events and replays the
//! overlay draw commands returned by `redraw()`.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { EditSession } from './pkg/pdfedit_wasm.js';
//!
//! await init();
//!
//! const session = new EditSession("contract.pdf", bytes, canvas.width);
//! const ticket = session.requestRender();
//! const { runs } = await renderPage(ticket.page_index, ticket.scale);
//! session.completeRender(ticket, runs);
//!
//! session.setMode("draw");
//! canvas.onpointerdown = (e) => session.pointerDown(e.offsetX, e.offsetY);
//! canvas.onpointermove = (e) => {
//!     session.pointerMove(e.offsetX, e.offsetY);
//!     paint(session.redraw());
//! };
//! canvas.onpointerup = (e) => session.pointerUp(e.offsetX, e.offsetY);
//!
//! downloadBlob(session.commit(false), "edited.pdf");
//! ```

pub mod edit_session;
pub mod host_raster;
pub mod validation;

use wasm_bindgen::prelude::*;

pub use edit_session::EditSession;
pub use validation::DocumentInfo;

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Quick validation check for a PDF file
/// Returns Ok(()) if valid, Err with message if not
#[wasm_bindgen]
pub fn quick_validate(bytes: &[u8]) -> Result<(), JsValue> {
    validation::quick_validate(bytes).map_err(|e| JsValue::from_str(&e))
}

/// Page count, page sizes, form field count and whether the document can be
/// edited in place
#[wasm_bindgen]
pub fn get_document_info(bytes: &[u8]) -> Result<JsValue, JsValue> {
    let info = validation::describe_document(bytes).map_err(|e| JsValue::from_str(&e))?;

    serde_wasm_bindgen::to_value(&info)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Default editor settings as JSON, for hosts that want to tweak a few
#[wasm_bindgen]
pub fn default_config_json() -> Result<String, JsValue> {
    pdfedit_core::EditorConfig::default()
        .to_json()
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
