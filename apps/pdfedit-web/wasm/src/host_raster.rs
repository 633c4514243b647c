//! Page rasterization backed by the host's renderer
//!
//! The browser draws pages with its own PDF renderer and reports text runs
//! through `EditSession::completeRender`. Bitmaps are only needed when the
//! source cannot be parsed for output, in which case the host hands each
//! page image over before committing.

use std::cell::RefCell;
use std::collections::HashMap;

use pdfedit_core::services::{PageRasterizer, RenderedPage, TextContent};
use pdfedit_core::{EditorError, RasterImage};

pub struct HostRasterizer {
    page_sizes: Vec<(f64, f64)>,
    page_images: RefCell<HashMap<u32, RasterImage>>,
}

impl HostRasterizer {
    pub fn new(page_sizes: Vec<(f64, f64)>) -> Self {
        Self {
            page_sizes,
            page_images: RefCell::new(HashMap::new()),
        }
    }

    pub fn page_sizes(&self) -> &[(f64, f64)] {
        &self.page_sizes
    }

    /// Store the rendered bitmap of `page_index`, replacing any earlier one
    pub fn supply(&self, page_index: u32, image: RasterImage) -> Result<(), EditorError> {
        if page_index as usize >= self.page_sizes.len() {
            return Err(EditorError::OperationError(format!(
                "page {} out of range",
                page_index
            )));
        }
        self.page_images.borrow_mut().insert(page_index, image);
        Ok(())
    }

    /// Pages that still have no bitmap
    pub fn missing_pages(&self) -> Vec<u32> {
        let images = self.page_images.borrow();
        (0..self.page_sizes.len() as u32)
            .filter(|page| !images.contains_key(page))
            .collect()
    }

    pub fn clear(&self) {
        self.page_images.borrow_mut().clear();
    }
}

impl PageRasterizer for HostRasterizer {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn page_size_pt(&self, page_index: u32) -> Result<(f64, f64), EditorError> {
        self.page_sizes
            .get(page_index as usize)
            .copied()
            .ok_or_else(|| EditorError::OperationError(format!("page {} out of range", page_index)))
    }

    fn render(&self, page_index: u32, _scale: f64) -> Result<RenderedPage, EditorError> {
        let bitmap = self
            .page_images
            .borrow()
            .get(&page_index)
            .cloned()
            .ok_or_else(|| {
                EditorError::OperationError(format!("no image supplied for page {}", page_index))
            })?;
        Ok(RenderedPage {
            bitmap,
            text: TextContent::Unavailable("text is reported by the host".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_requires_supplied_image() {
        let raster = HostRasterizer::new(vec![(612.0, 792.0), (595.0, 842.0)]);
        assert!(raster.render(0, 1.0).is_err());
        assert_eq!(raster.missing_pages(), vec![0, 1]);

        raster.supply(1, RasterImage::new(4, 4).unwrap()).unwrap();
        assert_eq!(raster.missing_pages(), vec![0]);
        let page = raster.render(1, 1.0).unwrap();
        assert_eq!(page.bitmap.width(), 4);
    }

    #[test]
    fn test_supply_rejects_unknown_page() {
        let raster = HostRasterizer::new(vec![(612.0, 792.0)]);
        assert!(raster.supply(3, RasterImage::new(1, 1).unwrap()).is_err());
        assert_eq!(raster.page_size_pt(0).unwrap(), (612.0, 792.0));
        assert!(raster.page_size_pt(1).is_err());
    }
}
