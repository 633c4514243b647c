//! Per-page text runs extracted by the rasterizer
//!
//! A `TextLayer` is regenerated on every page or zoom change. Run boxes are
//! cached in raster space so pointer hit-testing needs no conversion.

use crate::annotations::Color;
use crate::coords::ViewportState;
use crate::fonts::{classify_font, FontKey, StandardFont};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ASCENT_RATIO: f64 = 0.8;
pub const DEFAULT_DESCENT_RATIO: f64 = 0.2;

/// Tolerance (points) when checking that a run still sits where an edit expects it
const POSITION_TOLERANCE_PT: f64 = 0.5;

/// Identifies a run within one extraction pass of one page.
///
/// Not a document-wide id: the index is the position in the rasterizer's run list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunKey {
    pub page_index: u32,
    pub run_index: u32,
}

impl RunKey {
    pub fn new(page_index: u32, run_index: u32) -> Self {
        Self {
            page_index,
            run_index,
        }
    }
}

/// A text item as delivered by the page rasterization service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTextRun {
    pub text: String,
    /// Baseline origin in document space
    pub doc_x: f64,
    pub doc_y: f64,
    pub font_size_pt: f64,
    /// Embedded font name, e.g. "BCDEEE+Arial-BoldMT"
    #[serde(default)]
    pub font_name: String,
    /// Generic family reported by the rasterizer ("serif", "monospace", ...)
    #[serde(default)]
    pub font_family_hint: Option<String>,
    #[serde(default)]
    pub ascent_ratio: Option<f64>,
    #[serde(default)]
    pub descent_ratio: Option<f64>,
    pub doc_width: f64,
    #[serde(default)]
    pub color: Option<Color>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl RasterRect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.w && py >= self.y && py <= self.y + self.h
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    pub fn inflate(&self, by: f64) -> Self {
        Self::new(self.x - by, self.y - by, self.w + 2.0 * by, self.h + 2.0 * by)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub key: RunKey,
    pub text: String,
    pub doc_x: f64,
    pub doc_y: f64,
    pub font_size_pt: f64,
    pub font: FontKey,
    pub color: Color,
    pub ascent_ratio: f64,
    pub descent_ratio: f64,
    pub doc_width: f64,
    /// Box in raster space at the scale of the extraction
    pub raster_box: RasterRect,
}

impl TextRun {
    pub fn page_index(&self) -> u32 {
        self.key.page_index
    }

    pub fn standard_font(&self) -> StandardFont {
        StandardFont::resolve(self.font)
    }

    /// Scale-independent copy of the run, kept alongside edits made against it
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            text: self.text.clone(),
            doc_x: self.doc_x,
            doc_y: self.doc_y,
            font_size_pt: self.font_size_pt,
            font: self.font,
            color: self.color,
            ascent_ratio: self.ascent_ratio,
            descent_ratio: self.descent_ratio,
            doc_width: self.doc_width,
        }
    }
}

/// The document-space facts about a run at the time it was edited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub text: String,
    pub doc_x: f64,
    pub doc_y: f64,
    pub font_size_pt: f64,
    pub font: FontKey,
    pub color: Color,
    pub ascent_ratio: f64,
    pub descent_ratio: f64,
    pub doc_width: f64,
}

impl RunSnapshot {
    pub fn standard_font(&self) -> StandardFont {
        StandardFont::resolve(self.font)
    }

    /// Whether `run` is the same text at the same place
    pub fn matches(&self, run: &TextRun) -> bool {
        self.text == run.text
            && (self.doc_x - run.doc_x).abs() <= POSITION_TOLERANCE_PT
            && (self.doc_y - run.doc_y).abs() <= POSITION_TOLERANCE_PT
    }
}

/// Ordered runs for one page at one scale
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayer {
    page_index: u32,
    viewport: ViewportState,
    runs: Vec<TextRun>,
}

impl TextLayer {
    pub fn extract(page_index: u32, viewport: ViewportState, raw_runs: &[RawTextRun]) -> Self {
        let runs = raw_runs
            .iter()
            .filter(|raw| !raw.text.trim().is_empty() && raw.font_size_pt > 0.0)
            .enumerate()
            .map(|(index, raw)| build_run(RunKey::new(page_index, index as u32), raw, &viewport))
            .collect();
        Self {
            page_index,
            viewport,
            runs,
        }
    }

    /// Layer for a page whose text could not be extracted
    pub fn empty(page_index: u32, viewport: ViewportState) -> Self {
        Self {
            page_index,
            viewport,
            runs: Vec::new(),
        }
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn viewport(&self) -> ViewportState {
        self.viewport
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn run(&self, key: RunKey) -> Option<&TextRun> {
        if key.page_index != self.page_index {
            return None;
        }
        self.runs.get(key.run_index as usize)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Run under the pointer. Overlapping boxes resolve to the smallest one.
    pub fn hit_test(&self, px: f64, py: f64) -> Option<&TextRun> {
        self.runs
            .iter()
            .filter(|run| run.raster_box.contains(px, py))
            .min_by(|a, b| {
                a.raster_box
                    .area()
                    .partial_cmp(&b.raster_box.area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

fn build_run(key: RunKey, raw: &RawTextRun, viewport: &ViewportState) -> TextRun {
    let ascent_ratio = raw
        .ascent_ratio
        .filter(|r| *r > 0.0)
        .unwrap_or(DEFAULT_ASCENT_RATIO);
    let descent_ratio = raw
        .descent_ratio
        .map(f64::abs)
        .unwrap_or(DEFAULT_DESCENT_RATIO);
    let (px, py) = viewport.to_raster(raw.doc_x, raw.doc_y);
    let ascent_px = viewport.len_to_raster(ascent_ratio * raw.font_size_pt);
    let descent_px = viewport.len_to_raster(descent_ratio * raw.font_size_pt);
    let raster_box = RasterRect::new(
        px,
        py - ascent_px,
        viewport.len_to_raster(raw.doc_width.max(0.0)),
        ascent_px + descent_px,
    );

    TextRun {
        key,
        text: raw.text.clone(),
        doc_x: raw.doc_x,
        doc_y: raw.doc_y,
        font_size_pt: raw.font_size_pt,
        font: classify_font(&raw.font_name, raw.font_family_hint.as_deref()),
        color: raw.color.unwrap_or_default(),
        ascent_ratio,
        descent_ratio,
        doc_width: raw.doc_width,
        raster_box,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fonts::FontFamily;

    pub(crate) fn raw(text: &str, x: f64, y: f64, size: f64, width: f64) -> RawTextRun {
        RawTextRun {
            text: text.to_string(),
            doc_x: x,
            doc_y: y,
            font_size_pt: size,
            font_name: "Helvetica".to_string(),
            font_family_hint: None,
            ascent_ratio: None,
            descent_ratio: None,
            doc_width: width,
            color: None,
        }
    }

    #[test]
    fn test_extract_builds_raster_boxes() {
        let viewport = ViewportState::new(2.0, 612.0, 792.0);
        let layer = TextLayer::extract(0, viewport, &[raw("Invoice", 72.0, 700.0, 10.0, 40.0)]);
        let run = &layer.runs()[0];
        assert_eq!(run.key, RunKey::new(0, 0));
        // baseline at (792 - 700) * 2 = 184, ascent 8pt -> 16px above
        assert_eq!(run.raster_box, RasterRect::new(144.0, 168.0, 80.0, 20.0));
    }

    #[test]
    fn test_whitespace_runs_are_skipped_and_indices_stay_dense() {
        let viewport = ViewportState::new(1.0, 612.0, 792.0);
        let layer = TextLayer::extract(
            3,
            viewport,
            &[
                raw("A", 10.0, 10.0, 12.0, 8.0),
                raw("   ", 20.0, 10.0, 12.0, 8.0),
                raw("B", 30.0, 10.0, 12.0, 8.0),
            ],
        );
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.runs()[1].text, "B");
        assert_eq!(layer.runs()[1].key, RunKey::new(3, 1));
        assert!(layer.run(RunKey::new(2, 1)).is_none());
    }

    #[test]
    fn test_hit_test_selects_clicked_run() {
        let viewport = ViewportState::new(1.0, 612.0, 792.0);
        let layer = TextLayer::extract(
            0,
            viewport,
            &[
                raw("Header", 72.0, 700.0, 12.0, 60.0),
                raw("Body", 72.0, 650.0, 12.0, 30.0),
            ],
        );
        // Body baseline at y=142px, box spans 132.4..144.8
        let hit = layer.hit_test(80.0, 138.0).unwrap();
        assert_eq!(hit.text, "Body");
        assert!(layer.hit_test(300.0, 138.0).is_none());
    }

    #[test]
    fn test_hit_test_prefers_smallest_overlapping_box() {
        let viewport = ViewportState::new(1.0, 612.0, 792.0);
        let layer = TextLayer::extract(
            0,
            viewport,
            &[
                raw("Large heading", 72.0, 700.0, 30.0, 200.0),
                raw("x", 80.0, 700.0, 8.0, 5.0),
            ],
        );
        assert_eq!(layer.hit_test(82.0, 90.0).unwrap().text, "x");
    }

    #[test]
    fn test_font_flags_come_from_internal_name() {
        let viewport = ViewportState::new(1.0, 612.0, 792.0);
        let mut r = raw("Total", 72.0, 100.0, 11.0, 30.0);
        r.font_name = "ABCDEF+TimesNewRoman-BoldItalic".to_string();
        let layer = TextLayer::extract(0, viewport, &[r]);
        let font = layer.runs()[0].font;
        assert_eq!(font.family, FontFamily::Serif);
        assert!(font.bold && font.italic);
        assert_eq!(
            layer.runs()[0].standard_font(),
            StandardFont::TimesBoldItalic
        );
    }

    #[test]
    fn test_snapshot_matches_same_run_at_other_scale() {
        let small = TextLayer::extract(
            0,
            ViewportState::new(0.5, 612.0, 792.0),
            &[raw("Invoice", 72.0, 700.0, 10.0, 40.0)],
        );
        let large = TextLayer::extract(
            0,
            ViewportState::new(3.0, 612.0, 792.0),
            &[raw("Invoice", 72.0, 700.0, 10.0, 40.0)],
        );
        let snapshot = small.runs()[0].snapshot();
        assert!(snapshot.matches(&large.runs()[0]));

        let moved = TextLayer::extract(
            0,
            ViewportState::new(1.0, 612.0, 792.0),
            &[raw("Invoice", 72.0, 600.0, 10.0, 40.0)],
        );
        assert!(!snapshot.matches(&moved.runs()[0]));
    }
}
