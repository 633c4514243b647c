//! Font classification and the fallback font matrix
//!
//! Runs extracted from a page carry whatever font name the producer embedded
//! ("BCDEEE+ArialMT", "g_d0_f1", "Times-BoldItalic", ...). Replacement text is
//! drawn with one of the twelve standard Type1 fonts, picked from a
//! family × {regular, bold, italic, bold-italic} matrix.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref BOLD_RE: Regex = Regex::new(r"(?i)bold|black|heavy").unwrap();
    static ref ITALIC_RE: Regex = Regex::new(r"(?i)italic|oblique").unwrap();
    static ref SANS_RE: Regex =
        Regex::new(r"(?i)sans|arial|helvetica|verdana|tahoma|calibri|gothic").unwrap();
    static ref MONO_RE: Regex =
        Regex::new(r"(?i)mono|courier|consolas|menlo|monaco|typewriter").unwrap();
    static ref SERIF_RE: Regex =
        Regex::new(r"(?i)serif|times|georgia|garamond|cambria|minion|palatino|roman|book")
            .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FontFamily {
    Serif,
    Monospace,
    SansSerif,
}

impl FontFamily {
    /// Classify a family name. Anything unrecognised is sans-serif.
    pub fn from_name(name: &str) -> Self {
        // "DejaVuSansMono" contains "sans" and "sans-serif" contains "serif",
        // so mono is checked first and serif last.
        if MONO_RE.is_match(name) {
            FontFamily::Monospace
        } else if SANS_RE.is_match(name) {
            FontFamily::SansSerif
        } else if SERIF_RE.is_match(name) {
            FontFamily::Serif
        } else {
            FontFamily::SansSerif
        }
    }

    pub fn css_name(&self) -> &'static str {
        match self {
            FontFamily::Serif => "serif",
            FontFamily::Monospace => "monospace",
            FontFamily::SansSerif => "sans-serif",
        }
    }
}

/// Three-axis font key: family, bold, italic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FontKey {
    pub family: FontFamily,
    pub bold: bool,
    pub italic: bool,
}

impl Default for FontKey {
    fn default() -> Self {
        Self {
            family: FontFamily::SansSerif,
            bold: false,
            italic: false,
        }
    }
}

/// Infer the font key of a run from its embedded font name.
///
/// `family_hint` is the generic family reported by the rasterizer, if any. It
/// decides the family, while weight and slant always come from the internal name.
pub fn classify_font(font_name: &str, family_hint: Option<&str>) -> FontKey {
    let family = match family_hint {
        Some(hint) if !hint.trim().is_empty() => FontFamily::from_name(hint),
        _ => FontFamily::from_name(font_name),
    };
    FontKey {
        family,
        bold: BOLD_RE.is_match(font_name),
        italic: ITALIC_RE.is_match(font_name),
    }
}

/// The twelve fallback fonts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StandardFont {
    TimesRoman,
    TimesBold,
    TimesItalic,
    TimesBoldItalic,
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

impl StandardFont {
    pub const ALL: [StandardFont; 12] = [
        StandardFont::TimesRoman,
        StandardFont::TimesBold,
        StandardFont::TimesItalic,
        StandardFont::TimesBoldItalic,
        StandardFont::Helvetica,
        StandardFont::HelveticaBold,
        StandardFont::HelveticaOblique,
        StandardFont::HelveticaBoldOblique,
        StandardFont::Courier,
        StandardFont::CourierBold,
        StandardFont::CourierOblique,
        StandardFont::CourierBoldOblique,
    ];

    pub fn resolve(key: FontKey) -> Self {
        match key.family {
            FontFamily::Serif => match (key.bold, key.italic) {
                (true, true) => StandardFont::TimesBoldItalic,
                (true, false) => StandardFont::TimesBold,
                (false, true) => StandardFont::TimesItalic,
                (false, false) => StandardFont::TimesRoman,
            },
            FontFamily::SansSerif => match (key.bold, key.italic) {
                (true, true) => StandardFont::HelveticaBoldOblique,
                (true, false) => StandardFont::HelveticaBold,
                (false, true) => StandardFont::HelveticaOblique,
                (false, false) => StandardFont::Helvetica,
            },
            FontFamily::Monospace => match (key.bold, key.italic) {
                (true, true) => StandardFont::CourierBoldOblique,
                (true, false) => StandardFont::CourierBold,
                (false, true) => StandardFont::CourierOblique,
                (false, false) => StandardFont::Courier,
            },
        }
    }

    /// PostScript name used as the Type1 `BaseFont`
    pub fn base_font_name(&self) -> &'static str {
        match self {
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::TimesBold => "Times-Bold",
            StandardFont::TimesItalic => "Times-Italic",
            StandardFont::TimesBoldItalic => "Times-BoldItalic",
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    pub fn key(&self) -> FontKey {
        let family = match self {
            StandardFont::TimesRoman
            | StandardFont::TimesBold
            | StandardFont::TimesItalic
            | StandardFont::TimesBoldItalic => FontFamily::Serif,
            StandardFont::Helvetica
            | StandardFont::HelveticaBold
            | StandardFont::HelveticaOblique
            | StandardFont::HelveticaBoldOblique => FontFamily::SansSerif,
            _ => FontFamily::Monospace,
        };
        let bold = matches!(
            self,
            StandardFont::TimesBold
                | StandardFont::TimesBoldItalic
                | StandardFont::HelveticaBold
                | StandardFont::HelveticaBoldOblique
                | StandardFont::CourierBold
                | StandardFont::CourierBoldOblique
        );
        let italic = matches!(
            self,
            StandardFont::TimesItalic
                | StandardFont::TimesBoldItalic
                | StandardFont::HelveticaOblique
                | StandardFont::HelveticaBoldOblique
                | StandardFont::CourierOblique
                | StandardFont::CourierBoldOblique
        );
        FontKey {
            family,
            bold,
            italic,
        }
    }

    /// CSS font shorthand for canvas previews, e.g. `"bold italic 18px serif"`
    pub fn css_font(&self, size_px: f64) -> String {
        let key = self.key();
        let mut parts = Vec::with_capacity(4);
        if key.italic {
            parts.push("italic".to_string());
        }
        if key.bold {
            parts.push("bold".to_string());
        }
        parts.push(format!("{:.2}px", size_px));
        parts.push(key.family.css_name().to_string());
        parts.join(" ")
    }

    /// Advance width of one character in 1/1000 em
    pub fn char_width(&self, c: char) -> f64 {
        let key = self.key();
        let base = match key.family {
            FontFamily::Monospace => return 600.0,
            FontFamily::SansSerif => ascii_width(&HELVETICA_WIDTHS, c).unwrap_or(556.0),
            FontFamily::Serif => ascii_width(&TIMES_WIDTHS, c).unwrap_or(500.0),
        };
        // Bold cuts run roughly 5% wider than the regular cut.
        if key.bold {
            base * 1.05
        } else {
            base
        }
    }
}

fn ascii_width(table: &[u16; 95], c: char) -> Option<f64> {
    let code = c as u32;
    if (32..=126).contains(&code) {
        Some(table[(code - 32) as usize] as f64)
    } else {
        None
    }
}

/// Width of `text` in the same unit as `font_size`
pub fn measure_text_width(text: &str, font: StandardFont, font_size: f64) -> f64 {
    let units: f64 = text.chars().map(|c| font.char_width(c)).sum();
    units * font_size / 1000.0
}

// Helvetica AFM widths, codes 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

// Times-Roman AFM widths, codes 32..=126.
const TIMES_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, // 32-47
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, // 48-63
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, // 64-79
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500, // 80-95
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, // 96-111
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541, // 112-126
];
