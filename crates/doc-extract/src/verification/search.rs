//! Locating a quote on a page and building highlight rectangles

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::layout::PageLayout;

/// Padding around the matched characters, in points
const PADDING: f64 = 2.0;

/// Highlight rectangle in top-left page coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
    pub opacity: f32,
}

impl Highlight {
    /// True when the rectangle fully covers the given box
    pub fn contains(&self, x0: f64, top: f64, x1: f64, bottom: f64) -> bool {
        self.x <= x0 && self.y <= top && self.x + self.width >= x1 && self.y + self.height >= bottom
    }
}

/// Case-insensitive pattern where any whitespace in the quote matches any whitespace run
pub fn quote_pattern(quote: &str) -> Option<Regex> {
    let words: Vec<String> = quote.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }

    RegexBuilder::new(&words.join(r"\s+"))
        .case_insensitive(true)
        .build()
        .ok()
}

/// One rectangle per occurrence of `quote` on the page
pub fn find_quote(layout: &PageLayout, quote: &str) -> Vec<Highlight> {
    let pattern = match quote_pattern(quote) {
        Some(pattern) => pattern,
        None => return Vec::new(),
    };

    let page_text = layout.text();
    let mut highlights = Vec::new();

    for found in pattern.find_iter(&page_text.text) {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;

        for owner in page_text.owners[found.start()..found.end()].iter().flatten() {
            let glyph = &layout.glyphs[*owner];
            bounds = Some(match bounds {
                None => (glyph.x0, glyph.top, glyph.x1, glyph.bottom),
                Some((x0, top, x1, bottom)) => (
                    x0.min(glyph.x0),
                    top.min(glyph.top),
                    x1.max(glyph.x1),
                    bottom.max(glyph.bottom),
                ),
            });
        }

        if let Some((x0, top, x1, bottom)) = bounds {
            highlights.push(Highlight {
                page: layout.page_number,
                x: x0 - PADDING,
                y: top - PADDING,
                width: (x1 - x0) + PADDING * 2.0,
                height: (bottom - top) + PADDING * 2.0,
                color: "yellow".to_string(),
                opacity: 0.4,
            });
        }
    }

    highlights
}
