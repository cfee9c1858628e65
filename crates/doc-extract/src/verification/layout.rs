//! Character layout of a PDF page

use lopdf::Document;
use pdf_extract::{MediaBox, OutputDev, OutputError, Transform};
use serde::Serialize;

use crate::error::{Error, Result};

/// One positioned glyph, in top-left page coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlyphBox {
    pub text: String,
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
    pub bottom: f64,
}

impl GlyphBox {
    fn size(&self) -> f64 {
        self.bottom - self.top
    }

    fn is_space(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }
}

/// A run of glyphs on one baseline without a visible gap
#[derive(Debug, Clone)]
pub struct Word {
    /// Indices into `PageLayout::glyphs`
    pub glyphs: Vec<usize>,
    /// Starts a new line
    pub line_start: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub page_number: u32,
    pub width: f64,
    pub height: f64,
    pub glyphs: Vec<GlyphBox>,
}

/// Page text plus, for every byte, the glyph it came from
pub(crate) struct PageText {
    pub text: String,
    pub owners: Vec<Option<usize>>,
}

impl PageLayout {
    /// Group glyphs into words by whitespace, baseline changes and horizontal gaps
    pub fn words(&self) -> Vec<Word> {
        let mut words: Vec<Word> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut line_start = true;
        let mut prev: Option<&GlyphBox> = None;

        for (index, glyph) in self.glyphs.iter().enumerate() {
            if glyph.is_space() {
                if !current.is_empty() {
                    words.push(Word {
                        glyphs: std::mem::take(&mut current),
                        line_start,
                    });
                    line_start = false;
                }
                continue;
            }

            if let Some(prev) = prev {
                let tolerance = prev.size().max(glyph.size()).max(1.0);
                let new_line = (glyph.bottom - prev.bottom).abs() > tolerance * 0.5
                    || glyph.x0 + tolerance < prev.x0;
                let gap = glyph.x0 - prev.x1 > tolerance * 0.25;

                if (new_line || gap) && !current.is_empty() {
                    words.push(Word {
                        glyphs: std::mem::take(&mut current),
                        line_start,
                    });
                    line_start = false;
                }
                if new_line {
                    line_start = true;
                }
            }

            current.push(index);
            prev = Some(glyph);
        }

        if !current.is_empty() {
            words.push(Word {
                glyphs: current,
                line_start,
            });
        }
        words
    }

    /// Words joined by spaces, lines by newlines
    pub(crate) fn text(&self) -> PageText {
        let mut text = String::new();
        let mut owners = Vec::new();

        for (i, word) in self.words().into_iter().enumerate() {
            if i > 0 {
                let sep = if word.line_start { '\n' } else { ' ' };
                text.push(sep);
                owners.push(None);
            }
            for index in word.glyphs {
                let glyph = &self.glyphs[index];
                text.push_str(&glyph.text);
                owners.extend(std::iter::repeat(Some(index)).take(glyph.text.len()));
            }
        }

        PageText { text, owners }
    }
}

/// Collects glyph boxes for a single page
struct LayoutCollector {
    target: u32,
    on_target: bool,
    page: PageLayout,
}

impl OutputDev for LayoutCollector {
    fn begin_page(
        &mut self,
        page_num: u32,
        media_box: &MediaBox,
        _art_box: Option<(f64, f64, f64, f64)>,
    ) -> std::result::Result<(), OutputError> {
        self.on_target = page_num == self.target;
        if self.on_target {
            self.page.page_number = page_num;
            self.page.width = media_box.urx - media_box.llx;
            self.page.height = media_box.ury - media_box.lly;
        }
        Ok(())
    }

    fn end_page(&mut self) -> std::result::Result<(), OutputError> {
        self.on_target = false;
        Ok(())
    }

    fn output_character(
        &mut self,
        trm: &Transform,
        width: f64,
        _spacing: f64,
        font_size: f64,
        char: &str,
    ) -> std::result::Result<(), OutputError> {
        if !self.on_target || char.is_empty() {
            return Ok(());
        }

        let scale = (trm.m11 * trm.m22 - trm.m12 * trm.m21).abs().sqrt();
        let size = font_size * scale;
        let x0 = trm.m31;
        // flip to top-left origin
        let baseline = self.page.height - trm.m32;

        self.page.glyphs.push(GlyphBox {
            text: char.to_string(),
            x0,
            x1: x0 + width * size,
            top: baseline - size,
            bottom: baseline,
        });
        Ok(())
    }

    fn begin_word(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }

    fn end_word(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }

    fn end_line(&mut self) -> std::result::Result<(), OutputError> {
        Ok(())
    }
}

/// Number of pages in a PDF
pub fn page_count(data: &[u8]) -> Result<usize> {
    let doc = load(data)?;
    Ok(doc.get_pages().len())
}

fn load(data: &[u8]) -> Result<Document> {
    Document::load_mem(data)
        .map_err(|e| Error::file_parse("document.pdf", format!("Failed to load PDF: {}", e)))
}

/// Character layout of one page (1-indexed). `None` when the page does not exist.
pub fn page_layout(data: &[u8], page_number: u32) -> Result<Option<PageLayout>> {
    let doc = load(data)?;
    if !doc.get_pages().contains_key(&page_number) {
        return Ok(None);
    }

    let mut collector = LayoutCollector {
        target: page_number,
        on_target: false,
        page: PageLayout::default(),
    };
    pdf_extract::output_doc(&doc, &mut collector).map_err(|e| {
        Error::file_parse("document.pdf", format!("Failed to read page layout: {}", e))
    })?;

    tracing::debug!(
        "Page {} layout: {} glyphs",
        page_number,
        collector.page.glyphs.len()
    );
    Ok(Some(collector.page))
}
