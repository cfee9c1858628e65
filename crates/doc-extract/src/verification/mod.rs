//! Source verification: locate a cited quote on its page and return highlights

pub mod layout;
pub mod search;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::types::{FieldValue, RichRecord};

pub use layout::{page_layout, GlyphBox, PageLayout};
pub use search::{find_quote, Highlight};

/// What the verification view shows for one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub filename: String,
    pub column: String,
    pub answer: String,
    pub source_quote: String,
    pub page_number: u32,
    pub highlights: Vec<Highlight>,
    /// Why no highlight is shown, when none is
    pub notice: Option<String>,
}

impl Verification {
    fn from_record(record: &RichRecord, column: &str) -> Self {
        let (answer, source_quote, page_number) = match record.get(column) {
            Some(FieldValue::Rich(rich)) => {
                (rich.answer.clone(), rich.source_quote.clone(), rich.page_number)
            }
            Some(plain) => (plain.answer_text(), String::new(), 1),
            None => (String::new(), String::new(), 1),
        };

        Self {
            filename: record.filename.clone(),
            column: column.to_string(),
            answer,
            source_quote,
            page_number,
            highlights: Vec::new(),
            notice: None,
        }
    }

    fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }
}

/// Locate the quote behind `record[column]` in the document.
///
/// Never fails: a missing quote, an out-of-range page, an unreadable PDF or
/// no match yields zero highlights and a notice.
pub fn verify_blocking(record: &RichRecord, column: &str, data: &[u8]) -> Verification {
    let verification = Verification::from_record(record, column);

    if record.get(column).is_none() {
        return verification.with_notice(format!("Column '{}' is not in this record", column));
    }
    if verification.source_quote.trim().is_empty() {
        return verification.with_notice("No source quote available for this value.");
    }

    let page_number = verification.page_number;
    let layout = catch_unwind(AssertUnwindSafe(|| page_layout(data, page_number)));

    let layout = match layout {
        Ok(Ok(Some(layout))) => layout,
        Ok(Ok(None)) => {
            let notice = format!("Page {} is not in {}", page_number, verification.filename);
            return verification.with_notice(notice);
        }
        Ok(Err(e)) => {
            tracing::warn!("Verification of {} failed: {}", verification.filename, e);
            return verification.with_notice(format!("Could not read the document: {}", e));
        }
        Err(_) => {
            tracing::warn!("PDF layout analysis panicked for {}", verification.filename);
            return verification.with_notice("Could not analyse the page layout.");
        }
    };

    let highlights = find_quote(&layout, &verification.source_quote);
    if highlights.is_empty() {
        return verification.with_notice(format!(
            "Quote not found on page {}.",
            page_number
        ));
    }

    Verification {
        highlights,
        ..verification
    }
}

/// Async wrapper running layout analysis on the blocking pool
pub async fn verify(record: RichRecord, column: String, data: Bytes) -> Verification {
    let fallback = Verification::from_record(&record, &column);
    match tokio::task::spawn_blocking(move || verify_blocking(&record, &column, &data)).await {
        Ok(verification) => verification,
        Err(e) => {
            tracing::warn!("Verification task failed: {}", e);
            fallback.with_notice("Could not analyse the page layout.")
        }
    }
}
