//! doc-extract: LLM-backed structured extraction from PDF reports
//!
//! Every extracted value carries the quote and page it came from, so a
//! reviewer can jump to the highlighted source. Merged multi-value section
//! answers are expanded into one row per record. Extracted (or any other)
//! CSV data can then be narrowed with natural-language filters that the
//! model turns into a small, safely interpreted expression language.

pub mod config;
pub mod error;
pub mod export;
pub mod extraction;
pub mod ingestion;
pub mod providers;
pub mod server;
pub mod session;
pub mod tabular;
pub mod testing;
pub mod types;
pub mod verification;

pub use config::ExtractorConfig;
pub use error::{Error, Result};
pub use extraction::{ExtractionPlan, ExtractionResults, Extractor, Orchestrator};
pub use tabular::{CsvSession, DataTable, QueryEngine};
pub use types::{FieldValue, RichAnswer, RichRecord, Schema, SchemaField, Section};
pub use verification::Verification;
