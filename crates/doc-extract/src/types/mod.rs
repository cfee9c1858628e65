//! Core types for schemas, sections and extracted records

pub mod record;
pub mod schema;
pub mod section;

pub use record::{FieldValue, RichAnswer, RichRecord, ERROR_MARKER, FILENAME_COLUMN};
pub use schema::{Schema, SchemaField};
pub use section::Section;
