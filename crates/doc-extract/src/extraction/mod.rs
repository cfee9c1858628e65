//! Structured extraction: provider schemas, response decoding, expansion and batch runs

pub mod expansion;
pub mod extractor;
pub mod flatten;
pub mod orchestrator;
pub mod prompts;
pub mod response;
pub mod schema;

pub use expansion::expand;
pub use extractor::{ExtractionOutput, Extractor};
pub use flatten::{flatten_record, flatten_records, flatten_value, FlatRecord};
pub use orchestrator::{
    BatchObserver, DocumentError, DocumentProgress, ExtractionPlan, ExtractionResults,
    Orchestrator, PlannedSection,
};
pub use schema::{build_response_schema, ExtractMode};
