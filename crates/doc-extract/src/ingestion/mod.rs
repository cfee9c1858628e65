//! Document ingestion: upload validation and on-disk staging

mod staging;

pub use staging::{SourceDocument, StagedDocument};
