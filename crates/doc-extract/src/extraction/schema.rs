//! Structured-output schema construction

use serde_json::{json, Map, Value};

use crate::types::Schema;

/// Output shape requested from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// One object per document
    Single,
    /// An array of objects, one per record found
    Multi,
}

/// Build the provider schema: each column is an object with required
/// `answer`, `source_quote` and `page_number` sub-fields.
pub fn build_response_schema(schema: &Schema, mode: ExtractMode) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::with_capacity(schema.len());

    for (column, question) in schema.iter() {
        properties.insert(
            column.to_string(),
            json!({
                "type": "OBJECT",
                "properties": {
                    "answer": {"type": "STRING", "description": question},
                    "source_quote": {"type": "STRING", "description": "Exact substring from text."},
                    "page_number": {"type": "INTEGER", "description": "1-indexed page number."}
                },
                "required": ["answer", "source_quote", "page_number"]
            }),
        );
        required.push(Value::String(column.to_string()));
    }

    let object = json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    });

    match mode {
        ExtractMode::Single => object,
        ExtractMode::Multi => json!({"type": "ARRAY", "items": object}),
    }
}
