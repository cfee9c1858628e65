//! Flattening rich records into display/export rows

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::record::value_to_text;
use crate::types::{FieldValue, RichAnswer, RichRecord, FILENAME_COLUMN};

/// Column -> bare value, with `filename` as the last key
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatRecord(IndexMap<String, Value>);

impl FlatRecord {
    /// Flatten an arbitrary mapping. Rich-answer objects collapse to their
    /// answer; a `filename` key is moved to the end. Already-flat input comes
    /// back unchanged.
    pub fn from_map(map: IndexMap<String, Value>) -> Self {
        let mut flat = IndexMap::with_capacity(map.len());
        let mut filename = None;

        for (key, value) in map {
            if key == FILENAME_COLUMN {
                filename = Some(value);
                continue;
            }
            flat.insert(key, flatten_json(value));
        }
        if let Some(filename) = filename {
            flat.insert(FILENAME_COLUMN.to_string(), filename);
        }
        Self(flat)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Cell text for a column; missing and null cells are empty
    pub fn cell(&self, column: &str) -> String {
        self.0.get(column).map(value_to_text).unwrap_or_default()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }
}

fn flatten_json(value: Value) -> Value {
    match &value {
        Value::Object(obj) => match RichAnswer::from_object(obj) {
            Some(rich) => Value::String(rich.answer),
            None => value,
        },
        _ => value,
    }
}

/// Bare value of a field: the answer for rich values, the raw value otherwise
pub fn flatten_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Rich(rich) => Value::String(rich.answer.clone()),
        FieldValue::Plain(value) => value.clone(),
    }
}

pub fn flatten_record(record: &RichRecord) -> FlatRecord {
    let mut flat: IndexMap<String, Value> = record
        .fields
        .iter()
        .map(|(column, value)| (column.clone(), flatten_value(value)))
        .collect();
    flat.insert(
        FILENAME_COLUMN.to_string(),
        Value::String(record.filename.clone()),
    );
    FlatRecord(flat)
}

pub fn flatten_records(records: &[RichRecord]) -> Vec<FlatRecord> {
    records.iter().map(flatten_record).collect()
}
