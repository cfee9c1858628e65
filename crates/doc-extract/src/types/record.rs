//! Extracted records with per-field provenance

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Column holding the source document name in every record
pub const FILENAME_COLUMN: &str = "filename";

/// Marker written into every requested column when a document fails
pub const ERROR_MARKER: &str = "Error";

/// One extracted value with the quote and page that justify it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichAnswer {
    pub answer: String,
    /// Exact substring expected to appear verbatim in the document
    pub source_quote: String,
    /// 1-indexed page number
    pub page_number: u32,
}

impl RichAnswer {
    pub fn new(answer: impl Into<String>, source_quote: impl Into<String>, page_number: u32) -> Self {
        Self {
            answer: answer.into(),
            source_quote: source_quote.into(),
            page_number: page_number.max(1),
        }
    }

    /// Decode a model-produced answer object.
    ///
    /// Returns `None` unless the object carries an `answer` key. Missing or
    /// odd-typed sub-fields are coerced: null answer to "", missing quote to
    /// "", unparseable or missing page to 1.
    pub fn from_object(obj: &Map<String, Value>) -> Option<Self> {
        let answer = obj.get("answer")?;
        let answer = match answer {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let source_quote = match obj.get("source_quote") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let page_number = match obj.get("page_number") {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(1),
            Some(Value::String(s)) => s.trim().parse::<u64>().unwrap_or(1),
            _ => 1,
        };

        Some(Self::new(
            answer,
            source_quote,
            u32::try_from(page_number).unwrap_or(u32::MAX),
        ))
    }
}

/// A record field: either a rich answer or whatever plain value the model gave
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Rich(RichAnswer),
    Plain(Value),
}

impl FieldValue {
    /// Plain string value
    pub fn plain(value: impl Into<String>) -> Self {
        Self::Plain(Value::String(value.into()))
    }

    /// Classify a raw JSON value
    pub fn from_json(value: Value) -> Self {
        if let Value::Object(obj) = &value {
            if let Some(rich) = RichAnswer::from_object(obj) {
                return Self::Rich(rich);
            }
        }
        Self::Plain(value)
    }

    pub fn as_rich(&self) -> Option<&RichAnswer> {
        match self {
            Self::Rich(rich) => Some(rich),
            Self::Plain(_) => None,
        }
    }

    /// Answer as text: the rich answer, a plain string, "" for null, JSON text otherwise
    pub fn answer_text(&self) -> String {
        match self {
            Self::Rich(rich) => rich.answer.clone(),
            Self::Plain(value) => value_to_text(value),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(FieldValue::from_json)
    }
}

/// Render a JSON value the way it appears in a table cell
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One extracted entity tagged with its source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichRecord {
    pub filename: String,
    pub fields: IndexMap<String, FieldValue>,
}

impl RichRecord {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            fields: IndexMap::new(),
        }
    }

    /// Record with the error marker in every requested column
    pub fn error<'a>(columns: impl IntoIterator<Item = &'a str>, filename: impl Into<String>) -> Self {
        let mut record = Self::new(filename);
        for column in columns {
            record.insert(column, FieldValue::plain(ERROR_MARKER));
        }
        record
    }

    /// Build from a model-produced object. A `filename` key from the model is dropped.
    pub fn from_object(obj: Map<String, Value>, filename: impl Into<String>) -> Self {
        let mut record = Self::new(filename);
        for (key, value) in obj {
            if key == FILENAME_COLUMN {
                continue;
            }
            record.fields.insert(key, FieldValue::from_json(value));
        }
        record
    }

    pub fn insert(&mut self, column: impl Into<String>, value: FieldValue) {
        self.fields.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// True when every field is the error marker
    pub fn is_error(&self) -> bool {
        !self.fields.is_empty()
            && self.fields.values().all(|v| {
                matches!(v, FieldValue::Plain(Value::String(s)) if s == ERROR_MARKER)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rich_answer_coercion() {
        let value = json!({"answer": null, "page_number": "3"});
        let rich = RichAnswer::from_object(value.as_object().unwrap()).unwrap();
        assert_eq!(rich, RichAnswer::new("", "", 3));

        let value = json!({"answer": 42, "source_quote": "total 42", "page_number": 0});
        let rich = RichAnswer::from_object(value.as_object().unwrap()).unwrap();
        assert_eq!(rich.answer, "42");
        assert_eq!(rich.page_number, 1);

        let value = json!({"quote": "no answer key"});
        assert!(RichAnswer::from_object(value.as_object().unwrap()).is_none());
    }

    #[test]
    fn test_record_from_object_drops_model_filename() {
        let obj = json!({
            "Status": {"answer": "Open", "source_quote": "Status: Open", "page_number": 2},
            "Note": "plain",
            "filename": "invented.pdf"
        });
        let record = RichRecord::from_object(obj.as_object().unwrap().clone(), "report.pdf");

        assert_eq!(record.filename, "report.pdf");
        assert_eq!(record.fields.len(), 2);
        assert_eq!(
            record.get("Status").and_then(FieldValue::as_rich),
            Some(&RichAnswer::new("Open", "Status: Open", 2))
        );
        assert_eq!(record.get("Note").unwrap().answer_text(), "plain");
    }

    #[test]
    fn test_error_record() {
        let record = RichRecord::error(["A", "B"], "bad.pdf");
        assert!(record.is_error());
        assert_eq!(record.get("B").unwrap().answer_text(), ERROR_MARKER);
        assert!(!RichRecord::new("empty.pdf").is_error());
    }

    #[test]
    fn test_field_value_serde_round_trip() {
        let record = RichRecord::from_object(
            json!({"A": {"answer": "x", "source_quote": "x", "page_number": 1}, "B": null})
                .as_object()
                .unwrap()
                .clone(),
            "f.pdf",
        );
        let text = serde_json::to_string(&record).unwrap();
        let back: RichRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
    }
}
