//! Decoding of model output into records

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::RichRecord;

use super::schema::ExtractMode;

fn fence_open() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^```(?:json)?").expect("valid fence regex"))
}

/// Strip optional markdown code fences around a JSON payload
pub fn clean_json_payload(raw: &str) -> &str {
    let payload = raw.trim();
    if !payload.starts_with("```") {
        return payload;
    }

    let without_open = match fence_open().find(payload) {
        Some(m) => &payload[m.end()..],
        None => payload,
    };
    let trimmed = without_open.trim();
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

/// Parse model text into records tagged with `filename`.
///
/// An empty payload means "nothing found". In multi mode a lone object is
/// treated as a one-element array; in single mode an array contributes its
/// first object. Non-object array elements are skipped.
pub fn parse_records(raw: &str, mode: ExtractMode, filename: &str) -> Result<Vec<RichRecord>> {
    let payload = clean_json_payload(raw);
    let value: Value = if payload.is_empty() {
        match mode {
            ExtractMode::Single => Value::Object(Default::default()),
            ExtractMode::Multi => Value::Array(Vec::new()),
        }
    } else {
        serde_json::from_str(payload)
            .map_err(|e| Error::MalformedResponse(format!("{} (payload: {})", e, preview(payload))))?
    };

    let objects = match value {
        Value::Object(obj) => vec![obj],
        Value::Array(items) => {
            let mut objects = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Object(obj) => objects.push(obj),
                    other => tracing::warn!(
                        "Skipping non-object element in response for {}: {}",
                        filename,
                        preview(&other.to_string())
                    ),
                }
            }
            objects
        }
        other => {
            return Err(Error::MalformedResponse(format!(
                "expected a JSON object or array, got {}",
                preview(&other.to_string())
            )))
        }
    };

    let mut records: Vec<RichRecord> = objects
        .into_iter()
        .map(|obj| RichRecord::from_object(obj, filename))
        .collect();

    if mode == ExtractMode::Single {
        match records.len() {
            0 => {
                return Err(Error::MalformedResponse(
                    "array response contained no objects".to_string(),
                ))
            }
            1 => {}
            n => {
                tracing::warn!("Expected one object for {}, got {}; keeping the first", filename, n);
                records.truncate(1);
            }
        }
    }

    Ok(records)
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut end = MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RichAnswer;

    #[test]
    fn test_clean_json_payload() {
        assert_eq!(clean_json_payload("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(clean_json_payload("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(clean_json_payload("```JSON\n[]\n```"), "[]");
        assert_eq!(clean_json_payload("```\n{}\n```"), "{}");
        assert_eq!(clean_json_payload(""), "");
    }

    #[test]
    fn test_parse_single_record() {
        let raw = r#"{"Status": {"answer": "Open", "source_quote": "Status: Open", "page_number": 2}}"#;
        let records = parse_records(raw, ExtractMode::Single, "report.pdf").unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "report.pdf");
        assert_eq!(
            records[0].get("Status").and_then(|v| v.as_rich()),
            Some(&RichAnswer::new("Open", "Status: Open", 2))
        );
    }

    #[test]
    fn test_parse_multi_shapes() {
        let records = parse_records("", ExtractMode::Multi, "a.pdf").unwrap();
        assert!(records.is_empty());

        let records = parse_records(r#"{"A": "x"}"#, ExtractMode::Multi, "a.pdf").unwrap();
        assert_eq!(records.len(), 1);

        let records = parse_records(r#"[{"A": "x"}, 3, {"A": "y"}]"#, ExtractMode::Multi, "a.pdf").unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.filename == "a.pdf"));
    }

    #[test]
    fn test_parse_single_edge_cases() {
        let records = parse_records("", ExtractMode::Single, "a.pdf").unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].fields.is_empty());

        let records = parse_records(r#"[{"A": "x"}, {"A": "y"}]"#, ExtractMode::Single, "a.pdf").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("A").unwrap().answer_text(), "x");

        assert!(parse_records("[]", ExtractMode::Single, "a.pdf").is_err());
        assert!(parse_records("\"just text\"", ExtractMode::Single, "a.pdf").is_err());
        assert!(parse_records("{not json", ExtractMode::Multi, "a.pdf").is_err());
    }
}
