//! Splitting merged multi-value records into aligned rows

use crate::types::{FieldValue, RichAnswer, RichRecord};

fn split_segments(text: &str) -> Vec<String> {
    let segments: Vec<String> = text
        .split(|c| c == ';' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if segments.is_empty() {
        vec![String::new()]
    } else {
        segments
    }
}

struct ColumnSegments<'a> {
    column: &'a str,
    source: Option<&'a RichAnswer>,
    segments: Vec<String>,
}

impl ColumnSegments<'_> {
    /// Segment for row `i`; shorter columns repeat their last segment
    fn value_at(&self, i: usize) -> FieldValue {
        let last = self.segments.len() - 1;
        let segment = self.segments[i.min(last)].clone();
        match self.source {
            Some(rich) => FieldValue::Rich(RichAnswer {
                answer: segment,
                ..rich.clone()
            }),
            None => FieldValue::plain(segment),
        }
    }
}

/// Expand one merged record into one record per enumerated entity.
///
/// Split columns are broken on `;` or newline; other columns keep a single
/// trimmed segment. Always yields at least one record.
pub fn expand(
    record: &RichRecord,
    column_names: &[String],
    split_columns: &[String],
    filename: &str,
) -> Vec<RichRecord> {
    let columns: Vec<ColumnSegments<'_>> = column_names
        .iter()
        .map(|column| {
            let value = record.get(column);
            let text = value.map(FieldValue::answer_text).unwrap_or_default();
            let segments = if split_columns.iter().any(|c| c == column) {
                split_segments(&text)
            } else {
                vec![text.trim().to_string()]
            };
            ColumnSegments {
                column,
                source: value.and_then(FieldValue::as_rich),
                segments,
            }
        })
        .collect();

    let rows = columns
        .iter()
        .map(|c| c.segments.len())
        .max()
        .unwrap_or(1)
        .max(1);

    if rows > 1 {
        tracing::debug!("Expanded merged record from {} into {} rows", filename, rows);
    }

    (0..rows)
        .map(|i| {
            let mut row = RichRecord::new(filename);
            for column in &columns {
                row.insert(column.column, column.value_at(i));
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::flatten::flatten_record;
    use proptest::prelude::*;

    fn names(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_split_segments() {
        assert_eq!(split_segments("A; B\nC"), vec!["A", "B", "C"]);
        assert_eq!(split_segments(" ;\n ; "), vec![""]);
        assert_eq!(split_segments(""), vec![""]);
    }

    #[test]
    fn test_expand_repeats_last_segment() {
        let mut record = RichRecord::new("audit.pdf");
        record.insert(
            "NC number",
            FieldValue::Rich(RichAnswer::new("NC-1; NC-2; NC-3", "NC-1 NC-2 NC-3", 4)),
        );
        record.insert("Grade", FieldValue::plain("Minor"));
        record.insert("Scope Definition", FieldValue::plain(" first; still one value "));

        let rows = expand(
            &record,
            &names(&["NC number", "Grade", "Scope Definition"]),
            &names(&["NC number", "Grade"]),
            "audit.pdf",
        );

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[2].get("NC number"),
            Some(&FieldValue::Rich(RichAnswer::new("NC-3", "NC-1 NC-2 NC-3", 4)))
        );
        for row in &rows {
            assert_eq!(row.filename, "audit.pdf");
            assert_eq!(row.get("Grade"), Some(&FieldValue::plain("Minor")));
            assert_eq!(
                row.get("Scope Definition"),
                Some(&FieldValue::plain("first; still one value"))
            );
        }
    }

    #[test]
    fn test_expand_missing_columns_yield_single_blank_row() {
        let record = RichRecord::new("empty.pdf");
        let rows = expand(&record, &names(&["A", "B"]), &names(&["A"]), "empty.pdf");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("A"), Some(&FieldValue::plain("")));
        assert_eq!(rows[0].get("B"), Some(&FieldValue::plain("")));
    }

    proptest! {
        #[test]
        fn prop_single_segment_record_is_unchanged(
            values in proptest::collection::vec("[A-Za-z0-9]([A-Za-z0-9 ]{0,10}[A-Za-z0-9])?", 1..6)
        ) {
            let columns: Vec<String> = (0..values.len()).map(|i| format!("col{}", i)).collect();
            let mut record = RichRecord::new("f.pdf");
            for (column, value) in columns.iter().zip(&values) {
                record.insert(column.as_str(), FieldValue::plain(value.as_str()));
            }

            let rows = expand(&record, &columns, &columns, "f.pdf");
            prop_assert_eq!(rows.len(), 1);
            prop_assert_eq!(flatten_record(&rows[0]), flatten_record(&record));
        }

        #[test]
        fn prop_row_count_is_max_segment_count(a in 1usize..6, b in 1usize..6) {
            let joined = |n: usize| (0..n).map(|i| format!("v{}", i)).collect::<Vec<_>>().join(";");
            let mut record = RichRecord::new("f.pdf");
            record.insert("A", FieldValue::plain(joined(a)));
            record.insert("B", FieldValue::plain(joined(b)));

            let columns = names(&["A", "B"]);
            let rows = expand(&record, &columns, &columns, "f.pdf");
            prop_assert_eq!(rows.len(), a.max(b));

            let last_b = format!("v{}", b - 1);
            prop_assert_eq!(rows.last().unwrap().get("B").unwrap().answer_text(), last_b);
        }
    }
}
