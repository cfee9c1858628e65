//! CSV export of extracted tables

use std::io::Write;

use crate::error::{Error, Result};
use crate::extraction::flatten_record;
use crate::types::{RichRecord, FILENAME_COLUMN};

/// Write records as CSV: schema columns in order, then `filename`.
///
/// Rich values are flattened to their answer; plain non-string values are
/// written as JSON text and nulls as empty cells.
pub fn write_records_csv<W: Write>(writer: W, columns: &[String], records: &[RichRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = columns.iter().map(String::as_str).collect();
    header.push(FILENAME_COLUMN);
    writer.write_record(&header)?;

    for record in records {
        let flat = flatten_record(record);
        let row: Vec<String> = header.iter().map(|column| flat.cell(column)).collect();
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn records_to_csv(columns: &[String], records: &[RichRecord]) -> Result<String> {
    let mut buf = Vec::new();
    write_records_csv(&mut buf, columns, records)?;
    String::from_utf8(buf).map_err(|e| Error::internal(format!("CSV output not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldValue, RichAnswer};
    use serde_json::json;

    #[test]
    fn test_export_layout() {
        let mut first = RichRecord::new("report.pdf");
        first.insert("Status", FieldValue::Rich(RichAnswer::new("Open", "Status: Open", 2)));
        first.insert("Count", FieldValue::Plain(json!(3)));

        let mut second = RichRecord::new("other, inc.pdf");
        second.insert("Status", FieldValue::Plain(serde_json::Value::Null));

        let csv = records_to_csv(
            &["Status".to_string(), "Count".to_string()],
            &[first, second],
        )
        .unwrap();

        assert_eq!(
            csv,
            "Status,Count,filename\nOpen,3,report.pdf\n,,\"other, inc.pdf\"\n"
        );
    }

    #[test]
    fn test_export_empty_table_has_header() {
        let csv = records_to_csv(&["A".to_string()], &[]).unwrap();
        assert_eq!(csv, "A,filename\n");
    }
}
