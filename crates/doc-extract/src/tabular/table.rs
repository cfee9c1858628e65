//! In-memory CSV table with inferred column types

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Inferred type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Text => "text",
        }
    }

    fn infer<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut seen = false;
        let (mut integer, mut float, mut boolean) = (true, true, true);

        for cell in cells.map(str::trim).filter(|c| !c.is_empty()) {
            seen = true;
            integer &= cell.parse::<i64>().is_ok();
            float &= cell.parse::<f64>().is_ok();
            boolean &= cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false");
        }

        match (seen, integer, float, boolean) {
            (false, ..) => Self::Text,
            (true, true, ..) => Self::Integer,
            (true, _, true, _) => Self::Float,
            (true, _, _, true) => Self::Boolean,
            _ => Self::Text,
        }
    }
}

/// Ordered columns and rows of string cells; an empty cell is null
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataTable {
    columns: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<String>>,
}

impl DataTable {
    /// Build a table; short rows are padded and long rows truncated to the header width
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();

        let types = (0..width)
            .map(|i| ColumnType::infer(rows.iter().map(|r| r[i].as_str())))
            .collect();

        Self {
            columns,
            types,
            rows,
        }
    }

    /// Table with no rows and no columns
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.iter().all(|c| c.is_empty()) {
            return Err(Error::file_parse("upload.csv", "CSV has no header row"));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::new(columns, rows))
    }

    pub fn from_csv_bytes(data: &[u8]) -> Result<Self> {
        Self::from_csv_reader(data)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn types(&self) -> &[ColumnType] {
        &self.types
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_type(&self, index: usize) -> ColumnType {
        self.types.get(index).copied().unwrap_or(ColumnType::Text)
    }

    /// One `column: type` line per column
    pub fn dtypes_summary(&self) -> String {
        self.columns
            .iter()
            .zip(&self.types)
            .map(|(c, t)| format!("{}: {}", c, t.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First `n` rows as a markdown table
    pub fn head_markdown(&self, n: usize) -> String {
        let escape = |s: &str| s.replace('|', "\\|").replace('\n', " ");

        let mut out = format!(
            "| {} |\n|{}|\n",
            self.columns.iter().map(|c| escape(c)).collect::<Vec<_>>().join(" | "),
            vec!["---"; self.columns.len()].join("|")
        );
        for row in self.rows.iter().take(n) {
            out.push_str(&format!(
                "| {} |\n",
                row.iter().map(|c| escape(c)).collect::<Vec<_>>().join(" | ")
            ));
        }
        out
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::internal(format!("CSV output not UTF-8: {}", e)))
    }

    /// Keep rows whose index passes `keep`
    pub fn filter_rows(&self, keep: impl Fn(usize) -> bool) -> Self {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| keep(*i))
            .map(|(_, row)| row.clone())
            .collect();
        Self::new(self.columns.clone(), rows)
    }

    /// Project onto existing column indices, in the given order
    pub fn project(&self, indices: &[usize]) -> Self {
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Self::new(columns, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Name,Status,Count,Score,Active\n\
                          Alpha,Open,3,1.5,true\n\
                          Beta,Closed,,2,false\n\
                          Gamma,Open,7,x,TRUE\n";

    #[test]
    fn test_parse_and_infer_types() {
        let table = DataTable::from_csv_bytes(SAMPLE.as_bytes()).unwrap();

        assert_eq!(table.columns(), &["Name", "Status", "Count", "Score", "Active"]);
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.types(),
            &[
                ColumnType::Text,
                ColumnType::Text,
                ColumnType::Integer,
                ColumnType::Text,
                ColumnType::Boolean
            ]
        );
        assert_eq!(table.rows()[1][2], "");
        assert!(table.dtypes_summary().contains("Count: integer"));
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let table = DataTable::from_csv_bytes(b"a,b\n1\n2,3,4\n").unwrap();
        assert_eq!(table.rows()[0], vec!["1", ""]);
        assert_eq!(table.rows()[1], vec!["2", "3"]);
    }

    #[test]
    fn test_head_markdown() {
        let table = DataTable::from_csv_bytes(SAMPLE.as_bytes()).unwrap();
        let md = table.head_markdown(1);
        let lines: Vec<&str> = md.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "| Name | Status | Count | Score | Active |");
        assert_eq!(lines[2], "| Alpha | Open | 3 | 1.5 | true |");
    }

    #[test]
    fn test_csv_output_and_projection() {
        let table = DataTable::from_csv_bytes(SAMPLE.as_bytes()).unwrap();
        let open = table
            .filter_rows(|i| table.rows()[i][1] == "Open")
            .project(&[0]);

        assert_eq!(open.to_csv_string().unwrap(), "Name\nAlpha\nGamma\n");
    }
}
