//! Extraction schemas: ordered (column name, question) pairs

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::types::record::FILENAME_COLUMN;

/// One user-editable schema row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Output column name
    #[serde(alias = "Column Name")]
    pub column_name: String,
    /// Natural-language question the model answers for this column
    #[serde(alias = "Question")]
    pub question: String,
}

impl SchemaField {
    pub fn new(column_name: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            question: question.into(),
        }
    }
}

/// Validated, ordered mapping from column name to question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: IndexMap<String, String>,
}

impl Schema {
    /// Build a schema from editor rows.
    ///
    /// Column names are trimmed. Empty names, duplicates, the reserved
    /// `filename` column and an empty row list are rejected.
    pub fn from_fields(fields: &[SchemaField]) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::InvalidSchema("schema has no columns".to_string()));
        }

        let mut seen = HashSet::new();
        let mut map = IndexMap::with_capacity(fields.len());

        for (row, field) in fields.iter().enumerate() {
            let column = field.column_name.trim();
            if column.is_empty() {
                return Err(Error::InvalidSchema(format!(
                    "row {} has an empty column name",
                    row + 1
                )));
            }
            if column == FILENAME_COLUMN {
                return Err(Error::InvalidSchema(format!(
                    "'{}' is reserved for the source document name",
                    FILENAME_COLUMN
                )));
            }
            if !seen.insert(column.to_string()) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate column name '{}'",
                    column
                )));
            }
            map.insert(column.to_string(), field.question.clone());
        }

        Ok(Self { fields: map })
    }

    /// Column names in schema order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Column names as owned strings
    pub fn column_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// (column, question) pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(c, q)| (c.as_str(), q.as_str()))
    }

    pub fn question(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Back to editor rows
    pub fn to_fields(&self) -> Vec<SchemaField> {
        self.iter().map(|(c, q)| SchemaField::new(c, q)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_preserves_order() {
        let schema = Schema::from_fields(&[
            SchemaField::new("Zeta", "last letter"),
            SchemaField::new("Alpha", "first letter"),
        ])
        .unwrap();

        assert_eq!(schema.column_names(), vec!["Zeta", "Alpha"]);
        assert_eq!(schema.question("Alpha"), Some("first letter"));
    }

    #[test]
    fn test_schema_rejects_bad_columns() {
        assert!(Schema::from_fields(&[]).is_err());
        assert!(Schema::from_fields(&[SchemaField::new("  ", "q")]).is_err());
        assert!(Schema::from_fields(&[SchemaField::new("filename", "q")]).is_err());

        let dup = Schema::from_fields(&[
            SchemaField::new("Status", "a"),
            SchemaField::new(" Status ", "b"),
        ]);
        assert!(matches!(dup, Err(Error::InvalidSchema(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_schema_field_accepts_editor_keys() {
        let field: SchemaField =
            serde_json::from_str(r#"{"Column Name": "Country", "Question": "Country"}"#).unwrap();
        assert_eq!(field, SchemaField::new("Country", "Country"));
    }
}
