//! Evaluation of parsed queries against a table

use std::cmp::Ordering;

use super::{CmpOp, Expr, ExprError, Literal, Operand, Query};
use crate::tabular::table::DataTable;

/// A resolved operand value for one row
#[derive(Debug, Clone, PartialEq)]
enum Scalar<'a> {
    Null,
    /// Raw cell text
    Cell(&'a str),
    Text(&'a str),
    Number(f64),
    Bool(bool),
}

impl Scalar<'_> {
    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Cell(s) | Self::Text(s) => s.trim().parse().ok(),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Cell(s) | Self::Text(s) => parse_bool(s),
            Self::Number(n) => Some(*n != 0.0),
            Self::Null => None,
        }
    }

    fn as_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Cell(s) | Self::Text(s) => s.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => !s.is_empty(),
            Self::Cell(s) => {
                let s = s.trim();
                !s.is_empty() && parse_bool(s) != Some(false) && s.parse::<f64>().ok() != Some(0.0)
            }
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "t" | "1" => Some(true),
        "false" | "no" | "n" | "f" | "0" => Some(false),
        _ => None,
    }
}

fn literal_scalar(literal: &Literal) -> Scalar<'_> {
    match literal {
        Literal::Str(s) => Scalar::Text(s),
        Literal::Number(n) => Scalar::Number(*n),
        Literal::Bool(b) => Scalar::Bool(*b),
        Literal::Null => Scalar::Null,
    }
}

fn equals(a: &Scalar<'_>, b: &Scalar<'_>) -> bool {
    match (a, b) {
        (Scalar::Null, Scalar::Null) => true,
        (Scalar::Null, _) | (_, Scalar::Null) => false,
        (Scalar::Number(n), other) | (other, Scalar::Number(n)) => other.as_number() == Some(*n),
        (Scalar::Bool(v), other) | (other, Scalar::Bool(v)) => other.as_bool() == Some(*v),
        (Scalar::Cell(x), Scalar::Cell(y)) => match (a.as_number(), b.as_number()) {
            (Some(m), Some(n)) => m == n,
            _ => x == y,
        },
        // text literals compare exactly
        _ => a.as_text() == b.as_text(),
    }
}

fn ordering(a: &Scalar<'_>, b: &Scalar<'_>) -> Option<Ordering> {
    if matches!(a, Scalar::Null) || matches!(b, Scalar::Null) {
        return None;
    }
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(a.as_text().cmp(&b.as_text())),
    }
}

fn compare(a: &Scalar<'_>, op: CmpOp, b: &Scalar<'_>) -> bool {
    match op {
        CmpOp::Eq => equals(a, b),
        CmpOp::Ne => !equals(a, b),
        CmpOp::Lt => ordering(a, b) == Some(Ordering::Less),
        CmpOp::Le => matches!(ordering(a, b), Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ordering(a, b) == Some(Ordering::Greater),
        CmpOp::Ge => matches!(ordering(a, b), Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::Contains | CmpOp::StartsWith | CmpOp::EndsWith => {
            if matches!(a, Scalar::Null) || matches!(b, Scalar::Null) {
                return false;
            }
            let haystack = a.as_text().to_lowercase();
            let needle = b.as_text().to_lowercase();
            match op {
                CmpOp::Contains => haystack.contains(&needle),
                CmpOp::StartsWith => haystack.starts_with(&needle),
                _ => haystack.ends_with(&needle),
            }
        }
    }
}

struct RowContext<'t> {
    table: &'t DataTable,
    row: usize,
}

impl<'t> RowContext<'t> {
    fn scalar<'e>(&self, operand: &'e Operand) -> Scalar<'e>
    where
        't: 'e,
    {
        match operand {
            Operand::Literal(literal) => literal_scalar(literal),
            Operand::Column(name) => {
                let table: &'t DataTable = self.table;
                // columns are validated before evaluation
                let index = table.column_index(name).unwrap_or(0);
                let cell = table.rows()[self.row][index].as_str();
                if cell.trim().is_empty() {
                    Scalar::Null
                } else {
                    Scalar::Cell(cell)
                }
            }
        }
    }

    fn eval(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Or(a, b) => self.eval(a) || self.eval(b),
            Expr::And(a, b) => self.eval(a) && self.eval(b),
            Expr::Not(inner) => !self.eval(inner),
            Expr::Compare { left, op, right } => {
                compare(&self.scalar(left), *op, &self.scalar(right))
            }
            Expr::In { operand, list } => {
                let value = self.scalar(operand);
                list.iter().any(|item| equals(&value, &literal_scalar(item)))
            }
            Expr::IsNull { operand, negated } => {
                matches!(self.scalar(operand), Scalar::Null) != *negated
            }
            Expr::Truthy(operand) => self.scalar(operand).truthy(),
        }
    }
}

/// Evaluate `query` against `table`: filter rows, then project selected columns.
///
/// Referencing a column that is not in the table is an error.
pub fn apply(query: &Query, table: &DataTable) -> Result<DataTable, ExprError> {
    for column in query.referenced_columns() {
        if table.column_index(column).is_none() {
            return Err(ExprError::UnknownColumn(column.to_string()));
        }
    }

    let filtered = match &query.filter {
        Some(expr) => table.filter_rows(|row| RowContext { table, row }.eval(expr)),
        None => table.clone(),
    };

    match &query.select {
        Some(columns) => {
            let indices: Vec<usize> = columns
                .iter()
                .filter_map(|c| filtered.column_index(c))
                .collect();
            Ok(filtered.project(&indices))
        }
        None => Ok(filtered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::expr::parse_query;

    fn table() -> DataTable {
        DataTable::from_csv_bytes(
            b"Name,Status,Count,Issue Date,Active\n\
              Alpha,Open,3,2024-01-05,true\n\
              Beta,Closed,,2023-11-30,false\n\
              Gamma,open,12,2024-03-01,yes\n\
              Delta,Open,7,,0\n",
        )
        .unwrap()
    }

    fn names(query: &str) -> Vec<String> {
        let table = table();
        let result = apply(&parse_query(query).unwrap(), &table).unwrap();
        let index = result.column_index("Name").unwrap();
        result.rows().iter().map(|r| r[index].clone()).collect()
    }

    #[test]
    fn test_text_equality_is_exact() {
        assert_eq!(names("WHERE Status == 'Open'"), vec!["Alpha", "Delta"]);
        assert_eq!(names("WHERE Status != 'Open'"), vec!["Beta", "Gamma"]);
        assert_eq!(names("WHERE Status IN ('Closed', 'open')"), vec!["Beta", "Gamma"]);
    }

    #[test]
    fn test_substring_operators_ignore_case() {
        assert_eq!(names("WHERE Status CONTAINS 'OPEN'"), vec!["Alpha", "Gamma", "Delta"]);
        assert_eq!(
            names("WHERE Name startswith 'g' OR Name ENDSWITH 'TA'"),
            vec!["Beta", "Gamma", "Delta"]
        );
    }

    #[test]
    fn test_numeric_and_lexicographic_ordering() {
        // numeric: 12 > 7 even though "12" < "7" as text
        assert_eq!(names("WHERE Count > 5"), vec!["Gamma", "Delta"]);
        assert_eq!(names("WHERE Count <= 3"), vec!["Alpha"]);
        assert_eq!(names("WHERE `Issue Date` >= '2024-01-01'"), vec!["Alpha", "Gamma"]);
    }

    #[test]
    fn test_nulls_and_truthiness() {
        assert_eq!(names("WHERE Count IS NULL"), vec!["Beta"]);
        assert_eq!(names("WHERE [Issue Date] IS NOT NULL AND Active"), vec!["Alpha", "Gamma"]);
        assert_eq!(names("WHERE NOT Active"), vec!["Beta", "Delta"]);
        assert_eq!(names("WHERE Active == TRUE"), vec!["Alpha", "Gamma"]);
    }

    #[test]
    fn test_select_single_column() {
        let table = table();
        let result = apply(&parse_query("SELECT Name WHERE Count > 5").unwrap(), &table).unwrap();

        assert_eq!(result.columns(), &["Name"]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_unknown_column_is_an_error() {
        let table = table();
        assert_eq!(
            apply(&parse_query("WHERE Colour == 'red'").unwrap(), &table),
            Err(ExprError::UnknownColumn("Colour".to_string()))
        );
        assert!(apply(&parse_query("SELECT Name, Missing").unwrap(), &table).is_err());
    }
}
