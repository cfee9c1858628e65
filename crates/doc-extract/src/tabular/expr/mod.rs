//! Filter expressions over a `DataTable`
//!
//! Grammar:
//! ```text
//! query      = [ "SELECT" column ("," column)* ] [ "WHERE" expr ]
//! expr       = and_expr ( "OR" and_expr )*
//! and_expr   = unary ( "AND" unary )*
//! unary      = "NOT" unary | "(" expr ")" | comparison
//! comparison = operand ( cmp_op operand | "IN" list | "IS" ["NOT"] "NULL" )?
//! cmp_op     = "==" | "=" | "!=" | "<" | "<=" | ">" | ">=" | "CONTAINS"
//!            | "STARTSWITH" | "ENDSWITH"
//! operand    = column | string | number | "TRUE" | "FALSE" | "NULL"
//! column     = identifier | `backticked name` | [bracketed name]
//! list       = "(" literal ("," literal)* ")"
//! ```
//! Keywords are case-insensitive.

pub mod eval;
pub mod lexer;
pub mod parser;

use std::fmt;
use thiserror::Error;

pub use eval::apply;
pub use parser::parse_query;

/// Filter expression errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("Empty expression")]
    Empty,

    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("Unterminated column name starting at position {0}")]
    UnterminatedColumn(usize),

    #[error("Invalid number '{0}' at position {1}")]
    InvalidNumber(String, usize),

    #[error("Expected {expected} at position {pos}, found {found}")]
    Expected {
        expected: String,
        found: String,
        pos: usize,
    },

    #[error("Expression nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("Expression has more than {0} conditions")]
    TooManyConditions(usize),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),
}

impl From<ExprError> for crate::error::Error {
    fn from(e: ExprError) -> Self {
        crate::error::Error::Filter(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Number(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(String),
    Literal(Literal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    In {
        operand: Operand,
        list: Vec<Literal>,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
    /// Bare operand used as a condition
    Truthy(Operand),
}

/// A parsed query: optional projection and optional row filter
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub select: Option<Vec<String>>,
    pub filter: Option<Expr>,
}

impl Query {
    /// Every column the query references, in first-use order
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for column in self.select.iter().flatten() {
            push_unique(&mut columns, column);
        }
        if let Some(filter) = &self.filter {
            collect_columns(filter, &mut columns);
        }
        columns
    }
}

fn push_unique<'a>(out: &mut Vec<&'a str>, name: &'a str) {
    if !out.contains(&name) {
        out.push(name);
    }
}

fn collect_operand<'a>(operand: &'a Operand, out: &mut Vec<&'a str>) {
    if let Operand::Column(name) = operand {
        push_unique(out, name);
    }
}

fn collect_columns<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Or(a, b) | Expr::And(a, b) => {
            collect_columns(a, out);
            collect_columns(b, out);
        }
        Expr::Not(inner) => collect_columns(inner, out),
        Expr::Compare { left, right, .. } => {
            collect_operand(left, out);
            collect_operand(right, out);
        }
        Expr::In { operand, .. } | Expr::IsNull { operand, .. } | Expr::Truthy(operand) => {
            collect_operand(operand, out)
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Contains => "CONTAINS",
            Self::StartsWith => "STARTSWITH",
            Self::EndsWith => "ENDSWITH",
        };
        f.write_str(s)
    }
}
