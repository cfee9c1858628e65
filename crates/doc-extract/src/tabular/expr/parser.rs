//! Recursive-descent parser for filter expressions

use super::lexer::{tokenize, Spanned, Token};
use super::{CmpOp, Expr, ExprError, Literal, Operand, Query};

const KEYWORDS: &[&str] = &[
    "SELECT", "WHERE", "AND", "OR", "NOT", "IN", "IS", "NULL", "TRUE", "FALSE", "CONTAINS",
    "STARTSWITH", "ENDSWITH",
];

/// Deepest `NOT` / parenthesis nesting accepted
pub const MAX_DEPTH: usize = 64;

/// Most comparisons accepted in one query; bounds the tree the evaluator walks
pub const MAX_CONDITIONS: usize = 256;

/// Parser state
struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    end: usize,
    depth: usize,
    conditions: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|s| &s.token)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.index).map(|s| s.pos).unwrap_or(self.end)
    }

    fn at_end(&self) -> bool {
        self.index >= self.tokens.len()
    }

    fn skip_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn skip(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, expected: &str) -> ExprError {
        ExprError::Expected {
            expected: expected.to_string(),
            found: self
                .peek()
                .map(Token::describe)
                .unwrap_or_else(|| "end of input".to_string()),
            pos: self.pos(),
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExprError> {
        if self.skip(expected) {
            Ok(())
        } else {
            Err(self.error(&expected.describe()))
        }
    }

    fn query(&mut self) -> Result<Query, ExprError> {
        if self.at_end() {
            return Err(ExprError::Empty);
        }

        let select = if self.skip_keyword("SELECT") {
            let mut columns = vec![self.column()?];
            while self.skip(&Token::Comma) {
                columns.push(self.column()?);
            }
            Some(columns)
        } else {
            None
        };

        let filter = if self.skip_keyword("WHERE") {
            Some(self.expr()?)
        } else {
            None
        };

        if select.is_none() && filter.is_none() {
            return Err(self.error("SELECT or WHERE"));
        }
        if !self.at_end() {
            return Err(self.error("end of input"));
        }

        Ok(Query { select, filter })
    }

    fn column(&mut self) -> Result<String, ExprError> {
        match self.peek() {
            Some(Token::Column(name)) => {
                let name = name.clone();
                self.index += 1;
                Ok(name)
            }
            Some(Token::Word(word)) if !is_keyword(word) => {
                let name = word.clone();
                self.index += 1;
                Ok(name)
            }
            _ => Err(self.error("column name")),
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and_expr()?;
        while self.skip_keyword("OR") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        while self.skip_keyword("AND") {
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.skip_keyword("NOT") {
            self.descend()?;
            let inner = self.unary();
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner?)));
        }
        if self.skip(&Token::LParen) {
            self.descend()?;
            let inner = self.expr();
            self.depth -= 1;
            let inner = inner?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        self.comparison()
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        self.conditions += 1;
        if self.conditions > MAX_CONDITIONS {
            return Err(ExprError::TooManyConditions(MAX_CONDITIONS));
        }
        let left = self.operand()?;

        if self.skip_keyword("IN") {
            return Ok(Expr::In {
                operand: left,
                list: self.list()?,
            });
        }
        if self.skip_keyword("IS") {
            let negated = self.skip_keyword("NOT");
            if !self.skip_keyword("NULL") {
                return Err(self.error("NULL"));
            }
            return Ok(Expr::IsNull {
                operand: left,
                negated,
            });
        }

        match self.cmp_op() {
            Some(op) => Ok(Expr::Compare {
                left,
                op,
                right: self.operand()?,
            }),
            None => Ok(Expr::Truthy(left)),
        }
    }

    fn cmp_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek()? {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            t if t.is_keyword("CONTAINS") => CmpOp::Contains,
            t if t.is_keyword("STARTSWITH") => CmpOp::StartsWith,
            t if t.is_keyword("ENDSWITH") => CmpOp::EndsWith,
            _ => return None,
        };
        self.index += 1;
        Some(op)
    }

    fn operand(&mut self) -> Result<Operand, ExprError> {
        if let Some(literal) = self.literal() {
            return Ok(Operand::Literal(literal));
        }
        self.column()
            .map(Operand::Column)
            .map_err(|_| self.error("column or value"))
    }

    fn literal(&mut self) -> Option<Literal> {
        let literal = match self.peek()? {
            Token::Str(s) => Literal::Str(s.clone()),
            Token::Number(n) => Literal::Number(*n),
            t if t.is_keyword("TRUE") => Literal::Bool(true),
            t if t.is_keyword("FALSE") => Literal::Bool(false),
            t if t.is_keyword("NULL") => Literal::Null,
            _ => return None,
        };
        self.index += 1;
        Some(literal)
    }

    fn list(&mut self) -> Result<Vec<Literal>, ExprError> {
        self.expect(&Token::LParen)?;
        let mut items = Vec::new();
        loop {
            match self.literal() {
                Some(literal) => items.push(literal),
                None => return Err(self.error("literal value")),
            }
            if self.skip(&Token::RParen) {
                return Ok(items);
            }
            self.expect(&Token::Comma)?;
        }
    }
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

/// Parse one filter expression line
pub fn parse_query(input: &str) -> Result<Query, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        end: input.len(),
        depth: 0,
        conditions: 0,
    };
    parser.query()
}
