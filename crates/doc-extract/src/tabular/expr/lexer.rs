//! Tokenizer for filter expressions

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare word: a keyword or a column name
    Word(String),
    /// `backticked` or [bracketed] column name
    Column(String),
    Str(String),
    Number(f64),
    LParen,
    RParen,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Self::Word(w) => format!("'{}'", w),
            Self::Column(c) => format!("column `{}`", c),
            Self::Str(s) => format!("string '{}'", s),
            Self::Number(n) => format!("number {}", n),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Eq => "'=='".to_string(),
            Self::Ne => "'!='".to_string(),
            Self::Lt => "'<'".to_string(),
            Self::Le => "'<='".to_string(),
            Self::Gt => "'>'".to_string(),
            Self::Ge => "'>='".to_string(),
        }
    }

    /// Case-insensitive keyword test
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

/// Token with its byte offset in the input
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.input[self.pos..].chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let input = self.input;
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.advance();
        }
        &input[start..self.pos]
    }

    /// Quoted string; the quote char is doubled or backslash-escaped inside
    fn string(&mut self, quote: char) -> Result<String, ExprError> {
        let start = self.pos;
        self.advance();
        let mut out = String::new();

        while let Some(ch) = self.advance() {
            match ch {
                '\\' => match self.advance() {
                    Some(escaped) => out.push(escaped),
                    None => break,
                },
                c if c == quote => {
                    if self.skip_if(quote) {
                        out.push(quote);
                    } else {
                        return Ok(out);
                    }
                }
                c => out.push(c),
            }
        }
        Err(ExprError::UnterminatedString(start))
    }

    fn quoted_column(&mut self, close: char) -> Result<String, ExprError> {
        let start = self.pos;
        self.advance();
        let name = self.take_while(|c| c != close).to_string();
        if !self.skip_if(close) {
            return Err(ExprError::UnterminatedColumn(start));
        }
        Ok(name.trim().to_string())
    }

    fn number(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        self.skip_if('-');
        self.take_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.take_while(|c| c.is_ascii_digit());
        }
        let text = &self.input[start..self.pos];
        text.parse()
            .map_err(|_| ExprError::InvalidNumber(text.to_string(), start))
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, ExprError> {
        self.take_while(char::is_whitespace);
        let pos = self.pos;
        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(None),
        };

        let token = match ch {
            '(' => {
                self.advance();
                Token::LParen
            }
            ')' => {
                self.advance();
                Token::RParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            '=' => {
                self.advance();
                self.skip_if('=');
                Token::Eq
            }
            '!' => {
                self.advance();
                if !self.skip_if('=') {
                    return Err(ExprError::UnexpectedChar('!', pos));
                }
                Token::Ne
            }
            '<' => {
                self.advance();
                if self.skip_if('=') {
                    Token::Le
                } else if self.skip_if('>') {
                    Token::Ne
                } else {
                    Token::Lt
                }
            }
            '>' => {
                self.advance();
                if self.skip_if('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '\'' | '"' => Token::Str(self.string(ch)?),
            '`' => Token::Column(self.quoted_column('`')?),
            '[' => Token::Column(self.quoted_column(']')?),
            c if c.is_ascii_digit() => Token::Number(self.number()?),
            '-' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                Token::Number(self.number()?)
            }
            c if c.is_alphabetic() || c == '_' => {
                Token::Word(self.take_while(|c| c.is_alphanumeric() || c == '_').to_string())
            }
            other => return Err(ExprError::UnexpectedChar(other, pos)),
        };

        Ok(Some(Spanned { token, pos }))
    }
}

/// Split an expression into tokens
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut lexer = Lexer { input, pos: 0 };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}
