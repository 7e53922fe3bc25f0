//! Parser for `optuna(...)` tuning annotations.
//!
//! Grammar (whitespace allowed between all tokens):
//!
//! ```text
//! annotation := KEYWORD "(" [ arg { "," arg } [ "," ] ] ")" EOF
//! arg        := sequence | scalar
//! sequence   := "[" items "]" | "(" items ")"
//! items      := [ item { "," item } [ "," ] ]
//! item       := sequence | scalar
//! scalar     := number | string | "True" | "False" | "None"
//!             | "true" | "false" | "null"
//! number     := [ "+" | "-" ] ( digits [ "." [ digits ] ] | "." digits ) [ exponent ]
//! ```
//!
//! Only literal syntax is accepted. Identifiers, calls and operators are
//! rejected, so an annotation can never evaluate anything. A sequence
//! argument contributes its scalar elements in order; sequences nested
//! inside it are dropped. A parenthesized single item without a trailing
//! comma is just that item, as in Python.

use hs_types::{Literal, SpaceError};

use crate::space::CandidateSet;

/// The annotation keyword, matched case-insensitively.
pub const ANNOTATION_KEYWORD: &str = "optuna";

/// Whether a config string is a tuning annotation (trimmed, case-insensitive
/// `optuna(` prefix). Such a string may still fail to parse.
pub fn is_annotation(text: &str) -> bool {
    let bytes = text.trim_start().as_bytes();
    let keyword_len = ANNOTATION_KEYWORD.len();
    bytes.len() > keyword_len
        && bytes[..keyword_len].eq_ignore_ascii_case(ANNOTATION_KEYWORD.as_bytes())
        && bytes[keyword_len] == b'('
}

/// Parse an annotation into its candidate values.
pub fn parse_annotation(text: &str) -> Result<CandidateSet, SpaceError> {
    let mut parser = Parser::new(text);
    let values = parser.parse_annotation()?;
    CandidateSet::new(values)
}

/// A parsed argument or sequence element.
enum Item {
    Scalar(Literal),
    Sequence(Vec<Item>),
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> SpaceError {
        SpaceError::Parse {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), SpaceError> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{want}', found '{c}'"))),
            None => Err(self.error(format!("expected '{want}', found end of input"))),
        }
    }

    fn parse_annotation(&mut self) -> Result<Vec<Literal>, SpaceError> {
        self.skip_ws();
        let start = self.pos;
        let keyword = self.parse_identifier();
        if !keyword.eq_ignore_ascii_case(ANNOTATION_KEYWORD) {
            self.pos = start;
            return Err(self.error(format!("expected '{ANNOTATION_KEYWORD}(' annotation")));
        }
        self.expect('(')?;
        let args = self.parse_items(')')?;
        self.skip_ws();
        if let Some(c) = self.peek() {
            return Err(self.error(format!("unexpected '{c}' after annotation")));
        }

        let mut values = Vec::new();
        for arg in args {
            match arg {
                Item::Scalar(v) => values.push(v),
                Item::Sequence(items) => values.extend(items.into_iter().filter_map(|item| {
                    match item {
                        Item::Scalar(v) => Some(v),
                        Item::Sequence(_) => None,
                    }
                })),
            }
        }
        Ok(values)
    }

    /// Comma-separated items up to (and consuming) `close`.
    fn parse_items(&mut self, close: char) -> Result<Vec<Item>, SpaceError> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(items);
            }
            items.push(self.parse_item()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => {}
                Some(c) if c == close => return Ok(items),
                Some(c) => {
                    self.pos -= c.len_utf8();
                    return Err(self.error(format!("expected ',' or '{close}', found '{c}'")));
                }
                None => return Err(self.error(format!("unclosed '{}'", opening(close)))),
            }
        }
    }

    fn parse_item(&mut self) -> Result<Item, SpaceError> {
        self.skip_ws();
        match self.peek() {
            Some('[') => {
                self.bump();
                Ok(Item::Sequence(self.parse_items(']')?))
            }
            Some('(') => self.parse_parenthesized(),
            Some(_) => self.parse_scalar().map(Item::Scalar),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// `(x)` is `x`; `()`, `(x,)` and `(x, y)` are tuples.
    fn parse_parenthesized(&mut self) -> Result<Item, SpaceError> {
        self.bump();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(Item::Sequence(Vec::new()));
        }
        let first = self.parse_item()?;
        self.skip_ws();
        if self.peek() == Some(')') {
            self.bump();
            return Ok(first);
        }
        self.expect(',')?;
        let mut items = vec![first];
        items.extend(self.parse_items(')')?);
        Ok(Item::Sequence(items))
    }

    fn parse_scalar(&mut self) -> Result<Literal, SpaceError> {
        match self.peek() {
            Some('\'') | Some('"') => self.parse_string(),
            Some(c) if c.is_ascii_digit() || matches!(c, '.' | '+' | '-') => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_keyword_literal(),
            Some(c) => Err(self.error(format!("unexpected '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_identifier(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn parse_keyword_literal(&mut self) -> Result<Literal, SpaceError> {
        let start = self.pos;
        let ident = self.parse_identifier();
        let literal = match ident {
            "True" | "true" => Literal::Bool(true),
            "False" | "false" => Literal::Bool(false),
            "None" | "null" => Literal::None,
            other => {
                self.skip_ws();
                let message = if self.peek() == Some('(') {
                    format!("nested call '{other}(...)' is not allowed")
                } else {
                    format!("'{other}' is not a literal")
                };
                self.pos = start;
                return Err(self.error(message));
            }
        };
        Ok(literal)
    }

    fn parse_string(&mut self) -> Result<Literal, SpaceError> {
        let start = self.pos;
        let quote = self.bump().unwrap_or('"');
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(Literal::Str(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => out.push(c),
            }
        }
        self.pos = start;
        Err(self.error("unterminated string literal"))
    }

    fn parse_number(&mut self) -> Result<Literal, SpaceError> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.bump();
                true
            }
            Some('+') => {
                self.bump();
                false
            }
            _ => false,
        };
        self.skip_ws();

        let body_start = self.pos;
        let int_digits = self.take_digits();
        let mut is_float = false;
        let mut frac_digits = String::new();
        if self.peek() == Some('.') {
            self.bump();
            is_float = true;
            frac_digits = self.take_digits();
        }
        if int_digits.is_empty() && frac_digits.is_empty() {
            self.pos = start;
            return Err(self.error("expected a number"));
        }

        let mut exponent = String::new();
        if matches!(self.peek(), Some('e' | 'E')) {
            self.bump();
            is_float = true;
            if let Some(sign @ ('+' | '-')) = self.peek() {
                self.bump();
                exponent.push(sign);
            }
            let exp_digits = self.take_digits();
            if exp_digits.is_empty() {
                return Err(self.error("malformed exponent"));
            }
            exponent.push_str(&exp_digits);
        }

        if matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            return Err(self.error(format!(
                "invalid numeric literal '{}'",
                &self.src[body_start..self.pos]
            )));
        }

        let sign = if negative { "-" } else { "" };
        if is_float {
            let int_part = if int_digits.is_empty() { "0" } else { &int_digits };
            let frac_part = if frac_digits.is_empty() { "0" } else { &frac_digits };
            let exp_part = if exponent.is_empty() {
                String::new()
            } else {
                format!("e{exponent}")
            };
            let text = format!("{sign}{int_part}.{frac_part}{exp_part}");
            match text.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(Literal::Float(value)),
                Ok(_) => {
                    self.pos = start;
                    Err(self.error(format!("float literal '{text}' out of range")))
                }
                Err(_) => Err(self.error(format!("invalid float literal '{text}'"))),
            }
        } else {
            if int_digits.starts_with('0') && int_digits.bytes().any(|b| b != b'0') {
                self.pos = body_start;
                return Err(self.error("leading zeros are not permitted in integer literals"));
            }
            let text = format!("{sign}{int_digits}");
            text.parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| self.error(format!("integer literal '{text}' out of range")))
        }
    }

    /// Decimal digits with single `_` separators between them.
    fn take_digits(&mut self) -> String {
        let mut digits = String::new();
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_digit() => {
                    digits.push(c);
                    self.bump();
                }
                Some('_') if !digits.is_empty() => {
                    let after = self.src[self.pos + 1..].chars().next();
                    if matches!(after, Some(c) if c.is_ascii_digit()) {
                        self.bump();
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        digits
    }
}

fn opening(close: char) -> char {
    match close {
        ']' => '[',
        _ => '(',
    }
}
