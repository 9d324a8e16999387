//! Minimal WKT (Well-Known Text) CRS parser.
//!
//! Parses both WKT1 (OGC and ESRI `.prj` flavours) and WKT2 into a generic
//! keyword tree. Only the structure is interpreted here; projection semantics
//! live in [`super::Projection`].

use crate::error::{Error, Result};

/// A value inside a WKT clause.
#[derive(Debug, Clone, PartialEq)]
pub enum WktValue {
    /// Nested clause, e.g. `DATUM[...]`
    Node(WktNode),
    /// Quoted string
    Text(String),
    Number(f64),
    /// Bare identifier, e.g. `EAST` in `AXIS["X",EAST]`
    Keyword(String),
}

/// One `KEYWORD[value, value, ...]` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct WktNode {
    pub keyword: String,
    pub values: Vec<WktValue>,
}

impl WktNode {
    /// The clause name: its first quoted string.
    pub fn name(&self) -> Option<&str> {
        self.values.iter().find_map(|v| match v {
            WktValue::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Direct child clauses with the given keyword (case-insensitive).
    pub fn children<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a WktNode> + 'a {
        self.values.iter().filter_map(move |v| match v {
            WktValue::Node(n) if n.keyword.eq_ignore_ascii_case(keyword) => Some(n),
            _ => None,
        })
    }

    /// First direct child clause with the given keyword.
    pub fn child<'a>(&'a self, keyword: &'a str) -> Option<&'a WktNode> {
        self.children(keyword).next()
    }

    /// The `index`-th numeric value of this clause.
    pub fn number(&self, index: usize) -> Option<f64> {
        self.values
            .iter()
            .filter_map(|v| match v {
                WktValue::Number(n) => Some(*n),
                _ => None,
            })
            .nth(index)
    }

    /// EPSG code from a direct `AUTHORITY["EPSG","code"]` (WKT1) or
    /// `ID["EPSG",code]` (WKT2) child.
    pub fn epsg(&self) -> Option<u32> {
        let authority = self.child("AUTHORITY").or_else(|| self.child("ID"))?;
        let mut values = authority.values.iter();
        match values.next() {
            Some(WktValue::Text(name)) if name.eq_ignore_ascii_case("EPSG") => {}
            _ => return None,
        }
        match values.next()? {
            WktValue::Text(code) => code.trim().parse().ok(),
            WktValue::Number(code) if *code >= 0.0 => Some(*code as u32),
            _ => None,
        }
    }
}

/// Parse a WKT string into its root clause.
pub fn parse_wkt(input: &str) -> Result<WktNode> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    let root = match parser.value()? {
        WktValue::Node(node) => node,
        _ => return Err(parser.error("expected a WKT clause")),
    };
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("trailing characters after WKT"));
    }
    Ok(root)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn error(&self, reason: &str) -> Error {
        Error::UnsupportedCrs(format!("malformed WKT at offset {}: {}", self.pos, reason))
    }

    fn value(&mut self) -> Result<WktValue> {
        self.skip_whitespace();
        match self.peek() {
            Some('"') => self.text().map(WktValue::Text),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => {
                self.number().map(WktValue::Number)
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let keyword = self.identifier();
                self.skip_whitespace();
                match self.peek() {
                    Some('[') | Some('(') => self.clause(keyword).map(WktValue::Node),
                    _ => Ok(WktValue::Keyword(keyword)),
                }
            }
            _ => Err(self.error("unexpected character")),
        }
    }

    fn clause(&mut self, keyword: String) -> Result<WktNode> {
        // Opening bracket already peeked.
        self.pos += 1;
        let mut values = Vec::new();
        loop {
            self.skip_whitespace();
            if let Some(']') | Some(')') = self.peek() {
                self.pos += 1;
                break;
            }
            values.push(self.value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') | Some(')') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error("expected ',' or closing bracket")),
            }
        }
        Ok(WktNode { keyword, values })
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn text(&mut self) -> Result<String> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                Some('"') if self.chars.get(self.pos + 1) == Some(&'"') => {
                    out.push('"');
                    self.pos += 2;
                }
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse()
            .map_err(|_| self.error(&format!("invalid number '{literal}'")))
    }
}
