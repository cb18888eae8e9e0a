//! Tagged configuration values and the literal syntax used on the
//! right-hand side of `% path = literal` assignments.
//!
//! # Examples
//!
//! ```
//! use prapti::config::{ConfigValue, parse_literal};
//!
//! assert_eq!(parse_literal("0.8").unwrap(), ConfigValue::Float(0.8));
//! assert_eq!(
//!     parse_literal(r#"["a", 'b']"#).unwrap(),
//!     ConfigValue::List(vec!["a".into(), "b".into()]),
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LineError;

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Short name of the value's kind, used in type errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigValue::Null => "null",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
            ConfigValue::List(_) => "list",
            ConfigValue::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value. Integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// The value as a list of strings, if every element is a string.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        self.as_list()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(items: Vec<T>) -> Self {
        ConfigValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Renders the value in literal syntax, so that `parse_literal(v.to_string())`
/// gives back `v` for everything except maps.
impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Null => write!(f, "null"),
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Int(i) => write!(f, "{i}"),
            ConfigValue::Float(x) => write!(f, "{x:?}"),
            ConfigValue::String(s) => write!(f, "{s:?}"),
            ConfigValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            ConfigValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ── Literal parser ──────────────────────────────────────────────────

/// Parse the right-hand side of an assignment.
///
/// Accepted forms: single- or double-quoted strings with backslash escapes,
/// integers, floats, `true`/`false` (`True`/`False` also accepted),
/// `null`/`None`, and bracketed lists of literals with optional trailing
/// comma. Surrounding whitespace is ignored; anything after the literal is
/// an error.
pub fn parse_literal(text: &str) -> Result<ConfigValue, LineError> {
    let mut parser = LiteralParser {
        chars: text.trim().chars().collect(),
        pos: 0,
        source: text.trim(),
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(value)
}

struct LiteralParser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl LiteralParser<'_> {
    fn error(&self, reason: &str) -> LineError {
        LineError::InvalidLiteral {
            text: self.source.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<ConfigValue, LineError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("expected a value")),
            Some('"') | Some('\'') => self.string(),
            Some('[') => self.list(),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.word(),
            Some(_) => Err(self.error("expected a value")),
        }
    }

    fn string(&mut self) -> Result<ConfigValue, LineError> {
        let Some(quote) = self.peek() else {
            return Err(self.error("expected a string"));
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            match c {
                '\\' => {
                    let Some(escaped) = self.peek() else {
                        return Err(self.error("unterminated escape"));
                    };
                    self.pos += 1;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                c if c == quote => return Ok(ConfigValue::String(out)),
                c => out.push(c),
            }
        }
    }

    fn list(&mut self) -> Result<ConfigValue, LineError> {
        self.pos += 1; // '['
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(ConfigValue::List(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    return Ok(ConfigValue::List(items));
                }
                _ => return Err(self.error("expected ',' or ']' in list")),
            }
        }
    }

    fn number(&mut self) -> Result<ConfigValue, LineError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_'))
        {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if let Ok(i) = raw.parse::<i64>() {
            return Ok(ConfigValue::Int(i));
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(ConfigValue::Float(f)),
            _ => Err(self.error("not a number")),
        }
    }

    fn word(&mut self) -> Result<ConfigValue, LineError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "true" | "True" => Ok(ConfigValue::Bool(true)),
            "false" | "False" => Ok(ConfigValue::Bool(false)),
            "null" | "None" => Ok(ConfigValue::Null),
            _ => Err(self.error("bare words must be quoted")),
        }
    }
}
