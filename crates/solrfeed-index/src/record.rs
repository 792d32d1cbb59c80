//! Tab-delimited record micro-format.
//!
//! A line is `name\tvalue\tname\tvalue...`. Tokens pair up positionally;
//! an unpaired trailing token is dropped.

use indexmap::IndexMap;
use serde::Serialize;

/// Field separator within a line
pub const FIELD_DELIMITER: char = '\t';

/// One input line, trailing `\n` removed, not yet decoded.
pub type RawLine = Vec<u8>;

/// A flat, insertion-ordered field map serialized as a JSON object of strings.
///
/// A repeated field name keeps its first position; the last value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Document(IndexMap<String, String>);

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, replacing any earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Document {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut doc = Self::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

/// Line could not be decoded as UTF-8 text.
#[derive(Debug)]
pub struct ParseError(std::str::Utf8Error);

impl ParseError {
    /// Byte offset of the first invalid sequence
    pub fn valid_up_to(&self) -> usize {
        self.0.valid_up_to()
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line is not valid UTF-8: {}", self.0)
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Parse one raw line into a [`Document`].
pub fn parse_line(line: &[u8]) -> Result<Document, ParseError> {
    let text = std::str::from_utf8(line).map_err(ParseError)?;
    Ok(parse_fields(text))
}

/// Pair tab-separated tokens as name/value; a trailing odd token is ignored.
pub fn parse_fields(text: &str) -> Document {
    let mut doc = Document::new();
    let mut tokens = text.split(FIELD_DELIMITER);
    while let (Some(name), Some(value)) = (tokens.next(), tokens.next()) {
        doc.insert(name, value);
    }
    doc
}
