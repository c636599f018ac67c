use std::fmt;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value as JsonValue};

use crate::layout::ValueKind;

/// A replacement value. Numbers keep the exact text they were parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, try_from = "JsonValue")]
pub enum EditValue {
    Number(Number),
    Text(String),
}

impl EditValue {
    pub const DEFAULT_QUOTE: u8 = b'"';

    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => Some(Self::Number(n.clone())),
            JsonValue::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "string",
        }
    }

    /// Source text for this value. Strings reuse `quote` when given.
    pub fn render(&self, quote: Option<u8>) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => quote_text(s, quote.unwrap_or(Self::DEFAULT_QUOTE)),
        }
    }

    /// Text as it should appear at a site of the given kind.
    pub fn render_for(&self, kind: ValueKind) -> String {
        self.render(kind.quote())
    }

    /// Whether the caller's type disagrees with how the site is written.
    pub fn conflicts_with(&self, kind: ValueKind) -> bool {
        match kind {
            ValueKind::Bare => self.is_text(),
            ValueKind::Quoted(_) => !self.is_text(),
            ValueKind::Nested => true,
        }
    }
}

impl fmt::Display for EditValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(None))
    }
}

impl From<f64> for EditValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or_else(|| Self::Text(value.to_string()), Self::Number)
    }
}

impl From<i64> for EditValue {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl TryFrom<JsonValue> for EditValue {
    type Error = String;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        Self::from_json(&value).ok_or_else(|| format!("expected a number or a string, got {value}"))
    }
}

impl From<&str> for EditValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

fn quote_text(s: &str, quote: u8) -> String {
    let quote = quote as char;
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            // `${` would open a substitution inside a template literal.
            '$' if quote == '`' && chars.peek() == Some(&'{') => out.push_str("\\$"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
