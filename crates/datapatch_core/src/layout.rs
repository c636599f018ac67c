use std::io;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    pub fn encloses(&self, other: &ByteRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// How a property value is written in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Unquoted token: numbers, `true`, `null`, identifiers.
    Bare,
    /// String literal delimited by the given quote byte.
    Quoted(u8),
    /// Object or array literal.
    Nested,
}

impl ValueKind {
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Nested)
    }

    pub fn quote(&self) -> Option<u8> {
        match *self {
            Self::Quoted(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Bare => "bare",
            Self::Quoted(_) => "quoted",
            Self::Nested => "nested",
        }
    }
}

/// A keyed record: the key token and the braces that own its properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    pub key: ByteRange,
    /// From the opening `{` through the matching `}` inclusive.
    pub body: ByteRange,
}

/// One `property: value` occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueSite {
    pub key: ByteRange,
    pub value: ByteRange,
    pub kind: ValueKind,
}

/// Checks that `sites` are ordered, disjoint and inside a `text_len`-byte buffer.
pub fn validate_sites(sites: &[ValueSite], text_len: usize) -> io::Result<()> {
    let mut previous_end = 0usize;
    for (idx, site) in sites.iter().enumerate() {
        if site.value.end < site.value.start {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "invalid value range at site {idx}: {}..{}",
                    site.value.start, site.value.end
                ),
            ));
        }
        if site.value.start < previous_end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "value sites overlap around site {idx}: previous ended at {}, next starts at {}",
                    previous_end, site.value.start
                ),
            ));
        }
        previous_end = site.value.end;
    }

    if previous_end > text_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("value sites run past end of text: ended at {previous_end}, text length {text_len}"),
        ));
    }

    Ok(())
}
