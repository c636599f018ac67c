use regex::Regex;

use crate::layout::{ByteRange, RecordSpan, ValueKind, ValueSite};

/// Positions of string literals and comments in a document.
///
/// Delimiters are ASCII, so every recorded boundary is a char boundary even
/// when the text around it is multi-byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextMap {
    literals: Vec<ByteRange>,
}

/// A key token followed by its `:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySite {
    pub key: ByteRange,
    pub colon_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteDepth {
    /// Only properties owned directly by the scope's braces.
    DirectChildren,
    /// Properties at any nesting level inside the scope.
    Any,
}

impl TextMap {
    pub fn build(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut literals = Vec::new();
        let mut i = 0usize;

        while i < bytes.len() {
            match bytes[i] {
                quote @ (b'"' | b'\'' | b'`') => {
                    let start = i;
                    i += 1;
                    while i < bytes.len() {
                        match bytes[i] {
                            b'\\' => i += 2,
                            b if b == quote => {
                                i += 1;
                                break;
                            }
                            // Unterminated literal; stop at the line end.
                            b'\n' if quote != b'`' => break,
                            _ => i += 1,
                        }
                    }
                    i = i.min(bytes.len());
                    literals.push(ByteRange::new(start, i));
                }
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    let start = i;
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                    literals.push(ByteRange::new(start, i));
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    let start = i;
                    i += 2;
                    loop {
                        if i + 1 >= bytes.len() {
                            i = bytes.len();
                            break;
                        }
                        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                            i += 2;
                            break;
                        }
                        i += 1;
                    }
                    literals.push(ByteRange::new(start, i));
                }
                _ => i += 1,
            }
        }

        Self { literals }
    }

    /// Keeps the map in step with `text.replace_range(replaced, replacement)`.
    ///
    /// `replaced` must cover whole literals or none: a rewrite replaces a
    /// complete value, never part of a string.
    pub fn splice(&mut self, replaced: ByteRange, replacement: &str) {
        let first = self.literals.partition_point(|r| r.end <= replaced.start);
        let last = self.literals.partition_point(|r| r.start < replaced.end);
        let (grow, shrink) = (replacement.len(), replaced.len());

        for r in &mut self.literals[last..] {
            *r = ByteRange::new(r.start + grow - shrink, r.end + grow - shrink);
        }
        let inserted = TextMap::build(replacement)
            .literals
            .into_iter()
            .map(|r| ByteRange::new(replaced.start + r.start, replaced.start + r.end));
        self.literals.splice(first..last, inserted);
    }

    pub fn literal_at(&self, pos: usize) -> Option<ByteRange> {
        let idx = self.literals.partition_point(|r| r.start <= pos);
        let candidate = *self.literals.get(idx.checked_sub(1)?)?;
        candidate.contains(pos).then_some(candidate)
    }

    pub fn is_code(&self, pos: usize) -> bool {
        self.literal_at(pos).is_none()
    }

    /// Iterates `(offset, byte)` over `range`, skipping literals and comments.
    pub fn code_bytes<'a>(&'a self, text: &'a str, range: ByteRange) -> CodeBytes<'a> {
        let next = self.literals.partition_point(|r| r.end <= range.start);
        CodeBytes {
            bytes: text.as_bytes(),
            literals: &self.literals,
            pos: range.start,
            end: range.end.min(text.len()),
            next,
        }
    }
}

pub struct CodeBytes<'a> {
    bytes: &'a [u8],
    literals: &'a [ByteRange],
    pos: usize,
    end: usize,
    next: usize,
}

impl Iterator for CodeBytes<'_> {
    type Item = (usize, u8);

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.end {
            if let Some(lit) = self.literals.get(self.next) {
                if lit.end <= self.pos {
                    self.next += 1;
                    continue;
                }
                if lit.start <= self.pos {
                    self.pos = lit.end;
                    self.next += 1;
                    continue;
                }
            }
            let at = self.pos;
            self.pos += 1;
            return Some((at, self.bytes[at]));
        }
        None
    }
}

fn is_bare_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn key_pattern(name: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(name);
    let mut alternatives = vec![format!("\"{escaped}\""), format!("'{escaped}'")];
    if is_bare_name(name) {
        alternatives.push(format!(r"\b{escaped}\b"));
    }
    Regex::new(&format!(r"(?P<key>{})\s*:", alternatives.join("|")))
}

/// Finds `name:` key tokens inside `within`, ignoring text in literals.
pub fn key_sites(
    text: &str,
    map: &TextMap,
    name: &str,
    within: ByteRange,
) -> Result<Vec<KeySite>, regex::Error> {
    let pattern = key_pattern(name)?;
    let haystack = within.slice(text);
    let mut out = Vec::new();

    for caps in pattern.captures_iter(haystack) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.name("key")) else {
            continue;
        };
        let key = ByteRange::new(within.start + key.start(), within.start + key.end());
        let quoted = matches!(text.as_bytes()[key.start], b'"' | b'\'');
        let genuine = if quoted {
            map.literal_at(key.start) == Some(key)
        } else {
            map.is_code(key.start)
        };
        if genuine {
            out.push(KeySite {
                key,
                colon_end: within.start + whole.end(),
            });
        }
    }

    Ok(out)
}

/// Every record opened by `key: {`, in document order.
pub fn find_records(text: &str, map: &TextMap, key: &str) -> Result<Vec<RecordSpan>, regex::Error> {
    find_records_in(text, map, key, ByteRange::new(0, text.len()), SiteDepth::Any)
}

/// Records opened by `key: {` inside `within`.
pub fn find_records_in(
    text: &str,
    map: &TextMap,
    key: &str,
    within: ByteRange,
    depth: SiteDepth,
) -> Result<Vec<RecordSpan>, regex::Error> {
    let mut out = Vec::new();

    for site in key_sites(text, map, key, within)? {
        if depth == SiteDepth::DirectChildren
            && depth_at(text, map, within.start, site.key.start) != 1
        {
            continue;
        }
        let open = skip_trivia(text, map, site.colon_end);
        if text.as_bytes().get(open) != Some(&b'{') {
            continue;
        }
        match matching_close(text, map, open).filter(|close| *close < within.end) {
            Some(close) => out.push(RecordSpan {
                key: site.key,
                body: ByteRange::new(open, close + 1),
            }),
            None => tracing::debug!(key, offset = open, "record brace is never closed"),
        }
    }

    Ok(out)
}

/// Every `property: value` site inside `scope` with a recognisable value.
pub fn property_sites(
    text: &str,
    map: &TextMap,
    property: &str,
    scope: ByteRange,
    depth: SiteDepth,
) -> Result<Vec<ValueSite>, regex::Error> {
    let mut out = Vec::new();

    for site in key_sites(text, map, property, scope)? {
        if depth == SiteDepth::DirectChildren && depth_at(text, map, scope.start, site.key.start) != 1
        {
            continue;
        }
        let start = skip_trivia(text, map, site.colon_end);
        let Some((value, kind)) = value_at(text, map, start) else {
            continue;
        };
        if scope.encloses(&value) {
            out.push(ValueSite {
                key: site.key,
                value,
                kind,
            });
        }
    }

    Ok(out)
}

/// Skips whitespace and comments from `pos`.
pub fn skip_trivia(text: &str, map: &TextMap, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() {
        if bytes[pos].is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        match map.literal_at(pos) {
            Some(lit) if bytes[lit.start] == b'/' => pos = lit.end,
            _ => break,
        }
    }
    pos
}

/// Offset of the bracket closing the one at `open`.
pub fn matching_close(text: &str, map: &TextMap, open: usize) -> Option<usize> {
    let mut depth = 0i64;
    for (pos, byte) in map.code_bytes(text, ByteRange::new(open, text.len())) {
        match byte {
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }
    None
}

fn depth_at(text: &str, map: &TextMap, from: usize, to: usize) -> i64 {
    map.code_bytes(text, ByteRange::new(from, to))
        .fold(0i64, |depth, (_, byte)| match byte {
            b'{' | b'[' => depth + 1,
            b'}' | b']' => depth - 1,
            _ => depth,
        })
}

/// Classifies the value starting at `start`.
pub fn value_at(text: &str, map: &TextMap, start: usize) -> Option<(ByteRange, ValueKind)> {
    let bytes = text.as_bytes();
    let first = *bytes.get(start)?;

    match first {
        b'"' | b'\'' | b'`' => {
            let lit = map.literal_at(start)?;
            (lit.start == start).then_some((lit, ValueKind::Quoted(first)))
        }
        b'{' | b'[' => {
            let close = matching_close(text, map, start)?;
            Some((ByteRange::new(start, close + 1), ValueKind::Nested))
        }
        b',' | b'}' | b']' => None,
        _ => {
            let mut end = start;
            while end < bytes.len() {
                if matches!(bytes[end], b',' | b'}' | b']' | b'\n' | b'\r') || !map.is_code(end) {
                    break;
                }
                end += 1;
            }
            while end > start && bytes[end - 1].is_ascii_whitespace() {
                end -= 1;
            }
            (end > start).then_some((ByteRange::new(start, end), ValueKind::Bare))
        }
    }
}
