//! Diagnostic mapper: byte offsets into a document snapshot → line/column.
//!
//! The verifier reports positions as zero-based byte offsets into the file it
//! was given. Hosts address text by line and column, with columns counted in
//! the host's own unit (UTF-16 code units for most editors). [`TextSnapshot`]
//! precomputes line starts once per session so every lookup is a binary search.
//!
//! Line breaks are `\n` and `\r\n`; the `\r` of a `\r\n` pair belongs to the
//! line break, not to the line's columns.

use crate::types::{Diagnostic, DiagnosticAttribute};

/// Unit in which columns are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionEncoding {
    /// Bytes.
    Utf8,
    /// UTF-16 code units.
    #[default]
    Utf16,
    /// Unicode scalar values.
    Utf32,
}

impl PositionEncoding {
    fn measure(self, text: &str) -> u32 {
        let units = match self {
            Self::Utf8 => text.len(),
            Self::Utf16 => text.encode_utf16().count(),
            Self::Utf32 => text.chars().count(),
        };
        u32::try_from(units).unwrap_or(u32::MAX)
    }
}

/// Zero-based line/column position. Ordered line first, then column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

/// Half-open source range with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    start: Position,
    end: Position,
}

impl Span {
    /// Returns `None` when `start > end`.
    #[must_use]
    pub fn new(start: Position, end: Position) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    #[must_use]
    pub fn start(&self) -> Position {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> Position {
        self.end
    }
}

/// A range the verifier reported that cannot be placed in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid source range [{left}, {right})")]
pub struct InvalidRange {
    pub left: i64,
    pub right: i64,
}

/// Immutable text of the document under verification.
#[derive(Debug, Clone)]
pub struct TextSnapshot {
    text: String,
    /// Byte offset of the first byte of every line. Always starts with 0.
    line_starts: Vec<usize>,
    encoding: PositionEncoding,
}

impl TextSnapshot {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let line_starts = std::iter::once(0)
            .chain(
                text.bytes()
                    .enumerate()
                    .filter(|&(_, b)| b == b'\n')
                    .map(|(i, _)| i + 1),
            )
            .collect();
        Self {
            text,
            line_starts,
            encoding: PositionEncoding::default(),
        }
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: PositionEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Position of a byte offset.
    ///
    /// Offsets past the end clamp to the end of the text; offsets inside a
    /// multi-byte character clamp to the start of that character; offsets
    /// inside a line break clamp to the end of the line's content.
    #[must_use]
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = self.floor_char_boundary(offset);
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let line_start = self.line_starts[line];
        let column_end = offset.min(self.content_end(line));
        Position {
            line: u32::try_from(line).unwrap_or(u32::MAX),
            character: self.encoding.measure(&self.text[line_start..column_end]),
        }
    }

    /// Half-open span for the byte range `[left, right)`.
    pub fn span(&self, left: i64, right: i64) -> Result<Span, InvalidRange> {
        let invalid = InvalidRange { left, right };
        let start = usize::try_from(left).map_err(|_| invalid)?;
        let end = usize::try_from(right).map_err(|_| invalid)?;
        if start > end {
            return Err(invalid);
        }
        Span::new(self.position_at(start), self.position_at(end)).ok_or(invalid)
    }

    /// Span of the identifier that starts at `offset`.
    ///
    /// An offset that is not on an identifier character yields an empty span.
    pub fn word_span_at(&self, offset: i64) -> Result<Span, InvalidRange> {
        let invalid = InvalidRange {
            left: offset,
            right: offset,
        };
        let start = self.floor_char_boundary(usize::try_from(offset).map_err(|_| invalid)?);
        let word_len: usize = self.text[start..]
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .map(char::len_utf8)
            .sum();
        Span::new(self.position_at(start), self.position_at(start + word_len)).ok_or(invalid)
    }

    /// Resolve a diagnostic's anchor to a span.
    ///
    /// `Ok(None)` means the diagnostic carries no position and is message-only.
    pub(crate) fn anchor(&self, diagnostic: &Diagnostic) -> Result<Option<Span>, InvalidRange> {
        for attribute in diagnostic.attributes() {
            match attribute {
                DiagnosticAttribute::PositionedError { left, right, .. } => {
                    return self.span(*left, *right).map(Some);
                }
                DiagnosticAttribute::WordError { offset } => {
                    return self.word_span_at(*offset).map(Some);
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn floor_char_boundary(&self, offset: usize) -> usize {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    /// Byte offset where the content of `line` ends (before its line break).
    fn content_end(&self, line: usize) -> usize {
        let Some(&next_start) = self.line_starts.get(line + 1) else {
            return self.text.len();
        };
        let newline = next_start - 1;
        if newline > self.line_starts[line] && self.text.as_bytes()[newline - 1] == b'\r' {
            newline - 1
        } else {
            newline
        }
    }
}
