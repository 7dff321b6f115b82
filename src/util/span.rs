//! Source coordinates
//!
//! Every token carries a [`Span`], and debug symbols keep them so tooling
//! can map an instruction pointer back to source text. Both types are
//! plain data built with struct literals wherever the scanner already
//! tracks its counters; the zero value (line 0) marks positions that have
//! no source location, which is what [`Default`] produces.

use std::fmt;

/// A point in source text: 1-indexed line and column, plus the byte
/// offset of the same point for tooling that slices the source directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

// Diagnostics quote positions as `line:column`; the byte offset is for
// machines, not messages.
impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A half-open region of source text, `start` inclusive to `end`
/// exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    /// A zero-width span pointing at a single position, used when an
    /// error has a location but no token extent (lex failures)
    pub fn at(point: Position) -> Self {
        Self {
            start: point,
            end: point,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}
