//! Source locations.
//!
//! A `Span` records the byte range a token or node covers together with
//! the 1-based line and column of its first character, so diagnostics can
//! be reported without re-scanning the source.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Byte offsets into the source.
    pub start: u32,
    pub end: u32,
    /// 1-based line of `start`.
    pub line: u32,
    /// 1-based column of `start`, counted in characters.
    pub column: u32,
}

impl Span {
    pub fn new(start: u32, end: u32, line: u32, column: u32) -> Self {
        Span {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering `self` through the end of `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end.max(self.end),
            line: self.line,
            column: self.column,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_span_keeps_start_position() {
        let a = Span::new(4, 6, 2, 3);
        let b = Span::new(10, 12, 2, 9);
        let merged = a.to(b);
        assert_eq!(merged.start, 4);
        assert_eq!(merged.end, 12);
        assert_eq!((merged.line, merged.column), (2, 3));
        assert_eq!(merged.to_string(), "2:3");
    }
}
