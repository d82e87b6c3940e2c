use std::ops::Range;

use serde::{Deserialize, Serialize};

/// A byte-offset range into a single MDX query string.
///
/// Unlike the human-readable `{line, column}` position in spec.md §3, a
/// `Span` is cheap to copy and carry on every node; line/column numbers are
/// computed lazily from a `Span` plus the source text, only when a
/// diagnostic is actually rendered (see `mdx_dax::error_message`).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Span { start, end }
    }

    /// A span covering both `self` and `other`, for grouping child spans
    /// into a parent node's span during parsing.
    pub fn union(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl From<Span> for Range<usize> {
    fn from(s: Span) -> Self {
        s.start..s.end
    }
}

impl std::fmt::Debug for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Human-readable position, computed from a `Span` against source text.
/// This is the `{line, column, context}` triple spec.md §3 requires on
/// every diagnostic; it is never stored on CST nodes themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number.
    pub column: usize,
    /// A short excerpt of the source line, for error messages.
    pub context: String,
}

impl Position {
    /// Locates the 1-based line/column of a byte offset within `source`,
    /// along with the surrounding line as context.
    pub fn locate(source: &str, offset: usize) -> Position {
        let offset = offset.min(source.len());
        let mut line = 1usize;
        let mut line_start = 0usize;
        for (i, ch) in source.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                line_start = i + 1;
            }
        }
        let line_end = source[line_start..]
            .find('\n')
            .map(|i| line_start + i)
            .unwrap_or(source.len());
        let context = source[line_start..line_end].to_string();
        let column = source[line_start..offset].chars().count() + 1;
        Position {
            line,
            column,
            context,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn locate_first_line() {
        let pos = Position::locate("SELECT 1 FROM x", 7);
        assert_eq!(pos.line, 1);
        assert_eq!(pos.column, 8);
        assert_eq!(pos.context, "SELECT 1 FROM x");
    }

    #[test]
    fn locate_second_line() {
        let src = "SELECT\n{[Measures].[X]} ON 0\nFROM [Cube]";
        let offset = src.find("[Measures]").unwrap();
        let pos = Position::locate(src, offset);
        assert_eq!(pos.line, 2);
        assert_eq!(pos.column, 2);
        assert_eq!(pos.context, "{[Measures].[X]} ON 0");
    }

    #[test]
    fn span_union() {
        let a = Span::new(4, 10);
        let b = Span::new(2, 6);
        assert_eq!(a.union(b), Span::new(2, 10));
    }
}
