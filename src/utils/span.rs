use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// A position in a source file: byte offset/length plus the 1-based row and
/// column of the first byte. Every token and every tree node carries one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Arc<str>,
    pub offset: usize,
    pub len: usize,
    pub row: usize,
    pub col: usize,
}

impl Location {
    pub fn new(file: Arc<str>, offset: usize, len: usize, row: usize, col: usize) -> Self {
        Self { file, offset, len, row, col }
    }

    /// A location pointing at the very start of `file`, used for synthesized nodes.
    pub fn start_of(file: Arc<str>) -> Self {
        Self { file, offset: 0, len: 0, row: 1, col: 1 }
    }

    pub fn span(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    /// Extends this location so that it ends where `other` ends.
    pub fn to(&self, other: &Location) -> Location {
        let end = (other.offset + other.len).max(self.offset + self.len);
        Location {
            file: self.file.clone(),
            offset: self.offset,
            len: end - self.offset,
            row: self.row,
            col: self.col,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.row, self.col)
    }
}

/// Maps byte offsets of one source file to row/column pairs.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// Returns the 1-based `(row, col)` of `offset`.
    pub fn locate(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }
}
