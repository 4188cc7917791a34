use std::fmt;

use the_core::line_ending::line_breaks;

/// This is a single point in a text buffer.
/// 0-indexed as all things should be. Columns count `char`s from the start of
/// the line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
  pub line:   usize,
  pub column: usize,
}

impl Position {
  pub const fn new(line: usize, column: usize) -> Self {
    Self { line, column }
  }

  pub const fn zero() -> Self {
    Self { line: 0, column: 0 }
  }

  pub const fn is_zero(&self) -> bool {
    self.line == 0 && self.column == 0
  }

  /// Where text with the shape `delta` ends when it is written at `self`.
  ///
  /// Text without a line break only pushes the column forward. Text with line
  /// breaks ends on a later line, at a column that depends only on its last
  /// line.
  #[must_use]
  pub const fn advance(self, delta: TextDelta) -> Self {
    if delta.lines_added == 0 {
      Self::new(self.line, self.column + delta.last_line_columns)
    } else {
      Self::new(self.line + delta.lines_added, delta.last_line_columns)
    }
  }

  /// Shorthand for `self.advance(TextDelta::measure(text))`.
  #[must_use]
  pub fn traverse(self, text: impl AsRef<str>) -> Self {
    self.advance(TextDelta::measure(text.as_ref()))
  }
}

impl From<(usize, usize)> for Position {
  fn from(value: (usize, usize)) -> Self {
    Position::new(value.0, value.1)
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

/// A span between two positions, `start <= end`.
///
/// Ordering is by `start`, then by `end`, so an empty range sorts before a
/// non-empty one that starts at the same position.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Range {
  pub start: Position,
  pub end:   Position,
}

impl Range {
  /// Creates a range, swapping the endpoints if they are given backwards.
  pub fn new(a: impl Into<Position>, b: impl Into<Position>) -> Self {
    let (a, b) = (a.into(), b.into());
    if a <= b {
      Self { start: a, end: b }
    } else {
      Self { start: b, end: a }
    }
  }

  pub const fn point(pos: Position) -> Self {
    Self {
      start: pos,
      end:   pos,
    }
  }

  #[inline]
  pub fn is_single_line(&self) -> bool {
    self.start.line == self.end.line
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.start == self.end
  }

  /// `true` when `start <= end`. Ranges built with [`Range::new`] always are,
  /// ranges built from raw fields may not be.
  #[inline]
  pub fn is_ordered(&self) -> bool {
    self.start <= self.end
  }

  /// Number of lines the range spans beyond its first one.
  #[inline]
  pub fn line_span(&self) -> usize {
    self.end.line.saturating_sub(self.start.line)
  }
}

impl fmt::Display for Range {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}..{}", self.start, self.end)
  }
}

/// The shape a piece of text takes when written into a buffer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextDelta {
  /// Number of line breaks in the text.
  pub lines_added:       usize,
  /// Chars after the last line break, or the whole length without one.
  pub last_line_columns: usize,
}

impl TextDelta {
  pub fn measure(text: &str) -> Self {
    let (lines_added, last_line_columns) = line_breaks(text);
    Self {
      lines_added,
      last_line_columns,
    }
  }

  #[inline]
  pub const fn is_single_line(&self) -> bool {
    self.lines_added == 0
  }
}
