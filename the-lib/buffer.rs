//! The text buffer the transform engine edits, and the highlight sink it marks
//! matches in.
//!
//! The engine never keeps a copy of the text. Everything goes through
//! [`Buffer`], which an editor integration implements over its own document
//! type. [`RopeBuffer`] is the implementation used by the command line front
//! end and by tests.

use std::{
  borrow::Cow,
  num::NonZeroUsize,
  ops,
};

use ropey::Rope;
use thiserror::Error;

use crate::position::{
  Position,
  Range,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(NonZeroUsize);

impl BufferId {
  pub const fn new(id: NonZeroUsize) -> Self {
    Self(id)
  }

  pub const fn get(self) -> NonZeroUsize {
    self.0
  }
}

impl From<NonZeroUsize> for BufferId {
  fn from(value: NonZeroUsize) -> Self {
    Self::new(value)
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BufferError {
  #[error("buffer is readonly")]
  Readonly,
  #[error("position {pos} is out of bounds")]
  OutOfBounds { pos: Position },
  #[error("invalid range {range}: start is after end")]
  InvalidRange { range: Range },
  #[error("buffer rejected the edit: {0}")]
  Rejected(String),
}

pub type Result<T> = std::result::Result<T, BufferError>;

/// Read and write access to a live text buffer.
///
/// `replace` is a single primitive edit. The engine calls it several times
/// for one batch; implementations backed by an editor should treat those calls
/// as one undo step on their side if they have such a notion.
pub trait Buffer {
  /// The text currently inside `range`.
  fn text_at(&self, range: Range) -> Result<String>;

  fn full_text(&self) -> Cow<'_, str>;

  /// Converts a byte offset into [`Buffer::full_text`] to a position.
  fn position_at(&self, offset: usize) -> Position;

  fn replace(&mut self, range: Range, text: &str) -> Result<()>;
}

/// Cosmetic marking of ranges. Every call replaces the previous set.
pub trait Highlight {
  fn set_markers(&mut self, ranges: &[Range]);

  fn clear_markers(&mut self) {
    self.set_markers(&[]);
  }
}

/// A [`Buffer`] over a [`Rope`], with its highlight markers kept alongside.
#[derive(Debug, Clone, Default)]
pub struct RopeBuffer {
  text:     Rope,
  markers:  Vec<Range>,
  readonly: bool,
}

impl RopeBuffer {
  pub fn new(text: Rope) -> Self {
    Self {
      text,
      markers: Vec::new(),
      readonly: false,
    }
  }

  pub fn text(&self) -> &Rope {
    &self.text
  }

  pub fn markers(&self) -> &[Range] {
    &self.markers
  }

  pub fn readonly(&self) -> bool {
    self.readonly
  }

  pub fn set_readonly(&mut self, readonly: bool) {
    self.readonly = readonly;
  }

  /// Char index of `pos`.
  ///
  /// A column may run up to the start of the next line, so positions inside
  /// a line terminator are accepted the same way [`Buffer::position_at`]
  /// produces them.
  pub fn char_idx(&self, pos: Position) -> Result<usize> {
    if pos.line >= self.text.len_lines() {
      return Err(BufferError::OutOfBounds { pos });
    }

    let line_start = self.text.line_to_char(pos.line);
    let next_line_start = if pos.line + 1 < self.text.len_lines() {
      self.text.line_to_char(pos.line + 1)
    } else {
      self.text.len_chars()
    };

    let idx = line_start + pos.column;
    if idx > next_line_start {
      return Err(BufferError::OutOfBounds { pos });
    }
    Ok(idx)
  }

  fn char_range(&self, range: Range) -> Result<ops::Range<usize>> {
    if !range.is_ordered() {
      return Err(BufferError::InvalidRange { range });
    }
    Ok(self.char_idx(range.start)?..self.char_idx(range.end)?)
  }
}

impl From<&str> for RopeBuffer {
  fn from(text: &str) -> Self {
    Self::new(Rope::from_str(text))
  }
}

impl From<Rope> for RopeBuffer {
  fn from(text: Rope) -> Self {
    Self::new(text)
  }
}

impl Buffer for RopeBuffer {
  fn text_at(&self, range: Range) -> Result<String> {
    let chars = self.char_range(range)?;
    Ok(self.text.slice(chars).to_string())
  }

  fn full_text(&self) -> Cow<'_, str> {
    match self.text.slice(..).as_str() {
      Some(text) => Cow::Borrowed(text),
      None => Cow::Owned(self.text.to_string()),
    }
  }

  fn position_at(&self, offset: usize) -> Position {
    let offset = offset.min(self.text.len_bytes());
    let char_idx = self.text.byte_to_char(offset);
    let line = self.text.char_to_line(char_idx);
    Position::new(line, char_idx - self.text.line_to_char(line))
  }

  fn replace(&mut self, range: Range, text: &str) -> Result<()> {
    if self.readonly {
      return Err(BufferError::Readonly);
    }

    let chars = self.char_range(range)?;
    let start = chars.start;
    if !chars.is_empty() {
      self.text.remove(chars);
    }
    if !text.is_empty() {
      self.text.insert(start, text);
    }
    Ok(())
  }
}

impl Highlight for RopeBuffer {
  fn set_markers(&mut self, ranges: &[Range]) {
    self.markers.clear();
    self.markers.extend_from_slice(ranges);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn position_at_converts_byte_offsets() {
    let buffer = RopeBuffer::from("héllo\nwörld");
    assert_eq!(buffer.position_at(0), Position::new(0, 0));
    // `é` is two bytes wide.
    assert_eq!(buffer.position_at(3), Position::new(0, 2));
    assert_eq!(buffer.position_at(7), Position::new(1, 0));
    assert_eq!(buffer.position_at(100), Position::new(1, 5));
  }

  #[test]
  fn text_at_reads_across_lines() {
    let buffer = RopeBuffer::from("abc\ndef\nghi");
    let text = buffer.text_at(Range::new((0, 1), (2, 1))).unwrap();
    assert_eq!(text, "bc\ndef\ng");
  }

  #[test]
  fn replace_multi_line_range() {
    let mut buffer = RopeBuffer::from("abc\ndef\nghi");
    buffer.replace(Range::new((0, 2), (1, 1)), "XY").unwrap();
    assert_eq!(buffer.text().to_string(), "abXYef\nghi");
  }

  #[test]
  fn replace_insertion_at_end_of_text() {
    let mut buffer = RopeBuffer::from("abc\n");
    buffer.replace(Range::point(Position::new(1, 0)), "d").unwrap();
    assert_eq!(buffer.text().to_string(), "abc\nd");
  }

  #[test]
  fn out_of_bounds_positions_are_rejected() {
    let mut buffer = RopeBuffer::from("ab\ncd");
    assert_eq!(
      buffer.text_at(Range::new((0, 0), (5, 0))),
      Err(BufferError::OutOfBounds {
        pos: Position::new(5, 0),
      })
    );
    assert_eq!(
      buffer.replace(Range::new((1, 0), (1, 9)), "x"),
      Err(BufferError::OutOfBounds {
        pos: Position::new(1, 9),
      })
    );
    assert_eq!(buffer.text().to_string(), "ab\ncd");
  }

  #[test]
  fn readonly_buffer_refuses_writes() {
    let mut buffer = RopeBuffer::from("abc");
    buffer.set_readonly(true);
    assert_eq!(
      buffer.replace(Range::new((0, 0), (0, 1)), "x"),
      Err(BufferError::Readonly)
    );
    assert_eq!(buffer.text().to_string(), "abc");
  }

  #[test]
  fn markers_replace_previous_set() {
    let mut buffer = RopeBuffer::from("abc");
    buffer.set_markers(&[Range::new((0, 0), (0, 1)), Range::new((0, 2), (0, 3))]);
    assert_eq!(buffer.markers().len(), 2);
    buffer.clear_markers();
    assert!(buffer.markers().is_empty());
  }
}
