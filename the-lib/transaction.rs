//! Atomic, invertible edit batches over a [`Buffer`].
//!
//! A [`Batch`] is a set of [`Edit`]s, each replacing a [`Range`] of the buffer
//! with new text. Applying a batch writes every edit in one logical step and
//! returns the inverse batch: the edits that, applied to the resulting
//! buffer, bring back the text as it was before.
//!
//! # Coordinates
//!
//! Every range in a batch is relative to the buffer as it is right before the
//! batch lands. The inverse batch is relative to the buffer right after it.
//! Converting between the two is the drift computation in [`Drift`]: earlier
//! edits in the batch shift the lines of every later edit, and the columns of
//! later edits that start on the line an earlier edit ended on.
//!
//! ```ignore
//! use the_lib::{buffer::RopeBuffer, position::Range, transaction::{Batch, Edit}};
//!
//! let mut buffer = RopeBuffer::from("ab x");
//! let batch = Batch::new(vec![
//!   Edit::new(Range::new((0, 0), (0, 2)), "abcd"),
//!   Edit::new(Range::new((0, 3), (0, 4)), "y"),
//! ]);
//!
//! let inverse = batch.apply(&mut buffer).unwrap();
//! assert_eq!(buffer.text().to_string(), "abcd y");
//!
//! inverse.apply(&mut buffer).unwrap();
//! assert_eq!(buffer.text().to_string(), "ab x");
//! ```
//!
//! # Atomicity
//!
//! Nothing is written until the whole batch validated and every replaced
//! span was read. An edit whose boundary would split or join a `\r\n` pair is
//! widened over the `\r` or `\n` next to it, so line breaks are counted the
//! same way before and after the write. Writes go bottom-up so each edit's original coordinates are
//! still valid when it lands. If the buffer refuses a write, the edits
//! already written are rolled back and [`TransactionError::BufferWriteFailed`]
//! is returned without an inverse.

use std::fmt;

use thiserror::Error;

use crate::{
  Tendril,
  buffer::{
    Buffer,
    BufferError,
  },
  position::{
    Position,
    Range,
    TextDelta,
  },
};

pub type Result<T> = std::result::Result<T, TransactionError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransactionError {
  #[error("invalid batch: {range} overlaps previous edit ending at {prev_end}")]
  OverlappingEdits { prev_end: Position, range: Range },
  #[error("invalid batch: edit range {range} starts after it ends")]
  InvalidRange { range: Range },
  #[error("invalid batch: edit {range} meets the next edit inside a CRLF pair")]
  SplitsLineEnding { range: Range },
  #[error("failed to read {range} before editing: {source}")]
  BufferReadFailed {
    range:  Range,
    #[source]
    source: BufferError,
  },
  #[error("buffer refused to write {range}: {source}")]
  BufferWriteFailed {
    range:  Range,
    #[source]
    source: BufferError,
  },
}

impl TransactionError {
  /// Malformed batches are programming errors, never the buffer's fault.
  pub fn is_invalid_batch(&self) -> bool {
    matches!(
      self,
      Self::OverlappingEdits { .. } | Self::InvalidRange { .. } | Self::SplitsLineEnding { .. }
    )
  }
}

/// Replace the buffer content inside `range` with `new_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
  pub range:    Range,
  pub new_text: Tendril,
}

impl Edit {
  pub fn new(range: Range, new_text: impl Into<Tendril>) -> Self {
    Self {
      range,
      new_text: new_text.into(),
    }
  }

  pub fn insert(at: Position, text: impl Into<Tendril>) -> Self {
    Self::new(Range::point(at), text)
  }

  pub fn delete(range: Range) -> Self {
    Self::new(range, Tendril::new())
  }

  /// Where this edit's text ends once written, in the coordinates of the
  /// buffer where nothing before `range.start` moved.
  fn written_end(&self) -> Position {
    self.range.start.traverse(&self.new_text)
  }
}

impl fmt::Display for Edit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} => {:?}", self.range, self.new_text.as_str())
  }
}

/// A set of non-overlapping edits applied as one transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
  edits: Vec<Edit>,
}

impl Batch {
  pub fn new(edits: Vec<Edit>) -> Self {
    Self { edits }
  }

  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      edits: Vec::with_capacity(capacity),
    }
  }

  pub fn push(&mut self, edit: Edit) {
    self.edits.push(edit);
  }

  pub fn edits(&self) -> &[Edit] {
    &self.edits
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.edits.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.edits.is_empty()
  }

  /// Edits ordered by range, checked for overlap.
  ///
  /// Equal ranges keep their input order, so two insertions at the same
  /// position land in the order they were given.
  fn sorted(&self) -> Result<Vec<&Edit>> {
    let mut edits: Vec<&Edit> = self.edits.iter().collect();
    edits.sort_by(|a, b| a.range.cmp(&b.range));

    let mut prev_end: Option<Position> = None;
    for edit in &edits {
      if !edit.range.is_ordered() {
        return Err(TransactionError::InvalidRange { range: edit.range });
      }
      if let Some(prev_end) = prev_end
        && edit.range.start < prev_end
      {
        return Err(TransactionError::OverlappingEdits {
          prev_end,
          range: edit.range,
        });
      }
      prev_end = Some(edit.range.end);
    }

    Ok(edits)
  }

  /// Apply this batch to `buffer` and return its inverse.
  ///
  /// The inverse lists one edit per forward edit, in ascending order, with
  /// ranges valid in the buffer as it is after this call returns.
  ///
  /// # Errors
  /// [`TransactionError::OverlappingEdits`] and
  /// [`TransactionError::InvalidRange`] for a malformed batch,
  /// [`TransactionError::BufferReadFailed`] when a range can't be read, and
  /// [`TransactionError::BufferWriteFailed`] when the buffer refuses a write.
  /// The buffer is unchanged in every error case.
  pub fn apply<B: Buffer + ?Sized>(&self, buffer: &mut B) -> Result<Batch> {
    let edits = widen_line_endings(buffer, &self.sorted()?)?;

    let mut inverse = Batch::with_capacity(edits.len());
    let mut drift = Drift::default();
    for (edit, replaced) in &edits {
      inverse.push(Edit::new(drift.track(edit), replaced.as_str()));
    }
    let edits: Vec<Edit> = edits.into_iter().map(|(edit, _)| edit).collect();

    for (idx, edit) in edits.iter().enumerate().rev() {
      if let Err(source) = buffer.replace(edit.range, &edit.new_text) {
        rollback(buffer, &edits[idx + 1..], &inverse.edits[idx + 1..]);
        return Err(TransactionError::BufferWriteFailed {
          range: edit.range,
          source,
        });
      }
    }

    tracing::debug!(
      edits = edits.len(),
      "applied edit batch; inverse: [{}]",
      DisplayEdits(&inverse.edits)
    );
    Ok(inverse)
  }
}

impl FromIterator<Edit> for Batch {
  fn from_iter<I: IntoIterator<Item = Edit>>(iter: I) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

impl IntoIterator for Batch {
  type Item = Edit;
  type IntoIter = std::vec::IntoIter<Edit>;

  fn into_iter(self) -> Self::IntoIter {
    self.edits.into_iter()
  }
}

/// Undo the tail of a batch whose writes stopped part way.
///
/// `applied` holds the sorted edits that were written, `replaced` the text
/// each of them destroyed. Writes went bottom-up, so the lowest applied edit
/// was written last: undoing from the lowest one up means everything before
/// the edit being undone is untouched and its start is still valid.
fn rollback<B: Buffer + ?Sized>(buffer: &mut B, applied: &[Edit], replaced: &[Edit]) {
  for (edit, original) in applied.iter().zip(replaced) {
    let range = Range::new(edit.range.start, edit.written_end());
    if let Err(err) = buffer.replace(range, &original.new_text) {
      tracing::error!(%range, %err, "failed to roll back a partially applied batch");
      return;
    }
  }
}

/// What lies around one edit in the buffer before the batch.
struct Surroundings {
  replaced: String,
  /// The char right before the edit and where it starts.
  before:   Option<(char, Position)>,
  /// The char right after the edit and where it starts.
  after:    Option<(char, Position)>,
}

fn is_crlf(left: Option<char>, right: Option<char>) -> bool {
  left == Some('\r') && right == Some('\n')
}

/// The char ending right at `pos`.
fn char_before<B: Buffer + ?Sized>(buffer: &B, pos: Position) -> Option<(char, Position)> {
  if pos.column > 0 {
    let start = Position::new(pos.line, pos.column - 1);
    let text = buffer.text_at(Range::new(start, pos)).ok()?;
    return text.chars().next().map(|ch| (ch, start));
  }

  // The previous line's terminator.
  let line = pos.line.checked_sub(1)?;
  let text = buffer.text_at(Range::new((line, 0), pos)).ok()?;
  let column = text.chars().count().checked_sub(1)?;
  text.chars().last().map(|ch| (ch, Position::new(line, column)))
}

/// The char starting right at `pos`.
fn char_at<B: Buffer + ?Sized>(buffer: &B, pos: Position) -> Option<(char, Position)> {
  let next = Position::new(pos.line, pos.column + 1);
  if let Ok(text) = buffer.text_at(Range::new(pos, next)) {
    return text.chars().next().map(|ch| (ch, pos));
  }

  // `pos` is past the terminator of its line.
  let start = Position::new(pos.line + 1, 0);
  let text = buffer
    .text_at(Range::new(start, Position::new(start.line, 1)))
    .ok()?;
  text.chars().next().map(|ch| (ch, start))
}

/// Reads the text every edit replaces and widens edits that would split or
/// join a `\r\n` pair.
///
/// [`Drift`] measures new text on its own, which only matches the buffer
/// while no pair straddles an edit boundary, neither before nor after the
/// write. Such a boundary is moved over the `\r` or `\n` of unchanged text
/// next to it, taking that char into both the replaced and the new text.
/// Two edits meeting inside a pair have nothing to widen over and are
/// rejected.
fn widen_line_endings<B: Buffer + ?Sized>(
  buffer: &B,
  edits: &[&Edit],
) -> Result<Vec<(Edit, String)>> {
  let mut around = Vec::with_capacity(edits.len());
  for edit in edits {
    let replaced = buffer
      .text_at(edit.range)
      .map_err(|source| TransactionError::BufferReadFailed {
        range: edit.range,
        source,
      })?;
    around.push(Surroundings {
      replaced,
      before: char_before(buffer, edit.range.start),
      after: char_at(buffer, edit.range.end),
    });
  }

  let touches_next = |idx: usize| {
    edits
      .get(idx + 1)
      .is_some_and(|next| next.range.start == edits[idx].range.end)
  };

  // The chars around each edit once the whole batch is written. Adjacent
  // edits see each other's new text, or further through an empty one.
  let mut written_before: Vec<Option<char>> = Vec::with_capacity(edits.len());
  for idx in 0..edits.len() {
    let ch = match idx.checked_sub(1) {
      Some(prev) if touches_next(prev) => {
        edits[prev].new_text.chars().last().or(written_before[prev])
      },
      _ => around[idx].before.map(|(ch, _)| ch),
    };
    written_before.push(ch);
  }
  let mut written_after: Vec<Option<char>> = vec![None; edits.len()];
  for idx in (0..edits.len()).rev() {
    written_after[idx] = if touches_next(idx) {
      edits[idx + 1].new_text.chars().next().or(written_after[idx + 1])
    } else {
      around[idx].after.map(|(ch, _)| ch)
    };
  }

  let mut widened = Vec::with_capacity(edits.len());
  for (idx, (edit, around)) in edits.iter().zip(around).enumerate() {
    let Surroundings {
      mut replaced,
      before,
      after,
    } = around;
    let old_first = replaced.chars().next().or(after.map(|(ch, _)| ch));
    let old_last = replaced.chars().last().or(before.map(|(ch, _)| ch));
    let new_first = edit.new_text.chars().next().or(written_after[idx]);
    let new_last = edit.new_text.chars().last().or(written_before[idx]);

    let splits_start =
      is_crlf(before.map(|(ch, _)| ch), old_first) || is_crlf(written_before[idx], new_first);
    let splits_end =
      is_crlf(old_last, after.map(|(ch, _)| ch)) || is_crlf(new_last, written_after[idx]);
    if !splits_start && !splits_end {
      widened.push(((*edit).clone(), replaced));
      continue;
    }

    let touches_prev = idx.checked_sub(1).is_some_and(touches_next);
    let mut range = edit.range;
    let mut new_text = Tendril::new();
    if splits_start {
      match before {
        Some((cr, at)) if !touches_prev => {
          range.start = at;
          new_text.push(cr);
          replaced.insert(0, cr);
        },
        _ => return Err(TransactionError::SplitsLineEnding { range: edit.range }),
      }
    }
    new_text.push_str(&edit.new_text);
    if splits_end {
      match after {
        // A `\n` always ends its line.
        Some((lf, at)) if !touches_next(idx) => {
          range.end = Position::new(at.line + 1, 0);
          new_text.push(lf);
          replaced.push(lf);
        },
        _ => return Err(TransactionError::SplitsLineEnding { range: edit.range }),
      }
    }

    tracing::trace!(from = %edit.range, to = %range, "widened edit over a CRLF pair");
    widened.push((Edit::new(range, new_text), replaced));
  }

  Ok(widened)
}

/// Running offsets that map positions from the pre-batch buffer to the
/// post-batch buffer while walking a batch in ascending order.
#[derive(Debug, Default)]
struct Drift {
  /// End line, in pre-batch coordinates, of the previous edit.
  last_old_end_line: Option<usize>,
  /// Column shift for edits starting on `last_old_end_line`.
  columns_added:     isize,
  /// Line shift for every later edit.
  lines_added:       isize,
}

impl Drift {
  /// Returns the range `edit`'s new text occupies after the batch, then
  /// accounts for the shift it causes.
  fn track(&mut self, edit: &Edit) -> Range {
    let range = edit.range;
    debug_assert!(self.last_old_end_line.is_none_or(|line| range.start.line >= line));

    if self.last_old_end_line != Some(range.start.line) {
      self.columns_added = 0;
    }

    let new_start = Position::new(
      range.start.line.saturating_add_signed(self.lines_added),
      range.start.column.saturating_add_signed(self.columns_added),
    );
    let delta = TextDelta::measure(&edit.new_text);
    let new_end = new_start.advance(delta);

    let last_line_columns = to_isize(delta.last_line_columns);
    let start_column = to_isize(range.start.column);
    let end_column = to_isize(range.end.column);
    match (range.is_single_line(), delta.is_single_line()) {
      // "123[456]789" => "123[ab]789"
      (true, true) => self.columns_added += last_line_columns - (end_column - start_column),
      // "123[45\n6]789" => "123[ab]789"
      (false, true) => self.columns_added += last_line_columns + start_column - end_column,
      // "123[456]789" => "123[a\nb]789" and "123[45\n6]789" => "123[a\nbc]789":
      // the rest of the end line now follows the new text's last line. This is
      // `end_column`, not `start_column`. With the start column a
      // later edit on the same line lands off by the replaced span's width.
      (_, false) => self.columns_added = last_line_columns - end_column,
    }
    self.lines_added += to_isize(delta.lines_added) - to_isize(range.line_span());
    self.last_old_end_line = Some(range.end.line);

    Range {
      start: new_start,
      end:   new_end,
    }
  }
}

#[inline]
fn to_isize(n: usize) -> isize {
  isize::try_from(n).unwrap_or(isize::MAX)
}

struct DisplayEdits<'a>(&'a [Edit]);

impl fmt::Display for DisplayEdits<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (idx, edit) in self.0.iter().enumerate() {
      if idx > 0 {
        f.write_str(", ")?;
      }
      write!(f, "{edit}")?;
    }
    Ok(())
  }
}
