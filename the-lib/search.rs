//! Pattern matching over a whole buffer.
//!
//! A [`Pattern`] is either a regular expression with a set of flags or a
//! literal string. [`find_matches`] runs it over [`Buffer::full_text`] and
//! converts each match to a [`Range`] through [`Buffer::position_at`].
//!
//! # Flags
//!
//! - `i`: case-insensitive
//! - `m`: `^` and `$` match at line boundaries
//! - `s`: `.` matches `\n`
//! - `x`: whitespace and `#` comments in the pattern are ignored
//! - `g`: accepted for familiarity; every search is global
//!
//! # Bounds
//!
//! A search keeps at most `limit` matches. Anything past that is ignored
//! without an error.

use std::fmt;

use regex::{
  Regex,
  RegexBuilder,
};
use thiserror::Error;

use crate::{
  buffer::Buffer,
  position::Range,
};

/// Default number of matches a single search keeps.
pub const DEFAULT_MATCH_LIMIT: usize = 1000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
  #[error("unknown pattern flag '{0}'")]
  UnknownFlag(char),
  #[error("invalid pattern /{pattern}/: {message}")]
  InvalidRegex { pattern: String, message: String },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
  pub case_insensitive:     bool,
  pub multi_line:           bool,
  pub dot_matches_new_line: bool,
  pub ignore_whitespace:    bool,
}

impl Flags {
  pub fn parse(flags: &str) -> Result<Self, SearchError> {
    let mut parsed = Self::default();
    for flag in flags.chars() {
      match flag {
        'i' => parsed.case_insensitive = true,
        'm' => parsed.multi_line = true,
        's' => parsed.dot_matches_new_line = true,
        'x' => parsed.ignore_whitespace = true,
        'g' => {},
        other => return Err(SearchError::UnknownFlag(other)),
      }
    }
    Ok(parsed)
  }
}

/// A compiled search pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
  regex:   Regex,
  literal: bool,
}

impl Pattern {
  pub fn regex(source: &str, flags: Flags) -> Result<Self, SearchError> {
    Self::build(source, flags, false)
  }

  /// Matches `text` exactly, regex metacharacters included.
  pub fn literal(text: &str) -> Result<Self, SearchError> {
    Self::build(&regex::escape(text), Flags::default(), true)
  }

  fn build(source: &str, flags: Flags, literal: bool) -> Result<Self, SearchError> {
    let regex = RegexBuilder::new(source)
      .case_insensitive(flags.case_insensitive)
      .multi_line(flags.multi_line)
      .dot_matches_new_line(flags.dot_matches_new_line)
      .ignore_whitespace(flags.ignore_whitespace)
      .build()
      .map_err(|err| {
        SearchError::InvalidRegex {
          pattern: source.to_string(),
          message: err.to_string(),
        }
      })?;
    Ok(Self { regex, literal })
  }

  pub fn is_literal(&self) -> bool {
    self.literal
  }

  pub fn as_str(&self) -> &str {
    self.regex.as_str()
  }

  /// Whether the pattern occurs anywhere in `text`.
  pub fn is_match(&self, text: &str) -> bool {
    self.regex.is_match(text)
  }
}

impl fmt::Display for Pattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "/{}/", self.regex.as_str())
  }
}

/// One occurrence of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
  pub range:  Range,
  pub text:   String,
  /// Capture groups after the whole match. `None` for a group that did not
  /// take part.
  pub groups: Vec<Option<String>>,
}

impl Match {
  /// Group `idx` of the match, `0` being the whole match. A group that did
  /// not take part is empty.
  pub fn group(&self, idx: usize) -> Option<&str> {
    match idx.checked_sub(1) {
      None => Some(&self.text),
      Some(idx) => self.groups.get(idx).map(|group| group.as_deref().unwrap_or("")),
    }
  }
}

/// Collects up to `limit` non-overlapping matches of `pattern`, in buffer
/// order.
pub fn find_matches<B: Buffer + ?Sized>(buffer: &B, pattern: &Pattern, limit: usize) -> Vec<Match> {
  let text = buffer.full_text();
  let mut matches = Vec::new();

  for captures in pattern.regex.captures_iter(&text) {
    if matches.len() == limit {
      tracing::debug!(limit, %pattern, "match limit reached, ignoring further matches");
      break;
    }
    let Some(found) = captures.get(0) else {
      continue;
    };
    matches.push(Match {
      range:  Range::new(
        buffer.position_at(found.start()),
        buffer.position_at(found.end()),
      ),
      text:   found.as_str().to_string(),
      groups: captures
        .iter()
        .skip(1)
        .map(|group| group.map(|group| group.as_str().to_string()))
        .collect(),
    });
  }

  matches
}

/// The matches a script got back from a search.
///
/// A match set belongs to the script run that produced it. Only the session
/// that ran the search builds one, and it refuses sets from an earlier run.
#[derive(Debug, Clone)]
pub struct MatchSet {
  run:     u64,
  matches: Vec<Match>,
}

impl MatchSet {
  pub(crate) fn new(run: u64, matches: Vec<Match>) -> Self {
    Self { run, matches }
  }

  pub(crate) fn run(&self) -> u64 {
    self.run
  }

  pub(crate) fn matches(&self) -> &[Match] {
    &self.matches
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.matches.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.matches.is_empty()
  }

  /// The first `n` matches, still bound to the same run.
  pub fn first(&self, n: usize) -> MatchSet {
    Self::new(self.run, self.matches.iter().take(n).cloned().collect())
  }

  /// The match at `idx` alone, or an empty set when there is none.
  pub fn nth(&self, idx: usize) -> MatchSet {
    Self::new(self.run, self.matches.get(idx).cloned().into_iter().collect())
  }

  /// The matches `keep` accepts, still bound to the same run.
  pub fn filter(&self, mut keep: impl FnMut(&Match) -> bool) -> MatchSet {
    Self::new(
      self.run,
      self.matches.iter().filter(|found| keep(found)).cloned().collect(),
    )
  }

  /// Matched texts, in buffer order.
  pub fn texts(&self) -> impl Iterator<Item = &str> {
    self.matches.iter().map(|m| m.text.as_str())
  }

  pub fn ranges(&self) -> impl Iterator<Item = Range> + '_ {
    self.matches.iter().map(|m| m.range)
  }
}
