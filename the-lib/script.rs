//! The boundary between a transform session and the scripting host that runs
//! user scripts.
//!
//! A host only ever sees [`Capabilities`]: a way to search the target buffer
//! and a way to replace what a search found. It has no handle on the buffer,
//! the history or the session itself, and a host implementation lives in its
//! own crate, so the boundary holds regardless of what the host's language
//! could otherwise do.

use std::time::{
  Duration,
  Instant,
};

use thiserror::Error;

use crate::{
  search::{
    Match,
    MatchSet,
    Pattern,
    SearchError,
  },
  transaction::TransactionError,
};

/// Why a capability call was refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
  /// The run this call belongs to was superseded by a restore or a newer run.
  #[error("script run is no longer current")]
  Stale,
  #[error("script ran past its deadline")]
  TimedOut,
  #[error(transparent)]
  InvalidPattern(#[from] SearchError),
  #[error("failed to apply replacements: {0}")]
  Buffer(#[from] TransactionError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
  #[error("syntax error at {line}:{column}: {message}")]
  Syntax {
    line:    usize,
    column:  usize,
    message: String,
  },
  /// The script raised an error on purpose.
  #[error("script failed: {0}")]
  Thrown(String),
  #[error("script exceeded its time limit of {0:?}")]
  TimedOut(Duration),
  #[error("script call rejected: {0}")]
  Rejected(#[from] CapabilityError),
  #[error("{0}")]
  Runtime(String),
}

/// Maps a match and its index within the match set to its replacement.
pub type Mapper<'a> = dyn FnMut(&Match, usize) -> Result<String, ScriptError> + 'a;

/// Everything a script may do.
pub trait Capabilities {
  /// Searches the target buffer and highlights what was found.
  fn find(&mut self, pattern: &Pattern) -> Result<MatchSet, ScriptError>;

  /// Replaces every match in `matches` with `mapper`'s result, as one
  /// undoable batch.
  fn replace(&mut self, matches: &MatchSet, mapper: &mut Mapper<'_>) -> Result<(), ScriptError>;

  /// The instant the run has to be finished by.
  fn deadline(&self) -> Instant;

  #[inline]
  fn expired(&self) -> bool {
    Instant::now() >= self.deadline()
  }
}

/// Runs a script's source against a set of capabilities.
///
/// Implementations must give up once [`Capabilities::deadline`] has passed.
/// `limit` is the budget the deadline was derived from and is only meant for
/// error reporting.
pub trait ScriptHost: Send + Sync {
  fn run(
    &self,
    source: &str,
    capabilities: &mut dyn Capabilities,
    limit: Duration,
  ) -> Result<(), ScriptError>;
}
