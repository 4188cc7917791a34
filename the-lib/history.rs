use thiserror::Error;

use crate::{
  buffer::Buffer,
  transaction::{
    Batch,
    TransactionError,
  },
};

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
  #[error("failed to restore buffer, dropped {remaining} unapplied batches: {source}")]
  RestoreFailed {
    remaining: usize,
    #[source]
    source:    TransactionError,
  },
}

/// Inverse batches recorded since the last snapshot.
///
/// The history is either absent, in which case nothing is recorded, or an open
/// scope holding the inverse of every batch applied since it opened, oldest
/// first. Restoring replays them newest first, each one against the buffer
/// exactly as the following batch left it.
#[derive(Debug, Default, Clone)]
pub struct History {
  scope: Option<Vec<Batch>>,
}

impl History {
  pub fn new() -> Self {
    Self::default()
  }

  /// Starts a new recording scope.
  ///
  /// Entries of a previous scope are dropped without being applied; call
  /// [`History::restore_all`] first to undo them.
  pub fn open_scope(&mut self) {
    if let Some(dropped) = self.scope.as_ref().filter(|scope| !scope.is_empty()) {
      tracing::debug!(dropped = dropped.len(), "opening scope over unrestored history");
    }
    self.scope = Some(Vec::new());
  }

  /// Stops recording. Nothing is restored.
  pub fn disable(&mut self) {
    self.scope = None;
  }

  #[inline]
  pub fn is_recording(&self) -> bool {
    self.scope.is_some()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.scope.as_ref().map_or(0, Vec::len)
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Appends an inverse batch. Ignored when no scope is open.
  pub fn record(&mut self, inverse: Batch) {
    if let Some(scope) = &mut self.scope {
      scope.push(inverse);
    }
  }

  /// Reverts every recorded batch, newest first, and returns how many were
  /// applied. The scope stays open and empty.
  ///
  /// # Errors
  /// If an inverse fails to apply, the entries behind it are dropped,
  /// recording stops and [`HistoryError::RestoreFailed`] is returned. The
  /// buffer keeps the batches reverted up to that point.
  pub fn restore_all<B: Buffer + ?Sized>(&mut self, buffer: &mut B) -> Result<usize> {
    let Some(scope) = &mut self.scope else {
      return Ok(0);
    };

    let mut restored = 0;
    while let Some(inverse) = scope.pop() {
      if let Err(source) = inverse.apply(buffer) {
        let remaining = scope.len();
        self.scope = None;
        return Err(HistoryError::RestoreFailed { remaining, source });
      }
      restored += 1;
    }

    if restored > 0 {
      tracing::debug!(restored, "restored buffer to snapshot");
    }
    Ok(restored)
  }
}
