//! One managed target buffer and the script runs against it.
//!
//! A [`Session`] owns the buffer together with the [`History`] of the current
//! run. Every run starts by restoring the buffer to the state before the
//! previous run, opens a new history scope and hands the script host a
//! [`Capabilities`] view bound to that run.
//!
//! Runs are numbered. The host executes without the session lock held, and
//! every capability call re-locks and checks that its run is still the
//! current one. A restore, a close or a newer run all move the number on, so
//! a script that is still going afterwards can no longer touch the buffer.

use std::{
  sync::Arc,
  time::Instant,
};

use parking_lot::{
  Mutex,
  MutexGuard,
};
use thiserror::Error;

use crate::{
  buffer::{
    Buffer,
    Highlight,
  },
  config::TransformConfig,
  history::{
    History,
    HistoryError,
  },
  script::{
    Capabilities,
    CapabilityError,
    Mapper,
    ScriptError,
    ScriptHost,
  },
  search::{
    MatchSet,
    Pattern,
    find_matches,
  },
  transaction::{
    Batch,
    Edit,
  },
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
  #[error(transparent)]
  Restore(#[from] HistoryError),
  #[error(transparent)]
  Script(#[from] ScriptError),
  #[error("session was abandoned after a failed restore")]
  Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
  #[default]
  Idle,
  Running,
  Restoring,
}

#[derive(Debug)]
struct State<B> {
  buffer:   B,
  history:  History,
  phase:    Phase,
  run:      u64,
  poisoned: bool,
}

impl<B: Buffer + Highlight> State<B> {
  fn restore(&mut self) -> Result<usize, HistoryError> {
    self.run += 1;
    self.phase = Phase::Restoring;
    self.buffer.clear_markers();

    let result = self.history.restore_all(&mut self.buffer);
    if result.is_err() {
      self.poisoned = true;
    }
    self.phase = Phase::Idle;
    result
  }
}

/// Shared handle to a managed buffer. Clones refer to the same session.
#[derive(Debug)]
pub struct Session<B> {
  state: Arc<Mutex<State<B>>>,
}

impl<B> Clone for Session<B> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
    }
  }
}

impl<B: Buffer + Highlight> Session<B> {
  pub fn new(buffer: B) -> Self {
    Self {
      state: Arc::new(Mutex::new(State {
        buffer,
        history: History::new(),
        phase: Phase::Idle,
        run: 0,
        poisoned: false,
      })),
    }
  }

  pub fn phase(&self) -> Phase {
    self.state.lock().phase
  }

  /// Number of the latest run. Zero before the first one.
  pub fn current_run(&self) -> u64 {
    self.state.lock().run
  }

  /// Inverse batches recorded by the current run.
  pub fn history_len(&self) -> usize {
    self.state.lock().history.len()
  }

  pub fn is_poisoned(&self) -> bool {
    self.state.lock().poisoned
  }

  pub fn with_buffer<R>(&self, f: impl FnOnce(&B) -> R) -> R {
    f(&self.state.lock().buffer)
  }

  /// Undoes everything the current run did and clears the highlights.
  ///
  /// A script still running for that run is cut off from the buffer.
  ///
  /// # Errors
  /// [`HistoryError::RestoreFailed`] when an inverse batch can't be applied.
  /// The session is poisoned afterwards: later runs are refused.
  pub fn restore(&self) -> Result<usize, HistoryError> {
    self.state.lock().restore()
  }

  /// Restores the buffer and stops recording. The session is done after
  /// this; the caller drops it.
  pub fn close(&self) -> Result<usize, HistoryError> {
    let restored = self.restore();
    self.state.lock().history.disable();
    restored
  }

  /// Restores the previous run, then runs `source` under `config`'s limits.
  ///
  /// On a script failure the edits it already applied stay in the buffer and
  /// in the history, so the next restore still undoes them.
  pub fn run_script(
    &self,
    host: &dyn ScriptHost,
    source: &str,
    config: &TransformConfig,
  ) -> Result<(), SessionError> {
    // One lock from restore to the new scope, so no other run can record
    // in between and have its entries dropped by `open_scope`.
    let run = {
      let mut state = self.state.lock();
      if state.poisoned {
        return Err(SessionError::Poisoned);
      }
      state.restore()?;
      state.history.open_scope();
      state.run += 1;
      state.phase = Phase::Running;
      state.run
    };

    let limit = config.time_limit();
    let mut capabilities = RunCapabilities {
      session: self,
      run,
      deadline: Instant::now() + limit,
      match_limit: config.match_limit,
    };
    tracing::debug!(run, ?limit, "running transform script");
    let result = host.run(source, &mut capabilities, limit);

    let mut state = self.state.lock();
    if state.run == run && state.phase == Phase::Running {
      state.phase = Phase::Idle;
    }
    tracing::debug!(run, batches = state.history.len(), "transform script finished");
    result.map_err(SessionError::from)
  }
}

/// The capabilities of one run.
struct RunCapabilities<'a, B> {
  session:     &'a Session<B>,
  run:         u64,
  deadline:    Instant,
  match_limit: usize,
}

impl<B: Buffer + Highlight> RunCapabilities<'_, B> {
  /// Locks the session if this run may still act on it.
  fn lock(&self) -> Result<MutexGuard<'_, State<B>>, CapabilityError> {
    let state = self.session.state.lock();
    if state.run != self.run || state.phase != Phase::Running {
      return Err(CapabilityError::Stale);
    }
    if self.expired() {
      return Err(CapabilityError::TimedOut);
    }
    Ok(state)
  }
}

impl<B: Buffer + Highlight> Capabilities for RunCapabilities<'_, B> {
  fn find(&mut self, pattern: &Pattern) -> Result<MatchSet, ScriptError> {
    let mut state = self.lock()?;
    let matches = find_matches(&state.buffer, pattern, self.match_limit);
    let ranges: Vec<_> = matches.iter().map(|m| m.range).collect();
    state.buffer.set_markers(&ranges);
    tracing::trace!(run = self.run, %pattern, matches = matches.len(), "find");
    Ok(MatchSet::new(self.run, matches))
  }

  fn replace(&mut self, matches: &MatchSet, mapper: &mut Mapper<'_>) -> Result<(), ScriptError> {
    if matches.run() != self.run {
      return Err(CapabilityError::Stale.into());
    }
    // Fail early, the mapper may be expensive.
    drop(self.lock()?);

    let mut batch = Batch::with_capacity(matches.len());
    for (idx, found) in matches.matches().iter().enumerate() {
      if self.expired() {
        return Err(CapabilityError::TimedOut.into());
      }
      batch.push(Edit::new(found.range, mapper(found, idx)?));
    }

    let mut guard = self.lock()?;
    if batch.is_empty() {
      return Ok(());
    }
    let state = &mut *guard;
    let inverse = batch
      .apply(&mut state.buffer)
      .map_err(CapabilityError::Buffer)?;
    state.history.record(inverse);
    Ok(())
  }

  fn deadline(&self) -> Instant {
    self.deadline
  }
}

#[cfg(test)]
mod test {
  use std::time::Duration;

  use super::*;
  use crate::{
    buffer::RopeBuffer,
    position::Range,
    search::Flags,
  };

  /// A host that runs a Rust closure as the script.
  struct FnHost<F>(F);

  impl<F> ScriptHost for FnHost<F>
  where
    F: Fn(&mut dyn Capabilities) -> Result<(), ScriptError> + Send + Sync,
  {
    fn run(
      &self,
      _source: &str,
      capabilities: &mut dyn Capabilities,
      _limit: Duration,
    ) -> Result<(), ScriptError> {
      (self.0)(capabilities)
    }
  }

  fn pattern(source: &str) -> Pattern {
    Pattern::regex(source, Flags::default()).unwrap()
  }

  fn text(session: &Session<RopeBuffer>) -> String {
    session.with_buffer(|buffer| buffer.text().to_string())
  }

  fn uppercase(caps: &mut dyn Capabilities) -> Result<(), ScriptError> {
    let matches = caps.find(&pattern("foo"))?;
    caps.replace(&matches, &mut |found, _| Ok(found.text.to_uppercase()))
  }

  #[test]
  fn run_then_restore() {
    let session = Session::new(RopeBuffer::from("foo bar foo"));
    let config = TransformConfig::default();

    session
      .run_script(&FnHost(uppercase), "", &config)
      .unwrap();
    assert_eq!(text(&session), "FOO bar FOO");
    assert_eq!(session.history_len(), 1);
    assert_eq!(session.phase(), Phase::Idle);
    session.with_buffer(|buffer| {
      assert_eq!(buffer.markers(), &[
        Range::new((0, 0), (0, 3)),
        Range::new((0, 8), (0, 11)),
      ]);
    });

    assert_eq!(session.restore(), Ok(1));
    assert_eq!(text(&session), "foo bar foo");
    session.with_buffer(|buffer| assert!(buffer.markers().is_empty()));
  }

  #[test]
  fn rerun_starts_from_restored_text() {
    let session = Session::new(RopeBuffer::from("a b"));
    let config = TransformConfig::default();
    let wrap = FnHost(|caps: &mut dyn Capabilities| -> Result<(), ScriptError> {
      let matches = caps.find(&pattern(r"\w"))?;
      caps.replace(&matches, &mut |found, idx| Ok(format!("[{}{idx}]", found.text)))
    });

    session.run_script(&wrap, "", &config).unwrap();
    session.run_script(&wrap, "", &config).unwrap();
    assert_eq!(text(&session), "[a0] [b1]");
    assert_eq!(session.history_len(), 1);
  }

  #[test]
  fn failure_keeps_applied_edits() {
    let session = Session::new(RopeBuffer::from("foo foo foo"));
    let host = FnHost(|caps: &mut dyn Capabilities| -> Result<(), ScriptError> {
      let matches = caps.find(&pattern("foo"))?;
      caps.replace(&matches.first(1), &mut |_, _| Ok("bar".into()))?;
      Err(ScriptError::Thrown("boom".into()))
    });

    let err = session
      .run_script(&host, "", &TransformConfig::default())
      .unwrap_err();
    assert_eq!(err, SessionError::Script(ScriptError::Thrown("boom".into())));
    assert_eq!(text(&session), "bar foo foo");
    assert_eq!(session.history_len(), 1);

    session.restore().unwrap();
    assert_eq!(text(&session), "foo foo foo");
  }

  #[test]
  fn failing_mapper_applies_nothing() {
    let session = Session::new(RopeBuffer::from("foo foo"));
    let host = FnHost(|caps: &mut dyn Capabilities| -> Result<(), ScriptError> {
      let matches = caps.find(&pattern("foo"))?;
      caps.replace(&matches, &mut |found, idx| {
        if idx == 1 {
          return Err(ScriptError::Runtime("mapper failed".into()));
        }
        Ok(found.text.to_uppercase())
      })
    });

    assert!(session.run_script(&host, "", &TransformConfig::default()).is_err());
    assert_eq!(text(&session), "foo foo");
    assert_eq!(session.history_len(), 0);
  }

  #[test]
  fn expired_deadline_rejects_calls() {
    let session = Session::new(RopeBuffer::from("foo"));
    let config = TransformConfig {
      time_limit_ms: 0,
      ..Default::default()
    };

    let err = session
      .run_script(&FnHost(uppercase), "", &config)
      .unwrap_err();
    assert_eq!(
      err,
      SessionError::Script(ScriptError::Rejected(CapabilityError::TimedOut))
    );
    assert_eq!(text(&session), "foo");
  }

  #[test]
  fn restore_mid_run_makes_calls_stale() {
    let session = Session::new(RopeBuffer::from("foo"));
    let handle = session.clone();
    let host = FnHost(move |caps: &mut dyn Capabilities| -> Result<(), ScriptError> {
      let matches = caps.find(&pattern("foo"))?;
      // Another trigger restores while this script is still running.
      handle.restore().unwrap();
      caps.replace(&matches, &mut |_, _| Ok("bar".into()))
    });

    let err = session
      .run_script(&host, "", &TransformConfig::default())
      .unwrap_err();
    assert_eq!(
      err,
      SessionError::Script(ScriptError::Rejected(CapabilityError::Stale))
    );
    assert_eq!(text(&session), "foo");
    assert_eq!(session.phase(), Phase::Idle);
  }

  #[test]
  fn concurrent_runs_never_lose_history() {
    let session = Session::new(RopeBuffer::from("foo bar foo"));
    let config = TransformConfig::default();

    std::thread::scope(|scope| {
      for _ in 0..4 {
        let session = session.clone();
        let config = &config;
        scope.spawn(move || {
          for _ in 0..200 {
            // A run overtaken by another one fails as stale.
            let _ = session.run_script(&FnHost(uppercase), "", config);
          }
        });
      }
    });

    assert!(!session.is_poisoned());
    session.restore().unwrap();
    assert_eq!(text(&session), "foo bar foo");
    assert_eq!(session.history_len(), 0);
  }

  #[test]
  fn match_sets_do_not_outlive_their_run() {
    let session = Session::new(RopeBuffer::from("foo"));
    let kept = Arc::new(Mutex::new(None));
    let config = TransformConfig::default();

    let keep = Arc::clone(&kept);
    let first = FnHost(move |caps: &mut dyn Capabilities| -> Result<(), ScriptError> {
      *keep.lock() = Some(caps.find(&pattern("foo"))?);
      Ok(())
    });
    session.run_script(&first, "", &config).unwrap();

    let reuse = Arc::clone(&kept);
    let second = FnHost(move |caps: &mut dyn Capabilities| -> Result<(), ScriptError> {
      let old = reuse.lock().take().unwrap();
      caps.replace(&old, &mut |_, _| Ok("bar".into()))
    });
    let err = session.run_script(&second, "", &config).unwrap_err();
    assert_eq!(
      err,
      SessionError::Script(ScriptError::Rejected(CapabilityError::Stale))
    );
    assert_eq!(text(&session), "foo");
  }

  #[test]
  fn failed_restore_poisons_session() {
    let session = Session::new(RopeBuffer::from("foo"));
    let config = TransformConfig::default();
    session
      .run_script(&FnHost(uppercase), "", &config)
      .unwrap();

    session.state.lock().buffer.set_readonly(true);
    assert!(matches!(
      session.restore(),
      Err(HistoryError::RestoreFailed { remaining: 0, .. })
    ));
    assert!(session.is_poisoned());
    assert_eq!(
      session.run_script(&FnHost(uppercase), "", &config),
      Err(SessionError::Poisoned)
    );
    assert_eq!(text(&session), "FOO");
  }

  #[test]
  fn close_stops_recording() {
    let session = Session::new(RopeBuffer::from("foo"));
    session
      .run_script(&FnHost(uppercase), "", &TransformConfig::default())
      .unwrap();
    assert_eq!(session.close(), Ok(1));
    assert_eq!(text(&session), "foo");
    assert_eq!(session.history_len(), 0);
  }
}
