//! Utilities for declaring an async (usually debounced) hook

use std::time::Duration;

use futures_executor::block_on;
use tokio::{
  sync::mpsc::{
    self,
    Sender,
    error::TrySendError,
  },
  time::Instant,
};

/// Longest a sender blocks on a full channel before dropping the event.
const SEND_TIMEOUT_MS: u64 = 2;

const CHANNEL_CAPACITY: usize = 128;

/// A background handler for a stream of events.
///
/// The hook runs as a tokio task that waits for events sent through the
/// channel returned by [`AsyncHook::spawn`]. Each event may push the
/// debounce deadline out; once it passes without a new event,
/// [`AsyncHook::finish_debounce`] is called.
pub trait AsyncHook: Sync + Send + 'static + Sized {
  type Event: Sync + Send + 'static;

  /// Called for every event. Returns the deadline to wait for, which may be
  /// `timeout` unchanged, a new one, or `None` if nothing is pending.
  fn handle_event(&mut self, event: Self::Event, timeout: Option<Instant>) -> Option<Instant>;

  /// Called once the deadline passed, and when the channel closes while a
  /// deadline is pending.
  fn finish_debounce(&mut self);

  fn spawn(self) -> mpsc::Sender<Self::Event> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    // Without a runtime (plain unit tests) events are just never handled.
    if tokio::runtime::Handle::try_current().is_ok() {
      tokio::spawn(run(self, rx));
    }
    tx
  }
}

async fn run<Hook: AsyncHook>(mut hook: Hook, mut rx: mpsc::Receiver<Hook::Event>) {
  let mut deadline = None;
  loop {
    let event = match deadline {
      Some(at) => {
        match tokio::time::timeout_at(at, rx.recv()).await {
          Ok(event) => event,
          Err(_) => {
            hook.finish_debounce();
            deadline = None;
            continue;
          },
        }
      },
      None => rx.recv().await,
    };
    let Some(event) = event else {
      if deadline.is_some() {
        hook.finish_debounce();
      }
      break;
    };
    deadline = hook.handle_event(event, deadline);
  }
}

/// A hook that keeps only the latest event and hands it to `on_settle` once
/// no newer one arrived for `delay`.
pub struct Debounce<E, F> {
  delay:     Duration,
  pending:   Option<E>,
  on_settle: F,
}

impl<E, F> Debounce<E, F>
where
  E: Send + Sync + 'static,
  F: FnMut(E) + Send + Sync + 'static,
{
  pub fn new(delay: Duration, on_settle: F) -> Self {
    Self {
      delay,
      pending: None,
      on_settle,
    }
  }
}

impl<E, F> AsyncHook for Debounce<E, F>
where
  E: Send + Sync + 'static,
  F: FnMut(E) + Send + Sync + 'static,
{
  type Event = E;

  fn handle_event(&mut self, event: E, _timeout: Option<Instant>) -> Option<Instant> {
    self.pending = Some(event);
    Some(Instant::now() + self.delay)
  }

  fn finish_debounce(&mut self) {
    if let Some(event) = self.pending.take() {
      (self.on_settle)(event);
    }
  }
}

/// Sends `data` from synchronous code.
///
/// Tries a non-blocking send first. On a full channel it blocks for at most
/// [`SEND_TIMEOUT_MS`] and then drops the event. The caller must be inside a
/// tokio runtime context (see [`tokio::runtime::Handle::enter`]).
pub fn send_blocking<T>(tx: &Sender<T>, data: T) {
  match tx.try_send(data) {
    Ok(()) => {},
    Err(TrySendError::Full(data)) => {
      if block_on(tx.send_timeout(data, Duration::from_millis(SEND_TIMEOUT_MS))).is_err() {
        log::debug!("event channel stayed full, dropping event");
      }
    },
    Err(TrySendError::Closed(_)) => log::warn!("attempted to send to a closed event channel"),
  }
}
