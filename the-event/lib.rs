//! Delivery of editor events to debounced background handlers.
//!
//! Script edits arrive once per keystroke, but a transform run only needs
//! the text the user settled on. An [`AsyncHook`] runs as a tokio task fed
//! through a channel and decides when a burst of events is over.

mod debounce;

pub use debounce::{
  AsyncHook,
  Debounce,
  send_blocking,
};
