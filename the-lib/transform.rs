//! Routes editor events to transform sessions.
//!
//! The [`Transformer`] manages at most one target buffer at a time: the last
//! activated document that is not itself a script. Edits to a script
//! document re-run that script against the target; switching to another
//! target restores and closes the previous one first.

use std::{
  collections::HashMap,
  path::{
    Path,
    PathBuf,
  },
  sync::Arc,
};

use crate::{
  buffer::{
    Buffer,
    BufferId,
    Highlight,
  },
  config::TransformConfig,
  script::ScriptHost,
  session::{
    Session,
    SessionError,
  },
};

/// A document that became active.
#[derive(Debug)]
pub struct Activated<B> {
  pub id:     BufferId,
  pub path:   Option<PathBuf>,
  pub buffer: B,
}

pub struct Transformer<B> {
  config:   TransformConfig,
  host:     Arc<dyn ScriptHost>,
  sessions: HashMap<BufferId, Session<B>>,
  target:   Option<BufferId>,
}

impl<B: Buffer + Highlight> Transformer<B> {
  pub fn new(config: TransformConfig, host: Arc<dyn ScriptHost>) -> Self {
    Self {
      config,
      host,
      sessions: HashMap::new(),
      target: None,
    }
  }

  pub fn config(&self) -> &TransformConfig {
    &self.config
  }

  pub fn target(&self) -> Option<BufferId> {
    self.target
  }

  pub fn session(&self, id: BufferId) -> Option<&Session<B>> {
    self.sessions.get(&id)
  }

  pub fn target_session(&self) -> Option<&Session<B>> {
    self.target.and_then(|id| self.sessions.get(&id))
  }

  /// A document's text changed. Only script documents matter here.
  pub fn on_text_changed(&mut self, path: &Path, text: &str) {
    if !self.config.is_script_document(path) {
      return;
    }
    self.run(text);
  }

  /// The active document changed.
  ///
  /// Activating a script document re-runs it against the current target.
  /// Anything else becomes the new target, after the previous one was
  /// restored and closed. `None` just closes the current target.
  pub fn on_active_changed(&mut self, activated: Option<Activated<B>>) {
    if let Some(doc) = &activated
      && doc
        .path
        .as_deref()
        .is_some_and(|path| self.config.is_script_document(path))
    {
      let source = doc.buffer.full_text().into_owned();
      self.run(&source);
      return;
    }

    if let Some(id) = self.target.take() {
      self.close(id);
    }

    if let Some(doc) = activated {
      tracing::debug!(id = ?doc.id, path = ?doc.path, "managing transform target");
      self.sessions.insert(doc.id, Session::new(doc.buffer));
      self.target = Some(doc.id);
    }
  }

  /// A document was closed. Its session is restored and dropped.
  pub fn on_closed(&mut self, id: BufferId) {
    if self.target == Some(id) {
      self.target = None;
    }
    self.close(id);
  }

  fn run(&self, source: &str) {
    let Some(session) = self.target_session() else {
      tracing::debug!("script changed without a transform target");
      return;
    };

    match session.run_script(self.host.as_ref(), source, &self.config) {
      Ok(()) => {},
      Err(SessionError::Script(err)) => tracing::warn!(%err, "transform script failed"),
      Err(err) => tracing::error!(%err, "transform session failed"),
    }
  }

  fn close(&mut self, id: BufferId) {
    let Some(session) = self.sessions.remove(&id) else {
      return;
    };
    match session.close() {
      Ok(restored) => tracing::debug!(id = ?id, restored, "closed transform target"),
      Err(err) => tracing::error!(id = ?id, %err, "failed to restore transform target"),
    }
  }
}
