//! Watch mode: a live preview of the target that follows every save of the
//! script file.
//!
//! The target is handed to a [`Transformer`] exactly like an editor would
//! activate a document. Changes to the script file are debounced and then
//! reported as text changes of the script document. Ctrl-C closes the
//! target, which restores it, unless `--write` asked to keep the result.

use std::{
  fs,
  num::NonZeroUsize,
  path::{
    Path,
    PathBuf,
  },
  sync::Arc,
};

use anyhow::{
  Context,
  Result,
  bail,
};
use notify::{
  EventKind,
  RecursiveMode,
  Watcher as _,
};
use parking_lot::Mutex;
use the_event::{
  AsyncHook,
  Debounce,
  send_blocking,
};
use the_lib::{
  buffer::{
    BufferId,
    RopeBuffer,
  },
  config::TransformConfig,
  transform::{
    Activated,
    Transformer,
  },
};
use the_script::ScriptEngine;

use crate::{
  cli::{
    Cli,
    ScriptSource,
  },
  run::emit,
};

type SharedTransformer = Arc<Mutex<Transformer<RopeBuffer>>>;

const TARGET_ID: BufferId = BufferId::new(NonZeroUsize::MIN);

pub fn run(cli: &Cli, mut config: TransformConfig) -> Result<()> {
  let ScriptSource::File(script) = cli.script_source(&config) else {
    bail!("--watch needs a script file");
  };
  let script = std::path::absolute(&script)
    .with_context(|| format!("failed to resolve {}", script.display()))?;
  // `--script` may name any file, make it the script document.
  config.script_file = script.to_string_lossy().into_owned();
  let text = fs::read_to_string(&cli.target)
    .with_context(|| format!("failed to read {}", cli.target.display()))?;

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()
    .context("failed to start the async runtime")?;
  runtime.block_on(watch(cli, config, script, text))
}

async fn watch(cli: &Cli, config: TransformConfig, script: PathBuf, text: String) -> Result<()> {
  let debounce = config.debounce();
  let transformer: SharedTransformer = Arc::new(Mutex::new(Transformer::new(
    config,
    Arc::new(ScriptEngine::new()),
  )));
  transformer.lock().on_active_changed(Some(Activated {
    id:     TARGET_ID,
    path:   Some(cli.target.clone()),
    buffer: RopeBuffer::from(text.as_str()),
  }));
  rerun(&transformer, &script);

  let tx = {
    let transformer = Arc::clone(&transformer);
    let script = script.clone();
    Debounce::new(debounce, move |()| rerun(&transformer, &script)).spawn()
  };

  let handle = tokio::runtime::Handle::current();
  let watched = script.clone();
  let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
    match event {
      Ok(event) if is_script_change(&event, &watched) => {
        let _guard = handle.enter();
        send_blocking(&tx, ());
      },
      Ok(_) => {},
      Err(err) => log::warn!("script watcher error: {err}"),
    }
  })
  .context("failed to create a file watcher")?;

  // Editors often save by replacing the file, so watch its directory.
  let dir = script.parent().unwrap_or(Path::new("."));
  watcher
    .watch(dir, RecursiveMode::NonRecursive)
    .with_context(|| format!("failed to watch {}", dir.display()))?;
  eprintln!("watching {}, press Ctrl-C to stop", script.display());

  tokio::signal::ctrl_c()
    .await
    .context("failed to listen for Ctrl-C")?;
  drop(watcher);

  let mut transformer = transformer.lock();
  if cli.write
    && let Some(session) = transformer.target_session()
  {
    let output = session.with_buffer(|buffer| buffer.text().to_string());
    emit(&cli.target, true, &output)?;
  }
  transformer.on_closed(TARGET_ID);
  Ok(())
}

fn is_script_change(event: &notify::Event, script: &Path) -> bool {
  matches!(
    event.kind,
    EventKind::Create(_) | EventKind::Modify(_)
  ) && event
    .paths
    .iter()
    .any(|path| path.file_name() == script.file_name())
}

/// Re-reads the script and runs it against the target, then prints the
/// preview.
fn rerun(transformer: &Mutex<Transformer<RopeBuffer>>, script: &Path) {
  let source = match fs::read_to_string(script) {
    Ok(source) => source,
    Err(err) => {
      log::warn!("failed to read script {}: {err}", script.display());
      return;
    },
  };

  let mut transformer = transformer.lock();
  transformer.on_text_changed(script, &source);
  let Some(session) = transformer.target_session() else {
    return;
  };
  let preview = session.with_buffer(|buffer| buffer.text().to_string());
  println!("{preview}");
  println!("---");
}
