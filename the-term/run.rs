//! One-shot mode: run the script once and emit the result.

use std::{
  fs,
  io::{
    self,
    Write,
  },
  path::Path,
};

use anyhow::{
  Context,
  Result,
  bail,
};
use the_lib::{
  buffer::RopeBuffer,
  config::TransformConfig,
  session::Session,
};
use the_script::ScriptEngine;

use crate::cli::Cli;

/// Parses the script and reports the first syntax error.
pub fn check(cli: &Cli, config: &TransformConfig) -> Result<()> {
  let script = cli.script_source(config);
  let source = script.read()?;
  if let Err(err) = ScriptEngine::new().check(&source) {
    bail!("{}:{err}", script.describe());
  }
  Ok(())
}

/// Runs the script against the target and returns the transformed text.
///
/// A failed run leaves the target untouched: whatever it applied before
/// failing is restored.
pub fn transform(target: &Path, source: &str, config: &TransformConfig) -> Result<String> {
  let text = fs::read_to_string(target)
    .with_context(|| format!("failed to read {}", target.display()))?;
  let session = Session::new(RopeBuffer::from(text.as_str()));

  if let Err(err) = session.run_script(&ScriptEngine::new(), source, config) {
    if let Err(restore) = session.restore() {
      log::error!("failed to restore {}: {restore}", target.display());
    }
    return Err(err).context("transform script failed");
  }

  session.with_buffer(|buffer| {
    log::info!(
      "{} matches highlighted in {}",
      buffer.markers().len(),
      target.display()
    );
    Ok(buffer.text().to_string())
  })
}

pub fn emit(target: &Path, write: bool, output: &str) -> Result<()> {
  if write {
    fs::write(target, output).with_context(|| format!("failed to write {}", target.display()))?;
    log::info!("wrote {}", target.display());
    return Ok(());
  }
  let mut stdout = io::stdout().lock();
  stdout.write_all(output.as_bytes())?;
  stdout.flush()?;
  Ok(())
}

pub fn once(cli: &Cli, config: &TransformConfig) -> Result<()> {
  let source = cli.script_source(config).read()?;
  let output = transform(&cli.target, &source, config)?;
  emit(&cli.target, cli.write, &output)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transform_and_write_back() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("notes.md");
    fs::write(&target, "foo bar\nfoo").unwrap();

    let config = TransformConfig::default();
    let output = transform(&target, "find(/foo/).replace(upper, '<$n>')", &config).unwrap();
    assert_eq!(output, "<1> bar\n<2>");

    emit(&target, true, &output).unwrap();
    assert_eq!(fs::read_to_string(&target).unwrap(), "<1> bar\n<2>");
  }

  #[test]
  fn failed_scripts_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("notes.md");
    fs::write(&target, "foo").unwrap();

    let config = TransformConfig::default();
    let err = transform(&target, "find(/foo/).replace(upper)\nfail('nope')", &config).unwrap_err();
    assert!(format!("{err:#}").contains("nope"), "{err:#}");
    assert_eq!(fs::read_to_string(&target).unwrap(), "foo");

    assert!(transform(&dir.path().join("missing.md"), "", &config).is_err());
  }
}
