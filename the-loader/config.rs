//! Loading [`TransformConfig`] from the global and workspace config files.

use std::{
  fs,
  io,
  path::{
    Path,
    PathBuf,
  },
};

use the_lib::config::TransformConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
  #[error("bad config: {0}")]
  BadConfig(#[from] toml::de::Error),
  #[error("failed to read {}: {source}", path.display())]
  Error {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Reads a config file. A missing file counts as empty.
fn read_config(path: &Path) -> Result<Option<toml::Value>, ConfigLoadError> {
  let text = match fs::read_to_string(path) {
    Ok(text) => text,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(ConfigLoadError::Error {
        path: path.to_owned(),
        source,
      });
    },
  };
  let value = toml::from_str(&text)?;
  Ok(Some(value))
}

/// Loads the config from `files`, later files overriding earlier ones.
pub fn load_from(files: &[PathBuf]) -> Result<TransformConfig, ConfigLoadError> {
  let mut merged: Option<toml::Value> = None;
  for file in files {
    let Some(value) = read_config(file)? else {
      continue;
    };
    log::debug!("loaded config from {}", file.display());
    merged = Some(match merged {
      Some(left) => crate::merge_toml_values(left, value, 3),
      None => value,
    });
  }

  match merged {
    Some(value) => Ok(value.try_into()?),
    None => Ok(TransformConfig::default()),
  }
}

/// Loads the user config, `config.toml` in [`crate::config_dir`], with the
/// workspace config merged on top.
pub fn load_user() -> Result<TransformConfig, ConfigLoadError> {
  load_from(&[crate::config_file(), crate::workspace_config_file()])
}

#[cfg(test)]
mod test {
  use std::time::Duration;

  use super::*;

  fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
  }

  #[test]
  fn missing_files_give_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_from(&[dir.path().join("nope.toml")]).unwrap();
    assert_eq!(config, TransformConfig::default());
  }

  #[test]
  fn local_overrides_global() {
    let dir = tempfile::tempdir().unwrap();
    let global = write(
      dir.path(),
      "global.toml",
      "time-limit-ms = 200\nscript-file = 'edit.txt'",
    );
    let local = write(dir.path(), "local.toml", "time-limit-ms = 50");

    let config = load_from(&[global, local]).unwrap();
    assert_eq!(config.time_limit(), Duration::from_millis(50));
    assert_eq!(config.script_file, "edit.txt");
    assert_eq!(config.match_limit, TransformConfig::default().match_limit);
  }

  #[test]
  fn bad_files_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let syntax = write(dir.path(), "syntax.toml", "time-limit-ms = ");
    assert!(matches!(
      load_from(&[syntax]),
      Err(ConfigLoadError::BadConfig(_))
    ));

    let unknown = write(dir.path(), "unknown.toml", "colour = 'red'");
    assert!(matches!(
      load_from(&[unknown]),
      Err(ConfigLoadError::BadConfig(_))
    ));

    let not_a_file = dir.path().to_owned();
    assert!(matches!(
      load_from(&[not_a_file]),
      Err(ConfigLoadError::Error { .. })
    ));
  }
}
