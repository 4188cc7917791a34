//! Where the transform tool keeps its files, and TOML helpers for its
//! configuration.

pub mod config;

use std::{
  path::{
    Path,
    PathBuf,
  },
  sync::OnceLock,
};

use etcetera::base_strategy::{
  BaseStrategy,
  choose_base_strategy,
};

const APP_DIR: &str = "the-transform";

/// Directory name marking a workspace and holding its local config.
pub const WORKSPACE_DIR: &str = ".the-transform";

static CONFIG_FILE: OnceLock<PathBuf> = OnceLock::new();

static LOG_FILE: OnceLock<PathBuf> = OnceLock::new();

pub fn initialize_config_file(specified_file: Option<PathBuf>) {
  let config_file = specified_file.unwrap_or_else(default_config_file);
  CONFIG_FILE.set(config_file).ok();
}

pub fn initialize_log_file(specified_file: Option<PathBuf>) {
  let log_file = specified_file.unwrap_or_else(default_log_file);
  ensure_parent_dir(&log_file);
  LOG_FILE.set(log_file).ok();
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), etcetera::home_dir()) {
    (Ok(rest), Ok(home)) => home.join(rest),
    _ => path.to_path_buf(),
  }
}

enum Base {
  Config,
  Cache,
}

/// A base directory from `env`, or the platform's one.
///
/// Falls back to a directory in the working directory when the platform has
/// no home directory at all.
fn base_dir(env: &str, base: Base) -> PathBuf {
  if let Ok(dir) = std::env::var(env) {
    return expand_tilde(Path::new(&dir));
  }
  match choose_base_strategy() {
    Ok(strategy) => {
      let dir = match base {
        Base::Config => strategy.config_dir(),
        Base::Cache => strategy.cache_dir(),
      };
      dir.join(APP_DIR)
    },
    Err(err) => {
      log::warn!("no home directory ({err}), using {WORKSPACE_DIR}");
      PathBuf::from(WORKSPACE_DIR)
    },
  }
}

pub fn config_dir() -> PathBuf {
  base_dir("THE_TRANSFORM_CONFIG_DIR", Base::Config)
}

pub fn cache_dir() -> PathBuf {
  base_dir("THE_TRANSFORM_CACHE_DIR", Base::Cache)
}

pub fn config_file() -> PathBuf {
  CONFIG_FILE.get_or_init(default_config_file).clone()
}

pub fn log_file() -> PathBuf {
  LOG_FILE
    .get_or_init(|| {
      let path = default_log_file();
      ensure_parent_dir(&path);
      path
    })
    .clone()
}

pub fn workspace_config_file() -> PathBuf {
  find_workspace().0.join(WORKSPACE_DIR).join("config.toml")
}

pub fn default_log_file() -> PathBuf {
  cache_dir().join("the-transform.log")
}

/// Merges `right` onto `left`.
///
/// Tables present on both sides are merged key by key down to `merge_depth`
/// levels; below that, and for every other kind of value, `right` wins.
///
/// ```
/// let global: toml::Value = toml::from_str("time-limit-ms = 500\nmatch-limit = 10").unwrap();
/// let local: toml::Value = toml::from_str("match-limit = 20").unwrap();
/// let merged = the_loader::merge_toml_values(global, local, 3);
/// assert_eq!(merged["time-limit-ms"].as_integer(), Some(500));
/// assert_eq!(merged["match-limit"].as_integer(), Some(20));
/// ```
pub fn merge_toml_values(left: toml::Value, right: toml::Value, merge_depth: usize) -> toml::Value {
  use toml::Value;

  match (left, right) {
    (Value::Table(mut left_map), Value::Table(right_map)) if merge_depth > 0 => {
      for (key, rvalue) in right_map {
        let merged = match left_map.remove(&key) {
          Some(lvalue) => merge_toml_values(lvalue, rvalue, merge_depth - 1),
          None => rvalue,
        };
        left_map.insert(key, merged);
      }
      Value::Table(left_map)
    },
    (_, value) => value,
  }
}

/// Finds the workspace around the working directory.
///
/// Searches upward for a directory containing `.git`, `.svn`, `.jj` or
/// [`WORKSPACE_DIR`]. Returns `(workspace, false)` when one was found and
/// `(cwd, true)` otherwise.
pub fn find_workspace() -> (PathBuf, bool) {
  match std::env::current_dir() {
    Ok(current_dir) => find_workspace_in(current_dir),
    Err(_) => (PathBuf::new(), true),
  }
}

pub fn find_workspace_in(dir: impl AsRef<Path>) -> (PathBuf, bool) {
  let dir = dir.as_ref();
  for ancestor in dir.ancestors() {
    if [".git", ".svn", ".jj", WORKSPACE_DIR]
      .iter()
      .any(|marker| ancestor.join(marker).exists())
    {
      return (ancestor.to_owned(), false);
    }
  }

  (dir.to_owned(), true)
}

fn default_config_file() -> PathBuf {
  config_dir().join("config.toml")
}

fn ensure_parent_dir(path: &Path) {
  if let Some(parent) = path.parent()
    && !parent.exists()
  {
    std::fs::create_dir_all(parent).ok();
  }
}
