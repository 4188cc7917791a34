use std::{
  path::Path,
  time::Duration,
};

use serde::{
  Deserialize,
  Serialize,
};

use crate::search::DEFAULT_MATCH_LIMIT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TransformConfig {
  /// Documents whose path ends with this are transform scripts.
  pub script_file:   String,
  pub time_limit_ms: u64,
  pub match_limit:   usize,
  /// Quiet period after the last script edit before it runs, in watch mode.
  pub debounce_ms:   u64,
}

impl Default for TransformConfig {
  fn default() -> Self {
    Self {
      script_file:   "script.txt".to_string(),
      time_limit_ms: 1000,
      match_limit:   DEFAULT_MATCH_LIMIT,
      debounce_ms:   150,
    }
  }
}

impl TransformConfig {
  pub fn time_limit(&self) -> Duration {
    Duration::from_millis(self.time_limit_ms)
  }

  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }

  /// Whether `path` names a script document.
  ///
  /// Either its file name is the designator, or the path ends with it, so a
  /// designator may carry directories (`transforms/script.txt`).
  pub fn is_script_document(&self, path: &Path) -> bool {
    if self.script_file.is_empty() {
      return false;
    }
    let designator = Path::new(&self.script_file);
    path.file_name() == Some(designator.as_os_str()) || path.ends_with(designator)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_table_is_default() {
    let config: TransformConfig = toml::from_str("").unwrap();
    assert_eq!(config, TransformConfig::default());
    assert_eq!(config.time_limit(), Duration::from_secs(1));
    assert_eq!(config.match_limit, 1000);
  }

  #[test]
  fn keys_are_kebab_case() {
    let config: TransformConfig = toml::from_str(
      r#"
      script-file = "rewrite.txt"
      time-limit-ms = 250
      "#,
    )
    .unwrap();
    assert_eq!(config.script_file, "rewrite.txt");
    assert_eq!(config.time_limit_ms, 250);
    assert_eq!(config.debounce_ms, 150);
  }

  #[test]
  fn unknown_keys_are_rejected() {
    assert!(toml::from_str::<TransformConfig>("timeout = 3").is_err());
  }

  #[test]
  fn script_document_designator() {
    let config = TransformConfig::default();
    assert!(config.is_script_document(Path::new("script.txt")));
    assert!(config.is_script_document(Path::new("/tmp/work/script.txt")));
    assert!(!config.is_script_document(Path::new("/tmp/work/script.txt.bak")));
    assert!(!config.is_script_document(Path::new("/tmp/work/myscript.txt")));

    let nested = TransformConfig {
      script_file: "transforms/script.txt".into(),
      ..Default::default()
    };
    assert!(nested.is_script_document(Path::new("/repo/transforms/script.txt")));
    assert!(!nested.is_script_document(Path::new("/repo/script.txt")));
  }
}
