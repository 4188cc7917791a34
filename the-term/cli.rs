use std::{
  fs,
  path::PathBuf,
};

use anyhow::{
  Context,
  Result,
};
use clap::{
  ArgAction,
  Parser,
};
use the_lib::config::TransformConfig;

#[derive(Parser, Debug)]
#[command(name = "the-transform", about, long_about = None, version)]
pub struct Cli {
  /// File to transform
  #[arg(value_name = "TARGET")]
  pub target: PathBuf,

  /// Script to run (defaults to the configured script file)
  #[arg(short = 's', long = "script", value_name = "FILE", conflicts_with = "expr")]
  pub script: Option<PathBuf>,

  /// Run this script source instead of a file
  #[arg(short = 'e', long = "expr", value_name = "SCRIPT")]
  pub expr: Option<String>,

  /// Write the result back to TARGET instead of printing it
  #[arg(long)]
  pub write: bool,

  /// Re-run the script whenever its file changes, until Ctrl-C
  #[arg(long, conflicts_with_all = ["expr", "check"])]
  pub watch: bool,

  /// Only check the script for syntax errors
  #[arg(long)]
  pub check: bool,

  /// Increase logging verbosity (repeat for more detail)
  #[arg(short = 'v', action = ArgAction::Count)]
  pub verbosity: u8,

  /// Save logs to a specific file
  #[arg(long = "log", value_name = "FILE")]
  pub log_file: Option<PathBuf>,

  /// Load configuration from a specific file
  #[arg(short = 'c', long = "config", value_name = "FILE")]
  pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
  Inline(String),
  File(PathBuf),
}

impl ScriptSource {
  pub fn read(&self) -> Result<String> {
    match self {
      Self::Inline(source) => Ok(source.clone()),
      Self::File(path) => {
        fs::read_to_string(path).with_context(|| format!("failed to read script {}", path.display()))
      },
    }
  }

  pub fn describe(&self) -> String {
    match self {
      Self::Inline(_) => "<expr>".to_string(),
      Self::File(path) => path.display().to_string(),
    }
  }
}

impl Cli {
  pub fn script_source(&self, config: &TransformConfig) -> ScriptSource {
    match (&self.expr, &self.script) {
      (Some(source), _) => ScriptSource::Inline(source.clone()),
      (None, Some(path)) => ScriptSource::File(path.clone()),
      (None, None) => ScriptSource::File(PathBuf::from(&config.script_file)),
    }
  }
}
