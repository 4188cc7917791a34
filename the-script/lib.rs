//! The bundled transform script language.
//!
//! ```text
//! // comments start with `//` or `#`
//! find(/foo/g).replace(upper)
//! let m = find("literal text")
//! m.first(2).replace("<$0>", upper)
//! fail("stop here")
//! ```
//!
//! A script can only reach the [`Capabilities`] it is handed: it searches
//! the target buffer and replaces what it found. [`ScriptEngine`] parses the
//! whole source first, so a syntax error never touches the buffer, and then
//! evaluates statement by statement until the run's deadline.

mod eval;
mod lexer;
mod parser;

use std::time::Duration;

use the_lib::script::{
  Capabilities,
  ScriptError,
  ScriptHost,
};
use thiserror::Error;

pub use crate::parser::parse;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
  pub line:    usize,
  pub column:  usize,
  pub message: String,
}

impl From<ParseError> for ScriptError {
  fn from(err: ParseError) -> Self {
    ScriptError::Syntax {
      line:    err.line,
      column:  err.column,
      message: err.message,
    }
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptEngine;

impl ScriptEngine {
  pub fn new() -> Self {
    Self
  }

  /// Reports the first syntax error in `source` without running it.
  pub fn check(&self, source: &str) -> Result<(), ParseError> {
    parse(source).map(|_| ())
  }
}

impl ScriptHost for ScriptEngine {
  fn run(
    &self,
    source: &str,
    capabilities: &mut dyn Capabilities,
    limit: Duration,
  ) -> Result<(), ScriptError> {
    let program = parse(source)?;
    tracing::trace!(statements = program.statements.len(), "parsed transform script");
    eval::Interpreter::new(capabilities, limit).run(&program)
  }
}
