//! Evaluates a parsed [`Program`] against a set of [`Capabilities`].

use std::{
  collections::HashMap,
  fmt,
  time::{
    Duration,
    Instant,
  },
};

use the_lib::{
  script::{
    Capabilities,
    CapabilityError,
    ScriptError,
  },
  search::{
    Flags,
    Match,
    MatchSet,
    Pattern,
  },
};

use crate::parser::{
  Expr,
  ExprKind,
  Program,
  Span,
  Statement,
};

/// Replacement functions available by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
  Upper,
  Lower,
  Trim,
  Reverse,
  Capitalize,
}

impl Builtin {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "upper" => Self::Upper,
      "lower" => Self::Lower,
      "trim" => Self::Trim,
      "reverse" => Self::Reverse,
      "capitalize" => Self::Capitalize,
      _ => return None,
    })
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::Upper => "upper",
      Self::Lower => "lower",
      Self::Trim => "trim",
      Self::Reverse => "reverse",
      Self::Capitalize => "capitalize",
    }
  }

  pub fn apply(self, text: &str) -> String {
    match self {
      Self::Upper => text.to_uppercase(),
      Self::Lower => text.to_lowercase(),
      Self::Trim => text.trim().to_string(),
      Self::Reverse => text.chars().rev().collect(),
      Self::Capitalize => {
        let mut chars = text.chars();
        match chars.next() {
          Some(first) => first.to_uppercase().chain(chars).collect(),
          None => String::new(),
        }
      },
    }
  }
}

/// Expands a replacement template for the match at `idx`.
///
/// `$0` and `$&` insert the current value, `$i` the zero-based index and
/// `$n` the one-based one. `$1` through `$9` insert the capture groups of
/// `found`, empty when a group did not take part. `$$` is a literal dollar,
/// any other `$` is kept.
pub fn expand(template: &str, value: &str, found: &Match, idx: usize) -> String {
  let mut out = String::with_capacity(template.len() + value.len());
  let mut chars = template.chars().peekable();
  while let Some(ch) = chars.next() {
    if ch != '$' {
      out.push(ch);
      continue;
    }
    let expansion = match chars.peek() {
      Some('0' | '&') => value.to_string(),
      Some('i') => idx.to_string(),
      Some('n') => (idx + 1).to_string(),
      Some('$') => "$".to_string(),
      Some(&digit @ '1'..='9') => {
        let group = digit as usize - '0' as usize;
        found.group(group).unwrap_or("").to_string()
      },
      _ => {
        out.push('$');
        continue;
      },
    };
    chars.next();
    out.push_str(&expansion);
  }
  out
}

#[derive(Debug, Clone)]
enum Value {
  Str(String),
  Number(usize),
  Pattern(Pattern),
  Matches(MatchSet),
  Builtin(Builtin),
}

impl Value {
  fn type_name(&self) -> &'static str {
    match self {
      Self::Str(_) => "string",
      Self::Number(_) => "number",
      Self::Pattern(_) => "pattern",
      Self::Matches(_) => "match set",
      Self::Builtin(_) => "function",
    }
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Str(text) => f.write_str(text),
      Self::Number(n) => write!(f, "{n}"),
      Self::Pattern(pattern) => write!(f, "{pattern}"),
      Self::Matches(set) => write!(f, "<{} matches>", set.len()),
      Self::Builtin(builtin) => f.write_str(builtin.name()),
    }
  }
}

/// One step of a `replace` mapper chain.
#[derive(Debug)]
enum Step {
  Template(String),
  Builtin(Builtin),
}

impl Step {
  fn apply(&self, value: &str, found: &Match, idx: usize) -> String {
    match self {
      Self::Template(template) => expand(template, value, found, idx),
      Self::Builtin(builtin) => builtin.apply(value),
    }
  }
}

fn runtime(span: Span, message: impl fmt::Display) -> ScriptError {
  ScriptError::Runtime(format!("{}:{}: {message}", span.line, span.column))
}

fn invalid_pattern(err: impl Into<CapabilityError>) -> ScriptError {
  ScriptError::Rejected(err.into())
}

pub struct Interpreter<'c> {
  capabilities: &'c mut dyn Capabilities,
  limit:        Duration,
  vars:         HashMap<String, Value>,
}

impl<'c> Interpreter<'c> {
  pub fn new(capabilities: &'c mut dyn Capabilities, limit: Duration) -> Self {
    Self {
      capabilities,
      limit,
      vars: HashMap::new(),
    }
  }

  pub fn run(mut self, program: &Program) -> Result<(), ScriptError> {
    for statement in &program.statements {
      if self.capabilities.expired() {
        return Err(ScriptError::TimedOut(self.limit));
      }
      match statement {
        Statement::Let { name, value, .. } => {
          let value = self.eval(value)?;
          self.vars.insert(name.clone(), value);
        },
        Statement::Expr(expr) => {
          self.eval(expr)?;
        },
      }
    }
    Ok(())
  }

  /// Capability timeouts surface as the run's own timeout.
  fn timed<T>(&self, result: Result<T, ScriptError>) -> Result<T, ScriptError> {
    result.map_err(|err| {
      match err {
        ScriptError::Rejected(CapabilityError::TimedOut) => ScriptError::TimedOut(self.limit),
        err => err,
      }
    })
  }

  fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
    match &expr.kind {
      ExprKind::Str(text) => Ok(Value::Str(text.clone())),
      ExprKind::Number(n) => Ok(Value::Number(*n)),
      ExprKind::Regex { source, flags } => {
        let flags = Flags::parse(flags).map_err(invalid_pattern)?;
        let pattern = Pattern::regex(source, flags).map_err(invalid_pattern)?;
        Ok(Value::Pattern(pattern))
      },
      ExprKind::Var(name) => {
        self
          .vars
          .get(name)
          .cloned()
          .or_else(|| Builtin::from_name(name).map(Value::Builtin))
          .ok_or_else(|| runtime(expr.span, format_args!("unknown variable `{name}`")))
      },
      ExprKind::Call { name, args } => self.call(name, args, expr.span),
      ExprKind::Method {
        receiver,
        name,
        args,
      } => {
        let receiver = match self.eval(receiver)? {
          Value::Matches(set) => set,
          other => {
            return Err(runtime(
              expr.span,
              format_args!("`{name}` needs a match set, found a {}", other.type_name()),
            ));
          },
        };
        self.method(receiver, name, args, expr.span)
      },
    }
  }

  fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, ScriptError> {
    args.iter().map(|arg| self.eval(arg)).collect()
  }

  fn single_arg(&mut self, name: &str, args: &[Expr], span: Span) -> Result<Value, ScriptError> {
    match args {
      [arg] => self.eval(arg),
      _ => {
        Err(runtime(
          span,
          format_args!("`{name}` takes 1 argument, got {}", args.len()),
        ))
      },
    }
  }

  fn call(&mut self, name: &str, args: &[Expr], span: Span) -> Result<Value, ScriptError> {
    match name {
      "find" => {
        let pattern = match self.single_arg(name, args, span)? {
          Value::Pattern(pattern) => pattern,
          Value::Str(text) => Pattern::literal(&text).map_err(invalid_pattern)?,
          other => {
            return Err(runtime(
              span,
              format_args!("`find` needs a regex or a string, found a {}", other.type_name()),
            ));
          },
        };
        let found = self.capabilities.find(&pattern);
        self.timed(found).map(Value::Matches)
      },
      "fail" => {
        let message = self.single_arg(name, args, span)?;
        Err(ScriptError::Thrown(message.to_string()))
      },
      _ => Err(runtime(span, format_args!("unknown function `{name}`"))),
    }
  }

  fn method(
    &mut self,
    set: MatchSet,
    name: &str,
    args: &[Expr],
    span: Span,
  ) -> Result<Value, ScriptError> {
    match name {
      "replace" => self.replace(set, args, span),
      "first" | "nth" => {
        let n = match self.single_arg(name, args, span)? {
          Value::Number(n) => n,
          other => {
            return Err(runtime(
              span,
              format_args!("`{name}` needs a number, found a {}", other.type_name()),
            ));
          },
        };
        Ok(Value::Matches(if name == "first" {
          set.first(n)
        } else {
          set.nth(n)
        }))
      },
      "len" if args.is_empty() => Ok(Value::Number(set.len())),
      "filter" => {
        let pattern = match self.single_arg(name, args, span)? {
          Value::Pattern(pattern) => pattern,
          Value::Str(text) => Pattern::literal(&text).map_err(invalid_pattern)?,
          other => {
            return Err(runtime(
              span,
              format_args!("`filter` needs a regex or a string, found a {}", other.type_name()),
            ));
          },
        };
        Ok(Value::Matches(set.filter(|found| pattern.is_match(&found.text))))
      },
      _ => Err(runtime(span, format_args!("unknown method `{name}`"))),
    }
  }

  fn replace(&mut self, set: MatchSet, args: &[Expr], span: Span) -> Result<Value, ScriptError> {
    if args.is_empty() {
      return Err(runtime(span, "`replace` needs at least one mapper"));
    }
    let steps = self
      .eval_args(args)?
      .into_iter()
      .map(|value| {
        match value {
          Value::Str(template) => Ok(Step::Template(template)),
          Value::Builtin(builtin) => Ok(Step::Builtin(builtin)),
          other => {
            Err(runtime(
              span,
              format_args!("a {} can't be used as a mapper", other.type_name()),
            ))
          },
        }
      })
      .collect::<Result<Vec<_>, _>>()?;

    let deadline = self.capabilities.deadline();
    let limit = self.limit;
    let mut mapper = |found: &Match, idx: usize| -> Result<String, ScriptError> {
      let mut value = found.text.clone();
      for step in &steps {
        if Instant::now() >= deadline {
          return Err(ScriptError::TimedOut(limit));
        }
        value = step.apply(&value, found, idx);
      }
      Ok(value)
    };
    let replaced = self.capabilities.replace(&set, &mut mapper);
    self.timed(replaced)?;
    Ok(Value::Number(set.len()))
  }
}

#[cfg(test)]
mod test {
  use the_lib::{
    buffer::RopeBuffer,
    config::TransformConfig,
    position::Range,
    session::{
      Session,
      SessionError,
    },
  };

  use super::*;
  use crate::ScriptEngine;

  fn run(text: &str, source: &str) -> (String, Result<(), SessionError>) {
    let session = Session::new(RopeBuffer::from(text));
    let result = session.run_script(&ScriptEngine, source, &TransformConfig::default());
    (session.with_buffer(|buffer| buffer.text().to_string()), result)
  }

  #[track_caller]
  fn assert_runtime_error(source: &str, expected: &str) {
    let (_, result) = run("foo", source);
    match result {
      Err(SessionError::Script(ScriptError::Runtime(message))) => {
        assert!(message.contains(expected), "{message}");
      },
      other => panic!("expected a runtime error, got {other:?}"),
    }
  }

  fn found(text: &str, groups: &[Option<&str>]) -> Match {
    Match {
      range:  Range::new((0, 0), (0, text.chars().count())),
      text:   text.to_string(),
      groups: groups.iter().map(|group| group.map(str::to_string)).collect(),
    }
  }

  #[test]
  fn templates() {
    let ab = found("ab", &[]);
    assert_eq!(expand("<$0>", "ab", &ab, 0), "<ab>");
    assert_eq!(expand("$&-$i-$n", "x", &ab, 4), "x-4-5");
    assert_eq!(expand("$$0 costs $5", "x", &ab, 0), "$0 costs ");
    assert_eq!(expand("end$", "x", &ab, 0), "end$");
  }

  #[test]
  fn templates_insert_capture_groups() {
    let pair = found("k=v", &[Some("k"), None, Some("v")]);
    assert_eq!(expand("$3=$1", "k=v", &pair, 0), "v=k");
    assert_eq!(expand("[$2]", "k=v", &pair, 0), "[]");
    assert_eq!(expand("[$9]", "k=v", &pair, 0), "[]");
    // Groups come from the match, not the value earlier steps produced.
    assert_eq!(expand("$0/$1", "K=V", &pair, 0), "K=V/k");
  }

  #[test]
  fn replace_swaps_capture_groups() {
    let (text, result) = run("a=1, b=2", r"find(/(\w)=(\w)/).replace('$2=$1')");
    result.unwrap();
    assert_eq!(text, "1=a, 2=b");

    let (text, result) = run("ab", "find(/(a)|(b)/).replace('<$2>')");
    result.unwrap();
    assert_eq!(text, "<><b>");
  }

  #[test]
  fn filter_keeps_matching_entries() {
    let (text, result) = run("ax bx ay", r"find(/\w+/).filter(/x/).replace(upper)");
    result.unwrap();
    assert_eq!(text, "AX BX ay");

    let (text, result) = run("a.b axb", r"find(/a.b/).filter('.').replace('_')");
    result.unwrap();
    assert_eq!(text, "_ axb");

    assert_runtime_error("find('o').filter(1)", "`filter` needs a regex or a string");
  }

  #[test]
  fn builtins() {
    assert_eq!(Builtin::Upper.apply("straße"), "STRASSE");
    assert_eq!(Builtin::Lower.apply("ÉTÉ"), "été");
    assert_eq!(Builtin::Trim.apply("  a b \n"), "a b");
    assert_eq!(Builtin::Reverse.apply("añb"), "bña");
    assert_eq!(Builtin::Capitalize.apply("élan vital"), "Élan vital");
    assert_eq!(Builtin::Capitalize.apply(""), "");
    assert_eq!(Builtin::from_name("shout"), None);
  }

  #[test]
  fn mappers_apply_left_to_right() {
    let (text, result) = run("a b", r#"find(/\w/).replace(upper, "[$0$n]", reverse)"#);
    result.unwrap();
    assert_eq!(text, "]1A[ ]2B[");
  }

  #[test]
  fn variables_and_subsets() {
    let source = "let m = find('o')\nm.nth(1).replace('0')\nm.first(1).replace(upper)";
    let (text, result) = run("foo", source);
    result.unwrap();
    assert_eq!(text, "fO0");
  }

  #[test]
  fn literal_find_ignores_metacharacters() {
    let (text, result) = run("a.b axb", "find('a.b').replace('_')");
    result.unwrap();
    assert_eq!(text, "_ axb");
  }

  #[test]
  fn empty_match_set_is_fine() {
    let (text, result) = run("foo", "find(/zzz/).replace(upper)");
    result.unwrap();
    assert_eq!(text, "foo");
  }

  #[test]
  fn fail_throws() {
    let (_, result) = run("foo", "fail('boom')");
    assert_eq!(
      result,
      Err(SessionError::Script(ScriptError::Thrown("boom".into())))
    );
  }

  #[test]
  fn bad_patterns_are_rejected() {
    let (_, result) = run("foo", "find(/(/)");
    assert!(matches!(
      result,
      Err(SessionError::Script(ScriptError::Rejected(
        CapabilityError::InvalidPattern(_)
      )))
    ));
    let (_, result) = run("foo", "find(/o/q)");
    assert!(matches!(
      result,
      Err(SessionError::Script(ScriptError::Rejected(
        CapabilityError::InvalidPattern(_)
      )))
    ));
  }

  #[test]
  fn runtime_errors_carry_positions() {
    assert_runtime_error("x", "1:1: unknown variable `x`");
    assert_runtime_error("\nnope(1)", "2:1: unknown function `nope`");
    assert_runtime_error("find('o').shout()", "unknown method `shout`");
    assert_runtime_error("find(1)", "needs a regex or a string");
    assert_runtime_error("find('o').replace()", "at least one mapper");
    assert_runtime_error("find('o').replace(1)", "can't be used as a mapper");
    assert_runtime_error("'o'.replace(upper)", "needs a match set");
    assert_runtime_error("find('o').first('x')", "needs a number");
  }

  #[test]
  fn expired_deadline_stops_before_first_statement() {
    let session = Session::new(RopeBuffer::from("foo"));
    let config = TransformConfig {
      time_limit_ms: 0,
      ..Default::default()
    };
    let result = session.run_script(&ScriptEngine, "find(/o/).replace(upper)", &config);
    assert_eq!(
      result,
      Err(SessionError::Script(ScriptError::TimedOut(Duration::ZERO)))
    );
    assert_eq!(session.history_len(), 0);
  }
}
