//! Builds a [`Program`] from tokens.
//!
//! ```text
//! program = { separator } [ statement { separator { separator } statement } ] { separator }
//! separator = newline | ";"
//! statement = "let" ident "=" expr | expr
//! expr = primary { "." ident "(" args ")" }
//! primary = ident "(" args ")" | ident | string | regex | number
//! args = [ expr { "," expr } ]
//! ```
//!
//! Line breaks inside parentheses are ignored, and a line starting with `.`
//! continues the expression on the line before it.

use crate::{
  ParseError,
  lexer::{
    Token,
    TokenKind,
    tokenize,
  },
};

/// Where a node starts in the source, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
  pub line:   usize,
  pub column: usize,
}

impl Span {
  fn of(token: &Token<'_>) -> Self {
    Self {
      line:   token.line,
      column: token.column,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
  pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
  Let { name: String, value: Expr, span: Span },
  Expr(Expr),
}

impl Statement {
  pub fn span(&self) -> Span {
    match self {
      Self::Let { span, .. } => *span,
      Self::Expr(expr) => expr.span,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
  pub kind: ExprKind,
  pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
  Str(String),
  Number(usize),
  Regex {
    source: String,
    flags:  String,
  },
  Var(String),
  Call {
    name: String,
    args: Vec<Expr>,
  },
  Method {
    receiver: Box<Expr>,
    name:     String,
    args:     Vec<Expr>,
  },
}

/// Deepest allowed nesting of call arguments.
pub const MAX_DEPTH: usize = 256;

pub fn parse(source: &str) -> Result<Program, ParseError> {
  Parser {
    tokens: tokenize(source)?,
    pos:    0,
    end:    end_span(source),
    depth:  0,
  }
  .program()
}

/// Span just past the last char, used for errors at the end of input.
fn end_span(source: &str) -> Span {
  let line = source.matches('\n').count() + 1;
  let last_line = source.rsplit('\n').next().unwrap_or("");
  Span {
    line,
    column: last_line.trim_end_matches('\r').chars().count() + 1,
  }
}

struct Parser<'a> {
  tokens: Vec<Token<'a>>,
  pos:    usize,
  end:    Span,
  /// Open parentheses around the cursor.
  depth:  usize,
}

impl<'a> Parser<'a> {
  /// Next significant token. Line breaks only count outside parentheses.
  fn peek(&mut self) -> Option<&TokenKind<'a>> {
    if self.depth > 0 {
      while self
        .tokens
        .get(self.pos)
        .is_some_and(|token| token.kind == TokenKind::Newline)
      {
        self.pos += 1;
      }
    }
    self.tokens.get(self.pos).map(|token| &token.kind)
  }

  fn next_if(&mut self, pred: impl FnOnce(&TokenKind<'a>) -> bool) -> Option<Token<'a>> {
    if !self.peek().is_some_and(pred) {
      return None;
    }
    let token = self.tokens.get(self.pos).cloned();
    self.pos += 1;
    token
  }

  fn error_at(span: Span, message: impl Into<String>) -> ParseError {
    ParseError {
      line:    span.line,
      column:  span.column,
      message: message.into(),
    }
  }

  fn unexpected(&mut self, expected: &str) -> ParseError {
    self.peek();
    match self.tokens.get(self.pos) {
      Some(token) => {
        Self::error_at(
          Span::of(token),
          format!("expected {expected}, found {}", describe(&token.kind)),
        )
      },
      None => Self::error_at(self.end, format!("expected {expected}, found end of script")),
    }
  }

  fn expect(&mut self, kind: TokenKind<'a>, expected: &str) -> Result<Token<'a>, ParseError> {
    self
      .next_if(|next| *next == kind)
      .ok_or_else(|| self.unexpected(expected))
  }

  fn expect_ident(&mut self, expected: &str) -> Result<(&'a str, Span), ParseError> {
    let token = self.next_if(|next| matches!(next, TokenKind::Ident(_)));
    match token {
      Some(Token {
        kind: TokenKind::Ident(name),
        line,
        column,
      }) => Ok((name, Span { line, column })),
      _ => Err(self.unexpected(expected)),
    }
  }

  fn at_separator(&mut self) -> bool {
    matches!(self.peek(), Some(TokenKind::Newline | TokenKind::Semi))
  }

  fn skip_separators(&mut self) {
    while self.at_separator() {
      self.pos += 1;
    }
  }

  fn program(mut self) -> Result<Program, ParseError> {
    let mut statements = Vec::new();
    self.skip_separators();
    while self.peek().is_some() {
      statements.push(self.statement()?);
      if self.peek().is_some() && !self.at_separator() {
        return Err(self.unexpected("end of statement"));
      }
      self.skip_separators();
    }
    Ok(Program { statements })
  }

  fn statement(&mut self) -> Result<Statement, ParseError> {
    let Some(token) = self.next_if(|next| *next == TokenKind::Ident("let")) else {
      return self.expr().map(Statement::Expr);
    };
    let (name, _) = self.expect_ident("a variable name")?;
    self.expect(TokenKind::Eq, "`=`")?;
    Ok(Statement::Let {
      name:  name.to_string(),
      value: self.expr()?,
      span:  Span::of(&token),
    })
  }

  fn expr(&mut self) -> Result<Expr, ParseError> {
    let mut expr = self.primary()?;
    while self.continues_chain() {
      self.pos += 1;
      let (name, span) = self.expect_ident("a method name")?;
      let args = self.args()?;
      expr = Expr {
        kind: ExprKind::Method {
          receiver: Box::new(expr),
          name: name.to_string(),
          args,
        },
        span,
      };
    }
    Ok(expr)
  }

  /// Whether a `.` follows, possibly at the start of one of the next lines.
  /// Line breaks before it are consumed.
  fn continues_chain(&mut self) -> bool {
    let mut lookahead = self.pos;
    while self
      .tokens
      .get(lookahead)
      .is_some_and(|token| token.kind == TokenKind::Newline)
    {
      lookahead += 1;
    }
    if self.tokens.get(lookahead).map(|token| &token.kind) != Some(&TokenKind::Dot) {
      return false;
    }
    self.pos = lookahead;
    true
  }

  fn primary(&mut self) -> Result<Expr, ParseError> {
    let Some(token) = self.next_if(|_| true) else {
      return Err(self.unexpected("an expression"));
    };
    let span = Span::of(&token);
    let kind = match token.kind {
      TokenKind::Str(text) => ExprKind::Str(text.into_owned()),
      TokenKind::Number(n) => ExprKind::Number(n),
      TokenKind::Regex { source, flags } => {
        ExprKind::Regex {
          source: source.into_owned(),
          flags:  flags.to_string(),
        }
      },
      TokenKind::Ident(name) if self.peek() == Some(&TokenKind::LParen) => {
        ExprKind::Call {
          name: name.to_string(),
          args: self.args()?,
        }
      },
      TokenKind::Ident(name) => ExprKind::Var(name.to_string()),
      other => {
        return Err(Self::error_at(
          span,
          format!("expected an expression, found {}", describe(&other)),
        ));
      },
    };
    Ok(Expr { kind, span })
  }

  fn args(&mut self) -> Result<Vec<Expr>, ParseError> {
    let open = self.expect(TokenKind::LParen, "`(`")?;
    if self.depth >= MAX_DEPTH {
      return Err(Self::error_at(
        Span::of(&open),
        format!("calls nested deeper than {MAX_DEPTH}"),
      ));
    }
    self.depth += 1;
    let mut args = Vec::new();
    if self.peek() != Some(&TokenKind::RParen) {
      loop {
        args.push(self.expr()?);
        if self.next_if(|next| *next == TokenKind::Comma).is_none() {
          break;
        }
      }
    }
    // Close with `depth` still raised so line breaks before `)` are skipped.
    self.expect(TokenKind::RParen, "`,` or `)`")?;
    self.depth -= 1;
    Ok(args)
  }
}

fn describe(kind: &TokenKind<'_>) -> String {
  match kind {
    TokenKind::Ident(name) => format!("`{name}`"),
    TokenKind::Number(n) => format!("`{n}`"),
    TokenKind::Str(_) => "a string".to_string(),
    TokenKind::Regex { .. } => "a regex".to_string(),
    TokenKind::LParen => "`(`".to_string(),
    TokenKind::RParen => "`)`".to_string(),
    TokenKind::Comma => "`,`".to_string(),
    TokenKind::Dot => "`.`".to_string(),
    TokenKind::Eq => "`=`".to_string(),
    TokenKind::Semi => "`;`".to_string(),
    TokenKind::Newline => "end of line".to_string(),
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn span(line: usize, column: usize) -> Span {
    Span { line, column }
  }

  fn call(name: &str, args: Vec<Expr>, at: Span) -> Expr {
    Expr {
      kind: ExprKind::Call {
        name: name.into(),
        args,
      },
      span: at,
    }
  }

  #[track_caller]
  fn assert_error(source: &str, line: usize, column: usize, message: &str) {
    let err = parse(source).unwrap_err();
    assert_eq!((err.line, err.column), (line, column), "{err}");
    assert!(err.message.contains(message), "{err}");
  }

  #[test]
  fn parse_find_replace_chain() {
    let program = parse("find(/foo/g).replace(upper)").unwrap();
    let find = call(
      "find",
      vec![Expr {
        kind: ExprKind::Regex {
          source: "foo".into(),
          flags:  "g".into(),
        },
        span: span(1, 6),
      }],
      span(1, 1),
    );
    assert_eq!(program.statements, vec![Statement::Expr(Expr {
      kind: ExprKind::Method {
        receiver: Box::new(find),
        name:     "replace".into(),
        args:     vec![Expr {
          kind: ExprKind::Var("upper".into()),
          span: span(1, 22),
        }],
      },
      span: span(1, 14),
    })]);
  }

  #[test]
  fn parse_let_and_separators() {
    let program = parse("\n\nlet m = find('x');; m.replace('<$0>')\n\n").unwrap();
    assert_eq!(program.statements.len(), 2);
    assert!(matches!(
      &program.statements[0],
      Statement::Let { name, span: at, .. } if name == "m" && *at == span(3, 1)
    ));
    assert_eq!(program.statements[1].span(), span(3, 23));
  }

  #[test]
  fn parse_multi_line_calls() {
    let source = "find(\n  /a/,\n)\n  .replace(\n    upper,\n    '$0!'\n  )\n";
    assert!(parse(source).is_err(), "trailing comma is not allowed");

    let source = "find(\n  /a/\n)\n  .first(2)\n  .replace(\n    upper,\n    '$0!'\n  )\n";
    let program = parse(source).unwrap();
    assert_eq!(program.statements.len(), 1);
    let Statement::Expr(Expr {
      kind: ExprKind::Method { name, args, .. },
      ..
    }) = &program.statements[0]
    else {
      panic!("expected a method call");
    };
    assert_eq!(name, "replace");
    assert_eq!(args.len(), 2);
  }

  #[test]
  fn empty_program() {
    assert_eq!(parse("").unwrap().statements, vec![]);
    assert_eq!(parse("# nothing\n\n// here").unwrap().statements, vec![]);
  }

  #[test]
  fn syntax_errors_carry_positions() {
    assert_error("find(/a/", 1, 9, "found end of script");
    assert_error("let = 1", 1, 5, "expected a variable name");
    assert_error("find(/a/) find(/b/)", 1, 11, "expected end of statement");
    assert_error("x\n  .replace upper", 2, 12, "expected `(`");
    assert_error("find(,)", 1, 6, "expected an expression");
  }

  #[test]
  fn nesting_is_limited() {
    let nested = |depth: usize| format!("{}1{}", "f(".repeat(depth), ")".repeat(depth));
    assert!(parse(&nested(MAX_DEPTH)).is_ok());
    assert_error(
      &nested(MAX_DEPTH + 1),
      1,
      2 * MAX_DEPTH + 2,
      "nested deeper than",
    );
    assert_error(&nested(200_000), 1, 2 * MAX_DEPTH + 2, "nested deeper than");
  }
}
