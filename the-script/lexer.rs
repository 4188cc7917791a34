//! Splits script source into [`Token`]s.
//!
//! | Syntax            | Token |
//! |-------------------|-------|
//! | `find`, `m_1`     | [`TokenKind::Ident`] |
//! | `42`              | [`TokenKind::Number`] |
//! | `"a\n"`, `'b'`    | [`TokenKind::Str`], backslash escapes resolved |
//! | `/fo+/gi`         | [`TokenKind::Regex`] |
//! | `( ) , . = ;`     | punctuation |
//! | line break        | [`TokenKind::Newline`] |
//!
//! `#` and `//` start a comment that runs to the end of the line. Since there
//! is no division, a `/` that does not start a comment always starts a regex.

use std::borrow::Cow;

use crate::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind<'a> {
  Ident(&'a str),
  Number(usize),
  Str(Cow<'a, str>),
  Regex { source: Cow<'a, str>, flags: &'a str },
  LParen,
  RParen,
  Comma,
  Dot,
  Eq,
  Semi,
  Newline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
  pub kind:   TokenKind<'a>,
  /// 1-based line of the token's first char.
  pub line:   usize,
  /// 1-based column of the token's first char, counted in chars.
  pub column: usize,
}

#[derive(Debug)]
pub struct Tokenizer<'a> {
  input:      &'a str,
  /// The current byte index of the input being considered.
  pos:        usize,
  line:       usize,
  line_start: usize,
}

impl<'a> Tokenizer<'a> {
  pub fn new(input: &'a str) -> Self {
    Self {
      input,
      pos: 0,
      line: 1,
      line_start: 0,
    }
  }

  fn byte(&self) -> Option<u8> {
    self.input.as_bytes().get(self.pos).copied()
  }

  fn peek_byte(&self) -> Option<u8> {
    self.input.as_bytes().get(self.pos + 1).copied()
  }

  fn column(&self, pos: usize) -> usize {
    self.input[self.line_start..pos].chars().count() + 1
  }

  fn error(&self, pos: usize, message: impl Into<String>) -> ParseError {
    ParseError {
      line:    self.line,
      column:  self.column(pos),
      message: message.into(),
    }
  }

  fn skip_blanks_and_comments(&mut self) {
    loop {
      match self.byte() {
        Some(b' ' | b'\t' | b'\r') => self.pos += 1,
        Some(b'#') => self.skip_line(),
        Some(b'/') if self.peek_byte() == Some(b'/') => self.skip_line(),
        _ => return,
      }
    }
  }

  /// Moves to the line break ending the current line, without consuming it.
  fn skip_line(&mut self) {
    self.pos = self.input[self.pos..]
      .find('\n')
      .map_or(self.input.len(), |offset| self.pos + offset);
  }

  fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
    let start = self.pos;
    while self.byte().is_some_and(&pred) {
      self.pos += 1;
    }
    &self.input[start..self.pos]
  }

  /// Parses a string quoted by `quote`. The cursor is on the opening quote.
  fn parse_quoted(&mut self, quote: u8) -> Result<Cow<'a, str>, ParseError> {
    let open = self.pos;
    self.pos += 1;
    let start = self.pos;
    let mut escaped: Option<String> = None;

    loop {
      let Some(byte) = self.byte() else {
        return Err(self.error(open, "unterminated string"));
      };
      match byte {
        b'\n' => return Err(self.error(open, "unterminated string")),
        b'\\' => {
          let escaped = escaped.get_or_insert_with(|| self.input[start..self.pos].to_string());
          self.pos += 1;
          let Some(next) = self.input[self.pos..].chars().next() else {
            return Err(self.error(open, "unterminated string"));
          };
          match next {
            'n' => escaped.push('\n'),
            't' => escaped.push('\t'),
            'r' => escaped.push('\r'),
            '0' => escaped.push('\0'),
            '\\' | '"' | '\'' => escaped.push(next),
            other => {
              escaped.push('\\');
              escaped.push(other);
            },
          }
          self.pos += next.len_utf8();
        },
        _ if byte == quote => {
          let content = match escaped {
            Some(escaped) => Cow::Owned(escaped),
            None => Cow::Borrowed(&self.input[start..self.pos]),
          };
          self.pos += 1;
          return Ok(content);
        },
        _ => {
          let ch_len = self.input[self.pos..]
            .chars()
            .next()
            .map_or(1, char::len_utf8);
          if let Some(escaped) = escaped.as_mut() {
            escaped.push_str(&self.input[self.pos..self.pos + ch_len]);
          }
          self.pos += ch_len;
        },
      }
    }
  }

  /// Parses a regex literal. The cursor is on the opening slash.
  ///
  /// `\/` stands for a slash. Every other escape is kept as written for the
  /// regex engine.
  fn parse_regex(&mut self) -> Result<TokenKind<'a>, ParseError> {
    let open = self.pos;
    self.pos += 1;
    let start = self.pos;

    loop {
      match self.byte() {
        None | Some(b'\n') => return Err(self.error(open, "unterminated regex")),
        Some(b'/') => break,
        // The escaped byte can't close the literal.
        Some(b'\\') if self.peek_byte().is_some_and(|b| b != b'\n') => self.pos += 2,
        Some(_) => self.pos += 1,
      }
    }

    let body = &self.input[start..self.pos];
    let source = if body.contains("\\/") {
      Cow::Owned(unescape_slashes(body))
    } else {
      Cow::Borrowed(body)
    };
    self.pos += 1;
    let flags = self.take_while(|b| b.is_ascii_alphabetic());
    Ok(TokenKind::Regex { source, flags })
  }
}

impl<'a> Iterator for Tokenizer<'a> {
  type Item = Result<Token<'a>, ParseError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.skip_blanks_and_comments();

    let start = self.pos;
    let line = self.line;
    let column = self.column(start);
    let byte = self.byte()?;

    let kind = match byte {
      b'\n' => {
        self.pos += 1;
        self.line += 1;
        self.line_start = self.pos;
        Ok(TokenKind::Newline)
      },
      b'(' | b')' | b',' | b'.' | b'=' | b';' => {
        self.pos += 1;
        Ok(match byte {
          b'(' => TokenKind::LParen,
          b')' => TokenKind::RParen,
          b',' => TokenKind::Comma,
          b'.' => TokenKind::Dot,
          b'=' => TokenKind::Eq,
          b';' => TokenKind::Semi,
          _ => unreachable!(),
        })
      },
      b'"' | b'\'' => self.parse_quoted(byte).map(TokenKind::Str),
      b'/' => self.parse_regex(),
      b'0'..=b'9' => {
        let digits = self.take_while(|b| b.is_ascii_digit());
        digits
          .parse()
          .map(TokenKind::Number)
          .map_err(|_| self.error(start, format!("number `{digits}` is too large")))
      },
      b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
        Ok(TokenKind::Ident(self.take_while(|b| {
          b.is_ascii_alphanumeric() || b == b'_'
        })))
      },
      _ => {
        let ch = self.input[start..].chars().next().unwrap_or('\u{FFFD}');
        // Skip the rest of the input: one bad char already fails the parse.
        self.pos = self.input.len();
        Err(self.error(start, format!("unexpected character `{ch}`")))
      },
    };

    Some(kind.map(|kind| Token { kind, line, column }))
  }
}

fn unescape_slashes(body: &str) -> String {
  let mut unescaped = String::with_capacity(body.len());
  let mut chars = body.chars();
  while let Some(ch) = chars.next() {
    if ch != '\\' {
      unescaped.push(ch);
      continue;
    }
    match chars.next() {
      Some('/') => unescaped.push('/'),
      Some(next) => {
        unescaped.push('\\');
        unescaped.push(next);
      },
      None => unescaped.push('\\'),
    }
  }
  unescaped
}

pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParseError> {
  Tokenizer::new(input).collect()
}
