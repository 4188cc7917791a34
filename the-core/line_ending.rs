/// Line terminators recognised by buffers and by the text measuring math.
///
/// The set has to agree with the one ropey is compiled with, otherwise a
/// position computed from a replacement string disagrees with the line the
/// buffer puts that text on. The workspace builds ropey with `cr_lines`, so
/// `\r\n`, `\n` and a lone `\r` are always line breaks. The `unicode-lines`
/// feature widens both sides together.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum LineEnding {
  /// CarriageReturn followed by LineFeed.
  Crlf,

  /// U+000A -- LineFeed
  LF,

  /// U+000D -- CarriageReturn
  CR,

  #[cfg(feature = "unicode-lines")]
  /// U+000B -- VerticalTab
  VT,

  #[cfg(feature = "unicode-lines")]
  /// U+000C -- FormFeed
  FF,

  #[cfg(feature = "unicode-lines")]
  /// U+0085 -- NextLine
  Nel,

  /// U+2028 -- Line Separator
  #[cfg(feature = "unicode-lines")]
  LS,

  /// U+2029 -- ParagraphSeparator
  #[cfg(feature = "unicode-lines")]
  PS,
}

impl LineEnding {
  #[inline]
  pub const fn from_char(ch: char) -> Option<LineEnding> {
    match ch {
      '\u{000A}' => Some(LineEnding::LF),
      '\u{000D}' => Some(LineEnding::CR),
      #[cfg(feature = "unicode-lines")]
      '\u{000B}' => Some(LineEnding::VT),
      #[cfg(feature = "unicode-lines")]
      '\u{000C}' => Some(LineEnding::FF),
      #[cfg(feature = "unicode-lines")]
      '\u{0085}' => Some(LineEnding::Nel),
      #[cfg(feature = "unicode-lines")]
      '\u{2028}' => Some(LineEnding::LS),
      #[cfg(feature = "unicode-lines")]
      '\u{2029}' => Some(LineEnding::PS),
      _ => None,
    }
  }
}

#[inline]
pub fn char_is_line_ending(ch: char) -> bool {
  LineEnding::from_char(ch).is_some()
}

/// Counts the line breaks in `text` and the chars after the last one.
///
/// A `\r\n` pair is a single break. Returns `(breaks, last_line_chars)`.
pub fn line_breaks(text: &str) -> (usize, usize) {
  let mut breaks = 0;
  let mut last_line = 0;
  let mut chars = text.chars().peekable();

  while let Some(ch) = chars.next() {
    if char_is_line_ending(ch) {
      // The `\n` of a CRLF pair closes the same line as the `\r`.
      if ch == '\r' && chars.peek() == Some(&'\n') {
        chars.next();
      }
      breaks += 1;
      last_line = 0;
    } else {
      last_line += 1;
    }
  }

  (breaks, last_line)
}
