//! Lexer module
//!
//! Turns UTF-8 source text into a stream of [`Token`]s. The lexer is a
//! pull-style scanner: [`Lexer::next_token`] consumes and returns one
//! token, [`Lexer::current_token`] re-reads the last production. Hosts
//! that want the whole stream at once use [`tokenize`].

pub mod tokens;

use std::iter::Peekable;
use std::str::Chars;

use crate::util::span::{Position, Span};
use tokens::{keyword_from_str, Token, TokenKind};

/// Lexer error
#[derive(Debug, Clone, thiserror::Error)]
pub enum LexError {
    #[error("integer literal out of range at {position}")]
    IntegerOverflow { position: Position },
    #[error("malformed number literal at {position}")]
    InvalidNumber { position: Position },
    #[error("unterminated string literal starting at {position}")]
    UnterminatedString { position: Position },
    #[error("invalid escape sequence `\\{sequence}` at {position}")]
    InvalidEscape { sequence: String, position: Position },
    #[error("unexpected character `{ch}` at {position}")]
    UnexpectedChar { ch: char, position: Position },
}

impl LexError {
    /// Source position the error was raised at
    pub fn position(&self) -> Position {
        match self {
            LexError::IntegerOverflow { position }
            | LexError::InvalidNumber { position }
            | LexError::UnterminatedString { position }
            | LexError::InvalidEscape { position, .. }
            | LexError::UnexpectedChar { position, .. } => *position,
        }
    }
}

/// Tokenize source code into a full token stream (EndOfFile included)
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token().clone();
        if let Some(err) = lexer.error() {
            return Err(err.clone());
        }
        let done = token.kind == TokenKind::EndOfFile;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

/// Pull-style scanner over UTF-8 source text
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    offset: usize,
    line: usize,
    column: usize,
    start_offset: usize,
    start_line: usize,
    start_column: usize,
    current: Token,
    error: Option<LexError>,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `source`
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
            start_offset: 0,
            start_line: 1,
            start_column: 1,
            current: Token::new(TokenKind::None, Span::default()),
            error: None,
        }
    }

    /// Consume and return the next token.
    ///
    /// Scan failures produce a [`TokenKind::None`] token whose span points
    /// at the offending input; the details stay available via [`Lexer::error`].
    pub fn next_token(&mut self) -> &Token {
        self.current = self.scan_token();
        &self.current
    }

    /// Re-read the last produced token
    #[inline]
    pub fn current_token(&self) -> &Token {
        &self.current
    }

    /// Whether the source text is exhausted
    #[inline]
    pub fn is_end_of_file(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    /// The first scan failure, if any
    #[inline]
    pub fn error(&self) -> Option<&LexError> {
        self.error.as_ref()
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.offset,
        }
    }

    fn start_position(&self) -> Position {
        Position {
            line: self.start_line,
            column: self.start_column,
            offset: self.start_offset,
        }
    }

    fn span(&self) -> Span {
        Span {
            start: self.start_position(),
            end: self.position(),
        }
    }

    fn advance(&mut self) -> Option<char> {
        match self.chars.next() {
            Some('\n') => {
                self.offset += 1;
                self.line += 1;
                self.column = 1;
                Some('\n')
            }
            Some(c) => {
                self.offset += c.len_utf8();
                self.column += 1;
                Some(c)
            }
            None => None,
        }
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn peek_next(&mut self) -> Option<char> {
        self.chars.clone().nth(1)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '/' if self.peek_next() == Some('/') => {
                    while let Some(&c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        self.start_offset = self.offset;
        self.start_line = self.line;
        self.start_column = self.column;

        let Some(c) = self.advance() else {
            return self.make_token(TokenKind::EndOfFile);
        };

        match c {
            '(' => self.make_token(TokenKind::OpenParenth),
            ')' => self.make_token(TokenKind::CloseParenth),
            '+' => self.make_token(TokenKind::Plus),
            '*' => self.make_token(TokenKind::Star),
            ':' => self.make_token(TokenKind::Colon),
            '.' => self.make_token(TokenKind::FullStop),
            '=' => self.make_token(TokenKind::Equals),
            '-' => {
                if self.peek() == Some(&'>') {
                    self.advance();
                    self.make_token(TokenKind::RightArrow)
                } else {
                    self.make_token(TokenKind::Minus)
                }
            }
            '<' => {
                if self.peek() == Some(&'=') {
                    self.advance();
                    self.make_token(TokenKind::LessOrEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            '>' => {
                if self.peek() == Some(&'=') {
                    self.advance();
                    self.make_token(TokenKind::MoreOrEqual)
                } else {
                    self.make_token(TokenKind::More)
                }
            }
            '!' => {
                if self.peek() == Some(&'=') {
                    self.advance();
                    self.make_token(TokenKind::NotEquals)
                } else if self
                    .peek()
                    .map(|&c| is_identifier_continuation(c))
                    .unwrap_or(false)
                {
                    self.scan_identifier(c)
                } else {
                    self.make_token(TokenKind::Negate)
                }
            }
            '"' => self.scan_string(),
            c if c.is_ascii_digit() => self.scan_number(c),
            c if is_identifier_start(c) => self.scan_identifier(c),
            c => self.fail(LexError::UnexpectedChar {
                ch: c,
                position: self.start_position(),
            }),
        }
    }

    fn scan_identifier(&mut self, first_char: char) -> Token {
        let mut value = String::new();
        value.push(first_char);

        while let Some(&c) = self.peek() {
            if is_identifier_continuation(c) {
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        match keyword_from_str(&value) {
            Some(kind) => self.make_token(kind),
            None => self.make_token(TokenKind::Identifier(value)),
        }
    }

    fn scan_number(&mut self, first_char: char) -> Token {
        // Hex and binary literals
        if first_char == '0' {
            if let Some(&radix_char) = self.peek() {
                let radix = match radix_char {
                    'x' | 'X' => Some(16),
                    'b' | 'B' => Some(2),
                    _ => None,
                };
                if let Some(radix) = radix {
                    self.advance();
                    return self.scan_radix_digits(radix);
                }
            }
        }

        let mut text = String::new();
        text.push(first_char);
        while let Some(&c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // A dot only makes a double when a digit follows, otherwise it is
        // the concat operator applied to the integer before it.
        if self.peek() == Some(&'.') && self.peek_next().map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            self.advance();
            text.push('.');
            while let Some(&c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            return match text.parse::<f64>() {
                Ok(val) => self.make_token(TokenKind::DoubleLiteral(val)),
                Err(_) => self.fail(LexError::InvalidNumber {
                    position: self.start_position(),
                }),
            };
        }

        match text.parse::<i64>() {
            Ok(val) => self.make_token(TokenKind::IntegerLiteral(val)),
            Err(_) => self.fail(LexError::IntegerOverflow {
                position: self.start_position(),
            }),
        }
    }

    fn scan_radix_digits(&mut self, radix: u32) -> Token {
        let mut text = String::new();
        while let Some(&c) = self.peek() {
            if c.is_digit(radix) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if text.is_empty() {
            return self.fail(LexError::InvalidNumber {
                position: self.start_position(),
            });
        }
        match i64::from_str_radix(&text, radix) {
            Ok(val) => self.make_token(TokenKind::IntegerLiteral(val)),
            Err(_) => self.fail(LexError::IntegerOverflow {
                position: self.start_position(),
            }),
        }
    }

    fn scan_string(&mut self) -> Token {
        let mut value: Vec<u8> = Vec::new();

        loop {
            let Some(c) = self.advance() else {
                return self.fail(LexError::UnterminatedString {
                    position: self.start_position(),
                });
            };
            match c {
                '"' => return self.make_token(TokenKind::StringLiteral(value)),
                '\n' => {
                    return self.fail(LexError::UnterminatedString {
                        position: self.start_position(),
                    });
                }
                '\\' => {
                    if let Some(err) = self.scan_escape(&mut value) {
                        return self.fail(err);
                    }
                }
                c => {
                    let mut buf = [0u8; 4];
                    value.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    /// Scan one escape sequence after the backslash, appending its bytes.
    /// Returns the error on malformed input.
    fn scan_escape(&mut self, out: &mut Vec<u8>) -> Option<LexError> {
        let position = self.position();
        let Some(esc) = self.advance() else {
            return Some(LexError::UnterminatedString {
                position: self.start_position(),
            });
        };
        match esc {
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            '"' => out.push(b'"'),
            '\\' => out.push(b'\\'),
            'x' => match self.scan_escape_digits('x', 2, position) {
                Ok(byte) => out.push(byte as u8),
                Err(err) => return Some(err),
            },
            'u' => match self.scan_escape_digits('u', 6, position) {
                Ok(code) => match char::from_u32(code) {
                    Some(c) => {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    }
                    None => {
                        return Some(LexError::InvalidEscape {
                            sequence: format!("u{:X};", code),
                            position,
                        });
                    }
                },
                Err(err) => return Some(err),
            },
            c => {
                return Some(LexError::InvalidEscape {
                    sequence: c.to_string(),
                    position,
                });
            }
        }
        None
    }

    /// Hex digits terminated by `;`, at most `max_digits` of them
    fn scan_escape_digits(
        &mut self,
        kind: char,
        max_digits: usize,
        position: Position,
    ) -> Result<u32, LexError> {
        let mut digits = String::new();
        while let Some(&c) = self.peek() {
            if c.is_ascii_hexdigit() {
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if digits.is_empty() || digits.len() > max_digits || self.peek() != Some(&';') {
            return Err(LexError::InvalidEscape {
                sequence: format!("{}{}", kind, digits),
                position,
            });
        }
        self.advance();
        u32::from_str_radix(&digits, 16).map_err(|_| LexError::InvalidEscape {
            sequence: format!("{}{}", kind, digits),
            position,
        })
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.span())
    }

    fn fail(&mut self, err: LexError) -> Token {
        if self.error.is_none() {
            self.error = Some(err);
        }
        Token::new(TokenKind::None, self.span())
    }
}

/// Whether `c` can start an identifier
pub fn is_identifier_start(c: char) -> bool {
    unicode_ident::is_xid_start(c) || matches!(c, '_' | '?' | '!')
}

/// Whether `c` can continue an identifier.
///
/// `-` and `/` are word characters here (`fs/read-all`), so `->` and `//`
/// only act as arrow and comment when they do not directly follow one.
pub fn is_identifier_continuation(c: char) -> bool {
    unicode_ident::is_xid_continue(c) || matches!(c, '_' | '?' | '!' | '\'' | '-' | '/')
}

/// Render a string payload back to source literal form.
///
/// Printable ASCII passes through, the short escapes are used where they
/// exist, other ASCII control bytes become `\xHH;`, non-ASCII code points
/// become `\uHHHHHH;` and bytes that do not form valid UTF-8 are
/// preserved as `\xHH;`. Lexing the result yields the original payload.
pub fn to_string_literal(bytes: &[u8]) -> String {
    let mut lit = String::with_capacity(bytes.len() + 2);
    lit.push('"');
    let mut i = 0;
    while i < bytes.len() {
        let (decoded, len) = decode_utf8(&bytes[i..]);
        match decoded {
            None => {
                lit.push_str("\\x");
                put_hex(&mut lit, bytes[i] as u64);
                lit.push(';');
            }
            Some('"') => lit.push_str("\\\""),
            Some('\\') => lit.push_str("\\\\"),
            Some('\n') => lit.push_str("\\n"),
            Some('\r') => lit.push_str("\\r"),
            Some('\t') => lit.push_str("\\t"),
            Some(c) if c.is_ascii() => {
                if c.is_ascii_control() {
                    lit.push_str("\\x");
                    put_hex(&mut lit, c as u64);
                    lit.push(';');
                } else {
                    lit.push(c);
                }
            }
            Some(c) => {
                lit.push_str("\\u");
                put_hex(&mut lit, c as u64);
                lit.push(';');
            }
        }
        i += len;
    }
    lit.push('"');
    lit
}

/// Append `n` as uppercase hex with no leading zeros
fn put_hex(out: &mut String, n: u64) {
    let mut digits = [0u8; 16];
    let mut count = 0;
    let mut n = n;
    loop {
        let digit = (n & 0xF) as u8;
        digits[count] = if digit >= 0xA {
            b'A' + digit - 10
        } else {
            b'0' + digit
        };
        count += 1;
        n >>= 4;
        if n == 0 {
            break;
        }
    }
    for idx in (0..count).rev() {
        out.push(digits[idx] as char);
    }
}

/// Decode one UTF-8 code point from the front of `bytes`.
///
/// Returns `(None, 1)` when the leading byte does not begin a valid
/// encoding, so callers can emit it raw and resynchronize.
fn decode_utf8(bytes: &[u8]) -> (Option<char>, usize) {
    let len = match bytes[0] {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => return (None, 1),
    };
    if bytes.len() < len {
        return (None, 1);
    }
    match std::str::from_utf8(&bytes[..len]) {
        Ok(s) => match s.chars().next() {
            Some(c) => (Some(c), len),
            None => (None, 1),
        },
        Err(_) => (None, 1),
    }
}

#[cfg(test)]
mod tests;
