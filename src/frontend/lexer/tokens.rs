//! Token types

use crate::util::span::Span;

/// Token kind
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Produced when the scanner cannot make a token; the lexer keeps the
    /// error details for the caller to inspect.
    None,

    // Keywords
    KwIf,
    KwElse,
    KwEnd,

    // Identifiers and literals
    Identifier(String),
    IntegerLiteral(i64),
    DoubleLiteral(f64),
    /// String payloads are raw bytes: `\xHH;` escapes may inject bytes
    /// that do not form valid UTF-8, and those must survive untouched.
    StringLiteral(Vec<u8>),

    // Operators
    Plus,
    Minus,
    Star,
    FullStop,
    Negate,
    Equals,
    NotEquals,
    Less,
    LessOrEqual,
    More,
    MoreOrEqual,

    // Delimiters
    OpenParenth,
    CloseParenth,
    Colon,
    RightArrow,

    // Special
    EndOfFile,
}

impl TokenKind {
    /// Human readable name used in diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::None => "<none>",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwEnd => "end",
            TokenKind::Identifier(_) => "identifier",
            TokenKind::IntegerLiteral(_) => "integer literal",
            TokenKind::DoubleLiteral(_) => "double literal",
            TokenKind::StringLiteral(_) => "string literal",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::FullStop => ".",
            TokenKind::Negate => "!",
            TokenKind::Equals => "=",
            TokenKind::NotEquals => "!=",
            TokenKind::Less => "<",
            TokenKind::LessOrEqual => "<=",
            TokenKind::More => ">",
            TokenKind::MoreOrEqual => ">=",
            TokenKind::OpenParenth => "(",
            TokenKind::CloseParenth => ")",
            TokenKind::Colon => ":",
            TokenKind::RightArrow => "->",
            TokenKind::EndOfFile => "end of file",
        }
    }
}

/// Token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Create a new token
    #[inline]
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    /// Identifier text, if this token is an identifier
    pub fn identifier(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

/// Map an identifier to its keyword kind, if it is one
pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
    match s {
        "if" => Some(TokenKind::KwIf),
        "else" => Some(TokenKind::KwElse),
        "end" => Some(TokenKind::KwEnd),
        _ => None,
    }
}
