//! Lexer unit tests

use crate::frontend::lexer::{to_string_literal, tokenize, LexError, Lexer, TokenKind};

mod lexer_basic_tests {
    use super::*;

    #[test]
    fn test_empty_source() {
        let tokens = tokenize("").unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(matches!(tokens[0].kind, TokenKind::EndOfFile));
    }

    #[test]
    fn test_whitespace_and_comments() {
        let tokens = tokenize("   \t\n// a comment\r\n   ").unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(matches!(tokens[0].kind, TokenKind::EndOfFile));
    }

    #[test]
    fn test_identifier() {
        let tokens = tokenize("hello-world fs/read-all println! empty?").unwrap();
        let names: Vec<_> = tokens
            .iter()
            .filter_map(|t| t.identifier().map(str::to_owned))
            .collect();
        assert_eq!(
            names,
            vec!["hello-world", "fs/read-all", "println!", "empty?"]
        );
    }

    #[test]
    fn test_keywords() {
        let tokens = tokenize("if else end iffy").unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::KwIf));
        assert!(matches!(tokens[1].kind, TokenKind::KwElse));
        assert!(matches!(tokens[2].kind, TokenKind::KwEnd));
        assert!(matches!(tokens[3].kind, TokenKind::Identifier(_)));
    }

    #[test]
    fn test_punctuation_longest_match() {
        let tokens = tokenize("( ) + - * . : -> ! = != < <= > >=").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::OpenParenth,
                TokenKind::CloseParenth,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::FullStop,
                TokenKind::Colon,
                TokenKind::RightArrow,
                TokenKind::Negate,
                TokenKind::Equals,
                TokenKind::NotEquals,
                TokenKind::Less,
                TokenKind::LessOrEqual,
                TokenKind::More,
                TokenKind::MoreOrEqual,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("(main)\n  1\n").unwrap();
        assert_eq!(tokens[0].span.start.line, 1);
        assert_eq!(tokens[0].span.start.column, 1);
        assert_eq!(tokens[1].span.start.column, 2);
        assert_eq!(tokens[3].span.start.line, 2);
        assert_eq!(tokens[3].span.start.column, 3);
    }

    #[test]
    fn test_pull_interface() {
        let mut lexer = Lexer::new("1 2");
        assert!(matches!(
            lexer.next_token().kind,
            TokenKind::IntegerLiteral(1)
        ));
        assert!(matches!(
            lexer.current_token().kind,
            TokenKind::IntegerLiteral(1)
        ));
        assert!(matches!(
            lexer.next_token().kind,
            TokenKind::IntegerLiteral(2)
        ));
        assert!(lexer.is_end_of_file());
        assert!(matches!(lexer.next_token().kind, TokenKind::EndOfFile));
    }

    #[test]
    fn test_unexpected_char() {
        let err = tokenize("1 2 #").unwrap_err();
        assert!(matches!(err, LexError::UnexpectedChar { ch: '#', .. }));
        assert_eq!(err.position().line, 1);
        assert_eq!(err.position().column, 5);
    }
}

mod lexer_number_tests {
    use super::*;

    #[test]
    fn test_integer_literals() {
        let tokens = tokenize("0 42 0x2A 0b101010").unwrap();
        let values: Vec<i64> = tokens
            .iter()
            .filter_map(|t| match t.kind {
                TokenKind::IntegerLiteral(v) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![0, 42, 42, 42]);
    }

    #[test]
    fn test_integer_boundary() {
        let tokens = tokenize("9223372036854775807").unwrap();
        assert!(matches!(
            tokens[0].kind,
            TokenKind::IntegerLiteral(i64::MAX)
        ));

        let err = tokenize("9223372036854775808").unwrap_err();
        assert!(matches!(err, LexError::IntegerOverflow { .. }));
    }

    #[test]
    fn test_double_literals() {
        let tokens = tokenize("1.5 0.25").unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::DoubleLiteral(v) if v == 1.5));
        assert!(matches!(tokens[1].kind, TokenKind::DoubleLiteral(v) if v == 0.25));
    }

    #[test]
    fn test_dot_after_integer_is_concat() {
        // `1.` is an integer followed by the concat operator
        let tokens = tokenize("1.").unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::IntegerLiteral(1)));
        assert!(matches!(tokens[1].kind, TokenKind::FullStop));
    }

    #[test]
    fn test_empty_radix_digits() {
        let err = tokenize("0x").unwrap_err();
        assert!(matches!(err, LexError::InvalidNumber { .. }));
    }
}

mod lexer_string_tests {
    use super::*;

    fn string_bytes(source: &str) -> Vec<u8> {
        let tokens = tokenize(source).unwrap();
        match &tokens[0].kind {
            TokenKind::StringLiteral(bytes) => bytes.clone(),
            other => panic!("expected string literal, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_string() {
        assert_eq!(string_bytes("\"hi\""), b"hi");
    }

    #[test]
    fn test_short_escapes() {
        assert_eq!(string_bytes(r#""a\nb\tc\r\"\\""#), b"a\nb\tc\r\"\\");
    }

    #[test]
    fn test_hex_escape() {
        assert_eq!(string_bytes(r#""\x41;\x9;""#), b"A\t");
        // A raw byte that is not valid UTF-8 on its own
        assert_eq!(string_bytes(r#""\xFF;""#), vec![0xFF]);
    }

    #[test]
    fn test_unicode_escape() {
        assert_eq!(string_bytes(r#""\u2764;""#), "\u{2764}".as_bytes());
        assert_eq!(string_bytes(r#""\u10FFFF;""#), "\u{10FFFF}".as_bytes());
    }

    #[test]
    fn test_invalid_escapes() {
        assert!(matches!(
            tokenize(r#""\q""#).unwrap_err(),
            LexError::InvalidEscape { .. }
        ));
        // Missing semicolon terminator
        assert!(matches!(
            tokenize(r#""\x41""#).unwrap_err(),
            LexError::InvalidEscape { .. }
        ));
        // Out of Unicode range
        assert!(matches!(
            tokenize(r#""\u110000;""#).unwrap_err(),
            LexError::InvalidEscape { .. }
        ));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("\"abc").unwrap_err();
        assert!(matches!(err, LexError::UnterminatedString { .. }));
        assert_eq!(err.position().column, 1);
    }

    #[test]
    fn test_to_string_literal_renders_escapes() {
        assert_eq!(to_string_literal(b"hi"), "\"hi\"");
        assert_eq!(to_string_literal(b"a\nb"), "\"a\\nb\"");
        assert_eq!(to_string_literal(&[0xFF, b'a']), "\"\\xFF;a\"");
        assert_eq!(to_string_literal("\u{2764}".as_bytes()), "\"\\u2764;\"");
    }

    #[test]
    fn test_string_literal_round_trip() {
        let payloads: Vec<Vec<u8>> = vec![
            b"plain".to_vec(),
            b"with \"quotes\" and \\slashes\\".to_vec(),
            vec![0x00, 0x01, 0xFE, 0xFF],
            "\u{00E9}\u{4E16}\u{1F600}".as_bytes().to_vec(),
        ];
        for payload in payloads {
            let literal = to_string_literal(&payload);
            assert_eq!(string_bytes(&literal), payload, "literal {}", literal);
        }
    }

    #[test]
    fn test_determinism() {
        let source = "(main) -> 1 \"hi\" 1 2 + end";
        assert_eq!(tokenize(source).unwrap(), tokenize(source).unwrap());
    }
}
