//! String literal round-trip property
//!
//! For any byte payload, rendering it with `to_string_literal` and
//! lexing the result yields the payload back, invalid UTF-8 included.

use proptest::prelude::*;

use pulsar::frontend::lexer::{tokenize, tokens::TokenKind};
use pulsar::to_string_literal;

fn lex_string_literal(literal: &str) -> Vec<u8> {
    let tokens = tokenize(literal).expect("literal lexes");
    match &tokens[0].kind {
        TokenKind::StringLiteral(bytes) => bytes.clone(),
        other => panic!("expected a string literal, got {:?}", other),
    }
}

proptest! {
    #[test]
    fn arbitrary_bytes_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
        let literal = to_string_literal(&payload);
        prop_assert_eq!(lex_string_literal(&literal), payload);
    }

    #[test]
    fn arbitrary_strings_round_trip(payload in ".*") {
        let literal = to_string_literal(payload.as_bytes());
        prop_assert_eq!(lex_string_literal(&literal), payload.as_bytes());
    }
}

#[test]
fn literal_rendering_is_stable() {
    let payload = b"tab\t quote\" backslash\\ \xFF";
    let literal = to_string_literal(payload);
    assert_eq!(to_string_literal(&lex_string_literal(&literal)), literal);
}
