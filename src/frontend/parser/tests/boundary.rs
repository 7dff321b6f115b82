//! Boundary case parser tests

use crate::frontend::compile;
use crate::frontend::parser::{ParseErrorKind, Parser};
use crate::runtime::module::{FunctionSignature, Module};
use crate::vm::errors::RuntimeResult;
use crate::vm::executor::ExecutionContext;
use std::sync::Arc;

fn noop_native(_ctx: &mut ExecutionContext<'_>) -> RuntimeResult<()> {
    Ok(())
}

/// Test empty bodies against explicit result counts
#[test]
fn test_empty_body_result_counts() {
    assert!(compile("(noop) -> 0 end").is_ok());

    let err = compile("(noop) -> 1 end").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::NegativeResultCount);
}

/// Test a literally negative annotation
#[test]
fn test_negative_result_annotation() {
    let err = compile("(f) -> -1 end").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::NegativeResultCount);
}

/// Test a body with a negative net stack effect
#[test]
fn test_body_consumes_too_much() {
    let err = compile("(f) + end").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::NegativeResultCount);
}

/// Test undeclared identifiers and the offending token position
#[test]
fn test_undeclared_function() {
    let err = compile("(main) foo end").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UsageOfUndeclaredFunction);
    assert_eq!(err.token.span.start.line, 1);
    assert_eq!(err.token.span.start.column, 8);
    assert_eq!(err.token.identifier(), Some("foo"));
}

/// Test that bang-suffixed names report the native-specific kind
#[test]
fn test_undeclared_native() {
    let err = compile("(main) \"hi\" println! end").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UsageOfUndeclaredNativeFunction);
}

/// Test storing into a local that was never declared
#[test]
fn test_undeclared_local_store() {
    let err = compile("(main) 1 -> acc end").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UsageOfUndeclaredLocal);
}

/// Test branch stack-effect divergence
#[test]
fn test_if_branch_divergence() {
    // A then-branch that pushes with no else to match it
    let err = compile("(main) if 1 : 2 end end").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::Error);

    let err = compile("(main) -> 1 if 1 : 2 else 3 4 end end").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::Error);
}

/// Test an unterminated function body
#[test]
fn test_missing_end() {
    let err = compile("(main) 1 2 +").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
}

/// Test junk at module level
#[test]
fn test_unexpected_top_level_token() {
    let err = compile("42").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
}

/// Test that lexer failures surface as parse errors with a position
#[test]
fn test_lex_error_surfaces() {
    let err = compile("(main) \"abc end").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
    assert!(err.message.contains("unterminated string"));
}

/// Test native declarations rejecting extra locals
#[test]
fn test_native_with_extra_locals() {
    let err = compile("*(foo a : b)").unwrap_err();
    assert_eq!(err.kind, ParseErrorKind::UnexpectedToken);
}

/// Test that a failed parse leaves the target module untouched
#[test]
fn test_no_partial_module_on_error() {
    let mut module = Module::new();
    module.declare_and_bind_native_function(
        FunctionSignature::new("host!", 0, 0).to_native_definition(),
        Arc::new(noop_native),
    );

    let mut parser = Parser::new("(ok) end (broken) oops end");
    assert!(parser.parse_into_module(&mut module).is_err());

    assert!(module.functions.is_empty());
    assert_eq!(module.native_bindings.len(), 1);
}

/// Test the retained last-error triplet
#[test]
fn test_last_error_is_retained() {
    let mut module = Module::new();
    let mut parser = Parser::new("(main) foo end");
    let err = parser.parse_into_module(&mut module).unwrap_err();

    assert_eq!(
        parser.last_error().map(|e| e.kind),
        Some(ParseErrorKind::UsageOfUndeclaredFunction)
    );
    assert_eq!(
        parser.last_error_token().map(|t| t.span.start.column),
        Some(err.token.span.start.column)
    );
    assert!(parser
        .last_error_message()
        .is_some_and(|m| m.contains("foo")));
}
