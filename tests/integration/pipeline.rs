//! The batteries-included pipeline and its error surfaces

use pulsar::{run, ParseErrorKind, PulsarError, RuntimeState, Value};

#[test]
fn run_compiles_binds_and_executes() {
    let stack = run("(main) -> 1 6 7 * end").unwrap();
    assert_eq!(stack, vec![Value::Integer(42)]);
}

#[test]
fn run_reports_parse_errors_with_positions() {
    let err = run("(main)\n  foo\nend").unwrap_err();
    let PulsarError::Parse(parse) = err else {
        panic!("expected a parse error, got {:?}", err);
    };
    assert_eq!(parse.kind, ParseErrorKind::UsageOfUndeclaredFunction);
    assert_eq!(parse.token.span.start.line, 2);
    assert_eq!(parse.token.span.start.column, 3);
    assert!(parse.to_string().contains("2:3"));
}

#[test]
fn run_requires_an_entry_point() {
    let err = run("(helper) end").unwrap_err();
    assert!(matches!(err, PulsarError::NoEntryPoint));
}

#[test]
fn stock_panic_binding_unwinds() {
    let err = run("*(panic!) (main) panic! end").unwrap_err();
    let PulsarError::Runtime(runtime) = err else {
        panic!("expected a runtime error, got {:?}", err);
    };
    assert_eq!(runtime.state(), RuntimeState::Error);
}

#[test]
fn stock_type_panic_binding_reports_type_error() {
    let err = run("*(panic/type!) (main) panic/type! end").unwrap_err();
    let PulsarError::Runtime(runtime) = err else {
        panic!("expected a runtime error, got {:?}", err);
    };
    assert_eq!(runtime.state(), RuntimeState::TypeError);
}

#[test]
fn undeclared_stock_native_stays_unbound() {
    // The program never declares `println!`, so nothing binds and the
    // name cannot resolve
    let err = run("(main) \"x\" println! end").unwrap_err();
    let PulsarError::Parse(parse) = err else {
        panic!("expected a parse error, got {:?}", err);
    };
    assert_eq!(
        parse.kind,
        ParseErrorKind::UsageOfUndeclaredNativeFunction
    );
}

#[test]
fn declared_but_unbound_native_fails_at_call_time() {
    let err = run("*(mystery!) (main) mystery! end").unwrap_err();
    let PulsarError::Runtime(runtime) = err else {
        panic!("expected a runtime error, got {:?}", err);
    };
    assert_eq!(runtime.state(), RuntimeState::NoNativeBoundFunction);
}
