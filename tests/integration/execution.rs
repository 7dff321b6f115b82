//! End-to-end execution through the public API

use std::sync::Arc;

use parking_lot::Mutex;

use pulsar::{
    compile, native, ExecutionContext, FunctionSignature, List, Module, Parser, RuntimeState,
    Value,
};

fn run_entry(module: &Module, name: &str) -> (Vec<Value>, RuntimeState) {
    let entry = module.find_function_by_name(name).expect("entry exists");
    let mut ctx = ExecutionContext::new(module);
    let _ = ctx.call_function(entry);
    (ctx.stack().to_vec(), ctx.state())
}

#[test]
fn arithmetic_program_produces_result_stack() {
    let module = compile("(main) -> 1 1 2 + end").unwrap();
    let (stack, state) = run_entry(&module, "main");
    assert_eq!(state, RuntimeState::Ok);
    assert_eq!(stack, vec![Value::Integer(3)]);
}

#[test]
fn native_observes_argument_locals() {
    let mut module = Module::new();
    Parser::new("*(println!(msg)) (main) \"hi\" println! end")
        .parse_into_module(&mut module)
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    module.bind_native_function_by_signature(
        &FunctionSignature::new("println!", 1, 0),
        native(move |ctx| {
            sink.lock().push(ctx.current_frame()?.local(0)?.clone());
            Ok(())
        }),
    );

    let (_, state) = run_entry(&module, "main");
    assert_eq!(state, RuntimeState::Ok);
    assert_eq!(seen.lock().as_slice(), &[Value::String("hi".into())]);
}

#[test]
fn type_error_surfaces_with_preserved_stack() {
    let module = compile("(main) -> 1 1 \"a\" + end").unwrap();
    let entry = module.find_function_by_name("main").unwrap();
    let mut ctx = ExecutionContext::new(&module);
    assert!(ctx.call_function(entry).is_err());
    assert_eq!(ctx.state(), RuntimeState::TypeError);
    assert!(!ctx.call_stack().is_empty());
}

#[test]
fn countdown_loops_through_recursion() {
    let source = "\
        (sum-to n) -> 1 \
            if n 0 = : 0 \
            else n n 1 - sum-to + end \
        end \
        (main) -> 1 100 sum-to end";
    let module = compile(source).unwrap();
    let (stack, state) = run_entry(&module, "main");
    assert_eq!(state, RuntimeState::Ok);
    assert_eq!(stack, vec![Value::Integer(5050)]);
}

#[test]
fn list_values_flow_between_host_and_program() {
    let module = compile("(join a b) -> 1 a b . end").unwrap();
    let mut ctx = ExecutionContext::new(&module);

    let left: List = [Value::Integer(1), Value::Integer(2)].into_iter().collect();
    let right: List = [Value::String("three".into())].into_iter().collect();
    ctx.stack_mut().push(Value::List(left));
    ctx.stack_mut().push(Value::List(right));

    ctx.call_function(0).unwrap();
    let Some(Value::List(joined)) = ctx.stack().first() else {
        panic!("expected a list result, got {:?}", ctx.stack());
    };
    assert_eq!(
        joined.iter().cloned().collect::<Vec<_>>(),
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::String("three".into()),
        ]
    );
}

#[test]
fn double_and_integer_arithmetic_promotes() {
    let module = compile("(main) -> 1 1 2 + 0.5 * end").unwrap();
    let (stack, _) = run_entry(&module, "main");
    assert_eq!(stack, vec![Value::Double(1.5)]);
}

#[test]
fn references_are_first_class_values() {
    let module = compile("*(emit!(v)) (main) -> 2 :emit! :main end").unwrap();
    let (stack, state) = run_entry(&module, "main");
    assert_eq!(state, RuntimeState::Ok);
    assert_eq!(
        stack,
        vec![
            Value::NativeFunctionReference(0),
            Value::FunctionReference(0),
        ]
    );
}
