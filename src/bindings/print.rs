//! Value printing natives

use std::io::Write;

use crate::runtime::module::{native, FunctionSignature, Module};
use crate::runtime::value::Value;
use crate::vm::errors::{RuntimeError, RuntimeResult};
use crate::vm::executor::ExecutionContext;

/// Bind `print!` and `println!` to matching declarations
pub fn bind_to_module(module: &mut Module) -> usize {
    module.bind_native_function_by_signature(
        &FunctionSignature::new("print!", 1, 0),
        native(|ctx| print_value(ctx, false)),
    ) + module.bind_native_function_by_signature(
        &FunctionSignature::new("println!", 1, 0),
        native(|ctx| print_value(ctx, true)),
    )
}

fn print_value(ctx: &mut ExecutionContext<'_>, newline: bool) -> RuntimeResult<()> {
    let value = ctx.current_frame()?.local(0)?.clone();
    let mut out = std::io::stdout().lock();
    let result = match &value {
        // String payloads go out raw, bytes included
        Value::String(s) => out.write_all(s.as_bytes()),
        other => write!(out, "{}", other),
    };
    let result = result.and_then(|_| if newline { out.write_all(b"\n") } else { Ok(()) });
    result.map_err(|err| RuntimeError::message(format!("write to stdout failed: {}", err)))
}
