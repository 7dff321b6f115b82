//! Standard stream natives

use std::io::{BufRead, Write};

use crate::runtime::module::{native, FunctionSignature, Module};
use crate::runtime::value::Value;
use crate::vm::errors::{RuntimeError, RuntimeResult};
use crate::vm::executor::ExecutionContext;

/// Bind `stdin/read`, `stdout/write!` and `stdout/writeln!`
pub fn bind_to_module(module: &mut Module) -> usize {
    module.bind_native_function_by_signature(
        &FunctionSignature::new("stdin/read", 0, 1),
        native(read_line),
    ) + module.bind_native_function_by_signature(
        &FunctionSignature::new("stdout/write!", 1, 0),
        native(|ctx| write_string(ctx, "stdout/write!", false)),
    ) + module.bind_native_function_by_signature(
        &FunctionSignature::new("stdout/writeln!", 1, 0),
        native(|ctx| write_string(ctx, "stdout/writeln!", true)),
    )
}

fn read_line(ctx: &mut ExecutionContext<'_>) -> RuntimeResult<()> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|err| RuntimeError::message(format!("read from stdin failed: {}", err)))?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    ctx.push_operand(Value::String(line.into()))
}

fn write_string(
    ctx: &mut ExecutionContext<'_>,
    operation: &'static str,
    newline: bool,
) -> RuntimeResult<()> {
    let value = ctx.current_frame()?.local(0)?.clone();
    let Value::String(message) = &value else {
        return Err(RuntimeError::type_error_unary(operation, &value));
    };
    let mut out = std::io::stdout().lock();
    out.write_all(message.as_bytes())
        .and_then(|_| if newline { out.write_all(b"\n") } else { Ok(()) })
        .and_then(|_| out.flush())
        .map_err(|err| RuntimeError::message(format!("write to stdout failed: {}", err)))
}
