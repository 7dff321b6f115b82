//! Filesystem natives

use std::path::Path;

use crate::runtime::module::{native, FunctionSignature, Module};
use crate::runtime::value::{PulsarString, Value};
use crate::vm::errors::{RuntimeError, RuntimeResult};
use crate::vm::executor::ExecutionContext;

/// Bind `fs/exists?` and `fs/read-all`
pub fn bind_to_module(module: &mut Module) -> usize {
    module.bind_native_function_by_signature(
        &FunctionSignature::new("fs/exists?", 1, 2),
        native(exists),
    ) + module.bind_native_function_by_signature(
        &FunctionSignature::new("fs/read-all", 1, 1),
        native(read_all),
    )
}

fn path_argument(ctx: &ExecutionContext<'_>, operation: &'static str) -> RuntimeResult<String> {
    let value = ctx.current_frame()?.local(0)?;
    let Value::String(path) = value else {
        return Err(RuntimeError::type_error_unary(operation, value));
    };
    path.as_utf8()
        .map(str::to_owned)
        .ok_or_else(|| RuntimeError::message("path is not valid UTF-8"))
}

/// Pushes the path back followed by an existence flag, so callers can
/// keep threading the path without duplicating it themselves.
fn exists(ctx: &mut ExecutionContext<'_>) -> RuntimeResult<()> {
    let path = path_argument(ctx, "fs/exists?")?;
    let found = Path::new(&path).exists();
    ctx.push_operand(Value::String(path.into()))?;
    ctx.push_operand(Value::Integer(found as i64))
}

fn read_all(ctx: &mut ExecutionContext<'_>) -> RuntimeResult<()> {
    let path = path_argument(ctx, "fs/read-all")?;
    if !Path::new(&path).is_file() {
        return Err(RuntimeError::message(format!(
            "`{}` is not a regular file",
            path
        )));
    }
    let contents = std::fs::read(&path)
        .map_err(|err| RuntimeError::message(format!("failed to read `{}`: {}", path, err)))?;
    ctx.push_operand(Value::String(PulsarString::from(contents)))
}
