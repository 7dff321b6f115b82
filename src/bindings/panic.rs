//! Panic natives
//!
//! These unwind their own frame before failing, so the reported call
//! stack ends at the panicking caller rather than inside the native.

use crate::runtime::module::{native, FunctionSignature, Module};
use crate::vm::errors::{RuntimeError, RuntimeResult};
use crate::vm::executor::ExecutionContext;

/// Bind `panic!` and `panic/type!`
pub fn bind_to_module(module: &mut Module) -> usize {
    module.bind_native_function_by_signature(
        &FunctionSignature::new("panic!", 0, 0),
        native(panic_error),
    ) + module.bind_native_function_by_signature(
        &FunctionSignature::new("panic/type!", 0, 0),
        native(panic_type),
    )
}

fn panic_error(ctx: &mut ExecutionContext<'_>) -> RuntimeResult<()> {
    ctx.pop_frame();
    Err(RuntimeError::message("panic!"))
}

fn panic_type(ctx: &mut ExecutionContext<'_>) -> RuntimeResult<()> {
    ctx.pop_frame();
    Err(RuntimeError::TypeError {
        operation: "panic/type!",
        operands: String::from("raised by the program"),
    })
}
