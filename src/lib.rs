//! Pulsar Programming Language
//!
//! An embeddable stack-based scripting language with a bytecode
//! interpreter. Source text is lowered straight into a [`Module`] of
//! stack-machine functions; an [`ExecutionContext`] then interprets that
//! module, calling back into host-bound native functions along the way.
//!
//! # Example
//!
//! ```pulsar
//! *(println!(msg))
//! (main)
//!     "Hello, Pulsar!" println!
//! end
//! ```
//!
//! Embedding looks like:
//!
//! ```rust,ignore
//! use pulsar::{bindings, frontend, ExecutionContext};
//!
//! let mut module = frontend::compile(source)?;
//! bindings::bind_all(&mut module);
//! let mut ctx = ExecutionContext::new(&module);
//! ctx.call_function(module.find_function_by_name("main").unwrap())?;
//! println!("{:?}", ctx.stack());
//! ```

#![doc(html_root_url = "https://docs.rs/pulsar")]
#![warn(rust_2018_idioms)]

// Public modules
pub mod bindings;
pub mod ffi;
pub mod frontend;
pub mod runtime;
pub mod util;
pub mod version;
pub mod vm;

// Re-exports
pub use frontend::compile;
pub use frontend::lexer::{to_string_literal, LexError, Lexer};
pub use frontend::parser::{ParseError, ParseErrorKind, Parser};
pub use runtime::module::{
    native, FunctionDefinition, FunctionSignature, Module, NativeFunction,
};
pub use runtime::value::{custom_data, CustomDataHandle, List, PulsarString, Value, ValueKind};
pub use vm::errors::{RuntimeError, RuntimeResult, RuntimeState};
pub use vm::executor::{ExecutionConfig, ExecutionContext};
pub use vm::instructions::Instruction;

/// Interpreter version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Language name
pub const NAME: &str = "Pulsar";

/// Errors a whole compile-and-run pipeline can produce
#[derive(Debug, thiserror::Error)]
pub enum PulsarError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("module has no `main` function")]
    NoEntryPoint,
}

/// Compile `source`, bind the stock natives and run `main`, returning
/// the result stack.
///
/// This is the batteries-included entry the CLI uses; embedders wanting
/// custom natives or step-wise execution assemble the pieces themselves.
pub fn run(source: &str) -> Result<Vec<Value>, PulsarError> {
    let mut module = frontend::compile(source)?;
    bindings::bind_all(&mut module);

    let entry = module
        .find_function_by_name("main")
        .ok_or(PulsarError::NoEntryPoint)?;
    let mut ctx = ExecutionContext::new(&module);
    ctx.call_function(entry)?;
    Ok(ctx.stack().to_vec())
}
