//! Frontend compilation pipeline
//!
//! Lexing and parsing: source text goes in, a compiled
//! [`crate::runtime::module::Module`] comes out.

pub mod lexer;
pub mod parser;

use crate::runtime::module::Module;
use parser::{ParseError, Parser};

/// Compile `source` into a fresh module
pub fn compile(source: &str) -> Result<Module, ParseError> {
    let mut module = Module::new();
    Parser::new(source).parse_into_module(&mut module)?;
    Ok(module)
}
