//! Stock native bindings
//!
//! Host-side implementations for the native functions Pulsar programs
//! conventionally declare: printing, stdio, panicking and basic
//! filesystem access. Binding goes by signature, so a handler only
//! attaches where the program actually declared the matching native.

pub mod filesystem;
pub mod panic;
pub mod print;
pub mod stdio;

use crate::runtime::module::Module;

/// Bind every stock native to its matching declarations in `module`.
/// Returns how many declarations were bound.
pub fn bind_all(module: &mut Module) -> usize {
    print::bind_to_module(module)
        + stdio::bind_to_module(module)
        + panic::bind_to_module(module)
        + filesystem::bind_to_module(module)
}
