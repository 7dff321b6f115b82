//! C ABI shim
//!
//! The embedding surface for non-Rust hosts: opaque parser and module
//! handles, flat status codes with string forms, a `CBuffer` carrier for
//! foreign custom-type data and a process-wide allocator indirection so
//! hosts (and tests) can install their own allocator.
//!
//! Everything here works in terms of raw pointers handed across the
//! boundary; the safety contracts are the usual C ones and are spelled
//! out per function.

use std::alloc::{self, Layout};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::frontend::parser::{ParseError, ParseErrorKind, Parser};
use crate::runtime::module::Module;
use crate::runtime::value::{custom_data, CustomDataHandle};
use crate::vm::errors::RuntimeState;

// ============================================================================
// Allocator indirection
// ============================================================================

/// Replaceable allocation entry points.
///
/// All shim allocations go through the installed vtable, so a host can
/// route them into its own heap and tests can count them.
#[derive(Clone, Copy)]
pub struct AllocatorVTable {
    pub malloc: unsafe extern "C" fn(usize) -> *mut c_void,
    pub realloc: unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void,
    pub free: unsafe extern "C" fn(*mut c_void),
}

impl AllocatorVTable {
    /// The built-in allocator backed by the Rust global allocator
    pub fn system() -> Self {
        Self {
            malloc: system_malloc,
            realloc: system_realloc,
            free: system_free,
        }
    }
}

static ALLOCATOR: Lazy<RwLock<AllocatorVTable>> =
    Lazy::new(|| RwLock::new(AllocatorVTable::system()));

/// Install a process-wide allocator for the shim.
///
/// Existing blocks must remain freeable: either swap before any
/// allocation or make the new vtable compatible with the old one.
pub fn set_allocator(vtable: AllocatorVTable) {
    *ALLOCATOR.write() = vtable;
}

/// Reset the shim allocator to the built-in one
pub fn reset_allocator() {
    *ALLOCATOR.write() = AllocatorVTable::system();
}

// The Rust global allocator needs the layout back at free time, so every
// block carries its total size in a 16-byte header that also keeps the
// payload malloc-aligned.
const HEADER: usize = 16;
const ALIGN: usize = 16;

unsafe extern "C" fn system_malloc(size: usize) -> *mut c_void {
    let Some(total) = size.checked_add(HEADER) else {
        return ptr::null_mut();
    };
    let Ok(layout) = Layout::from_size_align(total, ALIGN) else {
        return ptr::null_mut();
    };
    let raw = unsafe { alloc::alloc(layout) };
    if raw.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        (raw as *mut usize).write(total);
        raw.add(HEADER) as *mut c_void
    }
}

unsafe extern "C" fn system_realloc(block: *mut c_void, size: usize) -> *mut c_void {
    if block.is_null() {
        return unsafe { system_malloc(size) };
    }
    let raw = unsafe { (block as *mut u8).sub(HEADER) };
    let old_total = unsafe { (raw as *mut usize).read() };
    let Some(new_total) = size.checked_add(HEADER) else {
        return ptr::null_mut();
    };
    let Ok(old_layout) = Layout::from_size_align(old_total, ALIGN) else {
        return ptr::null_mut();
    };
    let grown = unsafe { alloc::realloc(raw, old_layout, new_total) };
    if grown.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        (grown as *mut usize).write(new_total);
        grown.add(HEADER) as *mut c_void
    }
}

unsafe extern "C" fn system_free(block: *mut c_void) {
    if block.is_null() {
        return;
    }
    let raw = unsafe { (block as *mut u8).sub(HEADER) };
    let total = unsafe { (raw as *mut usize).read() };
    if let Ok(layout) = Layout::from_size_align(total, ALIGN) {
        unsafe { alloc::dealloc(raw, layout) };
    }
}

/// Allocate through the installed vtable
///
/// # Safety
/// C allocation contract: the returned block (if non-null) must be freed
/// with [`pulsar_free`] exactly once.
#[no_mangle]
pub unsafe extern "C" fn pulsar_malloc(size: usize) -> *mut c_void {
    let vtable = *ALLOCATOR.read();
    unsafe { (vtable.malloc)(size) }
}

/// Reallocate through the installed vtable
///
/// # Safety
/// `block` must be null or a live block from [`pulsar_malloc`] /
/// [`pulsar_realloc`].
#[no_mangle]
pub unsafe extern "C" fn pulsar_realloc(block: *mut c_void, size: usize) -> *mut c_void {
    let vtable = *ALLOCATOR.read();
    unsafe { (vtable.realloc)(block, size) }
}

/// Free through the installed vtable
///
/// # Safety
/// `block` must be null or a live block from [`pulsar_malloc`] /
/// [`pulsar_realloc`]; it is dead afterwards.
#[no_mangle]
pub unsafe extern "C" fn pulsar_free(block: *mut c_void) {
    let vtable = *ALLOCATOR.read();
    unsafe { (vtable.free)(block) }
}

// ============================================================================
// CBuffer: foreign custom-type data
// ============================================================================

pub type CBufferFreeFn = unsafe extern "C" fn(*mut c_void);
pub type CBufferCopyFn = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

/// A generic portion of foreign memory with caller-supplied lifetime
/// rules.
///
/// `free` runs exactly once, when the last holder of the wrapping handle
/// goes away. A null `free` means the buffer owns nothing. A null `copy`
/// means the buffer cannot be duplicated; holders then only ever share
/// it through the reference-counted handle.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CBuffer {
    pub data: *mut c_void,
    pub free: Option<CBufferFreeFn>,
    pub copy: Option<CBufferCopyFn>,
}

impl CBuffer {
    /// A buffer holding nothing
    pub const fn null() -> Self {
        Self {
            data: ptr::null_mut(),
            free: None,
            copy: None,
        }
    }
}

/// Owning wrapper around a [`CBuffer`]; lives inside a
/// [`CustomDataHandle`]
pub struct CBufferHandle {
    buffer: CBuffer,
}

impl CBufferHandle {
    /// The raw data pointer
    pub fn data(&self) -> *mut c_void {
        self.buffer.data
    }

    /// Duplicate using the buffer's copy hook; `None` when the buffer is
    /// non-copyable.
    pub fn try_copy(&self) -> Option<CBufferHandle> {
        let copy = self.buffer.copy?;
        let data = unsafe { copy(self.buffer.data) };
        Some(CBufferHandle {
            buffer: CBuffer {
                data,
                free: self.buffer.free,
                copy: self.buffer.copy,
            },
        })
    }
}

impl Drop for CBufferHandle {
    fn drop(&mut self) {
        if let Some(free) = self.buffer.free {
            unsafe { free(self.buffer.data) };
        }
    }
}

// The holder promises its data is safe to move across threads; that is
// part of the CBuffer contract.
unsafe impl Send for CBufferHandle {}

/// Wrap a foreign buffer into custom-type instance data
pub fn cbuffer_into_custom_data(buffer: CBuffer) -> CustomDataHandle {
    custom_data(CBufferHandle { buffer })
}

// ============================================================================
// Status codes
// ============================================================================

/// `0` is success, anything else names a [`ParseErrorKind`]
pub type PulsarParseResult = c_int;

fn parse_result_code(error: Option<&ParseError>) -> PulsarParseResult {
    match error.map(|e| e.kind) {
        None => 0,
        Some(ParseErrorKind::Error) => 1,
        Some(ParseErrorKind::UnexpectedToken) => 2,
        Some(ParseErrorKind::NegativeResultCount) => 3,
        Some(ParseErrorKind::UsageOfUndeclaredLocal) => 4,
        Some(ParseErrorKind::UsageOfUndeclaredFunction) => 5,
        Some(ParseErrorKind::UsageOfUndeclaredNativeFunction) => 6,
    }
}

/// String form of a parse result code
#[no_mangle]
pub extern "C" fn pulsar_parse_result_to_string(result: PulsarParseResult) -> *const c_char {
    let name: &'static [u8] = match result {
        0 => b"OK\0",
        1 => b"Error\0",
        2 => b"UnexpectedToken\0",
        3 => b"NegativeResultCount\0",
        4 => b"UsageOfUndeclaredLocal\0",
        5 => b"UsageOfUndeclaredFunction\0",
        6 => b"UsageOfUndeclaredNativeFunction\0",
        _ => b"Unknown\0",
    };
    name.as_ptr() as *const c_char
}

/// Flat runtime state code, mirroring [`RuntimeState`]
pub fn runtime_state_code(state: RuntimeState) -> c_int {
    match state {
        RuntimeState::Ok => 0,
        RuntimeState::Error => 1,
        RuntimeState::TypeError => 2,
        RuntimeState::StackOverflow => 3,
        RuntimeState::StackUnderflow => 4,
        RuntimeState::OutOfBoundsLocalIndex => 5,
        RuntimeState::CallstackOverflow => 6,
        RuntimeState::NoCustomTypeData => 7,
        RuntimeState::InvalidCustomTypeHandle => 8,
        RuntimeState::NoNativeBoundFunction => 9,
    }
}

/// String form of a runtime state code
#[no_mangle]
pub extern "C" fn pulsar_runtime_state_to_string(state: c_int) -> *const c_char {
    let name: &'static [u8] = match state {
        0 => b"OK\0",
        1 => b"Error\0",
        2 => b"TypeError\0",
        3 => b"StackOverflow\0",
        4 => b"StackUnderflow\0",
        5 => b"OutOfBoundsLocalIndex\0",
        6 => b"CallstackOverflow\0",
        7 => b"NoCustomTypeData\0",
        8 => b"InvalidCustomTypeHandle\0",
        9 => b"NoNativeBoundFunction\0",
        _ => b"Unknown\0",
    };
    name.as_ptr() as *const c_char
}

// ============================================================================
// Opaque handles
// ============================================================================

/// Parser state owned across the boundary: the source text plus the last
/// error rendered for C consumption
pub struct PulsarParser {
    source: String,
    error_message: Option<CString>,
}

/// Create an empty parser handle
#[no_mangle]
pub extern "C" fn pulsar_parser_create() -> *mut PulsarParser {
    Box::into_raw(Box::new(PulsarParser {
        source: String::new(),
        error_message: None,
    }))
}

/// Destroy a parser handle
///
/// # Safety
/// `parser` must be null or a live handle from
/// [`pulsar_parser_create`]; it is dead afterwards.
#[no_mangle]
pub unsafe extern "C" fn pulsar_parser_delete(parser: *mut PulsarParser) {
    if !parser.is_null() {
        drop(unsafe { Box::from_raw(parser) });
    }
}

/// Replace the parser's source text
///
/// # Safety
/// `parser` must be a live handle and `source` a valid NUL-terminated
/// string.
#[no_mangle]
pub unsafe extern "C" fn pulsar_parser_set_source(
    parser: *mut PulsarParser,
    source: *const c_char,
) {
    let parser = unsafe { &mut *parser };
    let source = unsafe { CStr::from_ptr(source) };
    parser.source = String::from_utf8_lossy(source.to_bytes()).into_owned();
    parser.error_message = None;
}

/// Create an empty module handle
#[no_mangle]
pub extern "C" fn pulsar_module_create() -> *mut Module {
    Box::into_raw(Box::new(Module::new()))
}

/// Destroy a module handle
///
/// # Safety
/// `module` must be null or a live handle from
/// [`pulsar_module_create`]; it is dead afterwards.
#[no_mangle]
pub unsafe extern "C" fn pulsar_module_delete(module: *mut Module) {
    if !module.is_null() {
        drop(unsafe { Box::from_raw(module) });
    }
}

/// Parse the handle's source into `module`; returns a parse result code
///
/// # Safety
/// Both arguments must be live handles.
#[no_mangle]
pub unsafe extern "C" fn pulsar_parser_parse_into_module(
    parser: *mut PulsarParser,
    module: *mut Module,
) -> PulsarParseResult {
    let parser = unsafe { &mut *parser };
    let module = unsafe { &mut *module };

    let mut inner = Parser::new(&parser.source);
    let result = inner.parse_into_module(module);
    match result {
        Ok(()) => {
            parser.error_message = None;
            0
        }
        Err(error) => {
            let rendered = error.to_string();
            parser.error_message = CString::new(rendered).ok();
            parse_result_code(Some(&error))
        }
    }
}

/// Message of the last parse error, or null when the last parse
/// succeeded. The pointer stays valid until the next parse or delete.
///
/// # Safety
/// `parser` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn pulsar_parser_get_error_message(
    parser: *const PulsarParser,
) -> *const c_char {
    let parser = unsafe { &*parser };
    parser
        .error_message
        .as_ref()
        .map(|message| message.as_ptr())
        .unwrap_or(ptr::null())
}
