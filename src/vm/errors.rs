//! VM errors
//!
//! [`RuntimeError`] is what the engine and natives propagate internally;
//! [`RuntimeState`] is the flat status code hosts (and the C shim) read.
//! Every error maps onto exactly one non-Ok state.

use thiserror::Error;

use crate::runtime::value::Value;

/// VM result
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// VM errors
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// Generic failure raised by natives (`panic!`) or malformed modules
    #[error("{message}")]
    Error { message: String },

    #[error("type error: cannot apply `{operation}` to {operands}")]
    TypeError {
        operation: &'static str,
        operands: String,
    },

    #[error("operand stack overflow (limit {limit})")]
    StackOverflow { limit: usize },

    #[error("operand stack underflow")]
    StackUnderflow,

    #[error("local index {index} out of bounds (function has {locals_count} locals)")]
    OutOfBoundsLocalIndex { index: usize, locals_count: usize },

    #[error("call stack overflow (limit {limit})")]
    CallstackOverflow { limit: usize },

    #[error("custom type {type_id} has no global data")]
    NoCustomTypeData { type_id: u64 },

    #[error("invalid custom type handle {type_id}")]
    InvalidCustomTypeHandle { type_id: u64 },

    #[error("native declaration {index} has no bound function")]
    NoNativeBoundFunction { index: usize },
}

impl RuntimeError {
    /// Generic error with a message
    pub fn message(message: impl Into<String>) -> Self {
        RuntimeError::Error {
            message: message.into(),
        }
    }

    /// Type error for a unary operation
    pub fn type_error_unary(operation: &'static str, value: &Value) -> Self {
        RuntimeError::TypeError {
            operation,
            operands: value.kind().to_string(),
        }
    }

    /// Type error for a binary operation
    pub fn type_error(operation: &'static str, lhs: &Value, rhs: &Value) -> Self {
        RuntimeError::TypeError {
            operation,
            operands: format!("{} and {}", lhs.kind(), rhs.kind()),
        }
    }

    /// The flat status code this error maps onto
    pub fn state(&self) -> RuntimeState {
        match self {
            RuntimeError::Error { .. } => RuntimeState::Error,
            RuntimeError::TypeError { .. } => RuntimeState::TypeError,
            RuntimeError::StackOverflow { .. } => RuntimeState::StackOverflow,
            RuntimeError::StackUnderflow => RuntimeState::StackUnderflow,
            RuntimeError::OutOfBoundsLocalIndex { .. } => RuntimeState::OutOfBoundsLocalIndex,
            RuntimeError::CallstackOverflow { .. } => RuntimeState::CallstackOverflow,
            RuntimeError::NoCustomTypeData { .. } => RuntimeState::NoCustomTypeData,
            RuntimeError::InvalidCustomTypeHandle { .. } => RuntimeState::InvalidCustomTypeHandle,
            RuntimeError::NoNativeBoundFunction { .. } => RuntimeState::NoNativeBoundFunction,
        }
    }
}

/// Flat per-step status code of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Ok,
    Error,
    TypeError,
    StackOverflow,
    StackUnderflow,
    OutOfBoundsLocalIndex,
    CallstackOverflow,
    NoCustomTypeData,
    InvalidCustomTypeHandle,
    NoNativeBoundFunction,
}

impl RuntimeState {
    /// Stable name for hosts and the C shim
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeState::Ok => "OK",
            RuntimeState::Error => "Error",
            RuntimeState::TypeError => "TypeError",
            RuntimeState::StackOverflow => "StackOverflow",
            RuntimeState::StackUnderflow => "StackUnderflow",
            RuntimeState::OutOfBoundsLocalIndex => "OutOfBoundsLocalIndex",
            RuntimeState::CallstackOverflow => "CallstackOverflow",
            RuntimeState::NoCustomTypeData => "NoCustomTypeData",
            RuntimeState::InvalidCustomTypeHandle => "InvalidCustomTypeHandle",
            RuntimeState::NoNativeBoundFunction => "NoNativeBoundFunction",
        }
    }
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
