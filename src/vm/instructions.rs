//! VM instructions
//!
//! Operands index the owning module's tables (constants, functions,
//! native bindings) or a function's locals; jump targets are absolute
//! offsets within the function's code vector. Opcode numbering follows
//! declaration order and is not a serialization format.

use std::fmt;

/// VM instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Push constant pool entry
    PushConst(usize),
    /// Push a copy of a local
    LoadLocal(usize),
    /// Pop into a local
    StoreLocal(usize),

    // Arithmetic: Integer x Integer stays Integer, any Double operand
    // promotes to Double, anything else is a type error
    Add,
    Sub,
    Mul,
    Neg,

    // Comparisons over numbers and strings; result is Integer 0 or 1
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,

    /// Concatenate two strings or two lists
    Concat,

    /// Unconditional jump
    Jump(usize),
    /// Pop a value and jump when it is falsey
    JumpIfFalse(usize),

    /// Call the function at the given module index
    Call(usize),
    /// Call the native bound at the given module index
    CallNative(usize),
    /// Unwind the current frame, handing `returns` values to the caller
    Return,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::PushConst(k) => write!(f, "push_const {}", k),
            Instruction::LoadLocal(i) => write!(f, "load_local {}", i),
            Instruction::StoreLocal(i) => write!(f, "store_local {}", i),
            Instruction::Add => write!(f, "add"),
            Instruction::Sub => write!(f, "sub"),
            Instruction::Mul => write!(f, "mul"),
            Instruction::Neg => write!(f, "neg"),
            Instruction::Eq => write!(f, "eq"),
            Instruction::Neq => write!(f, "neq"),
            Instruction::Lt => write!(f, "lt"),
            Instruction::Le => write!(f, "le"),
            Instruction::Gt => write!(f, "gt"),
            Instruction::Ge => write!(f, "ge"),
            Instruction::Concat => write!(f, "concat"),
            Instruction::Jump(t) => write!(f, "jump {}", t),
            Instruction::JumpIfFalse(t) => write!(f, "jump_if_false {}", t),
            Instruction::Call(i) => write!(f, "call {}", i),
            Instruction::CallNative(i) => write!(f, "call_native {}", i),
            Instruction::Return => write!(f, "return"),
        }
    }
}
