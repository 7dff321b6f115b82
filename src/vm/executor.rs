//! Virtual Machine executor
//!
//! An [`ExecutionContext`] interprets the bytecode of one [`Module`]. It
//! owns a call stack of [`Frame`]s plus a host-facing value stack used to
//! pass arguments into the entry function and to collect its results.
//! Execution is fully synchronous: one [`ExecutionContext::step`] runs one
//! instruction, and natives run to completion inside the step that calls
//! them. Any non-Ok state aborts the step and leaves the call stack
//! intact for inspection.

use std::cmp::Ordering;

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::runtime::module::{FunctionDefinition, FunctionSignature, Module};
use crate::runtime::value::{CustomDataHandle, Value};
use crate::vm::errors::{RuntimeError, RuntimeResult, RuntimeState};
use crate::vm::frames::{Frame, FrameKind};
use crate::vm::instructions::Instruction;

/// Engine limits
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Maximum call stack depth
    pub max_call_depth: usize,
    /// Maximum per-frame operand stack size
    pub max_operand_stack: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_operand_stack: 64 * 1024,
        }
    }
}

/// Interpreter state for one module.
///
/// The module is borrowed read-only; lazy custom-type data creation goes
/// through interior mutability inside the module, so a context never
/// needs `&mut Module`.
pub struct ExecutionContext<'m> {
    module: &'m Module,
    config: ExecutionConfig,
    call_stack: Vec<Frame>,
    /// Host stack: entry arguments come from here and final results land
    /// here
    stack: Vec<Value>,
    last_error: Option<RuntimeError>,
}

impl<'m> ExecutionContext<'m> {
    /// Create a context with default limits
    pub fn new(module: &'m Module) -> Self {
        Self::with_config(module, ExecutionConfig::default())
    }

    /// Create a context with explicit limits
    pub fn with_config(module: &'m Module, config: ExecutionConfig) -> Self {
        Self {
            module,
            config,
            call_stack: Vec::new(),
            stack: Vec::new(),
            last_error: None,
        }
    }

    /// The module this context executes
    #[inline]
    pub fn module(&self) -> &'m Module {
        self.module
    }

    /// The engine limits
    #[inline]
    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Host-facing value stack
    #[inline]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Host-facing value stack, mutable (seed entry arguments here)
    #[inline]
    pub fn stack_mut(&mut self) -> &mut Vec<Value> {
        &mut self.stack
    }

    /// The call stack, innermost frame last
    #[inline]
    pub fn call_stack(&self) -> &[Frame] {
        &self.call_stack
    }

    /// Whether there are frames left to execute
    #[inline]
    pub fn is_running(&self) -> bool {
        !self.call_stack.is_empty()
    }

    /// The innermost frame
    pub fn current_frame(&self) -> RuntimeResult<&Frame> {
        self.call_stack
            .last()
            .ok_or_else(|| RuntimeError::message("no active frame"))
    }

    /// The innermost frame, mutable
    pub fn current_frame_mut(&mut self) -> RuntimeResult<&mut Frame> {
        self.call_stack
            .last_mut()
            .ok_or_else(|| RuntimeError::message("no active frame"))
    }

    /// Pop the innermost frame, discarding it.
    ///
    /// Natives use this to unwind themselves before returning an error
    /// (`panic!` style); the engine detects the pop and skips its own
    /// frame epilogue.
    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.call_stack.pop()
    }

    /// Push onto the current frame's operand stack
    pub fn push_operand(&mut self, value: Value) -> RuntimeResult<()> {
        let limit = self.config.max_operand_stack;
        let frame = self.current_frame_mut()?;
        if frame.stack.len() >= limit {
            return Err(RuntimeError::StackOverflow { limit });
        }
        frame.stack.push(value);
        Ok(())
    }

    /// Pop from the current frame's operand stack
    pub fn pop_operand(&mut self) -> RuntimeResult<Value> {
        self.current_frame_mut()?.pop()
    }

    /// The last error this context stopped on
    pub fn last_error(&self) -> Option<&RuntimeError> {
        self.last_error.as_ref()
    }

    /// Flat status of the context
    pub fn state(&self) -> RuntimeState {
        self.last_error
            .as_ref()
            .map(RuntimeError::state)
            .unwrap_or(RuntimeState::Ok)
    }

    /// Clear all execution state so the context can be reused
    pub fn reset(&mut self) {
        self.call_stack.clear();
        self.stack.clear();
        self.last_error = None;
    }

    /// Module-global data of a custom type, created on first access
    pub fn custom_type_global_data(&self, type_id: u64) -> RuntimeResult<CustomDataHandle> {
        let custom_type = self
            .module
            .custom_type(type_id)
            .ok_or(RuntimeError::InvalidCustomTypeHandle { type_id })?;
        custom_type
            .global_data()
            .ok_or(RuntimeError::NoCustomTypeData { type_id })
    }

    /// Push an entry frame for the function at `index`.
    ///
    /// The top `arity` (plus `stack_arity`) host stack entries become the
    /// frame's locals and seeded operand stack.
    pub fn begin_call(&mut self, index: usize) -> RuntimeResult<()> {
        let result = self.do_call(index);
        self.record(result)
    }

    /// Run the function at `index` to completion
    pub fn call_function(&mut self, index: usize) -> RuntimeResult<()> {
        self.begin_call(index)?;
        self.run()
    }

    /// Run the newest function matching `sig` to completion
    pub fn call_by_signature(&mut self, sig: &FunctionSignature) -> RuntimeResult<()> {
        let index = self.module.find_function_by_signature(sig).ok_or_else(|| {
            RuntimeError::message(format!("no function matching signature {}", sig))
        })?;
        self.call_function(index)
    }

    /// Step until the call stack empties
    pub fn run(&mut self) -> RuntimeResult<()> {
        debug!(frames = self.call_stack.len(), "running to completion");
        while self.is_running() {
            self.step()?;
        }
        Ok(())
    }

    /// Execute exactly one instruction
    pub fn step(&mut self) -> RuntimeResult<()> {
        let result = self.step_inner();
        self.record(result)
    }

    /// Human readable call stack, innermost frame first
    pub fn stack_trace(&self) -> String {
        let mut out = String::new();
        for frame in self.call_stack.iter().rev() {
            let name = self
                .definition(frame.kind, frame.function_index)
                .map(|def| def.name.clone())
                .unwrap_or_else(|_| String::from("<invalid>"));
            out.push_str(&format!("  at ({}) ip={}\n", name, frame.ip));
        }
        out
    }

    fn record(&mut self, result: RuntimeResult<()>) -> RuntimeResult<()> {
        if let Err(err) = &result {
            self.last_error = Some(err.clone());
        }
        result
    }

    fn definition(&self, kind: FrameKind, index: usize) -> RuntimeResult<&'m FunctionDefinition> {
        let module = self.module;
        let table = match kind {
            FrameKind::Bytecode => &module.functions,
            FrameKind::Native => &module.native_bindings,
        };
        table
            .get(index)
            .ok_or_else(|| RuntimeError::message(format!("invalid function index {}", index)))
    }

    fn step_inner(&mut self) -> RuntimeResult<()> {
        let (kind, function_index, ip) = {
            let frame = self.current_frame()?;
            (frame.kind, frame.function_index, frame.ip)
        };

        // Native frames carry no code; a host stepping one by hand just
        // unwinds it.
        if kind == FrameKind::Native {
            return self.do_return();
        }

        let func = self.definition(FrameKind::Bytecode, function_index)?;
        let Some(&instruction) = func.code.get(ip) else {
            // Running off the end behaves like an explicit Return
            return self.do_return();
        };

        if let Some(frame) = self.call_stack.last_mut() {
            frame.ip += 1;
        }
        trace!(ip, %instruction, "step");

        match instruction {
            Instruction::PushConst(index) => {
                let value = self.module.constants.get(index).cloned().ok_or_else(|| {
                    RuntimeError::message(format!("invalid constant index {}", index))
                })?;
                self.push_operand(value)
            }
            Instruction::LoadLocal(index) => {
                let value = self.current_frame()?.local(index)?.clone();
                self.push_operand(value)
            }
            Instruction::StoreLocal(index) => {
                let value = self.pop_operand()?;
                self.current_frame_mut()?.set_local(index, value)
            }
            Instruction::Add => self.binary_numeric("+", i64::wrapping_add, |a, b| a + b),
            Instruction::Sub => self.binary_numeric("-", i64::wrapping_sub, |a, b| a - b),
            Instruction::Mul => self.binary_numeric("*", i64::wrapping_mul, |a, b| a * b),
            Instruction::Neg => {
                let value = self.pop_operand()?;
                let negated = match value {
                    Value::Integer(v) => Value::Integer(v.wrapping_neg()),
                    Value::Double(v) => Value::Double(-v),
                    other => return Err(RuntimeError::type_error_unary("!", &other)),
                };
                self.push_operand(negated)
            }
            Instruction::Eq => self.binary_compare("=", |ord| matches!(ord, Some(Ordering::Equal))),
            Instruction::Neq => {
                self.binary_compare("!=", |ord| !matches!(ord, Some(Ordering::Equal)))
            }
            Instruction::Lt => self.binary_compare("<", |ord| matches!(ord, Some(Ordering::Less))),
            Instruction::Le => self.binary_compare("<=", |ord| {
                matches!(ord, Some(Ordering::Less | Ordering::Equal))
            }),
            Instruction::Gt => {
                self.binary_compare(">", |ord| matches!(ord, Some(Ordering::Greater)))
            }
            Instruction::Ge => self.binary_compare(">=", |ord| {
                matches!(ord, Some(Ordering::Greater | Ordering::Equal))
            }),
            Instruction::Concat => {
                let rhs = self.pop_operand()?;
                let lhs = self.pop_operand()?;
                let result = match (&lhs, &rhs) {
                    (Value::String(a), Value::String(b)) => Value::String(a.concat(b)),
                    (Value::List(a), Value::List(b)) => Value::List(a.concat(b)),
                    _ => return Err(RuntimeError::type_error(".", &lhs, &rhs)),
                };
                self.push_operand(result)
            }
            Instruction::Jump(target) => {
                self.current_frame_mut()?.ip = target;
                Ok(())
            }
            Instruction::JumpIfFalse(target) => {
                let condition = self.pop_operand()?;
                if condition.is_falsey() {
                    self.current_frame_mut()?.ip = target;
                }
                Ok(())
            }
            Instruction::Call(index) => self.do_call(index),
            Instruction::CallNative(index) => self.do_call_native(index),
            Instruction::Return => self.do_return(),
        }
    }

    fn binary_numeric(
        &mut self,
        operation: &'static str,
        int_op: fn(i64, i64) -> i64,
        double_op: fn(f64, f64) -> f64,
    ) -> RuntimeResult<()> {
        let rhs = self.pop_operand()?;
        let lhs = self.pop_operand()?;
        let result = match (&lhs, &rhs) {
            (Value::Integer(a), Value::Integer(b)) => Value::Integer(int_op(*a, *b)),
            (Value::Integer(a), Value::Double(b)) => Value::Double(double_op(*a as f64, *b)),
            (Value::Double(a), Value::Integer(b)) => Value::Double(double_op(*a, *b as f64)),
            (Value::Double(a), Value::Double(b)) => Value::Double(double_op(*a, *b)),
            _ => return Err(RuntimeError::type_error(operation, &lhs, &rhs)),
        };
        self.push_operand(result)
    }

    fn binary_compare(
        &mut self,
        operation: &'static str,
        accept: fn(Option<Ordering>) -> bool,
    ) -> RuntimeResult<()> {
        let rhs = self.pop_operand()?;
        let lhs = self.pop_operand()?;
        let ordering = compare_values(operation, &lhs, &rhs)?;
        self.push_operand(Value::Integer(accept(ordering) as i64))
    }

    fn do_call(&mut self, index: usize) -> RuntimeResult<()> {
        let (arity, stack_arity, locals_count) = {
            let def = self.definition(FrameKind::Bytecode, index)?;
            trace!(function = %def.name, "call");
            (def.arity, def.stack_arity, def.locals_count)
        };
        self.push_call_frame(FrameKind::Bytecode, index, arity, stack_arity, locals_count)
    }

    fn do_call_native(&mut self, index: usize) -> RuntimeResult<()> {
        let (arity, stack_arity, locals_count) = {
            let def = self.definition(FrameKind::Native, index)?;
            trace!(native = %def.name, "call native");
            (def.arity, def.stack_arity, def.locals_count)
        };
        let handler = self
            .module
            .native_function(index)
            .cloned()
            .ok_or(RuntimeError::NoNativeBoundFunction { index })?;

        self.push_call_frame(FrameKind::Native, index, arity, stack_arity, locals_count)?;

        // Natives run to completion within this step. A handler may pop
        // its own frame to unwind early; only pop it here when it did not.
        let depth = self.call_stack.len();
        handler(self)?;
        if self.call_stack.len() == depth {
            self.do_return()
        } else {
            Ok(())
        }
    }

    fn push_call_frame(
        &mut self,
        kind: FrameKind,
        index: usize,
        arity: usize,
        stack_arity: usize,
        locals_count: usize,
    ) -> RuntimeResult<()> {
        if self.call_stack.len() >= self.config.max_call_depth {
            return Err(RuntimeError::CallstackOverflow {
                limit: self.config.max_call_depth,
            });
        }

        // The top `arity` caller entries are the arguments; beneath them,
        // `stack_arity` entries are moved onto the callee's operand stack
        // with their order preserved.
        let mut taken = self.take_from_caller(arity + stack_arity)?;
        let args = taken.split_off(stack_arity);

        let mut locals: SmallVec<[Value; 8]> = args.into();
        locals.resize(locals_count, Value::Void);

        let mut frame = Frame::new(kind, index, locals);
        frame.stack = taken.into();
        self.call_stack.push(frame);
        Ok(())
    }

    fn take_from_caller(&mut self, count: usize) -> RuntimeResult<Vec<Value>> {
        match self.call_stack.last_mut() {
            Some(frame) => {
                let len = frame.stack.len();
                if len < count {
                    return Err(RuntimeError::StackUnderflow);
                }
                Ok(frame.stack.drain(len - count..).collect())
            }
            None => {
                let len = self.stack.len();
                if len < count {
                    return Err(RuntimeError::StackUnderflow);
                }
                Ok(self.stack.drain(len - count..).collect())
            }
        }
    }

    fn do_return(&mut self) -> RuntimeResult<()> {
        // Validate everything before popping so that a failed return
        // leaves the call stack intact for inspection.
        let returns = {
            let frame = self.current_frame()?;
            let def = self.definition(frame.kind, frame.function_index)?;
            if frame.stack.len() < def.returns {
                return Err(RuntimeError::StackUnderflow);
            }
            def.returns
        };
        if self.call_stack.len() >= 2 {
            let caller = &self.call_stack[self.call_stack.len() - 2];
            if caller.stack.len() + returns > self.config.max_operand_stack {
                return Err(RuntimeError::StackOverflow {
                    limit: self.config.max_operand_stack,
                });
            }
        }

        let mut frame = self
            .call_stack
            .pop()
            .ok_or_else(|| RuntimeError::message("return with no active frame"))?;
        let start = frame.stack.len() - returns;
        // Values beyond `returns` are discarded with the frame
        let results: Vec<Value> = frame.stack.drain(start..).collect();
        match self.call_stack.last_mut() {
            Some(caller) => caller.stack.extend(results),
            None => self.stack.extend(results),
        }
        Ok(())
    }
}

/// Three-way comparison over numbers (with Integer/Double promotion) and
/// strings. `None` is the unordered case (NaN), which only `!=` accepts.
fn compare_values(
    operation: &'static str,
    lhs: &Value,
    rhs: &Value,
) -> RuntimeResult<Option<Ordering>> {
    match (lhs, rhs) {
        (Value::Integer(a), Value::Integer(b)) => Ok(Some(a.cmp(b))),
        (Value::Integer(a), Value::Double(b)) => Ok((*a as f64).partial_cmp(b)),
        (Value::Double(a), Value::Integer(b)) => Ok(a.partial_cmp(&(*b as f64))),
        (Value::Double(a), Value::Double(b)) => Ok(a.partial_cmp(b)),
        (Value::String(a), Value::String(b)) => Ok(Some(a.as_bytes().cmp(b.as_bytes()))),
        _ => Err(RuntimeError::type_error(operation, lhs, rhs)),
    }
}
