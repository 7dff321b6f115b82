//! Module registry
//!
//! A [`Module`] is one compilation unit: the bytecode functions the parser
//! produced, the native declarations a host can bind handlers to, the
//! constant pool and the custom types the host registered. Modules outlive
//! every [`crate::vm::executor::ExecutionContext`] built on top of them.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;

use crate::runtime::debug::FunctionDebugInfo;
use crate::runtime::value::{CustomDataHandle, Value};
use crate::vm::errors::RuntimeResult;
use crate::vm::executor::ExecutionContext;
use crate::vm::instructions::Instruction;

/// Host-supplied handler for a native declaration.
///
/// Handlers read their arguments from the current frame's locals and push
/// results onto the current frame's stack. A non-Ok return terminates
/// execution with that state.
pub type NativeFunction = Arc<dyn Fn(&mut ExecutionContext<'_>) -> RuntimeResult<()> + Send + Sync>;

/// Wrap a closure into a [`NativeFunction`] handle.
///
/// Going through this helper pins down the closure's signature, so plain
/// `|ctx| ...` literals coerce without lifetime annotations.
pub fn native<F>(handler: F) -> NativeFunction
where
    F: Fn(&mut ExecutionContext<'_>) -> RuntimeResult<()> + Send + Sync + 'static,
{
    Arc::new(handler)
}

/// Factory producing a custom type's module-global data on first access
pub type CustomTypeDataFactory = Arc<dyn Fn() -> CustomDataHandle + Send + Sync>;

/// Signature used to match calls, definitions and native declarations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    /// Number of caller stack entries bound into locals at call time
    pub arity: usize,
    /// Number of values handed back to the caller
    pub returns: usize,
    /// Number of extra caller stack entries moved onto the callee's
    /// operand stack, beyond the named arguments
    pub stack_arity: usize,
}

impl FunctionSignature {
    /// A signature with no extra stack arity
    pub fn new(name: impl Into<String>, arity: usize, returns: usize) -> Self {
        Self {
            name: name.into(),
            arity,
            returns,
            stack_arity: 0,
        }
    }

    /// Set the stack arity
    pub fn with_stack_arity(mut self, stack_arity: usize) -> Self {
        self.stack_arity = stack_arity;
        self
    }

    /// Whether all four signature fields match `def`
    pub fn matches(&self, def: &FunctionDefinition) -> bool {
        self.name == def.name
            && self.arity == def.arity
            && self.returns == def.returns
            && self.stack_arity == def.stack_arity
    }

    /// Whether this signature matches a *native* declaration: the fields
    /// must match and the declaration must bind every argument to a local.
    pub fn matches_native(&self, def: &FunctionDefinition) -> bool {
        self.matches(def) && def.arity == def.locals_count
    }

    /// Turn the signature into an empty native declaration
    pub fn to_native_definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name.clone(),
            arity: self.arity,
            returns: self.returns,
            stack_arity: self.stack_arity,
            locals_count: self.arity,
            code: Vec::new(),
            debug: FunctionDebugInfo::default(),
        }
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} -> {})", self.name, self.arity, self.returns)
    }
}

/// One function in a module: bytecode, or a native declaration when the
/// code is empty
#[derive(Debug, Clone, Default)]
pub struct FunctionDefinition {
    pub name: String,
    pub arity: usize,
    pub returns: usize,
    pub stack_arity: usize,
    /// Total locals; the first `arity` are bound from the caller stack,
    /// the rest start out Void
    pub locals_count: usize,
    pub code: Vec<Instruction>,
    pub debug: FunctionDebugInfo,
}

impl FunctionDefinition {
    /// The signature of this definition
    pub fn signature(&self) -> FunctionSignature {
        FunctionSignature {
            name: self.name.clone(),
            arity: self.arity,
            returns: self.returns,
            stack_arity: self.stack_arity,
        }
    }

    /// Whether this definition is a native declaration
    pub fn is_native_declaration(&self) -> bool {
        self.code.is_empty() && self.arity == self.locals_count
    }
}

/// A host-registered custom type
#[derive(Clone)]
pub struct CustomType {
    pub name: String,
    factory: Option<CustomTypeDataFactory>,
    global_data: OnceCell<CustomDataHandle>,
}

impl CustomType {
    /// Module-global data for this type, created on first access.
    /// `None` when the type has no data factory.
    pub fn global_data(&self) -> Option<CustomDataHandle> {
        let factory = self.factory.as_ref()?;
        Some(self.global_data.get_or_init(|| factory()).clone())
    }
}

impl fmt::Debug for CustomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomType")
            .field("name", &self.name)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

/// Compilation unit: functions, native declarations, constants and custom
/// types
#[derive(Clone, Default)]
pub struct Module {
    pub functions: Vec<FunctionDefinition>,
    /// Native declarations; `native_functions` holds the parallel handler
    /// slots and the two always have the same length
    pub native_bindings: Vec<FunctionDefinition>,
    native_functions: Vec<Option<NativeFunction>>,
    pub constants: Vec<Value>,
    custom_types: IndexMap<u64, CustomType>,
    last_type_id: u64,
}

// Handler slots are opaque closures, so Debug reports counts instead of
// deriving through them.
impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("functions", &self.functions)
            .field("native_bindings", &self.native_bindings)
            .field(
                "bound_natives",
                &self.native_functions.iter().filter(|s| s.is_some()).count(),
            )
            .field("constants", &self.constants)
            .field("custom_types", &self.custom_types)
            .finish()
    }
}

impl Module {
    /// Create an empty module
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bytecode function, returning its index
    pub fn add_function(&mut self, def: FunctionDefinition) -> usize {
        self.functions.push(def);
        self.functions.len() - 1
    }

    /// Declare a native without binding a handler, returning its index.
    /// The handler slot starts empty and calls fail with
    /// `NoNativeBoundFunction` until a host binds one.
    pub fn declare_native(&mut self, def: FunctionDefinition) -> usize {
        self.native_bindings.push(def);
        self.native_functions.push(None);
        self.native_bindings.len() - 1
    }

    /// Declare a native and bind `handler` to it in one step
    pub fn declare_and_bind_native_function(
        &mut self,
        def: FunctionDefinition,
        handler: NativeFunction,
    ) -> usize {
        let index = self.declare_native(def);
        self.native_functions[index] = Some(handler);
        index
    }

    /// Bind `handler` to every pre-existing native declaration matching
    /// `sig`, returning how many were bound.
    pub fn bind_native_function_by_signature(
        &mut self,
        sig: &FunctionSignature,
        handler: NativeFunction,
    ) -> usize {
        if self.native_functions.len() != self.native_bindings.len() {
            return 0;
        }
        let mut bound = 0;
        for (index, binding) in self.native_bindings.iter().enumerate() {
            if !sig.matches_native(binding) {
                continue;
            }
            self.native_functions[index] = Some(handler.clone());
            bound += 1;
        }
        bound
    }

    /// Bind `handler` to declarations matching `def`'s signature.
    /// Definitions with extra locals are regular functions, not natives,
    /// and bind nothing.
    pub fn bind_native_function(
        &mut self,
        def: &FunctionDefinition,
        handler: NativeFunction,
    ) -> usize {
        if def.arity != def.locals_count {
            return 0;
        }
        self.bind_native_function_by_signature(&def.signature(), handler)
    }

    /// The handler bound to native slot `index`, if any
    pub fn native_function(&self, index: usize) -> Option<&NativeFunction> {
        self.native_functions.get(index)?.as_ref()
    }

    /// Register a custom type, returning its fresh id.
    ///
    /// Ids are issued monotonically and never reused within a module.
    pub fn bind_custom_type(
        &mut self,
        name: impl Into<String>,
        factory: Option<CustomTypeDataFactory>,
    ) -> u64 {
        loop {
            self.last_type_id = self.last_type_id.wrapping_add(1);
            if !self.custom_types.contains_key(&self.last_type_id) {
                break;
            }
        }
        self.custom_types.insert(
            self.last_type_id,
            CustomType {
                name: name.into(),
                factory,
                global_data: OnceCell::new(),
            },
        );
        self.last_type_id
    }

    /// Look up a custom type by id
    pub fn custom_type(&self, type_id: u64) -> Option<&CustomType> {
        self.custom_types.get(&type_id)
    }

    /// Find the newest function matching `sig`
    pub fn find_function_by_signature(&self, sig: &FunctionSignature) -> Option<usize> {
        self.functions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, def)| sig.matches(def))
            .map(|(index, _)| index)
    }

    /// Find the newest function with the given name (shadowing is
    /// last-wins)
    pub fn find_function_by_name(&self, name: &str) -> Option<usize> {
        self.functions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, def)| def.name == name)
            .map(|(index, _)| index)
    }

    /// Find the newest native declaration with the given name
    pub fn find_native_by_name(&self, name: &str) -> Option<usize> {
        self.native_bindings
            .iter()
            .enumerate()
            .rev()
            .find(|(_, def)| def.name == name)
            .map(|(index, _)| index)
    }

    /// Intern `value` into the constant pool, returning its index.
    /// Existing equal constants are reused.
    pub fn add_constant(&mut self, value: Value) -> usize {
        if let Some(index) = self.constants.iter().position(|c| c == &value) {
            return index;
        }
        self.constants.push(value);
        self.constants.len() - 1
    }
}
