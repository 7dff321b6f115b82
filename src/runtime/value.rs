//! Runtime value type system for Pulsar
//!
//! This module implements [`Value`], the representation of everything a
//! Pulsar program can put on a stack or in a local. Scalars are stored
//! inline; strings, lists and custom data are shared heap payloads with
//! reference-counted lifetime. There is no cycle collector: lists are
//! singly-linked and immutable once shared, so reference counts always
//! reach zero.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Value kind tag, used for type queries and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Void,
    Integer,
    Double,
    FunctionReference,
    NativeFunctionReference,
    String,
    List,
    Custom,
}

impl ValueKind {
    /// Whether arithmetic applies to this kind
    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Integer | ValueKind::Double)
    }

    /// Whether this kind holds an index into a module table
    #[inline]
    pub fn is_reference(self) -> bool {
        matches!(
            self,
            ValueKind::FunctionReference | ValueKind::NativeFunctionReference
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Void => "Void",
            ValueKind::Integer => "Integer",
            ValueKind::Double => "Double",
            ValueKind::FunctionReference => "FunctionReference",
            ValueKind::NativeFunctionReference => "NativeFunctionReference",
            ValueKind::String => "String",
            ValueKind::List => "List",
            ValueKind::Custom => "Custom",
        };
        write!(f, "{}", name)
    }
}

/// Shared handle to opaque per-value data of a custom type.
///
/// The mutex gives natives exclusive access while the engine holds other
/// clones of the handle; the payload is dropped exactly once, when the
/// last holder goes away.
pub type CustomDataHandle = Arc<Mutex<dyn Any + Send>>;

/// Wrap a host value into a [`CustomDataHandle`]
pub fn custom_data<T: Any + Send>(value: T) -> CustomDataHandle {
    Arc::new(Mutex::new(value))
}

/// A value of a host-defined custom type
#[derive(Clone)]
pub struct CustomValue {
    /// Type id issued by [`crate::runtime::module::Module::bind_custom_type`]
    pub type_id: u64,
    /// Per-instance data, if the host attached any
    pub data: Option<CustomDataHandle>,
}

impl CustomValue {
    /// A custom value with no instance data
    pub fn new(type_id: u64) -> Self {
        Self {
            type_id,
            data: None,
        }
    }

    /// A custom value carrying instance data
    pub fn with_data(type_id: u64, data: CustomDataHandle) -> Self {
        Self {
            type_id,
            data: Some(data),
        }
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomValue")
            .field("type_id", &self.type_id)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

// Identity comparison: two custom values are equal when they are the same
// type and share the same instance data.
impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
            && match (&self.data, &other.data) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
    }
}

/// Shared string payload.
///
/// Stored as raw bytes: string literals admit `\xHH;` escapes that can
/// inject bytes outside valid UTF-8, and those must round-trip through
/// [`crate::frontend::lexer::to_string_literal`] unchanged. Mutation is
/// never exposed; concatenation builds a new payload.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct PulsarString(Arc<[u8]>);

impl PulsarString {
    /// Raw byte view
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// UTF-8 view, when the payload is valid UTF-8
    pub fn as_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Byte length
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a new payload holding `self` followed by `other`
    pub fn concat(&self, other: &PulsarString) -> PulsarString {
        let mut bytes = Vec::with_capacity(self.len() + other.len());
        bytes.extend_from_slice(&self.0);
        bytes.extend_from_slice(&other.0);
        PulsarString(bytes.into())
    }

    /// Number of holders of this payload (used by lifetime tests)
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl From<&str> for PulsarString {
    fn from(s: &str) -> Self {
        PulsarString(s.as_bytes().into())
    }
}

impl From<String> for PulsarString {
    fn from(s: String) -> Self {
        PulsarString(s.into_bytes().into())
    }
}

impl From<Vec<u8>> for PulsarString {
    fn from(bytes: Vec<u8>) -> Self {
        PulsarString(bytes.into())
    }
}

impl fmt::Display for PulsarString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

// The literal form keeps invalid UTF-8 readable in test failures.
impl fmt::Debug for PulsarString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::frontend::lexer::to_string_literal(&self.0))
    }
}

/// One node of a shared list
#[derive(Debug)]
struct ListNode {
    value: Value,
    next: Option<Arc<ListNode>>,
}

/// Shared singly-linked list of values.
///
/// Concatenation copies the left operand and shares the right one, so
/// tails are structurally shared between lists. No operation writes a
/// tail back into itself, which keeps the graph acyclic.
#[derive(Debug, Clone, Default)]
pub struct List {
    head: Option<Arc<ListNode>>,
}

impl List {
    /// The empty list
    pub fn nil() -> Self {
        Self { head: None }
    }

    /// A new list with `value` in front of `self`
    pub fn cons(&self, value: Value) -> List {
        List {
            head: Some(Arc::new(ListNode {
                value,
                next: self.head.clone(),
            })),
        }
    }

    /// Whether the list has no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of elements (walks the list)
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Front element, if any
    pub fn first(&self) -> Option<&Value> {
        self.head.as_deref().map(|node| &node.value)
    }

    /// The list without its front element, sharing the tail
    pub fn rest(&self) -> List {
        List {
            head: self.head.as_deref().and_then(|node| node.next.clone()),
        }
    }

    /// Iterate the elements front to back
    pub fn iter(&self) -> ListIter<'_> {
        ListIter {
            node: self.head.as_deref(),
        }
    }

    /// Concatenate: copies `self`'s nodes, shares `other`'s
    pub fn concat(&self, other: &List) -> List {
        let values: Vec<Value> = self.iter().cloned().collect();
        let mut head = other.head.clone();
        for value in values.into_iter().rev() {
            head = Some(Arc::new(ListNode { value, next: head }));
        }
        List { head }
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let values: Vec<Value> = iter.into_iter().collect();
        let mut head = None;
        for value in values.into_iter().rev() {
            head = Some(Arc::new(ListNode { value, next: head }));
        }
        List { head }
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        let mut a = self.iter();
        let mut b = other.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) if x == y => continue,
                _ => return false,
            }
        }
    }
}

// Unlink nodes iteratively while this list is their only holder, so that
// dropping a long list does not recurse once per element.
impl Drop for List {
    fn drop(&mut self) {
        let mut head = self.head.take();
        while let Some(node) = head {
            match Arc::try_unwrap(node) {
                Ok(mut node) => head = node.next.take(),
                Err(_) => break,
            }
        }
    }
}

/// Iterator over list elements
pub struct ListIter<'a> {
    node: Option<&'a ListNode>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.next.as_deref();
        Some(&node.value)
    }
}

/// Runtime value
///
/// Scalars (including the two module-table reference kinds) are 64-bit
/// and stored inline. String, list and custom payloads are shared.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value; also what uninitialized locals hold
    #[default]
    Void,

    /// 64-bit signed integer
    Integer(i64),

    /// IEEE-754 double
    Double(f64),

    /// Index into the owning module's function table
    FunctionReference(usize),

    /// Index into the owning module's native binding table
    NativeFunctionReference(usize),

    /// Shared string payload
    String(PulsarString),

    /// Shared singly-linked list
    List(List),

    /// Host-defined custom type instance
    Custom(CustomValue),
}

impl Value {
    /// The kind tag of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Void => ValueKind::Void,
            Value::Integer(_) => ValueKind::Integer,
            Value::Double(_) => ValueKind::Double,
            Value::FunctionReference(_) => ValueKind::FunctionReference,
            Value::NativeFunctionReference(_) => ValueKind::NativeFunctionReference,
            Value::String(_) => ValueKind::String,
            Value::List(_) => ValueKind::List,
            Value::Custom(_) => ValueKind::Custom,
        }
    }

    /// Branch semantics: Integer 0, the empty string, the empty list and
    /// Void are falsey; everything else (Double 0.0 included) is truthy.
    pub fn is_falsey(&self) -> bool {
        match self {
            Value::Void => true,
            Value::Integer(0) => true,
            Value::String(s) => s.is_empty(),
            Value::List(l) => l.is_empty(),
            _ => false,
        }
    }

    /// Integer payload, if this is an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Double payload, if this is a double
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload, if this is a string
    pub fn as_string(&self) -> Option<&PulsarString> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// List payload, if this is a list
    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::FunctionReference(idx) => write!(f, "<&{}>", idx),
            Value::NativeFunctionReference(idx) => write!(f, "<*&{}>", idx),
            Value::String(s) => write!(f, "{}", s),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, value) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            Value::Custom(c) => write!(f, "<custom #{}>", c.type_id),
        }
    }
}
