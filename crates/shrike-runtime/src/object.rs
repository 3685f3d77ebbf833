//! Heap object kinds
//!
//! Every heap object is addressed by an [`ObjectId`], an index into the
//! heap arena. Fields that would be pointers in a pointer-based runtime are
//! ids here, which the garbage collector traces directly.

use crate::bytecode::Chunk;
use crate::symbol::{FunctionId, NativeId};
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Arena index of a heap object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

/// A compiled function: never called directly, always wrapped in a closure
#[derive(Debug)]
pub struct FunctionObject {
    /// Display name (`<script>` for the top level)
    pub name: String,
    /// Declared parameter count
    pub arity: usize,
    /// Number of upvalues the closure recipe captures
    pub upvalue_count: usize,
    /// Owned bytecode
    pub chunk: Rc<Chunk>,
    /// Constructors implicitly return `this`
    pub is_initializer: bool,
    /// Dispatch id assigned by the resolver
    pub function_id: FunctionId,
}

/// A function plus its captured upvalues; the only callable at runtime
#[derive(Debug)]
pub struct ClosureObject {
    /// The wrapped function object
    pub function: ObjectId,
    /// Captured upvalue objects, in recipe order
    pub upvalues: Vec<ObjectId>,
}

/// A captured variable: open while its stack slot lives, closed after
#[derive(Debug)]
pub enum UpvalueObject {
    /// Points into the VM value stack
    Open(usize),
    /// Owns the captured value
    Closed(Value),
}

/// A class: method table keyed by dispatch id, positional field layout
#[derive(Debug)]
pub struct ClassObject {
    /// Class name
    pub name: String,
    /// Total field slots, inherited slots included
    pub field_count: usize,
    /// Methods by dispatch id (overrides replace inherited entries)
    pub methods: HashMap<FunctionId, ObjectId>,
    /// Direct super classes (single inheritance used, the list is the
    /// reserved multi-super shape)
    pub supers: Vec<ObjectId>,
    /// Constructors by arity, for class-as-callable construction
    pub initializers: Vec<(FunctionId, usize)>,
}

/// An instance: class pointer plus fixed-size field vector
#[derive(Debug)]
pub struct InstanceObject {
    /// The instance's class
    pub class: ObjectId,
    /// Field values, positionally indexed
    pub fields: Vec<Value>,
}

/// A receiver bound to a method closure, produced by a method-value read
#[derive(Debug)]
pub struct BoundMethodObject {
    /// The receiver pushed as slot 0 when called
    pub receiver: Value,
    /// The method closure
    pub method: ObjectId,
}

/// A host function exposed to scripts
#[derive(Debug)]
pub struct NativeObject {
    /// Registry id
    pub native: NativeId,
    /// Display name
    pub name: String,
}

/// The discriminated heap object
#[derive(Debug)]
pub enum Object {
    /// Interned string
    String(Box<str>),
    /// Compiled function
    Function(FunctionObject),
    /// Callable closure
    Closure(ClosureObject),
    /// Captured variable
    Upvalue(UpvalueObject),
    /// Class
    Class(ClassObject),
    /// Instance
    Instance(InstanceObject),
    /// Receiver-bound method
    BoundMethod(BoundMethodObject),
    /// Dense value sequence
    List(Vec<Value>),
    /// Equality-keyed pair sequence
    Map(Vec<(Value, Value)>),
    /// Host function
    Native(NativeObject),
}

impl Object {
    /// Rough payload size used by the collection threshold
    pub fn heap_size(&self) -> usize {
        let base = std::mem::size_of::<Object>();
        base + match self {
            Object::String(s) => s.len(),
            Object::Function(f) => f.chunk.byte_size(),
            Object::Closure(c) => c.upvalues.len() * std::mem::size_of::<ObjectId>(),
            Object::Class(c) => {
                c.methods.len() * (std::mem::size_of::<FunctionId>() + std::mem::size_of::<ObjectId>())
            }
            Object::Instance(i) => i.fields.len() * std::mem::size_of::<Value>(),
            Object::List(items) => items.len() * std::mem::size_of::<Value>(),
            Object::Map(entries) => entries.len() * 2 * std::mem::size_of::<Value>(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_size_grows_with_payload() {
        let small = Object::List(Vec::new());
        let big = Object::List(vec![Value::Nil; 16]);
        assert!(big.heap_size() > small.heap_size());
    }
}
