//! Symbols and per-expression bindings
//!
//! The resolver annotates every name reference with a binding; the code
//! generator consumes bindings to pick opcode forms (local slot vs global
//! name vs upvalue vs field) and to wire calls to the overload the resolver
//! chose.

use crate::ast::NodeId;
use crate::types::{ClassRef, LoxType};
use std::collections::HashMap;

/// Dispatch id of a callable declaration.
///
/// Every function statement gets a unique id; a method overriding an
/// identical ancestor signature reuses the ancestor's id so that subclass
/// method-table entries replace the inherited ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// Sentinel for "no function" (e.g. the synthesized default constructor)
    pub const INVALID: FunctionId = FunctionId(u32::MAX);
}

/// Registry id of a native function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeId(pub u32);

/// Storage class of a named symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Stack slot in the enclosing function frame
    Local,
    /// Entry in the globals table
    Global,
    /// Positional field of the enclosing class
    Field,
    /// Function parameter (a local slot)
    Parameter,
    /// The `base` pseudo-symbol
    Base,
    /// The `this` pseudo-symbol (slot 0 of a method frame)
    This,
}

/// A named symbol, as stored in a scope's name table
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Declared name
    pub name: String,
    /// Resolved type
    pub ty: LoxType,
    /// Storage class
    pub kind: SymbolKind,
    /// Local slot, field index or upvalue-irrelevant zero, per `kind`
    pub slot: usize,
    /// Declared with `const`
    pub constant: bool,
    /// False between declaration and the end of the initializer
    pub defined: bool,
}

impl Symbol {
    /// True for symbols that live in a stack slot
    pub fn is_slotted(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Local | SymbolKind::Parameter | SymbolKind::This
        )
    }
}

/// How a resolved call dispatches
#[derive(Debug, Clone)]
pub enum CallBindingKind {
    /// A free function, called through the VM function table
    Free,
    /// A method on the receiver's class (`INVOKE`)
    Method,
    /// A `base.member(...)` call through a specific ancestor class
    Super {
        /// Storage of the ancestor class object
        class_symbol: Symbol,
    },
    /// A host native function
    Native(NativeId),
    /// A constructor call; the callee expression carries the class binding
    Constructor,
}

/// Binding of a call (or method-value read) to the chosen overload
#[derive(Debug, Clone)]
pub struct FunctionBinding {
    /// The chosen declaration's AST node, when one exists
    pub stmt: Option<NodeId>,
    /// Dispatch id ([`FunctionId::INVALID`] for the synthesized default
    /// constructor)
    pub function_id: FunctionId,
    /// Dispatch form
    pub kind: CallBindingKind,
}

/// Binding of a variable-like reference to its storage
#[derive(Debug, Clone)]
pub struct VariableBinding {
    /// Scope distance from the reference to the declaration
    pub depth: i64,
    /// The resolved symbol (cloned at resolution time)
    pub symbol: Symbol,
    /// Upvalue index within the referencing function, when captured
    pub upvalue: Option<usize>,
}

/// Binding of an overloaded binary operator to its implementing method
#[derive(Debug, Clone)]
pub struct OperatorBinding {
    /// Dispatch id of `operator<tok>` on the left operand's class
    pub function_id: FunctionId,
}

/// Binding of a class-name expression (or a class declaration statement)
#[derive(Debug, Clone)]
pub struct ClassExpressionBinding {
    /// The resolved class type
    pub class: ClassRef,
    /// Storage of the class object (global name or local slot)
    pub symbol: Symbol,
    /// Constructor chosen for a call through this expression, if any
    pub constructor: Option<FunctionId>,
    /// Storage of the direct base class, on class declaration bindings
    pub base_symbol: Option<Symbol>,
    /// Upvalue index when a locally-declared class is referenced across a
    /// function boundary
    pub upvalue: Option<usize>,
}

/// One entry of the binding table
#[derive(Debug, Clone)]
pub enum Binding {
    /// Name reference
    Variable(VariableBinding),
    /// Call / method-value dispatch
    Function(FunctionBinding),
    /// Overloaded-operator rewrite
    Operator(OperatorBinding),
    /// Class-name expression
    ClassExpression(ClassExpressionBinding),
}

/// Expression node → binding, filled by the resolver
#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: HashMap<NodeId, Binding>,
}

impl BindingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a binding for an expression node
    pub fn put(&mut self, node: NodeId, binding: Binding) {
        self.bindings.insert(node, binding);
    }

    /// Look up any binding
    pub fn get(&self, node: NodeId) -> Option<&Binding> {
        self.bindings.get(&node)
    }

    /// Look up a variable binding
    pub fn variable(&self, node: NodeId) -> Option<&VariableBinding> {
        match self.bindings.get(&node) {
            Some(Binding::Variable(b)) => Some(b),
            _ => None,
        }
    }

    /// Look up a function binding
    pub fn function(&self, node: NodeId) -> Option<&FunctionBinding> {
        match self.bindings.get(&node) {
            Some(Binding::Function(b)) => Some(b),
            _ => None,
        }
    }

    /// Look up an operator binding
    pub fn operator(&self, node: NodeId) -> Option<&OperatorBinding> {
        match self.bindings.get(&node) {
            Some(Binding::Operator(b)) => Some(b),
            _ => None,
        }
    }

    /// Look up a class-expression binding
    pub fn class_expression(&self, node: NodeId) -> Option<&ClassExpressionBinding> {
        match self.bindings.get(&node) {
            Some(Binding::ClassExpression(b)) => Some(b),
            _ => None,
        }
    }

    /// True when the node has any binding
    pub fn contains(&self, node: NodeId) -> bool {
        self.bindings.contains_key(&node)
    }

    /// Number of recorded bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// True when no bindings are recorded
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// One `(is_local, index)` capture pair, in the order the VM reads them
/// after a `CLOSURE` opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePair {
    /// True: capture the enclosing frame's local at `index`.
    /// False: copy the enclosing closure's upvalue at `index`.
    pub is_local: bool,
    /// Slot or upvalue index, per `is_local`
    pub index: usize,
}

/// Resolver-produced facts about one callable declaration
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    /// Unique id of the declaration
    pub id: FunctionId,
    /// Id used in method tables (ancestor's id when overriding)
    pub dispatch_id: FunctionId,
    /// Capture recipe emitted after `CLOSURE`
    pub captures: Vec<CapturePair>,
    /// Declared arity
    pub arity: usize,
    /// True for constructors (return `this`)
    pub is_initializer: bool,
    /// Display name
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, kind: SymbolKind, slot: usize) -> Symbol {
        Symbol {
            name: name.into(),
            ty: LoxType::Any,
            kind,
            slot,
            constant: false,
            defined: true,
        }
    }

    #[test]
    fn test_binding_table() {
        let mut table = BindingTable::new();
        table.put(
            NodeId(1),
            Binding::Variable(VariableBinding {
                depth: 0,
                symbol: symbol("x", SymbolKind::Local, 1),
                upvalue: None,
            }),
        );

        assert!(table.contains(NodeId(1)));
        assert!(table.variable(NodeId(1)).is_some());
        assert!(table.function(NodeId(1)).is_none());
        assert!(table.get(NodeId(2)).is_none());
    }

    #[test]
    fn test_slotted_kinds() {
        assert!(symbol("x", SymbolKind::Local, 1).is_slotted());
        assert!(symbol("p", SymbolKind::Parameter, 2).is_slotted());
        assert!(symbol("this", SymbolKind::This, 0).is_slotted());
        assert!(!symbol("g", SymbolKind::Global, 0).is_slotted());
        assert!(!symbol("f", SymbolKind::Field, 0).is_slotted());
    }
}
