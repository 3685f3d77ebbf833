//! Scope tree
//!
//! The resolver builds a tree of nested lexical scopes, each carrying a
//! name table and a type table. The code generator re-walks the same tree
//! through a [`ScopeCursor`] that advances depth-first in visit order, so
//! codegen sees exactly the slot indices and upvalue lists the resolver
//! assigned.

use crate::symbol::{FunctionId, Symbol};
use crate::types::{ClassRef, LoxType};
use std::collections::{HashMap, HashSet};

/// Arena index of a scope node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// What introduced a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// A plain block (or loop) scope
    Plain,
    /// A callable body; owns slots and upvalues
    Function,
    /// The `this`/`base` scope wrapped around a class body
    ClassBase,
    /// The field-and-method scope of a class body
    ClassField,
}

/// Where a resolver-side upvalue descriptor points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvalueTarget {
    /// A local slot of the enclosing function
    Local {
        /// Frame slot index
        slot: usize,
    },
    /// An upvalue of the enclosing function
    Upvalue {
        /// Index into the enclosing function's upvalue list
        index: usize,
    },
}

/// A capture descriptor owned by a function scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    /// Capture source, relative to the enclosing function
    pub target: UpvalueTarget,
    /// Stable index within the owning function's upvalue list
    pub index: usize,
}

/// Extra state carried by function scopes
#[derive(Debug)]
pub struct FunctionScopeData {
    /// The function this scope belongs to
    pub function_id: FunctionId,
    /// Function scope of the lexically enclosing function, if any
    pub enclosing: Option<ScopeId>,
    /// Captures, deduplicated structurally, indices stable
    pub upvalues: Vec<UpvalueDesc>,
    /// Next free frame slot (slot 0 is the callee / `this`)
    pub next_slot: usize,
    /// Slots captured by some inner function (closed on scope exit)
    pub captured_slots: HashSet<usize>,
    /// True for method/constructor frames (their slot 0 is `this`)
    pub is_method: bool,
}

/// One node of the scope tree
#[derive(Debug)]
pub struct ScopeNode {
    /// What introduced this scope
    pub kind: ScopeKind,
    /// Parent scope
    pub parent: Option<ScopeId>,
    /// Children, in visit order (the cursor walks this)
    pub children: Vec<ScopeId>,
    /// Declared names
    names: HashMap<String, Symbol>,
    /// Named types visible from this scope
    types: HashMap<String, LoxType>,
    /// True only for the root
    pub is_global: bool,
    /// The function scope whose frame holds this scope's slotted locals
    pub containing_function: ScopeId,
    /// Function state when `kind == Function` (and for the root)
    pub function: Option<FunctionScopeData>,
    /// Class type for `ClassBase`/`ClassField` scopes
    pub class: Option<ClassRef>,
    /// Slotted locals declared directly in this scope, in declaration order
    pub locals: Vec<(String, usize)>,
    /// The containing function's slot watermark when this scope opened;
    /// restored on exit so sibling scopes reuse the freed slots
    pub entry_slot: usize,
}

impl ScopeNode {
    /// Look up a name declared directly in this scope
    pub fn name(&self, name: &str) -> Option<&Symbol> {
        self.names.get(name)
    }

    /// Mutable lookup of a directly declared name
    pub fn name_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.names.get_mut(name)
    }

    /// True when the name is declared directly in this scope
    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Insert a symbol into the name table
    pub fn insert_name(&mut self, symbol: Symbol) {
        if symbol.is_slotted() && symbol.kind != crate::symbol::SymbolKind::This {
            self.locals.push((symbol.name.clone(), symbol.slot));
        }
        self.names.insert(symbol.name.clone(), symbol);
    }

    /// Look up a type declared directly in this scope
    pub fn type_named(&self, name: &str) -> Option<&LoxType> {
        self.types.get(name)
    }

    /// Insert a named type
    pub fn insert_type(&mut self, name: impl Into<String>, ty: LoxType) {
        self.types.insert(name.into(), ty);
    }
}

/// The tree itself: an arena of nodes, root = global scope
#[derive(Debug)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
}

impl ScopeTree {
    /// Id of the global root scope
    pub const ROOT: ScopeId = ScopeId(0);

    /// Create a tree holding only the global scope.
    ///
    /// The root doubles as the top-level script's function scope; slot 0 is
    /// reserved for the script closure itself.
    pub fn new(script_function: FunctionId) -> Self {
        let root = ScopeNode {
            kind: ScopeKind::Function,
            parent: None,
            children: Vec::new(),
            names: HashMap::new(),
            types: HashMap::new(),
            is_global: true,
            containing_function: Self::ROOT,
            function: Some(FunctionScopeData {
                function_id: script_function,
                enclosing: None,
                upvalues: Vec::new(),
                next_slot: 1,
                captured_slots: HashSet::new(),
                is_method: false,
            }),
            class: None,
            locals: Vec::new(),
            entry_slot: 1,
        };
        Self { nodes: vec![root] }
    }

    /// Append a child scope and return its id
    pub fn push_child(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.nodes.len() as u32);
        let containing_function = if kind == ScopeKind::Function {
            id
        } else {
            self.node(parent).containing_function
        };
        let entry_slot = if kind == ScopeKind::Function {
            1
        } else {
            self.node(containing_function)
                .function
                .as_ref()
                .map(|f| f.next_slot)
                .unwrap_or(1)
        };
        let function = if kind == ScopeKind::Function {
            Some(FunctionScopeData {
                function_id: FunctionId::INVALID,
                enclosing: Some(self.node(parent).containing_function),
                upvalues: Vec::new(),
                next_slot: 1,
                captured_slots: HashSet::new(),
                is_method: false,
            })
        } else {
            None
        };
        self.nodes.push(ScopeNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            names: HashMap::new(),
            types: HashMap::new(),
            is_global: false,
            containing_function,
            function,
            class: None,
            locals: Vec::new(),
            entry_slot,
        });
        self.node_mut(parent).children.push(id);
        id
    }

    /// Restore the slot watermark a non-function scope saved on entry
    pub fn release_scope_slots(&mut self, scope: ScopeId) {
        let node = self.node(scope);
        if node.kind == ScopeKind::Function {
            return;
        }
        let function = node.containing_function;
        let entry_slot = node.entry_slot;
        if let Some(data) = self.node_mut(function).function.as_mut() {
            data.next_slot = entry_slot;
        }
    }

    /// Borrow a node
    pub fn node(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0 as usize]
    }

    /// Mutably borrow a node
    pub fn node_mut(&mut self, id: ScopeId) -> &mut ScopeNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Allocate the next frame slot of the function scope `function`
    pub fn allocate_slot(&mut self, function: ScopeId) -> usize {
        let data = self
            .node_mut(function)
            .function
            .as_mut()
            .expect("slot allocation outside a function scope");
        let slot = data.next_slot;
        data.next_slot += 1;
        slot
    }

    /// Insert (or find) an upvalue descriptor in a function scope.
    ///
    /// Descriptors are deduplicated structurally: a second capture of the
    /// same target returns the existing index.
    pub fn put_upvalue(&mut self, function: ScopeId, target: UpvalueTarget) -> usize {
        let data = self
            .node_mut(function)
            .function
            .as_mut()
            .expect("upvalue outside a function scope");
        if let Some(existing) = data.upvalues.iter().find(|u| u.target == target) {
            return existing.index;
        }
        let index = data.upvalues.len();
        data.upvalues.push(UpvalueDesc { target, index });
        index
    }

    /// Mark a slot of `function` as captured so scope exit closes it
    pub fn mark_captured(&mut self, function: ScopeId, slot: usize) {
        let data = self
            .node_mut(function)
            .function
            .as_mut()
            .expect("capture outside a function scope");
        data.captured_slots.insert(slot);
    }

    /// Walk from `scope` outward looking for a named type
    pub fn resolve_type(&self, scope: ScopeId, name: &str) -> Option<LoxType> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(ty) = self.node(id).type_named(name) {
                return Some(ty.clone());
            }
            current = self.node(id).parent;
        }
        None
    }

    /// Number of nodes (used by the REPL to restart the cursor)
    pub fn root_child_count(&self) -> usize {
        self.node(Self::ROOT).children.len()
    }
}

/// Depth-first cursor over the scope tree.
///
/// `enter` descends into the next unvisited child of the current scope;
/// `exit` pops back. Calling these in the same places the resolver called
/// its scope push/pop reproduces the resolver's traversal exactly.
#[derive(Debug)]
pub struct ScopeCursor {
    stack: Vec<(ScopeId, usize)>,
}

impl ScopeCursor {
    /// Cursor positioned at the root, starting at its first child
    pub fn new() -> Self {
        Self {
            stack: vec![(ScopeTree::ROOT, 0)],
        }
    }

    /// Cursor positioned at the root, starting at child `start` (REPL lines
    /// append children to the persistent global scope)
    pub fn new_at(start: usize) -> Self {
        Self {
            stack: vec![(ScopeTree::ROOT, start)],
        }
    }

    /// The scope the cursor currently sits in
    pub fn current(&self) -> ScopeId {
        self.stack.last().expect("cursor stack empty").0
    }

    /// Descend into the next unvisited child of the current scope
    pub fn enter(&mut self, tree: &ScopeTree) -> ScopeId {
        let (id, visited) = self.stack.last_mut().expect("cursor stack empty");
        let child = tree.node(*id).children[*visited];
        *visited += 1;
        self.stack.push((child, 0));
        child
    }

    /// Pop back to the parent scope
    pub fn exit(&mut self) {
        self.stack.pop();
        assert!(!self.stack.is_empty(), "cursor popped past the root");
    }
}

impl Default for ScopeCursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind;

    fn local(name: &str, slot: usize) -> Symbol {
        Symbol {
            name: name.into(),
            ty: LoxType::Any,
            kind: SymbolKind::Local,
            slot,
            constant: false,
            defined: true,
        }
    }

    #[test]
    fn test_slot_allocation_is_stable() {
        let mut tree = ScopeTree::new(FunctionId(0));
        let func = tree.push_child(ScopeTree::ROOT, ScopeKind::Function);
        let a = tree.allocate_slot(func);
        let b = tree.allocate_slot(func);
        assert_eq!(a, 1);
        assert_eq!(b, 2);

        // A nested block allocates from the same function frame.
        let block = tree.push_child(func, ScopeKind::Plain);
        assert_eq!(tree.node(block).containing_function, func);
        let c = tree.allocate_slot(tree.node(block).containing_function);
        assert_eq!(c, 3);
    }

    #[test]
    fn test_upvalue_dedup() {
        let mut tree = ScopeTree::new(FunctionId(0));
        let func = tree.push_child(ScopeTree::ROOT, ScopeKind::Function);
        let i0 = tree.put_upvalue(func, UpvalueTarget::Local { slot: 1 });
        let i1 = tree.put_upvalue(func, UpvalueTarget::Local { slot: 2 });
        let again = tree.put_upvalue(func, UpvalueTarget::Local { slot: 1 });
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);
        assert_eq!(again, 0);
    }

    #[test]
    fn test_cursor_replays_visit_order() {
        let mut tree = ScopeTree::new(FunctionId(0));
        let a = tree.push_child(ScopeTree::ROOT, ScopeKind::Plain);
        let a1 = tree.push_child(a, ScopeKind::Plain);
        let b = tree.push_child(ScopeTree::ROOT, ScopeKind::Function);

        let mut cursor = ScopeCursor::new();
        assert_eq!(cursor.enter(&tree), a);
        assert_eq!(cursor.enter(&tree), a1);
        cursor.exit();
        cursor.exit();
        assert_eq!(cursor.enter(&tree), b);
        cursor.exit();
        assert_eq!(cursor.current(), ScopeTree::ROOT);
    }

    #[test]
    fn test_locals_recorded_in_declaration_order() {
        let mut tree = ScopeTree::new(FunctionId(0));
        let func = tree.push_child(ScopeTree::ROOT, ScopeKind::Function);
        let s1 = tree.allocate_slot(func);
        tree.node_mut(func).insert_name(local("x", s1));
        let s2 = tree.allocate_slot(func);
        tree.node_mut(func).insert_name(local("y", s2));
        assert_eq!(
            tree.node(func).locals,
            vec![("x".to_string(), 1), ("y".to_string(), 2)]
        );
    }
}
