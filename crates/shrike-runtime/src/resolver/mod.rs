//! The resolver: a single depth-first AST walk
//!
//! Builds the scope tree, binds every name reference to a symbol (capturing
//! upvalues across function boundaries), typechecks expressions, resolves
//! overloads and records everything the code generator needs in the binding
//! table. Failures accumulate into the diagnostic sink and resolution
//! proceeds with `any`-typed placeholders; the driver skips codegen when the
//! error counter is non-zero.

mod checks;
mod expressions;
mod statements;

use crate::ast::{NodeId, Stmt, TypeExpr, TypeExprKind};
use crate::diagnostic::DiagnosticSink;
use crate::token::Token;
use crate::native::NativeManager;
use crate::scope::{ScopeCursor, ScopeId, ScopeKind, ScopeTree, UpvalueTarget};
use crate::symbol::{
    Binding, BindingTable, CapturePair, FunctionId, FunctionInfo, Symbol, SymbolKind,
    VariableBinding,
};
use crate::types::{
    CallableType, ClassRef, LoxType, OverloadEntry, OverloadTarget, OverloadTree, TypeId,
    TYPE_ID_CLASS_BASE,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Everything codegen consumes from one resolution pass
#[derive(Debug)]
pub struct Analysis {
    /// Expression node → binding
    pub bindings: BindingTable,
    /// Function declaration node → resolver facts
    pub functions: HashMap<NodeId, FunctionInfo>,
    /// Index of the first root-scope child belonging to this pass (REPL
    /// lines append children to the persistent global scope)
    pub cursor_start: usize,
    /// Dispatch id of this pass's top-level script function
    pub script_function: FunctionId,
}

impl Analysis {
    /// A cursor positioned to replay this pass's scope traversal
    pub fn cursor(&self) -> ScopeCursor {
        ScopeCursor::new_at(self.cursor_start)
    }
}

/// What kind of callable the resolver is currently inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionEnv {
    /// A free function
    Function,
    /// A method
    Method,
    /// A constructor
    Initializer,
}

/// Per-callable context for return-type checking and deferred inference
pub(crate) struct CallableCtx {
    pub(crate) callable: Rc<CallableType>,
    pub(crate) declared_return: bool,
    pub(crate) inferred: Option<LoxType>,
    pub(crate) kind: FunctionEnv,
}

/// Per-class context while resolving a class body
pub(crate) struct ClassEnv {
    pub(crate) class: ClassRef,
    pub(crate) base: Option<ClassRef>,
    pub(crate) base_symbol: Option<Symbol>,
}

/// Result of a scope walk for a name
pub(crate) enum NameLookup {
    /// Found a declared symbol
    Symbol {
        scope: ScopeId,
        depth: i64,
        symbol: Symbol,
    },
    /// Found a method of an enclosing class body
    Method { class: ClassRef },
    /// Nothing
    NotFound,
}

/// The resolver; persistent across REPL lines (global scope, class ids and
/// function ids survive), with per-pass binding output
pub struct Resolver {
    pub(crate) diags: DiagnosticSink,
    pub(crate) scopes: ScopeTree,
    pub(crate) scope_stack: Vec<ScopeId>,
    pub(crate) bindings: BindingTable,
    pub(crate) function_infos: HashMap<NodeId, FunctionInfo>,
    pub(crate) callable_stack: Vec<CallableCtx>,
    pub(crate) class_stack: Vec<ClassEnv>,
    next_function_id: u32,
    next_type_id: TypeId,
    script_function: FunctionId,
}

impl Resolver {
    /// Create a resolver with preset types and the native registry seeded
    /// into the global scope
    pub fn new(natives: &NativeManager) -> Self {
        let script_function = FunctionId(0);
        let mut resolver = Self {
            diags: DiagnosticSink::new(),
            scopes: ScopeTree::new(script_function),
            scope_stack: vec![ScopeTree::ROOT],
            bindings: BindingTable::new(),
            function_infos: HashMap::new(),
            callable_stack: Vec::new(),
            class_stack: Vec::new(),
            next_function_id: 1,
            next_type_id: TYPE_ID_CLASS_BASE,
            script_function,
        };
        resolver.seed_global_types();
        resolver.seed_natives(natives);
        resolver
    }

    fn seed_global_types(&mut self) {
        let root = self.scopes.node_mut(ScopeTree::ROOT);
        root.insert_type("any", LoxType::Any);
        root.insert_type("void", LoxType::Void);
        root.insert_type("object", LoxType::Object);
        root.insert_type("integer", LoxType::Integer);
        root.insert_type("floating", LoxType::Floating);
        root.insert_type("boolean", LoxType::Boolean);
        root.insert_type("nil", LoxType::Nil);
        root.insert_type("string", LoxType::String);
    }

    fn seed_natives(&mut self, natives: &NativeManager) {
        for name in natives.names() {
            let mut tree = OverloadTree::new(name);
            for native in natives.by_name(name) {
                let entry = OverloadEntry {
                    target: OverloadTarget::Native { native: native.id },
                    callable: CallableType::new(
                        native.params.clone(),
                        native.return_type.clone(),
                    ),
                };
                // Native signatures are fixed at registration.
                let _ = tree.define(entry);
            }
            let symbol = Symbol {
                name: name.to_string(),
                ty: LoxType::Overloaded(Rc::new(RefCell::new(tree))),
                kind: SymbolKind::Global,
                slot: 0,
                constant: true,
                defined: true,
            };
            self.scopes.node_mut(ScopeTree::ROOT).insert_name(symbol);
        }
    }

    /// Resolve one program (or REPL line), producing the analysis codegen
    /// consumes. Errors land in `diags`.
    pub fn resolve(&mut self, program: &[Stmt], diags: &mut DiagnosticSink) -> Analysis {
        std::mem::swap(&mut self.diags, diags);

        // Fresh top-level function per pass; the globals live by name, so
        // only the script frame itself is per-pass state.
        self.script_function = self.fresh_function_id();
        let root = self
            .scopes
            .node_mut(ScopeTree::ROOT)
            .function
            .as_mut()
            .expect("root is a function scope");
        root.function_id = self.script_function;
        root.next_slot = 1;
        root.upvalues.clear();
        root.captured_slots.clear();

        let cursor_start = self.scopes.root_child_count();
        self.bindings = BindingTable::new();
        self.function_infos = HashMap::new();

        for stmt in program {
            self.resolve_stmt(stmt);
        }

        std::mem::swap(&mut self.diags, diags);
        Analysis {
            bindings: std::mem::take(&mut self.bindings),
            functions: std::mem::take(&mut self.function_infos),
            cursor_start,
            script_function: self.script_function,
        }
    }

    /// The scope tree (codegen re-walks it through a cursor)
    pub fn scopes(&self) -> &ScopeTree {
        &self.scopes
    }

    // ---- ids ----

    pub(crate) fn fresh_function_id(&mut self) -> FunctionId {
        let id = FunctionId(self.next_function_id);
        self.next_function_id += 1;
        id
    }

    pub(crate) fn fresh_class_id(&mut self) -> TypeId {
        let id = self.next_type_id;
        self.next_type_id += 1;
        id
    }

    // ---- scope plumbing ----

    pub(crate) fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().expect("scope stack empty")
    }

    pub(crate) fn begin_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let id = self.scopes.push_child(self.current_scope(), kind);
        self.scope_stack.push(id);
        id
    }

    pub(crate) fn end_scope(&mut self) {
        let scope = self.current_scope();
        // Sibling scopes reuse the slots this one allocated; the defining
        // scope has ended, so reuse is allowed.
        self.scopes.release_scope_slots(scope);
        self.scope_stack.pop();
        assert!(!self.scope_stack.is_empty(), "popped the global scope");
    }

    pub(crate) fn current_function_scope(&self) -> ScopeId {
        self.scopes.node(self.current_scope()).containing_function
    }

    pub(crate) fn error(&mut self, token: &Token, message: impl Into<String>) {
        self.diags
            .resolve_error(token.line, token.lexeme.clone(), message);
    }

    // ---- declarations ----

    /// Declare a name in the current scope. Locals get a frame slot; the
    /// symbol starts undefined so its own initializer cannot read it.
    pub(crate) fn declare_symbol(
        &mut self,
        name: &Token,
        ty: LoxType,
        constant: bool,
    ) -> Symbol {
        let scope = self.current_scope();
        if !self.scopes.node(scope).is_global && self.scopes.node(scope).contains_name(&name.lexeme)
        {
            self.error(name, format!("{} already exists in this scoop.", name.lexeme));
        }

        let symbol = if self.scopes.node(scope).is_global {
            Symbol {
                name: name.lexeme.clone(),
                ty,
                kind: SymbolKind::Global,
                slot: 0,
                constant,
                defined: false,
            }
        } else {
            let function = self.scopes.node(scope).containing_function;
            let slot = self.scopes.allocate_slot(function);
            Symbol {
                name: name.lexeme.clone(),
                ty,
                kind: SymbolKind::Local,
                slot,
                constant,
                defined: false,
            }
        };
        self.scopes.node_mut(scope).insert_name(symbol.clone());
        symbol
    }

    /// Mark a declared name as defined (initializer finished)
    pub(crate) fn define_symbol(&mut self, name: &str) {
        let scope = self.current_scope();
        if let Some(symbol) = self.scopes.node_mut(scope).name_mut(name) {
            symbol.defined = true;
        }
    }

    /// Update the recorded type of a just-declared name (inference from the
    /// initializer)
    pub(crate) fn set_symbol_type(&mut self, name: &str, ty: LoxType) {
        let scope = self.current_scope();
        if let Some(symbol) = self.scopes.node_mut(scope).name_mut(name) {
            symbol.ty = ty;
        }
    }

    // ---- name lookup and capture ----

    /// Walk scopes innermost-outward for `name`
    pub(crate) fn lookup_name(&self, name: &str) -> NameLookup {
        for (depth, &scope) in self.scope_stack.iter().rev().enumerate() {
            let node = self.scopes.node(scope);
            if let Some(symbol) = node.name(name) {
                return NameLookup::Symbol {
                    scope,
                    depth: depth as i64,
                    symbol: symbol.clone(),
                };
            }
            if node.kind == ScopeKind::ClassField {
                if let Some(class) = &node.class {
                    if class.borrow().find_method(name).is_some() {
                        return NameLookup::Method {
                            class: Rc::clone(class),
                        };
                    }
                }
            }
        }
        NameLookup::NotFound
    }

    /// The innermost enclosing method frame's function scope, if any
    pub(crate) fn enclosing_method_scope(&self) -> Option<ScopeId> {
        for &scope in self.scope_stack.iter().rev() {
            let function = self.scopes.node(scope).containing_function;
            if let Some(data) = &self.scopes.node(function).function {
                if data.is_method {
                    return Some(function);
                }
            }
        }
        None
    }

    /// Bind a name reference, inserting upvalue descriptors in every
    /// intermediate function scope when the reference crosses function
    /// boundaries.
    pub(crate) fn bind_variable(
        &mut self,
        node: NodeId,
        scope: ScopeId,
        depth: i64,
        symbol: Symbol,
    ) -> VariableBinding {
        let mut upvalue = None;

        if symbol.is_slotted() {
            let defining_function = if symbol.kind == SymbolKind::This {
                // `this` lives in slot 0 of the nearest method frame, not in
                // the class-base scope that declared it.
                self.enclosing_method_scope()
                    .unwrap_or_else(|| self.scopes.node(scope).containing_function)
            } else {
                self.scopes.node(scope).containing_function
            };
            let current_function = self.current_function_scope();

            if defining_function != current_function {
                upvalue = Some(self.capture(current_function, defining_function, symbol.slot));
            }
        }

        let binding = VariableBinding {
            depth,
            symbol,
            upvalue,
        };
        self.bindings
            .put(node, Binding::Variable(binding.clone()));
        binding
    }

    /// Capture a slotted symbol referenced across a function boundary
    /// without a variable binding (class-name expressions).
    pub(crate) fn class_upvalue(&mut self, scope: ScopeId, symbol: &Symbol) -> Option<usize> {
        if symbol.kind != SymbolKind::Local {
            return None;
        }
        let defining = self.scopes.node(scope).containing_function;
        let current = self.current_function_scope();
        if defining == current {
            return None;
        }
        Some(self.capture(current, defining, symbol.slot))
    }

    /// Chain upvalue descriptors from `current` up to (but excluding) the
    /// `defining` function scope; returns the upvalue index in `current`.
    fn capture(&mut self, current: ScopeId, defining: ScopeId, slot: usize) -> usize {
        // Collect the function scopes between the reference and the
        // definition, innermost first.
        let mut chain = vec![current];
        let mut walk = current;
        loop {
            let enclosing = self
                .scopes
                .node(walk)
                .function
                .as_ref()
                .and_then(|f| f.enclosing);
            match enclosing {
                Some(e) if e == defining => break,
                Some(e) => {
                    chain.push(e);
                    walk = e;
                }
                None => break,
            }
        }

        self.scopes.mark_captured(defining, slot);

        // The outermost intermediate function captures the local directly;
        // each inner one chains to the next outer descriptor.
        let outermost = *chain.last().expect("capture chain cannot be empty");
        let mut index = self
            .scopes
            .put_upvalue(outermost, UpvalueTarget::Local { slot });
        for &function in chain.iter().rev().skip(1) {
            index = self
                .scopes
                .put_upvalue(function, UpvalueTarget::Upvalue { index });
        }
        index
    }

    // ---- type expressions ----

    /// Resolve a written type annotation against the visible type tables
    pub(crate) fn resolve_type_expr(&mut self, te: &TypeExpr) -> LoxType {
        match &te.kind {
            TypeExprKind::Named(name) => {
                match self.scopes.resolve_type(self.current_scope(), &name.lexeme) {
                    Some(ty) => ty,
                    None => {
                        self.error(name, format!("Type {} is not defined.", name.lexeme));
                        LoxType::Any
                    }
                }
            }
            TypeExprKind::List(element) => {
                let element = self.resolve_type_expr(element);
                LoxType::List(Rc::new(element))
            }
            TypeExprKind::Map(key, value) => {
                let key = self.resolve_type_expr(key);
                let value = self.resolve_type_expr(value);
                LoxType::Map(Rc::new((key, value)))
            }
            TypeExprKind::Union(variants) => {
                let resolved: Vec<LoxType> =
                    variants.iter().map(|v| self.resolve_type_expr(v)).collect();
                LoxType::Union(Rc::new(resolved))
            }
        }
    }

    /// Finish a function scope: convert its upvalue descriptors into the
    /// capture recipe codegen emits after `CLOSURE`.
    pub(crate) fn finish_function_scope(&self, function: ScopeId) -> Vec<CapturePair> {
        let data = self
            .scopes
            .node(function)
            .function
            .as_ref()
            .expect("not a function scope");
        data.upvalues
            .iter()
            .map(|u| match u.target {
                UpvalueTarget::Local { slot } => CapturePair {
                    is_local: true,
                    index: slot,
                },
                UpvalueTarget::Upvalue { index } => CapturePair {
                    is_local: false,
                    index,
                },
            })
            .collect()
    }
}
