//! Expression resolution

use super::{NameLookup, Resolver};
use crate::ast::{Expr, ExprKind, NodeId};
use crate::token::{Literal, Token};
use crate::symbol::{
    Binding, CallBindingKind, ClassExpressionBinding, FunctionBinding, OperatorBinding, Symbol,
    SymbolKind,
};
use crate::types::{intersect, unify, ClassRef, LoxType, OverloadEntry, OverloadTarget};
use std::rc::Rc;

impl Resolver {
    /// Resolve an expression, returning its type
    pub(crate) fn resolve_expr(&mut self, expr: &Expr) -> LoxType {
        match &expr.kind {
            ExprKind::Literal(lit) => match lit {
                Literal::Integer(_) => LoxType::Integer,
                Literal::Floating(_) => LoxType::Floating,
                Literal::String(_) => LoxType::String,
                Literal::Boolean(_) => LoxType::Boolean,
                Literal::Nil => LoxType::Nil,
            },
            ExprKind::Grouping(inner) => self.resolve_expr(inner),
            ExprKind::Variable { name } => self.resolve_variable(expr.id, name),
            ExprKind::This { keyword } => self.resolve_this(expr.id, keyword),
            ExprKind::Base { keyword, member } => self.resolve_base_value(expr.id, keyword, member),
            ExprKind::Assign { target, value } => self.resolve_assign(target, value),
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.resolve_expr(operand);
                let result = self.check_unary(op.kind, &operand_ty);
                if !result.compatible {
                    self.error(
                        op,
                        format!("( cannot do operator {} for type {} )", op.lexeme, operand_ty),
                    );
                }
                result.ty
            }
            ExprKind::Prefix { op, target } | ExprKind::Postfix { op, target } => {
                self.resolve_step(op, target)
            }
            ExprKind::Binary { left, op, right } => self.resolve_binary(expr.id, left, op, right),
            ExprKind::Logical { left, right, .. } => {
                let lt = self.resolve_expr(left);
                let rt = self.resolve_expr(right);
                self.check_logical(&lt, &rt).ty
            }
            ExprKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                let ct = self.resolve_expr(cond);
                if !self.check_condition(&ct) {
                    let line = cond.line;
                    self.diags.resolve_error(
                        line,
                        "?",
                        "The condition for ternary operator should be compatible with boolean.",
                    );
                }
                let tt = self.resolve_expr(then_branch);
                let et = self.resolve_expr(else_branch);
                intersect(&tt, &et)
            }
            ExprKind::Comma { left, right } => {
                self.resolve_expr(left);
                self.resolve_expr(right)
            }
            ExprKind::Call {
                callee,
                paren,
                args,
            } => self.resolve_call(expr.id, callee, paren, args),
            ExprKind::Get { object, name } => self.resolve_get(expr.id, object, name),
            ExprKind::Index {
                object,
                bracket,
                index,
            } => self.resolve_index(object, bracket, index),
            ExprKind::Slice {
                object,
                bracket,
                lo,
                hi,
            } => {
                let ot = self.resolve_expr(object);
                let lt = self.resolve_expr(lo);
                let ht = self.resolve_expr(hi);
                if !matches!(lt, LoxType::Integer | LoxType::Any)
                    || !matches!(ht, LoxType::Integer | LoxType::Any)
                {
                    self.error(bracket, "Slice bounds must be integers.");
                }
                match &ot {
                    LoxType::List(_) | LoxType::String | LoxType::Any => ot,
                    _ => {
                        self.error(bracket, format!("( cannot do operator [:] for type {} )", ot));
                        LoxType::Any
                    }
                }
            }
            ExprKind::List { elements, .. } => {
                let mut element = LoxType::Any;
                for (i, e) in elements.iter().enumerate() {
                    let t = self.resolve_expr(e);
                    element = if i == 0 { t } else { intersect(&element, &t) };
                }
                LoxType::List(Rc::new(element))
            }
            ExprKind::Map { entries, .. } => {
                let mut key = LoxType::Any;
                let mut value = LoxType::Any;
                for (i, (k, v)) in entries.iter().enumerate() {
                    let kt = self.resolve_expr(k);
                    let vt = self.resolve_expr(v);
                    if i == 0 {
                        key = kt;
                        value = vt;
                    } else {
                        key = intersect(&key, &kt);
                        value = intersect(&value, &vt);
                    }
                }
                LoxType::Map(Rc::new((key, value)))
            }
        }
    }

    // ---- names ----

    fn resolve_variable(&mut self, node: NodeId, name: &Token) -> LoxType {
        match self.lookup_name(&name.lexeme) {
            NameLookup::Symbol {
                scope,
                depth,
                symbol,
            } => {
                if !symbol.defined
                    && scope == self.current_scope()
                    && !self.scopes.node(scope).is_global
                {
                    self.error(name, "Can't read local variable in its own initializer.");
                }
                match &symbol.ty {
                    LoxType::Overloaded(tree) => {
                        let single = tree.borrow().single().cloned();
                        match single {
                            Some(entry) => {
                                let ty = LoxType::Callable(Rc::clone(&entry.callable));
                                self.bind_overload_storage(node, &name.lexeme, &entry);
                                ty
                            }
                            None => {
                                self.error(
                                    name,
                                    format!(
                                        "Name {} is overloaded; a call is needed to pick one.",
                                        name.lexeme
                                    ),
                                );
                                LoxType::Any
                            }
                        }
                    }
                    LoxType::Class(class) => {
                        let class = Rc::clone(class);
                        let ty = LoxType::Class(Rc::clone(&class));
                        let upvalue = self.class_upvalue(scope, &symbol);
                        self.bindings.put(
                            node,
                            Binding::ClassExpression(ClassExpressionBinding {
                                class,
                                symbol,
                                constructor: None,
                                base_symbol: None,
                                upvalue,
                            }),
                        );
                        ty
                    }
                    _ => {
                        let ty = symbol.ty.clone();
                        if symbol.kind == SymbolKind::Field
                            && self.enclosing_method_scope() != Some(self.current_function_scope())
                        {
                            self.error(
                                name,
                                format!(
                                    "Use 'this.{}' to reach a field from a nested function.",
                                    name.lexeme
                                ),
                            );
                            return LoxType::Any;
                        }
                        self.bind_variable(node, scope, depth, symbol);
                        ty
                    }
                }
            }
            NameLookup::Method { class } => {
                // A bare method name: a bound-method read on the implicit
                // receiver; only meaningful directly inside a method frame.
                if self.enclosing_method_scope() != Some(self.current_function_scope()) {
                    self.error(
                        name,
                        format!(
                            "Use 'this.{}' to reach a method from a nested function.",
                            name.lexeme
                        ),
                    );
                    return LoxType::Any;
                }
                let single = class.borrow().single_method(&name.lexeme);
                match single {
                    Some(entry) => {
                        let ty = LoxType::Callable(Rc::clone(&entry.callable));
                        self.bindings.put(
                            node,
                            Binding::Function(FunctionBinding {
                                stmt: declared_stmt(&entry),
                                function_id: declared_id(&entry),
                                kind: CallBindingKind::Method,
                            }),
                        );
                        ty
                    }
                    None => {
                        self.error(
                            name,
                            format!(
                                "Name {} is overloaded; a call is needed to pick one.",
                                name.lexeme
                            ),
                        );
                        LoxType::Any
                    }
                }
            }
            NameLookup::NotFound => {
                self.error(name, format!("Name \"{}\" is not exist.", name.lexeme));
                LoxType::Any
            }
        }
    }

    fn resolve_this(&mut self, node: NodeId, keyword: &Token) -> LoxType {
        let class = match self.class_stack.last() {
            Some(env) => Rc::clone(&env.class),
            None => {
                self.error(
                    keyword,
                    "Can't use this in standalone function or in global scoop.",
                );
                return LoxType::Any;
            }
        };
        if self.enclosing_method_scope().is_none() {
            self.error(
                keyword,
                "Can't use this in standalone function or in global scoop.",
            );
            return LoxType::Any;
        }
        let symbol = Symbol {
            name: "this".to_string(),
            ty: LoxType::Instance(Rc::clone(&class)),
            kind: SymbolKind::This,
            slot: 0,
            constant: true,
            defined: true,
        };
        let scope = self.current_scope();
        self.bind_variable(node, scope, 0, symbol);
        LoxType::Instance(class)
    }

    fn resolve_base_value(&mut self, node: NodeId, keyword: &Token, member: &Token) -> LoxType {
        let (base, base_symbol) = match self.base_env(keyword) {
            Some(pair) => pair,
            None => return LoxType::Any,
        };
        let single = base.borrow().single_method(&member.lexeme);
        match single {
            Some(entry) => {
                let ty = LoxType::Callable(Rc::clone(&entry.callable));
                self.bindings.put(
                    node,
                    Binding::Function(FunctionBinding {
                        stmt: declared_stmt(&entry),
                        function_id: declared_id(&entry),
                        kind: CallBindingKind::Super {
                            class_symbol: base_symbol,
                        },
                    }),
                );
                ty
            }
            None => {
                self.error(
                    member,
                    format!(
                        "Instance of type {} do not have a member named {}",
                        LoxType::Instance(base),
                        member.lexeme
                    ),
                );
                LoxType::Any
            }
        }
    }

    fn base_env(&mut self, keyword: &Token) -> Option<(ClassRef, Symbol)> {
        if self.enclosing_method_scope() != Some(self.current_function_scope()) {
            self.error(
                keyword,
                "Can't use super in standalone function or in global scoop.",
            );
            return None;
        }
        match self.class_stack.last() {
            None => {
                self.error(
                    keyword,
                    "Can't use super in standalone function or in global scoop.",
                );
                None
            }
            Some(env) => match (&env.base, &env.base_symbol) {
                (Some(base), Some(symbol)) => Some((Rc::clone(base), symbol.clone())),
                _ => {
                    self.error(
                        keyword,
                        "Can't use super in class who doesn't have a base class.",
                    );
                    None
                }
            },
        }
    }

    // ---- assignment ----

    fn resolve_assign(&mut self, target: &Expr, value: &Expr) -> LoxType {
        let vt = self.resolve_expr(value);

        match &target.kind {
            ExprKind::Variable { name } => {
                let lookup = self.lookup_name(&name.lexeme);
                match lookup {
                    NameLookup::Symbol {
                        scope,
                        depth,
                        symbol,
                    } => {
                        if symbol.constant {
                            self.error(
                                name,
                                format!("Cannot assign to constant {}.", name.lexeme),
                            );
                        }
                        if symbol.kind == SymbolKind::Field {
                            return self.assign_field_symbol(target.id, name, symbol, &vt);
                        }
                        let result = self.check_assignment(&symbol.ty, &vt);
                        if !result.compatible {
                            let hint = if result.narrowing {
                                " The conversion narrows; convert explicitly."
                            } else {
                                ""
                            };
                            self.error(
                                name,
                                format!(
                                    "Cannot assign type {} to \"{}\" of type {}.{}",
                                    vt, name.lexeme, symbol.ty, hint
                                ),
                            );
                        }
                        let ty = symbol.ty.clone();
                        self.bind_variable(target.id, scope, depth, symbol);
                        ty
                    }
                    _ => {
                        self.error(name, format!("{} is not a variable", name.lexeme));
                        LoxType::Any
                    }
                }
            }
            ExprKind::Get { object, name } => {
                let ot = self.resolve_expr(object);
                match ot.as_instance() {
                    Some(class) => {
                        let field = {
                            let borrowed = class.borrow();
                            borrowed
                                .field_index(&name.lexeme)
                                .map(|idx| (idx, borrowed.field_type(&name.lexeme)))
                        };
                        match field {
                            Some((index, field_ty)) => {
                                let field_ty = field_ty.unwrap_or(LoxType::Any);
                                let result = self.check_assignment(&field_ty, &vt);
                                if !result.compatible {
                                    self.error(
                                        name,
                                        format!(
                                            "Cannot assign type {} to \"{}\" of type {}.",
                                            vt, name.lexeme, field_ty
                                        ),
                                    );
                                }
                                let symbol = Symbol {
                                    name: name.lexeme.clone(),
                                    ty: field_ty.clone(),
                                    kind: SymbolKind::Field,
                                    slot: index,
                                    constant: false,
                                    defined: true,
                                };
                                self.bindings.put(
                                    target.id,
                                    Binding::Variable(crate::symbol::VariableBinding {
                                        depth: 0,
                                        symbol,
                                        upvalue: None,
                                    }),
                                );
                                field_ty
                            }
                            None => {
                                self.error(
                                    name,
                                    format!(
                                        "Instance of type {} do not have a member named {}",
                                        ot, name.lexeme
                                    ),
                                );
                                LoxType::Any
                            }
                        }
                    }
                    None => {
                        self.error(
                            name,
                            format!("Set property {} of non-class type {}", name.lexeme, ot),
                        );
                        LoxType::Any
                    }
                }
            }
            ExprKind::Index {
                object,
                bracket,
                index,
            } => {
                let ot = self.resolve_expr(object);
                let it = self.resolve_expr(index);
                match &ot {
                    LoxType::List(element) => {
                        if !matches!(it, LoxType::Integer | LoxType::Any) {
                            self.error(bracket, "Container index must be an integer.");
                        }
                        let element = element.as_ref().clone();
                        if !unify(&element, &vt) {
                            self.error(
                                bracket,
                                format!("Cannot assign type {} to element of {}.", vt, ot),
                            );
                        }
                        element
                    }
                    LoxType::Map(kv) => {
                        if !unify(&kv.0, &it) {
                            self.error(
                                bracket,
                                format!("Cannot use type {} as key of {}.", it, ot),
                            );
                        }
                        if !unify(&kv.1, &vt) {
                            self.error(
                                bracket,
                                format!("Cannot assign type {} to value of {}.", vt, ot),
                            );
                        }
                        kv.1.clone()
                    }
                    LoxType::Any => LoxType::Any,
                    _ => {
                        self.error(bracket, format!("( cannot do operator [] for type {} )", ot));
                        LoxType::Any
                    }
                }
            }
            _ => {
                // The parser already rejects other targets.
                LoxType::Any
            }
        }
    }

    /// Bare-field assignment inside a method body (`x = v` where `x` is a
    /// field of the enclosing class)
    fn assign_field_symbol(
        &mut self,
        node: NodeId,
        name: &Token,
        symbol: Symbol,
        vt: &LoxType,
    ) -> LoxType {
        if self.enclosing_method_scope() != Some(self.current_function_scope()) {
            self.error(
                name,
                format!(
                    "Use 'this.{}' to reach a field from a nested function.",
                    name.lexeme
                ),
            );
            return LoxType::Any;
        }
        let result = self.check_assignment(&symbol.ty, vt);
        if !result.compatible {
            self.error(
                name,
                format!(
                    "Cannot assign type {} to \"{}\" of type {}.",
                    vt, name.lexeme, symbol.ty
                ),
            );
        }
        let ty = symbol.ty.clone();
        self.bindings.put(
            node,
            Binding::Variable(crate::symbol::VariableBinding {
                depth: 0,
                symbol,
                upvalue: None,
            }),
        );
        ty
    }

    // ---- operators ----

    fn resolve_step(&mut self, op: &Token, target: &Expr) -> LoxType {
        match &target.kind {
            ExprKind::Variable { name } => {
                let ty = self.resolve_variable(target.id, name);
                let result = self.check_step(&ty);
                if !result.compatible {
                    self.error(
                        op,
                        format!("( cannot do operator {} for type {} )", op.lexeme, ty),
                    );
                    return LoxType::Any;
                }
                let (is_field, is_constant) = match self.bindings.variable(target.id) {
                    Some(binding) => (
                        binding.symbol.kind == SymbolKind::Field,
                        binding.symbol.constant,
                    ),
                    None => (false, false),
                };
                // Fields are not step targets; the opcode works on slots,
                // globals and upvalues only.
                if is_field {
                    self.error(op, format!("{} is not a variable", name.lexeme));
                    return LoxType::Any;
                }
                if is_constant {
                    self.error(op, format!("Cannot assign to constant {}.", name.lexeme));
                }
                result.ty
            }
            _ => {
                self.error(op, format!("{} is not a variable", op.lexeme));
                LoxType::Any
            }
        }
    }

    fn resolve_binary(&mut self, node: NodeId, left: &Expr, op: &Token, right: &Expr) -> LoxType {
        let lt = self.resolve_expr(left);
        let rt = self.resolve_expr(right);

        // Operator overloading: a class left operand with a matching
        // `operator<tok>` method rewrites the expression to a method call.
        if let Some(class) = lt.as_instance() {
            let method_name = format!("operator{}", op.lexeme);
            let entry = class
                .borrow()
                .resolve_method(&method_name, std::slice::from_ref(&rt));
            if let Some(entry) = entry {
                let ret = entry.callable.return_type.borrow().clone();
                self.bindings.put(
                    node,
                    Binding::Operator(OperatorBinding {
                        function_id: declared_id(&entry),
                    }),
                );
                return ret;
            }
        }

        let result = self.check_binary(op.kind, &lt, &rt);
        if !result.compatible {
            self.error(
                op,
                format!(
                    "( cannot do operator {} for type {} and {} )",
                    op.lexeme, lt, rt
                ),
            );
        }
        result.ty
    }

    // ---- calls ----

    fn resolve_call(
        &mut self,
        node: NodeId,
        callee: &Expr,
        paren: &Token,
        args: &[Expr],
    ) -> LoxType {
        let arg_types: Vec<LoxType> = args.iter().map(|a| self.resolve_expr(a)).collect();

        match &callee.kind {
            ExprKind::Variable { name } => {
                self.resolve_named_call(node, callee.id, name, paren, &arg_types)
            }
            ExprKind::Get { object, name } => {
                let ot = self.resolve_expr(object);
                match ot.as_instance() {
                    Some(class) => {
                        let entry = class.borrow().resolve_method(&name.lexeme, &arg_types);
                        if let Some(entry) = entry {
                            let ret = entry.callable.return_type.borrow().clone();
                            self.bindings.put(
                                node,
                                Binding::Function(FunctionBinding {
                                    stmt: declared_stmt(&entry),
                                    function_id: declared_id(&entry),
                                    kind: CallBindingKind::Method,
                                }),
                            );
                            return ret;
                        }
                        // A callable-typed field still works as a callee.
                        let field = {
                            let borrowed = class.borrow();
                            borrowed
                                .field_index(&name.lexeme)
                                .and_then(|idx| borrowed.field_type(&name.lexeme).map(|t| (idx, t)))
                        };
                        match field {
                            Some((index, field_ty)) => {
                                let symbol = Symbol {
                                    name: name.lexeme.clone(),
                                    ty: field_ty.clone(),
                                    kind: SymbolKind::Field,
                                    slot: index,
                                    constant: false,
                                    defined: true,
                                };
                                self.bindings.put(
                                    callee.id,
                                    Binding::Variable(crate::symbol::VariableBinding {
                                        depth: 0,
                                        symbol,
                                        upvalue: None,
                                    }),
                                );
                                self.check_callable(&field_ty, &arg_types, paren)
                            }
                            None => {
                                self.error(
                                    name,
                                    format!(
                                        "Instance of type {} do not have a member named {}",
                                        ot, name.lexeme
                                    ),
                                );
                                LoxType::Any
                            }
                        }
                    }
                    None => {
                        self.error(name, format!("{} is not a instance", ot));
                        LoxType::Any
                    }
                }
            }
            ExprKind::Base { keyword, member } => {
                let (base, base_symbol) = match self.base_env(keyword) {
                    Some(pair) => pair,
                    None => return LoxType::Any,
                };
                let entry = base.borrow().resolve_method(&member.lexeme, &arg_types);
                match entry {
                    Some(entry) => {
                        let ret = entry.callable.return_type.borrow().clone();
                        self.bindings.put(
                            node,
                            Binding::Function(FunctionBinding {
                                stmt: declared_stmt(&entry),
                                function_id: declared_id(&entry),
                                kind: CallBindingKind::Super {
                                    class_symbol: base_symbol,
                                },
                            }),
                        );
                        ret
                    }
                    None => {
                        self.error(
                            member,
                            format!(
                                "Instance of type {} do not have a member named {}",
                                LoxType::Instance(base),
                                member.lexeme
                            ),
                        );
                        LoxType::Any
                    }
                }
            }
            _ => {
                let ct = self.resolve_expr(callee);
                self.check_callable(&ct, &arg_types, paren)
            }
        }
    }

    fn resolve_named_call(
        &mut self,
        call_node: NodeId,
        callee_node: NodeId,
        name: &Token,
        paren: &Token,
        arg_types: &[LoxType],
    ) -> LoxType {
        match self.lookup_name(&name.lexeme) {
            NameLookup::Symbol {
                scope,
                depth,
                symbol,
            } => match symbol.ty.clone() {
                LoxType::Overloaded(tree) => {
                    let entry = tree.borrow().resolve(arg_types).cloned();
                    match entry {
                        Some(entry) => {
                            let ret = entry.callable.return_type.borrow().clone();
                            self.bind_overload_storage(callee_node, &name.lexeme, &entry);
                            let call_kind = match &entry.target {
                                OverloadTarget::Native { native } => {
                                    CallBindingKind::Native(*native)
                                }
                                OverloadTarget::Declared { .. } => CallBindingKind::Free,
                            };
                            self.bindings.put(
                                call_node,
                                Binding::Function(FunctionBinding {
                                    stmt: declared_stmt(&entry),
                                    function_id: declared_id(&entry),
                                    kind: call_kind,
                                }),
                            );
                            ret
                        }
                        None => {
                            self.error(
                                name,
                                format!(
                                    "No overload of {} matches the call argument types.",
                                    name.lexeme
                                ),
                            );
                            LoxType::Any
                        }
                    }
                }
                LoxType::Class(class) => {
                    let ctor = {
                        let borrowed = class.borrow();
                        borrowed
                            .methods
                            .get("constructor")
                            .and_then(|tree| tree.resolve(arg_types).cloned())
                    };
                    let has_ctors = class.borrow().methods.contains_key("constructor");
                    let upvalue = self.class_upvalue(scope, &symbol);
                    match (ctor, has_ctors) {
                        (Some(entry), _) => {
                            self.bindings.put(
                                callee_node,
                                Binding::ClassExpression(ClassExpressionBinding {
                                    class: Rc::clone(&class),
                                    symbol,
                                    constructor: Some(declared_id(&entry)),
                                    base_symbol: None,
                                    upvalue,
                                }),
                            );
                            LoxType::Instance(class)
                        }
                        (None, false) if arg_types.is_empty() => {
                            self.bindings.put(
                                callee_node,
                                Binding::ClassExpression(ClassExpressionBinding {
                                    class: Rc::clone(&class),
                                    symbol,
                                    constructor: None,
                                    base_symbol: None,
                                    upvalue,
                                }),
                            );
                            LoxType::Instance(class)
                        }
                        _ => {
                            self.error(
                                name,
                                format!(
                                    "No constructor of class {} matches the call argument types.",
                                    name.lexeme
                                ),
                            );
                            LoxType::Instance(class)
                        }
                    }
                }
                ty => {
                    if !symbol.defined
                        && scope == self.current_scope()
                        && !self.scopes.node(scope).is_global
                    {
                        self.error(name, "Can't read local variable in its own initializer.");
                    }
                    if symbol.kind == SymbolKind::Field {
                        return self.resolve_variable(callee_node, name);
                    }
                    self.bind_variable(callee_node, scope, depth, symbol);
                    self.check_callable(&ty, arg_types, paren)
                }
            },
            NameLookup::Method { class } => {
                if self.enclosing_method_scope() != Some(self.current_function_scope()) {
                    self.error(
                        name,
                        format!(
                            "Use 'this.{}' to reach a method from a nested function.",
                            name.lexeme
                        ),
                    );
                    return LoxType::Any;
                }
                let entry = class.borrow().resolve_method(&name.lexeme, arg_types);
                match entry {
                    Some(entry) => {
                        let ret = entry.callable.return_type.borrow().clone();
                        self.bindings.put(
                            call_node,
                            Binding::Function(FunctionBinding {
                                stmt: declared_stmt(&entry),
                                function_id: declared_id(&entry),
                                kind: CallBindingKind::Method,
                            }),
                        );
                        ret
                    }
                    None => {
                        self.error(
                            name,
                            format!(
                                "No overload of {} matches the call argument types.",
                                name.lexeme
                            ),
                        );
                        LoxType::Any
                    }
                }
            }
            NameLookup::NotFound => {
                self.error(name, format!("Name \"{}\" is not exist.", name.lexeme));
                LoxType::Any
            }
        }
    }

    /// Typecheck a call through a plain callable value
    fn check_callable(&mut self, callee: &LoxType, args: &[LoxType], paren: &Token) -> LoxType {
        match callee {
            LoxType::Callable(c) => {
                if c.params.len() != args.len() {
                    self.error(
                        paren,
                        format!(
                            "Expected {} arguments but got {}.",
                            c.params.len(),
                            args.len()
                        ),
                    );
                    return LoxType::Any;
                }
                for (param, arg) in c.params.iter().zip(args.iter()) {
                    if !unify(param, arg) {
                        self.error(
                            paren,
                            format!("({} of type {} is not assignable for type {})", "argument", arg, param),
                        );
                    }
                }
                c.return_type.borrow().clone()
            }
            LoxType::Class(c) => LoxType::Instance(Rc::clone(c)),
            LoxType::Any => LoxType::Any,
            _ => {
                self.error(paren, "Can only call functions and classes.");
                LoxType::Any
            }
        }
    }

    // ---- member access ----

    fn resolve_get(&mut self, node: NodeId, object: &Expr, name: &Token) -> LoxType {
        let ot = self.resolve_expr(object);
        match ot.as_instance() {
            Some(class) => {
                let field = {
                    let borrowed = class.borrow();
                    borrowed
                        .field_index(&name.lexeme)
                        .and_then(|idx| borrowed.field_type(&name.lexeme).map(|t| (idx, t)))
                };
                if let Some((index, field_ty)) = field {
                    let symbol = Symbol {
                        name: name.lexeme.clone(),
                        ty: field_ty.clone(),
                        kind: SymbolKind::Field,
                        slot: index,
                        constant: false,
                        defined: true,
                    };
                    self.bindings.put(
                        node,
                        Binding::Variable(crate::symbol::VariableBinding {
                            depth: 0,
                            symbol,
                            upvalue: None,
                        }),
                    );
                    return field_ty;
                }
                let single = class.borrow().single_method(&name.lexeme);
                match single {
                    Some(entry) => {
                        let ty = LoxType::Callable(Rc::clone(&entry.callable));
                        self.bindings.put(
                            node,
                            Binding::Function(FunctionBinding {
                                stmt: declared_stmt(&entry),
                                function_id: declared_id(&entry),
                                kind: CallBindingKind::Method,
                            }),
                        );
                        ty
                    }
                    None => {
                        self.error(
                            name,
                            format!(
                                "Instance of type {} do not have a member named {}",
                                ot, name.lexeme
                            ),
                        );
                        LoxType::Any
                    }
                }
            }
            None => {
                // Members bind statically; even an `any`-typed object has
                // no resolvable member.
                self.error(name, format!("{} is not a instance", ot));
                LoxType::Any
            }
        }
    }

    fn resolve_index(&mut self, object: &Expr, bracket: &Token, index: &Expr) -> LoxType {
        let ot = self.resolve_expr(object);
        let it = self.resolve_expr(index);
        match &ot {
            LoxType::List(element) => {
                if !matches!(it, LoxType::Integer | LoxType::Any) {
                    self.error(bracket, "Container index must be an integer.");
                }
                element.as_ref().clone()
            }
            LoxType::Map(kv) => {
                if !unify(&kv.0, &it) {
                    self.error(bracket, format!("Cannot use type {} as key of {}.", it, ot));
                }
                kv.1.clone()
            }
            LoxType::String => {
                if !matches!(it, LoxType::Integer | LoxType::Any) {
                    self.error(bracket, "Container index must be an integer.");
                }
                LoxType::String
            }
            LoxType::Any => LoxType::Any,
            _ => {
                self.error(bracket, format!("( cannot do operator [] for type {} )", ot));
                LoxType::Any
            }
        }
    }

    // ---- helpers ----

    /// Bind the storage of a chosen overload onto the callee expression
    pub(crate) fn bind_overload_storage(
        &mut self,
        node: NodeId,
        name: &str,
        entry: &OverloadEntry,
    ) {
        match &entry.target {
            OverloadTarget::Declared {
                storage: Some((symbol, scope)),
                ..
            } => {
                let (symbol, scope) = (symbol.clone(), *scope);
                self.bind_variable(node, scope, 0, symbol);
            }
            OverloadTarget::Declared { storage: None, .. } => {
                // Methods have no free-standing storage; method call paths
                // never reach here.
            }
            OverloadTarget::Native { .. } => {
                let symbol = Symbol {
                    name: name.to_string(),
                    ty: LoxType::Any,
                    kind: SymbolKind::Global,
                    slot: 0,
                    constant: true,
                    defined: true,
                };
                self.bindings.put(
                    node,
                    Binding::Variable(crate::symbol::VariableBinding {
                        depth: 0,
                        symbol,
                        upvalue: None,
                    }),
                );
            }
        }
    }
}

/// Dispatch id of a declared overload entry
pub(crate) fn declared_id(entry: &OverloadEntry) -> crate::symbol::FunctionId {
    match &entry.target {
        OverloadTarget::Declared { function_id, .. } => *function_id,
        OverloadTarget::Native { .. } => crate::symbol::FunctionId::INVALID,
    }
}

/// Declaration node of a declared overload entry
pub(crate) fn declared_stmt(entry: &OverloadEntry) -> Option<NodeId> {
    match &entry.target {
        OverloadTarget::Declared { stmt, .. } => Some(*stmt),
        OverloadTarget::Native { .. } => None,
    }
}
