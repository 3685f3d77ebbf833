//! Statement resolution

use super::expressions::declared_id;
use super::{CallableCtx, ClassEnv, FunctionEnv, NameLookup, Resolver};
use crate::ast::{ClassDecl, FunctionDecl, FunctionKind, NodeId, Stmt, StmtKind, VarDecl};
use crate::scope::ScopeKind;
use crate::symbol::{
    Binding, ClassExpressionBinding, FunctionId, FunctionInfo, Symbol, SymbolKind,
};
use crate::token::{Token, TokenKind};
use crate::types::{
    intersect, unify, CallableType, ClassRef, ClassType, LoxType, OverloadEntry, OverloadTarget,
    OverloadTree,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

impl Resolver {
    /// Resolve one statement
    pub(crate) fn resolve_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.resolve_expr(expr);
            }
            StmtKind::Print(expr) => {
                self.resolve_expr(expr);
            }
            StmtKind::Var(decl) => self.resolve_var_decl(decl),
            StmtKind::Block(stmts) => {
                self.begin_scope(ScopeKind::Plain);
                for s in stmts {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let ct = self.resolve_expr(cond);
                if !self.check_condition(&ct) {
                    let line = cond.line;
                    self.diags.resolve_error(
                        line,
                        "if",
                        format!(
                            "Condition expression of if of type {} is not subtype of {}",
                            ct,
                            LoxType::Boolean
                        ),
                    );
                }
                self.resolve_stmt(then_branch);
                if let Some(e) = else_branch {
                    self.resolve_stmt(e);
                }
            }
            StmtKind::While { cond, body } => {
                let ct = self.resolve_expr(cond);
                if !self.check_condition(&ct) {
                    let line = cond.line;
                    self.diags.resolve_error(
                        line,
                        "while",
                        format!(
                            "Condition expression of while of type {} is not subtype of {}",
                            ct,
                            LoxType::Boolean
                        ),
                    );
                }
                self.resolve_stmt(body);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.begin_scope(ScopeKind::Plain);
                if let Some(init) = init {
                    self.resolve_stmt(init);
                }
                if let Some(cond) = cond {
                    let ct = self.resolve_expr(cond);
                    if !self.check_condition(&ct) {
                        let line = cond.line;
                        self.diags.resolve_error(
                            line,
                            "for",
                            format!(
                                "Condition expression of for of type {} is not subtype of {}",
                                ct,
                                LoxType::Boolean
                            ),
                        );
                    }
                }
                if let Some(step) = step {
                    self.resolve_expr(step);
                }
                self.resolve_stmt(body);
                self.end_scope();
            }
            StmtKind::Foreach {
                name,
                iterable,
                body,
            } => self.resolve_foreach(name, iterable, body),
            StmtKind::Function(decl) => self.resolve_function_stmt(decl),
            StmtKind::Return { keyword, value } => self.resolve_return(keyword, value.as_ref()),
            StmtKind::Class(decl) => self.resolve_class_stmt(stmt.id, decl),
        }
    }

    fn resolve_var_decl(&mut self, decl: &VarDecl) {
        let annotated = decl.ty.as_ref().map(|t| self.resolve_type_expr(t));
        self.declare_symbol(
            &decl.name,
            annotated.clone().unwrap_or(LoxType::Any),
            decl.constant,
        );

        let init_ty = decl.initializer.as_ref().map(|e| self.resolve_expr(e));

        let final_ty = match (annotated, &init_ty) {
            (Some(a), Some(i)) => {
                if !unify(&a, i) {
                    self.error(
                        &decl.name,
                        format!(
                            "Cannot assign type {} to \"{}\" of type {}.",
                            i, decl.name.lexeme, a
                        ),
                    );
                }
                a
            }
            (Some(a), None) => a,
            (None, Some(i)) => i.clone(),
            (None, None) => LoxType::Any,
        };

        self.set_symbol_type(&decl.name.lexeme, final_ty);
        self.define_symbol(&decl.name.lexeme);
    }

    fn resolve_foreach(&mut self, name: &Token, iterable: &crate::ast::Expr, body: &Stmt) {
        self.begin_scope(ScopeKind::Plain);
        let it = self.resolve_expr(iterable);
        let element = match &it {
            LoxType::List(e) => e.as_ref().clone(),
            LoxType::Map(kv) => kv.0.clone(),
            LoxType::String => LoxType::String,
            LoxType::Any => LoxType::Any,
            _ => {
                self.error(name, format!("( cannot do operator in for type {} )", it));
                LoxType::Any
            }
        };

        // Hidden loop state lives in unnameable slots before the loop
        // variable; codegen relies on this exact layout.
        let iter_token = Token::synthetic(TokenKind::Identifier, "(iter)");
        let index_token = Token::synthetic(TokenKind::Identifier, "(index)");
        self.declare_symbol(&iter_token, it, false);
        self.define_symbol("(iter)");
        self.declare_symbol(&index_token, LoxType::Integer, false);
        self.define_symbol("(index)");
        self.declare_symbol(name, element, false);
        self.define_symbol(&name.lexeme);

        self.resolve_stmt(body);
        self.end_scope();
    }

    // ---- functions ----

    fn resolve_function_stmt(&mut self, decl: &Rc<FunctionDecl>) {
        let fid = self.fresh_function_id();

        let params: Vec<LoxType> = decl
            .params
            .iter()
            .map(|p| {
                p.ty.as_ref()
                    .map(|t| self.resolve_type_expr(t))
                    .unwrap_or(LoxType::Any)
            })
            .collect();
        let declared_ret = decl.return_type.as_ref().map(|t| self.resolve_type_expr(t));
        let callable = CallableType::new(params.clone(), declared_ret.clone().unwrap_or(LoxType::Any));

        // Storage for the closure value: a mangled name, one per overload.
        let scope_id = self.current_scope();
        let mangled = format!("{}#{}", decl.name.lexeme, fid.0);
        let storage = if self.scopes.node(scope_id).is_global {
            Symbol {
                name: mangled,
                ty: LoxType::Callable(Rc::clone(&callable)),
                kind: SymbolKind::Global,
                slot: 0,
                constant: true,
                defined: true,
            }
        } else {
            let function = self.scopes.node(scope_id).containing_function;
            let slot = self.scopes.allocate_slot(function);
            Symbol {
                name: mangled,
                ty: LoxType::Callable(Rc::clone(&callable)),
                kind: SymbolKind::Local,
                slot,
                constant: true,
                defined: true,
            }
        };
        self.scopes
            .node_mut(scope_id)
            .insert_name(storage.clone());

        // The visible name is an overload set; a second declaration with the
        // same signature is a structured redefinition error.
        let entry = OverloadEntry {
            target: OverloadTarget::Declared {
                stmt: decl.id,
                function_id: fid,
                storage: Some((storage, scope_id)),
            },
            callable: Rc::clone(&callable),
        };

        let existing = self
            .scopes
            .node(scope_id)
            .name(&decl.name.lexeme)
            .map(|s| s.ty.clone());
        match existing {
            Some(LoxType::Overloaded(tree)) => {
                if let Err(e) = tree.borrow_mut().define(entry) {
                    self.error(&decl.name, e.to_string());
                }
            }
            Some(_) => {
                self.error(
                    &decl.name,
                    format!("{} already exists in this scoop.", decl.name.lexeme),
                );
            }
            None => {
                let mut tree = OverloadTree::new(&decl.name.lexeme);
                if let Err(e) = tree.define(entry) {
                    self.error(&decl.name, e.to_string());
                }
                let visible = Symbol {
                    name: decl.name.lexeme.clone(),
                    ty: LoxType::Overloaded(Rc::new(RefCell::new(tree))),
                    kind: SymbolKind::Global,
                    slot: 0,
                    constant: true,
                    defined: true,
                };
                self.scopes.node_mut(scope_id).insert_name(visible);
            }
        }

        self.function_infos.insert(
            decl.id,
            FunctionInfo {
                id: fid,
                dispatch_id: fid,
                captures: Vec::new(),
                arity: decl.params.len(),
                is_initializer: false,
                name: decl.name.lexeme.clone(),
            },
        );

        self.resolve_function_body(decl, callable, &params, FunctionEnv::Function, fid);
    }

    /// Resolve a callable body in its own function scope
    pub(crate) fn resolve_function_body(
        &mut self,
        decl: &FunctionDecl,
        callable: Rc<CallableType>,
        param_types: &[LoxType],
        kind: FunctionEnv,
        fid: FunctionId,
    ) {
        let fscope = self.begin_scope(ScopeKind::Function);
        {
            let data = self
                .scopes
                .node_mut(fscope)
                .function
                .as_mut()
                .expect("function scope without data");
            data.function_id = fid;
            data.is_method = !matches!(kind, FunctionEnv::Function);
        }

        for (param, ty) in decl.params.iter().zip(param_types.iter()) {
            if self.scopes.node(fscope).contains_name(&param.name.lexeme) {
                self.error(
                    &param.name,
                    format!("{} already exists in this scoop.", param.name.lexeme),
                );
            }
            let slot = self.scopes.allocate_slot(fscope);
            let symbol = Symbol {
                name: param.name.lexeme.clone(),
                ty: ty.clone(),
                kind: SymbolKind::Parameter,
                slot,
                constant: false,
                defined: true,
            };
            self.scopes.node_mut(fscope).insert_name(symbol);
        }

        self.callable_stack.push(CallableCtx {
            callable: Rc::clone(&callable),
            declared_return: decl.return_type.is_some()
                || matches!(kind, FunctionEnv::Initializer),
            inferred: None,
            kind,
        });

        for stmt in &decl.body {
            self.resolve_stmt(stmt);
        }

        let ctx = self.callable_stack.pop().expect("callable stack underflow");
        if !ctx.declared_return {
            // Deferred return inference: no return statement means void.
            let inferred = ctx.inferred.unwrap_or(LoxType::Void);
            *callable.return_type.borrow_mut() = inferred;
        }

        let captures = self.finish_function_scope(fscope);
        if let Some(info) = self.function_infos.get_mut(&decl.id) {
            info.captures = captures;
        }
        self.end_scope();
    }

    fn resolve_return(&mut self, keyword: &Token, value: Option<&crate::ast::Expr>) {
        if self.callable_stack.is_empty() {
            self.error(keyword, "Return statement in none-function scoop.");
            if let Some(v) = value {
                self.resolve_expr(v);
            }
            return;
        }

        let is_initializer = matches!(
            self.callable_stack.last().map(|c| c.kind),
            Some(FunctionEnv::Initializer)
        );

        match value {
            Some(v) if is_initializer => {
                self.error(keyword, "Constructor can't return a value.");
                self.resolve_expr(v);
            }
            Some(v) => {
                let vt = self.resolve_expr(v);
                let (declared_return, declared_ty) = {
                    let ctx = self.callable_stack.last().expect("checked above");
                    (ctx.declared_return, ctx.callable.return_type.borrow().clone())
                };
                if declared_return {
                    if !unify(&declared_ty, &vt) {
                        self.error(
                            keyword,
                            format!(
                                "({} of type {} is not assignable for type {})",
                                "return value", vt, declared_ty
                            ),
                        );
                    }
                } else {
                    let ctx = self.callable_stack.last_mut().expect("checked above");
                    ctx.inferred = Some(match &ctx.inferred {
                        None => vt,
                        Some(prev) => intersect(prev, &vt),
                    });
                }
            }
            None => {}
        }
    }

    // ---- classes ----

    fn resolve_class_stmt(&mut self, stmt_id: NodeId, decl: &Rc<ClassDecl>) {
        // Resolve the base first so the subclass's field layout and method
        // override checks can see it.
        let mut base: Option<ClassRef> = None;
        let mut base_symbol: Option<Symbol> = None;
        if let Some(base_name) = &decl.base {
            if base_name.lexeme == decl.name.lexeme {
                self.error(base_name, "A class cannot inherit from itself.");
            } else {
                match self.lookup_name(&base_name.lexeme) {
                    NameLookup::Symbol { symbol, .. } => match symbol.ty.clone() {
                        LoxType::Class(class) => {
                            base = Some(class);
                            base_symbol = Some(symbol);
                        }
                        other => {
                            self.error(
                                base_name,
                                format!(
                                    "{} of type {} is not a class type",
                                    base_name.lexeme, other
                                ),
                            );
                        }
                    },
                    _ => {
                        self.error(
                            base_name,
                            format!("Type {} is not defined.", base_name.lexeme),
                        );
                    }
                }
            }
        }

        let class_id = self.fresh_class_id();
        let depth = base.as_ref().map(|b| b.borrow().depth + 1).unwrap_or(1);
        let class: ClassRef = Rc::new(RefCell::new(ClassType {
            name: decl.name.lexeme.clone(),
            id: class_id,
            super_class: base.clone(),
            depth,
            fields: Vec::new(),
            methods: HashMap::new(),
        }));

        // Define the name and a type alias before the members so they can
        // refer to the class recursively.
        let class_symbol =
            self.declare_symbol(&decl.name, LoxType::Class(Rc::clone(&class)), false);
        self.define_symbol(&decl.name.lexeme);
        let scope_id = self.current_scope();
        self.scopes.node_mut(scope_id).insert_type(
            decl.name.lexeme.clone(),
            LoxType::Instance(Rc::clone(&class)),
        );

        self.bindings.put(
            stmt_id,
            Binding::ClassExpression(ClassExpressionBinding {
                class: Rc::clone(&class),
                symbol: class_symbol,
                constructor: None,
                base_symbol: base_symbol.clone(),
                upvalue: None,
            }),
        );

        // The class-base scope holds `this` (and `base` when inherited).
        let base_scope = self.begin_scope(ScopeKind::ClassBase);
        self.scopes.node_mut(base_scope).class = Some(Rc::clone(&class));
        self.scopes.node_mut(base_scope).insert_name(Symbol {
            name: "this".to_string(),
            ty: LoxType::Instance(Rc::clone(&class)),
            kind: SymbolKind::This,
            slot: 0,
            constant: true,
            defined: true,
        });
        if let Some(base_class) = &base {
            self.scopes.node_mut(base_scope).insert_name(Symbol {
                name: "base".to_string(),
                ty: LoxType::Class(Rc::clone(base_class)),
                kind: SymbolKind::Base,
                slot: 0,
                constant: true,
                defined: true,
            });
        }

        let field_scope = self.begin_scope(ScopeKind::ClassField);
        self.scopes.node_mut(field_scope).class = Some(Rc::clone(&class));

        let base_field_count = base
            .as_ref()
            .map(|b| b.borrow().total_field_count())
            .unwrap_or(0);
        for (i, field) in decl.fields.iter().enumerate() {
            let field_ty = field
                .ty
                .as_ref()
                .map(|t| self.resolve_type_expr(t))
                .unwrap_or(LoxType::Any);
            if self.scopes.node(field_scope).contains_name(&field.name.lexeme) {
                self.error(
                    &field.name,
                    format!("{} already exists in this scoop.", field.name.lexeme),
                );
                continue;
            }
            let symbol = Symbol {
                name: field.name.lexeme.clone(),
                ty: field_ty.clone(),
                kind: SymbolKind::Field,
                slot: base_field_count + i,
                constant: field.constant,
                defined: true,
            };
            self.scopes.node_mut(field_scope).insert_name(symbol);
            class
                .borrow_mut()
                .fields
                .push((field.name.lexeme.clone(), field_ty));
        }

        self.class_stack.push(ClassEnv {
            class: Rc::clone(&class),
            base: base.clone(),
            base_symbol,
        });

        // First pass declares every method signature so bodies can call
        // methods declared later (and each other).
        let mut pending: Vec<(Rc<FunctionDecl>, Rc<CallableType>, Vec<LoxType>, FunctionId, FunctionEnv)> =
            Vec::new();
        for method in &decl.methods {
            let fid = self.fresh_function_id();
            let params: Vec<LoxType> = method
                .params
                .iter()
                .map(|p| {
                    p.ty.as_ref()
                        .map(|t| self.resolve_type_expr(t))
                        .unwrap_or(LoxType::Any)
                })
                .collect();

            let env = if method.kind == FunctionKind::Constructor {
                FunctionEnv::Initializer
            } else {
                FunctionEnv::Method
            };

            let ret = match env {
                FunctionEnv::Initializer => {
                    if method.return_type.is_some() {
                        self.error(
                            &method.name,
                            "An initializer of class cannot have a explicit return type",
                        );
                    }
                    LoxType::Instance(Rc::clone(&class))
                }
                _ => method
                    .return_type
                    .as_ref()
                    .map(|t| self.resolve_type_expr(t))
                    .unwrap_or(LoxType::Any),
            };
            let callable = CallableType::new(params.clone(), ret);

            let method_name = if method.kind == FunctionKind::Constructor {
                "constructor".to_string()
            } else {
                method.name.lexeme.clone()
            };

            // An override with an identical ancestor signature reuses the
            // ancestor's dispatch id so subclass entries replace inherited
            // ones in the VM method tables.
            let dispatch = if env == FunctionEnv::Initializer {
                fid
            } else {
                base.as_ref()
                    .and_then(|b| b.borrow().find_method_exact(&method_name, &params))
                    .map(|e| declared_id(&e))
                    .unwrap_or(fid)
            };

            let entry = OverloadEntry {
                target: OverloadTarget::Declared {
                    stmt: method.id,
                    function_id: dispatch,
                    storage: None,
                },
                callable: Rc::clone(&callable),
            };
            let define_result = class
                .borrow_mut()
                .methods
                .entry(method_name.clone())
                .or_insert_with(|| OverloadTree::new(&method_name))
                .define(entry);
            if let Err(e) = define_result {
                self.error(&method.name, e.to_string());
            }

            self.function_infos.insert(
                method.id,
                FunctionInfo {
                    id: fid,
                    dispatch_id: dispatch,
                    captures: Vec::new(),
                    arity: method.params.len(),
                    is_initializer: env == FunctionEnv::Initializer,
                    name: method_name,
                },
            );

            pending.push((Rc::clone(method), callable, params, fid, env));
        }

        for (method, callable, params, fid, env) in pending {
            self.resolve_function_body(&method, callable, &params, env, fid);
        }

        self.class_stack.pop();
        self.end_scope(); // class-field scope
        self.end_scope(); // class-base scope
    }
}
