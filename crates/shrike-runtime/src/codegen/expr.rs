//! Expression emission

use super::CodeGen;
use crate::ast::{Expr, ExprKind};
use crate::bytecode::{OpCode, SecondaryFlags};
use crate::symbol::{Binding, CallBindingKind, SymbolKind, VariableBinding};
use crate::token::{Literal, TokenKind};
use crate::value::Value;

/// Sentinel for "no constructor" in the `Instance` opcode
const NO_CTOR: u32 = u32::MAX;

impl CodeGen<'_> {
    /// Emit an expression; its value is left on the stack
    pub(super) fn emit_expr(&mut self, expr: &Expr) {
        let line = expr.line as i64;
        match &expr.kind {
            ExprKind::Literal(lit) => self.emit_literal(lit, expr.line),
            ExprKind::Grouping(inner) => self.emit_expr(inner),
            ExprKind::Variable { .. } | ExprKind::This { .. } => {
                self.emit_name_read(expr.id, line)
            }
            ExprKind::Base { .. } => self.emit_base_value(expr.id, line),
            ExprKind::Assign { target, value } => self.emit_assign(target, value, line),
            ExprKind::Unary { op, operand } => {
                self.emit_expr(operand);
                let opcode = match op.kind {
                    TokenKind::Minus => OpCode::Negate,
                    _ => OpCode::Not,
                };
                self.emit_op(opcode, SecondaryFlags::empty(), line);
            }
            ExprKind::Prefix { op, target } => {
                self.emit_step(op.kind, target, SecondaryFlags::PREFIX, line)
            }
            ExprKind::Postfix { op, target } => {
                self.emit_step(op.kind, target, SecondaryFlags::POSTFIX, line)
            }
            ExprKind::Binary { left, op, right } => {
                self.emit_expr(left);
                self.emit_expr(right);

                // An overloaded operator becomes a method call on the left
                // operand with the right operand as the single argument.
                if let Some(binding) = self.analysis.bindings.operator(expr.id) {
                    let id = binding.function_id.0;
                    self.emit_op(OpCode::Invoke, SecondaryFlags::empty(), line);
                    self.emit_operand(id);
                    self.emit_operand(1);
                    return;
                }

                match op.kind {
                    TokenKind::Plus => self.emit_op(OpCode::Add, SecondaryFlags::empty(), line),
                    TokenKind::Minus => {
                        self.emit_op(OpCode::Subtract, SecondaryFlags::empty(), line)
                    }
                    TokenKind::Star => {
                        self.emit_op(OpCode::Multiply, SecondaryFlags::empty(), line)
                    }
                    TokenKind::Slash => {
                        self.emit_op(OpCode::Divide, SecondaryFlags::empty(), line)
                    }
                    TokenKind::StarStar => self.emit_op(OpCode::Pow, SecondaryFlags::empty(), line),
                    TokenKind::Percent => self.emit_op(OpCode::Mod, SecondaryFlags::empty(), line),
                    TokenKind::EqualEqual => {
                        self.emit_op(OpCode::Equal, SecondaryFlags::empty(), line)
                    }
                    TokenKind::BangEqual => {
                        self.emit_op(OpCode::Equal, SecondaryFlags::empty(), line);
                        self.emit_op(OpCode::Not, SecondaryFlags::empty(), line);
                    }
                    TokenKind::Less => self.emit_op(OpCode::Less, SecondaryFlags::empty(), line),
                    TokenKind::LessEqual => {
                        self.emit_op(OpCode::LessEqual, SecondaryFlags::empty(), line)
                    }
                    TokenKind::Greater => {
                        self.emit_op(OpCode::Greater, SecondaryFlags::empty(), line)
                    }
                    TokenKind::GreaterEqual => {
                        self.emit_op(OpCode::GreaterEqual, SecondaryFlags::empty(), line)
                    }
                    _ => {}
                }
            }
            ExprKind::Logical { left, op, right } => {
                self.emit_expr(left);
                if op.kind == TokenKind::And {
                    let to_end = self.emit_jump(OpCode::JumpIfFalse, line);
                    self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                    self.emit_expr(right);
                    self.patch_jump(to_end);
                } else {
                    let to_else = self.emit_jump(OpCode::JumpIfFalse, line);
                    let to_end = self.emit_jump(OpCode::Jump, line);
                    self.patch_jump(to_else);
                    self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                    self.emit_expr(right);
                    self.patch_jump(to_end);
                }
            }
            ExprKind::Ternary {
                cond,
                then_branch,
                else_branch,
            } => {
                self.emit_expr(cond);
                let to_else = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                self.emit_expr(then_branch);
                let to_end = self.emit_jump(OpCode::Jump, line);
                self.patch_jump(to_else);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                self.emit_expr(else_branch);
                self.patch_jump(to_end);
            }
            ExprKind::Comma { left, right } => {
                self.emit_expr(left);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                self.emit_expr(right);
            }
            ExprKind::Call { callee, args, .. } => self.emit_call(expr.id, callee, args, line),
            ExprKind::Get { object, .. } => {
                self.emit_expr(object);
                self.emit_property_read(expr.id, line);
            }
            ExprKind::Index { object, index, .. } => {
                self.emit_expr(object);
                self.emit_expr(index);
                self.emit_op(OpCode::ContainerGet, SecondaryFlags::empty(), line);
            }
            ExprKind::Slice { object, lo, hi, .. } => {
                self.emit_expr(object);
                self.emit_expr(lo);
                self.emit_expr(hi);
                self.emit_op(OpCode::ContainerGetRange, SecondaryFlags::empty(), line);
            }
            ExprKind::List { elements, .. } => {
                for element in elements {
                    self.emit_expr(element);
                }
                self.emit_op(OpCode::MakeList, SecondaryFlags::empty(), line);
                self.emit_operand(elements.len() as u32);
            }
            ExprKind::Map { entries, .. } => {
                for (k, v) in entries {
                    self.emit_expr(k);
                    self.emit_expr(v);
                }
                self.emit_op(OpCode::MapInit, SecondaryFlags::empty(), line);
                self.emit_operand(entries.len() as u32);
            }
        }
    }

    fn emit_literal(&mut self, lit: &Literal, line: u32) {
        let line = line as i64;
        match lit {
            Literal::Nil => self.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), line),
            Literal::Boolean(true) => {
                self.emit_op(OpCode::ConstantTrue, SecondaryFlags::empty(), line)
            }
            Literal::Boolean(false) => {
                self.emit_op(OpCode::ConstantFalse, SecondaryFlags::empty(), line)
            }
            Literal::Integer(v) => {
                let idx = self.make_constant(Value::Int(*v), line as u32);
                self.emit_op(OpCode::Constant, SecondaryFlags::empty(), line);
                self.emit_operand(idx);
            }
            Literal::Floating(v) => {
                let idx = self.make_constant(Value::Float(*v), line as u32);
                self.emit_op(OpCode::Constant, SecondaryFlags::empty(), line);
                self.emit_operand(idx);
            }
            Literal::String(s) => {
                let id = self.intern_rooted(s);
                let idx = self.make_constant(Value::Obj(id), line as u32);
                self.emit_op(OpCode::Constant, SecondaryFlags::empty(), line);
                self.emit_operand(idx);
            }
        }
    }

    /// Emit a variable / `this` / class-name / bare-method read from its
    /// binding
    fn emit_name_read(&mut self, node: crate::ast::NodeId, line: i64) {
        match self.analysis.bindings.get(node).cloned() {
            Some(Binding::Variable(binding)) => self.emit_variable_get(&binding, line),
            Some(Binding::ClassExpression(binding)) => {
                self.emit_symbol_get(&binding.symbol, binding.upvalue, line);
            }
            Some(Binding::Function(binding)) => {
                // A bare method name: bind it on the implicit receiver.
                self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
                self.emit_operand(0);
                self.emit_op(OpCode::GetProperty, SecondaryFlags::METHOD, line);
                self.emit_operand(binding.function_id.0);
            }
            _ => {
                // Unresolved names only survive on error paths, which the
                // driver gates before execution.
                self.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), line);
            }
        }
    }

    fn emit_variable_get(&mut self, binding: &VariableBinding, line: i64) {
        if let Some(index) = binding.upvalue {
            self.emit_op(OpCode::Get, SecondaryFlags::UPVALUE, line);
            self.emit_operand(index as u32);
            return;
        }
        match binding.symbol.kind {
            SymbolKind::Global => {
                let idx = self.name_constant(&binding.symbol.name, line.max(0) as u32);
                self.emit_op(OpCode::Get, SecondaryFlags::GLOBAL, line);
                self.emit_operand(idx);
            }
            SymbolKind::Field => {
                self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
                self.emit_operand(0);
                self.emit_op(OpCode::GetProperty, SecondaryFlags::FIELD, line);
                self.emit_operand(binding.symbol.slot as u32);
            }
            _ => {
                self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
                self.emit_operand(binding.symbol.slot as u32);
            }
        }
    }

    /// `base.member` in value position: a bound method through a specific
    /// ancestor class
    fn emit_base_value(&mut self, node: crate::ast::NodeId, line: i64) {
        let binding = match self.analysis.bindings.function(node).cloned() {
            Some(binding) => binding,
            None => {
                self.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), line);
                return;
            }
        };
        if let CallBindingKind::Super { class_symbol } = &binding.kind {
            self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
            self.emit_operand(0);
            self.emit_symbol_get(class_symbol, None, line);
            self.emit_op(OpCode::GetSuper, SecondaryFlags::METHOD, line);
            self.emit_operand(binding.function_id.0);
        }
    }

    fn emit_assign(&mut self, target: &Expr, value: &Expr, line: i64) {
        match &target.kind {
            ExprKind::Variable { .. } => {
                let binding = match self.analysis.bindings.variable(target.id).cloned() {
                    Some(binding) => binding,
                    None => {
                        self.emit_expr(value);
                        return;
                    }
                };
                if binding.symbol.kind == SymbolKind::Field {
                    // Bare field write: the receiver is the implicit `this`.
                    self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
                    self.emit_operand(0);
                    self.emit_expr(value);
                    self.emit_op(OpCode::SetProperty, SecondaryFlags::FIELD, line);
                    self.emit_operand(binding.symbol.slot as u32);
                    return;
                }
                self.emit_expr(value);
                if let Some(index) = binding.upvalue {
                    self.emit_op(OpCode::Set, SecondaryFlags::UPVALUE, line);
                    self.emit_operand(index as u32);
                } else if binding.symbol.kind == SymbolKind::Global {
                    let idx = self.name_constant(&binding.symbol.name, line.max(0) as u32);
                    self.emit_op(OpCode::Set, SecondaryFlags::GLOBAL, line);
                    self.emit_operand(idx);
                } else {
                    self.emit_op(OpCode::Set, SecondaryFlags::LOCAL, line);
                    self.emit_operand(binding.symbol.slot as u32);
                }
            }
            ExprKind::Get { object, .. } => {
                let binding = match self.analysis.bindings.variable(target.id).cloned() {
                    Some(binding) => binding,
                    None => {
                        self.emit_expr(value);
                        return;
                    }
                };
                self.emit_expr(object);
                self.emit_expr(value);
                self.emit_op(OpCode::SetProperty, SecondaryFlags::FIELD, line);
                self.emit_operand(binding.symbol.slot as u32);
            }
            ExprKind::Index { object, index, .. } => {
                self.emit_expr(object);
                self.emit_expr(index);
                self.emit_expr(value);
                self.emit_op(OpCode::ContainerSet, SecondaryFlags::empty(), line);
            }
            _ => self.emit_expr(value),
        }
    }

    fn emit_step(
        &mut self,
        op: TokenKind,
        target: &Expr,
        form: SecondaryFlags,
        line: i64,
    ) {
        let binding = match self.analysis.bindings.variable(target.id).cloned() {
            Some(binding) => binding,
            None => {
                self.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), line);
                return;
            }
        };
        let opcode = if op == TokenKind::PlusPlus {
            OpCode::Inc
        } else {
            OpCode::Dec
        };

        if let Some(index) = binding.upvalue {
            self.emit_op(opcode, form | SecondaryFlags::UPVALUE, line);
            self.emit_operand(index as u32);
        } else if binding.symbol.kind == SymbolKind::Global {
            let idx = self.name_constant(&binding.symbol.name, line.max(0) as u32);
            self.emit_op(opcode, form | SecondaryFlags::GLOBAL, line);
            self.emit_operand(idx);
        } else {
            self.emit_op(opcode, form | SecondaryFlags::LOCAL, line);
            self.emit_operand(binding.symbol.slot as u32);
        }
    }

    /// Member read in value position: field or bound method
    fn emit_property_read(&mut self, node: crate::ast::NodeId, line: i64) {
        match self.analysis.bindings.get(node).cloned() {
            Some(Binding::Variable(binding)) => {
                self.emit_op(OpCode::GetProperty, SecondaryFlags::FIELD, line);
                self.emit_operand(binding.symbol.slot as u32);
            }
            Some(Binding::Function(binding)) => {
                self.emit_op(OpCode::GetProperty, SecondaryFlags::METHOD, line);
                self.emit_operand(binding.function_id.0);
            }
            _ => {
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                self.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), line);
            }
        }
    }

    fn emit_call(&mut self, node: crate::ast::NodeId, callee: &Expr, args: &[Expr], line: i64) {
        let call_binding = self.analysis.bindings.function(node).cloned();

        if let Some(binding) = &call_binding {
            match &binding.kind {
                CallBindingKind::Method => {
                    match &callee.kind {
                        ExprKind::Get { object, .. } => self.emit_expr(object),
                        _ => {
                            // Bare method call: implicit receiver.
                            self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
                            self.emit_operand(0);
                        }
                    }
                    for arg in args {
                        self.emit_expr(arg);
                    }
                    self.emit_op(OpCode::Invoke, SecondaryFlags::empty(), line);
                    self.emit_operand(binding.function_id.0);
                    self.emit_operand(args.len() as u32);
                    return;
                }
                CallBindingKind::Super { class_symbol } => {
                    let class_symbol = class_symbol.clone();
                    self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
                    self.emit_operand(0);
                    for arg in args {
                        self.emit_expr(arg);
                    }
                    self.emit_symbol_get(&class_symbol, None, line);
                    self.emit_op(OpCode::SuperInvoke, SecondaryFlags::empty(), line);
                    self.emit_operand(binding.function_id.0);
                    self.emit_operand(args.len() as u32);
                    return;
                }
                // Native and free calls go through the generic value path.
                _ => {}
            }
        }

        // A constructor call: the callee is a class expression.
        if let Some(class_binding) = self.analysis.bindings.class_expression(callee.id).cloned() {
            self.emit_symbol_get(&class_binding.symbol, class_binding.upvalue, line);
            for arg in args {
                self.emit_expr(arg);
            }
            self.emit_op(OpCode::Instance, SecondaryFlags::empty(), line);
            self.emit_operand(
                class_binding
                    .constructor
                    .map(|id| id.0)
                    .unwrap_or(NO_CTOR),
            );
            self.emit_operand(args.len() as u32);
            return;
        }

        // Generic call: closure, bound method, native or dynamic class.
        self.emit_expr(callee);
        for arg in args {
            self.emit_expr(arg);
        }
        self.emit_op(OpCode::Call, SecondaryFlags::empty(), line);
        self.emit_operand(args.len() as u32);
    }
}
