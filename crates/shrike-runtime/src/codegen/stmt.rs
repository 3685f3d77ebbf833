//! Statement emission

use super::{CodeGen, FnCtx};
use crate::ast::{ClassDecl, FunctionDecl, NodeId, Stmt, StmtKind, VarDecl};
use crate::bytecode::{Chunk, OpCode, SecondaryFlags, INVALID_LINE};
use crate::symbol::{FunctionInfo, Symbol, SymbolKind};
use crate::value::Value;
use std::rc::Rc;

impl CodeGen<'_> {
    /// Emit one statement
    pub(super) fn emit_stmt(&mut self, stmt: &Stmt) {
        let line = stmt.line as i64;
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.emit_expr(expr);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
            }
            StmtKind::Print(expr) => {
                self.emit_expr(expr);
                self.emit_op(OpCode::Print, SecondaryFlags::empty(), line);
            }
            StmtKind::Var(decl) => self.emit_var(decl, line),
            StmtKind::Block(stmts) => {
                self.begin_scope();
                for s in stmts {
                    self.emit_stmt(s);
                }
                self.end_scope(line);
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.emit_expr(cond);
                let to_else = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                self.emit_stmt(then_branch);
                let to_end = self.emit_jump(OpCode::Jump, line);
                self.patch_jump(to_else);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                if let Some(else_branch) = else_branch {
                    self.emit_stmt(else_branch);
                }
                self.patch_jump(to_end);
            }
            StmtKind::While { cond, body } => {
                let loop_start = self.chunk().len();
                self.emit_expr(cond);
                let exit = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                self.emit_stmt(body);
                self.emit_loop(loop_start, line);
                self.patch_jump(exit);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                self.begin_scope();
                if let Some(init) = init {
                    self.emit_stmt(init);
                }
                let loop_start = self.chunk().len();
                match cond {
                    Some(cond) => self.emit_expr(cond),
                    None => self.emit_op(OpCode::ConstantTrue, SecondaryFlags::empty(), line),
                }
                let exit = self.emit_jump(OpCode::JumpIfFalse, line);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                self.emit_stmt(body);
                if let Some(step) = step {
                    self.emit_expr(step);
                    self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                }
                self.emit_loop(loop_start, line);
                self.patch_jump(exit);
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                self.end_scope(line);
            }
            StmtKind::Foreach {
                name,
                iterable,
                body,
            } => self.emit_foreach(name, iterable, body, line),
            StmtKind::Function(decl) => self.emit_function_decl(decl, line),
            StmtKind::Return { value, .. } => {
                let is_initializer = self
                    .functions
                    .last()
                    .map(|f| f.is_initializer)
                    .unwrap_or(false);
                match value {
                    Some(v) if !is_initializer => self.emit_expr(v),
                    _ => {
                        if is_initializer {
                            self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
                            self.emit_operand(0);
                        } else {
                            self.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), line);
                        }
                    }
                }
                self.emit_op(OpCode::Return, SecondaryFlags::empty(), line);
            }
            StmtKind::Class(decl) => self.emit_class(stmt.id, decl, line),
        }
    }

    fn emit_var(&mut self, decl: &VarDecl, line: i64) {
        match &decl.initializer {
            Some(init) => self.emit_expr(init),
            None => self.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), line),
        }

        let symbol = self.local_symbol(&decl.name.lexeme);
        match symbol {
            Some(symbol) if symbol.kind == SymbolKind::Global => {
                let idx = self.name_constant(&decl.name.lexeme, decl.name.line);
                self.emit_op(OpCode::Define, SecondaryFlags::GLOBAL, line);
                self.emit_operand(idx);
            }
            Some(symbol) => {
                self.emit_op(OpCode::Define, SecondaryFlags::LOCAL, line);
                self.emit_operand(symbol.slot as u32);
            }
            None => {
                // Declaration failed in the resolver; discard the value.
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
            }
        }
    }

    fn emit_foreach(
        &mut self,
        name: &crate::token::Token,
        iterable: &crate::ast::Expr,
        body: &Stmt,
        line: i64,
    ) {
        self.begin_scope();

        let iter_slot = self.slot_of("(iter)");
        let index_slot = self.slot_of("(index)");
        let var_slot = self.slot_of(&name.lexeme);

        // Hidden loop state: the container, the running index, then the
        // loop variable, in exactly the slots the resolver laid out.
        self.emit_expr(iterable);
        self.emit_op(OpCode::Define, SecondaryFlags::LOCAL, line);
        self.emit_operand(iter_slot);

        let zero = self.make_constant(Value::Int(0), name.line);
        self.emit_op(OpCode::Constant, SecondaryFlags::empty(), line);
        self.emit_operand(zero);
        self.emit_op(OpCode::Define, SecondaryFlags::LOCAL, line);
        self.emit_operand(index_slot);

        self.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), line);
        self.emit_op(OpCode::Define, SecondaryFlags::LOCAL, line);
        self.emit_operand(var_slot);

        let loop_start = self.chunk().len();
        self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
        self.emit_operand(iter_slot);
        self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
        self.emit_operand(index_slot);
        self.emit_op(OpCode::ContainerIterate, SecondaryFlags::empty(), line);

        let exit = self.emit_jump(OpCode::JumpIfFalse, line);
        self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line); // has-next
        self.emit_op(OpCode::Set, SecondaryFlags::LOCAL, line);
        self.emit_operand(index_slot);
        self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
        self.emit_op(OpCode::Set, SecondaryFlags::LOCAL, line);
        self.emit_operand(var_slot);
        self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);

        self.emit_stmt(body);
        self.emit_loop(loop_start, line);

        self.patch_jump(exit);
        self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line); // has-next
        self.emit_op(OpCode::PopN, SecondaryFlags::empty(), line);
        self.emit_operand(2); // element, next index

        self.end_scope(line);
    }

    fn emit_function_decl(&mut self, decl: &Rc<FunctionDecl>, line: i64) {
        let info = match self.analysis.functions.get(&decl.id) {
            Some(info) => info.clone(),
            None => return,
        };

        self.compile_function(decl, &info, line);

        let mangled = format!("{}#{}", decl.name.lexeme, info.id.0);
        match self.local_symbol(&mangled) {
            Some(symbol) if symbol.kind == SymbolKind::Global => {
                let idx = self.name_constant(&mangled, decl.name.line);
                self.emit_op(
                    OpCode::Define,
                    SecondaryFlags::GLOBAL | SecondaryFlags::FUNCTION,
                    line,
                );
                self.emit_operand(idx);
            }
            Some(symbol) => {
                // The closure value stays put: its stack position is the
                // storage slot.
                self.emit_op(
                    OpCode::Define,
                    SecondaryFlags::LOCAL | SecondaryFlags::FUNCTION,
                    line,
                );
                self.emit_operand(symbol.slot as u32);
            }
            None => {
                self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
            }
        }
    }

    /// Compile a callable body into a fresh function object and emit the
    /// `CLOSURE` + capture recipe on the enclosing chunk
    pub(super) fn compile_function(
        &mut self,
        decl: &FunctionDecl,
        info: &FunctionInfo,
        line: i64,
    ) {
        self.functions.push(FnCtx {
            chunk: Chunk::new(Rc::clone(&self.filename)),
            name: info.name.clone(),
            arity: info.arity,
            upvalue_count: info.captures.len(),
            is_initializer: info.is_initializer,
            function_id: info.id,
        });

        self.begin_scope();
        for stmt in &decl.body {
            self.emit_stmt(stmt);
        }
        if info.is_initializer {
            self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, INVALID_LINE);
            self.emit_operand(0);
        } else {
            self.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), INVALID_LINE);
        }
        self.emit_op(OpCode::Return, SecondaryFlags::empty(), INVALID_LINE);
        // Frame teardown reclaims the slots; no per-local cleanup here.
        self.cursor.exit();

        let function = self.finish_function();
        let idx = self.make_constant(Value::Obj(function), decl.line);
        self.emit_op(OpCode::Closure, SecondaryFlags::empty(), line);
        self.emit_operand(idx);
        self.emit_operand(info.captures.len() as u32);
        for capture in &info.captures {
            self.emit_operand(capture.is_local as u32);
            self.emit_operand(capture.index as u32);
        }
    }

    fn emit_class(&mut self, stmt_id: NodeId, decl: &Rc<ClassDecl>, line: i64) {
        let binding = match self.analysis.bindings.class_expression(stmt_id) {
            Some(binding) => binding.clone(),
            None => return,
        };

        let field_count = binding.class.borrow().total_field_count();
        let name_idx = self.name_constant(&decl.name.lexeme, decl.name.line);
        self.emit_op(OpCode::Class, SecondaryFlags::empty(), line);
        self.emit_operand(name_idx);
        self.emit_operand(field_count as u32);

        // The base's methods are copied in before the subclass's own are
        // attached, so overrides win.
        if let Some(base_symbol) = &binding.base_symbol {
            self.emit_symbol_get(base_symbol, None, line);
            self.emit_op(OpCode::Inherit, SecondaryFlags::empty(), line);
        }

        self.begin_scope(); // class-base scope
        self.begin_scope(); // class-field scope
        for method in &decl.methods {
            let info = match self.analysis.functions.get(&method.id) {
                Some(info) => info.clone(),
                None => continue,
            };
            self.compile_function(method, &info, method.line as i64);
            let mut flags = SecondaryFlags::empty();
            if info.is_initializer {
                flags |= SecondaryFlags::CTOR;
            }
            self.emit_op(OpCode::Method, flags, line);
            self.emit_operand(info.dispatch_id.0);
        }
        self.end_scope(line);
        self.end_scope(line);

        match binding.symbol.kind {
            SymbolKind::Global => {
                let idx = self.name_constant(&decl.name.lexeme, decl.name.line);
                self.emit_op(
                    OpCode::Define,
                    SecondaryFlags::GLOBAL | SecondaryFlags::CLASS,
                    line,
                );
                self.emit_operand(idx);
            }
            _ => {
                self.emit_op(
                    OpCode::Define,
                    SecondaryFlags::LOCAL | SecondaryFlags::CLASS,
                    line,
                );
                self.emit_operand(binding.symbol.slot as u32);
            }
        }
    }

    /// A name declared directly in the cursor's current scope
    pub(super) fn local_symbol(&self, name: &str) -> Option<Symbol> {
        self.scopes.node(self.cursor.current()).name(name).cloned()
    }

    /// Frame slot of a name declared in the current scope
    fn slot_of(&self, name: &str) -> u32 {
        self.local_symbol(name).map(|s| s.slot as u32).unwrap_or(0)
    }
}
