//! Bytecode emitter
//!
//! Re-walks the AST with the resolver's analysis in hand, advancing a scope
//! cursor in lock-step with the resolver's traversal so every slot index and
//! upvalue list lines up. Maintains a stack of in-flight function chunks;
//! heap objects created during emission are pinned through the heap's
//! compiler roots so an allocation-triggered collection cannot free a
//! half-built function.

mod expr;
mod stmt;

use crate::ast::Stmt;
use crate::bytecode::{Chunk, OpCode, SecondaryFlags, INVALID_LINE};
use crate::diagnostic::DiagnosticSink;
use crate::gc::{self, GcRoots};
use crate::heap::Heap;
use crate::object::{FunctionObject, Object, ObjectId};
use crate::resolver::Analysis;
use crate::scope::{ScopeCursor, ScopeTree};
use crate::symbol::{Symbol, SymbolKind};
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// One in-flight function receiving opcodes
struct FnCtx {
    chunk: Chunk,
    name: String,
    arity: usize,
    upvalue_count: usize,
    is_initializer: bool,
    function_id: crate::symbol::FunctionId,
}

/// The code generator for one resolved program
pub struct CodeGen<'a> {
    analysis: &'a Analysis,
    scopes: &'a ScopeTree,
    heap: &'a mut Heap,
    globals: &'a HashMap<String, Value>,
    diags: &'a mut DiagnosticSink,
    cursor: ScopeCursor,
    functions: Vec<FnCtx>,
    filename: Rc<str>,
}

/// Compile a resolved program into its top-level function object.
///
/// `globals` are the session globals (REPL state, natives); they are GC
/// roots for collections triggered by emission-time allocation.
pub fn generate(
    program: &[Stmt],
    analysis: &Analysis,
    scopes: &ScopeTree,
    heap: &mut Heap,
    globals: &HashMap<String, Value>,
    diags: &mut DiagnosticSink,
    filename: &str,
) -> ObjectId {
    let filename: Rc<str> = Rc::from(filename);
    let mut generator = CodeGen {
        analysis,
        scopes,
        heap,
        globals,
        diags,
        cursor: analysis.cursor(),
        functions: Vec::new(),
        filename: Rc::clone(&filename),
    };

    generator.functions.push(FnCtx {
        chunk: Chunk::new(Rc::clone(&filename)),
        name: "<script>".to_string(),
        arity: 0,
        upvalue_count: 0,
        is_initializer: false,
        function_id: analysis.script_function,
    });

    for stmt in program {
        generator.emit_stmt(stmt);
    }
    generator.emit_op(OpCode::ConstantNil, SecondaryFlags::empty(), INVALID_LINE);
    generator.emit_op(OpCode::Return, SecondaryFlags::empty(), INVALID_LINE);

    let script = generator.finish_function();
    generator.heap.compiler_roots.clear();
    script
}

impl<'a> CodeGen<'a> {
    // ---- emission plumbing ----

    fn chunk(&mut self) -> &mut Chunk {
        &mut self
            .functions
            .last_mut()
            .expect("no in-flight function")
            .chunk
    }

    fn emit_op(&mut self, op: OpCode, flags: SecondaryFlags, line: i64) {
        self.chunk().write_op(op, flags, line);
    }

    fn emit_operand(&mut self, operand: u32) {
        self.chunk().write_operand(operand);
    }

    /// Add a constant, reporting pool overflow as a compile error
    fn make_constant(&mut self, value: Value, line: u32) -> u32 {
        match self.chunk().add_constant(value) {
            Some(idx) => idx as u32,
            None => {
                self.diags
                    .resolve_error(line, "", "Too many constants in one chunk.");
                0
            }
        }
    }

    /// Intern a string constant, pinned against emission-time collections
    fn intern_rooted(&mut self, text: &str) -> ObjectId {
        self.maybe_collect();
        let id = self.heap.intern(text);
        self.heap.compiler_roots.push(Value::Obj(id));
        id
    }

    fn alloc_rooted(&mut self, object: Object) -> ObjectId {
        self.maybe_collect();
        let id = self.heap.allocate(object);
        self.heap.compiler_roots.push(Value::Obj(id));
        id
    }

    fn maybe_collect(&mut self) {
        if self.heap.should_collect() {
            let roots = GcRoots::compile_time(self.globals);
            gc::collect(self.heap, &roots);
        }
    }

    /// Name-constant index for a global access
    fn name_constant(&mut self, name: &str, line: u32) -> u32 {
        let id = self.intern_rooted(name);
        self.make_constant(Value::Obj(id), line)
    }

    // ---- jumps ----

    /// Emit a forward branch; returns the operand offset to patch
    fn emit_jump(&mut self, op: OpCode, line: i64) -> usize {
        self.emit_op(op, SecondaryFlags::empty(), line);
        let offset = self.chunk().len();
        self.emit_operand(u32::MAX);
        offset
    }

    /// Patch a forward branch to land at the current offset
    fn patch_jump(&mut self, operand_offset: usize) {
        let distance = (self.chunk().len() - operand_offset - 1) as u32;
        self.chunk().patch(operand_offset, distance);
    }

    /// Emit a backward branch to `loop_start`
    fn emit_loop(&mut self, loop_start: usize, line: i64) {
        self.emit_op(OpCode::Loop, SecondaryFlags::empty(), line);
        let distance = (self.chunk().len() + 1 - loop_start) as u32;
        self.emit_operand(distance);
    }

    // ---- scope walking ----

    /// Enter the next scope, mirroring the resolver's traversal
    fn begin_scope(&mut self) {
        self.cursor.enter(self.scopes);
    }

    /// Leave the current scope, emitting slot cleanup: captured locals are
    /// closed into their upvalues, the rest are popped.
    fn end_scope(&mut self, line: i64) {
        let scope = self.cursor.current();
        let node = self.scopes.node(scope);
        let function = node.containing_function;
        let captured: Vec<usize> = self
            .scopes
            .node(function)
            .function
            .as_ref()
            .map(|f| f.captured_slots.iter().copied().collect())
            .unwrap_or_default();

        let locals: Vec<(String, usize)> = node.locals.clone();
        let any_captured = locals.iter().any(|(_, slot)| captured.contains(slot));

        if !any_captured && locals.len() > 1 {
            self.emit_op(OpCode::PopN, SecondaryFlags::empty(), line);
            self.emit_operand(locals.len() as u32);
        } else {
            for (_, slot) in locals.iter().rev() {
                if captured.contains(slot) {
                    self.emit_op(OpCode::CloseUpvalue, SecondaryFlags::empty(), line);
                } else {
                    self.emit_op(OpCode::Pop, SecondaryFlags::empty(), line);
                }
            }
        }
        self.cursor.exit();
    }

    /// Pop the top in-flight function into a heap function object
    fn finish_function(&mut self) -> ObjectId {
        let ctx = self.functions.pop().expect("no in-flight function");
        self.alloc_rooted(Object::Function(FunctionObject {
            name: ctx.name,
            arity: ctx.arity,
            upvalue_count: ctx.upvalue_count,
            chunk: Rc::new(ctx.chunk),
            is_initializer: ctx.is_initializer,
            function_id: ctx.function_id,
        }))
    }

    // ---- symbol access ----

    /// Emit a read of a storage symbol (globals and frame slots)
    fn emit_symbol_get(&mut self, symbol: &Symbol, upvalue: Option<usize>, line: i64) {
        if let Some(index) = upvalue {
            self.emit_op(OpCode::Get, SecondaryFlags::UPVALUE, line);
            self.emit_operand(index as u32);
            return;
        }
        match symbol.kind {
            SymbolKind::Global => {
                let idx = self.name_constant(&symbol.name, line.max(0) as u32);
                self.emit_op(OpCode::Get, SecondaryFlags::GLOBAL, line);
                self.emit_operand(idx);
            }
            SymbolKind::Local | SymbolKind::Parameter | SymbolKind::This => {
                self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
                self.emit_operand(symbol.slot as u32);
            }
            SymbolKind::Field => {
                // Implicit receiver: the field lives on `this` (slot 0).
                self.emit_op(OpCode::Get, SecondaryFlags::LOCAL, line);
                self.emit_operand(0);
                self.emit_op(OpCode::GetProperty, SecondaryFlags::FIELD, line);
                self.emit_operand(symbol.slot as u32);
            }
            SymbolKind::Base => {
                // `base` is only reachable through super forms.
            }
        }
    }
}
