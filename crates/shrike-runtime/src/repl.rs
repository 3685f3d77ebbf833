//! REPL core logic (UI-agnostic)
//!
//! Each line is lexed, parsed, resolved and compiled into a fresh
//! top-level function, then run against persistent session state: the
//! resolver's global scope, the heap and the globals table all survive
//! across lines, and a failed line leaves them intact.

use crate::codegen;
use crate::console::Console;
use crate::diagnostic::DiagnosticSink;
use crate::driver::{
    report_diagnostics, seed_native_globals, RunOptions, EXIT_COMPILE_ERROR, EXIT_OK,
    EXIT_RUNTIME_ERROR,
};
use crate::heap::Heap;
use crate::interpreter::Interpreter;
use crate::lexer::Lexer;
use crate::native::NativeManager;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::value::Value;
use crate::vm::{Vm, VmStatus};
use std::collections::HashMap;

/// Persistent read-eval state
pub struct ReplSession {
    natives: NativeManager,
    resolver: Resolver,
    heap: Heap,
    globals: HashMap<String, Value>,
    interpreter: Interpreter,
    options: RunOptions,
    next_node: u32,
}

impl ReplSession {
    /// Create a session with the given options
    pub fn new(options: RunOptions) -> Self {
        let natives = NativeManager::new();
        let resolver = Resolver::new(&natives);
        let mut heap = if options.stress_gc {
            Heap::with_stress()
        } else {
            Heap::new()
        };
        let mut globals = HashMap::new();
        seed_native_globals(&mut heap, &mut globals, &natives);
        let interpreter = Interpreter::new(&options.filename);
        Self {
            natives,
            resolver,
            heap,
            globals,
            interpreter,
            options,
            next_node: 0,
        }
    }

    /// Evaluate one line; returns the exit code the line would have had as
    /// a program (0 / 65 / 67)
    pub fn eval(&mut self, line: &str, console: &mut dyn Console) -> i32 {
        let mut diags = DiagnosticSink::new();

        let tokens = Lexer::new(line).scan_tokens(&mut diags);
        let mut parser = Parser::with_offset(tokens, &mut diags, self.next_node);
        let program = parser.parse();
        self.next_node = parser.next_node_id();

        if self.options.show_ast {
            console.out(&crate::ast::print_program(&program));
        }

        let analysis = self.resolver.resolve(&program, &mut diags);
        if diags.had_error() {
            report_diagnostics(console, &diags, self.options.json_diagnostics);
            return EXIT_COMPILE_ERROR;
        }

        if self.options.classic {
            return if self
                .interpreter
                .interpret(&program, &analysis, console, &mut diags)
            {
                EXIT_OK
            } else {
                EXIT_RUNTIME_ERROR
            };
        }

        // Fresh top-level function per line; globals and heap are shared.
        let script = codegen::generate(
            &program,
            &analysis,
            self.resolver.scopes(),
            &mut self.heap,
            &self.globals,
            &mut diags,
            &self.options.filename,
        );
        if diags.had_error() {
            report_diagnostics(console, &diags, self.options.json_diagnostics);
            return EXIT_COMPILE_ERROR;
        }

        if self.options.show_assembly {
            crate::driver::disassemble_all(&self.heap, script, console);
        }

        let mut vm = Vm::new(
            &mut self.heap,
            &mut self.globals,
            &self.natives,
            console,
            &mut diags,
        );
        match vm.run(script) {
            VmStatus::Ok => EXIT_OK,
            VmStatus::RuntimeError => EXIT_RUNTIME_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::CaptureConsole;

    fn session() -> ReplSession {
        ReplSession::new(RunOptions {
            filename: "<repl>".to_string(),
            ..RunOptions::default()
        })
    }

    #[test]
    fn test_globals_persist_across_lines() {
        let mut repl = session();
        let mut console = CaptureConsole::new();
        assert_eq!(repl.eval("var x = 41;", &mut console), EXIT_OK);
        assert_eq!(repl.eval("x = x + 1;", &mut console), EXIT_OK);
        assert_eq!(repl.eval("print x;", &mut console), EXIT_OK);
        assert_eq!(console.written, "42\n");
    }

    #[test]
    fn test_functions_persist_across_lines() {
        let mut repl = session();
        let mut console = CaptureConsole::new();
        assert_eq!(
            repl.eval("fun double(n: integer) -> integer { return n * 2; }", &mut console),
            EXIT_OK
        );
        assert_eq!(repl.eval("print double(21);", &mut console), EXIT_OK);
        assert_eq!(console.written, "42\n");
    }

    #[test]
    fn test_failed_line_leaves_state_intact() {
        let mut repl = session();
        let mut console = CaptureConsole::new();
        assert_eq!(repl.eval("var kept = 7;", &mut console), EXIT_OK);
        assert_eq!(
            repl.eval("print missing_name;", &mut console),
            EXIT_COMPILE_ERROR
        );
        assert_eq!(repl.eval("print kept;", &mut console), EXIT_OK);
        assert_eq!(console.written, "7\n");
    }

    #[test]
    fn test_runtime_error_reports_67() {
        let mut repl = session();
        let mut console = CaptureConsole::new();
        assert_eq!(
            repl.eval("var zero = 0; print 1 / zero;", &mut console),
            EXIT_RUNTIME_ERROR
        );
        assert!(console.errors.contains("Divide by zero."));
    }

    #[test]
    fn test_classic_backend_persists_too() {
        let mut repl = ReplSession::new(RunOptions {
            classic: true,
            filename: "<repl>".to_string(),
            ..RunOptions::default()
        });
        let mut console = CaptureConsole::new();
        assert_eq!(repl.eval("var x = 1;", &mut console), EXIT_OK);
        assert_eq!(repl.eval("print x + 1;", &mut console), EXIT_OK);
        assert_eq!(console.written, "2\n");
    }
}
