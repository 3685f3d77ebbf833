//! Run orchestration shared by the CLI and the test suites
//!
//! One entry point takes source text through the whole pipeline (scan,
//! parse, resolve, compile, execute) against a console, and maps the
//! outcome to the process exit codes: 0 for success, 65 for compile-stage
//! errors (reported before execution), 67 for runtime errors.

use crate::ast::print_program;
use crate::bytecode::disassemble;
use crate::codegen;
use crate::console::Console;
use crate::diagnostic::DiagnosticSink;
use crate::heap::Heap;
use crate::interpreter::Interpreter;
use crate::lexer::Lexer;
use crate::native::NativeManager;
use crate::object::{NativeObject, Object, ObjectId};
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::value::Value;
use crate::vm::{Vm, VmStatus};
use std::collections::{HashMap, HashSet};

/// Successful run
pub const EXIT_OK: i32 = 0;
/// Lex/parse/resolve/type errors
pub const EXIT_COMPILE_ERROR: i32 = 65;
/// Runtime error
pub const EXIT_RUNTIME_ERROR: i32 = 67;
/// Bad invocation (unreadable file, bad flags)
pub const EXIT_USAGE: i32 = 1;

/// Knobs shared by the CLI, REPL and tests
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Use the classic tree-walking back-end
    pub classic: bool,
    /// Dump the parenthesized AST after parsing
    pub show_ast: bool,
    /// Disassemble every emitted chunk before execution
    pub show_assembly: bool,
    /// Collect on every allocation
    pub stress_gc: bool,
    /// Emit diagnostics as JSON lines instead of human text
    pub json_diagnostics: bool,
    /// File name used in error reports
    pub filename: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            classic: false,
            show_ast: false,
            show_assembly: false,
            stress_gc: false,
            json_diagnostics: false,
            filename: "<script>".to_string(),
        }
    }
}

/// Run a whole source text; diagnostics and program output go through the
/// console, and the return value is the process exit code.
pub fn run_source(console: &mut dyn Console, source: &str, options: &RunOptions) -> i32 {
    let natives = NativeManager::new();
    let mut diags = DiagnosticSink::new();

    let tokens = Lexer::new(source).scan_tokens(&mut diags);
    let mut parser = Parser::new(tokens, &mut diags);
    let program = parser.parse();

    if options.show_ast {
        console.out(&print_program(&program));
    }

    let mut resolver = Resolver::new(&natives);
    let analysis = resolver.resolve(&program, &mut diags);

    if diags.had_error() {
        report_diagnostics(console, &diags, options.json_diagnostics);
        return EXIT_COMPILE_ERROR;
    }

    if options.classic {
        let mut interpreter = Interpreter::new(&options.filename);
        return if interpreter.interpret(&program, &analysis, console, &mut diags) {
            EXIT_OK
        } else {
            EXIT_RUNTIME_ERROR
        };
    }

    let mut heap = if options.stress_gc {
        Heap::with_stress()
    } else {
        Heap::new()
    };
    let mut globals = HashMap::new();
    seed_native_globals(&mut heap, &mut globals, &natives);

    let script = codegen::generate(
        &program,
        &analysis,
        resolver.scopes(),
        &mut heap,
        &globals,
        &mut diags,
        &options.filename,
    );
    if diags.had_error() {
        report_diagnostics(console, &diags, options.json_diagnostics);
        return EXIT_COMPILE_ERROR;
    }

    if options.show_assembly {
        disassemble_all(&heap, script, console);
    }

    let mut vm = Vm::new(&mut heap, &mut globals, &natives, console, &mut diags);
    match vm.run(script) {
        VmStatus::Ok => EXIT_OK,
        VmStatus::RuntimeError => EXIT_RUNTIME_ERROR,
    }
}

/// Define one native object per distinct native name in the globals table
pub(crate) fn seed_native_globals(
    heap: &mut Heap,
    globals: &mut HashMap<String, Value>,
    natives: &NativeManager,
) {
    for name in natives.names() {
        let id = natives.by_name(name)[0].id;
        let object = heap.allocate(Object::Native(NativeObject {
            native: id,
            name: name.to_string(),
        }));
        globals.insert(name.to_string(), Value::Obj(object));
    }
}

/// Write every collected diagnostic to the console's error stream
pub(crate) fn report_diagnostics(console: &mut dyn Console, diags: &DiagnosticSink, json: bool) {
    for diagnostic in diags.diagnostics() {
        let line = if json {
            diagnostic
                .to_json_string()
                .unwrap_or_else(|_| diagnostic.to_report_string())
        } else {
            diagnostic.to_report_string()
        };
        console.error(&line);
        console.error("\n");
    }
}

/// Disassemble the script chunk and, recursively, every function constant
pub(crate) fn disassemble_all(heap: &Heap, script: ObjectId, console: &mut dyn Console) {
    let mut seen = HashSet::new();
    disassemble_function(heap, script, console, &mut seen);
}

fn disassemble_function(
    heap: &Heap,
    id: ObjectId,
    console: &mut dyn Console,
    seen: &mut HashSet<ObjectId>,
) {
    if !seen.insert(id) {
        return;
    }
    let function = match heap.get(id) {
        Object::Function(f) => f,
        _ => return,
    };
    console.out(&disassemble(&function.chunk, heap, &function.name));

    for constant in &function.chunk.constants {
        if let Value::Obj(child) = constant {
            if matches!(heap.get(*child), Object::Function(_)) {
                disassemble_function(heap, *child, console, seen);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::CaptureConsole;

    fn run(source: &str) -> (i32, CaptureConsole) {
        let mut console = CaptureConsole::new();
        let code = run_source(&mut console, source, &RunOptions::default());
        (code, console)
    }

    #[test]
    fn test_hello() {
        let (code, console) = run("print \"hello\";");
        assert_eq!(code, EXIT_OK);
        assert_eq!(console.written, "hello\n");
    }

    #[test]
    fn test_compile_error_exit_code() {
        let (code, console) = run("print unknown_name;");
        assert_eq!(code, EXIT_COMPILE_ERROR);
        assert!(console.errors.contains("is not exist"));
    }

    #[test]
    fn test_runtime_error_exit_code() {
        let (code, console) = run("var a = 1; var b = 0; print a / b;");
        assert_eq!(code, EXIT_RUNTIME_ERROR);
        assert!(console.errors.contains("Divide by zero."));
        assert!(console.errors.contains("[Line 1 in file <script>]"));
    }

    #[test]
    fn test_show_ast() {
        let mut console = CaptureConsole::new();
        let options = RunOptions {
            show_ast: true,
            ..RunOptions::default()
        };
        let code = run_source(&mut console, "print 1 + 2;", &options);
        assert_eq!(code, EXIT_OK);
        assert!(console.written.contains("(print (+ 1 2))"));
    }

    #[test]
    fn test_show_assembly_lists_chunks() {
        let mut console = CaptureConsole::new();
        let options = RunOptions {
            show_assembly: true,
            ..RunOptions::default()
        };
        let code = run_source(
            &mut console,
            "fun f() { return 1; } print f();",
            &options,
        );
        assert_eq!(code, EXIT_OK);
        assert!(console.written.contains("== <script> =="));
        assert!(console.written.contains("== f =="));
    }
}
