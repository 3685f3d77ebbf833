//! Shrike runtime - the language implementation
//!
//! This library provides the complete Shrike pipeline:
//! - Lexical analysis and parsing
//! - Resolution: scope tree, bindings, types, overloads, upvalue capture
//! - Bytecode compilation and the stack VM with a mark-and-sweep collector
//! - The classic tree-walking back-end
//! - REPL core and the run driver shared with the CLI

/// Runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ast;
pub mod bytecode;
pub mod codegen;
pub mod console;
pub mod diagnostic;
pub mod driver;
pub mod gc;
pub mod heap;
pub mod interpreter;
pub mod lexer;
pub mod native;
pub mod object;
pub mod parser;
pub mod repl;
pub mod resolver;
pub mod scope;
pub mod symbol;
pub mod token;
pub mod types;
pub mod value;
pub mod vm;

pub use bytecode::{Chunk, OpCode, SecondaryFlags};
pub use console::{CaptureConsole, Console, StdConsole};
pub use diagnostic::{Diagnostic, DiagnosticSink, Phase};
pub use driver::{
    run_source, RunOptions, EXIT_COMPILE_ERROR, EXIT_OK, EXIT_RUNTIME_ERROR, EXIT_USAGE,
};
pub use heap::Heap;
pub use interpreter::Interpreter;
pub use lexer::Lexer;
pub use native::NativeManager;
pub use parser::Parser;
pub use repl::ReplSession;
pub use resolver::{Analysis, Resolver};
pub use token::{Literal, Token, TokenKind};
pub use types::LoxType;
pub use value::Value;
pub use vm::{Vm, VmStatus};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke() {
        assert_eq!(VERSION, "0.3.0");
    }
}
