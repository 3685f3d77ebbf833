//! The `shrike` binary: file runner and interactive REPL

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use shrike_runtime::{run_source, ReplSession, RunOptions, StdConsole, EXIT_USAGE, VERSION};
use std::path::PathBuf;
use std::process::exit;

/// A small class-based scripting language with a bytecode VM
#[derive(Parser, Debug)]
#[command(name = "shrike", version = VERSION, about)]
struct Cli {
    /// Execute a script file; without it, start the REPL
    #[arg(long, short = 'f', value_name = "PATH")]
    file: Option<PathBuf>,

    /// Use the classic tree-walking back-end instead of the VM
    #[arg(long)]
    classic: bool,

    /// Dump the AST after parsing
    #[arg(long)]
    show_ast: bool,

    /// Disassemble each emitted chunk before execution
    #[arg(long)]
    show_assembly: bool,

    /// Emit diagnostics as JSON lines
    #[arg(long)]
    json_diagnostics: bool,

    /// Run the garbage collector on every allocation
    #[arg(long)]
    stress_gc: bool,
}

fn main() {
    // Usage problems exit 1 (clap's default of 2 does not match the
    // documented contract); --help and --version stay successful.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let code = if error.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = error.print();
            exit(code);
        }
    };

    let mut options = RunOptions {
        classic: cli.classic,
        show_ast: cli.show_ast,
        show_assembly: cli.show_assembly,
        stress_gc: cli.stress_gc,
        json_diagnostics: cli.json_diagnostics,
        ..RunOptions::default()
    };

    match &cli.file {
        Some(path) => {
            options.filename = path.display().to_string();
            exit(run_file(path, &options));
        }
        None => exit(run_repl(options)),
    }
}

fn run_file(path: &PathBuf, options: &RunOptions) -> i32 {
    let source = match std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))
    {
        Ok(source) => source,
        Err(error) => {
            eprintln!("{} {:#}", "error:".red().bold(), error);
            return EXIT_USAGE;
        }
    };
    let mut console = StdConsole;
    run_source(&mut console, &source, options)
}

fn run_repl(mut options: RunOptions) -> i32 {
    options.filename = "<repl>".to_string();
    println!("{} {}", "shrike".bold(), VERSION);
    println!("Type a statement, or press Ctrl-D to exit.");

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("{} cannot start line editor: {}", "error:".red().bold(), error);
            return EXIT_USAGE;
        }
    };

    let mut session = ReplSession::new(options);
    let mut console = StdConsole;

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                // Errors are reported per line; the session survives them.
                session.eval(&line, &mut console);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("{} {}", "error:".red().bold(), error);
                return EXIT_USAGE;
            }
        }
    }
    0
}
