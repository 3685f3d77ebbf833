//! Shared helpers for the integration suites
#![allow(dead_code)] // each suite uses its own subset

use shrike_runtime::{run_source, CaptureConsole, RunOptions};

/// Run a program on the VM back-end
pub fn run(source: &str) -> (i32, CaptureConsole) {
    run_with(source, &RunOptions::default())
}

/// Run a program on the classic back-end
pub fn run_classic(source: &str) -> (i32, CaptureConsole) {
    run_with(
        source,
        &RunOptions {
            classic: true,
            ..RunOptions::default()
        },
    )
}

/// Run a program with a collection before every allocation
pub fn run_stress(source: &str) -> (i32, CaptureConsole) {
    run_with(
        source,
        &RunOptions {
            stress_gc: true,
            ..RunOptions::default()
        },
    )
}

pub fn run_with(source: &str, options: &RunOptions) -> (i32, CaptureConsole) {
    let mut console = CaptureConsole::new();
    let code = run_source(&mut console, source, options);
    (code, console)
}

/// Run on the VM and return stdout, asserting success
pub fn stdout_of(source: &str) -> String {
    let (code, console) = run(source);
    assert_eq!(
        code, 0,
        "expected success, got exit {} with errors:\n{}",
        code, console.errors
    );
    console.written
}

/// Assert a compile error whose report contains `needle`
pub fn assert_compile_error(source: &str, needle: &str) {
    let (code, console) = run(source);
    assert_eq!(code, 65, "expected exit 65, got {}", code);
    assert!(
        console.errors.contains(needle),
        "expected error containing {:?}, got:\n{}",
        needle,
        console.errors
    );
}

/// Assert a runtime error whose report contains `needle`
pub fn assert_runtime_error(source: &str, needle: &str) {
    let (code, console) = run(source);
    assert_eq!(code, 67, "expected exit 67, got {}", code);
    assert!(
        console.errors.contains(needle),
        "expected error containing {:?}, got:\n{}",
        needle,
        console.errors
    );
}
