//! Collector soundness, observed end-to-end
//!
//! Stress mode collects before every allocation, so any object freed while
//! still reachable corrupts output or crashes; identical output under
//! stress is the black-box soundness check. Heap-level invariants are
//! covered by the unit tests inside `src/gc.rs`.

mod common;

use common::{run, run_stress};
use pretty_assertions::assert_eq;

/// Programs that allocate through every object kind
const PROGRAMS: &[&str] = &[
    // Strings and interning
    "var s = \"a\";\n\
     for (var i = 0; i < 20; i = i + 1) { s = s + \"x\"; }\n\
     print len(s);\n",
    // Lists and maps
    "var acc = 0;\n\
     for (var i = 0; i < 10; i = i + 1) {\n\
       var xs = [i, i + 1, i + 2];\n\
       acc = acc + xs[1];\n\
     }\n\
     print acc;\n",
    // Closures and upvalues
    "fun makeCounter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }\n\
     var k = makeCounter();\n\
     for (var i = 0; i < 5; i = i + 1) { k(); }\n\
     print k();\n",
    // Classes, instances and bound methods
    "class Acc {\n\
       var total: integer;\n\
       constructor() { this.total = 0; }\n\
       add(n: integer) { this.total = this.total + n; }\n\
     }\n\
     var a = Acc();\n\
     foreach (n in [1, 2, 3, 4, 5]) { a.add(n); }\n\
     print a.total;\n",
];

#[test]
fn stress_collection_does_not_change_behavior() {
    for program in PROGRAMS {
        let (code, console) = run(program);
        let (stress_code, stress_console) = run_stress(program);
        assert_eq!(code, 0, "baseline failed:\n{}", console.errors);
        assert_eq!(
            stress_code, 0,
            "stress run failed:\n{}",
            stress_console.errors
        );
        assert_eq!(
            console.written, stress_console.written,
            "stress collection changed output for:\n{}",
            program
        );
    }
}

#[test]
fn output_is_deterministic_across_runs() {
    for program in PROGRAMS {
        let (_, first) = run(program);
        let (_, second) = run(program);
        assert_eq!(first.written, second.written);
    }
}

#[test]
fn garbage_heavy_loop_completes_under_stress() {
    let (code, console) = run_stress(
        "var keep = \"\";\n\
         for (var i = 0; i < 40; i = i + 1) {\n\
           var tmp = [\"garbage\", \"more\"];\n\
           var m = {\"key\": tmp};\n\
           keep = keep + m[\"key\"][0][0:1];\n\
         }\n\
         print len(keep);\n",
    );
    assert_eq!(code, 0, "{}", console.errors);
    assert_eq!(console.written, "40\n");
}
