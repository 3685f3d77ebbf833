//! End-to-end scenario matrix: literal program → exact stdout

mod common;

use common::{run, run_classic};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
#[case::closure_counter(
    "fun makeCounter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }\n\
     var k = makeCounter(); print k(); print k(); print k();\n",
    "1\n2\n3\n"
)]
#[case::inheritance_with_super(
    "class A { say() { print \"A\"; } }\n\
     class B : A { say() { base.say(); print \"B\"; } }\n\
     B().say();\n",
    "A\nB\n"
)]
#[case::short_circuit(
    "fun t() { print \"t\"; return true; }\n\
     fun f() { print \"f\"; return false; }\n\
     print (t() or f());\n\
     print (f() and t());\n",
    "t\ntrue\nf\nfalse\n"
)]
#[case::postfix_vs_prefix(
    "var a = 1; print a++; print a; print ++a; print a;\n",
    "1\n2\n3\n3\n"
)]
#[case::containers(
    "var xs = [10, 20, 30]; xs[1] = 99; print xs[0]; print xs[1];\n\
     var m = {\"k\": 1}; m[\"k\"] = m[\"k\"] + 1; print m[\"k\"];\n",
    "10\n99\n2\n"
)]
fn scenario_on_the_vm(#[case] source: &str, #[case] expected: &str) {
    let (code, console) = run(source);
    assert_eq!(code, 0, "unexpected errors:\n{}", console.errors);
    assert_eq!(console.written, expected);
}

#[rstest]
#[case::closure_counter(
    "fun makeCounter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }\n\
     var k = makeCounter(); print k(); print k(); print k();\n",
    "1\n2\n3\n"
)]
#[case::inheritance_with_super(
    "class A { say() { print \"A\"; } }\n\
     class B : A { say() { base.say(); print \"B\"; } }\n\
     B().say();\n",
    "A\nB\n"
)]
fn scenario_on_the_classic_backend(#[case] source: &str, #[case] expected: &str) {
    let (code, console) = run_classic(source);
    assert_eq!(code, 0, "unexpected errors:\n{}", console.errors);
    assert_eq!(console.written, expected);
}

#[test]
fn return_at_top_level_is_a_compile_error() {
    let (code, console) = run("return 1;");
    assert_eq!(code, 65);
    assert!(console
        .errors
        .contains("Return statement in none-function scoop."));
}

#[test]
fn runs_are_byte_identical() {
    let source = "fun makeCounter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }\n\
                  var k = makeCounter();\n\
                  foreach (x in [1, 2, 3]) { print k(); }\n";
    let (_, first) = run(source);
    let (_, second) = run(source);
    assert_eq!(first.written, second.written);
    assert_eq!(first.written, "1\n2\n3\n");
}
