//! Closures, upvalue capture and slot behavior

mod common;

use common::{run_stress, stdout_of};
use pretty_assertions::assert_eq;

#[test]
fn counter_closure_keeps_state() {
    let out = stdout_of(
        "fun makeCounter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }\n\
         var k = makeCounter(); print k(); print k(); print k();\n",
    );
    assert_eq!(out, "1\n2\n3\n");
}

#[test]
fn counters_are_independent() {
    let out = stdout_of(
        "fun makeCounter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }\n\
         var a = makeCounter(); var b = makeCounter();\n\
         a(); a(); print a(); print b();\n",
    );
    assert_eq!(out, "3\n1\n");
}

#[test]
fn two_closures_share_one_upvalue() {
    let out = stdout_of(
        "var setter; var getter;\n\
         fun makePair() {\n\
           var shared = 0;\n\
           fun set(v: integer) { shared = v; }\n\
           fun get() -> integer { return shared; }\n\
           setter = set; getter = get;\n\
         }\n\
         makePair();\n\
         setter(41);\n\
         print getter();\n",
    );
    assert_eq!(out, "41\n");
}

#[test]
fn captured_value_survives_scope_exit() {
    let out = stdout_of(
        "var hold;\n\
         {\n\
           var message = \"kept\";\n\
           fun show() { print message; }\n\
           hold = show;\n\
         }\n\
         hold();\n",
    );
    assert_eq!(out, "kept\n");
}

#[test]
fn capture_chains_through_two_function_levels() {
    let out = stdout_of(
        "fun outer() {\n\
           var x = 10;\n\
           fun middle() {\n\
             fun inner() -> integer { return x; }\n\
             return inner;\n\
           }\n\
           return middle;\n\
         }\n\
         var m = outer();\n\
         var i = m();\n\
         print i();\n",
    );
    assert_eq!(out, "10\n");
}

#[test]
fn assignment_through_a_closure_is_visible_outside() {
    let out = stdout_of(
        "fun run() {\n\
           var n = 1;\n\
           fun bump() { n = n + 10; }\n\
           bump();\n\
           print n;\n\
         }\n\
         run();\n",
    );
    assert_eq!(out, "11\n");
}

#[test]
fn slot_stability_across_repeated_calls() {
    // The same local reads and writes through the same slot on every call.
    let out = stdout_of(
        "fun pattern(flip: boolean) -> integer {\n\
           var first = 1;\n\
           var second = 2;\n\
           if (flip) { return second; }\n\
           return first;\n\
         }\n\
         print pattern(false); print pattern(true); print pattern(false);\n",
    );
    assert_eq!(out, "1\n2\n1\n");
}

#[test]
fn closures_behave_under_stress_gc() {
    let (code, console) = run_stress(
        "fun makeCounter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }\n\
         var k = makeCounter(); print k(); print k(); print k();\n",
    );
    assert_eq!(code, 0, "{}", console.errors);
    assert_eq!(console.written, "1\n2\n3\n");
}
