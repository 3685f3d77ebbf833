//! Expression operators: arithmetic split, short-circuit, inc/dec,
//! ternary, comma, overload resolution for free functions

mod common;

use common::{assert_runtime_error, stdout_of};
use pretty_assertions::assert_eq;

#[test]
fn short_circuit_with_side_effects() {
    let out = stdout_of(
        "fun t() { print \"t\"; return true; }\n\
         fun f() { print \"f\"; return false; }\n\
         print (t() or f());\n\
         print (f() and t());\n",
    );
    assert_eq!(out, "t\ntrue\nf\nfalse\n");
}

#[test]
fn postfix_vs_prefix() {
    let out = stdout_of("var a = 1; print a++; print a; print ++a; print a;\n");
    assert_eq!(out, "1\n2\n3\n3\n");
}

#[test]
fn decrement_works_on_locals_too() {
    let out = stdout_of(
        "{\n\
           var n = 5;\n\
           print n--;\n\
           print --n;\n\
         }\n",
    );
    assert_eq!(out, "5\n3\n");
}

#[test]
fn integer_and_floating_stay_split() {
    let out = stdout_of(
        "print 10 / 4;\n\
         print 10.0 / 4;\n\
         print 2 + 3;\n\
         print 2.5 + 1;\n",
    );
    assert_eq!(out, "2\n2.5\n5\n3.5\n");
}

#[test]
fn power_and_modulo() {
    let out = stdout_of(
        "print 2 ** 3 ** 2;\n\
         print 7 % 3;\n\
         print 2.0 ** 3;\n",
    );
    assert_eq!(out, "512\n1\n8\n");
}

#[test]
fn equality_never_crosses_kinds() {
    let out = stdout_of(
        "print 1 == 1.0;\n\
         print 1 == 1;\n\
         print \"a\" == \"a\";\n\
         print \"a\" != \"b\";\n\
         print nil == nil;\n",
    );
    assert_eq!(out, "false\ntrue\ntrue\ntrue\ntrue\n");
}

#[test]
fn string_concat_and_compare() {
    let out = stdout_of(
        "print \"foo\" + \"bar\";\n\
         print \"abc\" < \"abd\";\n",
    );
    assert_eq!(out, "foobar\ntrue\n");
}

#[test]
fn ternary_evaluates_selected_branch_only() {
    let out = stdout_of(
        "fun yes() -> integer { print \"yes\"; return 1; }\n\
         fun no() -> integer { print \"no\"; return 2; }\n\
         print true ? yes() : no();\n",
    );
    assert_eq!(out, "yes\n1\n");
}

#[test]
fn comma_yields_the_right_operand() {
    let out = stdout_of("print (1 + 1, 5);\n");
    assert_eq!(out, "5\n");
}

#[test]
fn overload_dispatch_by_parameter_type() {
    let out = stdout_of(
        "fun describe(x: integer) -> string { return \"int\"; }\n\
         fun describe(x: floating) -> string { return \"float\"; }\n\
         fun describe(s: string) -> string { return \"str\"; }\n\
         print describe(1);\n\
         print describe(1.5);\n\
         print describe(\"hi\");\n",
    );
    assert_eq!(out, "int\nfloat\nstr\n");
}

#[test]
fn overload_dispatch_is_deterministic() {
    // Same argument tuple, same chosen overload, every time.
    let out = stdout_of(
        "fun pick(x: integer, y: floating) -> string { return \"if\"; }\n\
         fun pick(x: floating, y: floating) -> string { return \"ff\"; }\n\
         for (var i = 0; i < 4; i = i + 1) { print pick(1, 2.0); }\n",
    );
    assert_eq!(out, "if\nif\nif\nif\n");
}

#[test]
fn integer_promotes_to_floating_parameter() {
    let out = stdout_of(
        "fun half(x: floating) -> floating { return x / 2.0; }\n\
         print half(5);\n",
    );
    assert_eq!(out, "2.5\n");
}

#[test]
fn divide_by_zero_is_a_runtime_error() {
    assert_runtime_error("var zero = 0; print 1 / zero;", "Divide by zero.");
    assert_runtime_error("var zero = 0; print 1 % zero;", "Divide by zero.");
}

#[test]
fn unary_forms() {
    let out = stdout_of(
        "print -3;\n\
         print !true;\n\
         print !nil;\n\
         print -2.5;\n",
    );
    assert_eq!(out, "-3\nfalse\ntrue\n-2.5\n");
}
