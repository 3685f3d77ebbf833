//! Resolve-stage errors: binding, typing, overloads, class rules

mod common;

use common::{assert_compile_error, run};
use pretty_assertions::assert_eq;

#[test]
fn return_outside_function() {
    assert_compile_error("return 1;", "Return statement in none-function scoop.");
}

#[test]
fn this_outside_class() {
    assert_compile_error(
        "print this;",
        "Can't use this in standalone function or in global scoop.",
    );
}

#[test]
fn base_without_base_class() {
    assert_compile_error(
        "class A { say() { base.say(); } }\n",
        "Can't use super in class who doesn't have a base class.",
    );
}

#[test]
fn base_outside_class() {
    assert_compile_error(
        "fun f() { base.say(); }\n",
        "Can't use super in standalone function or in global scoop.",
    );
}

#[test]
fn self_inheritance() {
    assert_compile_error("class A : A { }", "A class cannot inherit from itself.");
}

#[test]
fn undefined_name() {
    assert_compile_error("print missing;", "Name \"missing\" is not exist.");
}

#[test]
fn local_redefinition() {
    assert_compile_error(
        "{ var x = 1; var x = 2; }",
        "x already exists in this scoop.",
    );
}

#[test]
fn read_local_in_its_own_initializer() {
    assert_compile_error(
        "{ var a = 1; { var a = a; } }",
        "Can't read local variable in its own initializer.",
    );
}

#[test]
fn assignment_type_mismatch() {
    assert_compile_error(
        "var n: integer = 1; n = \"text\";",
        "Cannot assign type <string> to \"n\" of type <integer>.",
    );
}

#[test]
fn narrowing_assignment_rejected() {
    // floating does not fit an integer slot.
    assert_compile_error("var n: integer = 1.5;", "Cannot assign type");
}

#[test]
fn bad_condition_type() {
    assert_compile_error(
        "while (1) { print 1; }",
        "Condition expression of while of type <integer> is not subtype of <boolean>",
    );
}

#[test]
fn binary_operand_mismatch() {
    assert_compile_error("print 1 + \"a\";", "( cannot do operator + for type");
}

#[test]
fn call_with_no_matching_overload() {
    assert_compile_error(
        "fun f(x: integer) { }\n\
         f(\"text\");\n",
        "No overload of f matches the call argument types.",
    );
}

#[test]
fn identical_overload_signature_is_a_redefinition() {
    assert_compile_error(
        "fun f(x: integer) { }\n\
         fun f(y: integer) { }\n",
        "f already exists in this scoop.",
    );
}

#[test]
fn constructor_with_explicit_return_type() {
    assert_compile_error(
        "class A { constructor() -> integer { } }",
        "An initializer of class cannot have a explicit return type",
    );
}

#[test]
fn constructor_returning_a_value() {
    assert_compile_error(
        "class A { constructor() { return 1; } }",
        "Constructor can't return a value.",
    );
}

#[test]
fn member_missing_on_instance() {
    assert_compile_error(
        "class A { }\n\
         print A().missing;\n",
        "do not have a member named missing",
    );
}

#[test]
fn assignment_to_constant() {
    assert_compile_error("const k = 1; k = 2;", "Cannot assign to constant k.");
}

#[test]
fn undefined_type_annotation() {
    assert_compile_error("var x: Widget = 1;", "Type Widget is not defined.");
}

#[test]
fn resolution_surfaces_multiple_errors_in_one_pass() {
    let (code, console) = run(
        "print missing_one;\n\
         print missing_two;\n\
         return 3;\n",
    );
    assert_eq!(code, 65);
    assert!(console.errors.contains("missing_one"));
    assert!(console.errors.contains("missing_two"));
    assert!(console
        .errors
        .contains("Return statement in none-function scoop."));
}

#[test]
fn errors_skip_execution_entirely() {
    let (code, console) = run("print \"side effect\"; print missing;");
    assert_eq!(code, 65);
    assert_eq!(console.written, "", "codegen must be skipped on errors");
}
