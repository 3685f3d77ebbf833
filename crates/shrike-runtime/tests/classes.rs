//! Classes: fields, constructors, methods, inheritance, operators

mod common;

use common::{assert_runtime_error, run_stress, stdout_of};
use pretty_assertions::assert_eq;

#[test]
fn inheritance_with_super_call() {
    let out = stdout_of(
        "class A { say() { print \"A\"; } }\n\
         class B : A { say() { base.say(); print \"B\"; } }\n\
         B().say();\n",
    );
    assert_eq!(out, "A\nB\n");
}

#[test]
fn constructor_initializes_fields() {
    let out = stdout_of(
        "class Point {\n\
           var x: integer;\n\
           var y: integer;\n\
           constructor(x: integer, y: integer) { this.x = x; this.y = y; }\n\
         }\n\
         var p = Point(3, 4);\n\
         print p.x; print p.y;\n",
    );
    assert_eq!(out, "3\n4\n");
}

#[test]
fn default_constructor_zero_fields_are_nil() {
    let out = stdout_of(
        "class Box { var contents; }\n\
         var b = Box();\n\
         print b.contents;\n\
         b.contents = 9;\n\
         print b.contents;\n",
    );
    assert_eq!(out, "nil\n9\n");
}

#[test]
fn methods_see_fields_without_this() {
    let out = stdout_of(
        "class Counter {\n\
           var n: integer;\n\
           constructor() { n = 0; }\n\
           bump() { n = n + 1; print n; }\n\
         }\n\
         var c = Counter();\n\
         c.bump(); c.bump();\n",
    );
    assert_eq!(out, "1\n2\n");
}

#[test]
fn bound_method_keeps_its_receiver() {
    let out = stdout_of(
        "class Counter {\n\
           var n: integer;\n\
           constructor() { this.n = 0; }\n\
           bump() { this.n = this.n + 1; print this.n; }\n\
         }\n\
         var c = Counter();\n\
         var m = c.bump;\n\
         m(); m();\n",
    );
    assert_eq!(out, "1\n2\n");
}

#[test]
fn inherited_fields_share_the_layout() {
    let out = stdout_of(
        "class Base { var a: integer; constructor() { this.a = 1; } }\n\
         class Derived : Base {\n\
           var b: integer;\n\
           constructor() { this.a = 10; this.b = 20; }\n\
         }\n\
         var d = Derived();\n\
         print d.a; print d.b;\n",
    );
    assert_eq!(out, "10\n20\n");
}

#[test]
fn override_wins_through_base_typed_calls() {
    let out = stdout_of(
        "class A { name() -> string { return \"A\"; } }\n\
         class B : A { name() -> string { return \"B\"; } }\n\
         var a: A = B();\n\
         print a.name();\n",
    );
    assert_eq!(out, "B\n");
}

#[test]
fn method_overloads_dispatch_by_parameter_type() {
    let out = stdout_of(
        "class Show {\n\
           show(x: integer) { print \"int\"; }\n\
           show(s: string) { print \"str\"; }\n\
         }\n\
         var s = Show();\n\
         s.show(1); s.show(\"a\"); s.show(2);\n",
    );
    assert_eq!(out, "int\nstr\nint\n");
}

#[test]
fn operator_overloading_rewrites_to_method_call() {
    let out = stdout_of(
        "class Vec2 {\n\
           var x: integer;\n\
           var y: integer;\n\
           constructor(x: integer, y: integer) { this.x = x; this.y = y; }\n\
           operator+(o: Vec2) -> Vec2 { return Vec2(this.x + o.x, this.y + o.y); }\n\
         }\n\
         var a = Vec2(1, 2);\n\
         var b = Vec2(3, 4);\n\
         var c = a + b;\n\
         print c.x; print c.y;\n",
    );
    assert_eq!(out, "4\n6\n");
}

#[test]
fn constructor_overloads_dispatch_by_arity_and_type() {
    let out = stdout_of(
        "class Temp {\n\
           var degrees: integer;\n\
           constructor() { this.degrees = 0; }\n\
           constructor(d: integer) { this.degrees = d; }\n\
         }\n\
         print Temp().degrees;\n\
         print Temp(21).degrees;\n",
    );
    assert_eq!(out, "0\n21\n");
}

#[test]
fn base_constructor_call_initializes_base_fields() {
    let out = stdout_of(
        "class Animal {\n\
           var name: string;\n\
           constructor(n: string) { this.name = n; }\n\
         }\n\
         class Dog : Animal {\n\
           constructor(n: string) { base.constructor(n); }\n\
           speak() { print this.name; }\n\
         }\n\
         Dog(\"rex\").speak();\n",
    );
    assert_eq!(out, "rex\n");
}

#[test]
fn classes_survive_stress_gc() {
    let (code, console) = run_stress(
        "class A { say() { print \"A\"; } }\n\
         class B : A { say() { base.say(); print \"B\"; } }\n\
         B().say();\n",
    );
    assert_eq!(code, 0, "{}", console.errors);
    assert_eq!(console.written, "A\nB\n");
}

#[test]
fn method_on_non_instance_is_a_runtime_error_via_any() {
    // A nil-holding dynamic call crosses the static checks through `any`
    // and fails at runtime.
    assert_runtime_error(
        "var f;\n\
         f();\n",
        "Can only call functions and classes.",
    );
}
