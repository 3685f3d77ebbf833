//! VM vs classic back-end: identical observable behavior

mod common;

use common::{run, run_classic};
use pretty_assertions::assert_eq;

/// Programs both back-ends must agree on, stdout and exit code alike
const PROGRAMS: &[&str] = &[
    "print 1 + 2 * 3;\n",
    "print 10 / 4; print 10.0 / 4;\n",
    "var a = 1; print a++; print a; print ++a; print a;\n",
    "fun t() { print \"t\"; return true; }\n\
     fun f() { print \"f\"; return false; }\n\
     print (t() or f());\n\
     print (f() and t());\n",
    "fun makeCounter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }\n\
     var k = makeCounter(); print k(); print k(); print k();\n",
    "class A { say() { print \"A\"; } }\n\
     class B : A { say() { base.say(); print \"B\"; } }\n\
     B().say();\n",
    "var xs = [10, 20, 30]; xs[1] = 99; print xs[0]; print xs[1];\n\
     var m = {\"k\": 1}; m[\"k\"] = m[\"k\"] + 1; print m[\"k\"];\n",
    "foreach (x in [1, 2, 3]) print x;\n\
     foreach (c in \"ab\") print c;\n",
    "fun describe(x: integer) -> string { return \"int\"; }\n\
     fun describe(s: string) -> string { return \"str\"; }\n\
     print describe(1); print describe(\"x\");\n",
    "class Vec2 {\n\
       var x: integer;\n\
       var y: integer;\n\
       constructor(x: integer, y: integer) { this.x = x; this.y = y; }\n\
       operator+(o: Vec2) -> Vec2 { return Vec2(this.x + o.x, this.y + o.y); }\n\
     }\n\
     var v = Vec2(1, 2) + Vec2(3, 4);\n\
     print v.x; print v.y;\n",
    "print true ? \"yes\" : \"no\"; print (1, 2);\n",
    "var total = 0;\n\
     for (var i = 0; i < 5; i = i + 1) { total = total + i; }\n\
     print total;\n",
];

#[test]
fn both_backends_agree_on_output() {
    for program in PROGRAMS {
        let (vm_code, vm_console) = run(program);
        let (classic_code, classic_console) = run_classic(program);
        assert_eq!(
            vm_code, classic_code,
            "exit codes differ for:\n{}\nvm errors: {}\nclassic errors: {}",
            program, vm_console.errors, classic_console.errors
        );
        assert_eq!(
            vm_console.written, classic_console.written,
            "stdout differs for:\n{}",
            program
        );
    }
}

#[test]
fn both_backends_agree_on_runtime_errors() {
    let programs = [
        "var zero = 0; print 1 / zero;\n",
        "var xs = [1]; print xs[9];\n",
    ];
    for program in programs {
        let (vm_code, _) = run(program);
        let (classic_code, _) = run_classic(program);
        assert_eq!(vm_code, 67, "vm should fail at runtime:\n{}", program);
        assert_eq!(
            classic_code, 67,
            "classic should fail at runtime:\n{}",
            program
        );
    }
}
