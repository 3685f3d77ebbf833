//! End-to-end runs of the `shrike` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn script(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp script");
    file.write_all(source.as_bytes()).expect("write script");
    file
}

fn shrike() -> Command {
    Command::cargo_bin("shrike").expect("binary built")
}

#[test]
fn runs_a_file_and_prints() {
    let file = script("print 1 + 2;\n");
    shrike()
        .arg("--file")
        .arg(file.path())
        .assert()
        .success()
        .stdout("3\n");
}

#[test]
fn short_flag_works() {
    let file = script("print \"ok\";\n");
    shrike()
        .arg("-f")
        .arg(file.path())
        .assert()
        .success()
        .stdout("ok\n");
}

#[test]
fn compile_error_exits_65() {
    let file = script("return 1;\n");
    shrike()
        .arg("--file")
        .arg(file.path())
        .assert()
        .code(65)
        .stderr(predicate::str::contains(
            "Return statement in none-function scoop.",
        ));
}

#[test]
fn runtime_error_exits_67() {
    let file = script("var zero = 0; print 1 / zero;\n");
    shrike()
        .arg("--file")
        .arg(file.path())
        .assert()
        .code(67)
        .stderr(predicate::str::contains("Divide by zero."));
}

#[test]
fn missing_file_exits_1() {
    shrike()
        .arg("--file")
        .arg("definitely/not/a/real/path.shk")
        .assert()
        .code(1);
}

#[test]
fn unknown_flag_exits_1() {
    shrike().arg("--definitely-not-a-flag").assert().code(1);
}

#[test]
fn help_exits_0() {
    shrike()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--classic"));
}

#[test]
fn classic_backend_matches_vm_output() {
    let source = "fun makeCounter() { var c = 0; fun inc() { c = c + 1; return c; } return inc; }\n\
                  var k = makeCounter(); print k(); print k();\n";
    let file = script(source);

    let vm = shrike().arg("--file").arg(file.path()).output().unwrap();
    let classic = shrike()
        .arg("--classic")
        .arg("--file")
        .arg(file.path())
        .output()
        .unwrap();

    assert_eq!(vm.status.code(), Some(0));
    assert_eq!(classic.status.code(), Some(0));
    assert_eq!(vm.stdout, classic.stdout);
    assert_eq!(String::from_utf8_lossy(&vm.stdout), "1\n2\n");
}

#[test]
fn show_ast_dumps_tree() {
    let file = script("print 1 + 2;\n");
    shrike()
        .arg("--show-ast")
        .arg("--file")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("(print (+ 1 2))"));
}

#[test]
fn show_assembly_dumps_chunks() {
    let file = script("print 1;\n");
    shrike()
        .arg("--show-assembly")
        .arg("--file")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("== <script> =="));
}

#[test]
fn stress_gc_does_not_change_output() {
    let source = "var parts = [\"a\", \"b\", \"c\"];\n\
                  var joined = \"\";\n\
                  foreach (p in parts) { joined = joined + p; }\n\
                  print joined;\n";
    let file = script(source);
    shrike()
        .arg("--stress-gc")
        .arg("--file")
        .arg(file.path())
        .assert()
        .success()
        .stdout("abc\n");
}
