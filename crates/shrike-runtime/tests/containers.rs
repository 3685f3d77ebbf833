//! Lists, maps, indexing, slices, foreach and the len/clock natives

mod common;

use common::{assert_runtime_error, run_stress, stdout_of};
use pretty_assertions::assert_eq;

#[test]
fn list_and_map_indexing() {
    let out = stdout_of(
        "var xs = [10, 20, 30]; xs[1] = 99; print xs[0]; print xs[1];\n\
         var m = {\"k\": 1}; m[\"k\"] = m[\"k\"] + 1; print m[\"k\"];\n",
    );
    assert_eq!(out, "10\n99\n2\n");
}

#[test]
fn list_literal_prints_elements() {
    let out = stdout_of("print [1, 2, 3];\n");
    assert_eq!(out, "[1, 2, 3]\n");
}

#[test]
fn map_insertion_through_assignment() {
    let out = stdout_of(
        "var m = {\"a\": 1};\n\
         m[\"b\"] = 2;\n\
         print m[\"a\"]; print m[\"b\"]; print len(m);\n",
    );
    assert_eq!(out, "1\n2\n2\n");
}

#[test]
fn missing_map_key_reads_nil() {
    let out = stdout_of("var m = {\"a\": 1}; print m[\"missing\"];\n");
    assert_eq!(out, "nil\n");
}

#[test]
fn foreach_over_list() {
    let out = stdout_of("foreach (x in [1, 2, 3]) print x;\n");
    assert_eq!(out, "1\n2\n3\n");
}

#[test]
fn for_in_spelling_works_too() {
    let out = stdout_of("for (x in [4, 5]) print x;\n");
    assert_eq!(out, "4\n5\n");
}

#[test]
fn foreach_over_map_yields_keys() {
    let out = stdout_of("foreach (k in {\"a\": 1, \"b\": 2}) print k;\n");
    assert_eq!(out, "a\nb\n");
}

#[test]
fn foreach_over_string_yields_characters() {
    let out = stdout_of("foreach (c in \"abc\") print c;\n");
    assert_eq!(out, "a\nb\nc\n");
}

#[test]
fn foreach_accumulates() {
    let out = stdout_of(
        "var total = 0;\n\
         foreach (n in [1, 2, 3, 4]) { total = total + n; }\n\
         print total;\n",
    );
    assert_eq!(out, "10\n");
}

#[test]
fn slices_of_lists_and_strings() {
    let out = stdout_of(
        "var xs = [1, 2, 3, 4, 5];\n\
         print xs[1:4];\n\
         print \"shrike\"[0:3];\n",
    );
    assert_eq!(out, "[2, 3, 4]\nshr\n");
}

#[test]
fn string_indexing() {
    let out = stdout_of("print \"abc\"[1];\n");
    assert_eq!(out, "b\n");
}

#[test]
fn len_overloads() {
    let out = stdout_of(
        "print len(\"four\");\n\
         print len([1, 2]);\n\
         print len({\"a\": 1, \"b\": 2, \"c\": 3});\n",
    );
    assert_eq!(out, "4\n2\n3\n");
}

#[test]
fn clock_returns_floating() {
    // The value is time-dependent; just check it runs and is non-negative.
    let out = stdout_of("print clock() >= 0.0;\n");
    assert_eq!(out, "true\n");
}

#[test]
fn index_out_of_range_is_a_runtime_error() {
    assert_runtime_error("var xs = [1]; print xs[5];", "out of range");
    assert_runtime_error("var xs = [1]; print xs[0 - 1];", "out of range");
}

#[test]
fn slice_out_of_range_is_a_runtime_error() {
    assert_runtime_error("var xs = [1, 2]; print xs[0:5];", "out of range");
}

#[test]
fn containers_survive_stress_gc() {
    let (code, console) = run_stress(
        "var words = [\"a\", \"b\", \"c\"];\n\
         var joined = \"\";\n\
         foreach (w in words) { joined = joined + w; }\n\
         print joined;\n\
         print len(joined);\n",
    );
    assert_eq!(code, 0, "{}", console.errors);
    assert_eq!(console.written, "abc\n3\n");
}
