mod common;
use common::TestEnv;
use predicates::prelude::*;

#[test]
fn add_then_list() {
    let t = TestEnv::new();
    let a = t.add("alpha one");
    t.bin()
        .args(["add", "bravo two"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("added "));
    assert_eq!(t.previews(), ["bravo two", "alpha one"]);

    let items = t.list_json();
    assert_eq!(items[1]["id"].to_string(), a);
    assert_eq!(items[1]["content_type"], "text");

    t.bin()
        .args(["list", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bravo two").and(predicate::str::contains("alpha").not()));
}

#[test]
fn adding_the_same_text_keeps_one_entry() {
    let t = TestEnv::new();
    let first = t.add("same");
    t.add("other");
    let again = t.add("same");
    assert_eq!(first, again);
    assert_eq!(t.previews(), ["same", "other"]);
}

#[test]
fn search_filters_case_insensitively() {
    let t = TestEnv::new();
    t.add("hello world");
    t.add("foo bar");
    t.bin()
        .args(["search", "WORLD"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world").and(predicate::str::contains("foo bar").not()));
    let out = t
        .bin()
        .args(["search", "xyz", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(v.as_array().unwrap().is_empty());
}

#[test]
fn empty_input_is_rejected() {
    let t = TestEnv::new();
    t.bin().arg("add").write_stdin("").assert().failure();
    assert!(t.list_json().is_empty());
}
