//! Runs the `tern` binary end to end: input and output selection, `--emit`
//! modes, directory compilation and exit status.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

const FACTORIAL: &str = "fn factorial(n: int) -> int:\n    if n <= 1:\n        return 1\n    return n * factorial(n - 1)\nprint(factorial(5))\n";

fn tern() -> Command {
    Command::cargo_bin("tern").expect("binary exists")
}

#[test]
fn compiles_file_to_assembly() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("fact.tern");
    fs::write(&input_path, FACTORIAL).expect("write input");
    let output_path = dir.path().join("out/fact.s");

    tern()
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let asm = fs::read_to_string(&output_path).expect("read assembly");
    assert!(asm.contains("\nmain:\n"));
    assert!(asm.contains("call tern_fn_factorial"));
}

#[test]
fn reads_stdin_and_writes_stdout() {
    tern()
        .write_stdin("print(5 + 2 * 3)\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("call tern_print_int@PLT"))
        .stdout(predicate::str::contains(".note.GNU-stack"));
}

#[test]
fn naive_allocation_avoids_callee_saved_registers() {
    tern()
        .arg("--regalloc")
        .arg("naive")
        .write_stdin(FACTORIAL)
        .assert()
        .success()
        .stdout(predicate::str::contains("%rbx").not());
}

#[test]
fn emits_tokens_and_ast() {
    tern()
        .args(["--emit", "tokens"])
        .write_stdin("if x:\n    pass\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Indent"))
        .stdout(predicate::str::contains("Dedent"));

    tern()
        .args(["--emit", "ast"])
        .write_stdin("let y = 5 + 2 * 3\n")
        .assert()
        .success()
        .stdout("(let y (+ 5 (* 2 3)))\n");
}

#[test]
fn reports_diagnostics_with_positions() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("bad.tern");
    fs::write(&input_path, "let x = 1\nx = 2.5\n").expect("write input");

    tern()
        .arg("-i")
        .arg(&input_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad.tern:2:5: error[E0302]"))
        .stderr(predicate::str::contains("semantic analysis failed"));
}

#[test]
fn warnings_do_not_fail_the_build() {
    tern()
        .write_stdin("fn f() -> int:\n    return 1\n    print(2)\nprint(f())\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("tern_fn_f:"))
        .stderr(predicate::str::contains("<stdin>:3:5: warning[W0301]"));
}

#[test]
fn compiles_a_directory_of_units() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("a.tern"), "print(1)\n").expect("write a");
    fs::create_dir_all(dir.path().join("nested")).expect("nested dir");
    fs::write(dir.path().join("nested/b.tern"), FACTORIAL).expect("write b");
    fs::write(dir.path().join("notes.txt"), "not a unit").expect("write notes");

    tern().arg("--input").arg(dir.path()).assert().success();

    assert!(dir.path().join("a.s").exists());
    assert!(dir.path().join("nested/b.s").exists());
    assert!(!dir.path().join("notes.s").exists());
}

#[test]
fn compiles_more_units_than_workers() {
    let dir = tempdir().expect("tempdir");
    for i in 0..40 {
        fs::write(dir.path().join(format!("unit{i}.tern")), format!("print({i})\n"))
            .expect("write unit");
    }

    tern().arg("--input").arg(dir.path()).assert().success();

    for i in 0..40 {
        assert!(dir.path().join(format!("unit{i}.s")).exists(), "unit{i}.s missing");
    }
}

#[test]
fn directory_failures_are_reported_per_unit() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("good.tern"), "print(1)\n").expect("write good");
    fs::write(dir.path().join("bad.tern"), "print(missing)\n").expect("write bad");

    tern()
        .arg("--input")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("E0301"))
        .stderr(predicate::str::contains("1 of 2 units failed"));

    assert!(dir.path().join("good.s").exists());
    assert!(!dir.path().join("bad.s").exists());
}

#[test]
fn directory_input_rejects_an_output_file() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("a.tern"), "print(1)\n").expect("write a");

    tern()
        .arg("--input")
        .arg(dir.path())
        .arg("--output")
        .arg(dir.path().join("all.s"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("--output cannot be combined"));
}

#[test]
fn reports_missing_input_file() {
    let dir = tempdir().expect("tempdir");
    tern()
        .arg("--input")
        .arg(dir.path().join("missing.tern"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read input file"));
}
