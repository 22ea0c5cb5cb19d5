//! CLI round-trip tests: write a program to disk, drive the binary.

use std::process::Command;

fn upp() -> Command {
    Command::new(env!("CARGO_BIN_EXE_upp"))
}

#[test]
fn run_executes_a_program_and_prints() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hello.upp");
    std::fs::write(
        &path,
        "main :: () -> i32\n    print_i32(7)\n    print_line()\n    return 0\n",
    )
    .unwrap();

    let output = upp().arg("run").arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "7\n");
}

#[test]
fn run_surfaces_the_trap_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trap.upp");
    std::fs::write(
        &path,
        "main :: () -> i32\n    x := 1\n    y := 0\n    return x / y\n",
    )
    .unwrap();

    let output = upp().arg("run").arg(&path).output().unwrap();
    // DIV_BY_ZERO is wire code 1.
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn check_reports_errors_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.upp");
    std::fs::write(&path, "main :: () -> i32\n    return foo\n").unwrap();

    let output = upp().args(["check", "--json"]).arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    let list = parsed.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert!(list[0]["message"].as_str().unwrap().contains("foo"));
    assert_eq!(list[0]["kind"], "semantic");
}

#[test]
fn check_passes_on_a_clean_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ok.upp");
    std::fs::write(&path, "main :: () -> i32\n    return 0\n").unwrap();

    let output = upp().arg("check").arg(&path).output().unwrap();
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn build_disassembles_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dis.upp");
    std::fs::write(&path, "main :: () -> i32\n    return 0\n").unwrap();

    let output = upp()
        .args(["build", "--disassemble"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("main"));
    assert!(stdout.contains("Return"));
}

#[test]
fn missing_file_fails_cleanly() {
    let output = upp().args(["check", "does-not-exist.upp"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot read"));
}
