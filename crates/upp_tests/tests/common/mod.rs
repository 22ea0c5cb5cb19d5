//! Shared helpers for the end-to-end suites.

use upp_compile::{BufferedHost, Compiler, ExitCode};

/// Compiles and runs a program, asserting a clean compile. Returns the
/// exit code, `main`'s i32 result and the captured output.
pub fn run_program(source: &str) -> (ExitCode, i32, String) {
    run_program_with_host(source, BufferedHost::default())
}

pub fn run_program_with_host(source: &str, mut host: BufferedHost) -> (ExitCode, i32, String) {
    let (_, compilation) = Compiler::compile_text(source, true);
    assert!(
        compilation.is_clean(),
        "unexpected errors:\nparse: {:?}\nsemantic: {:?}",
        compilation.parse.errors,
        compilation
            .semantic
            .errors
            .iter()
            .map(|e| e.message.clone())
            .collect::<Vec<_>>()
    );
    let program = compilation.program.expect("bytecode was built");
    let (exit, value) = Compiler::execute_with_result(&program, &mut host);
    (exit, value, host.output)
}

/// Asserts the program runs to SUCCESS and returns `expected`.
pub fn assert_returns(source: &str, expected: i32) {
    let (exit, value, _) = run_program(source);
    assert_eq!(exit, ExitCode::Success, "program trapped");
    assert_eq!(value, expected);
}

/// Asserts the program runs to SUCCESS and prints `expected`.
pub fn assert_prints(source: &str, expected: &str) {
    let (exit, _, output) = run_program(source);
    assert_eq!(exit, ExitCode::Success, "program trapped");
    assert_eq!(output, expected);
}

/// Asserts the program compiles cleanly but traps with `expected`.
pub fn assert_traps(source: &str, expected: ExitCode) {
    let (_, compilation) = Compiler::compile_text(source, true);
    assert!(
        compilation.is_clean(),
        "unexpected errors: {:?}",
        compilation
            .semantic
            .errors
            .iter()
            .map(|e| e.message.clone())
            .collect::<Vec<_>>()
    );
    let program = compilation.program.expect("bytecode was built");
    let mut host = BufferedHost::default();
    let exit = Compiler::execute(&program, &mut host);
    assert_eq!(exit, expected);
}

/// Compiles with `should_build` and returns all error messages.
pub fn compile_errors(source: &str) -> Vec<String> {
    let (_, compilation) = Compiler::compile_text(source, true);
    let mut messages: Vec<String> = compilation
        .parse
        .errors
        .iter()
        .map(|e| e.message.to_string())
        .collect();
    messages.extend(compilation.semantic.errors.iter().map(|e| e.message.clone()));
    messages
}

/// Asserts at least one error message contains `needle`.
pub fn assert_error_containing(source: &str, needle: &str) {
    let messages = compile_errors(source);
    assert!(
        messages.iter().any(|m| m.contains(needle)),
        "no error containing {needle:?} in {messages:?}"
    );
}
