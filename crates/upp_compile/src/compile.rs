//! The editor-facing compiler facade.
//!
//! [`Compiler::compile`] runs the whole pipeline over a source tree:
//! re-tokenise dirty lines, parse, analyse, and — when requested and
//! error-free — generate the intermediate program and bytecode. The
//! returned [`Compilation`] owns every artefact (AST, symbol tables,
//! types, IR, bytecode); dropping it tears them down together.
//!
//! The navigation helpers ([`find_node_at`], [`find_symbol_table_at`],
//! [`resolve_symbol`]) back the editor's context info and
//! jump-to-definition features.

use upp_base::{identifier_pool, Ident};
use upp_language::ast::NodeId;
use upp_language::parser::ParseResult;
use upp_source::{SourceCode, TextIndex};

use crate::analysis::{analyse, SemanticInfo};
use crate::bytecode::{self, BytecodeProgram};
use crate::hardcoded::Host;
use crate::interpreter::{ExitCode, Interpreter};
use crate::ir::{self, IrProgram};
use crate::symbols::{SymbolId, TableId};
use crate::types::{Primitive, Type};

/// All artefacts of one compilation.
pub struct Compilation {
    pub parse: ParseResult,
    pub semantic: SemanticInfo,
    pub ir: Option<IrProgram>,
    pub program: Option<BytecodeProgram>,
}

impl Compilation {
    /// True when parsing and analysis produced no errors.
    pub fn is_clean(&self) -> bool {
        self.parse.errors.is_empty() && self.semantic.errors.is_empty()
    }
}

/// Stateless pipeline driver; all state lives in the [`Compilation`].
pub struct Compiler;

impl Compiler {
    /// Compiles a source tree. With `should_build`, bytecode is
    /// generated when the error list stays empty.
    pub fn compile(code: &mut SourceCode, should_build: bool) -> Compilation {
        code.retokenize_dirty(identifier_pool());

        let parse = upp_language::parse(code);
        let mut semantic = analyse(&parse.ast, parse.root);

        if should_build {
            Self::check_entry_point(&parse, &mut semantic);
        }

        let (ir, program) = if should_build
            && parse.errors.is_empty()
            && semantic.errors.is_empty()
        {
            let main = semantic.main_function.expect("checked above");
            let ir_program = ir::generate_program(&parse.ast, &semantic);
            let program = bytecode::generate(&ir_program, &semantic, main);
            (Some(ir_program), Some(program))
        } else {
            (None, None)
        };

        Compilation {
            parse,
            semantic,
            ir,
            program,
        }
    }

    /// Convenience for flat text input.
    pub fn compile_text(text: &str, should_build: bool) -> (SourceCode, Compilation) {
        let mut code = SourceCode::from_text(text, identifier_pool());
        let compilation = Self::compile(&mut code, should_build);
        (code, compilation)
    }

    fn check_entry_point(parse: &ParseResult, semantic: &mut SemanticInfo) {
        let Some(main) = semantic.main_function else {
            if semantic.errors.is_empty() && parse.errors.is_empty() {
                let range = parse.ast.node(parse.root).range;
                semantic.errors.push(crate::analysis::SemanticError {
                    message: "no 'main' function defined".to_string(),
                    range,
                    secondary: Vec::new(),
                });
            }
            return;
        };
        let signature = semantic.expr_types[&main];
        if let Type::Function(f) = semantic.types.ty(signature) {
            let void = semantic.types.primitive(Primitive::Void);
            let i32_ty = semantic.types.primitive(Primitive::I32);
            if !f.parameters.is_empty() || (f.return_type != void && f.return_type != i32_ty) {
                let range = parse.ast.node(main).range;
                semantic.errors.push(crate::analysis::SemanticError {
                    message: "'main' must take no parameters and return i32 or nothing"
                        .to_string(),
                    range,
                    secondary: Vec::new(),
                });
            }
        }
    }

    /// Runs a built program to completion.
    pub fn execute(program: &BytecodeProgram, host: &mut dyn Host) -> ExitCode {
        let mut interpreter = Interpreter::new(program, host);
        let exit = interpreter.run();
        log::debug!("execution finished: {exit}");
        exit
    }

    /// Runs a built program and also returns `main`'s i32 result.
    pub fn execute_with_result(program: &BytecodeProgram, host: &mut dyn Host) -> (ExitCode, i32) {
        let mut interpreter = Interpreter::new(program, host);
        let exit = interpreter.run();
        let value = interpreter.return_value_i32();
        (exit, value)
    }
}

/// The deepest AST node covering a text position.
pub fn find_node_at(
    compilation: &Compilation,
    code: &SourceCode,
    position: TextIndex,
) -> Option<NodeId> {
    let token = code.text_index_to_token_index(position, false);
    compilation
        .parse
        .ast
        .find_node_at(compilation.parse.root, code, token)
}

/// The symbol table of the innermost scope covering a text position.
pub fn find_symbol_table_at(
    compilation: &Compilation,
    code: &SourceCode,
    position: TextIndex,
) -> TableId {
    let mut node = find_node_at(compilation, code, position);
    while let Some(current) = node {
        if let Some(&table) = compilation.semantic.node_tables.get(&current) {
            return table;
        }
        node = compilation.parse.ast.node(current).parent;
    }
    compilation.semantic.tables.root()
}

/// Resolves an identifier against a table (with parent fallback).
pub fn resolve_symbol(
    semantic: &SemanticInfo,
    table: TableId,
    name: Ident,
) -> Option<SymbolId> {
    semantic.tables.lookup(table, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardcoded::BufferedHost;
    use upp_source::{BlockIndex, LineIndex};

    fn run(source: &str) -> (ExitCode, i32, String) {
        let (_, compilation) = Compiler::compile_text(source, true);
        assert!(
            compilation.is_clean(),
            "unexpected errors: parse={:?} semantic={:?}",
            compilation.parse.errors,
            compilation
                .semantic
                .errors
                .iter()
                .map(|e| &e.message)
                .collect::<Vec<_>>()
        );
        let program = compilation.program.expect("built");
        let mut host = BufferedHost::default();
        let (exit, value) = Compiler::execute_with_result(&program, &mut host);
        (exit, value, host.output)
    }

    #[test]
    fn trivial_function_compiles_and_returns_zero() {
        let (exit, value, _) = run("main :: () -> i32\n    return 0\n");
        assert_eq!(exit, ExitCode::Success);
        assert_eq!(value, 0);
    }

    #[test]
    fn arithmetic_and_locals() {
        let (exit, value, _) = run(
            "main :: () -> i32\n    x := 10\n    y := 4\n    return x * y + 2\n",
        );
        assert_eq!(exit, ExitCode::Success);
        assert_eq!(value, 42);
    }

    #[test]
    fn division_by_zero_traps() {
        let (_, compilation) = Compiler::compile_text(
            "main :: () -> i32\n    x := 10\n    y := 0\n    return x / y\n",
            true,
        );
        assert!(compilation.is_clean());
        let mut host = BufferedHost::default();
        let exit = Compiler::execute(compilation.program.as_ref().unwrap(), &mut host);
        assert_eq!(exit, ExitCode::DivByZero);
    }

    #[test]
    fn unresolved_symbol_reports_and_skips_codegen() {
        let (_, compilation) =
            Compiler::compile_text("main :: () -> i32\n    return foo\n", true);
        assert_eq!(compilation.semantic.errors.len(), 1);
        assert!(compilation.semantic.errors[0]
            .message
            .contains("unresolved identifier 'foo'"));
        assert!(compilation.program.is_none());
    }

    #[test]
    fn missing_main_is_reported_on_build() {
        let (_, compilation) = Compiler::compile_text("helper :: () -> i32\n    return 1\n", true);
        assert!(compilation
            .semantic
            .errors
            .iter()
            .any(|e| e.message.contains("no 'main'")));
    }

    #[test]
    fn check_only_does_not_require_main() {
        let (_, compilation) =
            Compiler::compile_text("helper :: () -> i32\n    return 1\n", false);
        assert!(compilation.is_clean());
        assert!(compilation.program.is_none());
    }

    #[test]
    fn if_else_control_flow() {
        let source = "\
main :: () -> i32
    x := 7
    if x > 5
        return 1
    else
        return 2
";
        let (exit, value, _) = run(source);
        assert_eq!(exit, ExitCode::Success);
        assert_eq!(value, 1);
    }

    #[test]
    fn while_loop_accumulates() {
        let source = "\
main :: () -> i32
    sum := 0
    i := 0
    while i < 5
        sum += i
        i += 1
    return sum
";
        let (exit, value, _) = run(source);
        assert_eq!(exit, ExitCode::Success);
        assert_eq!(value, 10);
    }

    #[test]
    fn function_calls_pass_arguments() {
        let source = "\
add :: (a: i32, b: i32) -> i32
    return a + b
main :: () -> i32
    return add(40, 2)
";
        let (exit, value, _) = run(source);
        assert_eq!(exit, ExitCode::Success);
        assert_eq!(value, 42);
    }

    #[test]
    fn recursion_terminates() {
        let source = "\
fib :: (n: i32) -> i32
    if n < 2
        return n
    return fib(n - 1) + fib(n - 2)
main :: () -> i32
    return fib(10)
";
        let (exit, value, _) = run(source);
        assert_eq!(exit, ExitCode::Success);
        assert_eq!(value, 55);
    }

    #[test]
    fn print_builtins_write_to_host() {
        let source = "\
main :: () -> i32
    print_i32(42)
    print_line()
    print_bool(true)
    return 0
";
        let (exit, _, output) = run(source);
        assert_eq!(exit, ExitCode::Success);
        assert_eq!(output, "42\ntrue");
    }

    #[test]
    fn comptime_definition_folds_through_function_call() {
        let source = "\
double :: (x: i32) -> i32
    return x * 2
ANSWER :: double(21)
main :: () -> i32
    return ANSWER
";
        let (exit, value, _) = run(source);
        assert_eq!(exit, ExitCode::Success);
        assert_eq!(value, 42);
    }

    #[test]
    fn find_node_at_locates_identifier() {
        let (code, compilation) =
            Compiler::compile_text("main :: () -> i32\n    return 0\n", false);
        let position = TextIndex::new(LineIndex::new(BlockIndex::ROOT, 0), 1);
        let node = find_node_at(&compilation, &code, position);
        assert!(node.is_some());
    }

    #[test]
    fn find_symbol_table_at_returns_function_scope() {
        let (code, compilation) =
            Compiler::compile_text("main :: () -> i32\n    x := 1\n    return x\n", false);
        let body = code.block(BlockIndex::ROOT).lines[1].as_block().unwrap();
        let position = TextIndex::new(LineIndex::new(body, 1), 0);
        let table = find_symbol_table_at(&compilation, &code, position);
        let x = identifier_pool().intern("x");
        assert!(resolve_symbol(&compilation.semantic, table, x).is_some());
    }
}
