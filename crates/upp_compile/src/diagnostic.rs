//! Serialisable diagnostics for CLI and tooling output.
//!
//! Parse and semantic errors carry token ranges over the block tree;
//! tooling wants flat line/column positions over the serialised text.
//! [`collect_diagnostics`] converts a whole [`Compilation`] into
//! [`Diagnostic`] values, which serialise to JSON via serde for the
//! CLI's `--json` mode.

use rustc_hash::FxHashMap;
use serde::Serialize;
use upp_source::{BlockIndex, LineIndex, SourceCode, SourceLine, TokenIndex, TokenRange};

use crate::compile::Compilation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Parse,
    Semantic,
}

/// One diagnostic with 1-based flat text coordinates.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Diagnostic {
    /// Renders like `3:5: message` for terminal output.
    pub fn display_line(&self) -> String {
        format!("{}:{}: {}", self.line, self.column, self.message)
    }
}

/// Maps every line of the block tree to its flat line number in the
/// serialised text (1-based, in document order).
fn flat_line_numbers(code: &SourceCode) -> FxHashMap<LineIndex, usize> {
    let mut numbers = FxHashMap::default();
    let mut next = 1usize;
    fn walk(
        code: &SourceCode,
        block: BlockIndex,
        next: &mut usize,
        numbers: &mut FxHashMap<LineIndex, usize>,
    ) {
        for (index, line) in code.block(block).lines.iter().enumerate() {
            match line {
                SourceLine::Text(_) => {
                    numbers.insert(LineIndex::new(block, index), *next);
                    *next += 1;
                }
                SourceLine::BlockRef(child) => {
                    numbers.insert(LineIndex::new(block, index), *next);
                    walk(code, *child, next, numbers);
                }
            }
        }
    }
    walk(code, BlockIndex::ROOT, &mut next, &mut numbers);
    numbers
}

fn position_of(
    code: &SourceCode,
    numbers: &FxHashMap<LineIndex, usize>,
    index: TokenIndex,
    token_start: bool,
) -> (usize, usize) {
    // End-of-block markers point one past the last line; fall back to it.
    let line = numbers.get(&index.line).copied().or_else(|| {
        index.line.line.checked_sub(1).and_then(|previous| {
            numbers
                .get(&LineIndex::new(index.line.block, previous))
                .copied()
        })
    });
    let line = line.unwrap_or(1);
    if !code.line_valid(index.line) {
        return (line, 1);
    }
    let text = code.token_index_to_text_index(index, token_start);
    (line, text.character + 1)
}

/// Flattens a compilation's error lists into sorted diagnostics.
pub fn collect_diagnostics(code: &SourceCode, compilation: &Compilation) -> Vec<Diagnostic> {
    let numbers = flat_line_numbers(code);
    let mut diagnostics = Vec::new();

    let convert = |range: TokenRange| {
        let (line, column) = position_of(code, &numbers, range.start, true);
        let (end_line, end_column) = position_of(code, &numbers, range.end, false);
        (line, column, end_line, end_column)
    };

    for error in &compilation.parse.errors {
        let (line, column, end_line, end_column) = convert(error.range);
        diagnostics.push(Diagnostic {
            kind: DiagnosticKind::Parse,
            message: error.message.to_string(),
            line,
            column,
            end_line,
            end_column,
        });
    }
    for error in &compilation.semantic.errors {
        let (line, column, end_line, end_column) = convert(error.range);
        diagnostics.push(Diagnostic {
            kind: DiagnosticKind::Semantic,
            message: error.message.clone(),
            line,
            column,
            end_line,
            end_column,
        });
    }

    diagnostics.sort_by_key(|d| (d.line, d.column));
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Compiler;

    #[test]
    fn diagnostics_carry_flat_positions() {
        let (code, compilation) =
            Compiler::compile_text("main :: () -> i32\n    return foo\n", true);
        let diagnostics = collect_diagnostics(&code, &compilation);
        assert_eq!(diagnostics.len(), 1);
        let diagnostic = &diagnostics[0];
        assert_eq!(diagnostic.kind, DiagnosticKind::Semantic);
        assert_eq!(diagnostic.line, 2);
        assert!(diagnostic.message.contains("foo"));
    }

    #[test]
    fn diagnostics_serialise_to_json() {
        let (code, compilation) = Compiler::compile_text("???\n", false);
        let diagnostics = collect_diagnostics(&code, &compilation);
        assert!(!diagnostics.is_empty());
        let json = serde_json::to_string(&diagnostics).unwrap();
        assert!(json.contains("\"kind\":\"parse\""));
    }

    #[test]
    fn clean_compilation_has_no_diagnostics() {
        let (code, compilation) =
            Compiler::compile_text("main :: () -> i32\n    return 0\n", true);
        assert!(collect_diagnostics(&code, &compilation).is_empty());
    }
}
