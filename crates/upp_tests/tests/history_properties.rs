//! Source-model and history properties: inverse application, complex
//! commands, branch traversal, serialisation determinism.

use upp_base::identifier_pool;
use upp_source::{
    history::apply_change, BlockIndex, CodeHistory, LineIndex, SourceCode, TextIndex,
};

fn source(text: &str) -> SourceCode {
    SourceCode::from_text(text, identifier_pool())
}

#[test]
fn indent_change_round_trips_through_undo() {
    // Scenario: a single root line gains an indent (creating a block),
    // then undo restores the flat text and destroys the block.
    let mut code = source("x := 1\n");
    let mut history = CodeHistory::new();

    let new_position = history.add_line_indent(&mut code, LineIndex::new(BlockIndex::ROOT, 0));
    assert_eq!(code.to_text(), "    x := 1\n");
    assert!(code.block_alive(new_position.block));

    history.undo(&mut code);
    assert_eq!(code.to_text(), "x := 1\n");
    assert!(!code.block_alive(new_position.block));
}

#[test]
fn complex_command_is_one_undo_step() {
    let mut code = source("start\n");
    let mut history = CodeHistory::new();

    history.start_complex_command();
    history.insert_line_with_text(&mut code, LineIndex::new(BlockIndex::ROOT, 1), "a".into());
    history.insert_line_with_text(&mut code, LineIndex::new(BlockIndex::ROOT, 2), "b".into());
    history.stop_complex_command();
    assert_eq!(code.to_text(), "start\na\nb\n");

    history.undo(&mut code);
    assert_eq!(code.to_text(), "start\n");

    history.redo(&mut code);
    assert_eq!(code.to_text(), "start\na\nb\n");
}

#[test]
fn changes_between_crosses_an_undo_branch() {
    // e1; e2; undo; e3 — the minimal path from t0 to now must replay
    // onto the t0 snapshot and reproduce the current text.
    let mut code = source("x\n");
    let mut history = CodeHistory::new();
    let line = LineIndex::new(BlockIndex::ROOT, 0);
    let t0 = history.timestamp();
    let snapshot_text = code.to_text();

    history.insert_char(&mut code, TextIndex::new(line, 1), '1'); // e1
    history.insert_char(&mut code, TextIndex::new(line, 2), '2'); // e2
    history.undo(&mut code);
    history.insert_char(&mut code, TextIndex::new(line, 2), '3'); // e3
    let t_now = history.timestamp();

    let changes = history.changes_between(t0, t_now);
    // Minimal: e1, e3 (the undone e2 is off-path).
    assert_eq!(changes.len(), 2);

    let mut replay = source(&snapshot_text);
    for mut change in changes {
        apply_change(&mut replay, &mut change, true);
    }
    assert_eq!(replay.to_text(), code.to_text());
}

#[test]
fn apply_then_inverse_restores_original_text() {
    let text = "alpha\n    beta\n    gamma\ndelta\n";
    let mut code = source(text);
    let mut history = CodeHistory::new();

    // A mixed batch of edits touching text, lines and blocks.
    let inner = code.block(BlockIndex::ROOT).lines[1].as_block().unwrap();
    history.insert_text(
        &mut code,
        TextIndex::new(LineIndex::new(inner, 0), 4),
        "_x".into(),
    );
    history.remove_line(&mut code, LineIndex::new(inner, 1));
    history.add_line_indent(&mut code, LineIndex::new(BlockIndex::ROOT, 2));
    history.insert_line_with_text(&mut code, LineIndex::new(BlockIndex::ROOT, 0), "intro".into());
    assert_ne!(code.to_text(), text);

    for _ in 0..4 {
        history.undo(&mut code);
    }
    assert_eq!(code.to_text(), text);
}

#[test]
fn serialisation_is_deterministic_per_history_node() {
    let mut code = source("x\n");
    let mut history = CodeHistory::new();
    let line = LineIndex::new(BlockIndex::ROOT, 0);

    history.insert_char(&mut code, TextIndex::new(line, 1), 'a');
    let after_a = code.to_text();
    history.insert_char(&mut code, TextIndex::new(line, 2), 'b');

    // Walking back and forth lands on identical serialisations.
    history.undo(&mut code);
    assert_eq!(code.to_text(), after_a);
    history.redo(&mut code);
    history.undo(&mut code);
    assert_eq!(code.to_text(), after_a);
}

#[test]
fn alternative_futures_stay_reachable() {
    let mut code = source("x\n");
    let mut history = CodeHistory::new();
    let line = LineIndex::new(BlockIndex::ROOT, 0);

    history.insert_char(&mut code, TextIndex::new(line, 1), 'a');
    let t_a = history.timestamp();
    history.undo(&mut code);
    history.insert_char(&mut code, TextIndex::new(line, 1), 'b');
    let t_b = history.timestamp();

    // The 'a' future is off the redo path but reachable through BFS.
    let changes = history.changes_between(t_b, t_a);
    let mut replay = source(&code.to_text());
    for mut change in changes {
        apply_change(&mut replay, &mut change, true);
    }
    assert_eq!(replay.to_text(), "xa\n");
}

#[test]
fn remove_indent_merges_sibling_blocks_reversibly() {
    let text = "f\n    a\n    b\ng\n";
    let mut code = source(text);
    let mut history = CodeHistory::new();

    let block = code.block(BlockIndex::ROOT).lines[1].as_block().unwrap();
    history.remove_line_indent(&mut code, LineIndex::new(block, 1));
    assert_eq!(code.to_text(), "f\n    a\nb\ng\n");

    history.undo(&mut code);
    assert_eq!(code.to_text(), text);
}

#[test]
fn tokenisation_tracks_text_edits() {
    let mut code = source("x\n");
    let mut history = CodeHistory::new();
    let line = LineIndex::new(BlockIndex::ROOT, 0);

    history.insert_text(&mut code, TextIndex::new(line, 1), " := 10".into());
    code.retokenize_dirty(identifier_pool());
    assert_eq!(code.tokens_of(line).len(), 3);

    history.undo(&mut code);
    code.retokenize_dirty(identifier_pool());
    assert_eq!(code.tokens_of(line).len(), 1);
}
