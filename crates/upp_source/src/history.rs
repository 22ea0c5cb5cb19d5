//! Edit history: atomic changes and the undo/redo DAG.
//!
//! Every mutation of the source is one of four atomic changes
//! ([`CodeChange`]); reversing a change's `apply_forwards` flag performs
//! the inverse operation. User-visible edits (remove line, add indent,
//! split block) are composed from the primitives under a *complex
//! command* bracket and undone/redone as a unit.
//!
//! History nodes form an append-only DAG rooted at node 0. Editing after
//! an undo does not discard the undone future: the old child moves onto
//! the new node's `alt` sibling list and stays reachable, both for redo
//! bookkeeping and for [`CodeHistory::changes_between`], which finds the
//! minimal change sequence between two timestamps by breadth-first search
//! over the undirected interpretation of the DAG.

use std::collections::VecDeque;

use crate::source::{BlockIndex, LineIndex, SourceCode, TextIndex};

/// One of the four atomic source mutations.
///
/// `BlockInsert` and `BlockMerge` re-record the ids they create each time
/// they are applied, so a redo after an undo stays consistent even though
/// block ids are not recycled.
#[derive(Debug, Clone)]
pub enum CodeChange {
    /// Insert an empty text line at `line`.
    LineInsert { line: LineIndex },
    /// Insert a reference line to a fresh empty block at `line`.
    BlockInsert { line: LineIndex, block: BlockIndex },
    /// Append all lines of `from` onto `into` and remove `from`.
    BlockMerge {
        from: BlockIndex,
        into: BlockIndex,
        /// Size of `into` before the merge, the split point on inversion.
        into_line_count: usize,
        /// Where `from`'s reference line lived, for re-creation.
        from_line: LineIndex,
    },
    /// Insert `text` (never containing `\n`) into one text line.
    TextInsert { index: TextIndex, text: String },
}

/// A change plus its direction flag.
#[derive(Debug, Clone)]
pub struct Change {
    pub change: CodeChange,
    pub apply_forwards: bool,
}

impl Change {
    pub fn forwards(change: CodeChange) -> Change {
        Change {
            change,
            apply_forwards: true,
        }
    }

    pub fn backwards(change: CodeChange) -> Change {
        Change {
            change,
            apply_forwards: false,
        }
    }

    /// The same change with its direction flipped.
    pub fn inverted(&self) -> Change {
        Change {
            change: self.change.clone(),
            apply_forwards: !self.apply_forwards,
        }
    }
}

/// Applies `change` to `code`. `forwards == false` undoes it.
pub fn apply_change(code: &mut SourceCode, change: &mut Change, forwards: bool) {
    let forward = forwards == change.apply_forwards;
    match &mut change.change {
        CodeChange::LineInsert { line } => {
            if forward {
                code.insert_empty_line(*line);
            } else {
                debug_assert!(
                    code.text_line(*line).text.is_empty(),
                    "a removed line must have been cleared first"
                );
                code.remove_line(*line);
            }
        }
        CodeChange::BlockInsert { line, block } => {
            if forward {
                *block = code.insert_empty_block(*line);
            } else {
                *line = code.remove_empty_block(*block);
            }
        }
        CodeChange::BlockMerge {
            from,
            into,
            into_line_count,
            from_line,
        } => {
            if forward {
                *into_line_count = code.line_count(*into);
                *from_line = code.block_ref_line(*from);
                code.append_block_lines(*from, *into);
                code.remove_empty_block(*from);
            } else {
                let restored = code.insert_empty_block(*from_line);
                code.move_tail_lines(*into, *into_line_count, restored);
                *from = restored;
            }
        }
        CodeChange::TextInsert { index, text } => {
            let line = code.text_line_mut(index.line);
            if forward {
                line.text.insert_str(index.character, text);
            } else {
                line.text
                    .drain(index.character..index.character + text.len());
            }
            line.dirty = true;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryNodeKind {
    Normal,
    ComplexStart,
    ComplexEnd,
}

#[derive(Debug)]
struct HistoryNode {
    kind: HistoryNodeKind,
    /// `None` only for the root node.
    change: Option<Change>,
    prev: Option<usize>,
    /// Child chosen by the most recent redo path.
    next: Option<usize>,
    /// Sibling list for alternative futures created by edits after undo.
    alt: Option<usize>,
    complex_partner: Option<usize>,
    cursor: Option<TextIndex>,
}

/// A point in history, identified by its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryTimestamp {
    pub node_index: usize,
}

/// The undo/redo DAG over one [`SourceCode`].
pub struct CodeHistory {
    nodes: Vec<HistoryNode>,
    current: usize,
    complex_level: u32,
    complex_start: usize,
}

impl CodeHistory {
    pub fn new() -> CodeHistory {
        let root = HistoryNode {
            kind: HistoryNodeKind::Normal,
            change: None,
            prev: None,
            next: None,
            alt: None,
            complex_partner: None,
            cursor: Some(TextIndex::new(LineIndex::new(BlockIndex::ROOT, 0), 0)),
        };
        CodeHistory {
            nodes: vec![root],
            current: 0,
            complex_level: 0,
            complex_start: 0,
        }
    }

    /// Drops all recorded history, keeping the source as-is.
    pub fn reset(&mut self) {
        *self = CodeHistory::new();
    }

    /// Appends a node after `current`, applies the change forwards and
    /// moves `current` onto it. An existing redo child becomes the new
    /// node's `alt` sibling.
    pub fn insert_and_apply(&mut self, code: &mut SourceCode, change: Change) -> usize {
        let index = self.nodes.len();
        let mut node = HistoryNode {
            kind: HistoryNodeKind::Normal,
            change: Some(change),
            prev: Some(self.current),
            next: None,
            alt: None,
            complex_partner: None,
            cursor: None,
        };
        node.alt = self.nodes[self.current].next;
        self.nodes[self.current].next = Some(index);
        self.nodes.push(node);
        self.current = index;

        // Apply through the stored change so created block ids are
        // re-recorded in place.
        let mut change = self.nodes[index].change.take().unwrap();
        apply_change(code, &mut change, true);
        self.nodes[index].change = Some(change);
        index
    }

    /// Reverts the change at `current` and steps backwards; a complex
    /// command is reverted as a whole.
    pub fn undo(&mut self, code: &mut SourceCode) {
        assert!(
            self.complex_level == 0,
            "cannot undo inside a complex command"
        );
        if self.current == 0 {
            return;
        }

        match self.nodes[self.current].kind {
            HistoryNodeKind::ComplexStart => panic!("current node cannot be a complex start"),
            HistoryNodeKind::Normal => {
                self.revert_current(code);
            }
            HistoryNodeKind::ComplexEnd => {
                let target = self.nodes[self.current].complex_partner.expect("paired");
                while self.current != target {
                    assert!(self.current != 0);
                    self.revert_current(code);
                }
                assert!(self.current != 0, "complex cannot start at the root");
                self.revert_current(code);
            }
        }
        #[cfg(debug_assertions)]
        self.sanity_check(code);
    }

    fn revert_current(&mut self, code: &mut SourceCode) {
        let mut change = self.nodes[self.current].change.take().unwrap();
        apply_change(code, &mut change, false);
        self.nodes[self.current].change = Some(change);
        self.current = self.nodes[self.current].prev.expect("non-root");
    }

    /// Re-applies the change on the `next` path, if any; a complex command
    /// is re-applied as a whole.
    pub fn redo(&mut self, code: &mut SourceCode) {
        assert!(
            self.complex_level == 0,
            "cannot redo inside a complex command"
        );
        let Some(next) = self.nodes[self.current].next else {
            return;
        };
        self.current = next;

        match self.nodes[self.current].kind {
            HistoryNodeKind::ComplexEnd => panic!("redo cannot land on a complex end"),
            HistoryNodeKind::Normal => {
                self.apply_current(code);
            }
            HistoryNodeKind::ComplexStart => {
                let target = self.nodes[self.current].complex_partner.expect("paired");
                while self.current != target {
                    self.apply_current(code);
                    self.current = self.nodes[self.current].next.expect("complex is linear");
                }
                self.apply_current(code);
            }
        }
        #[cfg(debug_assertions)]
        self.sanity_check(code);
    }

    fn apply_current(&mut self, code: &mut SourceCode) {
        let mut change = self.nodes[self.current].change.take().unwrap();
        apply_change(code, &mut change, true);
        self.nodes[self.current].change = Some(change);
    }

    /// Opens a complex-command bracket. Brackets nest by reference count.
    pub fn start_complex_command(&mut self) {
        if self.complex_level == 0 {
            self.complex_start = self.current;
        }
        self.complex_level += 1;
    }

    /// Closes a complex-command bracket. On the outermost close the first
    /// and last recorded nodes are paired; brackets that recorded fewer
    /// than two changes are elided.
    pub fn stop_complex_command(&mut self) {
        assert!(self.complex_level > 0, "unbalanced complex command");
        self.complex_level -= 1;
        if self.complex_level > 0 {
            return;
        }

        let first = self.nodes[self.complex_start].next;
        let Some(first) = first else {
            return;
        };
        if first == self.current {
            return;
        }

        assert!(self.current > first, "complex ranges grow forwards");
        self.nodes[first].kind = HistoryNodeKind::ComplexStart;
        self.nodes[first].complex_partner = Some(self.current);
        self.nodes[self.current].kind = HistoryNodeKind::ComplexEnd;
        self.nodes[self.current].complex_partner = Some(first);
    }

    /// Records the user-visible cursor on the current node, first write
    /// wins.
    pub fn set_cursor(&mut self, cursor: TextIndex) {
        let node = &mut self.nodes[self.current];
        if node.cursor.is_none() {
            node.cursor = Some(cursor);
        }
    }

    /// The cursor recorded on the current node, if any.
    pub fn cursor_pos(&self) -> Option<TextIndex> {
        self.nodes[self.current].cursor
    }

    // ------------------------------------------------------------------
    // Compound edit commands
    // ------------------------------------------------------------------

    /// Inserts text into one line. No-op for the empty string.
    pub fn insert_text(&mut self, code: &mut SourceCode, index: TextIndex, text: String) {
        if text.is_empty() {
            return;
        }
        assert!(!text.contains('\n'), "text inserts are single-line");
        self.insert_and_apply(code, Change::forwards(CodeChange::TextInsert { index, text }));
    }

    /// Deletes `[index.character, char_end)` of one line.
    pub fn delete_text(&mut self, code: &mut SourceCode, index: TextIndex, char_end: usize) {
        if index.character == char_end {
            return;
        }
        let text = code.text_line(index.line).text[index.character..char_end].to_string();
        self.insert_and_apply(
            code,
            Change::backwards(CodeChange::TextInsert { index, text }),
        );
    }

    pub fn insert_char(&mut self, code: &mut SourceCode, index: TextIndex, c: char) {
        self.insert_text(code, index, c.to_string());
    }

    pub fn delete_char(&mut self, code: &mut SourceCode, index: TextIndex) {
        let line = code.text_line(index.line);
        let next = line.text[index.character..]
            .chars()
            .next()
            .map(|c| index.character + c.len_utf8())
            .unwrap_or(index.character);
        self.delete_text(code, index, next);
    }

    /// Inserts an empty line.
    pub fn insert_line(&mut self, code: &mut SourceCode, line: LineIndex) {
        self.insert_and_apply(code, Change::forwards(CodeChange::LineInsert { line }));
    }

    /// Inserts a line carrying `text`.
    pub fn insert_line_with_text(&mut self, code: &mut SourceCode, line: LineIndex, text: String) {
        self.start_complex_command();
        self.insert_line(code, line);
        self.insert_text(code, TextIndex::new(line, 0), text);
        self.stop_complex_command();
    }

    /// Removes a text line: clears its text (so undo restores it), removes
    /// it, merges block references that fall together, prunes blocks that
    /// became empty up to the root and re-seeds an empty root.
    pub fn remove_line(&mut self, code: &mut SourceCode, line: LineIndex) {
        self.start_complex_command();

        assert!(code.line_valid(line), "invalid line index {line}");
        let len = code.text_line(line).text.len();
        if len != 0 {
            self.delete_text(code, TextIndex::new(line, 0), len);
        }
        self.insert_and_apply(code, Change::backwards(CodeChange::LineInsert { line }));

        if line.line >= 1 {
            self.merge_adjacent_blocks(code, LineIndex::new(line.block, line.line - 1));
        }

        // Prune empty blocks towards the root.
        let mut block = line.block;
        while !block.is_root() {
            let parent = code.block(block).parent.expect("non-root block has parent");
            if !code.block(block).lines.is_empty() {
                break;
            }
            self.remove_block(code, block);
            block = parent;
        }

        if code.line_count(BlockIndex::ROOT) == 0 {
            self.insert_line(code, LineIndex::new(BlockIndex::ROOT, 0));
        }

        self.stop_complex_command();
        #[cfg(debug_assertions)]
        code.sanity_check();
    }

    /// Moves a line's text to another position (in a different block).
    pub fn move_line(&mut self, code: &mut SourceCode, from: LineIndex, to: LineIndex) {
        assert!(from.block != to.block, "move within a block shifts indices");
        self.start_complex_command();
        let text = code.text_line(from).text.clone();
        self.insert_line_with_text(code, to, text);
        self.remove_line(code, from);
        self.stop_complex_command();
    }

    /// Indents a line by one level: it moves to the end of a preceding
    /// sibling block, the start of a following one, or into a freshly
    /// created block. Returns the line's new position.
    pub fn add_line_indent(&mut self, code: &mut SourceCode, line: LineIndex) -> LineIndex {
        self.start_complex_command();

        let prev_block = if line.line >= 1 {
            code.line(LineIndex::new(line.block, line.line - 1)).as_block()
        } else {
            None
        };
        let next_block = if line.line + 1 < code.line_count(line.block) {
            code.line(LineIndex::new(line.block, line.line + 1)).as_block()
        } else {
            None
        };

        let (source_line, target) = if let Some(prev) = prev_block {
            (line, LineIndex::new(prev, code.line_count(prev)))
        } else if let Some(next) = next_block {
            (line, LineIndex::new(next, 0))
        } else {
            let created = self.insert_block(code, line);
            // The reference line shifted the original down by one.
            (
                LineIndex::new(line.block, line.line + 1),
                LineIndex::new(created, 0),
            )
        };

        self.move_line(code, source_line, target);
        self.stop_complex_command();
        #[cfg(debug_assertions)]
        code.sanity_check();
        target
    }

    /// Un-indents a line by one level, splitting its block when the line
    /// sits in the middle. Returns the line's new position; a line already
    /// at root level stays put.
    pub fn remove_line_indent(&mut self, code: &mut SourceCode, line: LineIndex) -> LineIndex {
        if line.block.is_root() {
            return line;
        }
        self.start_complex_command();

        let block = line.block;
        let count = code.line_count(block);
        let ref_line = code.block_ref_line(block);
        let target = if line.line == 0 {
            ref_line
        } else if line.line == count - 1 {
            LineIndex::new(ref_line.block, ref_line.line + 1)
        } else {
            self.split_block(code, block, line.line + 1);
            LineIndex::new(ref_line.block, ref_line.line + 1)
        };

        self.move_line(code, line, target);
        self.stop_complex_command();
        #[cfg(debug_assertions)]
        code.sanity_check();
        target
    }

    fn insert_block(&mut self, code: &mut SourceCode, line: LineIndex) -> BlockIndex {
        let index = self.insert_and_apply(
            code,
            Change::forwards(CodeChange::BlockInsert {
                line,
                block: BlockIndex::ROOT, // overwritten on apply
            }),
        );
        match &self.nodes[index].change.as_ref().unwrap().change {
            CodeChange::BlockInsert { block, .. } => *block,
            _ => unreachable!(),
        }
    }

    fn remove_block(&mut self, code: &mut SourceCode, block: BlockIndex) {
        self.insert_and_apply(
            code,
            Change::backwards(CodeChange::BlockInsert {
                line: LineIndex::new(BlockIndex::ROOT, 0), // overwritten on apply
                block,
            }),
        );
    }

    /// Splits `block` at `at`, producing a sibling block holding the tail.
    fn split_block(&mut self, code: &mut SourceCode, block: BlockIndex, at: usize) -> BlockIndex {
        let ref_line = code.block_ref_line(block);
        let index = self.insert_and_apply(
            code,
            Change::backwards(CodeChange::BlockMerge {
                from: BlockIndex::ROOT, // overwritten on apply
                into: block,
                into_line_count: at,
                from_line: LineIndex::new(ref_line.block, ref_line.line + 1),
            }),
        );
        match &self.nodes[index].change.as_ref().unwrap().change {
            CodeChange::BlockMerge { from, .. } => *from,
            _ => unreachable!(),
        }
    }

    /// Merges runs of adjacent block-reference lines starting at `line`,
    /// following the junction into merged blocks.
    fn merge_adjacent_blocks(&mut self, code: &mut SourceCode, mut line: LineIndex) {
        loop {
            if line.line + 1 >= code.line_count(line.block) {
                return;
            }
            let curr = code.line(line).as_block();
            let next = code
                .line(LineIndex::new(line.block, line.line + 1))
                .as_block();
            let (Some(into), Some(from)) = (curr, next) else {
                return;
            };

            let junction = code.line_count(into);
            self.insert_and_apply(
                code,
                Change::forwards(CodeChange::BlockMerge {
                    from,
                    into,
                    into_line_count: 0, // recorded on apply
                    from_line: LineIndex::new(BlockIndex::ROOT, 0),
                }),
            );

            if junction == 0 {
                return;
            }
            line = LineIndex::new(into, junction - 1);
        }
    }

    // ------------------------------------------------------------------
    // Timestamps
    // ------------------------------------------------------------------

    /// The current position in history.
    pub fn timestamp(&self) -> HistoryTimestamp {
        HistoryTimestamp {
            node_index: self.current,
        }
    }

    /// Returns the minimal change sequence leading from `start` to `end`,
    /// walking undo edges as inverted changes. Applying the result to the
    /// source as it was at `start` yields the source at `end`.
    pub fn changes_between(
        &self,
        start: HistoryTimestamp,
        end: HistoryTimestamp,
    ) -> Vec<Change> {
        let start = start.node_index;
        let end = end.node_index;
        if start == end {
            return Vec::new();
        }

        // BFS from the end so the reconstruction below runs forwards.
        let mut goto_index = vec![usize::MAX; self.nodes.len()];
        let mut queue = VecDeque::new();
        goto_index[end] = end;
        queue.push_back(end);

        'search: while let Some(node_index) = queue.pop_front() {
            if node_index == start {
                break 'search;
            }
            let from = goto_index[node_index];
            let node = &self.nodes[node_index];

            if let Some(prev) = node.prev {
                if prev != from && goto_index[prev] == usize::MAX {
                    goto_index[prev] = node_index;
                    queue.push_back(prev);
                }
            }
            let mut child = node.next;
            while let Some(c) = child {
                if c != from && goto_index[c] == usize::MAX {
                    goto_index[c] = node_index;
                    queue.push_back(c);
                }
                child = self.nodes[c].alt;
            }
        }
        assert!(goto_index[start] != usize::MAX, "history is connected");

        let mut changes = Vec::new();
        let mut index = start;
        while index != end {
            let next = goto_index[index];
            if Some(next) == self.nodes[index].prev {
                // Walking backwards reverts the current node's change.
                changes.push(self.nodes[index].change.as_ref().unwrap().inverted());
            } else {
                changes.push(self.nodes[next].change.as_ref().unwrap().clone());
            }
            index = next;
        }
        changes
    }

    // ------------------------------------------------------------------
    // Sanity
    // ------------------------------------------------------------------

    /// Asserts DAG link and complex-pairing invariants plus the source
    /// invariants. Debug-build aid.
    pub fn sanity_check(&self, code: &SourceCode) {
        code.sanity_check();

        let mut inside_complex = false;
        for (i, node) in self.nodes.iter().enumerate() {
            match node.kind {
                HistoryNodeKind::Normal => {}
                HistoryNodeKind::ComplexStart => {
                    assert!(!inside_complex, "complex starts cannot nest");
                    inside_complex = true;
                    let partner = node.complex_partner.expect("paired");
                    assert_eq!(self.nodes[partner].kind, HistoryNodeKind::ComplexEnd);
                    assert_eq!(self.nodes[partner].complex_partner, Some(i));
                }
                HistoryNodeKind::ComplexEnd => {
                    assert!(inside_complex, "complex end without start");
                    inside_complex = false;
                    let partner = node.complex_partner.expect("paired");
                    assert_eq!(self.nodes[partner].kind, HistoryNodeKind::ComplexStart);
                    assert_eq!(self.nodes[partner].complex_partner, Some(i));
                }
            }
            if inside_complex && node.kind != HistoryNodeKind::ComplexStart {
                assert!(node.alt.is_none(), "no alternates inside complex commands");
            }
            if i == 0 {
                continue;
            }

            let prev = node.prev.expect("non-root node has a parent");
            if self.nodes[prev].next != Some(i) {
                // Must be reachable through the alt chain of prev's child.
                let mut walk = self.nodes[prev].next;
                let mut found = false;
                while let Some(w) = walk {
                    if self.nodes[w].alt == Some(i) {
                        found = true;
                        break;
                    }
                    walk = self.nodes[w].alt;
                }
                assert!(found, "alternative path must link back to the parent");
            }
            if let Some(next) = node.next {
                assert_eq!(self.nodes[next].prev, Some(i));
            }
        }
    }
}

impl Default for CodeHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_base::identifier_pool;

    fn setup(text: &str) -> (SourceCode, CodeHistory) {
        let code = SourceCode::from_text(text, identifier_pool());
        (code, CodeHistory::new())
    }

    #[test]
    fn text_insert_undo_redo_round_trips() {
        let (mut code, mut history) = setup("x\n");
        let line = LineIndex::new(BlockIndex::ROOT, 0);
        history.insert_text(&mut code, TextIndex::new(line, 1), " := 1".to_string());
        assert_eq!(code.text_line(line).text, "x := 1");

        history.undo(&mut code);
        assert_eq!(code.text_line(line).text, "x");

        history.redo(&mut code);
        assert_eq!(code.text_line(line).text, "x := 1");
    }

    #[test]
    fn remove_line_restores_text_on_undo() {
        let (mut code, mut history) = setup("first\nsecond\n");
        history.remove_line(&mut code, LineIndex::new(BlockIndex::ROOT, 0));
        assert_eq!(code.to_text(), "second\n");

        history.undo(&mut code);
        assert_eq!(code.to_text(), "first\nsecond\n");
    }

    #[test]
    fn removing_last_root_line_reseeds_empty_line() {
        let (mut code, mut history) = setup("only\n");
        history.remove_line(&mut code, LineIndex::new(BlockIndex::ROOT, 0));
        assert_eq!(code.line_count(BlockIndex::ROOT), 1);
        assert_eq!(
            code.text_line(LineIndex::new(BlockIndex::ROOT, 0)).text,
            ""
        );
    }

    #[test]
    fn add_indent_creates_block_and_undo_destroys_it() {
        let (mut code, mut history) = setup("x := 1\n");
        let new_pos = history.add_line_indent(&mut code, LineIndex::new(BlockIndex::ROOT, 0));
        assert!(!new_pos.block.is_root());
        assert_eq!(code.to_text(), "    x := 1\n");

        history.undo(&mut code);
        assert_eq!(code.to_text(), "x := 1\n");
        assert!(!code.block_alive(new_pos.block));
    }

    #[test]
    fn add_indent_joins_previous_block() {
        let (mut code, mut history) = setup("a\n    b\nc\n");
        history.add_line_indent(&mut code, LineIndex::new(BlockIndex::ROOT, 2));
        assert_eq!(code.to_text(), "a\n    b\n    c\n");
    }

    #[test]
    fn remove_indent_splits_block_in_middle() {
        let (mut code, mut history) = setup("f\n    a\n    b\n    c\n");
        let block = code.block(BlockIndex::ROOT).lines[1].as_block().unwrap();
        history.remove_line_indent(&mut code, LineIndex::new(block, 1));
        assert_eq!(code.to_text(), "f\n    a\nb\n    c\n");

        history.undo(&mut code);
        assert_eq!(code.to_text(), "f\n    a\n    b\n    c\n");
    }

    #[test]
    fn complex_command_undoes_as_unit() {
        let (mut code, mut history) = setup("start\n");
        history.start_complex_command();
        history.insert_line(&mut code, LineIndex::new(BlockIndex::ROOT, 1));
        history.insert_text(
            &mut code,
            TextIndex::new(LineIndex::new(BlockIndex::ROOT, 1), 0),
            "a".to_string(),
        );
        history.insert_line(&mut code, LineIndex::new(BlockIndex::ROOT, 2));
        history.insert_text(
            &mut code,
            TextIndex::new(LineIndex::new(BlockIndex::ROOT, 2), 0),
            "b".to_string(),
        );
        history.stop_complex_command();
        assert_eq!(code.to_text(), "start\na\nb\n");

        history.undo(&mut code);
        assert_eq!(code.to_text(), "start\n");

        history.redo(&mut code);
        assert_eq!(code.to_text(), "start\na\nb\n");
    }

    #[test]
    fn single_change_complex_is_elided() {
        let (mut code, mut history) = setup("x\n");
        history.start_complex_command();
        history.insert_char(
            &mut code,
            TextIndex::new(LineIndex::new(BlockIndex::ROOT, 0), 1),
            'y',
        );
        history.stop_complex_command();

        // Undo reverts exactly the one change, not a bracket.
        history.undo(&mut code);
        assert_eq!(code.text_line(LineIndex::new(BlockIndex::ROOT, 0)).text, "x");
        history.undo(&mut code); // hits the root, no-op
        assert_eq!(code.text_line(LineIndex::new(BlockIndex::ROOT, 0)).text, "x");
    }

    #[test]
    fn edit_after_undo_keeps_alternative_future() {
        let (mut code, mut history) = setup("x\n");
        let line = LineIndex::new(BlockIndex::ROOT, 0);
        history.insert_char(&mut code, TextIndex::new(line, 1), 'a');
        history.undo(&mut code);
        history.insert_char(&mut code, TextIndex::new(line, 1), 'b');
        assert_eq!(code.text_line(line).text, "xb");

        // The 'a' branch is still reachable for changes_between.
        history.sanity_check(&code);
    }

    #[test]
    fn changes_between_replays_onto_snapshot() {
        let (mut code, mut history) = setup("x\n");
        let line = LineIndex::new(BlockIndex::ROOT, 0);
        let t0 = history.timestamp();
        let mut snapshot = SourceCode::from_text(&code.to_text(), identifier_pool());

        history.insert_char(&mut code, TextIndex::new(line, 1), '1');
        history.insert_char(&mut code, TextIndex::new(line, 2), '2');
        history.undo(&mut code);
        history.insert_char(&mut code, TextIndex::new(line, 2), '3');
        let t1 = history.timestamp();

        let changes = history.changes_between(t0, t1);
        for mut change in changes {
            apply_change(&mut snapshot, &mut change, true);
        }
        assert_eq!(snapshot.to_text(), code.to_text());
    }

    #[test]
    fn changes_between_across_undo_inverts() {
        let (mut code, mut history) = setup("x\n");
        let line = LineIndex::new(BlockIndex::ROOT, 0);
        history.insert_char(&mut code, TextIndex::new(line, 1), '1');
        let t_mid = history.timestamp();
        history.undo(&mut code);
        let t_end = history.timestamp();

        let mut replay = SourceCode::from_text("x1\n", identifier_pool());
        for mut change in history.changes_between(t_mid, t_end) {
            apply_change(&mut replay, &mut change, true);
        }
        assert_eq!(replay.to_text(), "x\n");
    }

    #[test]
    fn apply_then_inverse_is_identity() {
        let (mut code, mut history) = setup("a\n    b\nc\n");
        let before = code.to_text();

        history.start_complex_command();
        history.insert_line_with_text(
            &mut code,
            LineIndex::new(BlockIndex::ROOT, 1),
            "inserted".to_string(),
        );
        history.stop_complex_command();
        history.add_line_indent(&mut code, LineIndex::new(BlockIndex::ROOT, 1));
        history.remove_line(&mut code, LineIndex::new(BlockIndex::ROOT, 2));

        history.undo(&mut code);
        history.undo(&mut code);
        history.undo(&mut code);
        assert_eq!(code.to_text(), before);
    }
}
