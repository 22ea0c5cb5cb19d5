//! The block-structured source model.
//!
//! Source text is a tree of blocks. A block owns an ordered sequence of
//! lines; a line is either a text line (string plus token cache) or a
//! reference to a nested child block. Indentation in flat text maps
//! one-to-one onto block nesting, so the tree round-trips through
//! [`SourceCode::from_text`] / [`SourceCode::append_to_text`].
//!
//! ## Stable indices
//!
//! [`BlockIndex`] identifies a block for the lifetime of an edit session:
//! removed blocks leave a tombstone slot behind and ids are only reused
//! for freshly created blocks, never re-pointed at surviving ones. All
//! finer-grained indices ([`LineIndex`], [`TextIndex`], [`TokenIndex`])
//! are built on top of a `BlockIndex` plus ordinals.
//!
//! ## Invariants
//!
//! - Block 0 is the root, is always alive and owns at least one line.
//! - Every live non-root block is reachable from the root through
//!   block-reference lines, and its `parent` back-link matches.
//! - No two adjacent lines of the same block are block references (the
//!   history merges them eagerly).
//!
//! [`SourceCode::sanity_check`] asserts all of the above and runs after
//! every compound edit in debug builds.

use std::fmt;

use upp_base::{IdentifierPool, PoolLock};

use crate::lexer::tokenize_line;
use crate::token::{character_index_to_token, Token, TokenKind};

/// Identifies one block of the source tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIndex(u32);

impl BlockIndex {
    /// The root block.
    pub const ROOT: BlockIndex = BlockIndex(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_root(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// A line position: block plus line ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LineIndex {
    pub block: BlockIndex,
    pub line: usize,
}

impl LineIndex {
    pub fn new(block: BlockIndex, line: usize) -> LineIndex {
        LineIndex { block, line }
    }
}

impl fmt::Display for LineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.line)
    }
}

/// A character position inside a text line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextIndex {
    pub line: LineIndex,
    pub character: usize,
}

impl TextIndex {
    pub fn new(line: LineIndex, character: usize) -> TextIndex {
        TextIndex { line, character }
    }
}

/// A token position inside a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenIndex {
    pub line: LineIndex,
    pub token: usize,
}

impl TokenIndex {
    pub fn new(line: LineIndex, token: usize) -> TokenIndex {
        TokenIndex { line, token }
    }
}

/// An exclusive token range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenRange {
    pub start: TokenIndex,
    pub end: TokenIndex,
}

impl TokenRange {
    pub fn new(start: TokenIndex, end: TokenIndex) -> TokenRange {
        TokenRange { start, end }
    }

    /// An empty range sitting at `at`.
    pub fn empty_at(at: TokenIndex) -> TokenRange {
        TokenRange {
            start: at,
            end: at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A text line: string content plus analysis caches.
#[derive(Debug, Clone, Default)]
pub struct TextLine {
    pub text: String,
    /// Token cache, refreshed by [`SourceCode::tokenize_line`].
    pub tokens: Vec<Token>,
    /// Set when `text` changed since the last tokenisation.
    pub dirty: bool,
    /// True for `//` lines and lines inside a `/* */` comment block.
    pub is_comment: bool,
    /// Nesting depth of the surrounding comment block, -1 outside one.
    pub comment_block_indentation: i32,
}

impl TextLine {
    fn with_text(text: String) -> TextLine {
        let dirty = !text.is_empty();
        TextLine {
            text,
            tokens: Vec::new(),
            dirty,
            is_comment: false,
            comment_block_indentation: -1,
        }
    }
}

/// One line of a block: text or a nested child block.
#[derive(Debug, Clone)]
pub enum SourceLine {
    Text(TextLine),
    BlockRef(BlockIndex),
}

impl SourceLine {
    pub fn is_block_reference(&self) -> bool {
        matches!(self, SourceLine::BlockRef(_))
    }

    pub fn as_block(&self) -> Option<BlockIndex> {
        match self {
            SourceLine::BlockRef(block) => Some(*block),
            SourceLine::Text(_) => None,
        }
    }
}

/// A block: parent link plus owned lines.
#[derive(Debug, Clone, Default)]
pub struct SourceBlock {
    pub parent: Option<BlockIndex>,
    pub lines: Vec<SourceLine>,
}

/// The whole source tree.
pub struct SourceCode {
    blocks: Vec<Option<SourceBlock>>,
}

impl SourceCode {
    /// Creates a source with an empty root line, the minimal valid state.
    pub fn new() -> SourceCode {
        let root = SourceBlock {
            parent: None,
            lines: vec![SourceLine::Text(TextLine::default())],
        };
        SourceCode {
            blocks: vec![Some(root)],
        }
    }

    /// Parses flat text into a block tree (4 spaces or one tab per level)
    /// and tokenises every line.
    pub fn from_text(text: &str, pool: &IdentifierPool) -> SourceCode {
        let mut code = SourceCode {
            blocks: vec![Some(SourceBlock::default())],
        };

        // Stack of enclosing blocks, innermost last.
        let mut stack = vec![BlockIndex::ROOT];
        for raw_line in text.lines() {
            let (level, content) = measure_indentation(raw_line);
            if content.is_empty() {
                // Blank lines carry no indentation of their own; they stay
                // in the innermost open block.
                let target = *stack.last().unwrap();
                let at = code.block(target).lines.len();
                code.block_mut(target)
                    .lines
                    .insert(at, SourceLine::Text(TextLine::default()));
                continue;
            }
            while stack.len() > level + 1 {
                stack.pop();
            }
            while stack.len() < level + 1 {
                let parent = *stack.last().unwrap();
                let at = code.block(parent).lines.len();
                let child = code.insert_empty_block(LineIndex::new(parent, at));
                stack.push(child);
            }
            let target = *stack.last().unwrap();
            let at = code.block(target).lines.len();
            code.block_mut(target)
                .lines
                .insert(at, SourceLine::Text(TextLine::with_text(content.to_string())));
        }

        if code.block(BlockIndex::ROOT).lines.is_empty() {
            code.block_mut(BlockIndex::ROOT)
                .lines
                .push(SourceLine::Text(TextLine::default()));
        }

        code.tokenize_all(pool);
        code.update_comment_lines();
        code
    }

    /// Serialises the tree back to flat text, one level = 4 spaces.
    pub fn append_to_text(&self, out: &mut String) {
        self.append_block_text(BlockIndex::ROOT, 0, out);
    }

    /// Convenience wrapper around [`SourceCode::append_to_text`].
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.append_to_text(&mut out);
        out
    }

    fn append_block_text(&self, block: BlockIndex, depth: usize, out: &mut String) {
        for line in &self.block(block).lines {
            match line {
                SourceLine::Text(text_line) => {
                    if !text_line.text.is_empty() {
                        for _ in 0..depth {
                            out.push_str("    ");
                        }
                        out.push_str(&text_line.text);
                    }
                    out.push('\n');
                }
                SourceLine::BlockRef(child) => {
                    self.append_block_text(*child, depth + 1, out);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    /// Returns the block for an index.
    ///
    /// # Panics
    ///
    /// Panics if the block was removed.
    pub fn block(&self, index: BlockIndex) -> &SourceBlock {
        self.blocks[index.index()]
            .as_ref()
            .expect("stale block index")
    }

    fn block_mut(&mut self, index: BlockIndex) -> &mut SourceBlock {
        self.blocks[index.index()]
            .as_mut()
            .expect("stale block index")
    }

    /// Returns `true` if the block is still alive.
    pub fn block_alive(&self, index: BlockIndex) -> bool {
        index.index() < self.blocks.len() && self.blocks[index.index()].is_some()
    }

    pub fn line(&self, index: LineIndex) -> &SourceLine {
        &self.block(index.block).lines[index.line]
    }

    /// Returns the text line at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the line is a block reference.
    pub fn text_line(&self, index: LineIndex) -> &TextLine {
        match self.line(index) {
            SourceLine::Text(line) => line,
            SourceLine::BlockRef(_) => panic!("line {index:?} is a block reference"),
        }
    }

    pub fn text_line_mut(&mut self, index: LineIndex) -> &mut TextLine {
        match &mut self.block_mut(index.block).lines[index.line] {
            SourceLine::Text(line) => line,
            SourceLine::BlockRef(_) => panic!("line {index:?} is a block reference"),
        }
    }

    pub fn line_count(&self, block: BlockIndex) -> usize {
        self.block(block).lines.len()
    }

    pub fn line_valid(&self, index: LineIndex) -> bool {
        self.block_alive(index.block) && index.line < self.line_count(index.block)
    }

    /// Tokens of a text line; empty slice for block references.
    pub fn tokens_of(&self, index: LineIndex) -> &[Token] {
        match self.line(index) {
            SourceLine::Text(line) => &line.tokens,
            SourceLine::BlockRef(_) => &[],
        }
    }

    /// Token count excluding a trailing `//` comment token.
    pub fn significant_token_count(&self, index: LineIndex) -> usize {
        let tokens = self.tokens_of(index);
        match tokens.last() {
            Some(token) if token.kind == TokenKind::Comment => tokens.len() - 1,
            _ => tokens.len(),
        }
    }

    pub fn token_at(&self, index: TokenIndex) -> Option<&Token> {
        self.tokens_of(index.line).get(index.token)
    }

    /// The one-past-the-last-line end marker of a block, used as the end
    /// of ranges clamped to the block.
    pub fn block_end(&self, block: BlockIndex) -> TokenIndex {
        TokenIndex::new(LineIndex::new(block, self.line_count(block)), 0)
    }

    /// The line ordinal path from the root to this line, used for
    /// document-order comparisons across blocks.
    pub fn line_path(&self, index: LineIndex) -> Vec<usize> {
        let mut path = vec![index.line];
        let mut block = index.block;
        while let Some(parent) = self.block(block).parent {
            let ref_line = self.block_ref_line(block);
            path.push(ref_line.line);
            block = parent;
        }
        path.reverse();
        path
    }

    /// Compares two token indices in document order.
    pub fn token_index_order(&self, a: TokenIndex, b: TokenIndex) -> std::cmp::Ordering {
        let path_a = self.line_path(a.line);
        let path_b = self.line_path(b.line);
        path_a
            .cmp(&path_b)
            .then(a.token.cmp(&b.token))
    }

    /// Finds the parent line referencing `block`.
    ///
    /// # Panics
    ///
    /// Panics on the root block or on a broken parent link.
    pub fn block_ref_line(&self, block: BlockIndex) -> LineIndex {
        let parent = self.block(block).parent.expect("root has no parent line");
        for (i, line) in self.block(parent).lines.iter().enumerate() {
            if line.as_block() == Some(block) {
                return LineIndex::new(parent, i);
            }
        }
        panic!("block {block} missing from its parent")
    }

    // ------------------------------------------------------------------
    // Mutation primitives
    // ------------------------------------------------------------------

    /// Inserts an empty text line at `index`, shifting later lines down.
    pub fn insert_empty_line(&mut self, index: LineIndex) {
        let block = self.block_mut(index.block);
        assert!(index.line <= block.lines.len());
        block
            .lines
            .insert(index.line, SourceLine::Text(TextLine::default()));
    }

    /// Removes the line at `index`. The caller is responsible for the
    /// higher-level invariants (merging, pruning); the history's compound
    /// commands compose those from this primitive.
    pub fn remove_line(&mut self, index: LineIndex) {
        let block = self.block_mut(index.block);
        assert!(index.line < block.lines.len());
        block.lines.remove(index.line);
    }

    /// Creates a fresh empty block and inserts a reference line to it at
    /// `index`. Returns the new block's id.
    pub fn insert_empty_block(&mut self, index: LineIndex) -> BlockIndex {
        let new_index = BlockIndex(self.blocks.len() as u32);
        self.blocks.push(Some(SourceBlock {
            parent: Some(index.block),
            lines: Vec::new(),
        }));
        let parent = self.block_mut(index.block);
        assert!(index.line <= parent.lines.len());
        parent.lines.insert(index.line, SourceLine::BlockRef(new_index));
        new_index
    }

    /// Removes an empty block and its reference line. Returns the line
    /// index where the reference lived.
    pub fn remove_empty_block(&mut self, block: BlockIndex) -> LineIndex {
        assert!(!block.is_root(), "cannot remove the root block");
        assert!(
            self.block(block).lines.is_empty(),
            "only empty blocks can be removed"
        );
        let ref_line = self.block_ref_line(block);
        self.block_mut(ref_line.block).lines.remove(ref_line.line);
        self.blocks[block.index()] = None;
        ref_line
    }

    /// Moves all lines of `from` onto the end of `into`, re-parenting any
    /// moved child blocks. `from` is left empty (and alive).
    pub fn append_block_lines(&mut self, from: BlockIndex, into: BlockIndex) {
        let moved = std::mem::take(&mut self.block_mut(from).lines);
        for line in &moved {
            if let SourceLine::BlockRef(child) = line {
                self.block_mut(*child).parent = Some(into);
            }
        }
        self.block_mut(into).lines.extend(moved);
    }

    /// Moves `from`'s lines starting at `start` into the (empty) block
    /// `to`, re-parenting moved children.
    pub fn move_tail_lines(&mut self, from: BlockIndex, start: usize, to: BlockIndex) {
        assert!(self.block(to).lines.is_empty());
        let tail: Vec<SourceLine> = self.block_mut(from).lines.split_off(start);
        for line in &tail {
            if let SourceLine::BlockRef(child) = line {
                self.block_mut(*child).parent = Some(to);
            }
        }
        self.block_mut(to).lines = tail;
    }

    // ------------------------------------------------------------------
    // Tokenisation
    // ------------------------------------------------------------------

    /// Refreshes the token cache of one text line.
    pub fn tokenize_line(&mut self, index: LineIndex, pool: &mut PoolLock) {
        let line = self.text_line_mut(index);
        line.tokens = tokenize_line(&line.text, pool);
        line.dirty = false;
    }

    /// Re-tokenises every dirty text line, then refreshes comment flags.
    pub fn retokenize_dirty(&mut self, pool: &IdentifierPool) {
        let mut retokenized = 0usize;
        let mut lock = pool.lock();
        for block_index in 0..self.blocks.len() {
            let Some(block) = &self.blocks[block_index] else {
                continue;
            };
            let dirty_lines: Vec<usize> = block
                .lines
                .iter()
                .enumerate()
                .filter_map(|(i, line)| match line {
                    SourceLine::Text(text) if text.dirty => Some(i),
                    _ => None,
                })
                .collect();
            for line in dirty_lines {
                self.tokenize_line(
                    LineIndex::new(BlockIndex(block_index as u32), line),
                    &mut lock,
                );
                retokenized += 1;
            }
        }
        drop(lock);
        if retokenized > 0 {
            log::debug!("re-tokenised {retokenized} dirty lines");
        }
        self.update_comment_lines();
    }

    /// Tokenises every text line from scratch.
    pub fn tokenize_all(&mut self, pool: &IdentifierPool) {
        for block_index in 0..self.blocks.len() {
            if self.blocks[block_index].is_none() {
                continue;
            }
            let block = BlockIndex(block_index as u32);
            for line in 0..self.line_count(block) {
                let index = LineIndex::new(block, line);
                if let SourceLine::Text(_) = self.line(index) {
                    let mut lock = pool.lock();
                    self.tokenize_line(index, &mut lock);
                }
            }
        }
    }

    /// Marks lines that belong to `/* */` comment blocks.
    ///
    /// Runs per block: a text line that opens more `/*` than it closes
    /// starts a comment block; following lines of the same block are
    /// comment lines until the closing `*/` balances out. `//` lines are
    /// comment lines on their own.
    pub fn update_comment_lines(&mut self) {
        for block_index in 0..self.blocks.len() {
            if self.blocks[block_index].is_none() {
                continue;
            }
            let block = BlockIndex(block_index as u32);
            let mut depth: i32 = 0;
            for line in 0..self.line_count(block) {
                let index = LineIndex::new(block, line);
                let SourceLine::Text(_) = self.line(index) else {
                    continue;
                };
                let text = self.text_line(index).text.clone();
                let inside = depth > 0;
                depth += comment_delimiter_balance(&text);
                if depth < 0 {
                    depth = 0;
                }
                let line_mut = self.text_line_mut(index);
                line_mut.is_comment =
                    inside || depth > 0 || text.trim_start().starts_with("//");
                line_mut.comment_block_indentation = if inside || depth > 0 {
                    depth.max(1)
                } else {
                    -1
                };
            }
        }
    }

    /// True if the line is empty, a `//` line, or inside a comment block —
    /// everything the per-block parsers skip.
    pub fn line_is_ignorable(&self, index: LineIndex) -> bool {
        match self.line(index) {
            SourceLine::BlockRef(_) => false,
            SourceLine::Text(line) => {
                line.is_comment || line.text.trim().is_empty()
            }
        }
    }

    // ------------------------------------------------------------------
    // Index conversions
    // ------------------------------------------------------------------

    /// Maps a text position to the token ordinal at or after it.
    pub fn text_index_to_token_index(&self, index: TextIndex, after_cursor: bool) -> TokenIndex {
        let tokens = self.tokens_of(index.line);
        let token = character_index_to_token(tokens, index.character, after_cursor);
        TokenIndex::new(index.line, token)
    }

    /// Maps a token position to a character position (token start or end).
    pub fn token_index_to_text_index(&self, index: TokenIndex, token_start: bool) -> TextIndex {
        let tokens = self.tokens_of(index.line);
        let character = match tokens.get(index.token) {
            Some(token) => {
                if token_start {
                    token.start
                } else {
                    token.end
                }
            }
            None => match self.line(index.line) {
                SourceLine::Text(line) => line.text.len(),
                SourceLine::BlockRef(_) => 0,
            },
        };
        TextIndex::new(index.line, character)
    }

    // ------------------------------------------------------------------
    // Sanity
    // ------------------------------------------------------------------

    /// Asserts the structural invariants. Debug-build aid; cost is linear
    /// in the size of the tree.
    pub fn sanity_check(&self) {
        assert!(self.block_alive(BlockIndex::ROOT), "root must be alive");
        assert!(self.block(BlockIndex::ROOT).parent.is_none());
        assert!(
            !self.block(BlockIndex::ROOT).lines.is_empty(),
            "root must keep at least one line"
        );

        let mut visited = vec![false; self.blocks.len()];
        let mut stack = vec![BlockIndex::ROOT];
        while let Some(block) = stack.pop() {
            assert!(!visited[block.index()], "block referenced twice");
            visited[block.index()] = true;

            let mut previous_was_ref = false;
            for line in &self.block(block).lines {
                match line {
                    SourceLine::BlockRef(child) => {
                        assert!(
                            !previous_was_ref,
                            "adjacent block references must be merged"
                        );
                        assert_eq!(self.block(*child).parent, Some(block));
                        stack.push(*child);
                        previous_was_ref = true;
                    }
                    SourceLine::Text(_) => previous_was_ref = false,
                }
            }
        }

        for (i, slot) in self.blocks.iter().enumerate() {
            if slot.is_some() {
                assert!(visited[i], "live block {i} unreachable from root");
            }
        }
    }
}

impl Default for SourceCode {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a raw line into (indentation level, content). Four spaces or
/// one tab count as one level.
fn measure_indentation(raw: &str) -> (usize, &str) {
    let bytes = raw.as_bytes();
    let mut spaces = 0usize;
    let mut level = 0usize;
    let mut pos = 0usize;
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' => {
                spaces += 1;
                if spaces == 4 {
                    level += 1;
                    spaces = 0;
                }
            }
            b'\t' => {
                level += 1;
                spaces = 0;
            }
            _ => break,
        }
        pos += 1;
    }
    (level, raw[pos..].trim_end())
}

/// Net `/*` vs `*/` balance of one line, ignoring delimiters inside `//`
/// comments is deliberately not attempted — the editor treats them the
/// same way.
fn comment_delimiter_balance(text: &str) -> i32 {
    let bytes = text.as_bytes();
    let mut balance = 0;
    let mut pos = 0;
    while pos + 1 < bytes.len() {
        if bytes[pos] == b'/' && bytes[pos + 1] == b'*' {
            balance += 1;
            pos += 2;
        } else if bytes[pos] == b'*' && bytes[pos + 1] == b'/' {
            balance -= 1;
            pos += 2;
        } else {
            pos += 1;
        }
    }
    balance
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_base::identifier_pool;

    fn source(text: &str) -> SourceCode {
        SourceCode::from_text(text, identifier_pool())
    }

    #[test]
    fn new_source_has_one_empty_root_line() {
        let code = SourceCode::new();
        code.sanity_check();
        assert_eq!(code.line_count(BlockIndex::ROOT), 1);
    }

    #[test]
    fn from_text_builds_nested_blocks() {
        let code = source("main :: () -> i32\n    return 0\n");
        code.sanity_check();
        let root = code.block(BlockIndex::ROOT);
        assert_eq!(root.lines.len(), 2);
        assert!(!root.lines[0].is_block_reference());
        let child = root.lines[1].as_block().unwrap();
        assert_eq!(code.line_count(child), 1);
        assert_eq!(code.text_line(LineIndex::new(child, 0)).text, "return 0");
    }

    #[test]
    fn text_round_trips_through_block_tree() {
        let text = "a\n    b\n        c\n    d\ne\n";
        let code = source(text);
        code.sanity_check();
        assert_eq!(code.to_text(), text);
    }

    #[test]
    fn from_text_tokenizes_lines() {
        let code = source("x := 10\n");
        let tokens = code.tokens_of(LineIndex::new(BlockIndex::ROOT, 0));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn insert_and_remove_line() {
        let mut code = source("a\nb\n");
        code.insert_empty_line(LineIndex::new(BlockIndex::ROOT, 1));
        assert_eq!(code.line_count(BlockIndex::ROOT), 3);
        assert_eq!(code.text_line(LineIndex::new(BlockIndex::ROOT, 1)).text, "");
        code.remove_line(LineIndex::new(BlockIndex::ROOT, 1));
        assert_eq!(code.line_count(BlockIndex::ROOT), 2);
        code.sanity_check();
    }

    #[test]
    fn insert_empty_block_creates_reference_line() {
        let mut code = source("a\n");
        let block = code.insert_empty_block(LineIndex::new(BlockIndex::ROOT, 1));
        assert!(code.block_alive(block));
        assert_eq!(code.block(block).parent, Some(BlockIndex::ROOT));
        assert_eq!(
            code.block_ref_line(block),
            LineIndex::new(BlockIndex::ROOT, 1)
        );
    }

    #[test]
    fn remove_empty_block_frees_slot() {
        let mut code = source("a\n");
        let block = code.insert_empty_block(LineIndex::new(BlockIndex::ROOT, 1));
        let ref_line = code.remove_empty_block(block);
        assert_eq!(ref_line, LineIndex::new(BlockIndex::ROOT, 1));
        assert!(!code.block_alive(block));
        code.sanity_check();
    }

    #[test]
    fn append_block_lines_reparents_children() {
        let mut code = source("a\n    b\n        c\nd\n    e\n");
        let root = code.block(BlockIndex::ROOT);
        let first = root.lines[1].as_block().unwrap();
        let second = root.lines[3].as_block().unwrap();
        let nested = code.block(first).lines[1].as_block().unwrap();

        code.append_block_lines(second, first);
        assert!(code.block(second).lines.is_empty());
        assert_eq!(code.block(nested).parent, Some(first));
        assert_eq!(code.line_count(first), 3);
    }

    #[test]
    fn line_path_orders_across_blocks() {
        let code = source("a\n    b\nc\n");
        let root_line = LineIndex::new(BlockIndex::ROOT, 0);
        let child = code.block(BlockIndex::ROOT).lines[1].as_block().unwrap();
        let inner = LineIndex::new(child, 0);
        let after = LineIndex::new(BlockIndex::ROOT, 2);

        let a = TokenIndex::new(root_line, 0);
        let b = TokenIndex::new(inner, 0);
        let c = TokenIndex::new(after, 0);
        assert_eq!(code.token_index_order(a, b), std::cmp::Ordering::Less);
        assert_eq!(code.token_index_order(b, c), std::cmp::Ordering::Less);
        assert_eq!(code.token_index_order(c, a), std::cmp::Ordering::Greater);
    }

    #[test]
    fn comment_lines_are_marked() {
        let code = source("/*\nhidden\n*/\nvisible\n// note\n");
        let root = BlockIndex::ROOT;
        assert!(code.text_line(LineIndex::new(root, 0)).is_comment);
        assert!(code.text_line(LineIndex::new(root, 1)).is_comment);
        assert!(code.text_line(LineIndex::new(root, 2)).is_comment);
        assert!(!code.text_line(LineIndex::new(root, 3)).is_comment);
        assert!(code.text_line(LineIndex::new(root, 4)).is_comment);
    }

    #[test]
    fn significant_tokens_exclude_trailing_comment() {
        let code = source("x := 1 // note\n");
        let line = LineIndex::new(BlockIndex::ROOT, 0);
        assert_eq!(code.tokens_of(line).len(), 4);
        assert_eq!(code.significant_token_count(line), 3);
    }

    #[test]
    fn text_and_token_index_conversion() {
        let code = source("x := 10\n");
        let line = LineIndex::new(BlockIndex::ROOT, 0);
        let token_index =
            code.text_index_to_token_index(TextIndex::new(line, 5), true);
        assert_eq!(token_index.token, 2);
        let back = code.token_index_to_text_index(token_index, true);
        assert_eq!(back.character, 5);
    }

    #[test]
    fn retokenize_refreshes_dirty_lines() {
        let mut code = source("x\n");
        let line = LineIndex::new(BlockIndex::ROOT, 0);
        {
            let text_line = code.text_line_mut(line);
            text_line.text.push_str(" := 1");
            text_line.dirty = true;
        }
        code.retokenize_dirty(identifier_pool());
        assert_eq!(code.tokens_of(line).len(), 3);
        assert!(!code.text_line(line).dirty);
    }
}
