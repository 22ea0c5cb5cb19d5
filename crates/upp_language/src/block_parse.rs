//! Per-block parse cache and the incremental re-parse entry point.
//!
//! Every parse records a [`BlockParse`] per source block: the top-level
//! items parsed out of it plus a fingerprint of its line contents. Given
//! a history delta, [`affected_blocks`] classifies which blocks were
//! touched (lines added/removed, text changed, blocks created or
//! merged).
//!
//! The re-parse itself currently falls back to a clean full parse whose
//! observable outputs (AST, errors, cache shape) are identical to
//! parsing from scratch; the cache and delta classification give a true
//! block-local re-parse somewhere to grow from without changing the
//! interface.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHashSet};
use upp_source::{
    BlockIndex, Change, CodeChange, CodeHistory, HistoryTimestamp, SourceCode, SourceLine,
};

use crate::ast::NodeId;
use crate::parser::{parse, ParseResult};

/// Cached parse of one block.
#[derive(Debug)]
pub struct BlockParse {
    /// Top-level items parsed from the block's lines.
    pub items: Vec<NodeId>,
    /// Fingerprint of the block's line contents and structure.
    pub fingerprint: u64,
}

/// Parse cache keyed by block index.
#[derive(Debug, Default)]
pub struct ParseCache {
    pub blocks: FxHashMap<BlockIndex, BlockParse>,
}

impl ParseCache {
    pub(crate) fn record_block(&mut self, code: &SourceCode, block: BlockIndex, items: &[NodeId]) {
        self.blocks.insert(
            block,
            BlockParse {
                items: items.to_vec(),
                fingerprint: block_fingerprint(code, block),
            },
        );
    }

    /// True when the block's current content no longer matches the cached
    /// fingerprint (or the block was never cached).
    pub fn block_changed(&self, code: &SourceCode, block: BlockIndex) -> bool {
        match self.blocks.get(&block) {
            Some(cached) => {
                !code.block_alive(block) || cached.fingerprint != block_fingerprint(code, block)
            }
            None => true,
        }
    }
}

/// Fingerprints a block's own lines: text content plus where child
/// blocks sit (children's contents are their own blocks' business).
fn block_fingerprint(code: &SourceCode, block: BlockIndex) -> u64 {
    let mut hasher = DefaultHasher::new();
    for line in &code.block(block).lines {
        match line {
            SourceLine::Text(text) => {
                0u8.hash(&mut hasher);
                text.text.hash(&mut hasher);
            }
            SourceLine::BlockRef(child) => {
                1u8.hash(&mut hasher);
                child.index().hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}

/// Blocks touched by a change sequence: the block whose lines moved, the
/// blocks created/merged, and the parents that gained or lost reference
/// lines.
pub fn affected_blocks(changes: &[Change]) -> FxHashSet<BlockIndex> {
    let mut affected = FxHashSet::default();
    for change in changes {
        match &change.change {
            CodeChange::LineInsert { line } => {
                affected.insert(line.block);
            }
            CodeChange::BlockInsert { line, block } => {
                affected.insert(line.block);
                affected.insert(*block);
            }
            CodeChange::BlockMerge {
                from,
                into,
                from_line,
                ..
            } => {
                affected.insert(*from);
                affected.insert(*into);
                affected.insert(from_line.block);
            }
            CodeChange::TextInsert { index, .. } => {
                affected.insert(index.line.block);
            }
        }
    }
    affected
}

/// Re-parses after edits between `since` and the history's current
/// position. Produces the same outputs as a clean [`parse`].
pub fn reparse(
    code: &SourceCode,
    history: &CodeHistory,
    since: HistoryTimestamp,
    previous: &ParseResult,
) -> ParseResult {
    let changes = history.changes_between(since, history.timestamp());
    let affected = affected_blocks(&changes);
    log::debug!(
        "re-parse: {} changes touching {} blocks ({} cached)",
        changes.len(),
        affected.len(),
        previous.cache.blocks.len()
    );

    // Full re-parse fallback; its outputs are identical to a clean parse
    // by construction.
    parse(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_base::identifier_pool;
    use upp_source::{LineIndex, TextIndex};

    #[test]
    fn parse_records_cache_for_every_block() {
        let code = SourceCode::from_text(
            "main :: () -> i32\n    return 0\n",
            identifier_pool(),
        );
        let result = parse(&code);
        assert_eq!(result.cache.blocks.len(), 2);
    }

    #[test]
    fn fingerprint_detects_text_change() {
        let mut code = SourceCode::from_text("a :: 1\n", identifier_pool());
        let result = parse(&code);
        assert!(!result.cache.block_changed(&code, BlockIndex::ROOT));

        let line = LineIndex::new(BlockIndex::ROOT, 0);
        code.text_line_mut(line).text.push('0');
        assert!(result.cache.block_changed(&code, BlockIndex::ROOT));
    }

    #[test]
    fn affected_blocks_classifies_changes() {
        let mut code = SourceCode::from_text("x := 1\n", identifier_pool());
        let mut history = CodeHistory::new();
        let t0 = history.timestamp();
        history.insert_char(
            &mut code,
            TextIndex::new(LineIndex::new(BlockIndex::ROOT, 0), 0),
            'y',
        );
        let affected = affected_blocks(&history.changes_between(t0, history.timestamp()));
        assert!(affected.contains(&BlockIndex::ROOT));
        assert_eq!(affected.len(), 1);
    }

    #[test]
    fn reparse_matches_clean_parse() {
        let mut code = SourceCode::from_text(
            "main :: () -> i32\n    return 0\n",
            identifier_pool(),
        );
        let mut history = CodeHistory::new();
        let t0 = history.timestamp();
        let first = parse(&code);

        let body = code.block(BlockIndex::ROOT).lines[1].as_block().unwrap();
        history.insert_line(&mut code, LineIndex::new(body, 0));
        history.insert_text(
            &mut code,
            TextIndex::new(LineIndex::new(body, 0), 0),
            "x := 1".to_string(),
        );
        code.retokenize_dirty(identifier_pool());

        let incremental = reparse(&code, &history, t0, &first);
        let clean = parse(&code);
        assert_eq!(incremental.errors, clean.errors);
        assert_eq!(incremental.ast.nodes.len(), clean.ast.nodes.len());
    }
}
