//! Recursive-descent parser over the block tree.
//!
//! The parser walks [`TokenIndex`] positions through the token caches of
//! a [`SourceCode`]. Parsing is organised per block: every block is
//! parsed line by line with a context-appropriate line parser, and
//! constructs that own a body (`if`, `while`, `struct`, functions, ...)
//! consume a *follow block* — a child block on the line immediately after
//! the introducing line.
//!
//! ## Rollback
//!
//! A [`Checkpoint`] captures `(position, allocated nodes, error count)`.
//! Rolling back truncates the AST arena and the error list and restores
//! the position, destroying everything a failed parse attempt produced.
//!
//! ## Error recovery
//!
//! Failures are local: inside parenthesised lists the parser skips to the
//! next comma or the closing parenthesis at the current depth (honouring
//! nesting); at line granularity it reports the unconsumed remainder of
//! the line and carries on with the next line. Errors whose range starts
//! inside an already-reported error are suppressed.

mod expressions;
mod statements;

use upp_base::Ident;
use upp_source::{
    BlockIndex, Keyword, LineIndex, Operator, ParenthesisKind, SourceCode, Token, TokenIndex,
    TokenKind, TokenRange,
};

use crate::ast::{Ast, NodeId, NodeKind, Statement};
use crate::block_parse::ParseCache;

/// A structured parse error: static message plus token range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: &'static str,
    pub range: TokenRange,
}

/// Everything one parse produces.
#[derive(Debug)]
pub struct ParseResult {
    pub ast: Ast,
    pub root: NodeId,
    pub errors: Vec<ParseError>,
    pub cache: ParseCache,
}

/// Parses the whole source. The root block becomes the root module.
pub fn parse(code: &SourceCode) -> ParseResult {
    let mut parser = Parser::new(code);
    let root_at = TokenIndex::new(LineIndex::new(BlockIndex::ROOT, 0), 0);
    let root = parser.ast.alloc(
        NodeKind::Module {
            definitions: Vec::new(),
            imports: Vec::new(),
        },
        None,
        root_at,
    );
    let items = parser.parse_block_items(BlockIndex::ROOT, BlockContext::ModuleItem, root);
    parser.assign_module_items(root, items);
    parser.ast.node_mut(root).range = TokenRange::new(root_at, code.block_end(BlockIndex::ROOT));
    parser.ast.root = Some(root);
    parser.ast.correct_token_ranges(root, code);

    log::debug!(
        "parsed {} nodes, {} errors",
        parser.ast.nodes.len(),
        parser.errors.len()
    );
    ParseResult {
        ast: parser.ast,
        root,
        errors: parser.errors,
        cache: parser.cache,
    }
}

/// Which line parser a block is read with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockContext {
    ModuleItem,
    Statement,
    StructMember,
    SwitchCase,
    EnumMember,
}

#[derive(Clone, Copy)]
pub(crate) struct Checkpoint {
    pos: TokenIndex,
    node_count: usize,
    error_count: usize,
}

pub(crate) struct Parser<'a> {
    pub(crate) code: &'a SourceCode,
    pub(crate) ast: Ast,
    pub(crate) errors: Vec<ParseError>,
    pub(crate) cache: ParseCache,
    pub(crate) pos: TokenIndex,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(code: &'a SourceCode) -> Parser<'a> {
        Parser {
            code,
            ast: Ast::new(),
            errors: Vec::new(),
            cache: ParseCache::default(),
            pos: TokenIndex::new(LineIndex::new(BlockIndex::ROOT, 0), 0),
        }
    }

    // ------------------------------------------------------------------
    // Checkpoint / rollback
    // ------------------------------------------------------------------

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            pos: self.pos,
            node_count: self.ast.nodes.len(),
            error_count: self.errors.len(),
        }
    }

    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.pos = checkpoint.pos;
        self.ast.nodes.truncate(checkpoint.node_count);
        self.errors.truncate(checkpoint.error_count);
    }

    // ------------------------------------------------------------------
    // Token access
    // ------------------------------------------------------------------

    /// Significant tokens of the current line; empty when the position
    /// has run past the end of its block.
    fn current_line_token_count(&self) -> usize {
        if !self.code.line_valid(self.pos.line) {
            return 0;
        }
        self.code.significant_token_count(self.pos.line)
    }

    /// Peeks at a token on the current line; never crosses lines.
    pub(crate) fn peek(&self, offset: usize) -> Option<&Token> {
        let count = self.current_line_token_count();
        let index = self.pos.token + offset;
        if index >= count {
            return None;
        }
        self.code.tokens_of(self.pos.line).get(index)
    }

    pub(crate) fn at_line_end(&self) -> bool {
        self.pos.token >= self.current_line_token_count()
    }

    pub(crate) fn advance(&mut self) {
        debug_assert!(!self.at_line_end());
        self.pos.token += 1;
    }

    pub(crate) fn test_operator_offset(&self, op: Operator, offset: usize) -> bool {
        matches!(self.peek(offset), Some(t) if t.kind == TokenKind::Operator(op))
    }

    pub(crate) fn test_operator(&self, op: Operator) -> bool {
        self.test_operator_offset(op, 0)
    }

    /// Advances over `op` if it is next, returning whether it was.
    pub(crate) fn accept_operator(&mut self, op: Operator) -> bool {
        if self.test_operator(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn test_keyword_offset(&self, keyword: Keyword, offset: usize) -> bool {
        matches!(self.peek(offset), Some(t) if t.kind == TokenKind::Keyword(keyword))
    }

    pub(crate) fn test_keyword(&self, keyword: Keyword) -> bool {
        self.test_keyword_offset(keyword, 0)
    }

    pub(crate) fn accept_keyword(&mut self, keyword: Keyword) -> bool {
        if self.test_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn test_parenthesis_offset(&self, c: char, offset: usize) -> bool {
        let expected = upp_source::Parenthesis::from_char(c);
        matches!(self.peek(offset), Some(t) if t.kind == TokenKind::Parenthesis(expected))
    }

    pub(crate) fn test_parenthesis(&self, c: char) -> bool {
        self.test_parenthesis_offset(c, 0)
    }

    pub(crate) fn accept_parenthesis(&mut self, c: char) -> bool {
        if self.test_parenthesis(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn test_identifier_offset(&self, offset: usize) -> Option<Ident> {
        match self.peek(offset) {
            Some(Token {
                kind: TokenKind::Identifier(id),
                ..
            }) => Some(*id),
            _ => None,
        }
    }

    pub(crate) fn test_identifier(&self) -> Option<Ident> {
        self.test_identifier_offset(0)
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    /// Records an error unless it starts inside the previous one.
    pub(crate) fn log_error(&mut self, message: &'static str, range: TokenRange) {
        if let Some(last) = self.errors.last() {
            if self.code.token_index_order(range.start, last.range.end).is_lt() {
                return;
            }
        }
        self.errors.push(ParseError { message, range });
    }

    /// Records an error covering the remainder of the current line and
    /// moves the position to the line's end.
    pub(crate) fn log_error_to_line_end(&mut self, message: &'static str) {
        let end = TokenIndex::new(self.pos.line, self.current_line_token_count());
        self.log_error(message, TokenRange::new(self.pos, end));
        self.pos = end;
    }

    /// Records an error from the current position up to `to`, then moves
    /// there.
    pub(crate) fn log_error_to(&mut self, message: &'static str, to: TokenIndex) {
        self.log_error(message, TokenRange::new(self.pos, to));
        self.pos = to;
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// True if the position is at the end of its line and the next line
    /// of the same block is a block reference.
    pub(crate) fn on_follow_block(&self) -> bool {
        if !self.at_line_end() {
            return false;
        }
        self.follow_block_of(self.pos.line).is_some()
    }

    fn follow_block_of(&self, line: LineIndex) -> Option<BlockIndex> {
        let next = LineIndex::new(line.block, line.line + 1);
        if next.line >= self.code.line_count(line.block) {
            return None;
        }
        self.code.line(next).as_block()
    }

    /// Enters the follow block with `context`, returning its parsed items,
    /// and leaves the position on the line after the block reference.
    ///
    /// # Panics
    ///
    /// The caller must have checked [`Parser::on_follow_block`].
    pub(crate) fn parse_follow_block(
        &mut self,
        context: BlockContext,
        parent: NodeId,
    ) -> (BlockIndex, Vec<NodeId>) {
        let block = self
            .follow_block_of(self.pos.line)
            .expect("caller checked on_follow_block");
        let after = TokenIndex::new(LineIndex::new(self.pos.line.block, self.pos.line.line + 2), 0);
        let items = self.parse_block_items(block, context, parent);
        self.pos = after;
        (block, items)
    }

    /// Parses every line of `block` with the line parser `context`
    /// selects, recovering per line. Records the block in the parse
    /// cache.
    pub(crate) fn parse_block_items(
        &mut self,
        block: BlockIndex,
        context: BlockContext,
        parent: NodeId,
    ) -> Vec<NodeId> {
        let mut items = Vec::new();
        let mut line = 0;
        while line < self.code.line_count(block) {
            let line_index = LineIndex::new(block, line);

            // A block reference with no introducing line: a statement
            // context treats it as an anonymous block, everything else
            // reports it.
            if let Some(child) = self.code.line(line_index).as_block() {
                if context == BlockContext::Statement {
                    items.push(self.parse_anonymous_block(child, line_index, parent));
                } else {
                    let range = TokenRange::new(
                        TokenIndex::new(LineIndex::new(child, 0), 0),
                        self.code.block_end(child),
                    );
                    self.log_error("unexpected indented block", range);
                }
                line += 1;
                continue;
            }

            if self.code.line_is_ignorable(line_index) {
                line += 1;
                continue;
            }

            self.pos = TokenIndex::new(line_index, 0);
            let parsed = match context {
                BlockContext::ModuleItem => self.parse_module_item(parent),
                BlockContext::Statement => self.parse_statement(parent),
                BlockContext::StructMember => self.parse_definition(parent),
                BlockContext::SwitchCase => self.parse_switch_case(parent),
                BlockContext::EnumMember => self.parse_enum_member(parent),
            };

            match parsed {
                Some(item) => {
                    items.push(item);
                    if self.pos.line == line_index {
                        if !self.at_line_end() {
                            self.log_error_to_line_end("unexpected tokens at end of line");
                        }
                        line += 1;
                    } else {
                        // A follow block moved us forwards within `block`.
                        debug_assert_eq!(self.pos.line.block, block);
                        line = self.pos.line.line;
                    }
                }
                None => {
                    let message = match context {
                        BlockContext::ModuleItem => "expected a definition or import",
                        BlockContext::Statement => "could not parse statement",
                        BlockContext::StructMember => "expected a member definition",
                        BlockContext::SwitchCase => "expected 'case' or 'default'",
                        BlockContext::EnumMember => "expected an enum member",
                    };
                    self.log_error_to_line_end(message);
                    line += 1;
                }
            }
        }

        self.cache.record_block(self.code, block, &items);
        items
    }

    fn parse_anonymous_block(
        &mut self,
        child: BlockIndex,
        at: LineIndex,
        parent: NodeId,
    ) -> NodeId {
        let at_index = TokenIndex::new(at, 0);
        let statement = self.ast.alloc(
            NodeKind::Statement(Statement::Break { label: None }),
            Some(parent),
            at_index,
        );
        let block_node = self.ast.alloc(
            NodeKind::CodeBlock {
                statements: Vec::new(),
                label: None,
            },
            Some(statement),
            TokenIndex::new(LineIndex::new(child, 0), 0),
        );
        let statements = self.parse_block_items(child, BlockContext::Statement, block_node);
        self.set_block_statements(block_node, statements);
        self.ast.node_mut(block_node).range = TokenRange::new(
            TokenIndex::new(LineIndex::new(child, 0), 0),
            self.code.block_end(child),
        );
        self.ast.node_mut(statement).kind = NodeKind::Statement(Statement::Block { block: block_node });
        self.ast.node_mut(statement).range =
            TokenRange::new(at_index, TokenIndex::new(LineIndex::new(at.block, at.line + 1), 0));
        statement
    }

    /// Parses the follow block as a code block node; reports a missing
    /// body otherwise.
    pub(crate) fn parse_code_block(&mut self, parent: NodeId, label: Option<Ident>) -> NodeId {
        let block_node = self.ast.alloc(
            NodeKind::CodeBlock {
                statements: Vec::new(),
                label,
            },
            Some(parent),
            self.pos,
        );
        if self.on_follow_block() {
            let (block, statements) = self.parse_follow_block(BlockContext::Statement, block_node);
            self.set_block_statements(block_node, statements);
            self.ast.node_mut(block_node).range = TokenRange::new(
                TokenIndex::new(LineIndex::new(block, 0), 0),
                self.code.block_end(block),
            );
        } else {
            self.log_error_to_line_end("expected an indented block");
        }
        block_node
    }

    pub(crate) fn set_block_statements(&mut self, block_node: NodeId, statements: Vec<NodeId>) {
        if let NodeKind::CodeBlock {
            statements: slot, ..
        } = &mut self.ast.node_mut(block_node).kind
        {
            *slot = statements;
        }
    }

    pub(crate) fn assign_module_items(&mut self, module: NodeId, items: Vec<NodeId>) {
        let mut definitions = Vec::new();
        let mut imports = Vec::new();
        for item in items {
            match self.ast.node(item).kind {
                NodeKind::ProjectImport { .. } => imports.push(item),
                _ => definitions.push(item),
            }
        }
        if let NodeKind::Module {
            definitions: defs,
            imports: imps,
        } = &mut self.ast.node_mut(module).kind
        {
            *defs = definitions;
            *imps = imports;
        }
    }

    // ------------------------------------------------------------------
    // Recovery primitives
    // ------------------------------------------------------------------

    /// Searches the current line from the current position for a token
    /// matching `predicate` at parenthesis depth zero. With
    /// `starting_inside_parenthesis`, one unmatched closing parenthesis
    /// is also a hit.
    pub(crate) fn search_token(
        &self,
        starting_inside_parenthesis: bool,
        predicate: impl Fn(&Token) -> bool,
    ) -> Option<usize> {
        if !self.code.line_valid(self.pos.line) {
            return None;
        }
        let tokens = self.code.tokens_of(self.pos.line);
        let count = self.code.significant_token_count(self.pos.line);
        let mut stack: Vec<ParenthesisKind> = Vec::new();

        for index in self.pos.token..count {
            let token = &tokens[index];
            if let TokenKind::Parenthesis(parenthesis) = token.kind {
                if parenthesis.is_open {
                    stack.push(parenthesis.kind);
                    continue;
                }
                match stack.last() {
                    Some(open) if *open == parenthesis.kind => {
                        stack.pop();
                        continue;
                    }
                    Some(_) => continue,
                    None => {
                        if starting_inside_parenthesis && predicate(token) {
                            return Some(index);
                        }
                        continue;
                    }
                }
            }
            if stack.is_empty() && predicate(token) {
                return Some(index);
            }
        }
        None
    }

    /// Consumes the closing parenthesis of `kind`, reporting and skipping
    /// stray tokens before it. Returns `false` when the close is missing
    /// on this line.
    pub(crate) fn finish_parenthesis(&mut self, kind: ParenthesisKind) -> bool {
        let close = upp_source::Parenthesis {
            kind,
            is_open: false,
        };
        if matches!(self.peek(0), Some(t) if t.kind == TokenKind::Parenthesis(close)) {
            self.advance();
            return true;
        }

        let found = self.search_token(true, |t| t.kind == TokenKind::Parenthesis(close));
        match found {
            Some(index) => {
                let to = TokenIndex::new(self.pos.line, index);
                self.log_error_to("unexpected tokens before closing parenthesis", to);
                self.advance();
                true
            }
            None => false,
        }
    }

    /// Parses `open item (, item)* close`, recovering per item by
    /// skipping to the next comma or the closing parenthesis at this
    /// depth. The caller must be positioned on the opening parenthesis.
    pub(crate) fn parse_parenthesized_list(
        &mut self,
        kind: ParenthesisKind,
        parent: NodeId,
        mut item: impl FnMut(&mut Parser<'a>, NodeId) -> Option<NodeId>,
    ) -> Vec<NodeId> {
        let open = upp_source::Parenthesis {
            kind,
            is_open: true,
        };
        let close = upp_source::Parenthesis {
            kind,
            is_open: false,
        };
        debug_assert!(matches!(self.peek(0), Some(t) if t.kind == TokenKind::Parenthesis(open)));
        self.advance();

        let mut items = Vec::new();
        loop {
            if self.at_line_end() {
                self.log_error_to_line_end("unclosed parenthesis");
                break;
            }
            if matches!(self.peek(0), Some(t) if t.kind == TokenKind::Parenthesis(close)) {
                self.advance();
                break;
            }

            let parsed = item(self, parent);
            match parsed {
                Some(node) => {
                    items.push(node);
                    if self.accept_operator(Operator::Comma) {
                        continue;
                    }
                    if matches!(self.peek(0), Some(t) if t.kind == TokenKind::Parenthesis(close)) {
                        self.advance();
                        break;
                    }
                }
                None => {}
            }

            // Recover: skip to the next comma or the close at this depth.
            let next = self.search_token(true, |t| {
                t.kind == TokenKind::Operator(Operator::Comma)
                    || t.kind == TokenKind::Parenthesis(close)
            });
            match next {
                Some(index) => {
                    let token_kind = self.code.tokens_of(self.pos.line)[index].kind;
                    let to = TokenIndex::new(self.pos.line, index);
                    self.log_error_to("could not parse list item", to);
                    self.advance();
                    if token_kind == TokenKind::Parenthesis(close) {
                        break;
                    }
                }
                None => {
                    self.log_error_to_line_end("unclosed parenthesis");
                    break;
                }
            }
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;
    use upp_base::identifier_pool;

    fn parse_text(text: &str) -> ParseResult {
        let code = SourceCode::from_text(text, identifier_pool());
        parse(&code)
    }

    fn module_definitions(result: &ParseResult) -> Vec<NodeId> {
        match &result.ast.node(result.root).kind {
            NodeKind::Module { definitions, .. } => definitions.clone(),
            _ => panic!("root is not a module"),
        }
    }

    #[test]
    fn parses_trivial_function() {
        let result = parse_text("main :: () -> i32\n    return 0\n");
        assert_eq!(result.errors, vec![]);
        let defs = module_definitions(&result);
        assert_eq!(defs.len(), 1);
        match &result.ast.node(defs[0]).kind {
            NodeKind::Definition {
                is_comptime,
                name,
                value,
                ..
            } => {
                assert!(*is_comptime);
                assert_eq!(identifier_pool().resolve_owned(*name), "main");
                let value = value.expect("definition has value");
                assert!(matches!(
                    result.ast.node(value).kind,
                    NodeKind::Expression(Expression::Function { .. })
                ));
            }
            other => panic!("expected definition, got {other:?}"),
        }
    }

    #[test]
    fn parse_is_idempotent() {
        let text = "main :: () -> i32\n    x := 1\n    return x\n";
        let a = parse_text(text);
        let b = parse_text(text);
        assert_eq!(a.errors, b.errors);
        assert_eq!(a.ast.nodes.len(), b.ast.nodes.len());
        // Structural comparison over the whole tree.
        for (id, node) in a.ast.nodes.iter() {
            let other = b.ast.node(id);
            assert_eq!(format!("{:?}", node.kind), format!("{:?}", other.kind));
            assert_eq!(node.range, other.range);
        }
    }

    #[test]
    fn unconsumed_tokens_are_reported() {
        let result = parse_text("main :: () -> i32\n    return 0 0\n");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "unexpected tokens at end of line");
    }

    #[test]
    fn bad_module_line_is_reported_and_skipped() {
        let result = parse_text("???\nvalid :: 1\n");
        assert!(!result.errors.is_empty());
        assert_eq!(module_definitions(&result).len(), 1);
    }

    #[test]
    fn list_recovery_skips_to_comma() {
        let result = parse_text("f :: (a: i32, ???, c: i32) -> i32\n    return 0\n");
        assert!(!result.errors.is_empty());
        let defs = module_definitions(&result);
        let value = match &result.ast.node(defs[0]).kind {
            NodeKind::Definition { value, .. } => value.unwrap(),
            _ => panic!(),
        };
        let signature = match &result.ast.node(value).kind {
            NodeKind::Expression(Expression::Function { signature, .. }) => *signature,
            other => panic!("expected function, got {other:?}"),
        };
        match &result.ast.node(signature).kind {
            NodeKind::Expression(Expression::FunctionSignature { parameters, .. }) => {
                assert_eq!(parameters.len(), 2, "recovered both good parameters");
            }
            other => panic!("expected signature, got {other:?}"),
        }
    }

    #[test]
    fn bounding_ranges_contain_children() {
        let result = parse_text("main :: () -> i32\n    return 1 + 2\n");
        let code = SourceCode::from_text("main :: () -> i32\n    return 1 + 2\n", identifier_pool());
        for (id, node) in result.ast.nodes.iter() {
            assert!(code
                .token_index_order(node.bounding_range.start, node.range.start)
                .is_le());
            assert!(code
                .token_index_order(node.range.end, node.bounding_range.end)
                .is_le());
            for child in result.ast.children(id) {
                let child_bounding = result.ast.node(child).bounding_range;
                assert!(code
                    .token_index_order(node.bounding_range.start, child_bounding.start)
                    .is_le());
                assert!(code
                    .token_index_order(child_bounding.end, node.bounding_range.end)
                    .is_le());
            }
        }
    }

    #[test]
    fn comment_and_empty_lines_are_skipped() {
        let result = parse_text("// header\n\nmain :: () -> i32\n    return 0\n");
        assert_eq!(result.errors, vec![]);
        assert_eq!(module_definitions(&result).len(), 1);
    }
}
