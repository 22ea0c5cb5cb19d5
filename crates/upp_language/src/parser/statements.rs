//! Line parsers: module items, definitions, statements, switch cases and
//! enum members.
//!
//! Each parser is invoked with the position at the start of a non-empty,
//! non-comment line and either returns a node (position advanced past
//! everything it consumed, possibly including follow blocks) or rolls
//! back to the line start and returns `None`.

use upp_source::{Keyword, LiteralValue, Operator, TokenKind, TokenRange};

use crate::ast::{Binop, NodeId, NodeKind, Statement};

use super::{BlockContext, Parser};

impl<'a> Parser<'a> {
    /// `import "file"` or a top-level definition.
    pub(crate) fn parse_module_item(&mut self, parent: NodeId) -> Option<NodeId> {
        if self.test_keyword(Keyword::Import) {
            let checkpoint = self.checkpoint();
            let start = self.pos;
            self.advance();
            let filename = match self.peek(0) {
                Some(token) => match token.kind {
                    TokenKind::Literal(LiteralValue::String(name)) => Some(name),
                    _ => None,
                },
                None => None,
            };
            let Some(filename) = filename else {
                self.rollback(checkpoint);
                return None;
            };
            self.advance();
            let node = self
                .ast
                .alloc(NodeKind::ProjectImport { filename }, Some(parent), start);
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            return Some(node);
        }
        self.parse_definition(parent)
    }

    /// All definition forms:
    ///
    /// ```text
    /// name :: value          comptime
    /// name := value          inferred variable
    /// name : type            declared variable
    /// name : type = value    declared + initialised
    /// name : type : value    comptime with explicit type
    /// ```
    pub(crate) fn parse_definition(&mut self, parent: NodeId) -> Option<NodeId> {
        let checkpoint = self.checkpoint();
        let start = self.pos;
        let name = self.test_identifier()?;

        let is_define = self.test_operator_offset(Operator::DefineComptime, 1)
            || self.test_operator_offset(Operator::DefineInfer, 1)
            || self.test_operator_offset(Operator::Colon, 1);
        if !is_define {
            return None;
        }
        self.advance(); // name

        let node = self.ast.alloc(
            NodeKind::Definition {
                is_comptime: false,
                name,
                type_expr: None,
                value: None,
            },
            Some(parent),
            start,
        );

        let mut is_comptime = false;
        let mut type_expr = None;
        let mut value = None;

        if self.accept_operator(Operator::DefineComptime) {
            is_comptime = true;
            value = Some(self.parse_expression_or_error(node));
        } else if self.accept_operator(Operator::DefineInfer) {
            value = Some(self.parse_expression_or_error(node));
        } else {
            self.advance(); // ':'
            type_expr = Some(self.parse_expression_or_error(node));
            if self.accept_operator(Operator::Assign) {
                value = Some(self.parse_expression_or_error(node));
            } else if self.accept_operator(Operator::Colon) {
                is_comptime = true;
                value = Some(self.parse_expression_or_error(node));
            }
        }

        // A definition that parsed no pieces at all is not a definition.
        if type_expr.is_none() && value.is_none() {
            self.rollback(checkpoint);
            return None;
        }

        if let NodeKind::Definition {
            is_comptime: c,
            type_expr: t,
            value: v,
            ..
        } = &mut self.ast.node_mut(node).kind
        {
            *c = is_comptime;
            *t = type_expr;
            *v = value;
        }
        self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
        Some(node)
    }

    pub(crate) fn parse_statement(&mut self, parent: NodeId) -> Option<NodeId> {
        let checkpoint = self.checkpoint();
        let start = self.pos;

        // Placeholder node so children can point at their parent; the
        // kind is overwritten before returning.
        let node = self.ast.alloc(
            NodeKind::Statement(Statement::Break { label: None }),
            Some(parent),
            start,
        );

        let statement = if self.accept_keyword(Keyword::If) {
            let condition = self.parse_expression_or_error(node);
            let block = self.parse_code_block(node, None);
            let else_block = self.parse_else_block(node);
            Some(Statement::If {
                condition,
                block,
                else_block,
            })
        } else if self.accept_keyword(Keyword::While) {
            let condition = self.parse_expression_or_error(node);
            let block = self.parse_code_block(node, None);
            Some(Statement::While { condition, block })
        } else if self.accept_keyword(Keyword::Defer) {
            let block = if self.on_follow_block() {
                self.parse_code_block(node, None)
            } else {
                // Single-statement defer gets a synthetic block.
                let block_node = self.ast.alloc(
                    NodeKind::CodeBlock {
                        statements: Vec::new(),
                        label: None,
                    },
                    Some(node),
                    self.pos,
                );
                let block_start = self.pos;
                match self.parse_statement(block_node) {
                    Some(statement) => self.set_block_statements(block_node, vec![statement]),
                    None => self.log_error_to_line_end("expected a statement after 'defer'"),
                }
                self.ast.node_mut(block_node).range = TokenRange::new(block_start, self.pos);
                block_node
            };
            Some(Statement::Defer { block })
        } else if self.accept_keyword(Keyword::Switch) {
            let condition = self.parse_expression_or_error(node);
            let cases = if self.on_follow_block() {
                let (_, cases) = self.parse_follow_block(BlockContext::SwitchCase, node);
                cases
            } else {
                self.log_error_to_line_end("expected an indented block of cases");
                Vec::new()
            };
            Some(Statement::Switch { condition, cases })
        } else if self.accept_keyword(Keyword::Break) {
            let label = self.test_identifier();
            if label.is_some() {
                self.advance();
            }
            Some(Statement::Break { label })
        } else if self.accept_keyword(Keyword::Continue) {
            let label = self.test_identifier();
            if label.is_some() {
                self.advance();
            }
            Some(Statement::Continue { label })
        } else if self.accept_keyword(Keyword::Return) {
            let value = if self.at_line_end() {
                None
            } else {
                Some(self.parse_expression_or_error(node))
            };
            Some(Statement::Return { value })
        } else if self.accept_keyword(Keyword::Delete) {
            let expr = self.parse_expression_or_error(node);
            Some(Statement::Delete { expr })
        } else {
            self.parse_label_definition_or_expression_statement(node)
        };

        match statement {
            Some(statement) => {
                self.ast.node_mut(node).kind = NodeKind::Statement(statement);
                self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                Some(node)
            }
            None => {
                self.rollback(checkpoint);
                None
            }
        }
    }

    /// The `else` continuation of an `if`, when the line the position
    /// landed on starts with `else`.
    fn parse_else_block(&mut self, parent: NodeId) -> Option<NodeId> {
        if self.pos.token != 0 || !self.test_keyword(Keyword::Else) {
            return None;
        }
        self.advance();

        if self.test_keyword(Keyword::If) {
            // `else if`: wrap the chained if in a synthetic block.
            let block_node = self.ast.alloc(
                NodeKind::CodeBlock {
                    statements: Vec::new(),
                    label: None,
                },
                Some(parent),
                self.pos,
            );
            let start = self.pos;
            match self.parse_statement(block_node) {
                Some(statement) => self.set_block_statements(block_node, vec![statement]),
                None => self.log_error_to_line_end("could not parse 'else if'"),
            }
            self.ast.node_mut(block_node).range = TokenRange::new(start, self.pos);
            return Some(block_node);
        }

        Some(self.parse_code_block(parent, None))
    }

    /// Labeled blocks, definitions, assignments and expression statements.
    fn parse_label_definition_or_expression_statement(
        &mut self,
        node: NodeId,
    ) -> Option<Statement> {
        // `label:` followed by nothing but an indented block.
        if let Some(label) = self.test_identifier() {
            if self.test_operator_offset(Operator::Colon, 1)
                && self.code.significant_token_count(self.pos.line) == self.pos.token + 2
            {
                self.advance();
                self.advance();
                let block = self.parse_code_block(node, Some(label));
                return Some(Statement::Block { block });
            }
        }

        if let Some(definition) = self.parse_definition(node) {
            self.ast.node_mut(definition).parent = Some(node);
            return Some(Statement::Definition { definition });
        }

        let expr = self.parse_expression(node)?;
        let compound = [
            (Operator::Assign, None),
            (Operator::AssignAdd, Some(Binop::Addition)),
            (Operator::AssignSub, Some(Binop::Subtraction)),
            (Operator::AssignMult, Some(Binop::Multiplication)),
            (Operator::AssignDiv, Some(Binop::Division)),
            (Operator::AssignModulo, Some(Binop::Modulo)),
        ];
        for (operator, op) in compound {
            if self.accept_operator(operator) {
                let right = self.parse_expression_or_error(node);
                return Some(Statement::Assignment {
                    left: expr,
                    right,
                    op,
                });
            }
        }
        Some(Statement::Expression { expr })
    }

    /// `case expr` or `default`, each with a follow block.
    pub(crate) fn parse_switch_case(&mut self, parent: NodeId) -> Option<NodeId> {
        let start = self.pos;
        let node = self.ast.alloc(
            NodeKind::SwitchCase {
                value: None,
                block: NodeId::from_index(0), // overwritten below
            },
            Some(parent),
            start,
        );

        let value = if self.accept_keyword(Keyword::Case) {
            Some(self.parse_expression_or_error(node))
        } else if self.accept_keyword(Keyword::Default) {
            None
        } else {
            self.ast.nodes.truncate(node.index());
            return None;
        };

        let block = self.parse_code_block(node, None);
        self.ast.node_mut(node).kind = NodeKind::SwitchCase { value, block };
        self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
        Some(node)
    }

    /// `NAME` or `NAME :: value`.
    pub(crate) fn parse_enum_member(&mut self, parent: NodeId) -> Option<NodeId> {
        let start = self.pos;
        let name = self.test_identifier()?;
        self.advance();

        let node = self.ast.alloc(
            NodeKind::EnumMember { name, value: None },
            Some(parent),
            start,
        );
        let value = if self.accept_operator(Operator::DefineComptime) {
            Some(self.parse_expression_or_error(node))
        } else {
            None
        };
        if let NodeKind::EnumMember { value: slot, .. } = &mut self.ast.node_mut(node).kind {
            *slot = value;
        }
        self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
        Some(node)
    }
}
