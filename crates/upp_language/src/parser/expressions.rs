//! Expression parsing: precedence climbing plus prefix/postfix chains.
//!
//! Binop precedence uses the fixed grammar groups (see
//! [`crate::ast::Binop::priority`]); ties associate left. Postfix chains
//! cover member access, array access, calls and the typed initialisers
//! `T.{...}` / `T.[...]`. Types are ordinary expressions (`*T`, `[4]T`,
//! `[]T`, function signatures), so everything routes through here.

use upp_base::Ident;
use upp_source::{Keyword, Operator, ParenthesisKind, TokenKind, TokenRange};

use crate::ast::{Binop, CastKind, Expression, NodeId, NodeKind, StructureKind, Unop};

use super::{BlockContext, Parser};

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self, parent: NodeId) -> Option<NodeId> {
        self.parse_binop_expression(0, parent)
    }

    /// Like [`Parser::parse_expression`], but reports a missing
    /// expression and yields an error node instead of failing.
    pub(crate) fn parse_expression_or_error(&mut self, parent: NodeId) -> NodeId {
        match self.parse_expression(parent) {
            Some(expr) => expr,
            None => {
                self.log_error(
                    "expected an expression",
                    TokenRange::empty_at(self.pos),
                );
                self.alloc_error_expression(parent)
            }
        }
    }

    pub(crate) fn alloc_error_expression(&mut self, parent: NodeId) -> NodeId {
        self.ast
            .alloc(NodeKind::Expression(Expression::Error), Some(parent), self.pos)
    }

    fn current_binop(&self) -> Option<Binop> {
        let token = self.peek(0)?;
        let TokenKind::Operator(op) = token.kind else {
            return None;
        };
        Some(match op {
            Operator::And => Binop::And,
            Operator::Or => Binop::Or,
            Operator::Equals => Binop::Equal,
            Operator::NotEquals => Binop::NotEqual,
            Operator::PointerEquals => Binop::PointerEqual,
            Operator::PointerNotEquals => Binop::PointerNotEqual,
            Operator::LessThan => Binop::Less,
            Operator::LessEqual => Binop::LessOrEqual,
            Operator::GreaterThan => Binop::Greater,
            Operator::GreaterEqual => Binop::GreaterOrEqual,
            Operator::Addition => Binop::Addition,
            Operator::Subtraction => Binop::Subtraction,
            Operator::Multiply => Binop::Multiplication,
            Operator::Division => Binop::Division,
            Operator::Modulo => Binop::Modulo,
            _ => return None,
        })
    }

    fn parse_binop_expression(&mut self, min_priority: u8, parent: NodeId) -> Option<NodeId> {
        let start = self.pos;
        let mut left = self.parse_prefixed(parent)?;

        while let Some(op) = self.current_binop() {
            let priority = op.priority();
            if priority < min_priority {
                break;
            }
            self.advance();

            let node = self.ast.alloc(
                NodeKind::Expression(Expression::Error),
                Some(parent),
                start,
            );
            let right = match self.parse_binop_expression(priority + 1, node) {
                Some(right) => right,
                None => {
                    self.log_error(
                        "expected an expression after operator",
                        TokenRange::empty_at(self.pos),
                    );
                    self.alloc_error_expression(node)
                }
            };
            self.ast.node_mut(left).parent = Some(node);
            self.ast.node_mut(node).kind =
                NodeKind::Expression(Expression::Binop { op, left, right });
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            left = node;
        }
        Some(left)
    }

    fn current_unop(&self) -> Option<Unop> {
        let token = self.peek(0)?;
        let TokenKind::Operator(op) = token.kind else {
            return None;
        };
        Some(match op {
            Operator::Not => Unop::Not,
            Operator::Subtraction => Unop::Negate,
            Operator::Multiply => Unop::Pointer,
            Operator::Ampersand => Unop::Dereference,
            _ => return None,
        })
    }

    /// Prefix operators, then a postfix chain.
    fn parse_prefixed(&mut self, parent: NodeId) -> Option<NodeId> {
        if let Some(op) = self.current_unop() {
            let start = self.pos;
            let node = self.ast.alloc(
                NodeKind::Expression(Expression::Error),
                Some(parent),
                start,
            );
            self.advance();
            let operand = match self.parse_prefixed(node) {
                Some(operand) => operand,
                None => {
                    self.log_error(
                        "expected an operand",
                        TokenRange::empty_at(self.pos),
                    );
                    self.alloc_error_expression(node)
                }
            };
            self.ast.node_mut(node).kind =
                NodeKind::Expression(Expression::Unop { op, expr: operand });
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            return Some(node);
        }
        self.parse_postfixed(parent)
    }

    fn parse_prefixed_or_error(&mut self, parent: NodeId) -> NodeId {
        match self.parse_prefixed(parent) {
            Some(expr) => expr,
            None => {
                self.log_error("expected a type expression", TokenRange::empty_at(self.pos));
                self.alloc_error_expression(parent)
            }
        }
    }

    fn parse_postfixed(&mut self, parent: NodeId) -> Option<NodeId> {
        let start = self.pos;
        let mut expr = self.parse_primary(parent)?;

        loop {
            // `.name`, `.{...}`, `.[...]`
            if self.test_operator(Operator::Dot) {
                if let Some(name) = self.test_identifier_offset(1) {
                    let node = self.wrap_postfix(parent, expr, start);
                    self.advance();
                    self.advance();
                    self.ast.node_mut(node).kind =
                        NodeKind::Expression(Expression::MemberAccess { name, expr });
                    self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                    expr = node;
                    continue;
                }
                if self.test_parenthesis_offset('{', 1) {
                    let node = self.wrap_postfix(parent, expr, start);
                    self.advance();
                    let arguments = self.parse_parenthesized_list(
                        ParenthesisKind::Braces,
                        node,
                        |p, parent| p.parse_argument(parent),
                    );
                    self.ast.node_mut(node).kind =
                        NodeKind::Expression(Expression::StructInitializer {
                            type_expr: Some(expr),
                            arguments,
                        });
                    self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                    expr = node;
                    continue;
                }
                if self.test_parenthesis_offset('[', 1) {
                    let node = self.wrap_postfix(parent, expr, start);
                    self.advance();
                    let values = self.parse_parenthesized_list(
                        ParenthesisKind::Brackets,
                        node,
                        |p, parent| p.parse_expression(parent),
                    );
                    self.ast.node_mut(node).kind =
                        NodeKind::Expression(Expression::ArrayInitializer {
                            type_expr: Some(expr),
                            values,
                        });
                    self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                    expr = node;
                    continue;
                }
                break;
            }

            // `[index]`
            if self.test_parenthesis('[') {
                let node = self.wrap_postfix(parent, expr, start);
                self.advance();
                let index = self.parse_expression_or_error(node);
                if !self.finish_parenthesis(ParenthesisKind::Brackets) {
                    self.log_error_to_line_end("unclosed '['");
                }
                self.ast.node_mut(node).kind =
                    NodeKind::Expression(Expression::ArrayAccess { array: expr, index });
                self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                expr = node;
                continue;
            }

            // `(arguments)`
            if self.test_parenthesis('(') {
                let node = self.wrap_postfix(parent, expr, start);
                let arguments = self.parse_parenthesized_list(
                    ParenthesisKind::Parenthesis,
                    node,
                    |p, parent| p.parse_argument(parent),
                );
                self.ast.node_mut(node).kind =
                    NodeKind::Expression(Expression::Call { expr, arguments });
                self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                expr = node;
                continue;
            }

            break;
        }
        Some(expr)
    }

    /// Allocates the wrapping postfix node and hangs `expr` under it.
    fn wrap_postfix(
        &mut self,
        parent: NodeId,
        expr: NodeId,
        start: upp_source::TokenIndex,
    ) -> NodeId {
        let node = self.ast.alloc(
            NodeKind::Expression(Expression::Error),
            Some(parent),
            start,
        );
        self.ast.node_mut(expr).parent = Some(node);
        node
    }

    fn parse_primary(&mut self, parent: NodeId) -> Option<NodeId> {
        let start = self.pos;

        // Literals
        if let Some(token) = self.peek(0) {
            if let TokenKind::Literal(value) = token.kind {
                let node = self.ast.alloc(
                    NodeKind::Expression(Expression::Literal { value }),
                    Some(parent),
                    start,
                );
                self.advance();
                self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                return Some(node);
            }
        }

        // Symbol reads (with `~` paths)
        if self.test_identifier().is_some() {
            return Some(self.parse_symbol_read_expression(parent));
        }

        // Function signatures and functions: `()`, `(name:`, `($name`
        if self.test_parenthesis('(')
            && (self.test_parenthesis_offset(')', 1)
                || (self.test_identifier_offset(1).is_some()
                    && self.test_operator_offset(Operator::Colon, 2))
                || (self.test_operator_offset(Operator::Dollar, 1)
                    && self.test_identifier_offset(2).is_some()))
        {
            return Some(self.parse_function_signature(parent));
        }

        // Parenthesised expression
        if self.test_parenthesis('(') {
            self.advance();
            let inner = self.parse_expression_or_error(parent);
            if !self.finish_parenthesis(ParenthesisKind::Parenthesis) {
                self.log_error_to_line_end("unclosed '('");
            }
            return Some(inner);
        }

        // Array and slice types: `[size]T`, `[]T`
        if self.test_parenthesis('[') {
            let node = self.ast.alloc(
                NodeKind::Expression(Expression::Error),
                Some(parent),
                start,
            );
            self.advance();
            if self.accept_parenthesis(']') {
                let element = self.parse_prefixed_or_error(node);
                self.ast.node_mut(node).kind =
                    NodeKind::Expression(Expression::SliceType { element });
            } else {
                let size = self.parse_expression_or_error(node);
                if !self.finish_parenthesis(ParenthesisKind::Brackets) {
                    self.log_error_to_line_end("unclosed '['");
                }
                let element = self.parse_prefixed_or_error(node);
                self.ast.node_mut(node).kind =
                    NodeKind::Expression(Expression::ArrayType { size, element });
            }
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            return Some(node);
        }

        // `.name` auto-enum, `.{...}` / `.[...]` inferred initialisers
        if self.test_operator(Operator::Dot) {
            if let Some(name) = self.test_identifier_offset(1) {
                let node = self.ast.alloc(
                    NodeKind::Expression(Expression::AutoEnum { name }),
                    Some(parent),
                    start,
                );
                self.advance();
                self.advance();
                self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                return Some(node);
            }
            if self.test_parenthesis_offset('{', 1) {
                let node = self.ast.alloc(
                    NodeKind::Expression(Expression::Error),
                    Some(parent),
                    start,
                );
                self.advance();
                let arguments = self.parse_parenthesized_list(
                    ParenthesisKind::Braces,
                    node,
                    |p, parent| p.parse_argument(parent),
                );
                self.ast.node_mut(node).kind =
                    NodeKind::Expression(Expression::StructInitializer {
                        type_expr: None,
                        arguments,
                    });
                self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                return Some(node);
            }
            if self.test_parenthesis_offset('[', 1) {
                let node = self.ast.alloc(
                    NodeKind::Expression(Expression::Error),
                    Some(parent),
                    start,
                );
                self.advance();
                let values = self.parse_parenthesized_list(
                    ParenthesisKind::Brackets,
                    node,
                    |p, parent| p.parse_expression(parent),
                );
                self.ast.node_mut(node).kind =
                    NodeKind::Expression(Expression::ArrayInitializer {
                        type_expr: None,
                        values,
                    });
                self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                return Some(node);
            }
            return None;
        }

        self.parse_keyword_expression(parent)
    }

    fn parse_keyword_expression(&mut self, parent: NodeId) -> Option<NodeId> {
        let start = self.pos;

        if self.test_keyword(Keyword::New) {
            let node = self.ast.alloc(
                NodeKind::Expression(Expression::Error),
                Some(parent),
                start,
            );
            self.advance();
            let count = if self.test_parenthesis('[') {
                self.advance();
                let count = self.parse_expression_or_error(node);
                if !self.finish_parenthesis(ParenthesisKind::Brackets) {
                    self.log_error_to_line_end("unclosed '[' in new expression");
                }
                Some(count)
            } else {
                None
            };
            let type_expr = self.parse_prefixed_or_error(node);
            self.ast.node_mut(node).kind =
                NodeKind::Expression(Expression::New { type_expr, count });
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            return Some(node);
        }

        let cast_kind = if self.test_keyword(Keyword::Cast) {
            Some(CastKind::TypeToType)
        } else if self.test_keyword(Keyword::CastPtr) {
            Some(CastKind::RawToPtr)
        } else if self.test_keyword(Keyword::CastRaw) {
            Some(CastKind::PtrToRaw)
        } else {
            None
        };
        if let Some(kind) = cast_kind {
            let node = self.ast.alloc(
                NodeKind::Expression(Expression::Error),
                Some(parent),
                start,
            );
            self.advance();
            let to_type = if kind != CastKind::PtrToRaw && self.test_parenthesis('(') {
                self.advance();
                let ty = self.parse_expression_or_error(node);
                if !self.finish_parenthesis(ParenthesisKind::Parenthesis) {
                    self.log_error_to_line_end("unclosed '(' in cast");
                }
                Some(ty)
            } else {
                None
            };
            let operand = self.parse_prefixed_or_error(node);
            self.ast.node_mut(node).kind = NodeKind::Expression(Expression::Cast {
                kind,
                to_type,
                operand,
            });
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            return Some(node);
        }

        if self.test_keyword(Keyword::Bake) {
            let node = self.ast.alloc(
                NodeKind::Expression(Expression::Error),
                Some(parent),
                start,
            );
            self.advance();
            if self.on_follow_block() {
                let block = self.parse_code_block(node, None);
                self.ast.node_mut(node).kind =
                    NodeKind::Expression(Expression::BakeBlock { block });
            } else {
                let expr = self.parse_prefixed_or_error(node);
                self.ast.node_mut(node).kind = NodeKind::Expression(Expression::BakeExpr { expr });
            }
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            return Some(node);
        }

        let structure_kind = if self.test_keyword(Keyword::Struct) {
            Some(StructureKind::Struct)
        } else if self.test_keyword(Keyword::Union) {
            Some(StructureKind::Union)
        } else if self.test_keyword(Keyword::CUnion) {
            Some(StructureKind::CUnion)
        } else {
            None
        };
        if let Some(kind) = structure_kind {
            let node = self.ast.alloc(
                NodeKind::Expression(Expression::Error),
                Some(parent),
                start,
            );
            self.advance();
            let members = if self.on_follow_block() {
                let (_, members) = self.parse_follow_block(BlockContext::StructMember, node);
                members
            } else {
                self.log_error_to_line_end("expected an indented member block");
                Vec::new()
            };
            self.ast.node_mut(node).kind =
                NodeKind::Expression(Expression::StructureType { kind, members });
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            return Some(node);
        }

        if self.test_keyword(Keyword::Enum) {
            let node = self.ast.alloc(
                NodeKind::Expression(Expression::Error),
                Some(parent),
                start,
            );
            self.advance();
            let members = if self.on_follow_block() {
                let (_, members) = self.parse_follow_block(BlockContext::EnumMember, node);
                members
            } else {
                self.log_error_to_line_end("expected an indented member block");
                Vec::new()
            };
            self.ast.node_mut(node).kind = NodeKind::Expression(Expression::EnumType { members });
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            return Some(node);
        }

        if self.test_keyword(Keyword::Module) {
            let node = self.ast.alloc(
                NodeKind::Expression(Expression::Error),
                Some(parent),
                start,
            );
            self.advance();
            let module = self.ast.alloc(
                NodeKind::Module {
                    definitions: Vec::new(),
                    imports: Vec::new(),
                },
                Some(node),
                start,
            );
            if self.on_follow_block() {
                let (block, items) = self.parse_follow_block(BlockContext::ModuleItem, module);
                self.assign_module_items(module, items);
                self.ast.node_mut(module).range = TokenRange::new(
                    upp_source::TokenIndex::new(upp_source::LineIndex::new(block, 0), 0),
                    self.code.block_end(block),
                );
            } else {
                self.log_error_to_line_end("expected an indented module block");
                self.ast.node_mut(module).range = TokenRange::new(start, self.pos);
            }
            self.ast.node_mut(node).kind = NodeKind::Expression(Expression::Module { module });
            self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
            return Some(node);
        }

        None
    }

    fn parse_symbol_read_expression(&mut self, parent: NodeId) -> NodeId {
        let start = self.pos;
        let expr_node = self.ast.alloc(
            NodeKind::Expression(Expression::Error),
            Some(parent),
            start,
        );

        let name = self.test_identifier().expect("caller checked identifier");
        let head = self.ast.alloc(
            NodeKind::SymbolRead {
                name,
                path_child: None,
            },
            Some(expr_node),
            start,
        );
        self.advance();
        self.ast.node_mut(head).range = TokenRange::new(start, self.pos);

        let mut tail = head;
        while self.test_operator(Operator::Tilde) {
            self.advance();
            let child_start = self.pos;
            let child = match self.test_identifier() {
                Some(child_name) => {
                    let child = self.ast.alloc(
                        NodeKind::SymbolRead {
                            name: child_name,
                            path_child: None,
                        },
                        Some(tail),
                        child_start,
                    );
                    self.advance();
                    self.ast.node_mut(child).range = TokenRange::new(child_start, self.pos);
                    child
                }
                None => {
                    self.log_error(
                        "expected an identifier after '~'",
                        TokenRange::empty_at(self.pos),
                    );
                    self.ast.alloc(
                        NodeKind::SymbolRead {
                            name: Ident::EMPTY,
                            path_child: None,
                        },
                        Some(tail),
                        child_start,
                    )
                }
            };
            if let NodeKind::SymbolRead { path_child, .. } = &mut self.ast.node_mut(tail).kind {
                *path_child = Some(child);
            }
            tail = child;
            if matches!(
                &self.ast.node(child).kind,
                NodeKind::SymbolRead { name, .. } if *name == Ident::EMPTY
            ) {
                break;
            }
        }

        self.ast.node_mut(expr_node).kind =
            NodeKind::Expression(Expression::SymbolRead { read: head });
        self.ast.node_mut(expr_node).range = TokenRange::new(start, self.pos);
        expr_node
    }

    fn parse_function_signature(&mut self, parent: NodeId) -> NodeId {
        let start = self.pos;
        let signature = self.ast.alloc(
            NodeKind::Expression(Expression::Error),
            Some(parent),
            start,
        );
        let parameters = self.parse_parenthesized_list(
            ParenthesisKind::Parenthesis,
            signature,
            |p, parent| p.parse_parameter(parent),
        );
        let return_type = if self.accept_operator(Operator::Arrow) {
            Some(self.parse_expression_or_error(signature))
        } else {
            None
        };
        self.ast.node_mut(signature).kind = NodeKind::Expression(Expression::FunctionSignature {
            parameters,
            return_type,
        });
        self.ast.node_mut(signature).range = TokenRange::new(start, self.pos);

        if !self.on_follow_block() {
            return signature;
        }

        // A body follows: the signature becomes part of a function.
        let function = self.ast.alloc(
            NodeKind::Expression(Expression::Error),
            Some(parent),
            start,
        );
        self.ast.node_mut(signature).parent = Some(function);
        let body = self.parse_code_block(function, None);
        self.ast.node_mut(function).kind =
            NodeKind::Expression(Expression::Function { signature, body });
        self.ast.node_mut(function).range = TokenRange::new(start, self.pos);
        function
    }

    fn parse_parameter(&mut self, parent: NodeId) -> Option<NodeId> {
        let checkpoint = self.checkpoint();
        let start = self.pos;
        let is_comptime = self.accept_operator(Operator::Dollar);

        let Some(name) = self.test_identifier() else {
            self.rollback(checkpoint);
            return None;
        };
        self.advance();
        if !self.accept_operator(Operator::Colon) {
            self.rollback(checkpoint);
            return None;
        }

        let node = self.ast.alloc(
            NodeKind::Parameter {
                is_comptime,
                name,
                type_expr: NodeId::from_index(0), // overwritten below
                default_value: None,
            },
            Some(parent),
            start,
        );
        let type_expr = self.parse_expression_or_error(node);
        let default_value = if self.accept_operator(Operator::Assign) {
            Some(self.parse_expression_or_error(node))
        } else {
            None
        };

        if let NodeKind::Parameter {
            type_expr: t,
            default_value: d,
            ..
        } = &mut self.ast.node_mut(node).kind
        {
            *t = type_expr;
            *d = default_value;
        }
        self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
        Some(node)
    }

    fn parse_argument(&mut self, parent: NodeId) -> Option<NodeId> {
        let start = self.pos;

        // `name = value` named argument
        if let Some(name) = self.test_identifier() {
            if self.test_operator_offset(Operator::Assign, 1) {
                let node = self.ast.alloc(
                    NodeKind::Argument {
                        name: Some(name),
                        value: NodeId::from_index(0), // overwritten below
                    },
                    Some(parent),
                    start,
                );
                self.advance();
                self.advance();
                let value = self.parse_expression_or_error(node);
                if let NodeKind::Argument { value: slot, .. } = &mut self.ast.node_mut(node).kind {
                    *slot = value;
                }
                self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
                return Some(node);
            }
        }

        let node = self.ast.alloc(
            NodeKind::Argument {
                name: None,
                value: NodeId::from_index(0), // overwritten below
            },
            Some(parent),
            start,
        );
        let Some(value) = self.parse_expression(node) else {
            self.ast.nodes.truncate(node.index());
            return None;
        };
        if let NodeKind::Argument { value: slot, .. } = &mut self.ast.node_mut(node).kind {
            *slot = value;
        }
        self.ast.node_mut(node).range = TokenRange::new(start, self.pos);
        Some(node)
    }
}
