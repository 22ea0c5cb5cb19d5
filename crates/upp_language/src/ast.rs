//! The abstract syntax tree.
//!
//! Nodes live in an index arena owned by the [`Ast`]; children reference
//! parents (and vice versa) through [`NodeId`]s, never through borrows.
//! Every node carries its exclusive token range `[start, end)` plus a
//! bounding range covering all descendants, maintained by
//! [`Ast::correct_token_ranges`] after parsing.
//!
//! Dispatch over node kinds is a match on the [`NodeKind`] tag. Resolved
//! symbols and types are *not* stored here — the analyser keeps them in
//! side tables keyed by `NodeId`, so the AST stays immutable after the
//! range post-pass.

use upp_base::{Arena, Id, Ident};
use upp_source::{LiteralValue, SourceCode, TokenIndex, TokenRange};

pub type NodeId = Id<Node>;

/// One AST node: kind payload plus tree and range bookkeeping.
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub range: TokenRange,
    pub bounding_range: TokenRange,
}

/// Binary operators, grouped by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binop {
    Addition,
    Subtraction,
    Division,
    Multiplication,
    Modulo,
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    PointerEqual,
    PointerNotEqual,
}

impl Binop {
    /// Precedence group; higher binds tighter. Ties associate left.
    pub fn priority(self) -> u8 {
        match self {
            Binop::And => 0,
            Binop::Or => 1,
            Binop::Equal | Binop::NotEqual | Binop::PointerEqual | Binop::PointerNotEqual => 2,
            Binop::Less | Binop::LessOrEqual | Binop::Greater | Binop::GreaterOrEqual => 3,
            Binop::Addition | Binop::Subtraction => 4,
            Binop::Multiplication | Binop::Division => 5,
            Binop::Modulo => 6,
        }
    }
}

/// Unary prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unop {
    /// `!`
    Not,
    /// `-`
    Negate,
    /// `*` — take a pointer (also forms pointer types)
    Pointer,
    /// `&` — read through a pointer
    Dereference,
}

/// The three cast forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// `cast_raw x` — pointer to raw address
    PtrToRaw,
    /// `cast_ptr(*T) x` — raw address to pointer
    RawToPtr,
    /// `cast(T) x` — numeric conversion
    TypeToType,
}

/// Struct-like aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    Struct,
    Union,
    CUnion,
}

/// Expression payloads.
#[derive(Debug)]
pub enum Expression {
    Binop {
        op: Binop,
        left: NodeId,
        right: NodeId,
    },
    Unop {
        op: Unop,
        expr: NodeId,
    },
    Call {
        expr: NodeId,
        arguments: Vec<NodeId>,
    },
    New {
        type_expr: NodeId,
        count: Option<NodeId>,
    },
    Cast {
        kind: CastKind,
        to_type: Option<NodeId>,
        operand: NodeId,
    },
    ArrayInitializer {
        type_expr: Option<NodeId>,
        values: Vec<NodeId>,
    },
    StructInitializer {
        type_expr: Option<NodeId>,
        arguments: Vec<NodeId>,
    },
    /// `.name` — enum member with inferred enum type.
    AutoEnum {
        name: Ident,
    },
    BakeExpr {
        expr: NodeId,
    },
    BakeBlock {
        block: NodeId,
    },
    /// Head of a [`SymbolRead`] chain.
    SymbolRead {
        read: NodeId,
    },
    Literal {
        value: LiteralValue,
    },
    ArrayAccess {
        array: NodeId,
        index: NodeId,
    },
    MemberAccess {
        name: Ident,
        expr: NodeId,
    },
    Module {
        module: NodeId,
    },
    Function {
        signature: NodeId,
        body: NodeId,
    },
    FunctionSignature {
        parameters: Vec<NodeId>,
        return_type: Option<NodeId>,
    },
    StructureType {
        kind: StructureKind,
        members: Vec<NodeId>,
    },
    EnumType {
        members: Vec<NodeId>,
    },
    ArrayType {
        size: NodeId,
        element: NodeId,
    },
    SliceType {
        element: NodeId,
    },
    /// Placeholder produced by error recovery.
    Error,
}

/// Statement payloads.
#[derive(Debug)]
pub enum Statement {
    Definition {
        definition: NodeId,
    },
    Block {
        block: NodeId,
    },
    Assignment {
        left: NodeId,
        right: NodeId,
        /// `Some` for compound assignments (`+=`, `-=`, ...), applied as
        /// load-modify-store.
        op: Option<Binop>,
    },
    Expression {
        expr: NodeId,
    },
    Defer {
        block: NodeId,
    },
    If {
        condition: NodeId,
        block: NodeId,
        else_block: Option<NodeId>,
    },
    While {
        condition: NodeId,
        block: NodeId,
    },
    Switch {
        condition: NodeId,
        cases: Vec<NodeId>,
    },
    Break {
        label: Option<Ident>,
    },
    Continue {
        label: Option<Ident>,
    },
    Return {
        value: Option<NodeId>,
    },
    Delete {
        expr: NodeId,
    },
}

/// Node kind payloads.
#[derive(Debug)]
pub enum NodeKind {
    /// Top-level or nested `module`: definitions plus project imports.
    Module {
        definitions: Vec<NodeId>,
        imports: Vec<NodeId>,
    },
    /// `name :: value`, `name := value`, `name: type = value`, ...
    Definition {
        is_comptime: bool,
        name: Ident,
        type_expr: Option<NodeId>,
        value: Option<NodeId>,
    },
    CodeBlock {
        statements: Vec<NodeId>,
        /// Break/continue target introduced by `label:` before the block.
        label: Option<Ident>,
    },
    Statement(Statement),
    Expression(Expression),
    /// Call argument with optional name (`foo(x = 1)`).
    Argument {
        name: Option<Ident>,
        value: NodeId,
    },
    /// Function parameter; `$name` marks a comptime parameter.
    Parameter {
        is_comptime: bool,
        name: Ident,
        type_expr: NodeId,
        default_value: Option<NodeId>,
    },
    EnumMember {
        name: Ident,
        value: Option<NodeId>,
    },
    /// `case value` with block, or `default` (no value) with block.
    SwitchCase {
        value: Option<NodeId>,
        block: NodeId,
    },
    /// One hop of an `A~B~c` path; `path_child` is the next hop.
    SymbolRead {
        name: Ident,
        path_child: Option<NodeId>,
    },
    /// `import "file"`
    ProjectImport {
        filename: Ident,
    },
}

/// The AST: node arena plus the root module.
#[derive(Debug, Default)]
pub struct Ast {
    pub nodes: Arena<Node>,
    pub root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Ast {
        Ast {
            nodes: Arena::new(),
            root: None,
        }
    }

    /// Allocates a node with a placeholder range; the parser fills the
    /// range in on parse success.
    pub fn alloc(&mut self, kind: NodeKind, parent: Option<NodeId>, at: TokenIndex) -> NodeId {
        self.nodes.alloc(Node {
            kind,
            parent,
            range: TokenRange::empty_at(at),
            bounding_range: TokenRange::empty_at(at),
        })
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Children in syntactic order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let push_opt = |out: &mut Vec<NodeId>, id: &Option<NodeId>| {
            if let Some(id) = id {
                out.push(*id);
            }
        };
        match &self.nodes[id].kind {
            NodeKind::Module {
                definitions,
                imports,
            } => {
                out.extend(imports.iter().copied());
                out.extend(definitions.iter().copied());
            }
            NodeKind::Definition {
                type_expr, value, ..
            } => {
                push_opt(&mut out, type_expr);
                push_opt(&mut out, value);
            }
            NodeKind::CodeBlock { statements, .. } => out.extend(statements.iter().copied()),
            NodeKind::Statement(statement) => match statement {
                Statement::Definition { definition } => out.push(*definition),
                Statement::Block { block } => out.push(*block),
                Statement::Assignment { left, right, .. } => {
                    out.push(*left);
                    out.push(*right);
                }
                Statement::Expression { expr } => out.push(*expr),
                Statement::Defer { block } => out.push(*block),
                Statement::If {
                    condition,
                    block,
                    else_block,
                } => {
                    out.push(*condition);
                    out.push(*block);
                    push_opt(&mut out, else_block);
                }
                Statement::While { condition, block } => {
                    out.push(*condition);
                    out.push(*block);
                }
                Statement::Switch { condition, cases } => {
                    out.push(*condition);
                    out.extend(cases.iter().copied());
                }
                Statement::Break { .. } | Statement::Continue { .. } => {}
                Statement::Return { value } => push_opt(&mut out, value),
                Statement::Delete { expr } => out.push(*expr),
            },
            NodeKind::Expression(expression) => match expression {
                Expression::Binop { left, right, .. } => {
                    out.push(*left);
                    out.push(*right);
                }
                Expression::Unop { expr, .. } => out.push(*expr),
                Expression::Call { expr, arguments } => {
                    out.push(*expr);
                    out.extend(arguments.iter().copied());
                }
                Expression::New { type_expr, count } => {
                    push_opt(&mut out, count);
                    out.push(*type_expr);
                }
                Expression::Cast {
                    to_type, operand, ..
                } => {
                    push_opt(&mut out, to_type);
                    out.push(*operand);
                }
                Expression::ArrayInitializer { type_expr, values } => {
                    push_opt(&mut out, type_expr);
                    out.extend(values.iter().copied());
                }
                Expression::StructInitializer {
                    type_expr,
                    arguments,
                } => {
                    push_opt(&mut out, type_expr);
                    out.extend(arguments.iter().copied());
                }
                Expression::AutoEnum { .. } | Expression::Literal { .. } | Expression::Error => {}
                Expression::BakeExpr { expr } => out.push(*expr),
                Expression::BakeBlock { block } => out.push(*block),
                Expression::SymbolRead { read } => out.push(*read),
                Expression::ArrayAccess { array, index } => {
                    out.push(*array);
                    out.push(*index);
                }
                Expression::MemberAccess { expr, .. } => out.push(*expr),
                Expression::Module { module } => out.push(*module),
                Expression::Function { signature, body } => {
                    out.push(*signature);
                    out.push(*body);
                }
                Expression::FunctionSignature {
                    parameters,
                    return_type,
                } => {
                    out.extend(parameters.iter().copied());
                    push_opt(&mut out, return_type);
                }
                Expression::StructureType { members, .. } => out.extend(members.iter().copied()),
                Expression::EnumType { members } => out.extend(members.iter().copied()),
                Expression::ArrayType { size, element } => {
                    out.push(*size);
                    out.push(*element);
                }
                Expression::SliceType { element } => out.push(*element),
            },
            NodeKind::Argument { value, .. } => out.push(*value),
            NodeKind::Parameter {
                type_expr,
                default_value,
                ..
            } => {
                out.push(*type_expr);
                push_opt(&mut out, default_value);
            }
            NodeKind::EnumMember { value, .. } => push_opt(&mut out, value),
            NodeKind::SwitchCase { value, block } => {
                push_opt(&mut out, value);
                out.push(*block);
            }
            NodeKind::SymbolRead { path_child, .. } => push_opt(&mut out, path_child),
            NodeKind::ProjectImport { .. } => {}
        }
        out
    }

    /// Flattens an `A~B~c` read chain into its identifiers.
    pub fn symbol_read_path(&self, mut read: NodeId) -> Vec<(NodeId, Ident)> {
        let mut path = Vec::new();
        loop {
            let NodeKind::SymbolRead { name, path_child } = &self.nodes[read].kind else {
                panic!("not a symbol read");
            };
            path.push((read, *name));
            match path_child {
                Some(child) => read = *child,
                None => break,
            }
        }
        path
    }

    /// Post-pass over token ranges (spec'd behaviour of the parser):
    ///
    /// - ranges straddling a block boundary are snapped back so start and
    ///   end share a block,
    /// - every node's bounding range contains its own range and all
    ///   children's bounding ranges,
    /// - zero-length ranges may only remain on error expressions, empty
    ///   code blocks and empty symbol reads (checked in debug builds).
    pub fn correct_token_ranges(&mut self, root: NodeId, code: &SourceCode) {
        self.correct_node(root, code);
    }

    fn correct_node(&mut self, id: NodeId, code: &SourceCode) {
        let mut range = self.nodes[id].range;
        range = snap_range_to_block(range, code);
        let mut bounding = range;

        for child in self.children(id) {
            self.correct_node(child, code);
            let child_bounding = self.nodes[child].bounding_range;
            if code
                .token_index_order(child_bounding.start, bounding.start)
                .is_lt()
            {
                bounding.start = child_bounding.start;
            }
            if code
                .token_index_order(child_bounding.end, bounding.end)
                .is_gt()
            {
                bounding.end = child_bounding.end;
            }
        }

        let node = &mut self.nodes[id];
        node.range = range;
        node.bounding_range = bounding;

        #[cfg(debug_assertions)]
        if node.range.is_empty() {
            let allowed = match &node.kind {
                NodeKind::Expression(Expression::Error) => true,
                NodeKind::CodeBlock { statements, .. } => statements.is_empty(),
                NodeKind::SymbolRead { name, .. } => *name == Ident::EMPTY,
                _ => false,
            };
            debug_assert!(allowed, "zero-length range on {:?}", node.kind);
        }
    }

    /// The deepest node whose bounding range contains `index`.
    pub fn find_node_at(
        &self,
        root: NodeId,
        code: &SourceCode,
        index: TokenIndex,
    ) -> Option<NodeId> {
        fn contains(code: &SourceCode, range: TokenRange, index: TokenIndex) -> bool {
            code.token_index_order(range.start, index).is_le()
                && code.token_index_order(index, range.end).is_lt()
        }

        if !contains(code, self.nodes[root].bounding_range, index) {
            return None;
        }
        let mut current = root;
        'descend: loop {
            for child in self.children(current) {
                if contains(code, self.nodes[child].bounding_range, index) {
                    current = child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }
}

/// Snaps a cross-block range back to the block where it started: the end
/// index is pulled up out of nested blocks to just behind the reference
/// line, and an end in an unrelated block clamps to the start block's
/// end-of-block marker.
fn snap_range_to_block(range: TokenRange, code: &SourceCode) -> TokenRange {
    let mut range = range;
    if range.start.line.block == range.end.line.block {
        return range;
    }

    // Walk the end's block chain upwards looking for the start's block.
    let mut block = range.end.line.block;
    while !block.is_root() {
        let ref_line = code.block_ref_line(block);
        if ref_line.block == range.start.line.block {
            range.end = TokenIndex::new(
                upp_source::LineIndex::new(ref_line.block, ref_line.line + 1),
                0,
            );
            return range;
        }
        block = ref_line.block;
    }

    range.end = code.block_end(range.start.line.block);
    range
}

#[cfg(test)]
mod tests {
    use super::*;
    use upp_source::{BlockIndex, LineIndex};

    fn token_index(line: usize, token: usize) -> TokenIndex {
        TokenIndex::new(LineIndex::new(BlockIndex::ROOT, line), token)
    }

    #[test]
    fn alloc_sets_parent_link() {
        let mut ast = Ast::new();
        let module = ast.alloc(
            NodeKind::Module {
                definitions: vec![],
                imports: vec![],
            },
            None,
            token_index(0, 0),
        );
        let definition = ast.alloc(
            NodeKind::Definition {
                is_comptime: false,
                name: Ident::EMPTY,
                type_expr: None,
                value: None,
            },
            Some(module),
            token_index(0, 0),
        );
        assert_eq!(ast.node(definition).parent, Some(module));
    }

    #[test]
    fn children_follow_syntactic_order() {
        let mut ast = Ast::new();
        let at = token_index(0, 0);
        let left = ast.alloc(
            NodeKind::Expression(Expression::Literal {
                value: LiteralValue::Integer(1),
            }),
            None,
            at,
        );
        let right = ast.alloc(
            NodeKind::Expression(Expression::Literal {
                value: LiteralValue::Integer(2),
            }),
            None,
            at,
        );
        let binop = ast.alloc(
            NodeKind::Expression(Expression::Binop {
                op: Binop::Addition,
                left,
                right,
            }),
            None,
            at,
        );
        assert_eq!(ast.children(binop), vec![left, right]);
    }

    #[test]
    fn binop_priorities_match_grammar_groups() {
        assert!(Binop::And.priority() < Binop::Or.priority());
        assert!(Binop::Or.priority() < Binop::Equal.priority());
        assert!(Binop::Equal.priority() < Binop::Less.priority());
        assert!(Binop::Less.priority() < Binop::Addition.priority());
        assert!(Binop::Addition.priority() < Binop::Multiplication.priority());
        assert!(Binop::Multiplication.priority() < Binop::Modulo.priority());
    }

    #[test]
    fn symbol_read_path_flattens_chain() {
        let mut ast = Ast::new();
        let at = token_index(0, 0);
        let leaf = ast.alloc(
            NodeKind::SymbolRead {
                name: Ident::EMPTY,
                path_child: None,
            },
            None,
            at,
        );
        let head = ast.alloc(
            NodeKind::SymbolRead {
                name: Ident::EMPTY,
                path_child: Some(leaf),
            },
            None,
            at,
        );
        let path = ast.symbol_read_path(head);
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].0, head);
        assert_eq!(path[1].0, leaf);
    }
}
