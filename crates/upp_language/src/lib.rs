//! Syntax layer of the Upp compiler: AST and parser.
//!
//! The parser consumes the token caches of a
//! [`upp_source::SourceCode`] block tree and produces an arena-allocated
//! AST ([`ast::Ast`]) plus a structured error list. Parsing is
//! per-block: each block is parsed with a context-appropriate line parser
//! (module item, statement, definition, switch case, enum member), and a
//! per-block cache supports incremental re-parse after edits.

pub mod ast;
pub mod block_parse;
pub mod parser;

pub use ast::{Ast, Node, NodeId, NodeKind};
pub use block_parse::{affected_blocks, reparse, BlockParse, ParseCache};
pub use parser::{parse, ParseError, ParseResult};
