//! Source model for the Upp language.
//!
//! This crate owns everything that happens *before* parsing:
//!
//! - [`token`]: the token vocabulary (identifiers, keywords, literals,
//!   operators, parentheses) produced by the lexer.
//! - [`lexer`]: per-line tokenisation. A token never crosses a line
//!   boundary; identifiers and string literals intern through the
//!   process-wide identifier pool.
//! - [`source`]: the block-structured source text. A block owns lines; a
//!   line is either text (with a token cache) or a reference to a nested
//!   child block. Indices ([`BlockIndex`], [`LineIndex`], [`TextIndex`],
//!   [`TokenIndex`]) stay stable across edits within a session.
//! - [`history`]: every mutation expressed as one of four atomic changes,
//!   recorded in an append-only undo/redo DAG with grouped complex
//!   commands and minimal-path change extraction between timestamps.

pub mod history;
pub mod lexer;
pub mod source;
pub mod token;

pub use history::{Change, CodeChange, CodeHistory, HistoryTimestamp};
pub use source::{
    BlockIndex, LineIndex, SourceBlock, SourceCode, SourceLine, TextIndex, TextLine, TokenIndex,
    TokenRange,
};
pub use token::{Keyword, LiteralValue, Operator, Parenthesis, ParenthesisKind, Token, TokenKind};
