//! Structural atoms for the Upp compiler.
//!
//! This crate provides the two building blocks every later stage leans on:
//!
//! - [`Arena`] / [`Id`]: index-based arenas. Nodes reference each other
//!   (including child→parent links) through `u32` ids instead of borrows,
//!   and a parser checkpoint can roll allocations back by truncation.
//! - [`Interner`] / [`Ident`]: string interning with integer handles, plus
//!   the process-wide, lock-guarded [`IdentifierPool`] shared by every
//!   compilation.

pub mod arena;
pub mod intern;

pub use arena::{Arena, Id};
pub use intern::{identifier_pool, Ident, IdentifierPool, Interner, PoolLock};
