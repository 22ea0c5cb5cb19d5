//! Semantics and execution for the Upp language.
//!
//! This crate turns a parsed AST into a runnable program and runs it:
//!
//! - [`symbols`]: scoped symbol tables with path lookup (`A~B~c`).
//! - [`types`]: the type interner with size/alignment layout.
//! - [`analysis`]: name resolution, type checking and comptime
//!   evaluation, scheduled over a dependency graph with an explicit
//!   worklist.
//! - [`ir`]: the intermediate program — typed registers plus
//!   register/memory-addressed instructions per function.
//! - [`bytecode`]: stack layout and the flat instruction stream.
//! - [`interpreter`]: the switch-dispatched stack machine, its traps and
//!   the hardcoded host functions.
//! - [`compile`]: the editor-facing compiler facade.
//! - [`diagnostic`]: serialisable diagnostics for tooling.

pub mod analysis;
pub mod bytecode;
pub mod compile;
pub mod diagnostic;
pub mod hardcoded;
pub mod interpreter;
pub mod ir;
pub mod symbols;
pub mod types;

pub use compile::{Compilation, Compiler};
pub use diagnostic::{collect_diagnostics, Diagnostic, DiagnosticKind};
pub use hardcoded::{BufferedHost, Host, StdHost};
pub use interpreter::{ExitCode, Interpreter};
