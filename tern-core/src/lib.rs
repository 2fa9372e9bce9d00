//! Core of the Tern compiler.
//!
//! Tern is an indentation-sensitive, statically typed language compiled
//! ahead of time to x86-64 assembly. The pipeline is strictly sequential:
//!
//!   source .tern
//!     -> lexer     (tokens with INDENT/DEDENT)
//!     -> parser    (AST)
//!     -> sema      (scopes, types, frame sizes)
//!     -> lower     (virtual-register IR)
//!     -> regalloc  (naive or linear scan)
//!     -> codegen   (AT&T assembly text)
//!
//! The CLI and the tests drive the pipeline through `compiler`; no pass
//! needs to be called directly.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;
pub mod context;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, symbols, analysis
// ---------------------------------------------------------------------

pub mod types;
pub mod symbols;
pub mod builtins;
pub mod sema;

// ---------------------------------------------------------------------
// Back-end: IR, register allocation, x86-64 emission
// ---------------------------------------------------------------------

pub mod x86;
pub mod ir;
pub mod lower;
pub mod regalloc;
pub mod codegen;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{
    CompilationArtifact, CompileOptions, compile, compile_file, dump_ast, dump_tokens,
};
pub use diagnostic::{Diagnostic, Phase, Severity};
pub use error::CoreError;
pub use regalloc::AllocStrategy;
