//! Abstract Syntax Tree types for shell programs.
//!
//! Architecture:
//!   Input → Lexer → Parser → AST → Expansion → Evaluator

pub mod types;

pub use types::*;
