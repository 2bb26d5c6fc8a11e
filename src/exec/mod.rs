//! Evaluation: the tree-walking evaluator and its process runtime.

pub mod control_flow;
pub mod errors;
pub mod evaluator;
pub mod launcher;
pub mod pipeline;
pub mod redirect;
pub mod strategy;

pub use errors::{ControlFlow, ExecError};
