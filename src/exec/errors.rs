//! Evaluation errors and non-local control flow
//!
//! `break`/`continue`/`return`/`exit` unwind the evaluator as typed errors:
//! every loop frame decrements the level of a `Break`/`Continue` and stops
//! the propagation when it reaches zero; function frames absorb `Return`;
//! only the shell's top level (or a subshell boundary) handles `Exit`.

use thiserror::Error;

use crate::expansion::ExpansionError;

/// Non-local exits carrying their target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Break(u32),
    Continue(u32),
    Return(i32),
    Exit(i32),
}

#[derive(Debug, Clone, Error)]
pub enum ExecError {
    #[error("control flow")]
    Flow(ControlFlow),
    #[error(transparent)]
    Expansion(#[from] ExpansionError),
    #[error("{context}: {message}")]
    Redirect { context: String, message: String },
    /// Fatal conditions (POSIX special-builtin violations, `set -u` in a
    /// non-interactive shell): the shell exits with `status`.
    #[error("{message}")]
    Fatal { status: i32, message: String },
}

impl ExecError {
    pub fn flow(flow: ControlFlow) -> Self {
        Self::Flow(flow)
    }

    pub fn exit(status: i32) -> Self {
        Self::Flow(ControlFlow::Exit(status))
    }

    pub fn redirect(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Redirect {
            context: context.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_construction() {
        assert!(matches!(
            ExecError::exit(3),
            ExecError::Flow(ControlFlow::Exit(3))
        ));
    }
}
