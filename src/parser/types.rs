//! Parser Types and Constants
//!
//! Shared types and limits used across parser modules.

use thiserror::Error;

use crate::parser::lexer::{Token, TokenType};

// Parser limits to prevent hangs and resource exhaustion
pub const MAX_INPUT_SIZE: usize = 10_000_000;
pub const MAX_TOKENS: usize = 100_000;
pub const MAX_PARSER_DEPTH: usize = 200;

/// Stable machine-readable codes for parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorCode {
    UnexpectedToken,
    ExpectedToken,
    UnexpectedEof,
    InvalidFunctionName,
    InvalidRedirect,
    MissingDone,
    MissingFi,
    MissingEsac,
    InvalidArithmetic,
    TooDeep,
    InputTooLarge,
    LexFailure,
}

impl ParseErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnexpectedToken => "unexpected-token",
            Self::ExpectedToken => "expected-token",
            Self::UnexpectedEof => "unexpected-eof",
            Self::InvalidFunctionName => "invalid-function-name",
            Self::InvalidRedirect => "invalid-redirect",
            Self::MissingDone => "missing-done",
            Self::MissingFi => "missing-fi",
            Self::MissingEsac => "missing-esac",
            Self::InvalidArithmetic => "invalid-arithmetic",
            Self::TooDeep => "too-deep",
            Self::InputTooLarge => "input-too-large",
            Self::LexFailure => "lex-failure",
        }
    }
}

/// How the parser reacts to errors.
///
/// - `Strict`: fail on the first error.
/// - `Collect`: record the error, synchronize to the next statement
///   separator, and keep parsing.
/// - `Recover`: panic-mode skip to a sync point (`;`, newline, `fi`, `done`,
///   `esac`, EOF) and resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    #[default]
    Strict,
    Collect,
    Recover,
}

/// A parse failure, carrying the position, the expected-token set, the
/// offending token, and a stable error code.
#[derive(Debug, Clone, Error)]
#[error("syntax error at {line}:{column}: {message}")]
pub struct ParseException {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub code: ParseErrorCode,
    pub expected: Vec<TokenType>,
    pub found: Option<TokenType>,
}

impl ParseException {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            code: ParseErrorCode::UnexpectedToken,
            expected: Vec::new(),
            found: None,
        }
    }

    pub fn with_code(mut self, code: ParseErrorCode) -> Self {
        self.code = code;
        self
    }

    pub fn with_expected(mut self, expected: Vec<TokenType>) -> Self {
        self.expected = expected;
        self
    }

    pub fn at_token(message: impl Into<String>, token: &Token) -> Self {
        let mut e = Self::new(message, token.line, token.column);
        e.found = Some(token.kind);
        e
    }
}

/// Sync points used by panic-mode recovery.
pub fn is_sync_point(t: TokenType) -> bool {
    matches!(
        t,
        TokenType::Semicolon
            | TokenType::Newline
            | TokenType::Fi
            | TokenType::Done
            | TokenType::Esac
            | TokenType::Eof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(ParseErrorCode::MissingFi.as_str(), "missing-fi");
        assert_eq!(ParseErrorCode::UnexpectedToken.as_str(), "unexpected-token");
    }

    #[test]
    fn test_sync_points() {
        assert!(is_sync_point(TokenType::Semicolon));
        assert!(is_sync_point(TokenType::Done));
        assert!(!is_sync_point(TokenType::Word));
    }
}
