//! Error types for expression compilation

use crate::{MAX_NESTING, MAX_VARIABLE_LEN};
use thiserror::Error;

/// Expression text does not match the grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at position {position}")]
pub struct SyntaxError {
    /// Byte offset of the offending input
    pub position: usize,
    /// What went wrong
    pub kind: SyntaxErrorKind,
}

impl SyntaxError {
    pub(crate) fn new(position: usize, kind: SyntaxErrorKind) -> Self {
        Self { position, kind }
    }
}

/// Kinds of syntax errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// A character that cannot start any token
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),

    /// A valid token in an invalid place
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    /// Input ended before the expression was complete
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// Variable name exceeds the allowed length
    #[error("variable name longer than {} characters", MAX_VARIABLE_LEN)]
    VariableTooLong,

    /// Parentheses nested too deeply
    #[error("parentheses nested deeper than {} levels", MAX_NESTING)]
    NestingTooDeep,
}
