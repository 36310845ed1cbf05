//! Error types for specification parsing and monitoring.

use orbit_models::FrameIndex;
use thiserror::Error;

/// Result type for specification parsing.
pub type FormatResult<T> = Result<T, FormatError>;

/// Result type for automaton operations.
pub type AutomatonResult<T> = Result<T, AutomatonError>;

/// A malformed specification. Always raised before any frame is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Specification is empty")]
    Empty,

    #[error("Proposition declared more than once: {0}")]
    DuplicateDeclaration(String),

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Unknown proposition: {0}")]
    UnknownProposition(String),

    #[error("Proposition not used in specification: {0}")]
    UnusedProposition(String),

    #[error("Proposition used more than once: {0}")]
    RepeatedProposition(String),

    #[error("{0} is missing an operand")]
    MissingOperand(String),

    #[error("Unbalanced parentheses")]
    UnbalancedParentheses,

    #[error("Unterminated quoted proposition")]
    UnterminatedQuote,

    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("Specification has more than one UNTIL")]
    MultipleUntil,

    #[error("UNTIL must be the top-level operator")]
    NestedUntil,
}

impl FormatError {
    pub fn missing_operand(operator: impl Into<String>) -> Self {
        Self::MissingOperand(operator.into())
    }
}

/// Misuse of the monitor by its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutomatonError {
    #[error("Frame {got} admitted after frame {previous}; frames must be strictly increasing")]
    OutOfOrder { previous: FrameIndex, got: FrameIndex },

    #[error("Epoch already accepted at frame {0}; reset before admitting more frames")]
    EpochAccepted(FrameIndex),
}
