//! FILENAME: mathparser/src/error.rs
//! PURPOSE: Error taxonomy for expression decomposition and evaluation.
//! CONTEXT: The decomposer and tree builder raise these typed errors with
//! human-readable messages; the block dispatcher in the interpreter crate is
//! the sole catch point and converts them into session error-list entries.
//!
//! TAXONOMY:
//! - Syntax: unbalanced parentheses, missing operand, invalid trailing
//!   operator after a function call, malformed numeric literal. Fatal to the
//!   block being parsed, never silently repaired.
//! - UnresolvedReference: a name not found in any scope at parse time. Not
//!   immediately fatal; triggers deferral to the second pass.
//! - Semantic: wrong operand count/kind, scalar evaluation of a matrix-typed
//!   node or vice versa, non-numeric value where a number is required.

use thiserror::Error;

/// Errors raised while decomposing, building, or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MathError {
    /// Malformed expression text. Fatal to the current block.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// One or more names could not be resolved in any scope. Carries every
    /// unresolved name at once rather than failing on the first.
    #[error("Undefined name(s): {}", .0.join(", "))]
    UnresolvedReference(Vec<String>),

    /// The expression is well formed but meaningless: shape mismatches,
    /// wrong argument counts, missing function signatures.
    #[error("Semantic error: {0}")]
    Semantic(String),
}

pub type MathResult<T> = Result<T, MathError>;

impl MathError {
    /// Convenience constructor for syntax errors.
    pub fn syntax(message: impl Into<String>) -> Self {
        MathError::Syntax(message.into())
    }

    /// Convenience constructor for semantic errors.
    pub fn semantic(message: impl Into<String>) -> Self {
        MathError::Semantic(message.into())
    }

    /// Returns true if this error should defer the enclosing block to the
    /// second interpretation pass instead of failing it outright.
    pub fn is_deferrable(&self) -> bool {
        matches!(self, MathError::UnresolvedReference(_))
    }
}
