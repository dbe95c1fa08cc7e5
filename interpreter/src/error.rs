//! FILENAME: interpreter/src/error.rs
//! PURPOSE: Block-level errors and the session error list.
//! CONTEXT: The dispatcher is the sole catch point for everything raised
//! while classifying, parsing, or executing a block. Each caught error
//! becomes an `ErrorEntry` carrying the block's original line span, so the
//! end-of-run report names where in the script the problem lives instead
//! of a generic "somewhere" message.

use mathparser::MathError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error raised while handling one block.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpretError {
    /// Raised by the expression compiler while decomposing, building, or
    /// evaluating the right-hand side of an assignment.
    #[error(transparent)]
    Math(#[from] MathError),

    /// The block fits none of the known shapes (comment, definition,
    /// command, assignment).
    #[error("Cannot classify block: {0}")]
    Classify(String),

    /// A malformed object-definition block.
    #[error("Invalid definition: {0}")]
    Definition(String),

    /// A malformed assignment block.
    #[error("Invalid assignment: {0}")]
    Assignment(String),
}

pub type InterpretResult<T> = Result<T, InterpretError>;

impl InterpretError {
    /// True if the block should be re-queued for the second pass instead
    /// of failing outright.
    pub fn is_deferrable(&self) -> bool {
        matches!(self, InterpretError::Math(e) if e.is_deferrable())
    }
}

/// One entry of the session error list, reported at end of run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub first_line: usize,
    pub last_line: usize,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(first_line: usize, last_line: usize, error: &InterpretError) -> Self {
        ErrorEntry {
            first_line,
            last_line,
            message: error.to_string(),
        }
    }
}
