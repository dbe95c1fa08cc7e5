//! FILENAME: interpreter/src/lib.rs
//! PURPOSE: Library root for the two-pass mission-script block interpreter.
//! CONTEXT: Consumes logical script blocks, classifies each as a comment,
//! object definition, command, or assignment, and dispatches it. Equation
//! right-hand sides route through the mathparser crate's expression
//! compiler. Blocks referencing names not yet defined are deferred and
//! retried exactly once after the main pass.
//!
//! PIPELINE: Script Text --> Blocks --> Classify --> Dispatch
//! (equation RHS --> mathparser --> AST --> Evaluate) --> Scope updates,
//! deferred queue, session error list

pub mod block;
pub mod dispatcher;
pub mod error;
pub mod scope;

// Register the separate tests module
#[cfg(test)]
mod tests;

// Re-export commonly used types for convenience
pub use block::{Block, Classification, COMMAND_KEYWORDS};
pub use dispatcher::{Effect, Outcome, Session, SessionConfig};
pub use error::{ErrorEntry, InterpretError, InterpretResult};
pub use scope::{Entry, PropertyKind, SessionScope};
