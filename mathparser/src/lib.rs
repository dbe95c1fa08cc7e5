//! FILENAME: mathparser/src/lib.rs
//! PURPOSE: Library root for the mission-script expression compiler.
//! CONTEXT: This crate turns one algebraic expression string from a
//! mission control script into an evaluatable expression tree, via a
//! hand-rolled precedence-driven decomposition algorithm.
//!
//! PIPELINE: Expression String --> Decomposer --> (op, left, right)
//! triples --> TreeBuilder --> MathNode AST --> Evaluate/EvaluateMatrix
//!
//! SUPPORTED FEATURES:
//! - Arithmetic: +, -, *, /, ^ (power)
//! - Sign digraphs: a+-b, a--b resolve to a single net operator
//! - Matrix operators: transpose ('), inverse (^(-1))
//! - Real functions: sin, cos, tan, asin, acos, atan, atan2, log, log10,
//!   exp, sqrt, abs
//! - Matrix functions: transpose, det, inv, norm, cross, dot
//! - Unit conversions: degToRad, radToDeg
//! - Array element references: vec(4,1), with expression subscripts
//! - User-defined script functions, discovered by name before definition
//! - Parentheses for grouping; scientific-notation literals

pub mod ast;
pub mod catalog;
pub mod decompose;
pub mod error;
pub mod tree;
pub mod value;


// Re-export commonly used types for convenience
pub use ast::{
    BinaryOp, EvalContext, FunctionRunner, MathNode, ObjectScope, UnaryOp,
};
pub use catalog::{BuiltinFunction, FileLocator, FunctionCatalog, NoFunctionFiles, Signature};
pub use decompose::{Decomposed, DecomposedOp, Decomposer};
pub use error::{MathError, MathResult};
pub use tree::{parse, TreeBuilder};
pub use value::{Matrix, OutputInfo, Value};
