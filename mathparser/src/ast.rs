//! FILENAME: mathparser/src/ast.rs
//! PURPOSE: The expression tree: node variants, evaluation, reference
//! collection, renaming, and non-recursive teardown.
//! CONTEXT: The tree builder produces one root `MathNode` per expression.
//! A node exclusively owns its children; there are no back-references and
//! no sharing. Scalar and matrix evaluation are separate entry points and
//! calling the wrong one for a node's shape is a semantic error, never a
//! silent coercion. Name resolution goes through the caller-supplied
//! `ObjectScope`; user-defined script functions execute through the
//! optional `FunctionRunner` collaborator.

use crate::catalog::{BuiltinFunction, FunctionCatalog};
use crate::error::{MathError, MathResult};
use crate::value::{Matrix, OutputInfo, Value};

/// Prefix/postfix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Transpose,
    Inverse,
}

/// Infix operators, lowest to highest precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

/// Name lookup against the embedding scope, local scope first and then the
/// outer/global scope. A `None` is an unresolved reference, which defers
/// the enclosing block rather than failing it.
pub trait ObjectScope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// Executes a user-defined script function with already-evaluated argument
/// values. Supplied by the embedder; sessions without script-function
/// support simply omit it.
pub trait FunctionRunner {
    fn run(&self, name: &str, args: &[Value]) -> MathResult<Value>;
}

/// Everything evaluation needs from the embedder, passed by reference into
/// each call so trees stay free of scope lifetimes.
pub struct EvalContext<'a> {
    pub scope: &'a dyn ObjectScope,
    pub catalog: &'a FunctionCatalog,
    pub runner: Option<&'a dyn FunctionRunner>,
}

impl<'a> EvalContext<'a> {
    pub fn new(scope: &'a dyn ObjectScope, catalog: &'a FunctionCatalog) -> Self {
        EvalContext {
            scope,
            catalog,
            runner: None,
        }
    }

    pub fn with_runner(mut self, runner: &'a dyn FunctionRunner) -> Self {
        self.runner = Some(runner);
        self
    }
}

/// One node of the expression tree. A closed enum: adding a node kind is a
/// compile-time-checked change everywhere the tree is matched.
#[derive(Debug, PartialEq)]
pub enum MathNode {
    /// A numeric literal.
    Literal(f64),

    /// A bare identifier or dotted object.property path.
    Identifier { name: String },

    /// An indexed array reference such as `vec(4,1)`; indices are themselves
    /// expressions, evaluated as 1-based subscripts.
    ArrayElement {
        name: String,
        row: Box<MathNode>,
        col: Option<Box<MathNode>>,
    },

    Unary {
        op: UnaryOp,
        child: Box<MathNode>,
    },

    Binary {
        op: BinaryOp,
        left: Box<MathNode>,
        right: Box<MathNode>,
    },

    /// A built-in math/matrix/unit-conversion function call.
    BuiltinCall {
        func: BuiltinFunction,
        args: Vec<MathNode>,
    },

    /// A call into a user-defined script function. Arguments are
    /// independently built subtrees in declaration order. The output shape
    /// comes from the catalog's declared signature; until the embedding
    /// scope supplies one, `output_info` fails rather than guesses.
    UserCall {
        name: String,
        args: Vec<MathNode>,
    },
}

impl MathNode {
    /// Reports the node's output shape, discovered lazily from its children
    /// (or from the declared signature for user-function calls).
    pub fn output_info(&self, ctx: &EvalContext) -> MathResult<OutputInfo> {
        match self {
            MathNode::Literal(_) => Ok(OutputInfo::Scalar),

            MathNode::Identifier { name } => match ctx.scope.lookup(name) {
                Some(value) => Ok(value.output_info()),
                None => Err(MathError::UnresolvedReference(vec![name.clone()])),
            },

            MathNode::ArrayElement { .. } => Ok(OutputInfo::Scalar),

            MathNode::Unary { op, child } => {
                let inner = child.output_info(ctx)?;
                match (op, inner) {
                    (UnaryOp::Negate, shape) => Ok(shape),
                    (UnaryOp::Transpose, OutputInfo::Scalar) => Ok(OutputInfo::Scalar),
                    (UnaryOp::Transpose, OutputInfo::Matrix { rows, cols }) => {
                        Ok(OutputInfo::Matrix {
                            rows: cols,
                            cols: rows,
                        })
                    }
                    (UnaryOp::Inverse, shape) => Ok(shape),
                }
            }

            MathNode::Binary { op, left, right } => {
                binary_output_info(*op, left.output_info(ctx)?, right.output_info(ctx)?)
            }

            MathNode::BuiltinCall { func, args } => builtin_output_info(*func, args, ctx),

            MathNode::UserCall { name, .. } => match ctx.catalog.declared_signature(name) {
                Some(signature) => Ok(signature.output),
                None => Err(MathError::semantic(format!(
                    "output of function '{}' is not yet known; its signature has \
                     not been declared",
                    name
                ))),
            },
        }
    }

    /// Scalar evaluation. A node whose shape is a matrix refuses.
    pub fn evaluate(&self, ctx: &EvalContext) -> MathResult<f64> {
        match self {
            MathNode::Literal(value) => Ok(*value),

            MathNode::Identifier { name } => match ctx.scope.lookup(name) {
                Some(value) => value.into_real(),
                None => Err(MathError::UnresolvedReference(vec![name.clone()])),
            },

            MathNode::ArrayElement { name, row, col } => {
                let matrix = match ctx.scope.lookup(name) {
                    Some(value) => value.into_matrix()?,
                    None => {
                        return Err(MathError::UnresolvedReference(vec![name.clone()]))
                    }
                };
                let row_index = subscript(row.evaluate(ctx)?, name)?;
                match col {
                    Some(col) => {
                        let col_index = subscript(col.evaluate(ctx)?, name)?;
                        if row_index > matrix.rows() || col_index > matrix.cols() {
                            return Err(MathError::semantic(format!(
                                "index ({},{}) is outside {} which is {}x{}",
                                row_index,
                                col_index,
                                name,
                                matrix.rows(),
                                matrix.cols()
                            )));
                        }
                        Ok(matrix.get(row_index - 1, col_index - 1))
                    }
                    None => {
                        // single subscript into a row or column vector
                        let len = matrix.rows() * matrix.cols();
                        if matrix.rows() != 1 && matrix.cols() != 1 {
                            return Err(MathError::semantic(format!(
                                "single index into {} requires a vector, found {}x{}",
                                name,
                                matrix.rows(),
                                matrix.cols()
                            )));
                        }
                        if row_index > len {
                            return Err(MathError::semantic(format!(
                                "index {} is outside {} which has {} elements",
                                row_index, name, len
                            )));
                        }
                        if matrix.rows() == 1 {
                            Ok(matrix.get(0, row_index - 1))
                        } else {
                            Ok(matrix.get(row_index - 1, 0))
                        }
                    }
                }
            }

            MathNode::Unary { op, child } => match op {
                UnaryOp::Negate => Ok(-child.evaluate(ctx)?),
                UnaryOp::Transpose => child.evaluate(ctx),
                UnaryOp::Inverse => {
                    let value = child.evaluate(ctx)?;
                    if value == 0.0 {
                        return Err(MathError::semantic("division by zero in inverse"));
                    }
                    Ok(1.0 / value)
                }
            },

            MathNode::Binary { op, left, right } => {
                // matrix subexpressions may still collapse to a scalar
                // (dot products, determinants); dispatch on declared shape
                let left_shape = left.output_info(ctx)?;
                let right_shape = right.output_info(ctx)?;
                if left_shape.is_matrix() || right_shape.is_matrix() {
                    return Err(MathError::semantic(format!(
                        "cannot evaluate {:?} of matrix operands as a scalar",
                        op
                    )));
                }
                let a = left.evaluate(ctx)?;
                let b = right.evaluate(ctx)?;
                match op {
                    BinaryOp::Add => Ok(a + b),
                    BinaryOp::Subtract => Ok(a - b),
                    BinaryOp::Multiply => Ok(a * b),
                    BinaryOp::Divide => {
                        if b == 0.0 {
                            return Err(MathError::semantic("division by zero"));
                        }
                        Ok(a / b)
                    }
                    BinaryOp::Power => Ok(a.powf(b)),
                }
            }

            MathNode::BuiltinCall { func, args } => evaluate_builtin(*func, args, ctx),

            MathNode::UserCall { name, args } => {
                self.run_user_function(name, args, ctx)?.into_real()
            }
        }
    }

    /// Matrix evaluation. A node whose shape is a scalar refuses.
    pub fn evaluate_matrix(&self, ctx: &EvalContext) -> MathResult<Matrix> {
        match self {
            MathNode::Literal(_) => Err(MathError::semantic(
                "cannot evaluate a numeric literal as a matrix",
            )),

            MathNode::Identifier { name } => match ctx.scope.lookup(name) {
                Some(value) => value.into_matrix(),
                None => Err(MathError::UnresolvedReference(vec![name.clone()])),
            },

            MathNode::ArrayElement { name, .. } => Err(MathError::semantic(format!(
                "element of {} is a scalar, not a matrix",
                name
            ))),

            MathNode::Unary { op, child } => match op {
                UnaryOp::Negate => Ok(child.evaluate_matrix(ctx)?.scale(-1.0)),
                UnaryOp::Transpose => Ok(child.evaluate_matrix(ctx)?.transpose()),
                UnaryOp::Inverse => child.evaluate_matrix(ctx)?.inverse(),
            },

            MathNode::Binary { op, left, right } => {
                evaluate_binary_matrix(*op, left, right, ctx)
            }

            MathNode::BuiltinCall { func, args } => {
                evaluate_builtin_matrix(*func, args, ctx)
            }

            MathNode::UserCall { name, args } => {
                self.run_user_function(name, args, ctx)?.into_matrix()
            }
        }
    }

    fn run_user_function(
        &self,
        name: &str,
        args: &[MathNode],
        ctx: &EvalContext,
    ) -> MathResult<Value> {
        if let Some(signature) = ctx.catalog.declared_signature(name) {
            if args.len() != signature.input_count {
                return Err(MathError::semantic(format!(
                    "{} expects {} argument(s), found {}",
                    name,
                    signature.input_count,
                    args.len()
                )));
            }
        }
        let runner = ctx.runner.ok_or_else(|| {
            MathError::semantic(format!(
                "no function runner available to execute '{}'",
                name
            ))
        })?;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(evaluate_by_shape(arg, ctx)?);
        }
        runner.run(name, &values)
    }

    /// Resolves every leaf identifier against the scope, reporting all
    /// unresolved names at once rather than failing on the first.
    pub fn initialize(&self, ctx: &EvalContext) -> MathResult<()> {
        let mut unresolved = Vec::new();
        for node in self.iter_preorder() {
            let name = match node {
                MathNode::Identifier { name } => name,
                MathNode::ArrayElement { name, .. } => name,
                _ => continue,
            };
            if ctx.scope.lookup(name).is_none() && !unresolved.contains(name) {
                unresolved.push(name.clone());
            }
        }
        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(MathError::UnresolvedReference(unresolved))
        }
    }

    /// The deduplicated set of referenced names anywhere in the subtree, in
    /// first-seen pre-order. User-function and array names count as
    /// references alongside plain identifiers.
    pub fn collect_referenced_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for node in self.iter_preorder() {
            let name = match node {
                MathNode::Identifier { name } => name,
                MathNode::ArrayElement { name, .. } => name,
                MathNode::UserCall { name, .. } => name,
                _ => continue,
            };
            if !names.iter().any(|n| n == name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Substring substitution of `old` with `new` in every stored name,
    /// recursing through the whole subtree. This is a plain substring
    /// match, not a tokenized identifier match, so a name that is a
    /// substring of another name is also replaced; see DESIGN.md.
    pub fn rename(&mut self, old: &str, new: &str) {
        let mut stack: Vec<&mut MathNode> = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                MathNode::Literal(_) => {}
                MathNode::Identifier { name } => {
                    *name = name.replace(old, new);
                }
                MathNode::ArrayElement { name, row, col } => {
                    *name = name.replace(old, new);
                    stack.push(row.as_mut());
                    if let Some(col) = col {
                        stack.push(col.as_mut());
                    }
                }
                MathNode::Unary { child, .. } => stack.push(child.as_mut()),
                MathNode::Binary { left, right, .. } => {
                    stack.push(left.as_mut());
                    stack.push(right.as_mut());
                }
                MathNode::BuiltinCall { args, .. } => {
                    stack.extend(args.iter_mut());
                }
                MathNode::UserCall { name, args } => {
                    *name = name.replace(old, new);
                    stack.extend(args.iter_mut());
                }
            }
        }
    }

    /// Pre-order traversal over the subtree, iterative so that tree depth
    /// never grows the call stack.
    pub fn iter_preorder(&self) -> PreorderIter<'_> {
        PreorderIter { stack: vec![self] }
    }

    /// Detaches all direct children, leaving inert placeholders behind.
    /// Teardown support; see the Drop implementation.
    fn take_children(&mut self, out: &mut Vec<MathNode>) {
        match self {
            MathNode::Literal(_) | MathNode::Identifier { .. } => {}
            MathNode::ArrayElement { row, col, .. } => {
                out.push(std::mem::replace(row.as_mut(), MathNode::Literal(0.0)));
                if let Some(col) = col {
                    out.push(std::mem::replace(col.as_mut(), MathNode::Literal(0.0)));
                }
            }
            MathNode::Unary { child, .. } => {
                out.push(std::mem::replace(child.as_mut(), MathNode::Literal(0.0)));
            }
            MathNode::Binary { left, right, .. } => {
                out.push(std::mem::replace(left.as_mut(), MathNode::Literal(0.0)));
                out.push(std::mem::replace(right.as_mut(), MathNode::Literal(0.0)));
            }
            MathNode::BuiltinCall { args, .. } | MathNode::UserCall { args, .. } => {
                out.append(args);
            }
        }
    }
}

/// Teardown must not recurse child-by-child: a deeply nested expression
/// would overflow the stack. Children are detached onto a flat worklist and
/// dropped one at a time, each holding only placeholder children by the
/// time it is freed.
impl Drop for MathNode {
    fn drop(&mut self) {
        let mut worklist = Vec::new();
        self.take_children(&mut worklist);
        while let Some(mut node) = worklist.pop() {
            node.take_children(&mut worklist);
        }
    }
}

pub struct PreorderIter<'a> {
    stack: Vec<&'a MathNode>,
}

impl<'a> Iterator for PreorderIter<'a> {
    type Item = &'a MathNode;

    fn next(&mut self) -> Option<&'a MathNode> {
        let node = self.stack.pop()?;
        match node {
            MathNode::Literal(_) | MathNode::Identifier { .. } => {}
            MathNode::ArrayElement { row, col, .. } => {
                if let Some(col) = col {
                    self.stack.push(col);
                }
                self.stack.push(row);
            }
            MathNode::Unary { child, .. } => self.stack.push(child),
            MathNode::Binary { left, right, .. } => {
                self.stack.push(right);
                self.stack.push(left);
            }
            MathNode::BuiltinCall { args, .. } | MathNode::UserCall { args, .. } => {
                for arg in args.iter().rev() {
                    self.stack.push(arg);
                }
            }
        }
        Some(node)
    }
}

/// Evaluates a node as whichever shape it declares, wrapping the result.
pub fn evaluate_by_shape(node: &MathNode, ctx: &EvalContext) -> MathResult<Value> {
    match node.output_info(ctx)? {
        OutputInfo::Scalar => Ok(Value::Real(node.evaluate(ctx)?)),
        OutputInfo::Matrix { .. } => Ok(Value::Matrix(node.evaluate_matrix(ctx)?)),
    }
}

fn subscript(value: f64, name: &str) -> MathResult<usize> {
    if value.fract() != 0.0 || value < 1.0 {
        return Err(MathError::semantic(format!(
            "index {} into {} is not a positive integer",
            value, name
        )));
    }
    Ok(value as usize)
}

fn binary_output_info(
    op: BinaryOp,
    left: OutputInfo,
    right: OutputInfo,
) -> MathResult<OutputInfo> {
    use OutputInfo::{Matrix, Scalar};
    match (op, left, right) {
        (BinaryOp::Add | BinaryOp::Subtract, left, right) => {
            if left == right {
                Ok(left)
            } else {
                Err(MathError::semantic(
                    "addition/subtraction operands have mismatched shapes",
                ))
            }
        }

        (BinaryOp::Multiply, Scalar, Scalar) => Ok(Scalar),
        (BinaryOp::Multiply, Scalar, m @ Matrix { .. }) => Ok(m),
        (BinaryOp::Multiply, m @ Matrix { .. }, Scalar) => Ok(m),
        (
            BinaryOp::Multiply,
            Matrix { rows, cols },
            Matrix {
                rows: r2,
                cols: c2,
            },
        ) => {
            if cols != r2 {
                return Err(MathError::semantic(format!(
                    "cannot multiply {}x{} by {}x{}",
                    rows, cols, r2, c2
                )));
            }
            Ok(Matrix { rows, cols: c2 })
        }

        (BinaryOp::Divide, Scalar, Scalar) => Ok(Scalar),
        (BinaryOp::Divide, m @ Matrix { .. }, Scalar) => Ok(m),
        (BinaryOp::Divide, _, _) => Err(MathError::semantic(
            "division requires a scalar divisor",
        )),

        (BinaryOp::Power, Scalar, Scalar) => Ok(Scalar),
        (BinaryOp::Power, _, _) => Err(MathError::semantic(
            "exponentiation requires scalar operands",
        )),
    }
}

fn builtin_output_info(
    func: BuiltinFunction,
    args: &[MathNode],
    ctx: &EvalContext,
) -> MathResult<OutputInfo> {
    use OutputInfo::{Matrix, Scalar};
    if !func.takes_matrix() {
        return Ok(Scalar);
    }
    match func {
        BuiltinFunction::Det | BuiltinFunction::Norm | BuiltinFunction::Dot => Ok(Scalar),
        BuiltinFunction::Cross => Ok(Matrix { rows: 3, cols: 1 }),
        BuiltinFunction::Transpose => match args[0].output_info(ctx)? {
            Scalar => Ok(Scalar),
            Matrix { rows, cols } => Ok(Matrix {
                rows: cols,
                cols: rows,
            }),
        },
        BuiltinFunction::Inv => args[0].output_info(ctx),
        _ => Ok(Scalar),
    }
}

fn evaluate_builtin(
    func: BuiltinFunction,
    args: &[MathNode],
    ctx: &EvalContext,
) -> MathResult<f64> {
    use BuiltinFunction::*;
    match func {
        Sin => Ok(args[0].evaluate(ctx)?.sin()),
        Cos => Ok(args[0].evaluate(ctx)?.cos()),
        Tan => Ok(args[0].evaluate(ctx)?.tan()),
        Asin => {
            let v = args[0].evaluate(ctx)?;
            if !(-1.0..=1.0).contains(&v) {
                return Err(MathError::semantic(format!(
                    "asin argument {} is outside [-1, 1]",
                    v
                )));
            }
            Ok(v.asin())
        }
        Acos => {
            let v = args[0].evaluate(ctx)?;
            if !(-1.0..=1.0).contains(&v) {
                return Err(MathError::semantic(format!(
                    "acos argument {} is outside [-1, 1]",
                    v
                )));
            }
            Ok(v.acos())
        }
        Atan2 => Ok(args[0].evaluate(ctx)?.atan2(args[1].evaluate(ctx)?)),
        Atan => Ok(args[0].evaluate(ctx)?.atan()),
        Log => {
            let v = args[0].evaluate(ctx)?;
            if v <= 0.0 {
                return Err(MathError::semantic(format!(
                    "log argument {} is not positive",
                    v
                )));
            }
            Ok(v.ln())
        }
        Log10 => {
            let v = args[0].evaluate(ctx)?;
            if v <= 0.0 {
                return Err(MathError::semantic(format!(
                    "log10 argument {} is not positive",
                    v
                )));
            }
            Ok(v.log10())
        }
        Exp => Ok(args[0].evaluate(ctx)?.exp()),
        Sqrt => {
            let v = args[0].evaluate(ctx)?;
            if v < 0.0 {
                return Err(MathError::semantic(format!(
                    "sqrt argument {} is negative",
                    v
                )));
            }
            Ok(v.sqrt())
        }
        Abs => Ok(args[0].evaluate(ctx)?.abs()),
        DegToRad => Ok(args[0].evaluate(ctx)?.to_radians()),
        RadToDeg => Ok(args[0].evaluate(ctx)?.to_degrees()),

        Det => args[0].evaluate_matrix(ctx)?.determinant(),
        Norm => Ok(args[0].evaluate_matrix(ctx)?.norm()),
        Dot => args[0]
            .evaluate_matrix(ctx)?
            .dot(&args[1].evaluate_matrix(ctx)?),
        Transpose | Inv | Cross => Err(MathError::semantic(format!(
            "{} produces a matrix and cannot be evaluated as a scalar",
            func.canonical_name()
        ))),
    }
}

fn evaluate_builtin_matrix(
    func: BuiltinFunction,
    args: &[MathNode],
    ctx: &EvalContext,
) -> MathResult<Matrix> {
    use BuiltinFunction::*;
    match func {
        Transpose => Ok(args[0].evaluate_matrix(ctx)?.transpose()),
        Inv => args[0].evaluate_matrix(ctx)?.inverse(),
        Cross => args[0]
            .evaluate_matrix(ctx)?
            .cross(&args[1].evaluate_matrix(ctx)?),
        _ => Err(MathError::semantic(format!(
            "{} produces a scalar and cannot be evaluated as a matrix",
            func.canonical_name()
        ))),
    }
}

fn evaluate_binary_matrix(
    op: BinaryOp,
    left: &MathNode,
    right: &MathNode,
    ctx: &EvalContext,
) -> MathResult<Matrix> {
    let left_shape = left.output_info(ctx)?;
    let right_shape = right.output_info(ctx)?;
    match op {
        BinaryOp::Add => left
            .evaluate_matrix(ctx)?
            .add(&right.evaluate_matrix(ctx)?),
        BinaryOp::Subtract => left
            .evaluate_matrix(ctx)?
            .subtract(&right.evaluate_matrix(ctx)?),
        BinaryOp::Multiply => match (left_shape.is_matrix(), right_shape.is_matrix()) {
            (true, true) => left
                .evaluate_matrix(ctx)?
                .multiply(&right.evaluate_matrix(ctx)?),
            (false, true) => Ok(right.evaluate_matrix(ctx)?.scale(left.evaluate(ctx)?)),
            (true, false) => Ok(left.evaluate_matrix(ctx)?.scale(right.evaluate(ctx)?)),
            (false, false) => Err(MathError::semantic(
                "product of scalars cannot be evaluated as a matrix",
            )),
        },
        BinaryOp::Divide => {
            if !left_shape.is_matrix() || right_shape.is_matrix() {
                return Err(MathError::semantic(
                    "matrix division requires a matrix dividend and scalar divisor",
                ));
            }
            let divisor = right.evaluate(ctx)?;
            if divisor == 0.0 {
                return Err(MathError::semantic("division by zero"));
            }
            Ok(left.evaluate_matrix(ctx)?.scale(1.0 / divisor))
        }
        BinaryOp::Power => Err(MathError::semantic(
            "exponentiation cannot be evaluated as a matrix",
        )),
    }
}
