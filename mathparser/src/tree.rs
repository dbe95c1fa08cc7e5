//! FILENAME: mathparser/src/tree.rs
//! PURPOSE: Recursive construction of expression trees from decomposition
//! triples.
//! CONTEXT: `TreeBuilder::build` normalizes the raw text once, then calls
//! the decomposer recursively: an empty operator ends the recursion in a
//! leaf (literal, identifier, object.property path, or array element);
//! a resolved operator becomes an internal node whose operand substrings
//! are built the same way. User-function calls are the one exception: the
//! argument list is split on top-level commas and each argument becomes an
//! independently built subtree.

use crate::ast::MathNode;
use crate::catalog::{is_name_char, is_name_start, FunctionCatalog};
use crate::decompose::{
    find_matching_paren, normalize, parse_number, remove_extra_paren,
    split_top_level_args, Decomposed, DecomposedOp, Decomposer,
};
use crate::error::{MathError, MathResult};
use log::trace;

/// Builds expression trees against a session's function catalog.
pub struct TreeBuilder<'a> {
    catalog: &'a FunctionCatalog,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(catalog: &'a FunctionCatalog) -> Self {
        TreeBuilder { catalog }
    }

    /// Parses raw expression text into a tree with exactly one root.
    pub fn build(&self, expr: &str) -> MathResult<MathNode> {
        let cleaned = normalize(expr);
        trace!("build: {:?} -> {:?}", expr, cleaned);
        if cleaned.is_empty() {
            return Err(MathError::syntax("Empty expression"));
        }
        self.build_node(&cleaned)
    }

    fn build_node(&self, expr: &str) -> MathResult<MathNode> {
        let decomposer = Decomposer::new(self.catalog);
        let Decomposed { op, left, right } = decomposer.decompose(expr)?;
        match op {
            None => self.build_leaf(&left),

            Some(DecomposedOp::Binary(op)) => Ok(MathNode::Binary {
                op,
                left: Box::new(self.build_node(&left)?),
                right: Box::new(self.build_node(&right)?),
            }),

            Some(DecomposedOp::Unary(op)) => Ok(MathNode::Unary {
                op,
                child: Box::new(self.build_node(&left)?),
            }),

            Some(DecomposedOp::Function(func)) => {
                let mut args = vec![self.build_node(&left)?];
                if !right.is_empty() {
                    args.push(self.build_node(&right)?);
                }
                Ok(MathNode::BuiltinCall { func, args })
            }

            Some(DecomposedOp::UserFunction(name)) => {
                let mut args = Vec::new();
                for piece in split_top_level_args(&left) {
                    if piece.is_empty() {
                        return Err(MathError::syntax(format!(
                            "Missing input arguments in call to {}",
                            name
                        )));
                    }
                    args.push(self.build_node(&piece)?);
                }
                Ok(MathNode::UserCall { name, args })
            }
        }
    }

    /// Builds a leaf from atomic text: one more redundant-parenthesis strip,
    /// then literal, array-element, or identifier recognition.
    fn build_leaf(&self, text: &str) -> MathResult<MathNode> {
        let text = remove_extra_paren(text);
        if text.is_empty() {
            // empty parentheses normalize to blank
            return Err(MathError::syntax("Empty expression"));
        }

        if let Some(open) = text.find('(') {
            return self.build_array_element(&text, open);
        }

        let first = match text.chars().next() {
            Some(c) => c,
            None => return Err(MathError::syntax("Empty expression")),
        };
        if is_name_start(first) {
            if text.chars().all(|c| is_name_char(c) || c == '.') {
                return Ok(MathNode::Identifier { name: text });
            }
            return Err(MathError::syntax(format!(
                "Invalid number or math equation: {}",
                text
            )));
        }

        parse_number(&text).map(MathNode::Literal)
    }

    /// An indexed array reference: `name(row)` or `name(row,col)` where the
    /// callee is not a recognized function. Indices are full expressions.
    fn build_array_element(&self, text: &str, open: usize) -> MathResult<MathNode> {
        if open == 0 {
            return Err(MathError::syntax(format!(
                "Invalid number or math equation: {}",
                text
            )));
        }
        let name = &text[..open];
        if !name.chars().all(|c| is_name_char(c)) {
            return Err(MathError::syntax(format!(
                "Invalid number or math equation: {}",
                text
            )));
        }
        let close = find_matching_paren(text, open)?;
        if close != text.len() - 1 {
            return Err(MathError::syntax(format!(
                "Invalid math operator found: '{}' in: {}",
                text[close + 1..].chars().next().unwrap_or(' '),
                text
            )));
        }
        let args = split_top_level_args(&text[open + 1..close]);
        match args.as_slice() {
            [row] if !row.is_empty() => Ok(MathNode::ArrayElement {
                name: name.to_string(),
                row: Box::new(self.build_node(row)?),
                col: None,
            }),
            [row, col] if !row.is_empty() && !col.is_empty() => {
                Ok(MathNode::ArrayElement {
                    name: name.to_string(),
                    row: Box::new(self.build_node(row)?),
                    col: Some(Box::new(self.build_node(col)?)),
                })
            }
            _ => Err(MathError::syntax(format!(
                "Missing input arguments in: {}",
                text
            ))),
        }
    }
}

/// One-shot convenience: builds a tree for `expr` against `catalog`.
pub fn parse(expr: &str, catalog: &FunctionCatalog) -> MathResult<MathNode> {
    TreeBuilder::new(catalog).build(expr)
}
