//! FILENAME: mathparser/src/decompose.rs
//! PURPOSE: Precedence-driven decomposition of expression strings.
//! CONTEXT: The heart of the expression compiler. Given a cleaned expression
//! substring, `Decomposer::decompose` returns a single (operator, left,
//! right) triple; the tree builder calls it recursively to grow the AST.
//! An empty operator means "this is an atomic element, recurse no further".
//!
//! FALLBACK CHAIN (each stage yields no match so the next is tried):
//!   1. atomic check (number, bare identifier, object.property, array ref)
//!   2. parenthesis-led extraction / function-call recognition
//!   3. additive split (textually last +/- at depth 0, digraphs resolved)
//!   4. multiplicative split
//!   5. power split
//!   6. unary minus
//!   7. matrix operators (transpose quote, ^(-1) inverse marker)
//!   8. built-in function / unit-conversion application
//!
//! PRECEDENCE TABLE (lowest binds last): {+,-} < {*,/} < unary minus <
//! {^, transpose, inverse} < parenthesized sub-expression. Ties within a
//! group resolve to the rightmost candidate by source position, which gives
//! left-to-right associativity. Operator-adjacency special cases (a `^(-1)`
//! that follows another operator, a `^(-1)` that is the sole caret) follow
//! the original implementation's observable behavior; see DESIGN.md.

use crate::ast::{BinaryOp, UnaryOp};
use crate::catalog::{BuiltinFunction, FunctionCatalog};
use crate::error::{MathError, MathResult};
use log::trace;

/// A single decomposition step: the operator (if any) plus the left and
/// right operand substrings. Transient; consumed immediately by the tree
/// builder.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposed {
    pub op: Option<DecomposedOp>,
    pub left: String,
    pub right: String,
}

impl Decomposed {
    fn atom(text: &str) -> Self {
        Decomposed {
            op: None,
            left: text.to_string(),
            right: String::new(),
        }
    }
}

/// The operator kind resolved by one decomposition step.
#[derive(Debug, Clone, PartialEq)]
pub enum DecomposedOp {
    Binary(BinaryOp),
    Unary(UnaryOp),
    Function(BuiltinFunction),
    UserFunction(String),
}

/// Decomposes expression substrings against a session's function catalog.
pub struct Decomposer<'a> {
    catalog: &'a FunctionCatalog,
}

impl<'a> Decomposer<'a> {
    pub fn new(catalog: &'a FunctionCatalog) -> Self {
        Decomposer { catalog }
    }

    /// Breaks an expression string into an operator plus left/right operand
    /// substrings. Preconditions: balanced parentheses, no raw whitespace
    /// (the caller normalizes). An empty operator means the string is an
    /// atomic element.
    pub fn decompose(&self, expr: &str) -> MathResult<Decomposed> {
        trace!("decompose: {:?}", expr);
        check_balanced(expr)?;
        let expr = remove_extra_paren(expr);
        if expr.is_empty() {
            return Err(MathError::syntax("Empty expression"));
        }

        // stage 1: atomic element
        if is_atomic(&expr) {
            return Ok(Decomposed::atom(&expr));
        }

        // stage 2: function-call recognition (the parenthesis-led stage for
        // strings that start with a recognized callable)
        if let Some(decomposed) = self.parse_function_call(&expr)? {
            return Ok(decomposed);
        }

        // stages 3-7: lowest-precedence operator outside all parentheses
        if let Some((op, index)) = self.find_lowest_operator(&expr) {
            let decomposed = match op.as_str() {
                "+" | "-" if index > 0 => self.parse_add_subtract(&expr, index)?,
                "-" => self.parse_unary(&expr)?,
                "*" | "/" => self.parse_mult_divide(&expr, index)?,
                "^" => self.parse_power(&expr, index)?,
                "'" | "^(-1)" => self.parse_matrix_op(&expr, &op, index)?,
                other => {
                    return Err(MathError::syntax(format!(
                        "Invalid math operator found: '{}' in: {}",
                        other, expr
                    )))
                }
            };
            return Ok(decomposed);
        }

        // stage 7 remainder: a sole <operand>^(-1) is an inverse application
        if let Some(base) = expr.strip_suffix("^(-1)") {
            if base.is_empty() {
                return Err(MathError::syntax(format!(
                    "Missing input arguments in: {}",
                    expr
                )));
            }
            return Ok(Decomposed {
                op: Some(DecomposedOp::Unary(UnaryOp::Inverse)),
                left: base.to_string(),
                right: String::new(),
            });
        }

        // no operator anywhere: an atomic leaf such as an array element
        Ok(Decomposed::atom(&expr))
    }

    /// Stage 2: if the text before the first '(' is a recognized built-in,
    /// unit-conversion, or user-defined function name and the matching close
    /// ends the string, this is a function call with the argument list as
    /// its operand. A recognized name whose call is followed by a symbol
    /// that is not a valid operator is a syntax error naming that symbol.
    fn parse_function_call(&self, expr: &str) -> MathResult<Option<Decomposed>> {
        let open = match expr.find('(') {
            Some(i) if i > 0 => i,
            _ => return Ok(None),
        };
        let name = &expr[..open];
        let builtin = self.catalog.builtin(name);
        let is_user = self.catalog.is_user_function(name);
        if builtin.is_none() && !is_user {
            return Ok(None);
        }

        let close = find_matching_paren(expr, open)?;
        if close != expr.len() - 1 {
            let trailing = expr[close + 1..].chars().next().unwrap_or(' ');
            if !is_valid_after_call(trailing) {
                return Err(MathError::syntax(format!(
                    "Invalid math operator found: '{}' after {}(...)",
                    trailing, name
                )));
            }
            // a real operator follows; the operator stages will split there
            return Ok(None);
        }

        let args = &expr[open + 1..close];
        if args.is_empty() {
            return Err(MathError::syntax(format!(
                "Missing input arguments in: {}",
                expr
            )));
        }

        if let Some(func) = builtin {
            let pieces = split_top_level_args(args);
            if pieces.len() != func.arg_count() {
                return Err(MathError::semantic(format!(
                    "{} expects {} argument(s), found {}",
                    func.canonical_name(),
                    func.arg_count(),
                    pieces.len()
                )));
            }
            let (left, right) = match func.arg_count() {
                2 => (pieces[0].clone(), pieces[1].clone()),
                _ => (pieces[0].clone(), String::new()),
            };
            return Ok(Some(Decomposed {
                op: Some(DecomposedOp::Function(func)),
                left,
                right,
            }));
        }

        // user function: the argument list stays whole; the tree builder
        // splits it into independently built subtrees
        Ok(Some(Decomposed {
            op: Some(DecomposedOp::UserFunction(name.to_string())),
            left: args.to_string(),
            right: String::new(),
        }))
    }

    /// Locates the lowest-precedence operator outside all parentheses,
    /// returning its text and byte position. Within a precedence tier the
    /// rightmost candidate wins. Returns None when the string holds no
    /// split point (atomic elements, function calls, sole inverse
    /// applications).
    pub fn find_lowest_operator(&self, expr: &str) -> Option<(String, usize)> {
        let bytes = expr.as_bytes();
        let len = bytes.len();

        // carets at depth 0, for the sole-inverse adjacency rule
        let mut depth = 0i32;
        let mut caret_count = 0usize;
        for &b in bytes {
            match b {
                b'(' => depth += 1,
                b')' => depth -= 1,
                b'^' if depth == 0 => caret_count += 1,
                _ => {}
            }
        }

        let mut additive: Vec<usize> = Vec::new();
        let mut multiplicative: Vec<usize> = Vec::new();
        let mut leading_unary: Option<usize> = None;
        let mut tight: Vec<(usize, &'static str)> = Vec::new();

        depth = 0;
        for i in 0..len {
            let b = bytes[i];
            match b {
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ if depth > 0 => {}
                b'+' | b'-' => {
                    if is_scientific_sign(bytes, i) {
                        // sign inside a scientific-notation literal
                    } else if i > 0 && is_sign_context(bytes[i - 1]) {
                        // sign folded into the operand that follows an
                        // operator; digraphs resolve at split time
                    } else if i == 0 {
                        if b == b'-' {
                            leading_unary = Some(0);
                        }
                    } else {
                        additive.push(i);
                    }
                }
                b'*' | b'/' => multiplicative.push(i),
                b'\'' => tight.push((i, "'")),
                b'^' => {
                    if bytes[i + 1..].starts_with(b"(-1)") {
                        if i > 0 && is_operator_adjacent(bytes[i - 1]) {
                            // inverse marker directly after another operator
                            tight.push((i, "^(-1)"));
                        } else if caret_count == 1 {
                            // sole caret forming <operand>^(-1): the whole
                            // string is one inverse application, handled by
                            // the matrix-op stage
                        } else {
                            tight.push((i, "^"));
                        }
                    } else {
                        tight.push((i, "^"));
                    }
                }
                _ => {}
            }
        }

        if let Some(&index) = additive.last() {
            return Some(((bytes[index] as char).to_string(), index));
        }
        if let Some(&index) = multiplicative.last() {
            return Some(((bytes[index] as char).to_string(), index));
        }
        if let Some(index) = leading_unary {
            return Some(("-".to_string(), index));
        }
        tight.last().map(|&(index, op)| (op.to_string(), index))
    }

    /// Stage 3: split at the chosen additive operator, resolving the sign
    /// digraphs ++, +-, -+, -- to a single net operator.
    fn parse_add_subtract(&self, expr: &str, index: usize) -> MathResult<Decomposed> {
        let bytes = expr.as_bytes();
        let left = &expr[..index];
        let mut minus = bytes[index] == b'-';
        let mut right_start = index + 1;
        while right_start < bytes.len()
            && (bytes[right_start] == b'+' || bytes[right_start] == b'-')
        {
            if bytes[right_start] == b'-' {
                minus = !minus;
            }
            right_start += 1;
        }
        let right = &expr[right_start..];
        if left.is_empty() || right.is_empty() {
            return Err(MathError::syntax(format!(
                "Missing input arguments in: {}",
                expr
            )));
        }
        let op = if minus {
            BinaryOp::Subtract
        } else {
            BinaryOp::Add
        };
        Ok(Decomposed {
            op: Some(DecomposedOp::Binary(op)),
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    /// Stage 4: split at the chosen multiplicative operator.
    fn parse_mult_divide(&self, expr: &str, index: usize) -> MathResult<Decomposed> {
        let op = if expr.as_bytes()[index] == b'*' {
            BinaryOp::Multiply
        } else {
            BinaryOp::Divide
        };
        let left = &expr[..index];
        let right = &expr[index + 1..];
        if left.is_empty() || right.is_empty() {
            return Err(MathError::syntax(format!(
                "Missing input arguments in: {}",
                expr
            )));
        }
        Ok(Decomposed {
            op: Some(DecomposedOp::Binary(op)),
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    /// Stage 5: split at the chosen power operator.
    fn parse_power(&self, expr: &str, index: usize) -> MathResult<Decomposed> {
        let left = &expr[..index];
        let right = &expr[index + 1..];
        if left.is_empty() || right.is_empty() {
            return Err(MathError::syntax(format!(
                "Missing input arguments in: {}",
                expr
            )));
        }
        Ok(Decomposed {
            op: Some(DecomposedOp::Binary(BinaryOp::Power)),
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    /// Stage 6: a leading '-' not consumed by the additive stage wraps the
    /// remainder in a negation.
    fn parse_unary(&self, expr: &str) -> MathResult<Decomposed> {
        let operand = &expr[1..];
        if operand.is_empty() {
            return Err(MathError::syntax(format!(
                "Missing input arguments in: {}",
                expr
            )));
        }
        Ok(Decomposed {
            op: Some(DecomposedOp::Unary(UnaryOp::Negate)),
            left: operand.to_string(),
            right: String::new(),
        })
    }

    /// Stage 7: transpose quote or inverse marker chosen as the lowest
    /// operator. Both are strictly postfix; trailing text after them is a
    /// syntax error (an earlier tier would have claimed any real operator).
    fn parse_matrix_op(&self, expr: &str, op: &str, index: usize) -> MathResult<Decomposed> {
        let left = &expr[..index];
        let rest = &expr[index + op.len()..];
        if left.is_empty() {
            return Err(MathError::syntax(format!(
                "Missing input arguments in: {}",
                expr
            )));
        }
        if !rest.is_empty() {
            return Err(MathError::syntax(format!(
                "Invalid math operator found: '{}' in: {}",
                rest.chars().next().unwrap_or(' '),
                expr
            )));
        }
        let unary = if op == "'" {
            UnaryOp::Transpose
        } else {
            UnaryOp::Inverse
        };
        Ok(Decomposed {
            op: Some(DecomposedOp::Unary(unary)),
            left: left.to_string(),
            right: String::new(),
        })
    }

    /// The equation sniffer: decides cheaply whether assignment right-hand
    /// side text is an algebraic expression worth full decomposition.
    /// Order: quote-enclosure check, signed-literal check, bracket-array
    /// check, math-symbol presence, known-function-call check. A
    /// parenthesized name with an unknown callee (e.g. `ars(1,1)`) is an
    /// array element, not an equation.
    pub fn is_equation(&self, text: &str) -> bool {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return false;
        }
        if is_quoted(&normalized) {
            return false;
        }
        if parse_number(&normalized).is_ok() {
            return false;
        }
        if normalized.starts_with('[') {
            return false;
        }
        if normalized
            .bytes()
            .any(|b| matches!(b, b'+' | b'-' | b'*' | b'/' | b'^' | b'\''))
        {
            return true;
        }
        if let Some(open) = normalized.find('(') {
            if open > 0 {
                return self.catalog.is_function(&normalized[..open]);
            }
        }
        false
    }
}

/// Removes all whitespace (spaces and tabs) and a trailing statement
/// terminator from raw expression text.
pub fn normalize(text: &str) -> String {
    let mut out: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    while out.ends_with(';') {
        out.pop();
    }
    out
}

/// Strips redundant wholly-enclosing parenthesis pairs. Idempotent:
/// stripping twice yields the same result as stripping once.
pub fn remove_extra_paren(expr: &str) -> String {
    let mut s = expr;
    while s.starts_with('(') {
        match matching_paren(s, 0) {
            Some(close) if close == s.len() - 1 => s = &s[1..close],
            _ => break,
        }
    }
    s.to_string()
}

/// Finds the close paren matching the open paren at `open`, or reports the
/// unbalanced-parenthesis syntax error.
pub fn find_matching_paren(expr: &str, open: usize) -> MathResult<usize> {
    matching_paren(expr, open).ok_or_else(|| {
        MathError::syntax(format!("Unmatching parenthesis found in: {}", expr))
    })
}

fn matching_paren(expr: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, b) in expr.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn check_balanced(expr: &str) -> MathResult<()> {
    let mut depth = 0i32;
    for b in expr.bytes() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            break;
        }
    }
    if depth != 0 {
        return Err(MathError::syntax(format!(
            "Unmatching parenthesis found in: {}",
            expr
        )));
    }
    Ok(())
}

/// Splits a function argument list on commas outside all parentheses and
/// brackets, preserving argument order.
pub fn split_top_level_args(args: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, b) in args.bytes().enumerate() {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b',' if depth == 0 => {
                pieces.push(args[start..i].to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(args[start..].to_string());
    pieces
}

/// Stage 1 test: no parentheses and no math symbol, or a (possibly signed)
/// numeric literal.
fn is_atomic(expr: &str) -> bool {
    if parse_number(expr).is_ok() {
        return true;
    }
    !expr
        .bytes()
        .any(|b| matches!(b, b'(' | b')' | b'+' | b'-' | b'*' | b'/' | b'^' | b'\''))
}

/// Validates and parses a numeric literal: optional sign, mantissa digits
/// with at most one decimal point, optional exponent with mandatory digits.
/// Malformed scientific notation (`1.2e`, `1e+`, `3..4`) is the "Invalid
/// number or math equation" error.
pub fn parse_number(text: &str) -> MathResult<f64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mantissa_start = i;
    let mut seen_digit = false;
    let mut seen_point = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_point => seen_point = true,
            _ => break,
        }
        i += 1;
    }
    let malformed = || {
        MathError::syntax(format!("Invalid number or math equation: {}", text))
    };
    if !seen_digit || i == mantissa_start {
        return Err(malformed());
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return Err(malformed());
        }
    }
    if i != bytes.len() {
        return Err(malformed());
    }
    text.parse::<f64>().map_err(|_| malformed())
}

fn is_quoted(text: &str) -> bool {
    (text.len() >= 2 && text.starts_with('\'') && text.ends_with('\''))
        || (text.len() >= 2 && text.starts_with('"') && text.ends_with('"'))
}

/// A +/- after one of these characters is a sign on the operand, not a
/// binary operator. The transpose quote is deliberately absent: `av'-x`
/// subtracts from a transpose.
fn is_sign_context(b: u8) -> bool {
    matches!(b, b'+' | b'-' | b'*' | b'/' | b'^')
}

/// Adjacency set for recognizing `^(-1)` as an inverse marker: the caret
/// directly follows another operator, transpose quote included.
fn is_operator_adjacent(b: u8) -> bool {
    is_sign_context(b) || b == b'\''
}

/// A +/- at position i is part of a scientific-notation literal when the
/// preceding characters are `<digit>e` and a digit follows.
fn is_scientific_sign(bytes: &[u8], i: usize) -> bool {
    i >= 2
        && (bytes[i - 1] == b'e' || bytes[i - 1] == b'E')
        && (bytes[i - 2].is_ascii_digit() || bytes[i - 2] == b'.')
        && i + 1 < bytes.len()
        && bytes[i + 1].is_ascii_digit()
}

/// Symbols allowed directly after a function call's closing parenthesis.
fn is_valid_after_call(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/' | '^' | '\'' | ')' | ',')
}
