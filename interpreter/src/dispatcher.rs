//! FILENAME: interpreter/src/dispatcher.rs
//! PURPOSE: Two-pass block dispatch for one script interpretation session.
//! CONTEXT: Blocks are classified and dispatched in strict source order.
//! A block that references a not-yet-defined name is deferred, not failed;
//! after the main pass every deferred block is retried exactly once, in
//! its original order, and a block still unresolved then becomes a fatal
//! error carrying its original line span. The session owns the deferred
//! queue, the error list, the function catalog, and the object scope.
//!
//! COMMAND MODE: the first assignment whose left-hand side is a settable,
//! non-textual property path and whose right-hand side is an equation
//! flips the session into command mode for the rest of the run. The flip
//! is irreversible and order-dependent.

use crate::block::{Block, Classification};
use crate::error::{ErrorEntry, InterpretError, InterpretResult};
use crate::scope::{Entry, PropertyKind, SessionScope};
use log::{debug, info};
use mathparser::ast::evaluate_by_shape;
use mathparser::decompose::{parse_number, Decomposer};
use mathparser::{
    EvalContext, FileLocator, FunctionCatalog, FunctionRunner, MathError, Matrix,
    Signature, TreeBuilder, Value,
};

/// Session-level configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    /// When set, a failing block is recorded and the main pass continues;
    /// otherwise the first failure halts further main-pass dispatch. The
    /// deferred-block retry runs in either case.
    pub continue_on_error: bool,
}

/// What dispatching one block did.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Comment,
    Definition { type_name: String, names: Vec<String> },
    Command { keyword: String },
    Assignment { target: String, command_mode: bool },
}

/// Result of offering one block to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Dispatched(Effect),
    Deferred,
    Failed(InterpretError),
}

/// One script interpretation session. Owns all mutable per-run state;
/// never shared across concurrent sessions.
pub struct Session<'a> {
    config: SessionConfig,
    catalog: FunctionCatalog,
    scope: SessionScope,
    locator: Option<&'a dyn FileLocator>,
    runner: Option<&'a dyn FunctionRunner>,
    command_mode: bool,
    errors: Vec<ErrorEntry>,
}

impl<'a> Session<'a> {
    pub fn new(config: SessionConfig) -> Self {
        Session {
            config,
            catalog: FunctionCatalog::new(),
            scope: SessionScope::new(),
            locator: None,
            runner: None,
            command_mode: false,
            errors: Vec::new(),
        }
    }

    /// Supplies the collaborator that finds script-function files, enabling
    /// discovery of user functions referenced before they are defined.
    pub fn with_locator(mut self, locator: &'a dyn FileLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Supplies the collaborator that executes user script functions.
    pub fn with_runner(mut self, runner: &'a dyn FunctionRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn scope(&self) -> &SessionScope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut SessionScope {
        &mut self.scope
    }

    pub fn catalog(&self) -> &FunctionCatalog {
        &self.catalog
    }

    /// Declares a user function's signature, normally done by the embedder
    /// once the callee's definition file has been read.
    pub fn declare_function_signature(&mut self, name: &str, signature: Signature) {
        self.catalog.set_declared_signature(name, signature);
    }

    pub fn command_mode(&self) -> bool {
        self.command_mode
    }

    /// The accumulated session error list, in the order encountered:
    /// main-pass errors first, then unresolved-after-retry errors.
    pub fn error_list(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// Runs the full two-pass interpretation over a sequence of blocks.
    pub fn run(&mut self, blocks: &[Block]) {
        let mut deferred: Vec<&Block> = Vec::new();

        for block in blocks {
            match self.parse(block) {
                Outcome::Dispatched(effect) => {
                    debug!(
                        "lines {}-{}: {:?}",
                        block.first_line, block.last_line, effect
                    );
                }
                Outcome::Deferred => {
                    debug!(
                        "lines {}-{}: deferred",
                        block.first_line, block.last_line
                    );
                    deferred.push(block);
                }
                Outcome::Failed(error) => {
                    self.errors.push(ErrorEntry::new(
                        block.first_line,
                        block.last_line,
                        &error,
                    ));
                    if !self.config.continue_on_error {
                        break;
                    }
                }
            }
        }

        // The retry pass always runs, regardless of main-pass failures.
        // Anything still failing here is fatal, with its original lines.
        info!("retrying {} deferred block(s)", deferred.len());
        for block in deferred {
            if let Err(error) = self.dispatch(block) {
                self.errors.push(ErrorEntry::new(
                    block.first_line,
                    block.last_line,
                    &error,
                ));
            }
        }
    }

    /// Offers one block: dispatched, deferred, or failed.
    pub fn parse(&mut self, block: &Block) -> Outcome {
        match self.dispatch(block) {
            Ok(effect) => Outcome::Dispatched(effect),
            Err(error) if error.is_deferrable() => Outcome::Deferred,
            Err(error) => Outcome::Failed(error),
        }
    }

    fn dispatch(&mut self, block: &Block) -> InterpretResult<Effect> {
        match block.classify()? {
            Classification::Comment => Ok(Effect::Comment),
            Classification::Definition { type_name, names } => {
                self.dispatch_definition(type_name, names)
            }
            Classification::Command { keyword } => Ok(Effect::Command { keyword }),
            Classification::Assignment { lhs, rhs } => self.dispatch_assignment(&lhs, &rhs),
        }
    }

    fn dispatch_definition(
        &mut self,
        type_name: String,
        names: Vec<String>,
    ) -> InterpretResult<Effect> {
        let mut defined = Vec::with_capacity(names.len());
        for raw in &names {
            let (name, dims) = split_dimensions(raw)?;
            let entry = match type_name.as_str() {
                "Variable" => Entry::Value(Value::Real(0.0)),
                "String" => Entry::Value(Value::Text(String::new())),
                "Array" => {
                    let (rows, cols) = dims.ok_or_else(|| {
                        InterpretError::Definition(format!(
                            "array {} needs dimensions, e.g. {}[3,1]",
                            name, name
                        ))
                    })?;
                    Entry::Value(Value::Matrix(Matrix::zeros(rows, cols)))
                }
                t if t.contains("Function") => {
                    self.catalog.add_user_function(&name);
                    Entry::Function
                }
                _ => Entry::Object {
                    type_name: type_name.clone(),
                    properties: Default::default(),
                },
            };
            if dims.is_some() && type_name != "Array" {
                return Err(InterpretError::Definition(format!(
                    "dimensions are only valid on arrays: {}",
                    raw
                )));
            }
            self.scope.insert(name.clone(), entry);
            defined.push(name);
        }
        Ok(Effect::Definition {
            type_name,
            names: defined,
        })
    }

    fn dispatch_assignment(&mut self, lhs: &str, rhs: &str) -> InterpretResult<Effect> {
        let is_equation = Decomposer::new(&self.catalog).is_equation(rhs);

        if is_equation {
            // A settable, non-textual property target makes this a live
            // command rather than static configuration.
            if let Some((object, path)) = lhs.split_once('.') {
                match self.scope.find_property_path(object, path) {
                    Some(PropertyKind::Numeric) => {
                        if !self.command_mode {
                            info!("command mode entered at assignment to {}", lhs);
                        }
                        self.command_mode = true;
                    }
                    Some(PropertyKind::Textual) => {}
                    None => {
                        return Err(MathError::UnresolvedReference(vec![
                            object.to_string()
                        ])
                        .into())
                    }
                }
            }

            if let Some(locator) = self.locator {
                let scope = &self.scope;
                self.catalog
                    .discover_user_functions(rhs, &|name| scope.contains(name), locator);
            }

            let tree = TreeBuilder::new(&self.catalog).build(rhs)?;
            let ctx = EvalContext {
                scope: &self.scope,
                catalog: &self.catalog,
                runner: self.runner,
            };
            tree.initialize(&ctx)?;
            let value = evaluate_by_shape(&tree, &ctx)?;
            self.assign(lhs, value)?;
        } else {
            let value = self.literal_value(rhs)?;
            self.assign(lhs, value)?;
        }

        Ok(Effect::Assignment {
            target: lhs.to_string(),
            command_mode: self.command_mode,
        })
    }

    /// A right-hand side the equation sniffer rejected: a quoted string, a
    /// bracketed array literal, a plain number, an element read from a
    /// bound array, or a copy from another binding.
    fn literal_value(&self, rhs: &str) -> InterpretResult<Value> {
        if rhs.len() >= 2
            && ((rhs.starts_with('\'') && rhs.ends_with('\''))
                || (rhs.starts_with('"') && rhs.ends_with('"')))
        {
            return Ok(Value::Text(rhs[1..rhs.len() - 1].to_string()));
        }
        if rhs.starts_with('[') {
            return parse_matrix_literal(rhs);
        }
        if let Ok(number) = parse_number(rhs) {
            return Ok(Value::Real(number));
        }
        if let Some(open) = rhs.find('(') {
            let callee = &rhs[..open];
            if self.scope.contains(callee) {
                // a bound array: `name(row)` / `name(row,col)` reads one
                // element
                let tree = TreeBuilder::new(&self.catalog).build(rhs)?;
                let ctx = EvalContext {
                    scope: &self.scope,
                    catalog: &self.catalog,
                    runner: self.runner,
                };
                tree.initialize(&ctx)?;
                return Ok(evaluate_by_shape(&tree, &ctx)?);
            }
            // a call on a name nothing defines yet; defer in case a later
            // block defines it
            return Err(MathError::UnresolvedReference(vec![callee.to_string()]).into());
        }
        match mathparser::ObjectScope::lookup(&self.scope, rhs) {
            Some(value) => Ok(value),
            None => Err(MathError::UnresolvedReference(vec![rhs.to_string()]).into()),
        }
    }

    fn assign(&mut self, lhs: &str, value: Value) -> InterpretResult<()> {
        if let Some((object, path)) = lhs.split_once('.') {
            return match self.scope.set_property(object, path, value) {
                Some(()) => Ok(()),
                None => {
                    Err(MathError::UnresolvedReference(vec![object.to_string()]).into())
                }
            };
        }
        match self.scope.set_value(lhs, value) {
            Some(()) => Ok(()),
            None => Err(MathError::UnresolvedReference(vec![lhs.to_string()]).into()),
        }
    }
}

/// Splits a definition name from optional `[rows,cols]` dimensions. A
/// single dimension means a column vector.
fn split_dimensions(raw: &str) -> InterpretResult<(String, Option<(usize, usize)>)> {
    let (name, rest) = match raw.split_once('[') {
        Some((name, rest)) => (name, rest),
        None => return Ok((raw.to_string(), None)),
    };
    let dims = rest.strip_suffix(']').ok_or_else(|| {
        InterpretError::Definition(format!("unterminated dimensions in: {}", raw))
    })?;
    let mut parts = dims.split(',').map(str::trim);
    let rows = parse_dimension(parts.next(), raw)?;
    let cols = match parts.next() {
        Some(part) => parse_dimension(Some(part), raw)?,
        None => 1,
    };
    if parts.next().is_some() {
        return Err(InterpretError::Definition(format!(
            "too many dimensions in: {}",
            raw
        )));
    }
    Ok((name.to_string(), Some((rows, cols))))
}

fn parse_dimension(part: Option<&str>, raw: &str) -> InterpretResult<usize> {
    part.and_then(|p| p.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .ok_or_else(|| {
            InterpretError::Definition(format!("bad dimension in: {}", raw))
        })
}

/// Parses `[1 2 3; 4 5 6]`: rows split on `;`, elements on whitespace or
/// commas.
fn parse_matrix_literal(text: &str) -> InterpretResult<Value> {
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| {
            InterpretError::Assignment(format!("unterminated array literal: {}", text))
        })?;
    let mut rows = Vec::new();
    for row_text in inner.split(';') {
        let mut row = Vec::new();
        for token in row_text.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            row.push(parse_number(token).map_err(InterpretError::Math)?);
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    let matrix = Matrix::from_rows(rows).map_err(InterpretError::Math)?;
    Ok(Value::Matrix(matrix))
}
